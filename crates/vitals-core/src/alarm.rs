//! Edge-triggered hypoxia detector over SpO2 readings
//!
//! Two states, `Normal` and `Hypoxic`. A reading of `0` means the sensor is
//! not attached and counts as `Normal`. Transitions are reported once per
//! edge; repeated readings in the same state report nothing.

use crate::telemetry::LogKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// SpO2 percentage below which a non-zero reading is hypoxic
pub const HYPOXIA_THRESHOLD: i32 = 90;

/// Current alarm classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlarmState {
    #[default]
    Normal,
    Hypoxic,
}

impl AlarmState {
    /// Classify a single SpO2 reading against `threshold`
    pub fn classify(spo2: i32, threshold: i32) -> Self {
        if spo2 > 0 && spo2 < threshold {
            AlarmState::Hypoxic
        } else {
            AlarmState::Normal
        }
    }

    pub fn is_alarm(&self) -> bool {
        matches!(self, AlarmState::Hypoxic)
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmState::Normal => write!(f, "Normal"),
            AlarmState::Hypoxic => write!(f, "Hypoxic"),
        }
    }
}

/// A state change worth a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmTransition {
    /// Normal -> Hypoxic
    HypoxiaDetected { spo2: i32 },
    /// Hypoxic -> Normal
    Normalized { spo2: i32 },
}

impl AlarmTransition {
    pub fn log_kind(&self) -> LogKind {
        match self {
            AlarmTransition::HypoxiaDetected { .. } => LogKind::Alarm,
            AlarmTransition::Normalized { .. } => LogKind::Info,
        }
    }

    pub fn detail(&self) -> &'static str {
        match self {
            AlarmTransition::HypoxiaDetected { .. } => "HYPOXIA DETECTED",
            AlarmTransition::Normalized { .. } => "O2 LEVEL NORMALIZED",
        }
    }

    /// SpO2 reading that caused the transition
    pub fn spo2(&self) -> i32 {
        match self {
            AlarmTransition::HypoxiaDetected { spo2 } | AlarmTransition::Normalized { spo2 } => {
                *spo2
            }
        }
    }

    /// State entered by this transition
    pub fn target(&self) -> AlarmState {
        match self {
            AlarmTransition::HypoxiaDetected { .. } => AlarmState::Hypoxic,
            AlarmTransition::Normalized { .. } => AlarmState::Normal,
        }
    }
}

/// Alarm thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmConfig {
    /// Non-zero SpO2 readings strictly below this are hypoxic
    pub hypoxia_threshold: i32,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            hypoxia_threshold: HYPOXIA_THRESHOLD,
        }
    }
}

/// Hypoxia state machine
#[derive(Debug, Clone, Default)]
pub struct AlarmMonitor {
    config: AlarmConfig,
    state: AlarmState,
    last_spo2: Option<i32>,
}

impl AlarmMonitor {
    pub fn new(config: AlarmConfig) -> Self {
        Self {
            config,
            state: AlarmState::Normal,
            last_spo2: None,
        }
    }

    /// Feed one SpO2 reading; returns the transition if the state changed
    pub fn evaluate(&mut self, spo2: i32) -> Option<AlarmTransition> {
        self.last_spo2 = Some(spo2);
        let next = AlarmState::classify(spo2, self.config.hypoxia_threshold);
        if next == self.state {
            return None;
        }

        self.state = next;
        Some(match next {
            AlarmState::Hypoxic => AlarmTransition::HypoxiaDetected { spo2 },
            AlarmState::Normal => AlarmTransition::Normalized { spo2 },
        })
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    /// Most recently evaluated reading
    pub fn last_spo2(&self) -> Option<i32> {
        self.last_spo2
    }

    pub fn config(&self) -> &AlarmConfig {
        &self.config
    }

    /// Back to `Normal` without reporting a transition
    pub fn reset(&mut self) {
        self.state = AlarmState::Normal;
        self.last_spo2 = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(sequence: &[i32]) -> Vec<AlarmTransition> {
        let mut monitor = AlarmMonitor::default();
        sequence
            .iter()
            .filter_map(|&spo2| monitor.evaluate(spo2))
            .collect()
    }

    #[test]
    fn test_single_episode_logs_two_edges() {
        let transitions = run(&[95, 85, 85, 85, 95]);
        assert_eq!(
            transitions,
            vec![
                AlarmTransition::HypoxiaDetected { spo2: 85 },
                AlarmTransition::Normalized { spo2: 95 },
            ]
        );
        assert_eq!(transitions[0].log_kind(), LogKind::Alarm);
        assert_eq!(transitions[1].log_kind(), LogKind::Info);
    }

    #[test]
    fn test_sensor_detached_is_not_an_alarm() {
        assert!(run(&[0, 0, 0]).is_empty());
    }

    #[test]
    fn test_boundary_values() {
        assert_eq!(AlarmState::classify(90, HYPOXIA_THRESHOLD), AlarmState::Normal);
        assert_eq!(AlarmState::classify(89, HYPOXIA_THRESHOLD), AlarmState::Hypoxic);
        assert_eq!(AlarmState::classify(1, HYPOXIA_THRESHOLD), AlarmState::Hypoxic);
        assert_eq!(AlarmState::classify(0, HYPOXIA_THRESHOLD), AlarmState::Normal);
        assert_eq!(AlarmState::classify(-4, HYPOXIA_THRESHOLD), AlarmState::Normal);
    }

    #[test]
    fn test_oscillation_logs_every_crossing_once() {
        let transitions = run(&[89, 90, 89, 89, 90, 90, 88]);
        let kinds: Vec<LogKind> = transitions.iter().map(|t| t.log_kind()).collect();
        assert_eq!(
            kinds,
            vec![LogKind::Alarm, LogKind::Info, LogKind::Alarm, LogKind::Info, LogKind::Alarm]
        );
    }

    #[test]
    fn test_detach_during_alarm_normalizes() {
        let mut monitor = AlarmMonitor::default();
        assert!(monitor.evaluate(80).is_some());
        assert_eq!(monitor.state(), AlarmState::Hypoxic);
        assert_eq!(
            monitor.evaluate(0),
            Some(AlarmTransition::Normalized { spo2: 0 })
        );
        assert_eq!(monitor.last_spo2(), Some(0));
    }

    #[test]
    fn test_custom_threshold() {
        let mut monitor = AlarmMonitor::new(AlarmConfig { hypoxia_threshold: 94 });
        assert_eq!(
            monitor.evaluate(93),
            Some(AlarmTransition::HypoxiaDetected { spo2: 93 })
        );
        monitor.reset();
        assert_eq!(monitor.state(), AlarmState::Normal);
        assert_eq!(monitor.last_spo2(), None);
    }
}
