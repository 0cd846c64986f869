//! Telemetry event types shared by every stage of the engine

use crate::clock::LocalTimestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One classified record from the sensor stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// Single ECG waveform sample
    Ecg {
        value: f64,
        received_at: LocalTimestamp,
    },
    /// Periodic oximeter reading
    Vitals {
        spo2: i32,
        heart_rate: i32,
        received_at: LocalTimestamp,
    },
}

impl TelemetryEvent {
    /// Build an ECG sample event
    pub fn ecg(value: f64, received_at: LocalTimestamp) -> Self {
        TelemetryEvent::Ecg { value, received_at }
    }

    /// Build a vitals event
    pub fn vitals(spo2: i32, heart_rate: i32, received_at: LocalTimestamp) -> Self {
        TelemetryEvent::Vitals {
            spo2,
            heart_rate,
            received_at,
        }
    }

    /// Arrival time of the record
    pub fn received_at(&self) -> LocalTimestamp {
        match self {
            TelemetryEvent::Ecg { received_at, .. } => *received_at,
            TelemetryEvent::Vitals { received_at, .. } => *received_at,
        }
    }

    /// Log kind this event is recorded under
    pub fn log_kind(&self) -> LogKind {
        match self {
            TelemetryEvent::Ecg { .. } => LogKind::Ecg,
            TelemetryEvent::Vitals { .. } => LogKind::Vitals,
        }
    }

    pub fn is_ecg(&self) -> bool {
        matches!(self, TelemetryEvent::Ecg { .. })
    }
}

impl fmt::Display for TelemetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEvent::Ecg { value, .. } => write!(f, "ECG {:.2}", value),
            TelemetryEvent::Vitals { spo2, heart_rate, .. } => {
                write!(f, "SpO2 {}% HR {} bpm", spo2, heart_rate)
            }
        }
    }
}

/// Kinds of line written to a session log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogKind {
    /// Recorder lifecycle (start, stop, application closing)
    System,
    /// Raw ECG sample
    Ecg,
    /// SpO2 / heart-rate pair
    Vitals,
    /// Hypoxia alarm raised
    Alarm,
    /// Alarm cleared
    Info,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::System => "SYSTEM",
            LogKind::Ecg => "ECG",
            LogKind::Vitals => "VITALS",
            LogKind::Alarm => "ALARM",
            LogKind::Info => "INFO",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
