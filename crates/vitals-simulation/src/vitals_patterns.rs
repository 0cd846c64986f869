//! Pre-defined oximeter patterns for the device simulator

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// How SpO2 and heart rate evolve over simulated time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pattern", rename_all = "snake_case")]
pub enum VitalsPattern {
    /// Healthy, steady reading
    Stable { spo2: i32, heart_rate: i32 },
    /// Linear desaturation to `nadir_spo2`, a plateau, then recovery
    HypoxiaEpisode {
        baseline_spo2: i32,
        nadir_spo2: i32,
        /// Seconds before the drop starts
        onset: f32,
        /// Seconds spent descending and, again, recovering
        ramp: f32,
        /// Seconds spent at the nadir
        plateau: f32,
        heart_rate: i32,
    },
    /// Normal reading, then the finger leaves the sensor and the firmware reports zeros
    SensorDetached {
        spo2: i32,
        heart_rate: i32,
        after: f32,
    },
    /// SpO2 swinging around `center`, crossing alarm thresholds repeatedly
    Oscillating {
        center: f32,
        amplitude: f32,
        period: f32,
        heart_rate: i32,
    },
}

impl VitalsPattern {
    /// `(spo2, heart_rate)` reported at `time` seconds
    pub fn vitals_at_time(&self, time: f32) -> (i32, i32) {
        match *self {
            VitalsPattern::Stable { spo2, heart_rate } => (spo2, heart_rate),

            VitalsPattern::HypoxiaEpisode {
                baseline_spo2,
                nadir_spo2,
                onset,
                ramp,
                plateau,
                heart_rate,
            } => {
                let drop = (baseline_spo2 - nadir_spo2) as f32;
                let ramp = ramp.max(f32::EPSILON);
                let t = time - onset;
                let spo2 = if t <= 0.0 {
                    baseline_spo2 as f32
                } else if t < ramp {
                    baseline_spo2 as f32 - drop * (t / ramp)
                } else if t < ramp + plateau {
                    nadir_spo2 as f32
                } else if t < 2.0 * ramp + plateau {
                    nadir_spo2 as f32 + drop * ((t - ramp - plateau) / ramp)
                } else {
                    baseline_spo2 as f32
                };
                // Tachycardic response while desaturated
                let depth = (baseline_spo2 as f32 - spo2) / drop.max(1.0);
                let rate = heart_rate as f32 * (1.0 + 0.25 * depth);
                (spo2.round() as i32, rate.round() as i32)
            }

            VitalsPattern::SensorDetached {
                spo2,
                heart_rate,
                after,
            } => {
                if time < after {
                    (spo2, heart_rate)
                } else {
                    (0, 0)
                }
            }

            VitalsPattern::Oscillating {
                center,
                amplitude,
                period,
                heart_rate,
            } => {
                let period = period.max(f32::EPSILON);
                let spo2 = center + amplitude * (2.0 * PI * time / period).sin();
                (spo2.round().clamp(0.0, 100.0) as i32, heart_rate)
            }
        }
    }

    /// Get pattern description
    pub fn description(&self) -> &'static str {
        match self {
            VitalsPattern::Stable { .. } => "Stable vitals",
            VitalsPattern::HypoxiaEpisode { .. } => "Hypoxia episode",
            VitalsPattern::SensorDetached { .. } => "Sensor detached",
            VitalsPattern::Oscillating { .. } => "Oscillating saturation",
        }
    }

    /// Create common preset patterns
    pub fn presets() -> Vec<(&'static str, VitalsPattern)> {
        vec![
            ("Healthy", VitalsPattern::Stable { spo2: 98, heart_rate: 72 }),
            ("Athlete", VitalsPattern::Stable { spo2: 99, heart_rate: 52 }),
            ("Hypoxia", VitalsPattern::HypoxiaEpisode {
                baseline_spo2: 97, nadir_spo2: 84, onset: 5.0, ramp: 10.0, plateau: 15.0, heart_rate: 75
            }),
            ("Finger Removed", VitalsPattern::SensorDetached {
                spo2: 97, heart_rate: 70, after: 10.0
            }),
            ("Borderline", VitalsPattern::Oscillating {
                center: 90.0, amplitude: 3.0, period: 12.0, heart_rate: 80
            }),
        ]
    }

    /// Look up a preset by name, ignoring case
    pub fn preset(name: &str) -> Option<VitalsPattern> {
        Self::presets()
            .into_iter()
            .find(|(preset, _)| preset.eq_ignore_ascii_case(name))
            .map(|(_, pattern)| pattern)
    }
}

impl Default for VitalsPattern {
    fn default() -> Self {
        VitalsPattern::Stable {
            spo2: 98,
            heart_rate: 72,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hypoxia_episode_shape() {
        let pattern = VitalsPattern::HypoxiaEpisode {
            baseline_spo2: 97,
            nadir_spo2: 84,
            onset: 5.0,
            ramp: 10.0,
            plateau: 15.0,
            heart_rate: 75,
        };

        assert_eq!(pattern.vitals_at_time(0.0), (97, 75));
        assert_eq!(pattern.vitals_at_time(20.0).0, 84);
        assert!(pattern.vitals_at_time(20.0).1 > 75);
        assert_eq!(pattern.vitals_at_time(60.0), (97, 75));

        let (midway, _) = pattern.vitals_at_time(10.0);
        assert!(midway < 97 && midway > 84);
    }

    #[test]
    fn test_sensor_detached_reports_zero() {
        let pattern = VitalsPattern::SensorDetached {
            spo2: 97,
            heart_rate: 70,
            after: 3.0,
        };
        assert_eq!(pattern.vitals_at_time(2.9), (97, 70));
        assert_eq!(pattern.vitals_at_time(3.0), (0, 0));
    }

    #[test]
    fn test_oscillating_stays_in_band() {
        let pattern = VitalsPattern::Oscillating {
            center: 90.0,
            amplitude: 3.0,
            period: 12.0,
            heart_rate: 80,
        };
        let readings: Vec<i32> = (0..24).map(|t| pattern.vitals_at_time(t as f32).0).collect();
        assert!(readings.iter().all(|&spo2| (87..=93).contains(&spo2)));
        assert!(readings.iter().any(|&spo2| spo2 < 90));
        assert!(readings.iter().any(|&spo2| spo2 >= 90));
    }

    #[test]
    fn test_presets() {
        assert_eq!(VitalsPattern::presets().len(), 5);
        assert!(matches!(
            VitalsPattern::preset("hypoxia"),
            Some(VitalsPattern::HypoxiaEpisode { .. })
        ));
        assert!(VitalsPattern::preset("unknown").is_none());
    }
}
