//! Sensor-bridge simulator: ECG samples and periodic oximeter readings
//!
//! Produces the same text records the firmware writes to its serial port:
//! one integer ADC value per ECG sample and an `S:spo2,heartRate` line once
//! per second of simulated time.

use crate::vitals_patterns::VitalsPattern;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use vitals_core::{VitalsError, VitalsResult, VITALS_PREFIX};

/// 12-bit ADC full scale
pub const ADC_MAX: i32 = 4095;

/// Gaussian components of one heartbeat: (phase centre, amplitude, width)
const PQRST: [(f32, f32, f32); 5] = [
    (0.20, 0.12, 0.025), // P
    (0.37, -0.12, 0.010), // Q
    (0.40, 1.00, 0.012), // R
    (0.43, -0.22, 0.012), // S
    (0.68, 0.28, 0.040), // T
];

/// Configuration for the device simulator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// ECG sampling rate in Hz
    pub sampling_rate: f32,
    /// ADC value of the isoelectric line
    pub baseline: f32,
    /// R-peak height above the baseline in ADC counts
    pub amplitude: f32,
    /// Oximeter behaviour; also drives the beat rate
    pub pattern: VitalsPattern,
    /// Noise configuration
    pub noise: NoiseConfig,
    /// Smoothing factor of the firmware's first-order low-pass (0, 1]
    pub lowpass_alpha: f32,
    /// Seconds between `S:` lines
    pub vitals_interval: f32,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
}

/// Noise added before the low-pass stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Gaussian noise standard deviation in ADC counts (0.0 = no noise)
    pub gaussian_std: f32,
    /// Baseline wander amplitude in ADC counts
    pub baseline_wander: f32,
    /// Motion artifact probability per sample (0.0 to 1.0)
    pub motion_artifact_prob: f32,
    /// Motion artifact amplitude in ADC counts
    pub motion_artifact_amp: f32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            gaussian_std: 12.0,
            baseline_wander: 40.0,
            motion_artifact_prob: 0.002,
            motion_artifact_amp: 300.0,
        }
    }
}

impl NoiseConfig {
    /// Noise-free output, for tests and demos
    pub fn none() -> Self {
        Self {
            gaussian_std: 0.0,
            baseline_wander: 0.0,
            motion_artifact_prob: 0.0,
            motion_artifact_amp: 0.0,
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 250.0,
            baseline: 2048.0,
            amplitude: 900.0,
            pattern: VitalsPattern::default(),
            noise: NoiseConfig::default(),
            lowpass_alpha: 0.6,
            vitals_interval: 1.0,
            seed: None,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> VitalsResult<()> {
        if !(self.sampling_rate > 0.0 && self.sampling_rate <= 10_000.0) {
            return Err(VitalsError::config(format!(
                "sampling rate {} Hz outside (0, 10000]",
                self.sampling_rate
            )));
        }
        if !(self.lowpass_alpha > 0.0 && self.lowpass_alpha <= 1.0) {
            return Err(VitalsError::config("low-pass alpha must be in (0, 1]"));
        }
        if self.vitals_interval <= 0.0 {
            return Err(VitalsError::config("vitals interval must be positive"));
        }
        if self.noise.gaussian_std < 0.0 {
            return Err(VitalsError::config("noise deviation must not be negative"));
        }
        Ok(())
    }
}

/// ECG + oximeter simulator
pub struct DeviceSimulator {
    config: SimulatorConfig,
    rng: StdRng,
    normal_dist: Normal<f32>,
    /// Position inside the current beat, in beats
    beat_phase: f32,
    filtered: f32,
    time_offset: f32,
    next_vitals_at: f32,
}

impl DeviceSimulator {
    /// Create new simulator with configuration
    pub fn new(config: SimulatorConfig) -> VitalsResult<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let normal_dist = Normal::new(0.0, config.noise.gaussian_std).map_err(|e| {
            VitalsError::config(format!("failed to create normal distribution: {}", e))
        })?;
        let filtered = config.baseline;

        Ok(Self {
            config,
            rng,
            normal_dist,
            beat_phase: 0.0,
            filtered,
            time_offset: 0.0,
            next_vitals_at: 0.0,
        })
    }

    /// Next ECG sample as the firmware reports it
    pub fn next_ecg_sample(&mut self) -> i32 {
        let dt = 1.0 / self.config.sampling_rate;
        let time = self.time_offset;

        let raw = self.config.baseline
            + self.config.amplitude * beat_shape(self.beat_phase)
            + self.add_noise(time);
        self.filtered += self.config.lowpass_alpha * (raw - self.filtered);

        let (_, heart_rate) = self.current_vitals();
        // A detached sensor still shows a flat trace at the resting rate
        let bpm = if heart_rate > 0 { heart_rate as f32 } else { 60.0 };
        self.beat_phase = (self.beat_phase + dt * bpm / 60.0).fract();
        self.time_offset += dt;

        (self.filtered.round() as i32).clamp(0, ADC_MAX)
    }

    /// Records covering `duration` seconds, in emission order
    pub fn generate_lines(&mut self, duration: f32) -> Vec<String> {
        let samples = (duration * self.config.sampling_rate).round() as usize;
        let mut lines = Vec::with_capacity(samples + 1);

        for _ in 0..samples {
            if self.time_offset >= self.next_vitals_at {
                lines.push(self.vitals_line());
                self.next_vitals_at += self.config.vitals_interval;
            }
            lines.push(self.next_ecg_sample().to_string());
        }

        lines
    }

    /// `S:spo2,heartRate` for the current simulated time
    pub fn vitals_line(&self) -> String {
        let (spo2, heart_rate) = self.current_vitals();
        format!("{}{},{}", VITALS_PREFIX, spo2, heart_rate)
    }

    pub fn current_vitals(&self) -> (i32, i32) {
        self.config.pattern.vitals_at_time(self.time_offset)
    }

    /// Simulated seconds since start or last reset
    pub fn elapsed(&self) -> f32 {
        self.time_offset
    }

    /// Reset time offset (useful for restarting simulation)
    pub fn reset_time(&mut self) {
        self.time_offset = 0.0;
        self.next_vitals_at = 0.0;
        self.beat_phase = 0.0;
        self.filtered = self.config.baseline;
    }

    /// Get current configuration
    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Swap the oximeter pattern without restarting the clock
    pub fn set_pattern(&mut self, pattern: VitalsPattern) {
        self.config.pattern = pattern;
    }

    fn add_noise(&mut self, time: f32) -> f32 {
        let mut noise = 0.0;

        noise += self.normal_dist.sample(&mut self.rng);

        // Respiration-driven wander
        noise += self.config.noise.baseline_wander * (2.0 * PI * 0.25 * time).sin();

        if self.rng.gen::<f32>() < self.config.noise.motion_artifact_prob {
            noise += self.config.noise.motion_artifact_amp * self.rng.gen_range(-1.0..1.0);
        }

        noise
    }
}

/// Normalised PQRST waveform at `phase` (0..1 within one beat)
pub fn beat_shape(phase: f32) -> f32 {
    PQRST
        .iter()
        .map(|&(centre, amplitude, width)| {
            let d = (phase - centre) / width;
            amplitude * (-0.5 * d * d).exp()
        })
        .sum()
}
