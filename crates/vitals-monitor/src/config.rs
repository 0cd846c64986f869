//! Configuration management for the telemetry monitor

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vitals_core::{AlarmConfig, VitalsError, VitalsResult, DEFAULT_WAVEFORM_CAPACITY};

/// UDP port the sensor bridge sends to
pub const DEFAULT_DATAGRAM_PORT: u16 = 3333;

/// Global monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// How telemetry reaches the monitor
    pub transport: TransportConfig,
    /// Samples kept in the display waveform
    pub waveform_capacity: usize,
    /// Bounded queue between listener and monitor service
    pub event_channel_capacity: usize,
    /// Per-subscriber backlog for display events
    pub display_channel_capacity: usize,
    /// Hypoxia thresholds
    pub alarm: AlarmConfig,
    /// Session log output
    pub recording: RecordingConfig,
}

/// Transport strategy selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Listen for UDP datagrams pushed by the device
    Datagram(DatagramConfig),
    /// Poll the device's HTTP endpoints
    Polling(PollingConfig),
}

/// UDP listener parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatagramConfig {
    /// Local address to bind
    pub bind_addr: String,
    /// Local port to bind
    pub port: u16,
    /// Upper bound on one blocking receive (ms)
    pub recv_timeout_ms: u64,
    /// Receive buffer size in bytes
    pub max_datagram_size: usize,
}

/// HTTP polling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Device base URL, e.g. `http://192.168.1.10`
    pub base_url: String,
    /// Endpoint returning the latest ECG value
    pub ecg_path: String,
    /// Endpoint returning `spo2,heartRate`
    pub stats_path: String,
    /// Per-request timeout (ms)
    pub request_timeout_ms: u64,
    /// Pause between polls (ms)
    pub poll_delay_ms: u64,
    /// Fetch the stats endpoint once every this many polls
    pub stats_every: u32,
}

/// Session recorder parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Directory that receives session files
    pub output_dir: PathBuf,
    /// File name prefix
    pub file_prefix: String,
    /// Patient name used when none is given
    pub default_patient_name: String,
    /// Patient age used when none is given
    pub default_patient_age: String,
}

impl MonitorConfig {
    /// Listen for UDP datagrams on the default port
    pub fn datagram() -> Self {
        Self {
            transport: TransportConfig::Datagram(DatagramConfig::default()),
            waveform_capacity: DEFAULT_WAVEFORM_CAPACITY,
            event_channel_capacity: 1024,
            display_channel_capacity: 512,
            alarm: AlarmConfig::default(),
            recording: RecordingConfig::default(),
        }
    }

    /// Poll a device at `base_url`
    pub fn polling(base_url: &str) -> Self {
        Self {
            transport: TransportConfig::Polling(PollingConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                ..PollingConfig::default()
            }),
            ..Self::datagram()
        }
    }

    /// Validate entire configuration
    pub fn validate(&self) -> VitalsResult<()> {
        if self.waveform_capacity == 0 {
            return Err(VitalsError::config("waveform capacity must be greater than 0"));
        }

        if self.event_channel_capacity == 0 || self.display_channel_capacity == 0 {
            return Err(VitalsError::config("channel capacities must be greater than 0"));
        }

        if self.alarm.hypoxia_threshold <= 0 || self.alarm.hypoxia_threshold > 100 {
            return Err(VitalsError::config(format!(
                "hypoxia threshold {} outside 1-100%",
                self.alarm.hypoxia_threshold
            )));
        }

        if self.recording.file_prefix.trim().is_empty() {
            return Err(VitalsError::config("recording file prefix must not be empty"));
        }

        match &self.transport {
            TransportConfig::Datagram(datagram) => {
                datagram.socket_addr()?;
                if datagram.recv_timeout_ms == 0 {
                    return Err(VitalsError::config("receive timeout must be positive"));
                }
                if datagram.max_datagram_size == 0 {
                    return Err(VitalsError::config("datagram buffer must not be empty"));
                }
            }
            TransportConfig::Polling(polling) => {
                if !(polling.base_url.starts_with("http://")
                    || polling.base_url.starts_with("https://"))
                {
                    return Err(VitalsError::config(format!(
                        "polling base URL '{}' must start with http:// or https://",
                        polling.base_url
                    )));
                }
                if polling.request_timeout_ms == 0 {
                    return Err(VitalsError::config("request timeout must be positive"));
                }
                if polling.stats_every == 0 {
                    return Err(VitalsError::config("stats_every must be at least 1"));
                }
            }
        }

        Ok(())
    }

    /// Export configuration to JSON
    pub fn to_json(&self) -> VitalsResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| VitalsError::config(format!("failed to serialize configuration: {}", e)))
    }

    /// Import configuration from JSON
    pub fn from_json(json: &str) -> VitalsResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| VitalsError::config(format!("failed to deserialize configuration: {}", e)))
    }

    /// Load and validate a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> VitalsResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            VitalsError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&json)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::datagram()
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Datagram(DatagramConfig::default())
    }
}

impl DatagramConfig {
    /// Parsed bind address
    pub fn socket_addr(&self) -> VitalsResult<SocketAddr> {
        format!("{}:{}", self.bind_addr, self.port)
            .parse()
            .map_err(|e| {
                VitalsError::config(format!(
                    "invalid bind address {}:{}: {}",
                    self.bind_addr, self.port, e
                ))
            })
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }
}

impl Default for DatagramConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: DEFAULT_DATAGRAM_PORT,
            recv_timeout_ms: 500,
            max_datagram_size: 2048,
        }
    }
}

impl PollingConfig {
    pub fn ecg_url(&self) -> String {
        join_url(&self.base_url, &self.ecg_path)
    }

    pub fn stats_url(&self) -> String {
        join_url(&self.base_url, &self.stats_path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://192.168.1.10".to_string(),
            ecg_path: "/readECG".to_string(),
            stats_path: "/readStats".to_string(),
            request_timeout_ms: 500,
            poll_delay_ms: 40,
            stats_every: 20,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            file_prefix: "Historial".to_string(),
            default_patient_name: "Anonimo".to_string(),
            default_patient_age: "?".to_string(),
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.waveform_capacity, 200);
        match &config.transport {
            TransportConfig::Datagram(datagram) => {
                assert_eq!(datagram.port, 3333);
                assert_eq!(datagram.recv_timeout(), Duration::from_millis(500));
                assert_eq!(datagram.socket_addr().unwrap().port(), 3333);
            }
            other => panic!("unexpected transport {:?}", other),
        }
    }

    #[test]
    fn test_polling_urls() {
        let config = MonitorConfig::polling("http://10.0.0.7/");
        assert!(config.validate().is_ok());
        match &config.transport {
            TransportConfig::Polling(polling) => {
                assert_eq!(polling.ecg_url(), "http://10.0.0.7/readECG");
                assert_eq!(polling.stats_url(), "http://10.0.0.7/readStats");
                assert_eq!(polling.stats_every, 20);
                assert_eq!(polling.poll_delay(), Duration::from_millis(40));
            }
            other => panic!("unexpected transport {:?}", other),
        }
    }

    #[test]
    fn test_config_validation() {
        let mut config = MonitorConfig::default();
        config.waveform_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.alarm.hypoxia_threshold = 120;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.transport = TransportConfig::Datagram(DatagramConfig {
            bind_addr: "not an address".to_string(),
            ..DatagramConfig::default()
        });
        assert!(config.validate().is_err());

        let config = MonitorConfig::polling("ftp://device");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_serialization() {
        let config = MonitorConfig::polling("http://device.local");
        let json = config.to_json().unwrap();
        assert!(json.contains("\"mode\": \"polling\""));

        let restored = MonitorConfig::from_json(&json).unwrap();
        assert_eq!(restored.transport, config.transport);
        assert_eq!(restored.recording, config.recording);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "transport": { "mode": "datagram", "port": 4444 },
            "recording": { "output_dir": "/var/log/vitals" }
        }"#;
        let config = MonitorConfig::from_json(json).unwrap();
        match &config.transport {
            TransportConfig::Datagram(datagram) => {
                assert_eq!(datagram.port, 4444);
                assert_eq!(datagram.bind_addr, "0.0.0.0");
            }
            other => panic!("unexpected transport {:?}", other),
        }
        assert_eq!(config.recording.output_dir, PathBuf::from("/var/log/vitals"));
        assert_eq!(config.recording.file_prefix, "Historial");
        assert_eq!(config.waveform_capacity, 200);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.json");
        std::fs::write(&path, r#"{ "waveform_capacity": 500 }"#).unwrap();
        let config = MonitorConfig::from_json_file(&path).unwrap();
        assert_eq!(config.waveform_capacity, 500);

        assert!(MonitorConfig::from_json_file(dir.path().join("missing.json")).is_err());
    }
}
