//! Vitals-Monitor: runtime side of the telemetry engine
//!
//! Transports deliver raw records, the listener classifies them on a
//! background task, and the monitor service fans each event out to the
//! waveform, the hypoxia alarm and the session recorder.

pub mod config;
pub mod listener;
pub mod recorder;
pub mod service;
pub mod transport;

pub use config::{
    DatagramConfig, MonitorConfig, PollingConfig, RecordingConfig, TransportConfig,
    DEFAULT_DATAGRAM_PORT,
};
pub use listener::{ListenerStats, TelemetryListener};
pub use recorder::{SessionHandle, SessionRecorder};
pub use service::{
    start_monitor, start_monitor_with_transport, DisplayEvent, MonitorCommand, MonitorEngine,
    MonitorHandle, MonitorService, MonitorStats,
};
pub use transport::{build_transport, DatagramTransport, PollingTransport, TelemetryTransport};
