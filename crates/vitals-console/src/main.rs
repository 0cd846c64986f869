//! Vitals Console - live ECG / SpO2 monitor in the terminal

mod app;

use anyhow::Context;
use app::{shutdown_signal, ConsoleApp};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use vitals_core::clock::system_clock;
use vitals_monitor::{start_monitor, DatagramConfig, MonitorConfig, PollingConfig, TransportConfig};
use vitals_simulation::{start_datagram_stream, StreamCommand, StreamerConfig, VitalsPattern};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Receive UDP datagrams pushed by the sensor bridge
    Datagram,
    /// Poll the device's HTTP endpoints
    Polling,
}

#[derive(Parser, Debug)]
#[command(name = "vitals-console")]
#[command(about = "Real-time ECG and pulse-oximetry monitor")]
#[command(version)]
struct Cli {
    /// JSON configuration file; command line flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Transport mode
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// Local UDP port (datagram mode)
    #[arg(short, long)]
    port: Option<u16>,

    /// Device base URL (polling mode), e.g. http://192.168.1.10
    #[arg(short, long)]
    url: Option<String>,

    /// Start recording a session immediately
    #[arg(short, long)]
    record: bool,

    /// Patient name for the session log
    #[arg(long, default_value = "")]
    patient: String,

    /// Patient age for the session log
    #[arg(long, default_value = "")]
    age: String,

    /// Directory for session logs
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// SpO2 percentage below which hypoxia is flagged
    #[arg(long)]
    threshold: Option<i32>,

    /// Feed the monitor from the built-in device simulator
    #[arg(short, long)]
    simulate: bool,

    /// Simulator preset (healthy, athlete, hypoxia, "finger removed", borderline)
    #[arg(long, default_value = "hypoxia")]
    pattern: String,

    /// Seconds between status lines
    #[arg(long, default_value = "1.0")]
    status_interval: f32,
}

impl Cli {
    fn monitor_config(&self) -> anyhow::Result<MonitorConfig> {
        let mut config = match &self.config {
            Some(path) => MonitorConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => MonitorConfig::default(),
        };

        match self.mode {
            Some(Mode::Datagram) => {
                if !matches!(config.transport, TransportConfig::Datagram(_)) {
                    config.transport = TransportConfig::Datagram(DatagramConfig::default());
                }
            }
            Some(Mode::Polling) => {
                if !matches!(config.transport, TransportConfig::Polling(_)) {
                    config.transport = TransportConfig::Polling(PollingConfig::default());
                }
            }
            None => {
                if self.url.is_some() && !self.simulate {
                    config.transport = TransportConfig::Polling(PollingConfig::default());
                }
            }
        }

        match &mut config.transport {
            TransportConfig::Datagram(datagram) => {
                if let Some(port) = self.port {
                    datagram.port = port;
                }
            }
            TransportConfig::Polling(polling) => {
                if let Some(url) = &self.url {
                    polling.base_url = url.trim_end_matches('/').to_string();
                }
            }
        }

        if let Some(dir) = &self.output_dir {
            config.recording.output_dir = dir.clone();
        }
        if let Some(threshold) = self.threshold {
            config.alarm.hypoxia_threshold = threshold;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so the live display owns stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.monitor_config()?;
    let shutdown = shutdown_signal().context("installing signal handlers")?;

    let simulator_target = match (&config.transport, cli.simulate) {
        (TransportConfig::Datagram(datagram), true) => Some(datagram.port),
        (TransportConfig::Polling(_), true) => {
            anyhow::bail!("--simulate streams UDP datagrams and needs datagram mode")
        }
        _ => None,
    };

    let monitor = start_monitor(config, system_clock())
        .await
        .context("starting telemetry monitor")?;

    let simulator = match simulator_target {
        Some(port) => {
            let pattern = VitalsPattern::preset(&cli.pattern)
                .with_context(|| format!("unknown simulator pattern '{}'", cli.pattern))?;
            let mut stream_config = StreamerConfig::default();
            stream_config.target.set_port(port);
            stream_config.simulator.pattern = pattern;
            info!("Simulating device: {}", pattern.description());
            Some(start_datagram_stream(stream_config).await?)
        }
        None => None,
    };

    if cli.record {
        match monitor.start_recording(&cli.patient, &cli.age).await {
            Ok(session) => info!("Recording session {}", session.id),
            Err(e) => warn!("Recording not started: {}", e),
        }
    }

    let app = ConsoleApp::new(
        monitor.waveform(),
        Duration::from_secs_f32(cli.status_interval.max(0.1)),
    );
    app.run(monitor.subscribe(), shutdown).await;

    info!("Shutting down...");
    if let Some((control, task)) = simulator {
        let _ = control.send(StreamCommand::Stop).await;
        let _ = task.await;
    }
    monitor.shutdown().await?;

    Ok(())
}
