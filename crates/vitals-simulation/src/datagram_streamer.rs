//! Real-time datagram streaming, emulating the serial-to-UDP sensor bridge

use crate::ecg_simulator::{DeviceSimulator, SimulatorConfig};
use crate::vitals_patterns::VitalsPattern;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};
use vitals_core::{TransportError, VitalsError, VitalsResult};

/// Configuration for datagram streaming
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerConfig {
    /// Device simulation configuration
    pub simulator: SimulatorConfig,
    /// Where the monitor listens
    pub target: SocketAddr,
    /// Simulated seconds generated per tick
    pub chunk_duration: f32,
    /// Records packed into one datagram
    pub lines_per_datagram: usize,
    /// Begin sending without waiting for `Start`
    pub autostart: bool,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            simulator: SimulatorConfig::default(),
            target: SocketAddr::from(([127, 0, 0, 1], 3333)),
            chunk_duration: 0.04, // 10 samples at 250 Hz
            lines_per_datagram: 8,
            autostart: true,
        }
    }
}

/// Commands for controlling the stream
#[derive(Debug, Clone)]
pub enum StreamCommand {
    Start,
    Pause,
    /// Restart simulated time from zero
    Reset,
    UpdatePattern(VitalsPattern),
    /// End the streaming task
    Stop,
}

/// Stream statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamerStats {
    pub is_running: bool,
    pub datagrams_sent: u64,
    pub lines_sent: u64,
    pub send_errors: u64,
    pub simulated_seconds: f32,
}

/// Streams simulated sensor records to a UDP target
pub struct DatagramStreamer {
    config: StreamerConfig,
    simulator: DeviceSimulator,
    socket: UdpSocket,
    control_receiver: mpsc::Receiver<StreamCommand>,
    stats: Arc<Mutex<StreamerStats>>,
}

impl DatagramStreamer {
    /// Create new streamer bound to an ephemeral local port, plus its control sender
    pub async fn new(
        config: StreamerConfig,
    ) -> VitalsResult<(Self, mpsc::Sender<StreamCommand>)> {
        if config.chunk_duration <= 0.0 {
            return Err(VitalsError::config("chunk duration must be positive"));
        }
        let simulator = DeviceSimulator::new(config.simulator.clone())?;

        let bind_addr = if config.target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: bind_addr.to_string(),
                source,
            })?;
        let (control_sender, control_receiver) = mpsc::channel(32);

        let streamer = Self {
            config,
            simulator,
            socket,
            control_receiver,
            stats: Arc::new(Mutex::new(StreamerStats::default())),
        };
        Ok((streamer, control_sender))
    }

    /// Shared statistics
    pub fn stats_handle(&self) -> Arc<Mutex<StreamerStats>> {
        self.stats.clone()
    }

    /// Get current configuration
    pub fn config(&self) -> &StreamerConfig {
        &self.config
    }

    /// Generate and send until `Stop` or the last control sender is dropped
    pub async fn run(mut self) -> StreamerStats {
        let mut ticker = interval(Duration::from_secs_f32(self.config.chunk_duration));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut running = self.config.autostart;
        self.stats.lock().await.is_running = running;

        info!(
            "Datagram streamer -> {} ({:.0} ms chunks, {})",
            self.config.target,
            self.config.chunk_duration * 1000.0,
            self.simulator.config().pattern.description()
        );

        loop {
            tokio::select! {
                _ = ticker.tick(), if running => {
                    let lines = self.simulator.generate_lines(self.config.chunk_duration);
                    self.send_lines(&lines).await;
                }

                command = self.control_receiver.recv() => {
                    match command {
                        Some(StreamCommand::Start) => {
                            running = true;
                            debug!("Datagram streamer started");
                        }
                        Some(StreamCommand::Pause) => {
                            running = false;
                            debug!("Datagram streamer paused");
                        }
                        Some(StreamCommand::Reset) => {
                            self.simulator.reset_time();
                            debug!("Datagram streamer reset");
                        }
                        Some(StreamCommand::UpdatePattern(pattern)) => {
                            self.simulator.set_pattern(pattern);
                            info!("Simulated pattern updated: {}", pattern.description());
                        }
                        Some(StreamCommand::Stop) | None => break,
                    }
                    self.stats.lock().await.is_running = running;
                }
            }
        }

        let mut stats = self.stats.lock().await;
        stats.is_running = false;
        info!(
            "Datagram streamer stopped after {} datagrams",
            stats.datagrams_sent
        );
        stats.clone()
    }

    async fn send_lines(&mut self, lines: &[String]) {
        let per_datagram = self.config.lines_per_datagram.max(1);
        let mut sent = 0u64;
        let mut lines_sent = 0u64;
        let mut errors = 0u64;

        for batch in lines.chunks(per_datagram) {
            let payload = batch.join("\n");
            match self.socket.send_to(payload.as_bytes(), self.config.target).await {
                Ok(_) => {
                    sent += 1;
                    lines_sent += batch.len() as u64;
                }
                Err(e) => {
                    if errors == 0 {
                        warn!("Datagram send to {} failed: {}", self.config.target, e);
                    }
                    errors += 1;
                }
            }
        }

        let mut stats = self.stats.lock().await;
        stats.datagrams_sent += sent;
        stats.lines_sent += lines_sent;
        stats.send_errors += errors;
        stats.simulated_seconds = self.simulator.elapsed();
    }
}

/// Helper function to create and start a streamer in the background
pub async fn start_datagram_stream(
    config: StreamerConfig,
) -> VitalsResult<(mpsc::Sender<StreamCommand>, JoinHandle<StreamerStats>)> {
    let (streamer, control_sender) = DatagramStreamer::new(config).await?;
    let task = tokio::spawn(streamer.run());
    Ok((control_sender, task))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecg_simulator::NoiseConfig;
    use tokio::time::{sleep, timeout};

    fn config_for(target: SocketAddr, autostart: bool) -> StreamerConfig {
        StreamerConfig {
            simulator: SimulatorConfig {
                noise: NoiseConfig::none(),
                seed: Some(3),
                ..SimulatorConfig::default()
            },
            target,
            chunk_duration: 0.02,
            lines_per_datagram: 4,
            autostart,
        }
    }

    #[tokio::test]
    async fn test_streamer_sends_batched_records() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = receiver.local_addr().unwrap();

        let (control, task) = start_datagram_stream(config_for(target, true)).await.unwrap();

        let mut buf = [0u8; 2048];
        let (len, _) = timeout(Duration::from_secs(2), receiver.recv_from(&mut buf))
            .await
            .expect("datagram in time")
            .unwrap();
        let payload = std::str::from_utf8(&buf[..len]).unwrap();
        let lines: Vec<&str> = payload.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "S:98,72");
        assert!(lines[1].parse::<i32>().is_ok());

        control.send(StreamCommand::Stop).await.unwrap();
        let stats = task.await.unwrap();
        assert!(!stats.is_running);
        assert!(stats.datagrams_sent >= 1);
        assert!(stats.lines_sent >= 4);
    }

    #[tokio::test]
    async fn test_streamer_waits_for_start() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = receiver.local_addr().unwrap();

        let (control, task) = start_datagram_stream(config_for(target, false)).await.unwrap();
        sleep(Duration::from_millis(100)).await;

        let mut buf = [0u8; 2048];
        assert!(timeout(Duration::from_millis(50), receiver.recv_from(&mut buf))
            .await
            .is_err());

        control.send(StreamCommand::Start).await.unwrap();
        assert!(timeout(Duration::from_secs(2), receiver.recv_from(&mut buf))
            .await
            .is_ok());

        drop(control);
        let stats = timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(stats.datagrams_sent >= 1);
    }
}
