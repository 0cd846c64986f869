//! Telemetry transports: where raw lines come from
//!
//! Both strategies hand the listener plain text records; classification
//! happens downstream so the rest of the engine never knows which one is in
//! use.

use crate::config::{DatagramConfig, PollingConfig, TransportConfig};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info, trace};
use vitals_core::{split_records, TransportError, VitalsResult, VITALS_PREFIX};

/// Source of raw telemetry lines
#[async_trait]
pub trait TelemetryTransport: Send {
    /// Wait for the next batch of records, in wire order.
    ///
    /// Implementations must return within a bounded time
    /// ([`TransportError::Timeout`] when nothing arrived) so the listener can
    /// observe its stop signal.
    async fn receive_lines(&mut self) -> Result<Vec<String>, TransportError>;

    /// Human readable description for logs
    fn describe(&self) -> String;
}

/// Build the transport selected in `config`
pub async fn build_transport(config: &TransportConfig) -> VitalsResult<Box<dyn TelemetryTransport>> {
    let transport: Box<dyn TelemetryTransport> = match config {
        TransportConfig::Datagram(datagram) => Box::new(DatagramTransport::bind(datagram).await?),
        TransportConfig::Polling(polling) => Box::new(PollingTransport::new(polling)?),
    };
    info!("Telemetry transport ready: {}", transport.describe());
    Ok(transport)
}

/// Connectionless receiver accepting datagrams from any sender
pub struct DatagramTransport {
    socket: UdpSocket,
    buffer: Vec<u8>,
    recv_timeout: Duration,
}

impl DatagramTransport {
    /// Bind the configured local address
    pub async fn bind(config: &DatagramConfig) -> VitalsResult<Self> {
        let addr = config.socket_addr()?;
        let socket = UdpSocket::bind(addr).await.map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        Ok(Self::from_socket(
            socket,
            config.recv_timeout(),
            config.max_datagram_size,
        ))
    }

    /// Wrap an already bound socket (tests bind to port 0)
    pub fn from_socket(socket: UdpSocket, recv_timeout: Duration, max_datagram_size: usize) -> Self {
        Self {
            socket,
            buffer: vec![0u8; max_datagram_size.max(1)],
            recv_timeout,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[async_trait]
impl TelemetryTransport for DatagramTransport {
    async fn receive_lines(&mut self) -> Result<Vec<String>, TransportError> {
        let (len, from) = tokio::time::timeout(self.recv_timeout, self.socket.recv_from(&mut self.buffer))
            .await
            .map_err(|_| TransportError::Timeout)??;

        let text = String::from_utf8_lossy(&self.buffer[..len]);
        trace!("{} bytes from {}", len, from);
        Ok(split_records(&text).map(str::to_owned).collect())
    }

    fn describe(&self) -> String {
        match self.socket.local_addr() {
            Ok(addr) => format!("UDP datagrams on {}", addr),
            Err(_) => "UDP datagrams".to_string(),
        }
    }
}

/// Request/response poller against the device's HTTP endpoints
///
/// Every call fetches one ECG value; every `stats_every` calls it also fetches
/// the `spo2,heartRate` pair and re-tags it as an `S:` record.
pub struct PollingTransport {
    client: reqwest::Client,
    ecg_url: String,
    stats_url: String,
    poll_delay: Duration,
    stats_every: u32,
    polls_since_stats: u32,
    first_poll: bool,
}

impl PollingTransport {
    pub fn new(config: &PollingConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TransportError::Request {
                url: config.base_url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            ecg_url: config.ecg_url(),
            stats_url: config.stats_url(),
            poll_delay: config.poll_delay(),
            stats_every: config.stats_every.max(1),
            polls_since_stats: 0,
            first_poll: true,
        })
    }

    async fn fetch(&self, url: &str) -> Result<String, TransportError> {
        let response = self.client.get(url).send().await.map_err(|e| request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| request_error(url, e))
    }
}

#[async_trait]
impl TelemetryTransport for PollingTransport {
    async fn receive_lines(&mut self) -> Result<Vec<String>, TransportError> {
        if self.first_poll {
            self.first_poll = false;
        } else {
            tokio::time::sleep(self.poll_delay).await;
        }

        let body = self.fetch(&self.ecg_url).await?;
        let mut lines: Vec<String> = split_records(&body).map(str::to_owned).collect();

        self.polls_since_stats += 1;
        if self.polls_since_stats >= self.stats_every {
            self.polls_since_stats = 0;
            match self.fetch(&self.stats_url).await {
                Ok(stats) => {
                    lines.extend(split_records(&stats).map(|record| format!("{}{}", VITALS_PREFIX, record)));
                }
                Err(e) => debug!("Stats poll failed: {}", e),
            }
        }

        Ok(lines)
    }

    fn describe(&self) -> String {
        format!("HTTP polling {} / {}", self.ecg_url, self.stats_url)
    }
}

fn request_error(url: &str, error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Request {
            url: url.to_string(),
            reason: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn loopback_transport() -> (DatagramTransport, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let transport = DatagramTransport::from_socket(socket, Duration::from_millis(200), 2048);
        let addr = transport.local_addr().unwrap();
        (transport, addr)
    }

    #[tokio::test]
    async fn test_datagram_splits_records() {
        let (mut transport, addr) = loopback_transport().await;
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"12.5\nS:97,72\r\n\n", addr).await.unwrap();

        let lines = transport.receive_lines().await.unwrap();
        assert_eq!(lines, vec!["12.5".to_string(), "S:97,72".to_string()]);
    }

    #[tokio::test]
    async fn test_datagram_timeout() {
        let (mut transport, _addr) = loopback_transport().await;
        let result = transport.receive_lines().await;
        assert!(matches!(result, Err(TransportError::Timeout)));
    }

    #[tokio::test]
    async fn test_datagram_invalid_utf8_keeps_valid_records() {
        let (mut transport, addr) = loopback_transport().await;
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"\xff\xfe\n2048\n", addr).await.unwrap();

        let lines = transport.receive_lines().await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "2048");
    }

    /// Device endpoints: `/readECG` -> "2048", `/readStats` -> "96,71"
    async fn device_stub() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/readECG"))
            .respond_with(ResponseTemplate::new(200).set_body_string("2048"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/readStats"))
            .respond_with(ResponseTemplate::new(200).set_body_string("96,71"))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_polling_interleaves_stats() {
        let server = device_stub().await;
        let config = PollingConfig {
            base_url: server.uri(),
            poll_delay_ms: 1,
            stats_every: 3,
            ..PollingConfig::default()
        };
        let mut transport = PollingTransport::new(&config).unwrap();

        let mut batches = Vec::new();
        for _ in 0..6 {
            batches.push(transport.receive_lines().await.unwrap());
        }

        assert_eq!(batches[0], vec!["2048".to_string()]);
        assert_eq!(batches[1], vec!["2048".to_string()]);
        assert_eq!(batches[2], vec!["2048".to_string(), "S:96,71".to_string()]);
        assert_eq!(batches[5], vec!["2048".to_string(), "S:96,71".to_string()]);
    }

    #[tokio::test]
    async fn test_polling_status_error() {
        let server = device_stub().await;
        let config = PollingConfig {
            base_url: server.uri(),
            ecg_path: "/missing".to_string(),
            ..PollingConfig::default()
        };
        let mut transport = PollingTransport::new(&config).unwrap();
        let result = transport.receive_lines().await;
        assert!(matches!(result, Err(TransportError::Status { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_polling_slow_device_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/readECG"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("2048")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let config = PollingConfig {
            base_url: server.uri(),
            request_timeout_ms: 50,
            ..PollingConfig::default()
        };
        let mut transport = PollingTransport::new(&config).unwrap();
        let result = transport.receive_lines().await;
        assert!(matches!(result, Err(TransportError::Timeout)));
    }

    #[tokio::test]
    async fn test_polling_stats_failure_keeps_ecg() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/readECG"))
            .respond_with(ResponseTemplate::new(200).set_body_string("2051"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/readStats"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = PollingConfig {
            base_url: server.uri(),
            stats_every: 1,
            ..PollingConfig::default()
        };
        let mut transport = PollingTransport::new(&config).unwrap();
        assert_eq!(transport.receive_lines().await.unwrap(), vec!["2051".to_string()]);
    }

    #[tokio::test]
    async fn test_polling_connection_refused_is_transient() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = PollingConfig {
            base_url: format!("http://127.0.0.1:{}", port),
            ..PollingConfig::default()
        };
        let mut transport = PollingTransport::new(&config).unwrap();
        let result = transport.receive_lines().await;
        assert!(matches!(
            result,
            Err(TransportError::Request { .. }) | Err(TransportError::Timeout)
        ));
    }
}
