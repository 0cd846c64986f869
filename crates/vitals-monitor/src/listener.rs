//! Background telemetry listener
//!
//! Owns the transport on a dedicated tokio task, classifies every record and
//! forwards accepted events, in wire order, through a bounded channel. Parse
//! and transport failures are counted and logged but never end the loop; only
//! [`TelemetryListener::stop`] (or dropping the listener) does.

use crate::transport::TelemetryTransport;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use vitals_core::{classify_line, SharedClock, TelemetryEvent, TransportError};

/// Counters describing listener activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerStats {
    pub is_running: bool,
    /// Datagrams or HTTP responses that produced a batch
    pub payloads_received: u64,
    pub lines_seen: u64,
    pub events_forwarded: u64,
    pub lines_rejected: u64,
    /// Receive calls that ended on the timeout without data
    pub idle_timeouts: u64,
    pub transport_errors: u64,
}

/// Handle to the running listener task
pub struct TelemetryListener {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    stats: Arc<Mutex<ListenerStats>>,
    description: String,
}

impl TelemetryListener {
    /// Start receiving on a background task
    pub fn spawn(
        transport: Box<dyn TelemetryTransport>,
        events: mpsc::Sender<TelemetryEvent>,
        clock: SharedClock,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let stats = Arc::new(Mutex::new(ListenerStats {
            is_running: true,
            ..ListenerStats::default()
        }));
        let description = transport.describe();

        let task = tokio::spawn(run_listener(
            transport,
            events,
            clock,
            stop_rx,
            stats.clone(),
        ));

        Self {
            stop_tx,
            task,
            stats,
            description,
        }
    }

    /// Signal the loop to stop and wait until the task has exited.
    ///
    /// The transport (and its socket) is dropped before this returns.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            warn!("Telemetry listener task ended abnormally: {}", e);
        }
        info!("Telemetry listener stopped ({})", self.description);
    }

    /// Snapshot of the current counters
    pub fn stats(&self) -> ListenerStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Shared counters for a presentation layer to poll
    pub fn stats_handle(&self) -> Arc<Mutex<ListenerStats>> {
        self.stats.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

fn bump(stats: &Mutex<ListenerStats>, update: impl FnOnce(&mut ListenerStats)) {
    let mut stats = stats.lock().unwrap_or_else(|e| e.into_inner());
    update(&mut stats);
}

async fn run_listener(
    mut transport: Box<dyn TelemetryTransport>,
    events: mpsc::Sender<TelemetryEvent>,
    clock: SharedClock,
    mut stop_rx: watch::Receiver<bool>,
    stats: Arc<Mutex<ListenerStats>>,
) {
    info!("Telemetry listener started - {}", transport.describe());

    let mut consecutive_errors: u64 = 0;

    'receive: loop {
        if *stop_rx.borrow() {
            break;
        }

        let result = tokio::select! {
            changed = stop_rx.changed() => {
                // Sender dropped counts as a stop request
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
                continue;
            }
            result = transport.receive_lines() => result,
        };

        let lines = match result {
            Ok(lines) => {
                if consecutive_errors > 0 {
                    info!("Telemetry transport recovered after {} errors", consecutive_errors);
                    consecutive_errors = 0;
                }
                lines
            }
            Err(TransportError::Timeout) => {
                bump(&stats, |s| s.idle_timeouts += 1);
                continue;
            }
            Err(e) => {
                bump(&stats, |s| s.transport_errors += 1);
                if consecutive_errors == 0 {
                    warn!("Telemetry transport error, retrying: {}", e);
                } else {
                    debug!("Telemetry transport error: {}", e);
                }
                consecutive_errors += 1;
                continue;
            }
        };

        bump(&stats, |s| {
            s.payloads_received += 1;
            s.lines_seen += lines.len() as u64;
        });

        for line in lines {
            let event = match classify_line(&line, clock.now()) {
                Ok(event) => event,
                Err(e) => {
                    trace!("Dropped line {:?}: {}", line, e);
                    bump(&stats, |s| s.lines_rejected += 1);
                    continue;
                }
            };

            tokio::select! {
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break 'receive;
                    }
                }
                sent = events.send(event) => {
                    if sent.is_err() {
                        info!("Event channel closed, telemetry listener exiting");
                        break 'receive;
                    }
                    bump(&stats, |s| s.events_forwarded += 1);
                }
            }
        }
    }

    bump(&stats, |s| s.is_running = false);
    debug!("Telemetry listener loop finished");
}
