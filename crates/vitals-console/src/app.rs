//! Console presentation layer: turns display events into terminal output

use chrono::Local;
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};
use vitals_core::{AlarmState, AlarmTransition, SharedWaveform};
use vitals_monitor::DisplayEvent;

/// Characters used for the waveform strip, lowest first
const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Samples shown in the status line
const PLOT_WIDTH: usize = 60;

/// Terminal monitor state
pub struct ConsoleApp {
    waveform: SharedWaveform,
    status_interval: Duration,
    last_vitals: Option<(i32, i32)>,
    alarm: AlarmState,
    ecg_since_status: u64,
    missed_events: u64,
}

impl ConsoleApp {
    pub fn new(waveform: SharedWaveform, status_interval: Duration) -> Self {
        Self {
            waveform,
            status_interval,
            last_vitals: None,
            alarm: AlarmState::Normal,
            ecg_since_status: 0,
            missed_events: 0,
        }
    }

    /// Print events until `shutdown` resolves or the monitor goes away
    pub async fn run<F>(mut self, mut display: broadcast::Receiver<DisplayEvent>, shutdown: F)
    where
        F: Future,
    {
        let mut ticker = interval(self.status_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,

                event = display.recv() => match event {
                    Ok(event) => {
                        if let Some(line) = self.on_event(&event) {
                            println!("{}", line);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        self.missed_events += skipped;
                        debug!("Display lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("Monitor stopped publishing");
                        break;
                    }
                },

                _ = ticker.tick() => println!("{}", self.status_line()),
            }
        }

        if self.missed_events > 0 {
            debug!("Display skipped {} events in total", self.missed_events);
        }
    }

    /// Update state; returns a line for events worth printing on their own
    pub fn on_event(&mut self, event: &DisplayEvent) -> Option<String> {
        match event {
            DisplayEvent::Ecg { .. } => {
                self.ecg_since_status += 1;
                None
            }
            DisplayEvent::Vitals {
                spo2,
                heart_rate,
                alarm,
            } => {
                self.last_vitals = Some((*spo2, *heart_rate));
                self.alarm = *alarm;
                None
            }
            DisplayEvent::Alarm(transition) => Some(format_alarm(transition)),
            DisplayEvent::RecordingStarted { path } => {
                Some(format!("[{}] REC  {}", clock_label(), path.display()))
            }
            DisplayEvent::RecordingStopped { path } => {
                Some(format!("[{}] STOP {}", clock_label(), path.display()))
            }
        }
    }

    /// One-line summary: vitals, alarm flag and recent waveform
    pub fn status_line(&mut self) -> String {
        let snapshot = self.waveform.snapshot();
        let start = snapshot.len().saturating_sub(PLOT_WIDTH);
        let line = format!(
            "{} {:>4} smp {}",
            format_vitals(self.last_vitals, self.alarm),
            self.ecg_since_status,
            sparkline(&snapshot[start..])
        );
        self.ecg_since_status = 0;
        line
    }
}

/// Resolves on Ctrl-C, or on SIGTERM where the platform has it.
///
/// Handlers are installed when this is called, so a signal that arrives
/// before the future is first polled is not lost.
pub fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    #[cfg(unix)]
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    Ok(async move {
        #[cfg(unix)]
        tokio::select! {
            _ = tokio::signal::ctrl_c() => debug!("Ctrl-C received"),
            _ = terminate.recv() => debug!("SIGTERM received"),
        }

        #[cfg(not(unix))]
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl-C handler failed: {}", e);
        }
    })
}

fn clock_label() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// `SpO2  97% | HR  72 bpm`, with an alarm flag while hypoxic
pub fn format_vitals(vitals: Option<(i32, i32)>, alarm: AlarmState) -> String {
    let readings = match vitals {
        Some((0, _)) => "SpO2  --  | HR  --    ".to_string(),
        Some((spo2, heart_rate)) => format!("SpO2 {:>3}% | HR {:>3} bpm", spo2, heart_rate),
        None => "waiting for vitals...  ".to_string(),
    };
    match alarm {
        AlarmState::Hypoxic => format!("{} !! HYPOXIA", readings),
        AlarmState::Normal => format!("{}           ", readings),
    }
}

pub fn format_alarm(transition: &AlarmTransition) -> String {
    format!(
        "[{}] {} (SpO2 {}%)",
        clock_label(),
        transition.detail(),
        transition.spo2()
    )
}

/// Scale samples to block characters between their own min and max
pub fn sparkline(samples: &[f64]) -> String {
    let (min, max) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let span = max - min;
    let top = (SPARK_LEVELS.len() - 1) as f64;

    samples
        .iter()
        .map(|&v| {
            let level = if span > 0.0 { ((v - min) / span * top).round() } else { 0.0 };
            SPARK_LEVELS[level as usize]
        })
        .collect()
}
