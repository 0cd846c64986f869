//! Monitor service: routes classified telemetry to the waveform, the alarm
//! state machine and the session recorder, and publishes display events.
//!
//! The service runs on its own task and owns the recorder; recording
//! commands reach it over a command channel so the session file only ever
//! has one writer.

use crate::config::MonitorConfig;
use crate::listener::{ListenerStats, TelemetryListener};
use crate::recorder::{SessionHandle, SessionRecorder};
use crate::transport::{build_transport, TelemetryTransport};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vitals_core::{
    AlarmMonitor, AlarmState, AlarmTransition, SharedClock, SharedWaveform, TelemetryEvent,
    VitalsError, VitalsResult,
};

/// Events for the presentation layer, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    /// New ECG sample appended to the waveform
    Ecg { value: f64 },
    /// New SpO2 / heart-rate reading and the alarm state it produced
    Vitals {
        spo2: i32,
        heart_rate: i32,
        alarm: AlarmState,
    },
    /// Alarm edge
    Alarm(AlarmTransition),
    RecordingStarted { path: PathBuf },
    RecordingStopped { path: PathBuf },
}

/// Commands for controlling the monitor service
#[derive(Debug)]
pub enum MonitorCommand {
    StartRecording {
        patient_name: String,
        patient_age: String,
        reply: oneshot::Sender<VitalsResult<SessionHandle>>,
    },
    StopRecording {
        reply: oneshot::Sender<VitalsResult<Option<SessionHandle>>>,
    },
    /// Drain queued events, close any recording, and end the task
    Shutdown { reply: oneshot::Sender<()> },
}

/// Statistics about the event path
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorStats {
    pub ecg_samples: u64,
    pub vitals_samples: u64,
    pub alarms_raised: u64,
    pub last_spo2: Option<i32>,
    pub last_heart_rate: Option<i32>,
    pub alarm_state: AlarmState,
    pub recording: bool,
    /// Log writes that failed while a session was open
    pub log_failures: u64,
}

/// Synchronous event path shared by the service task and tests
pub struct MonitorEngine {
    waveform: SharedWaveform,
    alarm: AlarmMonitor,
    recorder: SessionRecorder,
    display: broadcast::Sender<DisplayEvent>,
    stats: Arc<Mutex<MonitorStats>>,
}

impl MonitorEngine {
    pub fn new(config: &MonitorConfig, clock: SharedClock) -> Self {
        let (display, _) = broadcast::channel(config.display_channel_capacity.max(1));
        Self {
            waveform: SharedWaveform::new(config.waveform_capacity),
            alarm: AlarmMonitor::new(config.alarm.clone()),
            recorder: SessionRecorder::new(config.recording.clone(), clock),
            display,
            stats: Arc::new(Mutex::new(MonitorStats::default())),
        }
    }

    /// Apply one event to every consumer
    pub fn handle_event(&mut self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::Ecg { value, .. } => {
                self.waveform.push(value);
                self.record(|recorder| recorder.log_event(&event));
                self.update_stats(|stats| stats.ecg_samples += 1);
                self.publish(DisplayEvent::Ecg { value });
            }
            TelemetryEvent::Vitals {
                spo2, heart_rate, ..
            } => {
                let transition = self.alarm.evaluate(spo2);
                if let Some(transition) = transition {
                    match transition {
                        AlarmTransition::HypoxiaDetected { .. } => {
                            warn!("Hypoxia detected: SpO2 {}%", spo2)
                        }
                        AlarmTransition::Normalized { .. } => {
                            info!("SpO2 back to normal: {}%", spo2)
                        }
                    }
                    self.record(|recorder| recorder.log_transition(&transition));
                }
                self.record(|recorder| recorder.log_event(&event));

                let alarm = self.alarm.state();
                self.update_stats(|stats| {
                    stats.vitals_samples += 1;
                    stats.last_spo2 = Some(spo2);
                    stats.last_heart_rate = Some(heart_rate);
                    stats.alarm_state = alarm;
                    if matches!(transition, Some(AlarmTransition::HypoxiaDetected { .. })) {
                        stats.alarms_raised += 1;
                    }
                });

                if let Some(transition) = transition {
                    self.publish(DisplayEvent::Alarm(transition));
                }
                self.publish(DisplayEvent::Vitals {
                    spo2,
                    heart_rate,
                    alarm,
                });
            }
        }
    }

    pub fn start_recording(
        &mut self,
        patient_name: &str,
        patient_age: &str,
    ) -> VitalsResult<SessionHandle> {
        let handle = self.recorder.start(patient_name, patient_age)?;
        self.update_stats(|stats| stats.recording = true);
        self.publish(DisplayEvent::RecordingStarted {
            path: handle.path.clone(),
        });
        Ok(handle)
    }

    pub fn stop_recording(&mut self) -> VitalsResult<Option<SessionHandle>> {
        let result = self.recorder.stop();
        self.after_close(&result);
        result
    }

    /// Close any active recording with the application-closing marker
    pub fn shutdown(&mut self) -> VitalsResult<Option<SessionHandle>> {
        let result = self.recorder.shutdown();
        self.after_close(&result);
        result
    }

    fn after_close(&mut self, result: &VitalsResult<Option<SessionHandle>>) {
        self.update_stats(|stats| stats.recording = false);
        if let Ok(Some(handle)) = result {
            self.publish(DisplayEvent::RecordingStopped {
                path: handle.path.clone(),
            });
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DisplayEvent> {
        self.display.subscribe()
    }

    pub fn waveform(&self) -> SharedWaveform {
        self.waveform.clone()
    }

    pub fn alarm_state(&self) -> AlarmState {
        self.alarm.state()
    }

    pub fn recorder(&self) -> &SessionRecorder {
        &self.recorder
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn stats_handle(&self) -> Arc<Mutex<MonitorStats>> {
        self.stats.clone()
    }

    fn record(&mut self, write: impl FnOnce(&mut SessionRecorder) -> VitalsResult<()>) {
        if let Err(e) = write(&mut self.recorder) {
            warn!("Session log write failed: {}", e);
            self.update_stats(|stats| stats.log_failures += 1);
        }
    }

    fn publish(&self, event: DisplayEvent) {
        // No subscribers is fine: the display may not be attached yet
        let _ = self.display.send(event);
    }

    fn update_stats<F>(&self, update_fn: F)
    where
        F: FnOnce(&mut MonitorStats),
    {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        update_fn(&mut stats);
    }
}

/// Task wrapper around [`MonitorEngine`]
pub struct MonitorService {
    engine: MonitorEngine,
    event_receiver: mpsc::Receiver<TelemetryEvent>,
    command_receiver: mpsc::Receiver<MonitorCommand>,
}

impl MonitorService {
    /// Create the service and the sender used to control it
    pub fn new(
        engine: MonitorEngine,
        event_receiver: mpsc::Receiver<TelemetryEvent>,
    ) -> (Self, mpsc::Sender<MonitorCommand>) {
        let (command_sender, command_receiver) = mpsc::channel(32);
        let service = Self {
            engine,
            event_receiver,
            command_receiver,
        };
        (service, command_sender)
    }

    /// Main dispatch loop; ends on `Shutdown` or when every command sender is gone
    pub async fn run(mut self) {
        info!("Monitor service started");
        let mut events_open = true;

        loop {
            tokio::select! {
                // Events queued ahead of a command are applied first
                biased;

                event = self.event_receiver.recv(), if events_open => {
                    match event {
                        Some(event) => self.engine.handle_event(event),
                        None => {
                            debug!("Event channel closed");
                            events_open = false;
                        }
                    }
                }

                command = self.command_receiver.recv() => {
                    match command {
                        Some(MonitorCommand::StartRecording { patient_name, patient_age, reply }) => {
                            let result = self.engine.start_recording(&patient_name, &patient_age);
                            if let Err(e) = &result {
                                warn!("Could not start recording: {}", e);
                            }
                            let _ = reply.send(result);
                        }
                        Some(MonitorCommand::StopRecording { reply }) => {
                            let _ = reply.send(self.engine.stop_recording());
                        }
                        Some(MonitorCommand::Shutdown { reply }) => {
                            self.drain_and_close();
                            let _ = reply.send(());
                            break;
                        }
                        None => {
                            info!("Command channel closed");
                            self.drain_and_close();
                            break;
                        }
                    }
                }
            }
        }

        info!("Monitor service stopped");
    }

    fn drain_and_close(&mut self) {
        while let Ok(event) = self.event_receiver.try_recv() {
            self.engine.handle_event(event);
        }
        if let Err(e) = self.engine.shutdown() {
            warn!("Failed to close recording: {}", e);
        }
    }
}

/// Running monitor: listener task, service task, and their handles
pub struct MonitorHandle {
    commands: mpsc::Sender<MonitorCommand>,
    display: broadcast::Sender<DisplayEvent>,
    waveform: SharedWaveform,
    stats: Arc<Mutex<MonitorStats>>,
    listener: TelemetryListener,
    service: JoinHandle<()>,
}

impl MonitorHandle {
    /// Subscribe to display events
    pub fn subscribe(&self) -> broadcast::Receiver<DisplayEvent> {
        self.display.subscribe()
    }

    /// Shared waveform for plotting
    pub fn waveform(&self) -> SharedWaveform {
        self.waveform.clone()
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn listener_stats(&self) -> ListenerStats {
        self.listener.stats()
    }

    pub async fn start_recording(
        &self,
        patient_name: &str,
        patient_age: &str,
    ) -> VitalsResult<SessionHandle> {
        let (reply, response) = oneshot::channel();
        self.send(MonitorCommand::StartRecording {
            patient_name: patient_name.to_string(),
            patient_age: patient_age.to_string(),
            reply,
        })
        .await?;
        response.await.map_err(|_| VitalsError::ChannelClosed { channel: "reply" })?
    }

    pub async fn stop_recording(&self) -> VitalsResult<Option<SessionHandle>> {
        let (reply, response) = oneshot::channel();
        self.send(MonitorCommand::StopRecording { reply }).await?;
        response.await.map_err(|_| VitalsError::ChannelClosed { channel: "reply" })?
    }

    /// Stop the listener, flush queued events, close any recording, and wait
    /// for both tasks to exit
    pub async fn shutdown(self) -> VitalsResult<()> {
        self.listener.stop().await;

        let (reply, response) = oneshot::channel();
        let sent = self
            .commands
            .send(MonitorCommand::Shutdown { reply })
            .await
            .map_err(|_| VitalsError::ChannelClosed { channel: "command" });
        if sent.is_ok() {
            let _ = response.await;
        }
        if let Err(e) = self.service.await {
            warn!("Monitor service task ended abnormally: {}", e);
        }
        sent
    }

    async fn send(&self, command: MonitorCommand) -> VitalsResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| VitalsError::ChannelClosed { channel: "command" })
    }
}

/// Build the configured transport and start listener + service
pub async fn start_monitor(config: MonitorConfig, clock: SharedClock) -> VitalsResult<MonitorHandle> {
    config.validate()?;
    let transport = build_transport(&config.transport).await?;
    Ok(start_monitor_with_transport(config, transport, clock))
}

/// Start listener + service over an existing transport
pub fn start_monitor_with_transport(
    config: MonitorConfig,
    transport: Box<dyn TelemetryTransport>,
    clock: SharedClock,
) -> MonitorHandle {
    let (event_sender, event_receiver) = mpsc::channel(config.event_channel_capacity.max(1));

    let engine = MonitorEngine::new(&config, clock.clone());
    let display = engine.display.clone();
    let waveform = engine.waveform();
    let stats = engine.stats_handle();

    let (service, commands) = MonitorService::new(engine, event_receiver);
    let service = tokio::spawn(service.run());

    let listener = TelemetryListener::spawn(transport, event_sender, clock);

    MonitorHandle {
        commands,
        display,
        waveform,
        stats,
        listener,
        service,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use vitals_core::{Clock, FixedClock};

    fn engine_in(dir: &std::path::Path) -> (MonitorEngine, FixedClock) {
        let clock = FixedClock::new(
            NaiveDate::from_ymd_opt(2024, 3, 5)
                .unwrap()
                .and_hms_opt(14, 30, 0)
                .unwrap(),
        );
        let mut config = MonitorConfig::default();
        config.waveform_capacity = 3;
        config.recording.output_dir = dir.to_path_buf();
        (MonitorEngine::new(&config, Arc::new(clock.clone())), clock)
    }

    fn body_lines(path: &std::path::Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .skip(5)
            .map(|line| line.splitn(2, ',').nth(1).unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_engine_routes_events() {
        let dir = tempfile::tempdir().unwrap();
        let (mut engine, clock) = engine_in(dir.path());
        let mut display = engine.subscribe();

        let handle = engine.start_recording("Maria", "34").unwrap();
        let at = clock.now();
        for spo2 in [95, 85, 85, 85, 95] {
            engine.handle_event(TelemetryEvent::vitals(spo2, 70, at));
        }
        for value in [1.0, 2.0, 3.0, 4.0] {
            engine.handle_event(TelemetryEvent::ecg(value, at));
        }
        engine.stop_recording().unwrap();

        assert_eq!(engine.waveform().snapshot(), vec![2.0, 3.0, 4.0]);
        assert_eq!(engine.alarm_state(), AlarmState::Normal);

        assert_eq!(
            body_lines(&handle.path),
            vec![
                "SYSTEM,RECORDING STARTED,",
                "VITALS,SPO2/HR,95/70",
                "ALARM,HYPOXIA DETECTED,85",
                "VITALS,SPO2/HR,85/70",
                "VITALS,SPO2/HR,85/70",
                "VITALS,SPO2/HR,85/70",
                "INFO,O2 LEVEL NORMALIZED,95",
                "VITALS,SPO2/HR,95/70",
                "ECG,Sample,1.00",
                "ECG,Sample,2.00",
                "ECG,Sample,3.00",
                "ECG,Sample,4.00",
                "SYSTEM,RECORDING STOPPED,",
            ]
        );

        let stats = engine.stats();
        assert_eq!(stats.vitals_samples, 5);
        assert_eq!(stats.ecg_samples, 4);
        assert_eq!(stats.alarms_raised, 1);
        assert!(!stats.recording);

        let mut received = Vec::new();
        while let Ok(event) = display.try_recv() {
            received.push(event);
        }
        assert!(matches!(received[0], DisplayEvent::RecordingStarted { .. }));
        assert_eq!(
            received[2],
            DisplayEvent::Alarm(AlarmTransition::HypoxiaDetected { spo2: 85 })
        );
        assert_eq!(
            received[3],
            DisplayEvent::Vitals {
                spo2: 85,
                heart_rate: 70,
                alarm: AlarmState::Hypoxic
            }
        );
        assert!(matches!(received.last(), Some(DisplayEvent::RecordingStopped { .. })));
    }

    #[test]
    fn test_engine_without_recording_still_updates_state() {
        let dir = tempfile::tempdir().unwrap();
        let (mut engine, clock) = engine_in(dir.path());
        engine.handle_event(TelemetryEvent::vitals(80, 100, clock.now()));
        engine.handle_event(TelemetryEvent::ecg(7.0, clock.now()));

        assert_eq!(engine.alarm_state(), AlarmState::Hypoxic);
        assert_eq!(engine.waveform().snapshot(), vec![7.0]);
        assert_eq!(engine.stats().log_failures, 0);
        assert!(!engine.recorder().is_active());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_engine_shutdown_marks_application_closing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut engine, _clock) = engine_in(dir.path());
        let handle = engine.start_recording("", "").unwrap();
        engine.shutdown().unwrap();
        assert_eq!(
            body_lines(&handle.path).last().unwrap(),
            "SYSTEM,APPLICATION CLOSING,"
        );
        // Second shutdown has nothing to close
        assert_eq!(engine.shutdown().unwrap(), None);
    }

    #[tokio::test]
    async fn test_queued_events_land_before_stop_command() {
        let dir = tempfile::tempdir().unwrap();
        let (mut engine, clock) = engine_in(dir.path());
        let handle = engine.start_recording("Maria", "34").unwrap();

        let (event_tx, event_rx) = mpsc::channel(16);
        for value in 1..=5 {
            event_tx
                .send(TelemetryEvent::ecg(value as f64, clock.now()))
                .await
                .unwrap();
        }

        let (service, commands) = MonitorService::new(engine, event_rx);
        let (reply, response) = oneshot::channel();
        commands
            .send(MonitorCommand::StopRecording { reply })
            .await
            .unwrap();

        let task = tokio::spawn(service.run());
        let closed = response.await.unwrap().unwrap();
        assert_eq!(closed.map(|s| s.path), Some(handle.path.clone()));

        drop(commands);
        task.await.unwrap();

        assert_eq!(
            body_lines(&handle.path),
            vec![
                "SYSTEM,RECORDING STARTED,",
                "ECG,Sample,1.00",
                "ECG,Sample,2.00",
                "ECG,Sample,3.00",
                "ECG,Sample,4.00",
                "ECG,Sample,5.00",
                "SYSTEM,RECORDING STOPPED,",
            ]
        );
    }
}
