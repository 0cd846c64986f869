//! Session recorder: append-only structured log of one monitoring session
//!
//! File layout:
//!
//! ```text
//! === TELEMETRY SYSTEM LOG ===
//! PATIENT: Maria | AGE: 34
//! SESSION START: 2024-03-05 14:30:00
//! ============================
//! TIMESTAMP,TYPE,DETAIL,VALUE
//! 14:30:00.000,SYSTEM,RECORDING STARTED,
//! 14:30:00.004,ECG,Sample,2048.00
//! 14:30:01.002,VITALS,SPO2/HR,97/72
//! ```
//!
//! The recorder is the only writer of the file. It is meant to be owned by a
//! single task; concurrent producers go through the monitor service.

use crate::config::RecordingConfig;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;
use vitals_core::clock::{format_file_stamp, format_log_time};
use vitals_core::{
    AlarmTransition, LocalTimestamp, LogKind, SharedClock, TelemetryEvent, VitalsError,
    VitalsResult,
};

pub const LOG_BANNER: &str = "=== TELEMETRY SYSTEM LOG ===";
pub const LOG_SEPARATOR: &str = "============================";
pub const LOG_COLUMNS: &str = "TIMESTAMP,TYPE,DETAIL,VALUE";

pub const DETAIL_RECORDING_STARTED: &str = "RECORDING STARTED";
pub const DETAIL_RECORDING_STOPPED: &str = "RECORDING STOPPED";
pub const DETAIL_APPLICATION_CLOSING: &str = "APPLICATION CLOSING";

/// Attempts at finding a free file name when one already exists
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Description of an open recording session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionHandle {
    pub id: Uuid,
    pub path: PathBuf,
    pub patient_name: String,
    pub patient_age: String,
    pub started_at: LocalTimestamp,
}

struct ActiveSession {
    handle: SessionHandle,
    writer: BufWriter<File>,
}

/// Owns at most one open session file
pub struct SessionRecorder {
    config: RecordingConfig,
    clock: SharedClock,
    session: Option<ActiveSession>,
}

impl SessionRecorder {
    pub fn new(config: RecordingConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            session: None,
        }
    }

    /// Open a new session file and write its header.
    ///
    /// Fails when a session is already active or the file cannot be created.
    pub fn start(&mut self, patient_name: &str, patient_age: &str) -> VitalsResult<SessionHandle> {
        if let Some(active) = &self.session {
            return Err(VitalsError::SessionAlreadyActive {
                path: active.handle.path.clone(),
            });
        }

        let display_name = non_empty_or(patient_name, &self.config.default_patient_name);
        let patient_age = non_empty_or(patient_age, &self.config.default_patient_age);
        let started_at = self.clock.now();

        let stem = format!(
            "{}_{}_{}",
            self.config.file_prefix,
            normalize_patient_name(&display_name, &self.config.default_patient_name),
            format_file_stamp(&started_at)
        );
        let (path, file) = open_unique(&self.config.output_dir, &stem)?;
        let mut writer = BufWriter::new(file);

        let opening = format_log_line(
            &self.clock.now(),
            LogKind::System,
            DETAIL_RECORDING_STARTED,
            "",
        );
        // Nothing is installed until the preamble is on disk
        let written = write_preamble(
            &mut writer,
            &display_name,
            &patient_age,
            &started_at,
            &opening,
        );
        if let Err(e) = written {
            drop(writer);
            let _ = std::fs::remove_file(&path);
            return Err(VitalsError::io_failure(&path, e));
        }

        let handle = SessionHandle {
            id: Uuid::new_v4(),
            path,
            patient_name: display_name,
            patient_age,
            started_at,
        };
        self.session = Some(ActiveSession {
            handle: handle.clone(),
            writer,
        });

        info!(session = %handle.id, "Recording to {}", handle.path.display());
        Ok(handle)
    }

    /// Append `timestamp,kind,detail,value`; no-op when no session is open
    pub fn log(&mut self, kind: LogKind, detail: &str, value: &str) -> VitalsResult<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        let line = format_log_line(&self.clock.now(), kind, detail, value);
        session
            .writer
            .write_all(line.as_bytes())
            .map_err(|e| VitalsError::io_failure(&session.handle.path, e))
    }

    /// Record a classified telemetry event
    pub fn log_event(&mut self, event: &TelemetryEvent) -> VitalsResult<()> {
        match event {
            TelemetryEvent::Ecg { value, .. } => {
                self.log(LogKind::Ecg, "Sample", &format!("{:.2}", value))
            }
            TelemetryEvent::Vitals {
                spo2, heart_rate, ..
            } => self.log(LogKind::Vitals, "SPO2/HR", &format!("{}/{}", spo2, heart_rate)),
        }
    }

    /// Record an alarm edge
    pub fn log_transition(&mut self, transition: &AlarmTransition) -> VitalsResult<()> {
        self.log(
            transition.log_kind(),
            transition.detail(),
            &transition.spo2().to_string(),
        )
    }

    /// Close the active session with an end-of-recording line.
    ///
    /// Returns the closed session, or `None` when nothing was open.
    pub fn stop(&mut self) -> VitalsResult<Option<SessionHandle>> {
        self.close_with(DETAIL_RECORDING_STOPPED)
    }

    /// Close the active session on application exit
    pub fn shutdown(&mut self) -> VitalsResult<Option<SessionHandle>> {
        self.close_with(DETAIL_APPLICATION_CLOSING)
    }

    fn close_with(&mut self, detail: &str) -> VitalsResult<Option<SessionHandle>> {
        if self.session.is_none() {
            return Ok(None);
        }

        let logged = self.log(LogKind::System, detail, "");
        let Some(mut session) = self.session.take() else {
            return Ok(None);
        };
        let flushed = session
            .writer
            .flush()
            .map_err(|e| VitalsError::io_failure(&session.handle.path, e));

        info!(session = %session.handle.id, "Recording closed: {}", session.handle.path.display());
        logged?;
        flushed?;
        Ok(Some(session.handle))
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn active_session(&self) -> Option<&SessionHandle> {
        self.session.as_ref().map(|s| &s.handle)
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }
}

impl Drop for SessionRecorder {
    fn drop(&mut self) {
        if self.is_active() {
            if let Err(e) = self.shutdown() {
                warn!("Failed to close recording on shutdown: {}", e);
            }
        }
    }
}

/// File-name-safe version of a patient name
///
/// Characters outside `[A-Za-z0-9_-]` become `_`; an empty name falls back to
/// `default`.
pub fn normalize_patient_name(name: &str, default: &str) -> String {
    let trimmed = name.trim();
    let source = if trimmed.is_empty() { default } else { trimmed };
    source
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// One log line including the trailing newline
pub fn format_log_line(at: &LocalTimestamp, kind: LogKind, detail: &str, value: &str) -> String {
    format!(
        "{},{},{},{}\n",
        format_log_time(at),
        kind,
        sanitize_field(detail),
        sanitize_field(value)
    )
}

/// Keep a field from breaking the comma/newline structure
fn sanitize_field(field: &str) -> String {
    field
        .chars()
        .map(|c| match c {
            ',' => ';',
            '\r' | '\n' => ' ',
            other => other,
        })
        .collect()
}

fn non_empty_or(value: &str, default: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Header block plus the opening log line, flushed
fn write_preamble(
    writer: &mut impl Write,
    patient_name: &str,
    patient_age: &str,
    started_at: &LocalTimestamp,
    opening_line: &str,
) -> io::Result<()> {
    writeln!(writer, "{}", LOG_BANNER)?;
    writeln!(writer, "PATIENT: {} | AGE: {}", patient_name, patient_age)?;
    writeln!(writer, "SESSION START: {}", started_at.format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(writer, "{}", LOG_SEPARATOR)?;
    writeln!(writer, "{}", LOG_COLUMNS)?;
    writer.write_all(opening_line.as_bytes())?;
    writer.flush()
}

/// Create `<dir>/<stem>.txt`, or `<stem>_2.txt`, ... if it already exists
fn open_unique(dir: &Path, stem: &str) -> VitalsResult<(PathBuf, File)> {
    std::fs::create_dir_all(dir).map_err(|e| VitalsError::io_failure(dir, e))?;

    let mut last_error = None;
    for attempt in 1..=MAX_NAME_ATTEMPTS {
        let name = if attempt == 1 {
            format!("{}.txt", stem)
        } else {
            format!("{}_{}.txt", stem, attempt)
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => last_error = Some((path, e)),
            Err(e) => return Err(VitalsError::io_failure(path, e)),
        }
    }

    match last_error {
        Some((path, e)) => Err(VitalsError::io_failure(path, e)),
        None => Err(VitalsError::io_failure(
            dir.join(stem),
            io::Error::new(io::ErrorKind::Other, "no file name available"),
        )),
    }
}
