//! Vitals-Core: Foundation types for the vital-signs telemetry engine
//!
//! Event model, line classifier, waveform window and hypoxia alarm state.
//! Nothing in this crate performs I/O.

pub mod alarm;
pub mod classifier;
pub mod clock;
pub mod error;
pub mod telemetry;
pub mod waveform;

pub use alarm::*;
pub use classifier::{classify, classify_line, classify_payload, split_records, VITALS_PREFIX};
pub use clock::{Clock, FixedClock, LocalTimestamp, SharedClock, SystemClock};
pub use error::{ParseError, TransportError, VitalsError, VitalsResult};
pub use telemetry::*;
pub use waveform::*;
