//! Vitals-Simulation: sensor bridge emulation
//!
//! Generates the ECG and oximeter records the bedside device would send, and
//! streams them over UDP for development without hardware.

pub mod datagram_streamer;
pub mod ecg_simulator;
pub mod vitals_patterns;

pub use datagram_streamer::*;
pub use ecg_simulator::*;
pub use vitals_patterns::*;
