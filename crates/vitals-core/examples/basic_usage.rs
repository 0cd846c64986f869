//! Basic usage of the vitals core types
//!
//! Classifies a captured datagram, feeds the waveform window and the hypoxia
//! alarm, and prints what a display would show.

use vitals_core::{classify_payload, AlarmMonitor, Clock, SystemClock, TelemetryEvent, WaveformBuffer};

fn main() {
    println!("=== Vitals-Core Basic Usage ===\n");

    let clock = SystemClock;
    let datagram = "2010\n2055\n2301\nS:97,72\n2150\nS:86,75\nnoise\nS:86,76\nS:95,74\n";

    let mut waveform = WaveformBuffer::new(4);
    let mut alarm = AlarmMonitor::default();

    for event in classify_payload(datagram, clock.now()) {
        match event {
            TelemetryEvent::Ecg { value, .. } => {
                waveform.push(value);
                println!("ECG sample {:>8.2}   window {:?}", value, waveform.snapshot());
            }
            TelemetryEvent::Vitals { spo2, heart_rate, .. } => {
                println!("Vitals SpO2 {}% HR {} bpm", spo2, heart_rate);
                if let Some(transition) = alarm.evaluate(spo2) {
                    println!("  -> {} {} ({})", transition.log_kind(), transition.detail(), transition.spo2());
                }
            }
        }
    }

    println!("\nFinal alarm state: {}", alarm.state());
}
