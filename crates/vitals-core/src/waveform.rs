//! Fixed-capacity sliding window over ECG samples

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Samples kept for display by default
pub const DEFAULT_WAVEFORM_CAPACITY: usize = 200;

/// FIFO window of the most recent ECG samples, oldest first
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformBuffer {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl WaveformBuffer {
    /// Create an empty buffer holding at most `capacity` samples (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one when full
    pub fn push(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Ordered copy of the current contents
    pub fn snapshot(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently pushed sample
    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.samples.iter()
    }
}

impl Default for WaveformBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_WAVEFORM_CAPACITY)
    }
}

/// Waveform buffer shared between the event path and the presentation path
///
/// Every operation holds the lock for its whole duration, so a snapshot never
/// observes a half-applied push.
#[derive(Debug, Clone, Default)]
pub struct SharedWaveform {
    inner: Arc<Mutex<WaveformBuffer>>,
}

impl SharedWaveform {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(WaveformBuffer::new(capacity))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WaveformBuffer> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, sample: f64) {
        self.lock().push(sample);
    }

    pub fn snapshot(&self) -> Vec<f64> {
        self.lock().snapshot()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    pub fn latest(&self) -> Option<f64> {
        self.lock().latest()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
