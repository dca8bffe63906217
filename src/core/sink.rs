//! Log and progress sink
//!
//! The executor reports through a [`FlashSink`]: one call per log line and
//! one per step started. Implementations must not block.

use std::sync::{Mutex, PoisonError};

/// Receiver of flash log lines and progress
pub trait FlashSink: Send + Sync {
    /// One human-readable log line
    fn log(&self, line: &str);

    /// Step `current` of `total` started; `percent` is `current * 100 / total`
    fn progress(&self, current: usize, total: usize, percent: u8);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl FlashSink for NullSink {
    fn log(&self, _line: &str) {}

    fn progress(&self, _current: usize, _total: usize, _percent: u8) {}
}

/// Progress notification recorded by [`MemorySink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub current: usize,
    pub total: usize,
    pub percent: u8,
}

/// Records everything in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
    progress: Mutex<Vec<ProgressEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log lines received so far
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Progress events received so far
    pub fn progress_events(&self) -> Vec<ProgressEvent> {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether any log line contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|l| l.contains(needle))
    }
}

impl FlashSink for MemorySink {
    fn log(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }

    fn progress(&self, current: usize, total: usize, percent: u8) {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ProgressEvent {
                current,
                total,
                percent,
            });
    }
}

/// Percentage of `current` out of `total`, clamped to 100
pub fn percent(current: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    u8::try_from((current.min(total) * 100) / total).unwrap_or(100)
}
