//! Engine Metrics
//!
//! Counters written by the audio callback and read by the control plane.
//! Everything is a relaxed atomic: each value is independent, and a snapshot
//! only needs to be roughly consistent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Live counters shared with the block processor
#[derive(Debug, Default)]
pub struct EngineMetrics {
    frames_processed: AtomicU64,
    blocks_processed: AtomicU64,
    underruns: AtomicU64,
    effect_faults: AtomicU64,
    budget_overruns: AtomicU64,
    last_block_nanos: AtomicU64,
    peak_block_nanos: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed block and how long the chain took on it.
    ///
    /// A block that took longer than `budget` (its own playback duration)
    /// counts as an overrun.
    #[inline]
    pub fn record_block(&self, frames: usize, elapsed: Duration, budget: Duration) {
        let nanos = elapsed.as_nanos().min(u64::MAX as u128) as u64;
        self.frames_processed.fetch_add(frames as u64, Ordering::Relaxed);
        self.blocks_processed.fetch_add(1, Ordering::Relaxed);
        self.last_block_nanos.store(nanos, Ordering::Relaxed);
        self.peak_block_nanos.fetch_max(nanos, Ordering::Relaxed);
        if elapsed > budget {
            self.budget_overruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fault(&self) {
        self.effect_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, latency_ms: f32) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            blocks_processed: self.blocks_processed.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            effect_faults: self.effect_faults.load(Ordering::Relaxed),
            budget_overruns: self.budget_overruns.load(Ordering::Relaxed),
            last_block_us: self.last_block_nanos.load(Ordering::Relaxed) as f64 / 1000.0,
            peak_block_us: self.peak_block_nanos.load(Ordering::Relaxed) as f64 / 1000.0,
            latency_ms,
        }
    }
}

/// Point-in-time copy of the engine metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Total frames run through the chain since the engine was created
    pub frames_processed: u64,
    pub blocks_processed: u64,
    /// Input overflows and output underflows reported by the audio binding
    pub underruns: u64,
    /// Failed effect invocations, one per effect per block
    pub effect_faults: u64,
    /// Blocks whose processing took longer than their playback duration
    pub budget_overruns: u64,
    /// Processing time of the most recent block, in microseconds
    pub last_block_us: f64,
    pub peak_block_us: f64,
    /// Nominal round-trip latency (two blocks), in milliseconds
    pub latency_ms: f32,
}
