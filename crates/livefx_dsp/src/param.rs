//! Lock-free effect parameters
//!
//! Parameters are written by the control plane while the audio thread may be
//! in the middle of `process()`. Each one is a single `f32` stored as bits in
//! an `AtomicU32`, so a concurrent read sees either the old or the new value,
//! never a torn one. Structural state (buffer lengths) is never a parameter.

use std::sync::atomic::{AtomicU32, Ordering};

/// An `f32` that can be shared between threads.
///
/// Rust pattern: `AtomicF32` doesn't exist in std, so we bit-cast through `AtomicU32`.
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        // Relaxed is enough: each parameter is an independent value
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// A parameter bounded to `[min, max]`.
///
/// Every write is clamped; non-finite writes are ignored.
#[derive(Debug)]
pub struct BoundedParam {
    value: AtomicF32,
    min: f32,
    max: f32,
}

impl BoundedParam {
    pub fn new(value: f32, min: f32, max: f32) -> Self {
        let initial = if value.is_finite() { value.clamp(min, max) } else { min };
        Self {
            value: AtomicF32::new(initial),
            min,
            max,
        }
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.value.load()
    }

    /// Store a new value, clamped to range. Returns the value actually stored.
    pub fn set(&self, value: f32) -> f32 {
        if !value.is_finite() {
            return self.get();
        }
        let clamped = value.clamp(self.min, self.max);
        self.value.store(clamped);
        clamped
    }

    pub fn range(&self) -> (f32, f32) {
        (self.min, self.max)
    }
}

/// Largest magnitude a feedback loop may hold
pub(crate) const STATE_LIMIT: f32 = 1.0e6;

/// Bound a sample before it is written back into a feedback loop.
///
/// Overflow saturates at [`STATE_LIMIT`] and NaN becomes silence, so one
/// extreme block cannot poison a delay line for every block after it.
#[inline]
pub(crate) fn flush(sample: f32) -> f32 {
    if sample.is_nan() {
        0.0
    } else {
        sample.clamp(-STATE_LIMIT, STATE_LIMIT)
    }
}

/// Wet/dry mix, shared by every effect that blends its output with the input
#[inline]
pub(crate) fn mix(dry: f32, wet_signal: f32, wet: f32) -> f32 {
    let out = (1.0 - wet) * dry + wet * wet_signal;
    // clamp() passes NaN through
    if out.is_nan() {
        0.0
    } else {
        out.clamp(-1.0, 1.0)
    }
}
