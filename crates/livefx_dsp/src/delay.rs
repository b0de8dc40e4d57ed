//! Delay - Feedback Echo
//!
//! One ring buffer per channel, read exactly one buffer length behind the
//! write cursor, so the echo spacing is the buffer length:
//!
//! ```text
//! delayed  = buffer[(write - len) mod len]
//! buffer[write] = input + delayed * feedback
//! output   = (1 - wet) * input + wet * delayed
//! ```
//!
//! The buffer length is fixed at construction from `delay_ms`. Changing the
//! delay time afterwards only records the requested value; it does not resize
//! the buffer, so the audible echo spacing stays the constructed one.

use std::sync::Arc;

use crate::block::AudioBlock;
use crate::error::{DspError, DspResult, EffectError, EffectResult};
use crate::param::{flush, mix, AtomicF32, BoundedParam};
use crate::processor::AudioProcessor;

/// Highest feedback gain; keeps the loop strictly decaying
pub const MAX_FEEDBACK: f32 = 0.99;

/// Construction parameters for [`Delay`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayConfig {
    pub delay_ms: f32,
    pub feedback: f32,
    pub wet: f32,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            delay_ms: 200.0,
            feedback: 0.5,
            wet: 0.5,
        }
    }
}

/// Live-adjustable delay parameters, shared with the control plane
#[derive(Debug)]
pub struct DelayParams {
    delay_ms: AtomicF32,
    feedback: BoundedParam,
    wet: BoundedParam,
}

impl DelayParams {
    fn new(config: &DelayConfig) -> Self {
        Self {
            delay_ms: AtomicF32::new(config.delay_ms),
            feedback: BoundedParam::new(config.feedback, 0.0, MAX_FEEDBACK),
            wet: BoundedParam::new(config.wet, 0.0, 1.0),
        }
    }

    /// Last requested delay time in milliseconds
    pub fn delay_ms(&self) -> f32 {
        self.delay_ms.load()
    }

    /// Record a new delay time.
    ///
    /// The ring buffer keeps its constructed length; build a new `Delay` to
    /// change the echo spacing. Non-positive or non-finite values are ignored.
    pub fn set_delay_ms(&self, delay_ms: f32) {
        if delay_ms.is_finite() && delay_ms > 0.0 {
            self.delay_ms.store(delay_ms);
        }
    }

    pub fn feedback(&self) -> f32 {
        self.feedback.get()
    }

    /// Set feedback amount (0.0 - 0.99)
    pub fn set_feedback(&self, feedback: f32) -> f32 {
        self.feedback.set(feedback)
    }

    pub fn wet(&self) -> f32 {
        self.wet.get()
    }

    /// Set wet/dry mix (0.0 = fully dry, 1.0 = fully wet)
    pub fn set_wet(&self, wet: f32) -> f32 {
        self.wet.set(wet)
    }
}

/// Feedback delay with per-channel ring buffers
pub struct Delay {
    params: Arc<DelayParams>,
    buffers: [Vec<f32>; 2],
    write_pos: usize,
    sample_rate: f32,
}

impl Delay {
    /// Create a delay.
    ///
    /// Fails if the delay time or sample rate is not positive, or if the
    /// delay rounds down to zero samples.
    pub fn new(config: DelayConfig, sample_rate: f32) -> DspResult<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }
        if !(config.delay_ms.is_finite() && config.delay_ms > 0.0) {
            return Err(DspError::InvalidDelayTime(config.delay_ms));
        }

        // f64 so that e.g. 200ms @ 48kHz lands on exactly 9600
        let length = (config.delay_ms as f64 * sample_rate as f64 / 1000.0).floor() as usize;
        if length == 0 {
            return Err(DspError::DelayTooShort {
                delay_ms: config.delay_ms,
                sample_rate,
            });
        }

        Ok(Self {
            params: Arc::new(DelayParams::new(&config)),
            buffers: [vec![0.0; length], vec![0.0; length]],
            write_pos: 0,
            sample_rate,
        })
    }

    pub fn params(&self) -> &Arc<DelayParams> {
        &self.params
    }

    /// Ring buffer length in samples (the effective echo spacing)
    pub fn buffer_len(&self) -> usize {
        self.buffers[0].len()
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
}

impl AudioProcessor for Delay {
    fn process(&mut self, block: &mut AudioBlock) -> EffectResult {
        let channels = block.channels();
        if channels > self.buffers.len() {
            return Err(EffectError::UnsupportedChannels(channels));
        }

        let feedback = self.params.feedback();
        let wet = self.params.wet();
        let len = self.buffers[0].len();

        for frame in block.frames_mut() {
            for (buffer, sample) in self.buffers.iter_mut().zip(frame.iter_mut()) {
                let dry = *sample;
                // (write - len) mod len is the cursor itself: read before overwriting
                let delayed = buffer[self.write_pos];
                buffer[self.write_pos] = flush(dry + delayed * feedback);
                *sample = mix(dry, delayed, wet);
            }

            self.write_pos += 1;
            if self.write_pos == len {
                self.write_pos = 0;
            }
        }

        Ok(())
    }

    fn reset(&mut self) {
        for buffer in &mut self.buffers {
            buffer.fill(0.0);
        }
        self.write_pos = 0;
    }

    fn name(&self) -> &'static str {
        "Delay"
    }
}
