//! Distortion - tanh Waveshaper with Tone Control
//!
//! ```text
//! shaped = tanh(x * drive)
//! state  = state * (1 - c) + shaped * c      c = 0.1 + tone * 0.8
//! y      = clamp(state * level, -1, 1)
//! ```
//!
//! The tone control is a one-pole lowpass after the shaper: low `tone` keeps
//! only the body of the clipped signal, high `tone` lets the harmonics through.
//! The filter state lives per channel and carries across blocks.

use std::sync::Arc;

use crate::block::AudioBlock;
use crate::error::{EffectError, EffectResult};
use crate::param::BoundedParam;
use crate::processor::AudioProcessor;

pub const MIN_DRIVE: f32 = 1.0;
pub const MAX_DRIVE: f32 = 20.0;

/// Construction parameters for [`Distortion`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistortionConfig {
    pub drive: f32,
    pub tone: f32,
    pub level: f32,
}

impl Default for DistortionConfig {
    fn default() -> Self {
        Self {
            drive: 5.0,
            tone: 0.5,
            level: 0.5,
        }
    }
}

#[derive(Debug)]
pub struct DistortionParams {
    drive: BoundedParam,
    tone: BoundedParam,
    level: BoundedParam,
}

impl DistortionParams {
    fn new(config: &DistortionConfig) -> Self {
        Self {
            drive: BoundedParam::new(config.drive, MIN_DRIVE, MAX_DRIVE),
            tone: BoundedParam::new(config.tone, 0.0, 1.0),
            level: BoundedParam::new(config.level, 0.0, 1.0),
        }
    }

    pub fn drive(&self) -> f32 {
        self.drive.get()
    }

    /// Set input gain into the shaper (1.0 - 20.0)
    pub fn set_drive(&self, drive: f32) -> f32 {
        self.drive.set(drive)
    }

    pub fn tone(&self) -> f32 {
        self.tone.get()
    }

    /// Set tone (0.0 = dark, 1.0 = bright)
    pub fn set_tone(&self, tone: f32) -> f32 {
        self.tone.set(tone)
    }

    pub fn level(&self) -> f32 {
        self.level.get()
    }

    pub fn set_level(&self, level: f32) -> f32 {
        self.level.set(level)
    }
}

/// Waveshaping distortion. Has no dry path, so there is no wet control.
pub struct Distortion {
    params: Arc<DistortionParams>,
    filter_state: [f32; 2],
}

impl Distortion {
    pub fn new(config: DistortionConfig) -> Self {
        Self {
            params: Arc::new(DistortionParams::new(&config)),
            filter_state: [0.0; 2],
        }
    }

    pub fn params(&self) -> &Arc<DistortionParams> {
        &self.params
    }
}

impl Default for Distortion {
    fn default() -> Self {
        Self::new(DistortionConfig::default())
    }
}

impl AudioProcessor for Distortion {
    fn process(&mut self, block: &mut AudioBlock) -> EffectResult {
        let channels = block.channels();
        if channels > self.filter_state.len() {
            return Err(EffectError::UnsupportedChannels(channels));
        }

        let drive = self.params.drive();
        let level = self.params.level();
        let coef = 0.1 + self.params.tone() * 0.8;

        for frame in block.frames_mut() {
            for (state, sample) in self.filter_state.iter_mut().zip(frame.iter_mut()) {
                let shaped = (*sample * drive).tanh();
                *state = *state * (1.0 - coef) + shaped * coef;
                *sample = (*state * level).clamp(-1.0, 1.0);
            }
        }

        Ok(())
    }

    fn reset(&mut self) {
        self.filter_state = [0.0; 2];
    }

    fn name(&self) -> &'static str {
        "Distortion"
    }
}
