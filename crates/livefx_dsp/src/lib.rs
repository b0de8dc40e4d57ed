//! livefx DSP - Digital Signal Processing Module
//!
//! This crate provides the effect side of livefx:
//! - Feedback delay with per-channel ring buffers
//! - Schroeder reverb (8 damped combs into 4 all-passes)
//! - tanh waveshaping distortion with a one-pole tone filter
//! - LFO-modulated chorus with quadrature stereo sweep
//! - An ordered, mutex-guarded effect chain with bypass and fault isolation
//! - FFT spectrum analysis for visualization consumers
//!
//! # Architecture
//!
//! The processing path follows a strict "no allocation in audio callback" rule.
//! Buffers are sized when an effect is built; live parameters are single
//! atomics that the control plane can write while a block is in flight.

mod block;
mod chain;
mod chorus;
mod delay;
mod distortion;
mod effect;
mod error;
mod param;
mod processor;
mod reverb;
mod spectrum;

pub use block::AudioBlock;
pub use chain::{ChainReport, EffectChain};
pub use chorus::{Chorus, ChorusConfig, ChorusParams};
pub use delay::{Delay, DelayConfig, DelayParams, MAX_FEEDBACK};
pub use distortion::{Distortion, DistortionConfig, DistortionParams, MAX_DRIVE, MIN_DRIVE};
pub use effect::{
    Effect, EffectControls, EffectHandle, EffectId, EffectKind, EffectStatus, ProcessOutcome,
};
pub use error::{DspError, DspResult, EffectError, EffectResult};
pub use param::{AtomicF32, BoundedParam};
pub use processor::AudioProcessor;
pub use reverb::{Reverb, ReverbConfig, ReverbParams, ALLPASS_TUNING, COMB_TUNING};
pub use spectrum::{SpectrumAnalyzer, DEFAULT_FFT_SIZE, MIN_FFT_SIZE};
