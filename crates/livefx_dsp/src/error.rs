//! DSP Error Types

use thiserror::Error;

/// Errors raised while constructing or configuring an effect.
///
/// These are rejected up front so that nothing invalid ever reaches the
/// per-sample filter math.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    #[error("Delay time must be positive and finite, got {0}ms")]
    InvalidDelayTime(f32),

    #[error("Sample rate must be positive, got {0}")]
    InvalidSampleRate(f32),

    #[error("Delay of {delay_ms}ms at {sample_rate}Hz is shorter than one sample")]
    DelayTooShort { delay_ms: f32, sample_rate: f32 },

    #[error("FFT size must be a power of two of at least 4, got {0}")]
    InvalidFftSize(usize),
}

/// Result type alias for DSP construction
pub type DspResult<T> = Result<T, DspError>;

/// A fault raised by a single effect invocation.
///
/// Faults never abort the stream: the chain treats the faulting effect as a
/// pass-through for that block. The type is `Copy` and carries no heap data so
/// it can be created and reported from the audio thread.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectError {
    #[error("Unsupported channel count: {0} (effects handle mono or stereo)")]
    UnsupportedChannels(usize),

    #[error("Block shape mismatch: expected {expected} samples, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("Processor failed: {0}")]
    Failed(&'static str),
}

/// Result of processing one block with one effect
pub type EffectResult = Result<(), EffectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DspError::InvalidDelayTime(-5.0);
        assert!(err.to_string().contains("-5"));

        let err = DspError::DelayTooShort {
            delay_ms: 0.001,
            sample_rate: 48000.0,
        };
        assert!(err.to_string().contains("48000"));
    }

    #[test]
    fn test_effect_error_display() {
        let err = EffectError::UnsupportedChannels(6);
        assert!(err.to_string().contains('6'));

        let err = EffectError::Failed("filter blew up");
        assert!(err.to_string().contains("filter blew up"));
    }
}
