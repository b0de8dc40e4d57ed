//! Chorus - LFO-Modulated Delay
//!
//! Each channel reads its delay buffer at a position swept by a sine LFO
//! around a ~20ms base delay:
//!
//! ```text
//! lfo_l   = sin(phase)
//! lfo_r   = sin(phase + π/2)          // quadrature for stereo width
//! delay   = base + lfo * depth * base * 0.5
//! delayed = lerp(buffer, write - delay)
//! buffer[write] = x                   // no feedback
//! y       = (1 - wet) * x + wet * delayed
//! ```
//!
//! The LFO phase and write cursor carry across blocks, so the sweep is
//! continuous regardless of block size.

use std::f32::consts::{FRAC_PI_2, TAU};
use std::sync::Arc;

use crate::block::AudioBlock;
use crate::error::{DspError, DspResult, EffectError, EffectResult};
use crate::param::{flush, mix, BoundedParam};
use crate::processor::AudioProcessor;

/// Delay buffer length in seconds
pub const MAX_DELAY_SECONDS: f64 = 0.05;

/// Centre of the LFO sweep in seconds
pub const BASE_DELAY_SECONDS: f64 = 0.02;

/// Construction parameters for [`Chorus`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChorusConfig {
    pub rate_hz: f32,
    pub depth: f32,
    pub wet: f32,
}

impl Default for ChorusConfig {
    fn default() -> Self {
        Self {
            rate_hz: 1.5,
            depth: 0.3,
            wet: 0.5,
        }
    }
}

#[derive(Debug)]
pub struct ChorusParams {
    rate_hz: BoundedParam,
    depth: BoundedParam,
    wet: BoundedParam,
}

impl ChorusParams {
    fn new(config: &ChorusConfig) -> Self {
        Self {
            rate_hz: BoundedParam::new(config.rate_hz, 0.1, 10.0),
            depth: BoundedParam::new(config.depth, 0.0, 1.0),
            wet: BoundedParam::new(config.wet, 0.0, 1.0),
        }
    }

    pub fn rate_hz(&self) -> f32 {
        self.rate_hz.get()
    }

    /// Set LFO rate in Hz (0.1 - 10.0)
    pub fn set_rate_hz(&self, rate_hz: f32) -> f32 {
        self.rate_hz.set(rate_hz)
    }

    pub fn depth(&self) -> f32 {
        self.depth.get()
    }

    /// Set modulation depth (0.0 = no modulation, 1.0 = maximum)
    pub fn set_depth(&self, depth: f32) -> f32 {
        self.depth.set(depth)
    }

    pub fn wet(&self) -> f32 {
        self.wet.get()
    }

    /// Set wet/dry mix (0.0 = fully dry, 1.0 = fully wet)
    pub fn set_wet(&self, wet: f32) -> f32 {
        self.wet.set(wet)
    }
}

pub struct Chorus {
    params: Arc<ChorusParams>,
    buffers: [Vec<f32>; 2],
    write_pos: usize,
    phase: f32,
    base_delay: f32,
    sample_rate: f32,
}

impl Chorus {
    /// Create a chorus.
    ///
    /// Fails if the sample rate is too low to hold a two-sample buffer.
    pub fn new(config: ChorusConfig, sample_rate: f32) -> DspResult<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }

        let length = (MAX_DELAY_SECONDS * sample_rate as f64).floor() as usize;
        if length < 2 {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }
        let base_delay = (BASE_DELAY_SECONDS * sample_rate as f64).floor() as f32;

        Ok(Self {
            params: Arc::new(ChorusParams::new(&config)),
            buffers: [vec![0.0; length], vec![0.0; length]],
            write_pos: 0,
            phase: 0.0,
            base_delay,
            sample_rate,
        })
    }

    pub fn params(&self) -> &Arc<ChorusParams> {
        &self.params
    }

    pub fn buffer_len(&self) -> usize {
        self.buffers[0].len()
    }

    /// Centre delay in samples
    pub fn base_delay(&self) -> f32 {
        self.base_delay
    }

    /// Current LFO phase in radians, always in `[0, 2π)`
    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Linear interpolation at a fractional position behind the cursor
    #[inline]
    fn read_interpolated(buffer: &[f32], write_pos: usize, delay: f32) -> f32 {
        let len = buffer.len();
        let position = (write_pos as f32 - delay).rem_euclid(len as f32);

        // rem_euclid can round up to exactly `len` for tiny negative inputs
        let index = (position as usize).min(len - 1);
        let next = (index + 1) % len;
        let frac = position - index as f32;

        buffer[index] * (1.0 - frac) + buffer[next] * frac
    }
}

impl AudioProcessor for Chorus {
    fn process(&mut self, block: &mut AudioBlock) -> EffectResult {
        let channels = block.channels();
        if channels > self.buffers.len() {
            return Err(EffectError::UnsupportedChannels(channels));
        }

        let depth = self.params.depth();
        let wet = self.params.wet();
        let increment = TAU * self.params.rate_hz() / self.sample_rate;
        let sweep = depth * self.base_delay * 0.5;
        let len = self.buffers[0].len();

        for frame in block.frames_mut() {
            let lfo = [self.phase.sin(), (self.phase + FRAC_PI_2).sin()];

            for ((buffer, sample), lfo) in self.buffers.iter_mut().zip(frame.iter_mut()).zip(lfo) {
                let dry = *sample;
                let delay = self.base_delay + lfo * sweep;
                let delayed = Self::read_interpolated(buffer, self.write_pos, delay);
                buffer[self.write_pos] = flush(dry);
                *sample = mix(dry, delayed, wet);
            }

            self.write_pos += 1;
            if self.write_pos == len {
                self.write_pos = 0;
            }
            self.phase = (self.phase + increment) % TAU;
        }

        Ok(())
    }

    fn reset(&mut self) {
        for buffer in &mut self.buffers {
            buffer.fill(0.0);
        }
        self.write_pos = 0;
        self.phase = 0.0;
    }

    fn name(&self) -> &'static str {
        "Chorus"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_geometry() {
        let chorus = Chorus::new(ChorusConfig::default(), 48000.0).unwrap();
        assert_eq!(chorus.buffer_len(), 2400);
        assert_eq!(chorus.base_delay(), 960.0);

        let chorus = Chorus::new(ChorusConfig::default(), 44100.0).unwrap();
        assert_eq!(chorus.buffer_len(), 2205);
        assert_eq!(chorus.base_delay(), 882.0);
    }

    #[test]
    fn test_rejects_unusable_sample_rate() {
        assert!(Chorus::new(ChorusConfig::default(), 0.0).is_err());
        assert!(Chorus::new(ChorusConfig::default(), 20.0).is_err());
    }

    #[test]
    fn test_zero_depth_is_fixed_delay() {
        let mut chorus = Chorus::new(
            ChorusConfig {
                rate_hz: 2.0,
                depth: 0.0,
                wet: 1.0,
            },
            1000.0,
        )
        .unwrap();
        // 50 sample buffer, 20 sample base delay
        assert_eq!(chorus.buffer_len(), 50);

        let mut block = AudioBlock::new(40, 1);
        block.set_sample(0, 0, 1.0);
        chorus.process(&mut block).unwrap();

        for frame in 0..40 {
            let expected = if frame == 20 { 1.0 } else { 0.0 };
            assert!(
                (block.sample(frame, 0) - expected).abs() < 1e-6,
                "frame {}: {}",
                frame,
                block.sample(frame, 0)
            );
        }
    }

    #[test]
    fn test_interpolation_between_samples() {
        let buffer = [0.0, 1.0, 0.0, 0.0];
        // write at 3, delay 1.5 → position 1.5
        let value = Chorus::read_interpolated(&buffer, 3, 1.5);
        assert!((value - 0.5).abs() < 1e-6);

        // Wraps: write at 0, delay 3 → position 1
        let value = Chorus::read_interpolated(&buffer, 0, 3.0);
        assert!((value - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_phase_wraps() {
        let mut chorus = Chorus::new(
            ChorusConfig {
                rate_hz: 10.0,
                ..Default::default()
            },
            8000.0,
        )
        .unwrap();

        let mut block = AudioBlock::new(8000, 2);
        chorus.process(&mut block).unwrap();
        assert!(chorus.phase() >= 0.0 && chorus.phase() < TAU);
    }

    #[test]
    fn test_wet_zero_is_dry() {
        let mut chorus = Chorus::new(
            ChorusConfig {
                wet: 0.0,
                ..Default::default()
            },
            48000.0,
        )
        .unwrap();

        let input: Vec<f32> = (0..4096).map(|i| (i as f32 * 0.021).sin() * 0.7).collect();
        let mut block = AudioBlock::from_mono(&input);
        chorus.process(&mut block).unwrap();
        assert_eq!(block.as_slice(), input.as_slice());
    }

    #[test]
    fn test_stereo_lfo_offset() {
        let mut chorus = Chorus::new(
            ChorusConfig {
                rate_hz: 5.0,
                depth: 1.0,
                wet: 1.0,
            },
            8000.0,
        )
        .unwrap();

        // Same signal on both sides; quadrature LFOs pull them apart
        let signal: Vec<f32> = (0..4000).map(|i| (i as f32 * 0.3).sin() * 0.5).collect();
        let mut block = AudioBlock::from_stereo(&signal, &signal);
        chorus.process(&mut block).unwrap();

        assert_ne!(block.channel_to_vec(0), block.channel_to_vec(1));
    }

    #[test]
    fn test_mono_uses_left_path() {
        let config = ChorusConfig {
            rate_hz: 3.0,
            depth: 0.8,
            wet: 0.7,
        };
        let signal: Vec<f32> = (0..3000).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();

        let mut mono = Chorus::new(config, 16000.0).unwrap();
        let mut mono_block = AudioBlock::from_mono(&signal);
        mono.process(&mut mono_block).unwrap();

        let mut stereo = Chorus::new(config, 16000.0).unwrap();
        let mut stereo_block = AudioBlock::from_stereo(&signal, &vec![0.0; signal.len()]);
        stereo.process(&mut stereo_block).unwrap();

        assert_eq!(mono_block.as_slice(), stereo_block.channel_to_vec(0).as_slice());
    }

    #[test]
    fn test_block_boundaries_are_seamless() {
        let config = ChorusConfig {
            rate_hz: 4.0,
            depth: 0.9,
            wet: 0.5,
        };
        let input: Vec<f32> = (0..6000).map(|i| ((i % 61) as f32 / 30.5) - 1.0).collect();

        let mut whole = Chorus::new(config, 22050.0).unwrap();
        let mut reference = AudioBlock::from_interleaved(input.clone(), 2);
        whole.process(&mut reference).unwrap();

        let mut sliced = Chorus::new(config, 22050.0).unwrap();
        let mut output = Vec::new();
        for chunk in input.chunks(2 * 129) {
            let mut block = AudioBlock::from_interleaved(chunk.to_vec(), 2);
            sliced.process(&mut block).unwrap();
            output.extend_from_slice(block.as_slice());
        }

        assert_eq!(reference.as_slice(), output.as_slice());
    }

    #[test]
    fn test_setters_clamp() {
        let chorus = Chorus::new(ChorusConfig::default(), 48000.0).unwrap();
        assert_eq!(chorus.params().set_rate_hz(0.0), 0.1);
        assert_eq!(chorus.params().set_rate_hz(50.0), 10.0);
        assert_eq!(chorus.params().set_depth(1.5), 1.0);
        assert_eq!(chorus.params().set_wet(-3.0), 0.0);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut chorus = Chorus::new(ChorusConfig::default(), 8000.0).unwrap();
        let mut block = AudioBlock::from_mono(&[0.5; 512]);
        chorus.process(&mut block).unwrap();

        chorus.reset();
        assert_eq!(chorus.phase(), 0.0);
        let mut silence = AudioBlock::new(512, 1);
        chorus.process(&mut silence).unwrap();
        assert!(silence.as_slice().iter().all(|s| *s == 0.0));
    }
}
