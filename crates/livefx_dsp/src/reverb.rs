//! Reverb - Room Simulation via Delay Networks
//!
//! Classic Schroeder topology: eight comb filters in parallel feed four
//! all-pass filters in series.
//!
//! ```text
//! Input ──┬──→ [Comb 1] ──┐
//!         ├──→ [Comb 2] ──┤
//!         │      ...      ├──→ (÷8) ──→ [AP 1] → [AP 2] → [AP 3] → [AP 4] ──→ Output
//!         └──→ [Comb 8] ──┘
//! ```
//!
//! ## Comb filters
//!
//! Each comb reads its delayed sample, runs it through a one-pole lowpass
//! (the damping state), and writes `input + state * 0.84` back. The comb
//! output is the delayed sample *before* damping.
//!
//! ## All-pass filters
//!
//! ```text
//! buffer[n] = x + 0.5 * delayed
//! y         = delayed - 0.5 * x
//! ```
//!
//! ## Parameters
//!
//! - **Room Size**: scales the comb delay lengths by `0.5 + room * 1.5`.
//!   The lengths are structural, so they are fixed when the reverb is built.
//! - **Damping**: high-frequency absorption in the comb feedback (live).
//! - **Wet**: dry/wet mix (live).

use std::sync::Arc;

use crate::block::AudioBlock;
use crate::error::{DspError, DspResult, EffectError, EffectResult};
use crate::param::{flush, mix, BoundedParam};
use crate::processor::AudioProcessor;

/// Comb delay lengths in samples at room size 0.33 (scale factor 1.0)
pub const COMB_TUNING: [usize; 8] = [1557, 1617, 1491, 1422, 1277, 1356, 1188, 1116];

/// All-pass delay lengths in samples
pub const ALLPASS_TUNING: [usize; 4] = [225, 556, 441, 341];

const COMB_FEEDBACK: f32 = 0.84;
const ALLPASS_FEEDBACK: f32 = 0.5;

/// Construction parameters for [`Reverb`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverbConfig {
    pub room_size: f32,
    pub damping: f32,
    pub wet: f32,
}

impl Default for ReverbConfig {
    fn default() -> Self {
        Self {
            room_size: 0.5,
            damping: 0.5,
            wet: 0.3,
        }
    }
}

/// Live-adjustable reverb parameters
#[derive(Debug)]
pub struct ReverbParams {
    room_size: BoundedParam,
    damping: BoundedParam,
    wet: BoundedParam,
}

impl ReverbParams {
    fn new(config: &ReverbConfig) -> Self {
        Self {
            room_size: BoundedParam::new(config.room_size, 0.0, 1.0),
            damping: BoundedParam::new(config.damping, 0.0, 1.0),
            wet: BoundedParam::new(config.wet, 0.0, 1.0),
        }
    }

    pub fn room_size(&self) -> f32 {
        self.room_size.get()
    }

    /// Record a room size (0.0 = small, 1.0 = large).
    ///
    /// Comb lengths keep their constructed values.
    pub fn set_room_size(&self, room_size: f32) -> f32 {
        self.room_size.set(room_size)
    }

    pub fn damping(&self) -> f32 {
        self.damping.get()
    }

    /// Set damping amount (0.0 = bright, 1.0 = dark)
    pub fn set_damping(&self, damping: f32) -> f32 {
        self.damping.set(damping)
    }

    pub fn wet(&self) -> f32 {
        self.wet.get()
    }

    /// Set wet/dry mix (0.0 = fully dry, 1.0 = fully wet)
    pub fn set_wet(&self, wet: f32) -> f32 {
        self.wet.set(wet)
    }
}

/// Feedback comb with a one-pole lowpass in the loop
struct CombFilter {
    buffer: Vec<f32>,
    pos: usize,
    damping_state: f32,
}

impl CombFilter {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            pos: 0,
            damping_state: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, damping: f32) -> f32 {
        let delayed = self.buffer[self.pos];

        self.damping_state = delayed * (1.0 - damping) + self.damping_state * damping;
        self.buffer[self.pos] = flush(input + self.damping_state * COMB_FEEDBACK);

        self.pos += 1;
        if self.pos == self.buffer.len() {
            self.pos = 0;
        }

        delayed
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
        self.damping_state = 0.0;
    }
}

struct AllpassFilter {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllpassFilter {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.pos];
        self.buffer[self.pos] = flush(input + delayed * ALLPASS_FEEDBACK);

        self.pos += 1;
        if self.pos == self.buffer.len() {
            self.pos = 0;
        }

        delayed - input * ALLPASS_FEEDBACK
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

/// One channel's complete filter network
struct ReverbChannel {
    combs: [CombFilter; 8],
    allpasses: [AllpassFilter; 4],
}

impl ReverbChannel {
    fn new(comb_lengths: &[usize; 8]) -> Self {
        Self {
            combs: core::array::from_fn(|i| CombFilter::new(comb_lengths[i])),
            allpasses: core::array::from_fn(|i| AllpassFilter::new(ALLPASS_TUNING[i])),
        }
    }

    #[inline]
    fn process(&mut self, input: f32, damping: f32) -> f32 {
        let mut sum = 0.0;
        for comb in &mut self.combs {
            sum += comb.process(input, damping);
        }

        let mut output = flush(sum / self.combs.len() as f32);
        for allpass in &mut self.allpasses {
            output = allpass.process(output);
        }
        output
    }

    fn reset(&mut self) {
        for comb in &mut self.combs {
            comb.reset();
        }
        for allpass in &mut self.allpasses {
            allpass.reset();
        }
    }
}

/// Comb lengths for a room size, rounded to whole samples
pub fn comb_lengths(room_size: f32) -> [usize; 8] {
    let scale = 0.5 + room_size.clamp(0.0, 1.0) * 1.5;
    core::array::from_fn(|i| ((COMB_TUNING[i] as f32 * scale).round() as usize).max(1))
}

/// Schroeder reverb with independent left/right filter networks
pub struct Reverb {
    params: Arc<ReverbParams>,
    channels: [ReverbChannel; 2],
    comb_lengths: [usize; 8],
    sample_rate: f32,
}

impl Reverb {
    pub fn new(config: ReverbConfig, sample_rate: f32) -> DspResult<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }

        let params = Arc::new(ReverbParams::new(&config));
        let lengths = comb_lengths(params.room_size());

        Ok(Self {
            params,
            channels: [ReverbChannel::new(&lengths), ReverbChannel::new(&lengths)],
            comb_lengths: lengths,
            sample_rate,
        })
    }

    pub fn params(&self) -> &Arc<ReverbParams> {
        &self.params
    }

    /// Comb delay lengths fixed at construction
    pub fn comb_lengths(&self) -> &[usize; 8] {
        &self.comb_lengths
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
}

impl AudioProcessor for Reverb {
    fn process(&mut self, block: &mut AudioBlock) -> EffectResult {
        let channels = block.channels();
        if channels > self.channels.len() {
            return Err(EffectError::UnsupportedChannels(channels));
        }

        let damping = self.params.damping();
        let wet = self.params.wet();

        for frame in block.frames_mut() {
            for (network, sample) in self.channels.iter_mut().zip(frame.iter_mut()) {
                let dry = *sample;
                let reverberated = network.process(dry, damping);
                *sample = mix(dry, reverberated, wet);
            }
        }

        Ok(())
    }

    fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
    }

    fn name(&self) -> &'static str {
        "Reverb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comb_lengths_follow_room_size() {
        assert_eq!(comb_lengths(0.0)[0], 779); // 1557 * 0.5 = 778.5
        assert_eq!(comb_lengths(1.0)[0], 3114);
        let medium = comb_lengths(0.5);
        assert_eq!(medium[7], 1395); // 1116 * 1.25
    }

    #[test]
    fn test_comb_output_is_pre_damping() {
        let mut comb = CombFilter::new(4);

        // Impulse goes into the buffer, nothing comes out yet
        assert_eq!(comb.process(1.0, 0.5), 0.0);
        for _ in 0..3 {
            assert_eq!(comb.process(0.0, 0.5), 0.0);
        }

        // Raw delayed sample, not the damped one
        assert_eq!(comb.process(0.0, 0.5), 1.0);
        // Feedback written back: damping state 0.5, times 0.84
        assert!((comb.buffer[0] - 0.42).abs() < 1e-6);
    }

    #[test]
    fn test_allpass_difference_equation() {
        let mut allpass = AllpassFilter::new(2);
        assert_eq!(allpass.process(1.0), -0.5);
        assert_eq!(allpass.process(0.0), 0.0);
        // The impulse comes back around: delayed 1.0
        assert_eq!(allpass.process(0.0), 1.0);
    }

    #[test]
    fn test_reverb_produces_tail() {
        let mut reverb = Reverb::new(
            ReverbConfig {
                wet: 1.0,
                ..Default::default()
            },
            48000.0,
        )
        .unwrap();

        let mut block = AudioBlock::new(8192, 1);
        block.set_sample(0, 0, 1.0);
        reverb.process(&mut block).unwrap();

        let longest = *reverb.comb_lengths().iter().max().unwrap();
        let tail_energy: f32 = block.as_slice()[longest..].iter().map(|s| s * s).sum();
        assert!(tail_energy > 0.0, "reverb should ring after the longest comb");
    }

    #[test]
    fn test_wet_zero_is_dry() {
        let mut reverb = Reverb::new(
            ReverbConfig {
                wet: 0.0,
                ..Default::default()
            },
            48000.0,
        )
        .unwrap();

        let input: Vec<f32> = (0..6000).map(|i| (i as f32 * 0.013).sin() * 0.9).collect();
        let mut block = AudioBlock::from_mono(&input);
        reverb.process(&mut block).unwrap();
        assert_eq!(block.as_slice(), input.as_slice());
    }

    #[test]
    fn test_output_stays_in_range() {
        let mut reverb = Reverb::new(
            ReverbConfig {
                room_size: 1.0,
                damping: 0.0,
                wet: 1.0,
            },
            48000.0,
        )
        .unwrap();

        let mut block = AudioBlock::from_interleaved(
            (0..16384).map(|i| if i % 3 == 0 { 1.0 } else { -1.0 }).collect(),
            2,
        );
        reverb.process(&mut block).unwrap();
        assert!(block.as_slice().iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_stereo_channels_independent() {
        let mut reverb = Reverb::new(
            ReverbConfig {
                wet: 1.0,
                ..Default::default()
            },
            48000.0,
        )
        .unwrap();

        // Signal only on the left; the right network must stay silent
        let left: Vec<f32> = (0..4000).map(|i| (i as f32 * 0.02).sin() * 0.5).collect();
        let right = vec![0.0; 4000];
        let mut block = AudioBlock::from_stereo(&left, &right);
        reverb.process(&mut block).unwrap();

        assert!(block.channel_iter(1).all(|s| s == 0.0));
        assert!(block.channel_iter(0).any(|s| s != 0.0));
    }

    #[test]
    fn test_block_boundaries_are_seamless() {
        let config = ReverbConfig::default();
        let input: Vec<f32> = (0..6000).map(|i| ((i % 97) as f32 / 48.5) - 1.0).collect();

        let mut whole = Reverb::new(config, 48000.0).unwrap();
        let mut reference = AudioBlock::from_mono(&input);
        whole.process(&mut reference).unwrap();

        let mut sliced = Reverb::new(config, 48000.0).unwrap();
        let mut output = Vec::new();
        for chunk in input.chunks(333) {
            let mut block = AudioBlock::from_mono(chunk);
            sliced.process(&mut block).unwrap();
            output.extend_from_slice(block.as_slice());
        }

        assert_eq!(reference.as_slice(), output.as_slice());
    }

    #[test]
    fn test_room_size_setter_keeps_lengths() {
        let reverb = Reverb::new(ReverbConfig::default(), 48000.0).unwrap();
        let before = *reverb.comb_lengths();
        assert_eq!(reverb.params().set_room_size(3.0), 1.0);
        assert_eq!(*reverb.comb_lengths(), before);
    }

    #[test]
    fn test_reset_silences_tail() {
        let mut reverb = Reverb::new(ReverbConfig::default(), 48000.0).unwrap();
        let mut block = AudioBlock::from_mono(&[0.8; 2048]);
        reverb.process(&mut block).unwrap();

        reverb.reset();
        let mut silence = AudioBlock::new(4096, 1);
        reverb.process(&mut silence).unwrap();
        assert!(silence.as_slice().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_extreme_input_never_poisons_tail() {
        let mut reverb = Reverb::new(ReverbConfig::default(), 48000.0).unwrap();

        for extreme in [f32::MAX / 2.0, f32::MAX, -f32::MAX] {
            let mut block = AudioBlock::from_mono(&[extreme; 8192]);
            reverb.process(&mut block).unwrap();
            assert!(block.as_slice().iter().all(|s| (-1.0..=1.0).contains(s)));
        }

        // Ordinary audio afterwards still comes out as numbers
        let mut quiet = AudioBlock::from_mono(&[0.1; 4096]);
        reverb.process(&mut quiet).unwrap();
        assert!(quiet.as_slice().iter().all(|s| (-1.0..=1.0).contains(s)));
    }
}
