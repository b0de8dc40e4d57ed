//! Audio Block
//!
//! A fixed-shape chunk of interleaved `f32` audio: `frames × channels`.
//!
//! Buffer format is interleaved: [L0, R0, L1, R1, ...] for stereo,
//! [S0, S1, S2, ...] for mono. The shape is preserved end-to-end through the
//! chain, so a mono block stays mono.

/// Interleaved audio buffer with a fixed channel count
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioBlock {
    data: Vec<f32>,
    channels: usize,
}

impl AudioBlock {
    /// Create a silent block
    pub fn new(frames: usize, channels: usize) -> Self {
        let channels = channels.max(1);
        Self {
            data: vec![0.0; frames * channels],
            channels,
        }
    }

    /// Wrap interleaved samples.
    ///
    /// A trailing partial frame is dropped.
    pub fn from_interleaved(mut data: Vec<f32>, channels: usize) -> Self {
        let channels = channels.max(1);
        let whole = data.len() - data.len() % channels;
        data.truncate(whole);
        Self { data, channels }
    }

    /// Build a single-column block
    pub fn from_mono(samples: &[f32]) -> Self {
        Self {
            data: samples.to_vec(),
            channels: 1,
        }
    }

    /// Build a stereo block from two equally long channels
    pub fn from_stereo(left: &[f32], right: &[f32]) -> Self {
        debug_assert_eq!(left.len(), right.len(), "Channel buffers must be same length");
        let mut data = Vec::with_capacity(left.len() * 2);
        for (l, r) in left.iter().zip(right.iter()) {
            data.push(*l);
            data.push(*r);
        }
        Self { data, channels: 2 }
    }

    pub fn frames(&self) -> usize {
        self.data.len() / self.channels
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Total number of samples (frames × channels)
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        self.data[frame * self.channels + channel]
    }

    #[inline]
    pub fn set_sample(&mut self, frame: usize, channel: usize, value: f32) {
        self.data[frame * self.channels + channel] = value;
    }

    /// Iterate over one channel's samples
    pub fn channel_iter(&self, channel: usize) -> impl Iterator<Item = f32> + '_ {
        self.data
            .iter()
            .skip(channel)
            .step_by(self.channels)
            .copied()
    }

    /// Copy one channel out into a new vector
    pub fn channel_to_vec(&self, channel: usize) -> Vec<f32> {
        self.channel_iter(channel).collect()
    }

    /// Mutable frames, one slice of `channels` samples per frame
    pub fn frames_mut(&mut self) -> std::slice::ChunksExactMut<'_, f32> {
        self.data.chunks_exact_mut(self.channels)
    }

    /// Make this block an exact copy of `other`.
    ///
    /// Reuses the existing allocation; only allocates when `other` is larger
    /// than anything this block has held before.
    pub fn copy_from(&mut self, other: &AudioBlock) {
        self.load_interleaved(&other.data, other.channels);
    }

    /// Replace the contents with interleaved samples of the given channel count
    pub fn load_interleaved(&mut self, samples: &[f32], channels: usize) {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels;
        self.channels = channels;
        self.data.clear();
        self.data.extend_from_slice(&samples[..whole]);
    }

    /// Resize to a new shape, zero-filling any new samples
    pub fn resize(&mut self, frames: usize, channels: usize) {
        self.channels = channels.max(1);
        self.data.resize(frames * self.channels, 0.0);
    }

    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    /// Largest absolute sample value
    pub fn peak(&self) -> f32 {
        self.data.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()))
    }
}
