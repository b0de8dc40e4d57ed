//! FFT Spectrum Analysis
//!
//! The analysis half of a spectrum/spectrogram visualizer. Runs on the
//! consumer thread, never on the audio thread: each call takes one block
//! popped from a visualization sink and produces a dB power spectrum.
//!
//! ```text
//! x      = first channel of the block, zero-padded or trimmed to N
//! X      = FFT(x · hann)
//! dB[k]  = 20 · log10(|X[k]| + 1e-10)      k in 0..N/2
//! ```

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::block::AudioBlock;
use crate::error::{DspError, DspResult};

/// Default FFT size for spectrogram-style displays
pub const DEFAULT_FFT_SIZE: usize = 512;

/// Smallest transform that yields a non-DC bin for the band mapping
pub const MIN_FFT_SIZE: usize = 4;

/// Floor added to magnitudes before the log so silence maps to -200 dB
const MAGNITUDE_FLOOR: f32 = 1e-10;

/// Symmetric Hann window coefficient
fn hann_window(n: usize, size: usize) -> f32 {
    0.5 * (1.0 - (2.0 * std::f32::consts::PI * n as f32 / (size - 1) as f32).cos())
}

/// Windowed FFT analyzer with preallocated working buffers
pub struct SpectrumAnalyzer {
    fft_size: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
    spectrum_db: Vec<f32>,
}

impl SpectrumAnalyzer {
    /// Create an analyzer for `fft_size`-point transforms.
    ///
    /// `fft_size` must be a power of two, at least [`MIN_FFT_SIZE`].
    pub fn new(fft_size: usize) -> DspResult<Self> {
        if fft_size < MIN_FFT_SIZE || !fft_size.is_power_of_two() {
            return Err(DspError::InvalidFftSize(fft_size));
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch_len = fft.get_inplace_scratch_len();
        let bins = fft_size / 2;

        Ok(Self {
            fft_size,
            window: (0..fft_size).map(|i| hann_window(i, fft_size)).collect(),
            fft,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            magnitudes: vec![0.0; bins],
            spectrum_db: vec![20.0 * MAGNITUDE_FLOOR.log10(); bins],
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of output bins (`fft_size / 2`)
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2
    }

    /// Analyze the first channel of `block`. Returns the dB spectrum.
    pub fn analyze(&mut self, block: &AudioBlock) -> &[f32] {
        let samples = block.channel_iter(0).chain(std::iter::repeat(0.0));
        for ((slot, sample), coeff) in self.buffer.iter_mut().zip(samples).zip(&self.window) {
            *slot = Complex::new(sample * coeff, 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        for ((magnitude, db), bin) in self
            .magnitudes
            .iter_mut()
            .zip(self.spectrum_db.iter_mut())
            .zip(&self.buffer)
        {
            *magnitude = bin.norm();
            *db = 20.0 * (*magnitude + MAGNITUDE_FLOOR).log10();
        }

        &self.spectrum_db
    }

    /// dB spectrum from the most recent `analyze` call
    pub fn spectrum(&self) -> &[f32] {
        &self.spectrum_db
    }

    /// Centre frequency of bin `bin` in Hz
    pub fn bin_frequency(&self, bin: usize, sample_rate: f32) -> f32 {
        bin as f32 * sample_rate / self.fft_size as f32
    }

    /// Loudest bin of the most recent analysis, skipping DC
    pub fn peak_bin(&self) -> Option<usize> {
        self.spectrum_db
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(index, _)| index)
    }

    /// Collapse the last spectrum into logarithmically spaced display bands.
    ///
    /// Each band averages the linear magnitudes of its FFT bins and maps
    /// -60 dB..0 dB (relative to a full-scale windowed sine) onto 0.0..1.0.
    pub fn log_bands(&self, bands: &mut [f32]) {
        if bands.is_empty() {
            return;
        }

        let max_bin = self.magnitudes.len();
        let log_min = 0.0_f32; // ln(1), skip DC
        let log_max = (max_bin as f32).ln();
        let log_step = (log_max - log_min) / bands.len() as f32;

        // A full-scale sine through a Hann window peaks near N/4
        let reference = self.fft_size as f32 / 4.0;

        for (i, band) in bands.iter_mut().enumerate() {
            let start = ((log_min + i as f32 * log_step).exp() as usize).clamp(1, max_bin - 1);
            let end = ((log_min + (i + 1) as f32 * log_step).exp() as usize + 1).clamp(start + 1, max_bin);

            let slice = &self.magnitudes[start..end];
            let average = slice.iter().sum::<f32>() / slice.len() as f32;

            let db = 20.0 * (average / reference).max(MAGNITUDE_FLOOR).log10();
            *band = ((db + 60.0) / 60.0).clamp(0.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_block(freq: f32, sample_rate: f32, frames: usize, channels: usize) -> AudioBlock {
        let mut block = AudioBlock::new(frames, channels);
        for frame in 0..frames {
            let value = (std::f32::consts::TAU * freq * frame as f32 / sample_rate).sin() * 0.5;
            block.set_sample(frame, 0, value);
        }
        block
    }

    #[test]
    fn test_rejects_bad_sizes() {
        assert_eq!(
            SpectrumAnalyzer::new(1000).err(),
            Some(DspError::InvalidFftSize(1000))
        );
        assert!(SpectrumAnalyzer::new(0).is_err());
        assert!(SpectrumAnalyzer::new(1).is_err());
        assert!(SpectrumAnalyzer::new(2).is_err());
        assert!(SpectrumAnalyzer::new(1024).is_ok());
    }

    #[test]
    fn test_sine_peaks_in_expected_bin() {
        let mut analyzer = SpectrumAnalyzer::new(1024).unwrap();
        // Bin 32 at 48kHz / 1024 = 1500 Hz, exactly on a bin centre
        let block = sine_block(1500.0, 48000.0, 1024, 2);

        let spectrum = analyzer.analyze(&block);
        assert_eq!(spectrum.len(), 512);
        assert_eq!(analyzer.peak_bin(), Some(32));
        assert!((analyzer.bin_frequency(32, 48000.0) - 1500.0).abs() < 1e-3);
    }

    #[test]
    fn test_short_block_is_zero_padded() {
        let mut analyzer = SpectrumAnalyzer::new(512).unwrap();
        let block = sine_block(3000.0, 48000.0, 256, 1);
        analyzer.analyze(&block);
        // 3000 Hz at 48kHz / 512 = bin 32
        assert_eq!(analyzer.peak_bin(), Some(32));
    }

    #[test]
    fn test_silence_hits_floor() {
        let mut analyzer = SpectrumAnalyzer::new(256).unwrap();
        let spectrum = analyzer.analyze(&AudioBlock::new(256, 2));
        assert!(spectrum.iter().all(|db| (*db + 200.0).abs() < 1e-3));
    }

    #[test]
    fn test_hann_window_shape() {
        let analyzer = SpectrumAnalyzer::new(2048).unwrap();
        assert!(analyzer.window[0] < 0.01, "Window should be ~0 at start");
        assert!(analyzer.window[2047] < 0.01, "Window should be ~0 at end");
        assert!((analyzer.window[1024] - 1.0).abs() < 0.01, "Window should be ~1 at centre");
    }

    #[test]
    fn test_log_bands_show_signal() {
        let mut analyzer = SpectrumAnalyzer::new(2048).unwrap();
        analyzer.analyze(&sine_block(1000.0, 48000.0, 2048, 1));

        let mut bands = [0.0_f32; 32];
        analyzer.log_bands(&mut bands);
        assert!(bands.iter().any(|b| *b > 0.5));
        assert!(bands.iter().all(|b| (0.0..=1.0).contains(b)));
    }

    #[test]
    fn test_smallest_size_maps_bands() {
        let mut analyzer = SpectrumAnalyzer::new(MIN_FFT_SIZE).unwrap();
        analyzer.analyze(&AudioBlock::from_mono(&[0.5, -0.5, 0.5, -0.5]));

        let mut bands = [0.0_f32; 4];
        analyzer.log_bands(&mut bands);
        assert!(bands.iter().all(|b| (0.0..=1.0).contains(b)));
    }
}
