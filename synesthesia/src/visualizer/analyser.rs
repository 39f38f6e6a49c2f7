//! Byte frequency analysis over the most recent samples.
//!
//! Produces the same shape of data as a browser analyser node: a Blackman
//! window over the latest `fft_size` samples, magnitudes normalised by the
//! transform size, smoothed over time, converted to decibels and mapped
//! linearly onto `0..=255` between the configured floor and ceiling.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::Arc;

use super::VisualizerConfig;
use crate::errors::ConfigError;

/// Frequency analyser with a fixed transform size.
pub struct FrequencyAnalyser {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
    window: Vec<f32>,
    history: VecDeque<f32>,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl FrequencyAnalyser {
    /// Builds an analyser from a validated configuration.
    pub fn new(config: &VisualizerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let fft_size = config.fft_size;
        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        Ok(Self {
            fft,
            fft_size,
            smoothing: config.smoothing,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
            window: (0..fft_size).map(|i| blackman_window(i, fft_size)).collect(),
            history: std::iter::repeat(0.0).take(fft_size).collect(),
            smoothed: vec![0.0; fft_size / 2],
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
        })
    }

    /// Transform size.
    #[must_use]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of frequency bins (half the transform size).
    #[must_use]
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Appends mono samples, keeping only the latest `fft_size`.
    pub fn push_samples(&mut self, samples: &[f32]) {
        let skip = samples.len().saturating_sub(self.fft_size);
        for &sample in &samples[skip..] {
            self.history.pop_front();
            self.history.push_back(sample);
        }
    }

    /// Writes the current byte frequency data into `out`.
    ///
    /// Each call advances the temporal smoothing by one step. Only the first
    /// `min(out.len(), bin_count)` entries are written.
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) {
        for (slot, (&sample, &w)) in self
            .scratch
            .iter_mut()
            .zip(self.history.iter().zip(&self.window))
        {
            *slot = Complex::new(sample * w, 0.0);
        }
        self.fft.process(&mut self.scratch);

        let scale = 1.0 / self.fft_size as f32;
        let range = self.max_decibels - self.min_decibels;
        for (k, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.scratch[k].norm() * scale;
            *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;
            if let Some(byte) = out.get_mut(k) {
                *byte = to_byte(*smoothed, self.min_decibels, range);
            }
        }
    }
}

impl std::fmt::Debug for FrequencyAnalyser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrequencyAnalyser")
            .field("fft_size", &self.fft_size)
            .field("smoothing", &self.smoothing)
            .field("min_decibels", &self.min_decibels)
            .field("max_decibels", &self.max_decibels)
            .finish_non_exhaustive()
    }
}

fn to_byte(magnitude: f32, min_decibels: f32, range: f32) -> u8 {
    if magnitude <= 0.0 {
        return 0;
    }
    let db = 20.0 * magnitude.log10();
    let scaled = (255.0 / range) * (db - min_decibels);
    if scaled.is_finite() {
        scaled.floor().clamp(0.0, 255.0) as u8
    } else {
        0
    }
}

/// Blackman window coefficient (alpha = 0.16).
pub fn blackman_window(index: usize, size: usize) -> f32 {
    let x = index as f32 / size as f32;
    0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyser() -> FrequencyAnalyser {
        FrequencyAnalyser::new(&VisualizerConfig::default()).unwrap()
    }

    #[test]
    fn test_bin_count_is_half_fft_size() {
        let analyser = analyser();
        assert_eq!(analyser.fft_size(), 128);
        assert_eq!(analyser.bin_count(), 64);
    }

    #[test]
    fn test_silence_is_all_zero() {
        let mut analyser = analyser();
        analyser.push_samples(&[0.0; 512]);
        let mut bins = vec![7_u8; 64];
        for _ in 0..10 {
            analyser.byte_frequency_data(&mut bins);
        }
        assert!(bins.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_tone_peaks_at_its_bin() {
        let config = VisualizerConfig {
            smoothing: 0.0,
            max_decibels: 0.0,
            ..VisualizerConfig::default()
        };
        let mut analyser = FrequencyAnalyser::new(&config).unwrap();
        // Exactly 8 cycles per 128 samples lands on bin 8.
        let tone: Vec<f32> = (0..128)
            .map(|n| (2.0 * PI * 8.0 * n as f32 / 128.0).sin())
            .collect();
        analyser.push_samples(&tone);

        let mut bins = vec![0_u8; 64];
        analyser.byte_frequency_data(&mut bins);

        let peak = bins
            .iter()
            .enumerate()
            .max_by_key(|(_, &b)| b)
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 8);
        assert!(bins[8] > 200);
        assert!(bins[40] < bins[8]);
    }

    #[test]
    fn test_smoothing_decays_after_silence() {
        let mut analyser = analyser();
        let tone: Vec<f32> = (0..128)
            .map(|n| (2.0 * PI * 8.0 * n as f32 / 128.0).sin())
            .collect();
        analyser.push_samples(&tone);
        let mut bins = vec![0_u8; 64];
        analyser.byte_frequency_data(&mut bins);
        let loud = bins[8];

        analyser.push_samples(&[0.0; 128]);
        analyser.byte_frequency_data(&mut bins);
        assert!(bins[8] <= loud);
        assert!(bins[8] > 0, "smoothing keeps some energy for one frame");
    }

    #[test]
    fn test_push_keeps_latest_window() {
        let mut analyser = analyser();
        let ramp: Vec<f32> = (0..300).map(|n| n as f32).collect();
        analyser.push_samples(&ramp);
        assert_eq!(analyser.history.len(), 128);
        assert_eq!(analyser.history.front().copied(), Some(172.0));
        assert_eq!(analyser.history.back().copied(), Some(299.0));
    }

    #[test]
    fn test_blackman_window_shape() {
        assert!(blackman_window(0, 128).abs() < 1e-6);
        assert!((blackman_window(64, 128) - 1.0).abs() < 1e-3);
    }
}
