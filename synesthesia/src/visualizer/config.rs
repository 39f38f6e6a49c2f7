//! Visualizer configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::render::{RasterSurface, Rgba};
use crate::errors::ConfigError;

/// Settings for analysis, playback and bar rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizerConfig {
    /// Transform size; the bin count is half of it.
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    /// Temporal smoothing between frames, 0..=1.
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    /// Level mapped to byte 0.
    #[serde(default = "default_min_decibels")]
    pub min_decibels: f32,
    /// Level mapped to byte 255.
    #[serde(default = "default_max_decibels")]
    pub max_decibels: f32,
    /// Frames per second of the render loop.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    /// Amplitude applied to audio routed to the output.
    #[serde(default = "default_output_gain")]
    pub output_gain: f32,
    /// Horizontal gap between bars.
    #[serde(default = "default_bar_gap")]
    pub bar_gap: f32,
    /// Colour of even bins.
    #[serde(default = "default_accent")]
    pub accent: Rgba,
    /// Width of the default raster surface.
    #[serde(default = "default_width")]
    pub width: u32,
    /// Height of the default raster surface.
    #[serde(default = "default_height")]
    pub height: u32,
}

fn default_fft_size() -> usize {
    128
}

fn default_smoothing() -> f32 {
    0.8
}

fn default_min_decibels() -> f32 {
    -100.0
}

fn default_max_decibels() -> f32 {
    -30.0
}

fn default_frame_rate() -> u32 {
    60
}

fn default_output_gain() -> f32 {
    0.05
}

fn default_bar_gap() -> f32 {
    2.0
}

fn default_accent() -> Rgba {
    Rgba::rgb(190, 242, 100)
}

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    100
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
            smoothing: default_smoothing(),
            min_decibels: default_min_decibels(),
            max_decibels: default_max_decibels(),
            frame_rate: default_frame_rate(),
            output_gain: default_output_gain(),
            bar_gap: default_bar_gap(),
            accent: default_accent(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl VisualizerConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transform size.
    #[must_use]
    pub fn with_fft_size(mut self, fft_size: usize) -> Self {
        self.fft_size = fft_size;
        self
    }

    /// Sets the frame rate.
    #[must_use]
    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    /// Sets the raster surface size.
    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// A blank raster surface of the configured size.
    #[must_use]
    pub fn raster_surface(&self) -> RasterSurface {
        RasterSurface::new(self.width, self.height)
    }

    /// Number of frequency bins.
    #[must_use]
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Delay between frames.
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_rate.max(1)))
    }

    /// Rejects values the analyser cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.fft_size.is_power_of_two() || !(32..=32768).contains(&self.fft_size) {
            return Err(ConfigError::new(
                "fft_size",
                "must be a power of two between 32 and 32768",
            ));
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(ConfigError::new("smoothing", "must be within 0..=1"));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(ConfigError::new(
                "min_decibels",
                "must be lower than max_decibels",
            ));
        }
        if self.frame_rate == 0 {
            return Err(ConfigError::new("frame_rate", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.output_gain) {
            return Err(ConfigError::new("output_gain", "must be within 0..=1"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::new("width", "surface must not be empty"));
        }
        Ok(())
    }
}
