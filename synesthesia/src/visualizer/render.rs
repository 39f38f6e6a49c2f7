//! Bar layout and rendering surfaces.

use image::{Rgba as Pixel, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::Result;

/// A colour with straight (non-premultiplied) alpha in `0..=1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
    /// Opacity.
    pub a: f32,
}

impl Rgba {
    /// Opaque black.
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    /// Opaque white.
    pub const WHITE: Self = Self::rgb(255, 255, 255);

    /// An opaque colour.
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// The same colour with a different alpha.
    #[must_use]
    pub const fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }
}

/// One frequency bar in surface coordinates (origin top-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Drawn width (slot width minus the gap).
    pub width: f32,
    /// Height, proportional to the bin magnitude.
    pub height: f32,
    /// Fill colour.
    pub color: Rgba,
}

/// Something frames can be drawn onto.
pub trait Surface: Send {
    /// Width and height in pixels.
    fn size(&self) -> (u32, u32);

    /// Fills the whole surface.
    fn clear(&mut self, color: Rgba);

    /// Fills one bar, clipped to the surface.
    fn fill_bar(&mut self, bar: &Bar);
}

/// Lays out one bar per bin, left to right, anchored to the bottom edge.
///
/// Slot width is `(width / bins) * 2`, so only the lower half of the
/// spectrum lands on screen. Even bins use `accent` at alpha `m/255`, odd
/// bins white at half that.
#[must_use]
pub fn layout_bars(width: u32, height: u32, bins: &[u8], accent: Rgba, gap: f32) -> Vec<Bar> {
    if bins.is_empty() {
        return Vec::new();
    }
    let (width, height) = (width as f32, height as f32);
    let slot = (width / bins.len() as f32) * 2.0;
    let mut x = 0.0;
    bins.iter()
        .enumerate()
        .map(|(i, &m)| {
            let level = f32::from(m) / 255.0;
            let bar_height = level * height;
            let color = if i % 2 == 0 {
                accent.with_alpha(level)
            } else {
                Rgba::WHITE.with_alpha(level * 0.5)
            };
            let bar = Bar {
                x,
                y: height - bar_height,
                width: slot - gap,
                height: bar_height,
                color,
            };
            x += slot;
            bar
        })
        .collect()
}

/// Draws one frame: black background, then the bars.
pub fn draw_frame(surface: &mut dyn Surface, bins: &[u8], accent: Rgba, gap: f32) {
    let (width, height) = surface.size();
    surface.clear(Rgba::BLACK);
    for bar in layout_bars(width, height, bins, accent, gap) {
        surface.fill_bar(&bar);
    }
}

/// CPU raster surface backed by an RGBA image.
#[derive(Debug, Clone)]
pub struct RasterSurface {
    image: RgbaImage,
}

impl RasterSurface {
    /// Creates a transparent surface.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    /// The rendered pixels.
    #[must_use]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Writes the current frame as PNG.
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        self.image.save(path)?;
        Ok(())
    }
}

impl Surface for RasterSurface {
    fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn clear(&mut self, color: Rgba) {
        let pixel = Pixel([color.r, color.g, color.b, alpha_byte(color.a)]);
        for p in self.image.pixels_mut() {
            *p = pixel;
        }
    }

    fn fill_bar(&mut self, bar: &Bar) {
        if bar.color.a <= 0.0 || bar.width <= 0.0 || bar.height <= 0.0 {
            return;
        }
        let (w, h) = self.image.dimensions();
        let x0 = bar.x.round().max(0.0) as u32;
        let y0 = bar.y.round().max(0.0) as u32;
        let x1 = ((bar.x + bar.width).round().max(0.0) as u32).min(w);
        let y1 = ((bar.y + bar.height).round().max(0.0) as u32).min(h);
        for y in y0..y1 {
            for x in x0..x1 {
                let dst = self.image.get_pixel_mut(x, y);
                *dst = blend_over(*dst, bar.color);
            }
        }
    }
}

fn alpha_byte(a: f32) -> u8 {
    (a.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Source-over compositing of `src` onto `dst`.
fn blend_over(dst: Pixel<u8>, src: Rgba) -> Pixel<u8> {
    let sa = src.a.clamp(0.0, 1.0);
    let da = f32::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return Pixel([0, 0, 0, 0]);
    }
    let channel = |s: u8, d: u8| {
        let c = (f32::from(s) * sa + f32::from(d) * da * (1.0 - sa)) / out_a;
        c.round().clamp(0.0, 255.0) as u8
    };
    Pixel([
        channel(src.r, dst[0]),
        channel(src.g, dst[1]),
        channel(src.b, dst[2]),
        alpha_byte(out_a),
    ])
}
