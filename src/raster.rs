//! Raster input: pixel-encoding classification and colour matching.

use std::path::Path;

use image::{DynamicImage, ImageReader};

use crate::error::TraceError;

/// Channel layout of a supported raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Gray,
    GrayAlpha,
    Rgb,
    Rgba,
}

/// Normalized RGBA view of a raster image.
///
/// 8- and 16-bit gray/RGB encodings (with or without alpha) are supported;
/// anything else is rejected before a scan starts.
#[derive(Debug, Clone)]
pub struct RasterView {
    width: u32,
    height: u32,
    layout: ChannelLayout,
    pixels: Vec<[f32; 4]>,
}

impl RasterView {
    pub fn from_image(img: &DynamicImage) -> Result<Self, TraceError> {
        let layout = match img {
            DynamicImage::ImageLuma8(_) | DynamicImage::ImageLuma16(_) => ChannelLayout::Gray,
            DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLumaA16(_) => ChannelLayout::GrayAlpha,
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgb16(_) => ChannelLayout::Rgb,
            DynamicImage::ImageRgba8(_) | DynamicImage::ImageRgba16(_) => ChannelLayout::Rgba,
            other => {
                return Err(TraceError::UnsupportedRasterFormat(format!("{:?}", other.color())));
            }
        };
        let rgba = img.to_rgba32f();
        let (width, height) = rgba.dimensions();
        let pixels = rgba.pixels().map(|p| p.0).collect();
        Ok(Self {
            width,
            height,
            layout,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    /// Normalized RGBA of pixel (x, y). Caller keeps coordinates in range.
    pub fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        self.pixels[(y as usize) * (self.width as usize) + x as usize]
    }
}

/// Fuzzy foreground colour test.
#[derive(Debug, Clone, Copy)]
pub struct ColorMatcher {
    foreground: [f32; 4],
    fuzz: f64,
}

impl ColorMatcher {
    pub fn new(foreground: [u8; 4], fuzz: f64) -> Self {
        Self {
            foreground: foreground.map(|c| c as f32 / 255.0),
            fuzz: fuzz.clamp(0.0, 1.0),
        }
    }

    /// Euclidean RGB distance normalized to [0, 1].
    pub fn distance(&self, px: [f32; 4]) -> f64 {
        let sum: f64 = (0..3)
            .map(|c| (px[c] as f64 - self.foreground[c] as f64).powi(2))
            .sum();
        (sum / 3.0).sqrt()
    }

    /// Fully transparent pixels never match an opaque foreground.
    pub fn matches(&self, px: [f32; 4]) -> bool {
        if px[3] <= 0.0 && self.foreground[3] > 0.0 {
            return false;
        }
        self.distance(px) <= self.fuzz
    }
}

/// Load an image from disk.
pub fn load_image(path: &Path) -> Result<DynamicImage, TraceError> {
    ImageReader::open(path)
        .map_err(|e| TraceError::ImageLoad(e.to_string()))?
        .decode()
        .map_err(|e| TraceError::ImageLoad(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb32FImage, RgbaImage, Rgba};

    #[test]
    fn float_rasters_are_rejected() {
        let img = DynamicImage::ImageRgb32F(Rgb32FImage::new(4, 4));
        let err = RasterView::from_image(&img).unwrap_err();
        assert!(matches!(err, TraceError::UnsupportedRasterFormat(_)));
    }

    #[test]
    fn gray_distance_is_luma_difference() {
        let mut img = GrayImage::new(2, 1);
        img.put_pixel(0, 0, Luma([0]));
        img.put_pixel(1, 0, Luma([51]));
        let view = RasterView::from_image(&DynamicImage::ImageLuma8(img)).unwrap();
        assert_eq!(view.layout(), ChannelLayout::Gray);
        let black = ColorMatcher::new([0, 0, 0, 255], 0.15);
        assert!(black.matches(view.pixel(0, 0)));
        assert!((black.distance(view.pixel(1, 0)) - 0.2).abs() < 1e-6);
        assert!(!black.matches(view.pixel(1, 0)));
    }

    #[test]
    fn transparent_pixels_never_match() {
        let mut img = RgbaImage::new(1, 1);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        let view = RasterView::from_image(&DynamicImage::ImageRgba8(img)).unwrap();
        assert!(!ColorMatcher::new([0, 0, 0, 255], 1.0).matches(view.pixel(0, 0)));
    }
}
