use image::{DynamicImage, GrayImage, Luma};
use imageproc::filter::median_filter;
use tracing::debug;

use crate::core::config::PreprocessConfig;

const DARK: u8 = 128;
const COLOR_SPREAD: u8 = 40;
const MAX_COLOR_SAMPLES: u32 = 200_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseProfile {
    pub isolated_density: f32,
    pub contrast: u8,
    pub monochrome: bool,
}

impl NoiseProfile {
    pub fn is_noisy(&self, config: &PreprocessConfig) -> bool {
        self.isolated_density > config.isolated_pixel_density
    }

    pub fn is_low_contrast(&self, config: &PreprocessConfig) -> bool {
        self.contrast < config.min_contrast
    }
}

pub fn is_monochrome(image: &DynamicImage, config: &PreprocessConfig) -> bool {
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageLuma16(_) => return true,
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLumaA16(_) => return true,
        _ => {}
    }
    let rgb = image.to_rgb8();
    let total = rgb.width() as u64 * rgb.height() as u64;
    if total == 0 {
        return true;
    }
    let stride = ((total / MAX_COLOR_SAMPLES as u64).max(1)) as usize;
    let mut sampled = 0u64;
    let mut colored = 0u64;
    for pixel in rgb.pixels().step_by(stride) {
        let [r, g, b] = pixel.0;
        let spread = r.max(g).max(b) - r.min(g).min(b);
        if spread > COLOR_SPREAD {
            colored += 1;
        }
        sampled += 1;
    }
    (colored as f32 / sampled as f32) < config.color_pixel_ratio
}

/// Fraction of pixels that are dark with all eight neighbours light.
pub fn isolated_pixel_density(gray: &GrayImage) -> f32 {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }
    let mut isolated = 0u64;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            if gray.get_pixel(x, y).0[0] >= DARK {
                continue;
            }
            let lonely = (y - 1..=y + 1)
                .flat_map(|ny| (x - 1..=x + 1).map(move |nx| (nx, ny)))
                .filter(|&(nx, ny)| nx != x || ny != y)
                .all(|(nx, ny)| gray.get_pixel(nx, ny).0[0] >= DARK);
            if lonely {
                isolated += 1;
            }
        }
    }
    isolated as f32 / (w as f32 * h as f32)
}

/// Luminance values at the 2nd and 98th percentiles.
pub fn luminance_range(gray: &GrayImage) -> (u8, u8) {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return (0, 0);
    }
    let percentile = |fraction: f64| -> u8 {
        let target = (total as f64 * fraction).ceil() as u64;
        let mut seen = 0u64;
        for (value, count) in histogram.iter().enumerate() {
            seen += count;
            if seen >= target.max(1) {
                return value as u8;
            }
        }
        255
    };
    (percentile(0.02), percentile(0.98))
}

pub fn noise_profile(image: &DynamicImage, config: &PreprocessConfig) -> NoiseProfile {
    let gray = image.to_luma8();
    let (lo, hi) = luminance_range(&gray);
    NoiseProfile {
        isolated_density: isolated_pixel_density(&gray),
        contrast: hi.saturating_sub(lo),
        monochrome: is_monochrome(image, config),
    }
}

fn stretch(gray: &GrayImage, lo: u8, hi: u8) -> GrayImage {
    let span = (hi - lo) as f32;
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let value = gray.get_pixel(x, y).0[0].clamp(lo, hi);
        Luma([(((value - lo) as f32 / span) * 255.0).round() as u8])
    })
}

/// Cleaned image when the page is monochrome and looks degraded, `None` otherwise.
pub fn denoise(image: &DynamicImage, config: &PreprocessConfig) -> Option<DynamicImage> {
    let profile = noise_profile(image, config);
    if !profile.monochrome {
        return None;
    }
    let noisy = profile.is_noisy(config);
    let faint = profile.is_low_contrast(config);
    if !noisy && !faint {
        return None;
    }

    let mut gray = image.to_luma8();
    let mut changed = false;
    if noisy {
        gray = median_filter(&gray, 1, 1);
        changed = true;
    }
    if faint {
        let (lo, hi) = luminance_range(&gray);
        if hi > lo {
            gray = stretch(&gray, lo, hi);
            changed = true;
        }
    }
    debug!(?profile, changed, "noise reduction");
    changed.then_some(DynamicImage::ImageLuma8(gray))
}
