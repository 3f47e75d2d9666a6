use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma, Rgba};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use tracing::debug;

use crate::core::config::PreprocessConfig;

const WHITE_PIXEL: u8 = 255;
const INK_CUTOFF: u8 = 250;

/// Grayscale copy scaled down to at most `max_width` pixels wide.
pub fn analysis_gray(image: &DynamicImage, max_width: u32) -> GrayImage {
    let gray = image.to_luma8();
    if gray.width() <= max_width || max_width == 0 {
        return gray;
    }
    let scale = max_width as f32 / gray.width() as f32;
    let height = ((gray.height() as f32 * scale).round() as u32).max(1);
    image::imageops::resize(&gray, max_width, height, FilterType::Triangle)
}

/// Variance of the horizontal ink projection after rotating by `angle_deg`.
pub fn projection_variance(gray: &GrayImage, angle_deg: f32) -> f64 {
    let (width, height) = gray.dimensions();
    if height == 0 {
        return 0.0;
    }
    let angle = (angle_deg as f64).to_radians();
    let (sin_a, cos_a) = angle.sin_cos();
    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;

    let mut projection = vec![0i64; height as usize];
    for (x, y, pixel) in gray.enumerate_pixels() {
        let value = pixel.0[0];
        if value >= INK_CUTOFF {
            continue;
        }
        let ry = (x as f64 - cx) * sin_a + (y as f64 - cy) * cos_a + cy;
        if ry >= 0.0 && ry < height as f64 {
            projection[ry as usize] += (WHITE_PIXEL - value) as i64;
        }
    }

    let n = projection.len() as f64;
    let mean = projection.iter().sum::<i64>() as f64 / n;
    projection
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n
}

/// Angle that straightens the text lines, if any correction is warranted.
///
/// A page whose projection variance rises under the artwork check rotation is
/// treated as an illustration and never corrected.
pub fn detect_skew(gray: &GrayImage, config: &PreprocessConfig) -> Option<f32> {
    if gray.width() < 16 || gray.height() < 16 {
        return None;
    }
    let baseline = projection_variance(gray, 0.0);
    if baseline <= f64::EPSILON {
        return None;
    }

    let tilt = config.artwork_check_deg;
    let tilted = projection_variance(gray, tilt).max(projection_variance(gray, -tilt));
    if tilted > baseline {
        debug!(tilted, baseline, "projection variance rises under check rotation; skipping deskew");
        return None;
    }

    let step = config.sweep_step_deg.max(0.01);
    let steps = (config.sweep_range_deg / step).round() as i32;
    let mut best_angle = 0.0f32;
    let mut best_variance = baseline;
    for i in -steps..=steps {
        if i == 0 {
            continue;
        }
        let angle = i as f32 * step;
        let variance = projection_variance(gray, angle);
        if variance > best_variance {
            best_angle = angle;
            best_variance = variance;
        }
    }

    if best_angle == 0.0 {
        return None;
    }
    let improvement = (best_variance / baseline - 1.0) as f32;
    if improvement < config.min_improvement || best_angle.abs() > config.max_angle_deg {
        debug!(best_angle, improvement, "skew correction rejected");
        return None;
    }
    Some(best_angle)
}

pub fn rotate(image: &DynamicImage, angle_deg: f32) -> DynamicImage {
    let theta = angle_deg.to_radians();
    match image {
        DynamicImage::ImageLuma8(gray) => DynamicImage::ImageLuma8(rotate_about_center(
            gray,
            theta,
            Interpolation::Bilinear,
            Luma([WHITE_PIXEL]),
        )),
        other => DynamicImage::ImageRgba8(rotate_about_center(
            &other.to_rgba8(),
            theta,
            Interpolation::Bilinear,
            Rgba([WHITE_PIXEL, WHITE_PIXEL, WHITE_PIXEL, WHITE_PIXEL]),
        )),
    }
}

pub struct DeskewOutcome {
    pub image: DynamicImage,
    pub angle: Option<f32>,
}

pub fn deskew(image: &DynamicImage, config: &PreprocessConfig) -> DeskewOutcome {
    let gray = analysis_gray(image, config.analysis_width);
    match detect_skew(&gray, config) {
        Some(angle) => DeskewOutcome {
            image: rotate(image, angle),
            angle: Some(angle),
        },
        None => DeskewOutcome {
            image: image.clone(),
            angle: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ruled_page(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let in_margin = x < 20 || x >= width - 20;
            if !in_margin && y > 20 && y < height - 20 && y % 16 < 4 {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    #[test]
    fn straight_text_is_left_alone() {
        let page = ruled_page(300, 300);
        assert_eq!(detect_skew(&page, &PreprocessConfig::default()), None);
    }

    #[test]
    fn detects_small_skew() {
        let page = ruled_page(300, 300);
        let skewed =
            rotate_about_center(&page, 1.0f32.to_radians(), Interpolation::Bilinear, Luma([255]));
        let angle =
            detect_skew(&skewed, &PreprocessConfig::default()).expect("skew should be detected");
        assert!((angle + 1.0).abs() <= 0.5, "detected {angle}");
    }

    #[test]
    fn strongly_tilted_artwork_is_left_alone() {
        let page = ruled_page(300, 300);
        let tilted =
            rotate_about_center(&page, 4.0f32.to_radians(), Interpolation::Bilinear, Luma([255]));
        assert_eq!(detect_skew(&tilted, &PreprocessConfig::default()), None);
    }

    #[test]
    fn blank_page_is_returned_unchanged() {
        let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(100, 100, Luma([255])));
        let outcome = deskew(&blank, &PreprocessConfig::default());
        assert_eq!(outcome.angle, None);
        assert_eq!(outcome.image.to_luma8(), blank.to_luma8());
    }
}
