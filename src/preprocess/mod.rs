//! Page clean-up applied once per unit before recognition.
//!
//! Both stages are best-effort: anything they cannot improve is returned as-is.

pub mod denoise;
pub mod deskew;

use image::DynamicImage;

use crate::core::config::PreprocessConfig;
use crate::core::model::PreprocessInfo;

#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub image: DynamicImage,
    pub info: PreprocessInfo,
}

pub fn preprocess(image: DynamicImage, config: &PreprocessConfig) -> Preprocessed {
    let mut info = PreprocessInfo::default();
    let mut image = image;

    if config.deskew {
        let outcome = deskew::deskew(&image, config);
        info.deskew_angle = outcome.angle;
        image = outcome.image;
    }

    if config.denoise {
        if let Some(cleaned) = denoise::denoise(&image, config) {
            info.denoised = true;
            image = cleaned;
        }
    }

    Preprocessed { image, info }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn disabled_stages_are_skipped() {
        let config = PreprocessConfig {
            deskew: false,
            denoise: false,
            ..PreprocessConfig::default()
        };
        let page = DynamicImage::ImageLuma8(GrayImage::from_pixel(20, 20, Luma([90])));
        let out = preprocess(page.clone(), &config);
        assert_eq!(out.info, PreprocessInfo::default());
        assert_eq!(out.image.to_luma8(), page.to_luma8());
    }
}
