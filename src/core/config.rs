use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::model::ProviderRole;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub deskew: bool,
    pub denoise: bool,
    pub artwork_check_deg: f32,
    pub sweep_range_deg: f32,
    pub sweep_step_deg: f32,
    pub max_angle_deg: f32,
    pub min_improvement: f32,
    pub analysis_width: u32,
    pub isolated_pixel_density: f32,
    pub min_contrast: u8,
    pub color_pixel_ratio: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            deskew: true,
            denoise: true,
            artwork_check_deg: 4.0,
            sweep_range_deg: 2.0,
            sweep_step_deg: 0.25,
            max_angle_deg: 1.5,
            min_improvement: 0.05,
            analysis_width: 800,
            isolated_pixel_density: 0.002,
            min_contrast: 80,
            color_pixel_ratio: 0.02,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpreadConfig {
    pub samples: usize,
    pub landscape_ratio: f32,
    pub search_radius: f32,
    pub min_confident_contrast: f32,
    pub gutter_min: f32,
    pub gutter_max: f32,
    pub refine_min_contrast: f32,
    pub refine_min_continuity: f32,
    pub refine_center_tolerance: f32,
    pub analysis_width: u32,
}

impl Default for SpreadConfig {
    fn default() -> Self {
        Self {
            samples: 5,
            landscape_ratio: 1.15,
            search_radius: 0.2,
            min_confident_contrast: 0.08,
            gutter_min: 0.40,
            gutter_max: 0.60,
            refine_min_contrast: 0.15,
            refine_min_continuity: 0.7,
            refine_center_tolerance: 0.02,
            analysis_width: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    pub min_lines_for_geometry: usize,
    pub min_center_spread: f32,
    pub min_group_fraction: f32,
    pub min_group_size: usize,
    pub min_line_gap: f32,
    pub wide_line_fraction: f32,
    pub min_gap_fraction: f32,
    pub gap_search_radius: f32,
    pub gap_ink_ratio: f32,
    pub fragment_reject_confidence: f32,
    pub short_line_chars: usize,
    pub short_line_ratio: f32,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            min_lines_for_geometry: 6,
            min_center_spread: 0.25,
            min_group_fraction: 0.2,
            min_group_size: 3,
            min_line_gap: 0.15,
            wide_line_fraction: 0.6,
            min_gap_fraction: 0.02,
            gap_search_radius: 0.15,
            gap_ink_ratio: 0.02,
            fragment_reject_confidence: 0.5,
            short_line_chars: 5,
            short_line_ratio: 0.15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub drop_threshold: f32,
    pub glyph_max_len: usize,
    pub glyph_max_letters: usize,
    pub reflow_hyphens: bool,
    pub line_rescan: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            drop_threshold: 0.35,
            glyph_max_len: 6,
            glyph_max_letters: 2,
            reflow_hyphens: true,
            line_rescan: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub disagreement: f32,
    pub corruption: f32,
    pub missing_content: f32,
    pub fragmentation: f32,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            disagreement: 0.3,
            corruption: 0.25,
            missing_content: 0.25,
            fragmentation: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub weights: QualityWeights,
    pub disagreement_threshold: f32,
    pub high_distance: f32,
    pub high_distance_ratio: f32,
    pub corruption_threshold: f32,
    pub missing_content_threshold: f32,
    pub fragmentation_threshold: f32,
    pub min_lines: usize,
    pub min_avg_line_len: f32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            weights: QualityWeights::default(),
            disagreement_threshold: 0.25,
            high_distance: 0.35,
            high_distance_ratio: 0.25,
            corruption_threshold: 0.5,
            missing_content_threshold: 0.6,
            fragmentation_threshold: 0.3,
            min_lines: 3,
            min_avg_line_len: 8.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub budget_fraction: f64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            budget_fraction: 0.10,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Tesseract,
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub name: String,
    pub kind: ProviderKind,
    pub role: ProviderRole,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_language() -> String {
    "eng".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

impl ProviderSpec {
    pub fn tesseract() -> Self {
        Self {
            name: "tesseract".to_string(),
            kind: ProviderKind::Tesseract,
            role: ProviderRole::Classical,
            program: None,
            args: Vec::new(),
            language: default_language(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub preprocess: PreprocessConfig,
    pub spread: SpreadConfig,
    pub columns: ColumnConfig,
    pub fusion: FusionConfig,
    pub quality: QualityConfig,
    pub escalation: EscalationConfig,
    pub fallback: bool,
    pub providers: Vec<ProviderSpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preprocess: PreprocessConfig::default(),
            spread: SpreadConfig::default(),
            columns: ColumnConfig::default(),
            fusion: FusionConfig::default(),
            quality: QualityConfig::default(),
            escalation: EscalationConfig::default(),
            fallback: true,
            providers: vec![ProviderSpec::tesseract()],
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(raw)?;
        if config.providers.is_empty() {
            anyhow::bail!("at least one provider must be configured");
        }
        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub engine: EngineConfig,
    /// Discard records left in the output directory by an earlier run.
    pub force: bool,
}

impl PipelineConfig {
    pub fn new(input: PathBuf, output: PathBuf, engine: EngineConfig) -> Self {
        Self {
            input,
            output,
            engine,
            force: false,
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_toml_keeps_defaults() -> Result<()> {
        let config = EngineConfig::from_toml(
            r#"
            fallback = false

            [quality]
            corruption_threshold = 0.4

            [[providers]]
            name = "tesseract"
            kind = "tesseract"
            role = "classical"

            [[providers]]
            name = "easyocr"
            kind = "command"
            role = "neural"
            program = "python3"
            args = ["scripts/easyocr_bridge.py"]
            timeout_secs = 30
            "#,
        )?;
        assert!(!config.fallback);
        assert_eq!(config.quality.corruption_threshold, 0.4);
        assert_eq!(config.quality.fragmentation_threshold, 0.3);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[1].timeout_secs, 30);
        assert_eq!(config.providers[1].language, "eng");
        Ok(())
    }

    #[test]
    fn rejects_empty_provider_list() {
        assert!(EngineConfig::from_toml("providers = []").is_err());
    }
}
