pub mod align;
pub mod compare;
pub mod reflow;
pub mod repair;
pub mod resolve;

use std::collections::BTreeMap;

use crate::core::config::FusionConfig;
use crate::core::model::{AlignedLine, ProviderReading};

/// Fused line sequence for one unit or column, with the per-position
/// distances measured against every input.
#[derive(Debug, Clone, Default)]
pub struct FusedPage {
    pub lines: Vec<AlignedLine>,
    pub distances: BTreeMap<String, Vec<f32>>,
}

impl FusedPage {
    /// Share of positions whose fusion distance exceeds `threshold`.
    pub fn high_distance_ratio(&self, threshold: f32) -> f32 {
        if self.lines.is_empty() {
            return 0.0;
        }
        let high = self.lines.iter().filter(|line| line.distance > threshold).count();
        high as f32 / self.lines.len() as f32
    }
}

pub trait FusionEngine {
    fn fuse(&self, primary: &ProviderReading, alternates: &[&ProviderReading]) -> FusedPage;
}

#[derive(Debug, Clone, Default)]
pub struct LineFusionEngine {
    config: FusionConfig,
}

impl LineFusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    fn prepare(&self, reading: &ProviderReading) -> Vec<String> {
        let lines = reading.line_texts();
        if self.config.reflow_hyphens {
            reflow::reflow_hyphenated(lines)
        } else {
            lines
        }
    }
}

impl FusionEngine for LineFusionEngine {
    fn fuse(&self, primary: &ProviderReading, alternates: &[&ProviderReading]) -> FusedPage {
        let mut lines: Vec<AlignedLine> = self
            .prepare(primary)
            .into_iter()
            .map(|text| AlignedLine::single(text, &primary.provider))
            .collect();
        let mut distances = BTreeMap::new();
        let mut prior = vec![primary.provider.clone()];

        // Alternates fold in one at a time, in configuration order.
        for alternate in alternates {
            let resolution = resolve::resolve_alternate(
                lines,
                &prior,
                &alternate.provider,
                &self.prepare(alternate),
                self.config.drop_threshold,
            );
            lines = resolution.lines;
            distances.insert(alternate.provider.clone(), resolution.distances);
            prior.push(alternate.provider.clone());
        }

        repair::apply_text_repairs(&mut lines, &self.config);
        distances.insert(
            primary.provider.clone(),
            lines.iter().map(|line| line.distance).collect(),
        );
        FusedPage { lines, distances }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::ProviderRole;
    use pretty_assertions::assert_eq;

    fn reading(provider: &str, role: ProviderRole, text: &str) -> ProviderReading {
        ProviderReading {
            provider: provider.to_string(),
            role,
            text: text.to_string(),
            lines: None,
            elapsed_ms: 0,
        }
    }

    fn engine() -> LineFusionEngine {
        LineFusionEngine::new(FusionConfig::default())
    }

    #[test]
    fn alternate_agreement_overrides_misread_primary() {
        let primary = reading("tesseract", ProviderRole::Classical, "You flee.\nTum t0 42");
        let alternate = reading("neural", ProviderRole::Neural, "You flee.\nTurn to 42");
        let fused = engine().fuse(&primary, &[&alternate]);

        let texts: Vec<&str> = fused.lines.iter().map(|line| line.text.as_str()).collect();
        assert_eq!(texts, vec!["You flee.", "Turn to 42"]);
        assert_eq!(fused.lines[1].source, "neural");
        assert!((fused.lines[1].distance - 0.3).abs() < 1e-6);
        assert_eq!(fused.lines[0].distance, 0.0);
    }

    #[test]
    fn phrase_repair_fixes_primary_when_alternate_is_silent() {
        let primary = reading("tesseract", ProviderRole::Classical, "Tum t0 42");
        let fused = engine().fuse(&primary, &[]);
        assert_eq!(fused.lines[0].text, "Turn to 42");
        assert_eq!(fused.lines[0].repairs, vec!["phrase".to_string()]);
        assert_eq!(fused.lines[0].source, "tesseract");
    }

    #[test]
    fn identical_readings_fuse_to_themselves() {
        let text = "The corridor ends.\nA door stands open.\nTurn to 118";
        let a = reading("tesseract", ProviderRole::Classical, text);
        let b = reading("neural", ProviderRole::Neural, text);
        let c = reading("vision", ProviderRole::Vision, text);
        let fused = engine().fuse(&a, &[&b, &c]);
        let texts: Vec<&str> = fused.lines.iter().map(|line| line.text.as_str()).collect();
        assert_eq!(texts, text.lines().collect::<Vec<_>>());
        assert!(fused.lines.iter().all(|line| line.distance == 0.0));
        assert_eq!(fused.high_distance_ratio(0.35), 0.0);
        assert_eq!(fused.distances.len(), 3);
    }

    #[test]
    fn hyphenated_breaks_are_reflowed_before_alignment() {
        let primary = reading("tesseract", ProviderRole::Classical, "the dra-\ngon sleeps");
        let alternate = reading("neural", ProviderRole::Neural, "the dragon sleeps");
        let fused = engine().fuse(&primary, &[&alternate]);
        assert_eq!(fused.lines.len(), 1);
        assert_eq!(fused.lines[0].text, "the dragon sleeps");
        assert_eq!(fused.lines[0].distance, 0.0);
    }

    #[test]
    fn empty_primary_takes_alternate_lines() {
        let primary = reading("tesseract", ProviderRole::Classical, "");
        let alternate = reading("neural", ProviderRole::Neural, "Turn to 9");
        let fused = engine().fuse(&primary, &[&alternate]);
        assert_eq!(fused.lines.len(), 1);
        assert_eq!(fused.lines[0].source, "neural");
        assert_eq!(fused.high_distance_ratio(0.35), 1.0);
    }
}
