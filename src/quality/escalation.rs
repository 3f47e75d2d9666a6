use crate::core::config::QualityConfig;
use crate::core::model::QualityMetrics;

/// Whether a unit needs a higher-cost re-read, and every rule that fired,
/// in a fixed order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    pub needs_escalation: bool,
    pub reasons: Vec<&'static str>,
}

impl Verdict {
    pub fn reason(&self) -> Option<String> {
        (!self.reasons.is_empty()).then(|| self.reasons.join(";"))
    }
}

pub fn verdict(metrics: &QualityMetrics, config: &QualityConfig) -> Verdict {
    let rules: [(&'static str, bool); 7] = [
        ("disagreement", metrics.disagreement_score > config.disagreement_threshold),
        ("fusion_conflicts", metrics.high_distance_ratio > config.high_distance_ratio),
        ("corruption", metrics.corruption_score > config.corruption_threshold),
        ("missing_content", metrics.missing_content_score > config.missing_content_threshold),
        ("fragmentation", metrics.fragmentation_score > config.fragmentation_threshold),
        ("too_few_lines", metrics.line_count < config.min_lines),
        (
            "short_lines",
            metrics.line_count > 0 && metrics.avg_line_len < config.min_avg_line_len,
        ),
    ];
    let reasons: Vec<&'static str> = rules
        .into_iter()
        .filter_map(|(reason, fired)| fired.then_some(reason))
        .collect();
    Verdict {
        needs_escalation: !reasons.is_empty(),
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn healthy() -> QualityMetrics {
        QualityMetrics {
            line_count: 20,
            avg_line_len: 42.0,
            ..QualityMetrics::default()
        }
    }

    #[test]
    fn healthy_page_passes() {
        let v = verdict(&healthy(), &QualityConfig::default());
        assert_eq!(v, Verdict::default());
        assert_eq!(v.reason(), None);
    }

    #[test]
    fn corruption_alone_escalates() {
        let metrics = QualityMetrics {
            corruption_score: 0.6,
            disagreement_score: 0.05,
            fragmentation_score: 0.1,
            ..healthy()
        };
        let v = verdict(&metrics, &QualityConfig::default());
        assert!(v.needs_escalation);
        assert_eq!(v.reasons, vec!["corruption"]);
    }

    #[test]
    fn thresholds_are_strict() {
        let metrics = QualityMetrics {
            corruption_score: 0.5,
            missing_content_score: 0.6,
            fragmentation_score: 0.3,
            disagreement_score: 0.25,
            high_distance_ratio: 0.25,
            ..healthy()
        };
        assert!(!verdict(&metrics, &QualityConfig::default()).needs_escalation);
    }

    #[test]
    fn reasons_keep_a_fixed_order() {
        let metrics = QualityMetrics {
            fragmentation_score: 0.9,
            high_distance_ratio: 0.5,
            line_count: 1,
            avg_line_len: 3.0,
            ..QualityMetrics::default()
        };
        let v = verdict(&metrics, &QualityConfig::default());
        assert_eq!(
            v.reason().as_deref(),
            Some("fusion_conflicts;fragmentation;too_few_lines;short_lines")
        );
    }
}
