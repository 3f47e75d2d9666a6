use std::collections::BTreeMap;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::core::geometry::BBox;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn suffix(&self) -> &'static str {
        match self {
            Side::Left => "l",
            Side::Right => "r",
        }
    }
}

pub fn page_key(page: u32, side: Option<Side>) -> String {
    match side {
        Some(side) => format!("page_{:04}_{}", page, side.suffix()),
        None => format!("page_{:04}", page),
    }
}

/// One recognizable image: a whole page or one half of a split spread.
#[derive(Debug, Clone)]
pub struct PageUnit {
    pub page: u32,
    pub side: Option<Side>,
    pub duplicate: u32,
    pub image: DynamicImage,
}

impl PageUnit {
    pub fn new(page: u32, side: Option<Side>, image: DynamicImage) -> Self {
        Self { page, side, duplicate: 0, image }
    }

    pub fn with_duplicate(mut self, duplicate: u32) -> Self {
        self.duplicate = duplicate;
        self
    }

    /// Record key; a repeated page number gets `_2`, `_3`, ... appended.
    pub fn key(&self) -> String {
        let key = page_key(self.page, self.side);
        if self.duplicate > 0 {
            format!("{}_{}", key, self.duplicate + 1)
        } else {
            key
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderRole {
    Classical,
    Neural,
    Vision,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OcrLine {
    pub text: String,
    #[serde(default)]
    pub bbox: Option<BBox>,
    #[serde(default)]
    pub column: Option<u8>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl OcrLine {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bbox: None,
            column: None,
            confidence: None,
        }
    }
}

/// A successful provider output for one unit or crop. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderReading {
    pub provider: String,
    pub role: ProviderRole,
    pub text: String,
    pub lines: Option<Vec<OcrLine>>,
    pub elapsed_ms: u64,
}

impl ProviderReading {
    /// Line sequence used for alignment: reported lines when the provider
    /// gave geometry, otherwise the raw text split on newlines.
    pub fn line_texts(&self) -> Vec<String> {
        match &self.lines {
            Some(lines) => lines
                .iter()
                .map(|line| line.text.trim_end().to_string())
                .filter(|text| !text.trim().is_empty())
                .collect(),
            None => self
                .text
                .lines()
                .map(|line| line.trim_end().to_string())
                .filter(|text| !text.trim().is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unavailable,
    Failed,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderFailure {
    pub provider: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Horizontal fraction `[x0, x1)` of a unit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ColumnSpan {
    pub x0: f32,
    pub x1: f32,
}

impl ColumnSpan {
    pub fn new(x0: f32, x1: f32) -> Self {
        Self { x0, x1 }
    }

    pub fn full() -> Self {
        Self { x0: 0.0, x1: 1.0 }
    }

    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(0.0)
    }

    /// Spans cut at the given interior boundaries, covering `[0, 1)`.
    pub fn from_boundaries(boundaries: &[f32]) -> Vec<Self> {
        let mut spans = Vec::with_capacity(boundaries.len() + 1);
        let mut start = 0.0;
        for &b in boundaries {
            let b = b.clamp(start, 1.0);
            spans.push(Self::new(start, b));
            start = b;
        }
        spans.push(Self::new(start, 1.0));
        spans
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ColumnMethod {
    Single,
    ProviderColumns,
    LineClusters,
    LineGap,
    PixelProjection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnConfidence {
    pub method: ColumnMethod,
    pub gap_count: usize,
    pub line_count: usize,
    pub avg_line_len: f32,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineCandidate {
    pub provider: String,
    pub text: Option<String>,
}

/// Fused decision for one output line position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlignedLine {
    pub text: String,
    pub source: String,
    pub distance: f32,
    pub candidates: Vec<LineCandidate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repairs: Vec<String>,
}

impl AlignedLine {
    pub fn single(text: String, provider: &str) -> Self {
        Self {
            candidates: vec![LineCandidate {
                provider: provider.to_string(),
                text: Some(text.clone()),
            }],
            text,
            source: provider.to_string(),
            distance: 0.0,
            repairs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QualityMetrics {
    pub disagreement_score: f32,
    pub corruption_score: f32,
    pub missing_content_score: f32,
    pub fragmentation_score: f32,
    pub quality_score: f32,
    pub high_distance_ratio: f32,
    pub line_count: usize,
    pub avg_line_len: f32,
    pub patterns: Vec<String>,
}

/// Structured per-provider diagnostic record kept for audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderDump {
    pub provider: String,
    pub raw_text: Option<String>,
    pub line_count: usize,
    pub error: Option<ProviderFailure>,
    pub fusion_distances: Vec<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PreprocessInfo {
    pub deskew_angle: Option<f32>,
    pub denoised: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub key: String,
    pub page: u32,
    pub side: Option<Side>,
    pub lines: Vec<AlignedLine>,
    pub disagreement_score: f32,
    pub needs_escalation: bool,
    pub escalation_reason: Option<String>,
    pub escalated: bool,
    pub quality: QualityMetrics,
    pub columns: Vec<ColumnSpan>,
    pub column_confidence: ColumnConfidence,
    pub providers: Vec<ProviderDump>,
    pub fallback_used: bool,
    pub preprocess: PreprocessInfo,
}

impl PageRecord {
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Provider that supplied the most lines, ties broken by name.
    pub fn winning_provider(&self) -> Option<String> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for line in &self.lines {
            *counts.entry(line.source.as_str()).or_default() += 1;
        }
        counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(name, _)| name.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpreadMode {
    Single,
    Spread,
    PreSplit,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpreadDecision {
    pub mode: SpreadMode,
    pub is_spread: bool,
    pub gutter: f32,
    pub confidence: f32,
    pub samples: usize,
    pub landscape_samples: usize,
    pub confident_samples: usize,
}

impl SpreadDecision {
    pub fn single(samples: usize) -> Self {
        Self {
            mode: SpreadMode::Single,
            is_spread: false,
            gutter: 0.5,
            confidence: 0.0,
            samples,
            landscape_samples: 0,
            confident_samples: 0,
        }
    }

    pub fn pre_split() -> Self {
        Self {
            mode: SpreadMode::PreSplit,
            is_spread: false,
            gutter: 0.5,
            confidence: 1.0,
            samples: 0,
            landscape_samples: 0,
            confident_samples: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityEntry {
    pub key: String,
    pub page: u32,
    pub side: Option<Side>,
    pub disagreement_score: f32,
    pub corruption_score: f32,
    pub missing_content_score: f32,
    pub fragmentation_score: f32,
    pub quality_score: f32,
    pub needs_escalation: bool,
    pub escalated: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProviderUsage {
    pub lines_won: BTreeMap<String, usize>,
    pub pages_won: BTreeMap<String, usize>,
    pub multi_column_pages: usize,
}

/// Run-wide cap on escalation actions; computed once from the unit count.
///
/// Only the action of escalating draws on it. A unit's `needs_escalation`
/// flag is decided before the budget is consulted and is never cleared.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EscalationBudget {
    pub cap: usize,
    pub consumed: usize,
}

impl EscalationBudget {
    pub fn new(cap: usize) -> Self {
        Self { cap, consumed: 0 }
    }

    /// `fraction` of `total`, rounded up unless it is integral to within
    /// float noise relative to its size (100 units at 10% give 10, 101 give 11).
    pub fn from_total(total: usize, fraction: f64) -> Self {
        let raw = total as f64 * fraction.clamp(0.0, 1.0);
        let cap = if (raw - raw.round()).abs() <= 1e-9 * raw.max(1.0) {
            raw.round()
        } else {
            raw.ceil()
        };
        Self::new(cap as usize)
    }

    pub fn remaining(&self) -> usize {
        self.cap.saturating_sub(self.consumed)
    }

    pub fn try_consume(&mut self) -> bool {
        if self.consumed < self.cap {
            self.consumed += 1;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EscalationEntry {
    pub key: String,
    pub page: u32,
    pub side: Option<Side>,
    pub reason: Option<String>,
}

/// Hand-off list for the external re-read service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EscalationManifest {
    pub budget: EscalationBudget,
    pub escalated: Vec<EscalationEntry>,
    pub flagged_not_escalated: Vec<EscalationEntry>,
}

/// Aggregate of all page records, built as records complete.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub index: BTreeMap<String, String>,
    pub quality: Vec<QualityEntry>,
    pub usage: ProviderUsage,
    pub spread: Option<SpreadDecision>,
    pub escalation: EscalationManifest,
}

impl RunReport {
    pub fn record(&mut self, record: &PageRecord, location: String) {
        self.index.insert(record.key.clone(), location);
        self.quality.push(QualityEntry {
            key: record.key.clone(),
            page: record.page,
            side: record.side,
            disagreement_score: record.quality.disagreement_score,
            corruption_score: record.quality.corruption_score,
            missing_content_score: record.quality.missing_content_score,
            fragmentation_score: record.quality.fragmentation_score,
            quality_score: record.quality.quality_score,
            needs_escalation: record.needs_escalation,
            escalated: record.escalated,
            reason: record.escalation_reason.clone(),
        });
        for line in &record.lines {
            *self.usage.lines_won.entry(line.source.clone()).or_default() += 1;
        }
        if let Some(winner) = record.winning_provider() {
            *self.usage.pages_won.entry(winner).or_default() += 1;
        }
        if record.columns.len() > 1 {
            self.usage.multi_column_pages += 1;
        }
        if record.needs_escalation {
            let entry = EscalationEntry {
                key: record.key.clone(),
                page: record.page,
                side: record.side,
                reason: record.escalation_reason.clone(),
            };
            if record.escalated {
                self.escalation.escalated.push(entry);
            } else {
                self.escalation.flagged_not_escalated.push(entry);
            }
        }
    }

    pub fn flagged(&self) -> impl Iterator<Item = &QualityEntry> {
        self.quality.iter().filter(|entry| entry.needs_escalation)
    }
}
