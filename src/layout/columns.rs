//! Column inference, whitespace-gap verification and the post-recognition
//! split gate.

use std::collections::BTreeMap;

use image::{DynamicImage, GrayImage};
use tracing::debug;

use crate::core::config::ColumnConfig;
use crate::core::geometry::BBox;
use crate::core::model::{ColumnMethod, ColumnSpan, OcrLine};
use crate::preprocess::deskew::analysis_gray;
use crate::quality::patterns::{
    average_word_length, ends_with_fragment, form_profile, starts_lowercase,
};

pub const ANALYSIS_WIDTH: u32 = 800;
const INK_THRESHOLD: u8 = 128;
const TWO_MEANS_ROUNDS: usize = 24;
const MIN_INK_MASS: f32 = 0.5;
const SHORT_WORD_LENGTH: f32 = 3.0;
const SHORT_WORD_MIN_WORDS: usize = 5;
const SHORT_WORD_CONFIDENCE: f32 = 0.7;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPlan {
    pub spans: Vec<ColumnSpan>,
    pub method: ColumnMethod,
}

impl ColumnPlan {
    pub fn single() -> Self {
        Self {
            spans: vec![ColumnSpan::full()],
            method: ColumnMethod::Single,
        }
    }

    pub fn is_split(&self) -> bool {
        self.spans.len() > 1
    }

    pub fn gap_count(&self) -> usize {
        self.spans.len().saturating_sub(1)
    }
}

/// Share of ink pixels in every pixel column.
pub fn ink_profile(gray: &GrayImage) -> Vec<f32> {
    let (w, h) = gray.dimensions();
    let mut counts = vec![0u32; w as usize];
    for (x, _, pixel) in gray.enumerate_pixels() {
        if pixel.0[0] < INK_THRESHOLD {
            counts[x as usize] += 1;
        }
    }
    counts.iter().map(|&c| c as f32 / h.max(1) as f32).collect()
}

struct TwoMeans {
    boundary: f32,
    left_mass: f32,
    right_mass: f32,
}

/// Weighted one-dimensional two-means; `None` when everything lands in one group.
fn two_means(points: &[(f32, f32)]) -> Option<TwoMeans> {
    let lo = points.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
    let hi = points.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
    if points.is_empty() || hi <= lo {
        return None;
    }
    let (mut left, mut right) = (lo, hi);
    let mut split = None;
    for _ in 0..TWO_MEANS_ROUNDS {
        let boundary = (left + right) / 2.0;
        let (mut lw, mut lsum, mut rw, mut rsum) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
        for &(x, w) in points {
            if x < boundary {
                lw += w;
                lsum += x * w;
            } else {
                rw += w;
                rsum += x * w;
            }
        }
        if lw <= 0.0 || rw <= 0.0 {
            return None;
        }
        let (next_left, next_right) = (lsum / lw, rsum / rw);
        split = Some(TwoMeans {
            boundary,
            left_mass: lw,
            right_mass: rw,
        });
        if (next_left - left).abs() < 1e-6 && (next_right - right).abs() < 1e-6 {
            break;
        }
        left = next_left;
        right = next_right;
    }
    split
}

/// Boundaries between provider-reported column indices.
fn provider_boundaries(lines: &[OcrLine]) -> Option<Vec<f32>> {
    let mut columns: BTreeMap<u8, Vec<Option<BBox>>> = BTreeMap::new();
    for line in lines {
        if let Some(column) = line.column {
            columns.entry(column).or_default().push(line.bbox);
        }
    }
    if columns.len() < 2 {
        return None;
    }
    let count = columns.len();
    let groups: Vec<&Vec<Option<BBox>>> = columns.values().collect();
    let mut boundaries = Vec::with_capacity(count - 1);
    for (k, pair) in groups.windows(2).enumerate() {
        let right_edge = pair[0].iter().flatten().map(|b| b.x1).fold(f32::NAN, f32::max);
        let left_edge = pair[1].iter().flatten().map(|b| b.x0).fold(f32::NAN, f32::min);
        let boundary = if right_edge.is_nan() || left_edge.is_nan() {
            (k + 1) as f32 / count as f32
        } else {
            (right_edge + left_edge) / 2.0
        };
        boundaries.push(boundary.clamp(0.0, 1.0));
    }
    if boundaries.windows(2).any(|w| w[1] <= w[0]) {
        return None;
    }
    Some(boundaries)
}

/// Candidate boundary from line geometry: two clusters of line centres, or
/// failing that the largest gap between sorted centres.
fn geometry_boundary(lines: &[OcrLine], config: &ColumnConfig) -> Option<(f32, ColumnMethod)> {
    let boxes: Vec<BBox> = lines
        .iter()
        .filter_map(|line| line.bbox)
        .filter(|bbox| bbox.width() < config.wide_line_fraction)
        .collect();
    let n = boxes.len();
    if n < config.min_lines_for_geometry {
        return None;
    }
    let min_group = config
        .min_group_size
        .max((config.min_group_fraction * n as f32).ceil() as usize);

    let mut centers: Vec<f32> = boxes.iter().map(|b| b.center().0).collect();
    centers.sort_by(f32::total_cmp);
    let spread = centers[n - 1] - centers[0];

    if spread >= config.min_center_spread {
        let points: Vec<(f32, f32)> = centers.iter().map(|&x| (x, 1.0)).collect();
        if let Some(split) = two_means(&points) {
            let (left, right): (Vec<&BBox>, Vec<&BBox>) =
                boxes.iter().partition(|b| b.center().0 < split.boundary);
            if left.len() >= min_group && right.len() >= min_group {
                let right_edge = left.iter().map(|b| b.x1).fold(f32::MIN, f32::max);
                let left_edge = right.iter().map(|b| b.x0).fold(f32::MAX, f32::min);
                let boundary = if right_edge < left_edge {
                    (right_edge + left_edge) / 2.0
                } else {
                    split.boundary
                };
                return Some((boundary, ColumnMethod::LineClusters));
            }
        }
    }

    let mut best: Option<(f32, f32)> = None;
    for i in (min_group.max(1) - 1)..n.saturating_sub(min_group) {
        let gap = centers[i + 1] - centers[i];
        if gap >= config.min_line_gap && best.map(|(g, _)| gap > g).unwrap_or(true) {
            best = Some((gap, (centers[i] + centers[i + 1]) / 2.0));
        }
    }
    best.map(|(_, boundary)| (boundary, ColumnMethod::LineGap))
}

/// Candidate boundary from two-means over ink x-positions.
fn pixel_boundary(profile: &[f32], config: &ColumnConfig) -> Option<f32> {
    let width = profile.len() as f32;
    let points: Vec<(f32, f32)> = profile
        .iter()
        .enumerate()
        .filter(|(_, &ink)| ink > 0.0)
        .map(|(x, &ink)| ((x as f32 + 0.5) / width, ink))
        .collect();
    let total: f32 = points.iter().map(|p| p.1).sum();
    if total < MIN_INK_MASS {
        return None;
    }
    let split = two_means(&points)?;
    let min_mass = config.min_group_fraction * total;
    (split.left_mass >= min_mass && split.right_mass >= min_mass).then_some(split.boundary)
}

/// Centre of the widest near-empty pixel run around `boundary`, if it is
/// wide enough and has ink on both sides.
pub fn verify_gap(profile: &[f32], boundary: f32, config: &ColumnConfig) -> Option<f32> {
    let width = profile.len();
    if width == 0 {
        return None;
    }
    let to_px = |f: f32| ((f * width as f32).round().max(0.0) as usize).min(width);
    let lo = to_px(boundary - config.gap_search_radius);
    let hi = to_px(boundary + config.gap_search_radius);
    let is_blank = |x: usize| profile[x] <= config.gap_ink_ratio;

    let mut best: Option<(usize, usize)> = None;
    let mut x = lo;
    while x < hi {
        if !is_blank(x) {
            x += 1;
            continue;
        }
        let start = x;
        while x < hi && is_blank(x) {
            x += 1;
        }
        if best.map(|(s, e)| x - start > e - s).unwrap_or(true) {
            best = Some((start, x));
        }
    }

    let (start, end) = best?;
    let wide_enough = (end - start) as f32 / width as f32 >= config.min_gap_fraction;
    let ink_left = (0..start).any(|x| !is_blank(x));
    let ink_right = (end..width).any(|x| !is_blank(x));
    (wide_enough && ink_left && ink_right).then(|| (start + end) as f32 / 2.0 / width as f32)
}

/// Column layout of a unit. Provider-reported columns are trusted outright;
/// any other candidate split survives only with a verified whitespace gap.
pub fn infer_columns(lines: &[OcrLine], gray: &GrayImage, config: &ColumnConfig) -> ColumnPlan {
    if let Some(boundaries) = provider_boundaries(lines) {
        return ColumnPlan {
            spans: ColumnSpan::from_boundaries(&boundaries),
            method: ColumnMethod::ProviderColumns,
        };
    }

    let profile = ink_profile(gray);
    let candidate = geometry_boundary(lines, config).or_else(|| {
        pixel_boundary(&profile, config).map(|b| (b, ColumnMethod::PixelProjection))
    });
    let Some((boundary, method)) = candidate else {
        return ColumnPlan::single();
    };

    match verify_gap(&profile, boundary, config) {
        Some(gap) => ColumnPlan {
            spans: ColumnSpan::from_boundaries(&[gap]),
            method,
        },
        None => {
            debug!(boundary, ?method, "no whitespace gap at candidate split, keeping one column");
            ColumnPlan::single()
        }
    }
}

/// Column layout inferred from a unit's own lines; form pages are never split.
pub fn plan_columns(lines: &[OcrLine], image: &DynamicImage, config: &ColumnConfig) -> ColumnPlan {
    let texts: Vec<&str> = lines.iter().map(|line| line.text.as_str()).collect();
    if form_profile(&texts).is_form() {
        return ColumnPlan::single();
    }
    infer_columns(lines, &analysis_gray(image, ANALYSIS_WIDTH), config)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SplitRejection {
    FormPage,
    Fragmented { column: usize, confidence: f32 },
}

impl SplitRejection {
    pub fn reason(&self) -> String {
        match self {
            SplitRejection::FormPage => "form_page".to_string(),
            SplitRejection::Fragmented { column, confidence } => {
                format!("fragmented_column:{column}:{confidence:.2}")
            }
        }
    }
}

/// How strongly one column's recognized lines look like text cut mid-sentence.
pub fn split_fragmentation_confidence<S: AsRef<str>>(lines: &[S], config: &ColumnConfig) -> f32 {
    let lines: Vec<&str> = lines
        .iter()
        .map(|line| line.as_ref().trim())
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return 0.0;
    }
    let n = lines.len() as f32;

    let short = lines
        .iter()
        .filter(|line| line.chars().count() <= config.short_line_chars)
        .count() as f32
        / n;
    let fragment_endings = lines.iter().filter(|line| ends_with_fragment(line)).count() as f32 / n;
    let broken = if lines.len() > 1 {
        lines
            .windows(2)
            .filter(|pair| ends_with_fragment(pair[0]) && starts_lowercase(pair[1]))
            .count() as f32
            / (n - 1.0)
    } else {
        0.0
    };
    let word_count: usize = lines.iter().map(|line| line.split_whitespace().count()).sum();
    let short_words = word_count >= SHORT_WORD_MIN_WORDS
        && average_word_length(&lines).map(|avg| avg < SHORT_WORD_LENGTH).unwrap_or(false);

    let mut confidence = fragment_endings * 1.5;
    if short > config.short_line_ratio {
        confidence = confidence.max(0.5 + short);
    }
    confidence = confidence.max(broken * 2.0);
    if short_words {
        confidence = confidence.max(SHORT_WORD_CONFIDENCE);
    }
    confidence.min(1.0)
}

/// Post-recognition gate over per-column line lists.
pub fn check_split<S: AsRef<str>>(
    columns: &[Vec<S>],
    config: &ColumnConfig,
) -> Result<(), SplitRejection> {
    let all: Vec<&str> = columns.iter().flatten().map(|line| line.as_ref()).collect();
    if form_profile(&all).is_form() {
        return Err(SplitRejection::FormPage);
    }
    for (column, lines) in columns.iter().enumerate() {
        let confidence = split_fragmentation_confidence(lines, config);
        if confidence >= config.fragment_reject_confidence {
            return Err(SplitRejection::Fragmented { column, confidence });
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use image::{GrayImage, Luma};

    /// Synthetic page of staggered "word" blocks inside each `(x0, x1)` block.
    pub fn text_blocks(width: u32, height: u32, blocks: &[(u32, u32)]) -> GrayImage {
        let mut img = GrayImage::from_pixel(width, height, Luma([255]));
        for (row, y) in (20..height.saturating_sub(20)).step_by(14).enumerate() {
            for &(x0, x1) in blocks {
                let mut x = x0 + (row as u32 * 7) % 11;
                while x < x1 {
                    let end = (x + 18).min(x1);
                    for px in x..end {
                        for py in y..(y + 7).min(height) {
                            img.put_pixel(px, py, Luma([0]));
                        }
                    }
                    x = end + 5;
                }
            }
        }
        img
    }
}
