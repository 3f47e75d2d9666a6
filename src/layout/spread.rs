//! Two-page spread detection and gutter placement.
//!
//! The spread decision is taken once per run from a handful of sampled pages.
//! Individual spreads are then split at a per-page refined gutter, falling
//! back to the image centre when the page gives no clear binding signal.

use image::{DynamicImage, GenericImageView, GrayImage};
use tracing::{debug, info};

use crate::core::config::SpreadConfig;
use crate::core::model::{SpreadDecision, SpreadMode};
use crate::preprocess::deskew::analysis_gray;

const CANDIDATES_FOR_CONTINUITY: usize = 8;
const ROW_BAND: u32 = 4;
const ROW_SIGNAL_MIN: f32 = 12.0;
const AGREEMENT_SCALE: f32 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GutterKind {
    /// White paper between the pages.
    Bright,
    /// Binding shadow.
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GutterCandidate {
    pub position: f32,
    pub contrast: f32,
    pub sharpness: f32,
    pub continuity: f32,
    pub score: f32,
    pub kind: GutterKind,
}

fn column_means(gray: &GrayImage) -> Vec<f32> {
    let (w, h) = gray.dimensions();
    let mut sums = vec![0u64; w as usize];
    for (x, _, pixel) in gray.enumerate_pixels() {
        sums[x as usize] += pixel.0[0] as u64;
    }
    let raw: Vec<f32> = sums.iter().map(|&s| s as f32 / h.max(1) as f32).collect();
    (0..raw.len())
        .map(|i| {
            let lo = i.saturating_sub(1);
            let hi = (i + 1).min(raw.len() - 1);
            raw[lo..=hi].iter().sum::<f32>() / (hi - lo + 1) as f32
        })
        .collect()
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

fn region_mean(gray: &GrayImage, x0: u32, x1: u32, y0: u32, y1: u32) -> f32 {
    let mut sum = 0u64;
    let mut count = 0u64;
    for y in y0..y1 {
        for x in x0..x1 {
            sum += gray.get_pixel(x, y).0[0] as u64;
            count += 1;
        }
    }
    if count == 0 {
        255.0
    } else {
        sum as f32 / count as f32
    }
}

struct SideWindows {
    near: usize,
    far: usize,
}

impl SideWindows {
    fn for_width(width: usize) -> Self {
        let near = (width / 50).max(2);
        let far = (width * 2 / 25).max(near + 2);
        Self { near, far }
    }

    fn left(&self, x: usize) -> (usize, usize) {
        (x.saturating_sub(self.far), x.saturating_sub(self.near))
    }

    fn right(&self, x: usize, width: usize) -> (usize, usize) {
        ((x + self.near).min(width), (x + self.far).min(width))
    }
}

/// Fraction of row bands in which the column at `x` stands out from its sides
/// in the direction of `kind`.
fn vertical_continuity(gray: &GrayImage, x: usize, windows: &SideWindows, kind: GutterKind) -> f32 {
    let (w, h) = gray.dimensions();
    let width = w as usize;
    let (ll, lr) = windows.left(x);
    let (rl, rr) = windows.right(x, width);
    let cx0 = x.saturating_sub(1) as u32;
    let cx1 = ((x + 2).min(width)) as u32;

    let mut bands = 0u32;
    let mut hits = 0u32;
    let mut y = 0;
    while y < h {
        let y1 = (y + ROW_BAND).min(h);
        let centre = region_mean(gray, cx0, cx1, y, y1);
        let left = region_mean(gray, ll as u32, lr as u32, y, y1);
        let right = region_mean(gray, rl as u32, rr as u32, y, y1);
        let diff = centre - (left + right) / 2.0;
        let signal = match kind {
            GutterKind::Bright => diff > ROW_SIGNAL_MIN,
            GutterKind::Dark => diff < -ROW_SIGNAL_MIN,
        };
        if signal {
            hits += 1;
        }
        bands += 1;
        y = y1;
    }
    if bands == 0 {
        0.0
    } else {
        hits as f32 / bands as f32
    }
}

/// Strongest vertical discontinuity near the image centre.
pub fn detect_gutter(gray: &GrayImage, config: &SpreadConfig) -> Option<GutterCandidate> {
    let (w, h) = gray.dimensions();
    if w < 20 || h < 4 {
        return None;
    }
    let width = w as usize;
    let profile = column_means(gray);
    let windows = SideWindows::for_width(width);

    let lo = (((0.5 - config.search_radius) * w as f32) as usize).max(windows.far);
    let hi = (((0.5 + config.search_radius) * w as f32) as usize)
        .min(width.saturating_sub(windows.far));
    if lo >= hi {
        return None;
    }

    let mut scored: Vec<(usize, f32, f32, GutterKind)> = (lo..hi)
        .map(|x| {
            let (ll, lr) = windows.left(x);
            let (rl, rr) = windows.right(x, width);
            let side = (mean(&profile[ll..lr]) + mean(&profile[rl..rr])) / 2.0;
            let diff = profile[x] - side;
            let kind = if diff >= 0.0 { GutterKind::Bright } else { GutterKind::Dark };
            let contrast = diff.abs() / 255.0;
            let before = profile[x.saturating_sub(2)];
            let after = profile[(x + 2).min(width - 1)];
            let sharpness = (profile[x] - before).abs().max((profile[x] - after).abs()) / 255.0;
            (x, contrast, sharpness, kind)
        })
        .collect();
    scored.sort_by(|a, b| {
        let sa = a.1 * 0.7 + a.2 * 0.3;
        let sb = b.1 * 0.7 + b.2 * 0.3;
        sb.total_cmp(&sa)
    });

    scored
        .into_iter()
        .take(CANDIDATES_FOR_CONTINUITY)
        .map(|(x, contrast, sharpness, kind)| {
            let continuity = vertical_continuity(gray, x, &windows, kind);
            GutterCandidate {
                position: (x as f32 + 0.5) / w as f32,
                contrast,
                sharpness,
                continuity,
                score: contrast * 0.3 + sharpness * 0.1 + continuity * 0.6,
                kind,
            }
        })
        .max_by(|a, b| a.score.total_cmp(&b.score))
}

/// Evenly spread sample positions: first, last and the middle in between.
pub fn sample_indices(total: usize, samples: usize) -> Vec<usize> {
    let n = samples.min(total);
    match n {
        0 => Vec::new(),
        1 => vec![0],
        _ => {
            let mut indices: Vec<usize> = (0..n).map(|i| i * (total - 1) / (n - 1)).collect();
            indices.dedup();
            indices
        }
    }
}

fn median(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

fn std_dev(values: &[f32]) -> f32 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f32>() / values.len() as f32).sqrt()
}

/// Run-level spread decision over the sampled page images.
pub fn decide_spread(samples: &[DynamicImage], config: &SpreadConfig) -> SpreadDecision {
    let mut decision = SpreadDecision::single(samples.len());
    if samples.is_empty() {
        return decision;
    }

    let mut landscape_samples = 0;
    let mut gutter_positions = Vec::new();
    let mut confident_positions = Vec::new();
    for image in samples {
        let (w, h) = image.dimensions();
        if h == 0 || (w as f32 / h as f32) <= config.landscape_ratio {
            continue;
        }
        landscape_samples += 1;
        let gray = analysis_gray(image, config.analysis_width);
        let Some(candidate) = detect_gutter(&gray, config) else {
            continue;
        };
        debug!(?candidate, "spread sample gutter");
        gutter_positions.push(candidate.position);
        if candidate.contrast >= config.min_confident_contrast {
            confident_positions.push(candidate.position);
        }
    }

    decision.landscape_samples = landscape_samples;
    decision.confident_samples = confident_positions.len();
    if gutter_positions.is_empty() {
        return decision;
    }

    let mut chosen = if confident_positions.is_empty() {
        gutter_positions.clone()
    } else {
        confident_positions.clone()
    };
    let gutter = median(&mut chosen).clamp(config.gutter_min, config.gutter_max);
    let agreement = 1.0 / (1.0 + std_dev(&chosen) / AGREEMENT_SCALE);
    let confident_fraction = confident_positions.len() as f32 / gutter_positions.len() as f32;

    decision.is_spread =
        decision.landscape_samples * 2 > samples.len() && !confident_positions.is_empty();
    decision.mode = if decision.is_spread { SpreadMode::Spread } else { SpreadMode::Single };
    decision.gutter = gutter;
    decision.confidence = (0.5 * agreement + 0.5 * confident_fraction).clamp(0.0, 1.0);

    info!(
        is_spread = decision.is_spread,
        gutter = decision.gutter,
        confidence = decision.confidence,
        "spread decision"
    );
    decision
}

/// Gutter position for one spread: the page's own binding when it is clear
/// and off-centre, otherwise the centre.
pub fn refine_gutter(image: &DynamicImage, config: &SpreadConfig) -> f32 {
    let gray = analysis_gray(image, config.analysis_width);
    match detect_gutter(&gray, config) {
        Some(candidate)
            if candidate.contrast >= config.refine_min_contrast
                && candidate.continuity >= config.refine_min_continuity
                && (candidate.position - 0.5).abs() > config.refine_center_tolerance =>
        {
            debug!(position = candidate.position, "using per-page gutter");
            candidate.position
        }
        _ => 0.5,
    }
}

pub fn split_spread(image: &DynamicImage, gutter: f32) -> (DynamicImage, DynamicImage) {
    let (w, h) = image.dimensions();
    let split = ((gutter * w as f32).round() as u32).clamp(1, w.saturating_sub(1).max(1));
    let left = image.crop_imm(0, 0, split, h);
    let right = image.crop_imm(split, 0, w - split, h);
    (left, right)
}
