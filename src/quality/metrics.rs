use crate::core::config::QualityConfig;
use crate::core::model::{AlignedLine, ProviderReading, QualityMetrics};
use crate::fusion::compare::text_similarity;
use crate::quality::patterns::{
    ends_with_fragment, CORRUPTION_PATTERNS, FUSED_WORD_LENGTH, FUSED_WORD_WEIGHT, LOW_ALPHA_WEIGHT,
    MIN_ALPHA_RATIO, MIN_CHARS_FOR_RATIOS,
};

/// Lines at or under this many characters count as very short.
pub const SHORT_LINE_CHARS: usize = 5;
pub const SHORT_LINE_RATIO_THRESHOLD: f32 = 0.25;
pub const FRAGMENT_END_RATIO_THRESHOLD: f32 = 0.2;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signal {
    pub score: f32,
    pub tags: Vec<String>,
}

pub fn corruption(text: &str) -> Signal {
    let mut signal = Signal::default();
    for pattern in CORRUPTION_PATTERNS.iter() {
        let (hits, score) = pattern.score(text);
        if hits > 0 {
            signal.score += score;
            signal.tags.push(pattern.tag.to_string());
        }
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if !words.is_empty() {
        let letters: usize = words.iter().map(|w| w.chars().count()).sum();
        let avg = letters as f32 / words.len() as f32;
        if avg > FUSED_WORD_LENGTH {
            signal.score += FUSED_WORD_WEIGHT;
            signal.tags.push("fused_words".to_string());
        }
    }

    let visible: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if visible.len() >= MIN_CHARS_FOR_RATIOS {
        let alpha = visible.iter().filter(|c| c.is_alphabetic()).count() as f32;
        if alpha / (visible.len() as f32) < MIN_ALPHA_RATIO {
            signal.score += LOW_ALPHA_WEIGHT;
            signal.tags.push("low_alpha".to_string());
        }
    }

    signal.score = signal.score.min(1.0);
    signal
}

/// Below the threshold a ratio contributes gently; at or above it the
/// component jumps so that one signal alone can raise concern.
fn thresholded(ratio: f32, threshold: f32) -> f32 {
    if ratio >= threshold {
        0.35 + 0.65 * (ratio - threshold) / (1.0 - threshold)
    } else {
        0.3 * ratio / threshold
    }
}

pub fn fragmentation<S: AsRef<str>>(lines: &[S]) -> Signal {
    let lines: Vec<&str> = lines
        .iter()
        .map(|line| line.as_ref().trim())
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return Signal::default();
    }
    let n = lines.len() as f32;
    let short = lines.iter().filter(|l| l.chars().count() <= SHORT_LINE_CHARS).count() as f32 / n;
    let fragments = lines.iter().filter(|l| ends_with_fragment(l)).count() as f32 / n;

    let mut signal = Signal {
        score: thresholded(short, SHORT_LINE_RATIO_THRESHOLD)
            .max(thresholded(fragments, FRAGMENT_END_RATIO_THRESHOLD))
            .min(1.0),
        tags: Vec::new(),
    };
    if short >= SHORT_LINE_RATIO_THRESHOLD {
        signal.tags.push("short_lines".to_string());
    }
    if fragments >= FRAGMENT_END_RATIO_THRESHOLD {
        signal.tags.push("fragment_endings".to_string());
    }
    signal
}

pub fn missing_content(
    line_count: usize,
    avg_line_len: f32,
    corruption: f32,
    config: &QualityConfig,
) -> f32 {
    let mut score = if line_count == 0 {
        1.0
    } else if line_count < config.min_lines {
        0.5
    } else {
        0.0
    };
    if line_count > 0 && avg_line_len < config.min_avg_line_len {
        score += 0.4 * (1.0 - avg_line_len / config.min_avg_line_len) + 0.2;
    }
    if corruption > 0.5 {
        score += corruption * 0.4;
    }
    score.min(1.0)
}

/// Mean pairwise `1 - similarity` over providers that produced text.
pub fn disagreement<'a, I>(readings: I) -> f32
where
    I: IntoIterator<Item = &'a ProviderReading>,
{
    let texts: Vec<&str> = readings
        .into_iter()
        .filter(|r| !r.is_empty())
        .map(|r| r.text.as_str())
        .collect();
    if texts.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    let mut pairs = 0;
    for i in 0..texts.len() {
        for j in (i + 1)..texts.len() {
            total += 1.0 - text_similarity(texts[i], texts[j]);
            pairs += 1;
        }
    }
    (total / pairs as f32).clamp(0.0, 1.0)
}

pub fn high_distance_ratio(lines: &[AlignedLine], threshold: f32) -> f32 {
    if lines.is_empty() {
        return 0.0;
    }
    lines.iter().filter(|line| line.distance > threshold).count() as f32 / lines.len() as f32
}

/// Score one unit after fusion.
pub fn evaluate(
    lines: &[AlignedLine],
    readings: &[&ProviderReading],
    config: &QualityConfig,
) -> QualityMetrics {
    let texts: Vec<&str> = lines.iter().map(|line| line.text.as_str()).collect();
    let joined = texts.join("\n");
    let line_count = texts.iter().filter(|t| !t.trim().is_empty()).count();
    let avg_line_len = if line_count == 0 {
        0.0
    } else {
        texts.iter().map(|t| t.trim().chars().count()).sum::<usize>() as f32 / line_count as f32
    };

    let corruption = corruption(&joined);
    let fragmentation = fragmentation(&texts);
    let missing = missing_content(line_count, avg_line_len, corruption.score, config);
    let disagreement = disagreement(readings.iter().copied());

    let weights = &config.weights;
    let quality_score = (disagreement * weights.disagreement)
        .max(corruption.score * weights.corruption)
        .max(missing * weights.missing_content)
        .max(fragmentation.score * weights.fragmentation);

    let mut patterns = corruption.tags;
    patterns.extend(fragmentation.tags);

    QualityMetrics {
        disagreement_score: disagreement,
        corruption_score: corruption.score,
        missing_content_score: missing,
        fragmentation_score: fragmentation.score,
        quality_score,
        high_distance_ratio: high_distance_ratio(lines, config.high_distance),
        line_count,
        avg_line_len,
        patterns,
    }
}
