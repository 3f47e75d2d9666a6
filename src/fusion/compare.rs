use std::collections::HashSet;

use strsim::normalized_levenshtein;

/// Trimmed, whitespace-collapsed form used for every comparison.
pub fn comparison_key(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Character-level similarity of two lines (1.0 identical, 0.0 unrelated).
pub fn line_similarity(a: &str, b: &str) -> f32 {
    let a = comparison_key(a);
    let b = comparison_key(b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    normalized_levenshtein(&a, &b) as f32
}

pub fn line_distance(a: &str, b: &str) -> f32 {
    1.0 - line_similarity(a, b)
}

/// Page-level similarity of two providers' raw text.
pub fn text_similarity(a: &str, b: &str) -> f32 {
    let a = comparison_key(a);
    let b = comparison_key(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let base = normalized_levenshtein(&a, &b) as f32;
    let overlap = token_overlap(&a, &b);
    let mut score = base * 0.8 + overlap * 0.2;

    if numeric_mismatch(&a, &b) {
        score -= 0.05;
    }

    score.clamp(0.0, 1.0)
}

fn token_overlap(a: &str, b: &str) -> f32 {
    let a_tokens: HashSet<_> = a.split_whitespace().collect();
    let b_tokens: HashSet<_> = b.split_whitespace().collect();
    if a_tokens.is_empty() || b_tokens.is_empty() {
        return 0.0;
    }
    let intersection = a_tokens.intersection(&b_tokens).count() as f32;
    let union = a_tokens.union(&b_tokens).count() as f32;
    intersection / union
}

fn numeric_mismatch(a: &str, b: &str) -> bool {
    let digits_a: String = a.chars().filter(|c| c.is_ascii_digit()).collect();
    let digits_b: String = b.chars().filter(|c| c.is_ascii_digit()).collect();
    !digits_a.is_empty() && !digits_b.is_empty() && digits_a != digits_b
}

/// Characters of a line that carry content.
pub fn content_len(text: &str) -> usize {
    text.trim().chars().count()
}
