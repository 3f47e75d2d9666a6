//! Declarative heuristic tables.
//!
//! These tables are the policy of the evaluator and the column gate; each
//! entry is tested on its own, independently of any image.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::dictionary;

pub struct CorruptionPattern {
    pub tag: &'static str,
    pub regex: Regex,
    pub weight_per_hit: f32,
    pub cap: f32,
}

impl CorruptionPattern {
    pub fn score(&self, text: &str) -> (usize, f32) {
        let hits = self.regex.find_iter(text).count();
        (hits, (hits as f32 * self.weight_per_hit).min(self.cap))
    }
}

pub static CORRUPTION_PATTERNS: LazyLock<Vec<CorruptionPattern>> = LazyLock::new(|| {
    vec![
        CorruptionPattern {
            tag: "bar_digit",
            regex: Regex::new(r"\|\s?\d|\d\s?\|").unwrap(),
            weight_per_hit: 0.1,
            cap: 0.6,
        },
        CorruptionPattern {
            tag: "symbol_run",
            regex: Regex::new(r#"[^\p{L}\p{N}\s.,;:!?'"()\-]{3,}"#).unwrap(),
            weight_per_hit: 0.15,
            cap: 0.45,
        },
    ]
});

/// Average word length above which text is treated as run-together.
pub const FUSED_WORD_LENGTH: f32 = 12.0;
pub const FUSED_WORD_WEIGHT: f32 = 0.3;
/// Alphabetic share of non-space characters below which text is suspect.
pub const MIN_ALPHA_RATIO: f32 = 0.6;
pub const LOW_ALPHA_WEIGHT: f32 = 0.3;
pub const MIN_CHARS_FOR_RATIOS: usize = 20;

/// Stat-sheet vocabulary of adventure/answer-sheet pages.
pub const FORM_KEYWORDS: &[&str] = &[
    "skill",
    "stamina",
    "luck",
    "gold",
    "provisions",
    "equipment",
    "jewels",
    "potions",
    "potion",
    "monster encounter boxes",
    "adventure sheet",
    "attack strength",
    "initial",
    "items",
    "notes",
    "score",
];

static FORM_KEYWORD_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    FORM_KEYWORDS
        .iter()
        .map(|keyword| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(keyword))).unwrap())
        .collect()
});

pub const FORM_SHORT_LINE_CHARS: usize = 25;
pub const FORM_SHORT_LINE_RATIO: f32 = 0.5;
pub const FORM_EQUALS_RATIO: f32 = 0.15;
pub const FORM_KEYWORD_HITS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormProfile {
    pub short_line_ratio: f32,
    pub equals_ratio: f32,
    pub keyword_hits: usize,
}

impl FormProfile {
    pub fn is_form(&self) -> bool {
        self.short_line_ratio >= FORM_SHORT_LINE_RATIO
            && (self.equals_ratio >= FORM_EQUALS_RATIO || self.keyword_hits >= FORM_KEYWORD_HITS)
    }
}

pub fn form_profile<S: AsRef<str>>(lines: &[S]) -> FormProfile {
    let lines: Vec<&str> = lines
        .iter()
        .map(|line| line.as_ref().trim())
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return FormProfile {
            short_line_ratio: 0.0,
            equals_ratio: 0.0,
            keyword_hits: 0,
        };
    }
    let n = lines.len() as f32;
    let short = lines
        .iter()
        .filter(|line| line.chars().count() < FORM_SHORT_LINE_CHARS)
        .count();
    let with_equals = lines.iter().filter(|line| line.contains('=')).count();
    let joined = lines.join("\n");
    let keyword_hits = FORM_KEYWORD_PATTERNS
        .iter()
        .filter(|pattern| pattern.is_match(&joined))
        .count();
    FormProfile {
        short_line_ratio: short as f32 / n,
        equals_ratio: with_equals as f32 / n,
        keyword_hits,
    }
}

pub const FRAGMENT_MAX_CHARS: usize = 3;

/// Line ends in a short alphabetic token that is not a word and is not
/// closed by punctuation, e.g. `the dragon ro`.
pub fn ends_with_fragment(line: &str) -> bool {
    let trimmed = line.trim_end();
    match trimmed.chars().last() {
        Some(c) if c.is_alphabetic() => {}
        _ => return false,
    }
    let Some(last) = trimmed.split_whitespace().last() else {
        return false;
    };
    let count = last.chars().count();
    count <= FRAGMENT_MAX_CHARS
        && last.chars().all(|c| c.is_alphabetic())
        && !dictionary::is_word(last)
}

pub fn starts_lowercase(line: &str) -> bool {
    line.trim_start()
        .chars()
        .next()
        .map(|c| c.is_lowercase())
        .unwrap_or(false)
}

pub fn average_word_length<S: AsRef<str>>(lines: &[S]) -> Option<f32> {
    let mut words = 0usize;
    let mut chars = 0usize;
    for line in lines {
        for word in line.as_ref().split_whitespace() {
            words += 1;
            chars += word.chars().count();
        }
    }
    (words > 0).then(|| chars as f32 / words as f32)
}
