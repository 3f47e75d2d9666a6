use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::core::config::FusionConfig;
use crate::core::dictionary;
use crate::core::model::AlignedLine;

/// Letters and symbols commonly read in place of digits.
const LETTER_AS_DIGIT: &[(char, char)] = &[
    ('O', '0'),
    ('o', '0'),
    ('D', '0'),
    ('Q', '0'),
    ('I', '1'),
    ('l', '1'),
    ('i', '1'),
    ('|', '1'),
    ('!', '1'),
    ('Z', '2'),
    ('z', '2'),
    ('S', '5'),
    ('s', '5'),
    ('G', '6'),
    ('b', '6'),
    ('T', '7'),
    ('B', '8'),
    ('g', '9'),
    ('q', '9'),
];

/// Digits commonly read in place of letters, used for the dictionary tie-break.
const DIGIT_AS_LETTER: &[(char, &[char])] = &[
    ('0', &['o']),
    ('1', &['i', 'l']),
    ('2', &['z']),
    ('5', &['s']),
    ('6', &['g', 'b']),
    ('7', &['t']),
    ('8', &['b']),
    ('9', &['g', 'q']),
];

const MAX_TIE_BREAK_COMBINATIONS: usize = 64;

fn letter_as_digit(c: char) -> Option<char> {
    LETTER_AS_DIGIT.iter().find(|(from, _)| *from == c).map(|(_, to)| *to)
}

fn digit_as_letters(c: char) -> Option<&'static [char]> {
    DIGIT_AS_LETTER.iter().find(|(from, _)| *from == c).map(|(_, to)| *to)
}

fn is_letterish(c: char) -> bool {
    c.is_alphabetic() || c == '|' || c == '!'
}

/// Short, digit-bearing line with at most a couple of letters: the only
/// shape the glyph table is ever applied to.
pub fn is_numeric_candidate(line: &str, config: &FusionConfig) -> bool {
    let trimmed = line.trim();
    let chars = trimmed.chars().count();
    let digits = trimmed.chars().filter(|c| c.is_ascii_digit()).count();
    let letters = trimmed.chars().filter(|c| c.is_alphabetic()).count();
    chars > 0 && chars <= config.glyph_max_len && digits >= 1 && letters <= config.glyph_max_letters
}

/// Numeric candidate that still mixes digits with letter-like glyphs.
pub fn needs_rescan(line: &str, config: &FusionConfig) -> bool {
    is_numeric_candidate(line, config)
        && line.split_whitespace().any(|token| {
            token.chars().any(|c| c.is_ascii_digit()) && token.chars().any(is_letterish)
        })
}

fn split_punctuation(token: &str) -> (&str, &str, &str) {
    let start = token
        .char_indices()
        .find(|(_, c)| !matches!(c, '(' | '[' | '"' | '\''))
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    let end = token
        .char_indices()
        .rev()
        .find(|(_, c)| !matches!(c, '.' | ',' | ';' | ':' | ')' | ']' | '"' | '\'' | '?'))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(start)
        .max(start);
    (&token[..start], &token[start..end], &token[end..])
}

/// Interpretation of `core` as a dictionary word, reading digits as letters.
fn word_reading(core: &str) -> Option<String> {
    let letters_upper = core.chars().filter(|c| c.is_alphabetic()).all(|c| c.is_uppercase())
        && core.chars().any(|c| c.is_alphabetic());
    let mut readings: Vec<String> = vec![String::new()];
    for c in core.chars() {
        let options: Vec<char> = if c.is_ascii_digit() {
            let Some(letters) = digit_as_letters(c) else {
                return None;
            };
            letters
                .iter()
                .map(|l| if letters_upper { l.to_ascii_uppercase() } else { *l })
                .collect()
        } else {
            vec![c]
        };
        readings = readings
            .iter()
            .flat_map(|prefix| options.iter().map(move |o| format!("{prefix}{o}")))
            .collect();
        if readings.len() > MAX_TIE_BREAK_COMBINATIONS {
            return None;
        }
    }
    readings.into_iter().find(|candidate| dictionary::is_word(candidate))
}

fn digit_reading(core: &str) -> Option<String> {
    core.chars()
        .map(|c| {
            if c.is_ascii_digit() {
                Some(c)
            } else if is_letterish(c) {
                letter_as_digit(c)
            } else {
                Some(c)
            }
        })
        .collect()
}

fn repair_token(token: &str) -> String {
    let (lead, core, trail) = split_punctuation(token);
    if !core.chars().any(is_letterish) {
        return token.to_string();
    }
    // Real words and capitalized names are never rewritten.
    if dictionary::is_word(core) || dictionary::is_capitalized_name(core) {
        return token.to_string();
    }
    let has_digit = core.chars().any(|c| c.is_ascii_digit());
    if has_digit {
        if let Some(word) = word_reading(core) {
            return format!("{lead}{word}{trail}");
        }
    }
    match digit_reading(core) {
        Some(digits) => format!("{lead}{digits}{trail}"),
        None => token.to_string(),
    }
}

/// Glyph-confusion repair for short numeric lines; `None` when the line is
/// out of scope or the table changes nothing.
pub fn glyph_repair(line: &str, config: &FusionConfig) -> Option<String> {
    if !is_numeric_candidate(line, config) {
        return None;
    }
    let repaired = line.split(' ').map(repair_token).collect::<Vec<_>>().join(" ");
    (repaired != line).then_some(repaired)
}

static TURN_TO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\b(turn|tum|tumn|turm|tarn|tirn|tnrn|tuin|tun|iurn|lurn|furn)",
        r"(\s+)(to|t0|lo|l0|io|i0|fo|ta)(\s+)(\d+)",
    ))
    .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LetterCase {
    Upper,
    Title,
    Lower,
}

fn case_of(word: &str) -> LetterCase {
    let letters: Vec<char> = word.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        LetterCase::Upper
    } else if letters.first().map(|c| c.is_uppercase()).unwrap_or(false) {
        LetterCase::Title
    } else {
        LetterCase::Lower
    }
}

fn with_case(word: &str, case: LetterCase) -> String {
    match case {
        LetterCase::Upper => word.to_uppercase(),
        LetterCase::Lower => word.to_lowercase(),
        LetterCase::Title => {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
    }
}

/// Fix misread "turn to N" directives, only when a numeral follows, keeping
/// the original letter case.
pub fn phrase_repair(line: &str) -> Option<String> {
    let repaired = TURN_TO.replace_all(line, |caps: &Captures| {
        let verb_case = case_of(&caps[1]);
        let prep_case = match verb_case {
            LetterCase::Upper => LetterCase::Upper,
            _ if caps[3].starts_with(|c: char| c.is_uppercase()) => LetterCase::Title,
            _ => LetterCase::Lower,
        };
        format!(
            "{}{}{}{}{}",
            with_case("turn", verb_case),
            &caps[2],
            with_case("to", prep_case),
            &caps[4],
            &caps[5]
        )
    });
    (repaired != line).then(|| repaired.into_owned())
}

/// Phrase and glyph repair over fused lines, tagging what changed.
pub fn apply_text_repairs(lines: &mut [AlignedLine], config: &FusionConfig) {
    for line in lines.iter_mut() {
        if let Some(fixed) = phrase_repair(&line.text) {
            line.text = fixed;
            line.repairs.push("phrase".to_string());
        }
        if let Some(fixed) = glyph_repair(&line.text, config) {
            line.text = fixed;
            line.repairs.push("glyph".to_string());
        }
    }
}
