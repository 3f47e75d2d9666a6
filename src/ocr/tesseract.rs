//! Tesseract provider, driven through its command-line interface.

use std::collections::HashMap;
use std::process::Command;
use std::time::{Duration, Instant};

use image::{DynamicImage, GenericImageView, ImageFormat};

use super::process::run_with_timeout;
use super::{Provider, ProviderError, RecognitionHint};
use crate::core::config::ProviderSpec;
use crate::core::geometry::BBox;
use crate::core::model::{OcrLine, ProviderReading, ProviderRole};

const WORD_LEVEL: u32 = 5;

pub struct TesseractProvider {
    name: String,
    role: ProviderRole,
    program: String,
    language: String,
    extra_args: Vec<String>,
    timeout: Duration,
}

impl TesseractProvider {
    pub fn new(spec: &ProviderSpec) -> Self {
        Self {
            name: spec.name.clone(),
            role: spec.role,
            program: spec.program.clone().unwrap_or_else(|| "tesseract".to_string()),
            language: spec.language.clone(),
            extra_args: spec.args.clone(),
            timeout: Duration::from_secs(spec.timeout_secs),
        }
    }

    /// Page segmentation mode per hint: automatic layout for pages, a single
    /// uniform block for the fallback re-read, one line for band rescans.
    fn page_segmentation(hint: RecognitionHint) -> &'static str {
        match hint {
            RecognitionHint::Page => "3",
            RecognitionHint::Fallback => "6",
            RecognitionHint::SingleLine => "7",
        }
    }
}

impl Provider for TesseractProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> ProviderRole {
        self.role
    }

    fn is_available(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    fn availability_hint(&self) -> String {
        format!("{} not installed. Install with: apt install tesseract-ocr", self.program)
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn recognize(
        &self,
        image: &DynamicImage,
        hint: RecognitionHint,
    ) -> Result<ProviderReading, ProviderError> {
        let start = Instant::now();
        let (width, height) = image.dimensions();

        let file = tempfile::Builder::new().prefix("pagefuse-").suffix(".png").tempfile()?;
        image.save_with_format(file.path(), ImageFormat::Png)?;

        let mut command = Command::new(&self.program);
        command
            .arg(file.path())
            .arg("stdout")
            .args(["-l", &self.language])
            .args(["--psm", Self::page_segmentation(hint)])
            .args(&self.extra_args)
            .arg("tsv");
        let output = run_with_timeout(command, self.timeout)?;

        let lines = parse_tsv(&output.stdout, width, height)?;
        let text = lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ProviderReading {
            provider: self.name.clone(),
            role: self.role,
            text,
            lines: Some(lines),
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}

struct LineAccumulator {
    words: Vec<String>,
    bbox: BBox,
    confidence_sum: f32,
    confidence_count: u32,
}

/// Group word rows of Tesseract TSV output into lines, in emission order.
pub fn parse_tsv(tsv: &str, page_w: u32, page_h: u32) -> Result<Vec<OcrLine>, ProviderError> {
    let mut rows = tsv.lines();
    let header = rows
        .next()
        .ok_or_else(|| ProviderError::Parse("empty tsv output".to_string()))?;
    let columns: Vec<&str> = header.split('\t').collect();
    let index = |name: &str| {
        columns
            .iter()
            .position(|c| *c == name)
            .ok_or_else(|| ProviderError::Parse(format!("tsv header missing {name}")))
    };
    let (level, block, par, line, left, top, width, height, conf, text) = (
        index("level")?,
        index("block_num")?,
        index("par_num")?,
        index("line_num")?,
        index("left")?,
        index("top")?,
        index("width")?,
        index("height")?,
        index("conf")?,
        index("text")?,
    );

    let mut order: Vec<(u32, u32, u32)> = Vec::new();
    let mut lines: HashMap<(u32, u32, u32), LineAccumulator> = HashMap::new();
    for row in rows {
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < columns.len() {
            continue;
        }
        let number = |i: usize| fields[i].trim().parse::<f32>().unwrap_or(0.0);
        if number(level) as u32 != WORD_LEVEL {
            continue;
        }
        let word = fields[text].trim();
        if word.is_empty() {
            continue;
        }
        let key = (number(block) as u32, number(par) as u32, number(line) as u32);
        let bbox = BBox::from_pixels(
            number(left),
            number(top),
            number(width),
            number(height),
            page_w,
            page_h,
        );
        let confidence = number(conf);

        let entry = lines.entry(key).or_insert_with(|| {
            order.push(key);
            LineAccumulator {
                words: Vec::new(),
                bbox,
                confidence_sum: 0.0,
                confidence_count: 0,
            }
        });
        entry.words.push(word.to_string());
        entry.bbox = entry.bbox.union(&bbox);
        if confidence >= 0.0 {
            entry.confidence_sum += confidence / 100.0;
            entry.confidence_count += 1;
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|key| lines.remove(&key))
        .map(|acc| OcrLine {
            text: acc.words.join(" "),
            bbox: Some(acc.bbox),
            column: None,
            confidence: (acc.confidence_count > 0)
                .then(|| acc.confidence_sum / acc.confidence_count as f32),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\t\
left\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t200\t100\t-1\t
4\t1\t1\t1\t1\t0\t10\t10\t80\t10\t-1\t
5\t1\t1\t1\t1\t1\t10\t10\t30\t10\t96.5\tTurn
5\t1\t1\t1\t1\t2\t45\t10\t15\t10\t90\tto
5\t1\t1\t1\t1\t3\t65\t10\t25\t10\t93.5\t42
5\t1\t1\t1\t2\t1\t10\t30\t40\t10\t80\tGood
5\t1\t1\t1\t2\t2\t55\t30\t40\t10\t-1\t 
5\t1\t2\t1\t1\t1\t110\t10\t50\t10\t70\tright
";

    #[test]
    fn groups_words_into_lines() {
        let lines = parse_tsv(TSV, 200, 100).unwrap();
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["Turn to 42", "Good", "right"]);

        let first = lines[0].bbox.unwrap();
        assert!((first.x0 - 0.05).abs() < 1e-6);
        assert!((first.x1 - 0.45).abs() < 1e-6);
        assert!((lines[0].confidence.unwrap() - 0.9333).abs() < 1e-3);
        assert!(lines[2].bbox.unwrap().x0 > 0.5);
    }

    #[test]
    fn rejects_missing_header() {
        assert!(matches!(parse_tsv("", 10, 10), Err(ProviderError::Parse(_))));
        assert!(matches!(parse_tsv("level\ttext\n", 10, 10), Err(ProviderError::Parse(_))));
    }

    #[test]
    fn picks_segmentation_per_hint() {
        assert_eq!(TesseractProvider::page_segmentation(RecognitionHint::Page), "3");
        assert_eq!(TesseractProvider::page_segmentation(RecognitionHint::SingleLine), "7");
    }

    #[test]
    #[ignore = "requires a tesseract install"]
    fn reads_a_blank_page() {
        let provider = TesseractProvider::new(&ProviderSpec::tesseract());
        let image = DynamicImage::new_luma8(200, 100);
        let reading = provider.recognize(&image, RecognitionHint::Page).unwrap();
        assert_eq!(reading.provider, "tesseract");
    }
}
