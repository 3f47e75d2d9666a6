use std::process::Command;
use std::time::{Duration, Instant};

use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::{Deserialize, Serialize};

use super::process::run_with_timeout;
use super::{Provider, ProviderError, RecognitionHint};
use crate::core::config::ProviderSpec;
use crate::core::geometry::BBox;
use crate::core::model::{OcrLine, ProviderReading, ProviderRole};

/// One line reported by an external recognizer script.
///
/// `bbox` is `[x0, y0, x1, y1]`, either in pixels or already normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrToken {
    pub text: String,
    #[serde(default)]
    pub bbox: Option<[f32; 4]>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub column: Option<u8>,
}

impl OcrToken {
    fn into_line(self, page_w: u32, page_h: u32) -> OcrLine {
        let bbox = self.bbox.map(|[x0, y0, x1, y1]| {
            if [x0, y0, x1, y1].iter().all(|v| (0.0..=1.0).contains(v)) {
                BBox::new(x0, y0, x1, y1)
            } else {
                BBox::from_pixels(x0, y0, x1 - x0, y1 - y0, page_w, page_h)
            }
        });
        OcrLine {
            text: self.text,
            bbox,
            column: self.column,
            confidence: self.confidence,
        }
    }
}

/// Provider backed by any executable speaking a small JSON protocol:
/// invoked as `<program> <args..> --image <png> --lang <lang> --mode <hint>`,
/// it prints either a JSON array of [`OcrToken`] or plain text.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    name: String,
    role: ProviderRole,
    program: String,
    args: Vec<String>,
    lang: String,
    timeout: Duration,
}

impl CommandProvider {
    pub fn new(spec: &ProviderSpec) -> Self {
        Self {
            name: spec.name.clone(),
            role: spec.role,
            program: spec.program.clone().unwrap_or_else(|| spec.name.clone()),
            args: spec.args.clone(),
            lang: spec.language.clone(),
            timeout: Duration::from_secs(spec.timeout_secs),
        }
    }
}

impl Provider for CommandProvider {
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
        format!("{} not found on PATH", self.program)
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
            .args(&self.args)
            .arg("--image")
            .arg(file.path())
            .arg("--lang")
            .arg(&self.lang)
            .arg("--mode")
            .arg(hint.as_str());
        let output = run_with_timeout(command, self.timeout)?;

        let (text, lines) = parse_output(&output.stdout, width, height)?;
        Ok(ProviderReading {
            provider: self.name.clone(),
            role: self.role,
            text,
            lines,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// JSON token arrays carry geometry; anything else is taken as plain text.
pub fn parse_output(
    stdout: &str,
    page_w: u32,
    page_h: u32,
) -> Result<(String, Option<Vec<OcrLine>>), ProviderError> {
    let trimmed = stdout.trim_start();
    if !trimmed.starts_with('[') {
        return Ok((stdout.trim_end().to_string(), None));
    }
    let tokens: Vec<OcrToken> =
        serde_json::from_str(trimmed).map_err(|e| ProviderError::Parse(e.to_string()))?;
    let lines: Vec<OcrLine> = tokens
        .into_iter()
        .map(|token| token.into_line(page_w, page_h))
        .collect();
    let text = lines
        .iter()
        .map(|line| line.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    Ok((text, Some(lines)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_text_has_no_geometry() {
        let (text, lines) = parse_output("You win.\nTurn to 400\n", 100, 100).unwrap();
        assert_eq!(text, "You win.\nTurn to 400");
        assert!(lines.is_none());
    }

    #[test]
    fn tokens_keep_columns_and_normalize_pixels() {
        let json = r#"[
            {"text": "left side", "bbox": [10, 20, 90, 30], "column": 0},
            {"text": "right side", "bbox": [0.55, 0.2, 0.95, 0.3], "column": 1, "confidence": 0.8}
        ]"#;
        let (text, lines) = parse_output(json, 200, 100).unwrap();
        let lines = lines.unwrap();
        assert_eq!(text, "left side\nright side");
        assert_eq!(lines[0].bbox, Some(BBox::new(0.05, 0.2, 0.45, 0.3)));
        assert_eq!(lines[1].bbox, Some(BBox::new(0.55, 0.2, 0.95, 0.3)));
        assert_eq!(lines[1].column, Some(1));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(parse_output("[{", 1, 1), Err(ProviderError::Parse(_))));
    }

    #[cfg(unix)]
    #[test]
    fn runs_an_external_script() {
        let spec = ProviderSpec {
            name: "echo".to_string(),
            kind: crate::core::config::ProviderKind::Command,
            role: ProviderRole::Neural,
            program: Some("sh".to_string()),
            args: vec!["-c".to_string(), "printf 'Turn to 7'".to_string(), "sh".to_string()],
            language: "eng".to_string(),
            timeout_secs: 5,
        };
        let provider = CommandProvider::new(&spec);
        let reading = provider
            .recognize(&DynamicImage::new_luma8(8, 8), RecognitionHint::Page)
            .unwrap();
        assert_eq!(reading.text, "Turn to 7");
        assert_eq!(reading.role, ProviderRole::Neural);
    }
}
