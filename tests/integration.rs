use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use image::{DynamicImage, GrayImage, Luma};
use pretty_assertions::assert_eq;

use pagefuse::core::config::{EngineConfig, PipelineConfig};
use pagefuse::core::model::{
    ColumnMethod, EscalationManifest, PageRecord, ProviderReading, ProviderRole, QualityEntry,
    SpreadDecision, SpreadMode,
};
use pagefuse::ocr::{Provider, ProviderError, RecognitionHint};
use pagefuse::pipeline::run_with_providers;

type Script = dyn Fn(&DynamicImage, RecognitionHint) -> Result<String, ProviderError> + Send + Sync;

/// In-process provider answering from a closure over the image it is shown.
struct Stub {
    name: &'static str,
    role: ProviderRole,
    script: Box<Script>,
}

impl Provider for Stub {
    fn name(&self) -> &str {
        self.name
    }

    fn role(&self) -> ProviderRole {
        self.role
    }

    fn is_available(&self) -> bool {
        true
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn recognize(
        &self,
        image: &DynamicImage,
        hint: RecognitionHint,
    ) -> Result<ProviderReading, ProviderError> {
        let text = (self.script)(image, hint)?;
        Ok(ProviderReading {
            provider: self.name.to_string(),
            role: self.role,
            text,
            lines: None,
            elapsed_ms: 0,
        })
    }
}

fn stub<F>(name: &'static str, role: ProviderRole, script: F) -> Arc<dyn Provider>
where
    F: Fn(&DynamicImage, RecognitionHint) -> Result<String, ProviderError> + Send + Sync + 'static,
{
    Arc::new(Stub {
        name,
        role,
        script: Box::new(script),
    })
}

fn fixed(name: &'static str, role: ProviderRole, text: &'static str) -> Arc<dyn Provider> {
    stub(name, role, move |_, _| Ok(text.to_string()))
}

fn engine() -> EngineConfig {
    let mut engine = EngineConfig::default();
    engine.preprocess.deskew = false;
    engine.preprocess.denoise = false;
    engine
}

struct Workspace {
    _dir: tempfile::TempDir,
    input: PathBuf,
    output: PathBuf,
}

impl Workspace {
    fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("scans");
        let output = dir.path().join("out");
        fs::create_dir_all(&input)?;
        Ok(Self {
            _dir: dir,
            input,
            output,
        })
    }

    fn add_page(&self, name: &str, image: &GrayImage) -> Result<()> {
        image.save(self.input.join(name))?;
        Ok(())
    }

    fn config(&self) -> PipelineConfig {
        PipelineConfig::new(self.input.clone(), self.output.clone(), engine())
    }

    fn record(&self, key: &str) -> Result<PageRecord> {
        read_json(&self.output.join("pages").join(format!("{key}.json")))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

fn blank(width: u32, height: u32) -> GrayImage {
    GrayImage::from_pixel(width, height, Luma([255]))
}

/// Staggered dark "words" filling each `(x0, x1)` block, row after row.
fn text_blocks(width: u32, height: u32, blocks: &[(u32, u32)]) -> GrayImage {
    let mut img = blank(width, height);
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

/// Landscape two-page scan with a dark binding crease at `crease_x`.
fn spread_page(width: u32, height: u32, crease_x: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        if (crease_x..crease_x + 4).contains(&x) {
            return Luma([60]);
        }
        let left_text = (30..crease_x.saturating_sub(20)).contains(&x);
        let right_text = (crease_x + 24..width - 30).contains(&x);
        if (left_text || right_text) && y % 12 < 3 {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

const PROSE: &str = "You walk along the corridor until you reach a door.\n\
                     Beyond it you can hear something large breathing.\n\
                     The air smells of smoke and old bones.\n\
                     If you open the door, turn to 214.";

#[test]
fn alternate_reading_fixes_a_misread_directive() -> Result<()> {
    let ws = Workspace::new()?;
    ws.add_page("page_0001.png", &blank(60, 80))?;

    let providers = vec![
        fixed("classic", ProviderRole::Classical, "You stand at the gate.\nTum t0 42"),
        fixed("neural", ProviderRole::Neural, "You stand at the gate.\nTurn to 42"),
    ];
    run_with_providers(&ws.config(), providers)?;

    let record = ws.record("page_0001")?;
    assert_eq!(record.text(), "You stand at the gate.\nTurn to 42");
    assert_eq!(record.lines[1].source, "neural");
    assert_eq!(record.lines[0].distance, 0.0);
    assert_eq!(
        fs::read_to_string(ws.output.join("pages/page_0001.txt"))?,
        "You stand at the gate.\nTurn to 42\n"
    );
    Ok(())
}

#[test]
fn lone_primary_directive_is_repaired_by_phrase_table() -> Result<()> {
    let ws = Workspace::new()?;
    ws.add_page("page_0003.png", &blank(60, 80))?;

    let providers = vec![
        fixed("classic", ProviderRole::Classical, "You stand at the gate.\nTum t0 42"),
        fixed("neural", ProviderRole::Neural, "You stand at the gate."),
    ];
    run_with_providers(&ws.config(), providers)?;

    let record = ws.record("page_0003")?;
    assert_eq!(record.lines[1].text, "Turn to 42");
    assert_eq!(record.lines[1].source, "classic");
    assert_eq!(record.lines[1].repairs, vec!["phrase".to_string()]);
    Ok(())
}

#[test]
fn clean_agreeing_page_is_not_flagged() -> Result<()> {
    let ws = Workspace::new()?;
    ws.add_page("page_0010.png", &blank(60, 80))?;

    let providers = vec![
        fixed("classic", ProviderRole::Classical, PROSE),
        fixed("neural", ProviderRole::Neural, PROSE),
    ];
    let summary = run_with_providers(&ws.config(), providers)?;

    let record = ws.record("page_0010")?;
    assert!(!record.needs_escalation, "{:?}", record.escalation_reason);
    assert_eq!(record.escalation_reason, None);
    assert_eq!(record.disagreement_score, 0.0);
    assert_eq!(record.lines.len(), 4);
    assert_eq!((summary.flagged, summary.escalated), (0, 0));
    Ok(())
}

#[test]
fn fragmented_columns_fall_back_to_single_reading() -> Result<()> {
    let ws = Workspace::new()?;
    ws.add_page("page_0005.png", &text_blocks(300, 400, &[(20, 135), (165, 280)]))?;

    let column_reads = Arc::new(AtomicUsize::new(0));
    let reads = Arc::clone(&column_reads);
    let classic = stub("classic", ProviderRole::Classical, move |image, _| {
        if image.width() >= 250 {
            Ok(PROSE.to_string())
        } else {
            reads.fetch_add(1, Ordering::SeqCst);
            Ok("the dra\ngon\nis\nasleep on its\nho\nard of gold".to_string())
        }
    });
    run_with_providers(&ws.config(), vec![classic])?;

    assert_eq!(column_reads.load(Ordering::SeqCst), 2);
    let record = ws.record("page_0005")?;
    assert_eq!(record.columns.len(), 1);
    assert_eq!(record.column_confidence.method, ColumnMethod::PixelProjection);
    assert_eq!(record.column_confidence.gap_count, 1);
    let reason = record.column_confidence.rejection_reason.clone().unwrap_or_default();
    assert!(reason.starts_with("fragmented_column:0:"), "{reason}");
    assert_eq!(record.text(), PROSE);
    Ok(())
}

#[test]
fn clean_columns_are_read_left_to_right() -> Result<()> {
    let ws = Workspace::new()?;
    ws.add_page("page_0006.png", &text_blocks(300, 400, &[(20, 135), (165, 280)]))?;

    let left = "You walk along the corridor until\n\
                you reach a heavy oak door.\n\
                Beyond it lies the great hall.";
    let right = "The guards have not seen you yet.\n\
                 If you wish to attack them,\n\
                 turn to 214. Otherwise turn to 87.";
    let column = Arc::new(AtomicUsize::new(0));
    let next = Arc::clone(&column);
    let classic = stub("classic", ProviderRole::Classical, move |image, _| {
        if image.width() >= 250 {
            return Ok(format!("{left}\n{right}"));
        }
        Ok(match next.fetch_add(1, Ordering::SeqCst) {
            0 => left.to_string(),
            _ => right.to_string(),
        })
    });
    run_with_providers(&ws.config(), vec![classic])?;

    let record = ws.record("page_0006")?;
    assert_eq!(record.columns.len(), 2);
    assert_eq!(record.column_confidence.rejection_reason, None);
    assert!((record.columns[0].x1 - 0.5).abs() < 0.05, "{:?}", record.columns);
    assert_eq!(record.text(), format!("{left}\n{right}"));

    let usage: serde_json::Value = read_json(&ws.output.join("provider_usage.json"))?;
    assert_eq!(usage["multi_column_pages"], 1);
    Ok(())
}

#[test]
fn form_pages_are_never_split() -> Result<()> {
    let ws = Workspace::new()?;
    ws.add_page("page_0007.png", &text_blocks(300, 400, &[(20, 135), (165, 280)]))?;

    let column_reads = Arc::new(AtomicUsize::new(0));
    let reads = Arc::clone(&column_reads);
    let classic = stub("classic", ProviderRole::Classical, move |image, _| {
        if image.width() < 250 {
            reads.fetch_add(1, Ordering::SeqCst);
        }
        Ok("SKILL =\nSTAMINA =\nLUCK =\nGOLD =\nPROVISIONS =\nEQUIPMENT =".to_string())
    });
    run_with_providers(&ws.config(), vec![classic])?;

    let record = ws.record("page_0007")?;
    assert_eq!(column_reads.load(Ordering::SeqCst), 0);
    assert_eq!(record.columns.len(), 1);
    assert_eq!(record.column_confidence.method, ColumnMethod::Single);
    Ok(())
}

#[test]
fn escalation_stops_at_the_budget_but_flags_stay() -> Result<()> {
    let ws = Workspace::new()?;
    for page in 1..=12 {
        ws.add_page(&format!("page_{page:04}.png"), &blank(30, 40))?;
    }

    let providers = vec![
        fixed("classic", ProviderRole::Classical, ""),
        fixed("neural", ProviderRole::Neural, "   "),
    ];
    let summary = run_with_providers(&ws.config(), providers)?;

    assert_eq!(summary.units, 12);
    assert_eq!(summary.flagged, 12);
    assert_eq!(summary.budget.cap, 2);
    assert_eq!(summary.escalated, 2);

    let manifest: EscalationManifest = read_json(&ws.output.join("escalation.json"))?;
    assert_eq!(manifest.escalated.len(), 2);
    assert_eq!(manifest.flagged_not_escalated.len(), 10);
    assert_eq!(manifest.escalated[0].key, "page_0001");

    let quality: Vec<QualityEntry> = read_json(&ws.output.join("quality_report.json"))?;
    assert!(quality.iter().all(|entry| entry.needs_escalation));
    assert_eq!(quality.iter().filter(|entry| entry.escalated).count(), 2);

    let record = ws.record("page_0012")?;
    assert!(record.fallback_used);
    assert!(!record.escalated);
    assert!(record.escalation_reason.unwrap_or_default().contains("missing_content"));
    Ok(())
}

#[test]
fn failing_provider_does_not_stop_the_run() -> Result<()> {
    let ws = Workspace::new()?;
    ws.add_page("page_0001.png", &blank(60, 80))?;

    let providers = vec![
        fixed("classic", ProviderRole::Classical, PROSE),
        stub("vision", ProviderRole::Vision, |_, _| {
            Err(ProviderError::Failed("model crashed".to_string()))
        }),
    ];
    run_with_providers(&ws.config(), providers)?;

    let record = ws.record("page_0001")?;
    assert_eq!(record.text(), PROSE);
    let vision = record
        .providers
        .iter()
        .find(|dump| dump.provider == "vision")
        .map(|dump| (dump.raw_text.clone(), dump.error.is_some()));
    assert_eq!(vision, Some((None, true)));
    Ok(())
}

#[test]
fn pre_split_halves_keep_their_sides() -> Result<()> {
    let ws = Workspace::new()?;
    ws.add_page("0004_left.png", &blank(60, 80))?;
    ws.add_page("0004_right.png", &blank(60, 80))?;

    run_with_providers(&ws.config(), vec![fixed("classic", ProviderRole::Classical, PROSE)])?;

    assert!(ws.output.join("pages/page_0004_l.json").is_file());
    assert!(ws.output.join("pages/page_0004_r.json").is_file());
    let spread: SpreadDecision = read_json(&ws.output.join("spread.json"))?;
    assert_eq!(spread.mode, SpreadMode::PreSplit);
    Ok(())
}

#[test]
fn spreads_are_split_into_left_and_right_records() -> Result<()> {
    let ws = Workspace::new()?;
    ws.add_page("scan_001.png", &spread_page(400, 260, 198))?;
    ws.add_page("scan_002.png", &spread_page(400, 260, 198))?;

    let mut config = ws.config();
    config.engine.escalation.budget_fraction = 0.5;
    let providers = vec![fixed("classic", ProviderRole::Classical, PROSE)];
    let summary = run_with_providers(&config, providers)?;

    assert_eq!(summary.units, 4);
    assert_eq!(summary.budget.cap, 2);
    for key in ["page_0001_l", "page_0001_r", "page_0002_l", "page_0002_r"] {
        let record = ws.record(key)?;
        assert_eq!(record.key, key);
    }
    assert!(!ws.output.join("pages/page_0001.json").exists());

    let spread: SpreadDecision = read_json(&ws.output.join("spread.json"))?;
    assert_eq!(spread.mode, SpreadMode::Spread);
    assert!(spread.is_spread);
    assert!((spread.gutter - 0.5).abs() < 0.02, "{spread:?}");
    Ok(())
}

#[test]
fn repeated_page_numbers_get_distinct_records() -> Result<()> {
    let ws = Workspace::new()?;
    ws.add_page("vol1_page_1.png", &blank(60, 80))?;
    ws.add_page("vol2_page_1.png", &blank(60, 80))?;
    ws.add_page("vol2_page_2.png", &blank(60, 80))?;

    let providers = vec![fixed("classic", ProviderRole::Classical, PROSE)];
    let summary = run_with_providers(&ws.config(), providers)?;

    assert_eq!(summary.units, 3);
    let index: serde_json::Value = read_json(&ws.output.join("index.json"))?;
    assert_eq!(index["page_0001"], "pages/page_0001.json");
    assert_eq!(index["page_0001_2"], "pages/page_0001_2.json");
    assert_eq!(index["page_0002"], "pages/page_0002.json");
    assert_eq!(ws.record("page_0001_2")?.page, 1);
    assert!(ws.output.join("quality_report.json").is_file());
    assert!(ws.output.join("escalation.json").is_file());
    Ok(())
}

#[test]
fn mixed_digit_line_is_reread_from_its_band() -> Result<()> {
    let ws = Workspace::new()?;
    ws.add_page("page_0001.png", &blank(60, 80))?;

    let bands = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&bands);
    let classic = stub("classic", ProviderRole::Classical, move |image, hint| match hint {
        RecognitionHint::SingleLine => {
            if image.height() < 80 {
                seen.fetch_add(1, Ordering::SeqCst);
            }
            Ok("42".to_string())
        }
        _ => Ok("You stand at the gate.\n4A".to_string()),
    });
    let neural = fixed("neural", ProviderRole::Neural, "You stand at the gate.\n4A");
    run_with_providers(&ws.config(), vec![classic, neural])?;

    assert_eq!(bands.load(Ordering::SeqCst), 1);
    let record = ws.record("page_0001")?;
    assert_eq!(record.lines[0].text, "You stand at the gate.");
    assert_eq!(record.lines[1].text, "42");
    assert_eq!(record.lines[1].source, "classic");
    assert!(record.lines[1].repairs.contains(&"line_rescan".to_string()));
    Ok(())
}

#[test]
fn unreadable_image_still_gets_a_record() -> Result<()> {
    let ws = Workspace::new()?;
    ws.add_page("page_0001.png", &blank(60, 80))?;
    fs::write(ws.input.join("page_0002.png"), b"not an image")?;

    run_with_providers(&ws.config(), vec![fixed("classic", ProviderRole::Classical, "")])?;

    let record = ws.record("page_0002")?;
    assert!(record.lines.is_empty());
    assert!(record.needs_escalation);
    Ok(())
}

#[test]
fn rerun_requires_force() -> Result<()> {
    let ws = Workspace::new()?;
    ws.add_page("page_0001.png", &blank(60, 80))?;
    let providers = || vec![fixed("classic", ProviderRole::Classical, PROSE)];

    run_with_providers(&ws.config(), providers())?;
    assert!(run_with_providers(&ws.config(), providers()).is_err());
    run_with_providers(&ws.config().with_force(true), providers())?;

    let index: serde_json::Value = read_json(&ws.output.join("index.json"))?;
    assert_eq!(index["page_0001"], "pages/page_0001.json");
    Ok(())
}

#[test]
fn empty_input_directory_is_an_error() -> Result<()> {
    let ws = Workspace::new()?;
    let providers = vec![fixed("classic", ProviderRole::Classical, PROSE)];
    let err = run_with_providers(&ws.config(), providers);
    assert!(err.is_err());
    Ok(())
}
