use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView, GrayImage, Luma};
use tracing::{debug, info, warn};

use crate::core::config::{EngineConfig, PipelineConfig};
use crate::core::geometry::BBox;
use crate::core::model::{
    AlignedLine, ColumnConfidence, ColumnSpan, EscalationBudget, OcrLine, PageRecord, PageUnit,
    PreprocessInfo, ProviderDump, ProviderFailure, ProviderReading, RunReport, Side, SpreadDecision,
};
use crate::export::{Exporter, JsonExporter, RecordSink, TextExporter, PAGES_DIR};
use crate::fusion::compare::comparison_key;
use crate::fusion::repair::needs_rescan;
use crate::fusion::{FusedPage, FusionEngine, LineFusionEngine};
use crate::input::{discover_pages, is_pre_split, PageImage};
use crate::layout::columns::{check_split, infer_columns, plan_columns, ColumnPlan, ANALYSIS_WIDTH};
use crate::layout::spread::{
    decide_spread, detect_gutter, refine_gutter, sample_indices, split_spread, GutterCandidate,
};
use crate::ocr::{build_providers, Provider, Recognition, Recognizer};
use crate::preprocess::deskew::analysis_gray;
use crate::preprocess::preprocess;
use crate::quality::{evaluate, verdict};

/// Vertical padding around a line box when cropping a rescan band, as a
/// share of the line height.
const BAND_PADDING: f32 = 0.25;
const BAND_X_PADDING: f32 = 0.02;

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub units: usize,
    pub flagged: usize,
    pub escalated: usize,
    pub multi_column: usize,
    pub spread: SpreadDecision,
    pub budget: EscalationBudget,
}

/// Run the engine over `config.input` with the configured providers.
pub fn run(config: &PipelineConfig) -> Result<RunSummary> {
    let providers = build_providers(&config.engine.providers);
    run_with_providers(config, providers)
}

pub fn run_with_providers(
    config: &PipelineConfig,
    providers: Vec<Arc<dyn Provider>>,
) -> Result<RunSummary> {
    let pages = discover_pages(&config.input)?;
    if pages.is_empty() {
        anyhow::bail!("no page images found in {}", config.input.display());
    }
    prepare_output(&config.output, config.force)?;

    let recognizer = Recognizer::new(providers, config.engine.fallback);
    let processor = UnitProcessor::new(&config.engine, recognizer);
    let spread = decide_run_spread(&pages, &config.engine);
    let total_units = if spread.is_spread { pages.len() * 2 } else { pages.len() };
    let mut budget =
        EscalationBudget::from_total(total_units, config.engine.escalation.budget_fraction);
    info!(pages = pages.len(), units = total_units, cap = budget.cap, "starting run");

    let json = JsonExporter::new(config.output.clone());
    let text = TextExporter::new(config.output.clone());
    let mut report = RunReport {
        spread: Some(spread.clone()),
        ..RunReport::default()
    };

    for page in &pages {
        for (unit, prep) in load_units(page, &spread, &config.engine) {
            let mut record = processor.process_unit(&unit, prep);
            if record.needs_escalation {
                if budget.try_consume() {
                    record.escalated = true;
                    info!(key = %record.key, reason = ?record.escalation_reason, "escalating unit");
                } else {
                    warn!(
                        key = %record.key,
                        reason = ?record.escalation_reason,
                        "escalation budget exhausted, unit stays flagged"
                    );
                }
            }
            let location = json
                .write_record(&record)
                .with_context(|| format!("failed to write record {}", record.key))?;
            text.write_record(&record)?;
            report.record(&record, location);
        }
    }

    report.escalation.budget = budget;
    json.export(&report)
        .with_context(|| format!("failed to export run report to {}", config.output.display()))?;

    Ok(RunSummary {
        units: report.quality.len(),
        flagged: report.flagged().count(),
        escalated: report.escalation.escalated.len(),
        multi_column: report.usage.multi_column_pages,
        spread,
        budget,
    })
}

fn prepare_output(output: &Path, force: bool) -> Result<()> {
    fs::create_dir_all(output).with_context(|| format!("failed to create {}", output.display()))?;
    let pages = output.join(PAGES_DIR);
    if pages.is_dir() && fs::read_dir(&pages)?.next().is_some() {
        if !force {
            anyhow::bail!(
                "{} already holds page records; pass --force to replace them",
                pages.display()
            );
        }
        fs::remove_dir_all(&pages).with_context(|| format!("failed to clear {}", pages.display()))?;
    }
    Ok(())
}

fn blank_image() -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([255])))
}

fn load_image(path: &Path) -> Option<DynamicImage> {
    match image::open(path) {
        Ok(image) => Some(image),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable page image");
            None
        }
    }
}

/// Run-once spread decision from evenly spaced raw samples. Spreads are split
/// on the raw image too, so sampled gutter positions share its frame; each
/// half is preprocessed after the split.
fn decide_run_spread(pages: &[PageImage], config: &EngineConfig) -> SpreadDecision {
    if is_pre_split(pages) {
        info!("input is pre-split, skipping spread analysis");
        return SpreadDecision::pre_split();
    }
    let samples: Vec<DynamicImage> = sample_indices(pages.len(), config.spread.samples)
        .into_iter()
        .filter_map(|i| load_image(&pages[i].path))
        .collect();
    decide_spread(&samples, &config.spread)
}

/// Units for one input image: both halves of a spread, or the page itself.
fn load_units(
    page: &PageImage,
    spread: &SpreadDecision,
    config: &EngineConfig,
) -> Vec<(PageUnit, PreprocessInfo)> {
    let raw = load_image(&page.path).unwrap_or_else(blank_image);
    let prepare = |image: DynamicImage, side: Option<Side>| {
        let prepared = preprocess(image, &config.preprocess);
        (
            PageUnit::new(page.page, side, prepared.image).with_duplicate(page.duplicate),
            prepared.info,
        )
    };

    if spread.is_spread && page.side.is_none() {
        let gutter = refine_gutter(&raw, &config.spread);
        let (left, right) = split_spread(&raw, gutter);
        debug!(page = page.page, gutter, "split spread");
        vec![prepare(left, Some(Side::Left)), prepare(right, Some(Side::Right))]
    } else {
        vec![prepare(raw, page.side)]
    }
}

/// Lines whose geometry drives column inference: a reading that reports
/// column indices wins, then the first with bounding boxes. Without any
/// geometry the primary's plain lines still feed the form-page guard.
fn layout_lines(recognition: &Recognition) -> Vec<OcrLine> {
    let with_lines = || {
        recognition
            .readings
            .iter()
            .filter_map(|r| r.lines.as_ref())
            .filter(|lines| !lines.is_empty())
    };
    with_lines()
        .find(|lines| lines.iter().any(|l| l.column.is_some()))
        .or_else(|| with_lines().find(|lines| lines.iter().any(|l| l.bbox.is_some())))
        .cloned()
        .unwrap_or_else(|| {
            recognition
                .primary()
                .map(|reading| reading.line_texts().into_iter().map(OcrLine::plain).collect())
                .unwrap_or_default()
        })
}

fn crop_span(image: &DynamicImage, span: &ColumnSpan) -> DynamicImage {
    let (w, h) = image.dimensions();
    let x0 = ((span.x0 * w as f32).round() as u32).min(w.saturating_sub(1));
    let x1 = ((span.x1 * w as f32).round() as u32).clamp(x0 + 1, w.max(x0 + 1));
    image.crop_imm(x0, 0, x1 - x0, h)
}

fn crop_box(image: &DynamicImage, bbox: &BBox) -> DynamicImage {
    let (w, h) = image.dimensions();
    let x0 = ((bbox.x0 * w as f32).floor() as u32).min(w.saturating_sub(1));
    let y0 = ((bbox.y0 * h as f32).floor() as u32).min(h.saturating_sub(1));
    let x1 = ((bbox.x1 * w as f32).ceil() as u32).clamp(x0 + 1, w.max(x0 + 1));
    let y1 = ((bbox.y1 * h as f32).ceil() as u32).clamp(y0 + 1, h.max(y0 + 1));
    image.crop_imm(x0, y0, x1 - x0, y1 - y0)
}

/// Pixel band for the fused line at `idx`: the primary reading's box for the
/// same line when it has one, otherwise the line's proportional slot.
fn line_band(
    line: &AlignedLine,
    idx: usize,
    total: usize,
    primary: Option<&ProviderReading>,
) -> BBox {
    let located = primary.and_then(|reading| {
        let wanted: Vec<String> = line
            .candidates
            .iter()
            .filter(|c| c.provider == reading.provider)
            .filter_map(|c| c.text.as_deref())
            .chain(std::iter::once(line.text.as_str()))
            .map(comparison_key)
            .collect();
        reading
            .lines
            .as_ref()?
            .iter()
            .find(|l| l.bbox.is_some() && wanted.contains(&comparison_key(&l.text)))
            .and_then(|l| l.bbox)
    });
    match located {
        Some(b) => {
            let pad = b.height() * BAND_PADDING;
            BBox::new(
                (b.x0 - BAND_X_PADDING).max(0.0),
                (b.y0 - pad).max(0.0),
                (b.x1 + BAND_X_PADDING).min(1.0),
                (b.y1 + pad).min(1.0),
            )
        }
        None => {
            let n = total.max(1) as f32;
            BBox::new(0.0, idx as f32 / n, 1.0, (idx + 1) as f32 / n)
        }
    }
}

/// One region (whole unit or column crop) after recognition and fusion.
struct Region {
    recognition: Recognition,
    fused: FusedPage,
}

/// Per-unit processing: recognition, column analysis, fusion and scoring.
pub struct UnitProcessor<'a> {
    config: &'a EngineConfig,
    recognizer: Recognizer,
    fusion: LineFusionEngine,
}

impl<'a> UnitProcessor<'a> {
    pub fn new(config: &'a EngineConfig, recognizer: Recognizer) -> Self {
        Self {
            config,
            recognizer,
            fusion: LineFusionEngine::new(config.fusion.clone()),
        }
    }

    pub fn recognizer(&self) -> &Recognizer {
        &self.recognizer
    }

    fn read_region(&self, image: &DynamicImage, recognition: Recognition) -> Region {
        let mut fused = match recognition.primary() {
            Some(primary) => self.fusion.fuse(primary, &recognition.alternates()),
            None => FusedPage::default(),
        };
        self.rescan_numeric_lines(&mut fused, &recognition, image);
        Region { recognition, fused }
    }

    /// Re-read short numeric lines that still mix letters and digits from a
    /// tight crop of their band.
    fn rescan_numeric_lines(
        &self,
        fused: &mut FusedPage,
        recognition: &Recognition,
        image: &DynamicImage,
    ) {
        if !self.config.fusion.line_rescan {
            return;
        }
        let total = fused.lines.len();
        for idx in 0..total {
            if !needs_rescan(&fused.lines[idx].text, &self.config.fusion) {
                continue;
            }
            let band = line_band(&fused.lines[idx], idx, total, recognition.primary());
            let Some(reading) = self.recognizer.recognize_line(&crop_box(image, &band)) else {
                continue;
            };
            let text = reading.line_texts().join(" ").trim().to_string();
            let line = &mut fused.lines[idx];
            if !text.is_empty() && text != line.text {
                debug!(from = %line.text, to = %text, "line rescan replaced text");
                line.text = text;
                line.source = reading.provider.clone();
                line.repairs.push("line_rescan".to_string());
            }
        }
    }

    pub fn process_unit(&self, unit: &PageUnit, prep: PreprocessInfo) -> PageRecord {
        let key = unit.key();
        let full = self.read_region(&unit.image, self.recognizer.recognize(&unit.image));
        let layout = layout_lines(&full.recognition);
        let plan = plan_columns(&layout, &unit.image, &self.config.columns);
        debug!(%key, columns = plan.spans.len(), method = ?plan.method, "column plan");

        let mut rejection = None;
        let mut regions = vec![full];
        let mut spans = vec![ColumnSpan::full()];
        if plan.is_split() {
            let columns: Vec<Region> = plan
                .spans
                .iter()
                .map(|span| {
                    let crop = crop_span(&unit.image, span);
                    let recognition = self.recognizer.recognize(&crop);
                    self.read_region(&crop, recognition)
                })
                .collect();
            let texts: Vec<Vec<String>> = columns
                .iter()
                .map(|region| region.fused.lines.iter().map(|l| l.text.clone()).collect())
                .collect();
            match check_split(&texts, &self.config.columns) {
                Ok(()) => {
                    regions = columns;
                    spans = plan.spans.clone();
                }
                Err(rejected) => {
                    // The whole-unit reading taken above is the single-column re-read.
                    info!(
                        %key,
                        reason = %rejected.reason(),
                        "column split rejected, using single column"
                    );
                    rejection = Some(rejected.reason());
                }
            }
        }

        self.assemble(unit, prep, &plan, spans, regions, rejection)
    }

    fn assemble(
        &self,
        unit: &PageUnit,
        prep: PreprocessInfo,
        plan: &ColumnPlan,
        spans: Vec<ColumnSpan>,
        regions: Vec<Region>,
        rejection_reason: Option<String>,
    ) -> PageRecord {
        let lines: Vec<AlignedLine> = regions
            .iter()
            .flat_map(|region| region.fused.lines.iter().cloned())
            .collect();
        let combined = combined_readings(&regions);
        let metrics = evaluate(&lines, &combined.iter().collect::<Vec<_>>(), &self.config.quality);
        let verdict = verdict(&metrics, &self.config.quality);

        let column_confidence = ColumnConfidence {
            method: plan.method,
            gap_count: plan.gap_count(),
            line_count: metrics.line_count,
            avg_line_len: metrics.avg_line_len,
            rejection_reason,
        };

        PageRecord {
            key: unit.key(),
            page: unit.page,
            side: unit.side,
            disagreement_score: metrics.disagreement_score,
            needs_escalation: verdict.needs_escalation,
            escalation_reason: verdict.reason(),
            escalated: false,
            quality: metrics,
            columns: spans,
            column_confidence,
            providers: self.provider_dumps(&regions),
            fallback_used: regions.iter().any(|r| r.recognition.fallback_used),
            preprocess: prep,
            lines,
        }
    }

    fn provider_dumps(&self, regions: &[Region]) -> Vec<ProviderDump> {
        let names = self
            .recognizer
            .providers()
            .iter()
            .map(|p| p.name().to_string())
            .chain(self.recognizer.unavailable().iter().map(|f| f.provider.clone()));

        names
            .map(|name| {
                let texts: Vec<&str> = regions
                    .iter()
                    .filter_map(|r| r.recognition.reading(&name))
                    .map(|reading| reading.text.as_str())
                    .collect();
                let error: Option<ProviderFailure> =
                    regions.iter().find_map(|r| r.recognition.failure(&name)).cloned();
                let fusion_distances: Vec<f32> = regions
                    .iter()
                    .filter_map(|r| r.fused.distances.get(&name))
                    .flatten()
                    .copied()
                    .collect();
                let raw_text = (!texts.is_empty()).then(|| texts.join("\n"));
                let line_count = raw_text
                    .as_deref()
                    .map(|t| t.lines().filter(|l| !l.trim().is_empty()).count())
                    .unwrap_or(0);
                ProviderDump {
                    line_count,
                    provider: name,
                    raw_text,
                    error,
                    fusion_distances,
                }
            })
            .collect()
    }
}

/// One reading per provider with its text joined across regions.
fn combined_readings(regions: &[Region]) -> Vec<ProviderReading> {
    let mut combined: BTreeMap<String, ProviderReading> = BTreeMap::new();
    let mut order = Vec::new();
    for reading in regions.iter().flat_map(|r| r.recognition.readings.iter()) {
        match combined.get_mut(&reading.provider) {
            Some(existing) => {
                existing.text = format!("{}\n{}", existing.text, reading.text);
                existing.elapsed_ms += reading.elapsed_ms;
            }
            None => {
                order.push(reading.provider.clone());
                combined.insert(
                    reading.provider.clone(),
                    ProviderReading {
                        lines: None,
                        ..reading.clone()
                    },
                );
            }
        }
    }
    order.into_iter().filter_map(|name| combined.remove(&name)).collect()
}

/// Layout findings for one image, without recognition.
#[derive(Debug, Clone)]
pub struct Inspection {
    pub width: u32,
    pub height: u32,
    pub preprocess: PreprocessInfo,
    pub gutter: Option<GutterCandidate>,
    pub refined_gutter: f32,
    pub columns: ColumnPlan,
}

pub fn inspect_image(path: &Path, config: &EngineConfig) -> Result<Inspection> {
    let raw = image::open(path)
        .with_context(|| format!("failed to open image {}", path.display()))?;
    let (width, height) = raw.dimensions();
    let gutter = detect_gutter(&analysis_gray(&raw, config.spread.analysis_width), &config.spread);
    let refined_gutter = refine_gutter(&raw, &config.spread);
    let prepared = preprocess(raw, &config.preprocess);
    let gray = analysis_gray(&prepared.image, ANALYSIS_WIDTH);
    let columns = infer_columns(&[], &gray, &config.columns);
    Ok(Inspection {
        width,
        height,
        preprocess: prepared.info,
        gutter,
        refined_gutter,
        columns,
    })
}
