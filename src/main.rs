use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use pagefuse::core::config::{EngineConfig, PipelineConfig};
use pagefuse::ocr::build_providers;
use pagefuse::pipeline::{inspect_image, run};

#[derive(Parser, Debug)]
#[command(name = "pagefuse")]
#[command(version, about = "Multi-engine OCR ensemble for scanned book pages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Recognize a directory of page images
    Run {
        /// Directory of page images (page_0001.png, 0002_left.png, ...)
        input: PathBuf,

        /// Output directory (default: ./<input_name>_ocr)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Engine configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Skip deskewing
        #[arg(long)]
        no_deskew: bool,

        /// Skip denoising
        #[arg(long)]
        no_denoise: bool,

        /// Never fall back to the classical provider on empty pages
        #[arg(long)]
        no_fallback: bool,

        /// Number of pages sampled for spread detection
        #[arg(long)]
        spread_samples: Option<usize>,

        /// Replace page records left by an earlier run
        #[arg(short, long)]
        force: bool,

        /// Only log warnings
        #[arg(short, long)]
        quiet: bool,
    },

    /// List configured providers and whether they can run
    Providers {
        /// Engine configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show spread and column analysis for one image without recognition
    Inspect {
        /// Page image path
        image: PathBuf,

        /// Engine configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "pagefuse=warn" } else { "pagefuse=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path),
        None => Ok(EngineConfig::default()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let quiet = matches!(cli.command, Commands::Run { quiet: true, .. });
    init_tracing(quiet);

    match cli.command {
        Commands::Run {
            input,
            output,
            config,
            no_deskew,
            no_denoise,
            no_fallback,
            spread_samples,
            force,
            quiet,
        } => {
            let mut engine = load_config(config.as_ref())?;
            engine.preprocess.deskew &= !no_deskew;
            engine.preprocess.denoise &= !no_denoise;
            engine.fallback &= !no_fallback;
            if let Some(samples) = spread_samples {
                engine.spread.samples = samples;
            }
            run_pages(input, output, engine, force, quiet)
        }
        Commands::Providers { config } => show_providers(load_config(config.as_ref())?),
        Commands::Inspect { image, config } => {
            show_inspection(image, load_config(config.as_ref())?)
        }
    }
}

fn run_pages(
    input: PathBuf,
    output: Option<PathBuf>,
    engine: EngineConfig,
    force: bool,
    quiet: bool,
) -> Result<()> {
    if !input.is_dir() {
        anyhow::bail!("Input is not a directory: {}", input.display());
    }

    let output_dir = output.unwrap_or_else(|| {
        let stem = input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "pages".to_string());
        PathBuf::from(format!("{}_ocr", stem))
    });

    if !quiet {
        println!("[*] Processing: {}", input.display());
        println!("[*] Output: {}", output_dir.display());
    }

    let config = PipelineConfig::new(input.clone(), output_dir.clone(), engine).with_force(force);
    let summary = run(&config)
        .with_context(|| format!("Failed to process pages in {}", input.display()))?;

    if !quiet {
        println!("\n[+] Units: {} (spread mode: {:?})", summary.units, summary.spread.mode);
        println!("[+] Multi-column units: {}", summary.multi_column);
        println!(
            "[+] Flagged: {}, escalated: {} of {} allowed",
            summary.flagged, summary.escalated, summary.budget.cap
        );
        println!("\n[✓] Done! Results saved to: {}", output_dir.display());
    }

    Ok(())
}

fn show_providers(engine: EngineConfig) -> Result<()> {
    println!("Providers");
    println!("=========");
    for provider in build_providers(&engine.providers) {
        let status = if provider.is_available() {
            "ready".to_string()
        } else {
            provider.availability_hint()
        };
        let role = format!("{:?}", provider.role()).to_lowercase();
        println!("{:<16} {:<10} {}", provider.name(), role, status);
    }
    Ok(())
}

fn show_inspection(image: PathBuf, engine: EngineConfig) -> Result<()> {
    let inspection = inspect_image(&image, &engine)?;

    println!("Image Inspection");
    println!("================");
    println!("File: {}", image.display());
    println!("Size: {}x{}", inspection.width, inspection.height);
    match inspection.preprocess.deskew_angle {
        Some(angle) => println!("Deskew: {:.2} deg", angle),
        None => println!("Deskew: none"),
    }
    println!("Denoised: {}", inspection.preprocess.denoised);
    match inspection.gutter {
        Some(gutter) => println!(
            "Gutter: {:.3} ({:?}, contrast {:.2}, continuity {:.2})",
            gutter.position, gutter.kind, gutter.contrast, gutter.continuity
        ),
        None => println!("Gutter: none detected"),
    }
    println!("Split position: {:.3}", inspection.refined_gutter);
    println!(
        "Columns: {} ({:?})",
        inspection.columns.spans.len(),
        inspection.columns.method
    );
    for span in &inspection.columns.spans {
        println!("  {:.3} .. {:.3}", span.x0, span.x1);
    }
    Ok(())
}
