pub mod core;
pub mod export;
pub mod fusion;
pub mod input;
pub mod layout;
pub mod ocr;
pub mod pipeline;
pub mod preprocess;
pub mod quality;

pub use core::model::{AlignedLine, PageRecord, ProviderReading, RunReport};
pub use pipeline::{run, run_with_providers, RunSummary};
