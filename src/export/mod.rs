pub mod json_export;
pub mod text_export;

use anyhow::Result;

use crate::core::model::{PageRecord, RunReport};

pub use json_export::JsonExporter;
pub use text_export::TextExporter;

pub const PAGES_DIR: &str = "pages";

/// Writes one artifact per finished unit.
pub trait RecordSink {
    /// Persist `record`, returning its location relative to the output root.
    fn write_record(&self, record: &PageRecord) -> Result<String>;
}

/// Writes run-level artifacts once every unit is done.
pub trait Exporter {
    fn export(&self, report: &RunReport) -> Result<()>;
}
