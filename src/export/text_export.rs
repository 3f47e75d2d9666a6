use std::fs;
use std::path::PathBuf;

use anyhow::Result;

use crate::core::model::PageRecord;
use crate::export::json_export::write_once;
use crate::export::{RecordSink, PAGES_DIR};

/// Fused lines of each unit as plain text next to its JSON record.
#[derive(Debug, Clone)]
pub struct TextExporter {
    out_dir: PathBuf,
}

impl TextExporter {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }
}

impl RecordSink for TextExporter {
    fn write_record(&self, record: &PageRecord) -> Result<String> {
        let dir = self.out_dir.join(PAGES_DIR);
        fs::create_dir_all(&dir)?;
        let relative = format!("{PAGES_DIR}/{}.txt", record.key);
        let mut text = record.text();
        if !text.is_empty() {
            text.push('\n');
        }
        write_once(&self.out_dir.join(&relative), text.as_bytes())?;
        Ok(relative)
    }
}
