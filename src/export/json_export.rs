use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::model::{PageRecord, RunReport};
use crate::export::{Exporter, RecordSink, PAGES_DIR};

#[derive(Debug, Clone)]
pub struct JsonExporter {
    out_dir: PathBuf,
}

impl JsonExporter {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }

    fn write_pretty<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.out_dir.join(name);
        let data = serde_json::to_string_pretty(value)?;
        fs::write(&path, data).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

/// Create `path` and write `data`, refusing to replace an existing file.
pub(crate) fn write_once(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("record {} already exists or cannot be created", path.display()))?;
    file.write_all(data)?;
    Ok(())
}

impl RecordSink for JsonExporter {
    fn write_record(&self, record: &PageRecord) -> Result<String> {
        let dir = self.out_dir.join(PAGES_DIR);
        fs::create_dir_all(&dir)?;
        let relative = format!("{PAGES_DIR}/{}.json", record.key);
        let data = serde_json::to_vec_pretty(record)?;
        write_once(&self.out_dir.join(&relative), &data)?;
        Ok(relative)
    }
}

impl Exporter for JsonExporter {
    fn export(&self, report: &RunReport) -> Result<()> {
        fs::create_dir_all(&self.out_dir)?;
        self.write_pretty("index.json", &report.index)?;
        self.write_pretty("quality_report.json", &report.quality)?;
        self.write_pretty("provider_usage.json", &report.usage)?;
        if let Some(spread) = &report.spread {
            self.write_pretty("spread.json", spread)?;
        }
        self.write_pretty("escalation.json", &report.escalation)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{EscalationBudget, SpreadDecision};

    #[test]
    fn write_once_refuses_to_overwrite() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("page_0001.json");
        write_once(&path, b"first")?;
        assert!(write_once(&path, b"second").is_err());
        assert_eq!(fs::read_to_string(&path)?, "first");
        Ok(())
    }

    #[test]
    fn exports_run_artifacts() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut report = RunReport {
            spread: Some(SpreadDecision::single(3)),
            ..RunReport::default()
        };
        report.escalation.budget = EscalationBudget::new(2);
        report.index.insert("page_0001".into(), "pages/page_0001.json".into());

        JsonExporter::new(dir.path().to_path_buf()).export(&report)?;

        let written = [
            "index.json",
            "quality_report.json",
            "provider_usage.json",
            "spread.json",
            "escalation.json",
        ];
        for name in written {
            assert!(dir.path().join(name).is_file(), "missing {name}");
        }
        let escalation: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("escalation.json"))?)?;
        assert_eq!(escalation["budget"]["cap"], 2);
        let index: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("index.json"))?)?;
        assert_eq!(index["page_0001"], "pages/page_0001.json");
        Ok(())
    }
}
