use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::HistoryBackend;
use crate::models::Outcome;

/// Whole-history JSON file. Every write goes to a sibling temp file that is
/// renamed over the original, so readers see the old or the new list.
pub struct JsonFileHistory {
    path: PathBuf,
}

impl JsonFileHistory {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_atomic(&self, history: &[Outcome]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let tmp = self.temp_path();
        {
            let file = File::create(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, history)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

impl HistoryBackend for JsonFileHistory {
    fn load(&self) -> Result<Vec<Outcome>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let outcomes = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(outcomes)
    }

    fn record_append(&self, history: &[Outcome]) -> Result<()> {
        self.write_atomic(history)
    }

    fn save_all(&self, history: &[Outcome]) -> Result<()> {
        self.write_atomic(history)
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::OutcomeStore;

    #[test]
    fn test_save_load_save_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut store = OutcomeStore::open(Box::new(JsonFileHistory::new(&path))).unwrap();
        for (i, value) in [3u32, 0, 29, 29, 11].iter().enumerate() {
            store.append(*value, &format!("round-{i}"));
        }
        let first = fs::read(&path).unwrap();
        let written = store.outcomes().to_vec();
        drop(store);

        let backend = JsonFileHistory::new(&path);
        let loaded = backend.load().unwrap();
        assert_eq!(loaded, written);

        backend.save_all(&loaded).unwrap();
        assert_eq!(fs::read(&path).unwrap(), first);
        assert!(!backend.temp_path().exists());
    }

    #[test]
    fn test_missing_file_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileHistory::new(dir.path().join("nope.json"));
        assert!(backend.load().unwrap().is_empty());
    }
}
