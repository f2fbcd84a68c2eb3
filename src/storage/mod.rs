//! Persistence layer.
//!
//! Every artifact is a JSON (or plain text) file. Writes go to a sibling
//! temp file first and are renamed into place, so a reader never sees a
//! half-written file.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const QUOTES_PREFIX: &str = "quotes_";
pub const CANDIDATES_FILE: &str = "candidates.json";
pub const WAGERS_FILE: &str = "wagers.json";
pub const DECISIONS_FILE: &str = "decisions.json";
pub const ORDERS_FILE: &str = "orders.json";
pub const SLIP_JSON_FILE: &str = "slip.json";
pub const SLIP_TEXT_FILE: &str = "slip.txt";
pub const LEDGER_FILE: &str = "ledger.json";

/// Write bytes to `path` via temp file + rename, creating parent dirs.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents).with_context(|| format!("Failed to write {}", tmp.display()))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to move {} into place", path.display()));
    }
    Ok(())
}

/// Serialise `value` as pretty JSON and write it atomically.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialise {}", path.display()))?;
    json.push('\n');
    write_atomic(path, json.as_bytes())?;
    debug!(path = %path.display(), bytes = json.len(), "JSON written");
    Ok(())
}

/// Load JSON from `path`. Returns `None` if the file doesn't exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

// ---------------------------------------------------------------------------
// Run store
// ---------------------------------------------------------------------------

/// Per-run-date artifact directory: `<root>/<YYYY-MM-DD>/`.
#[derive(Debug, Clone)]
pub struct RunStore {
    root: PathBuf,
}

impl RunStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, date: NaiveDate) -> PathBuf {
        self.root.join(date.format("%Y-%m-%d").to_string())
    }

    pub fn path(&self, date: NaiveDate, name: &str) -> PathBuf {
        self.run_dir(date).join(name)
    }

    pub fn quotes_file(source: &str) -> String {
        let safe: String = source
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("{QUOTES_PREFIX}{safe}.json")
    }

    pub fn exists(&self, date: NaiveDate, name: &str) -> bool {
        self.path(date, name).exists()
    }

    pub fn save<T: Serialize + ?Sized>(&self, date: NaiveDate, name: &str, value: &T) -> Result<PathBuf> {
        let path = self.path(date, name);
        write_json(&path, value)?;
        Ok(path)
    }

    pub fn save_text(&self, date: NaiveDate, name: &str, text: &str) -> Result<PathBuf> {
        let path = self.path(date, name);
        write_atomic(&path, text.as_bytes())?;
        debug!(path = %path.display(), "Text written");
        Ok(path)
    }

    pub fn load<T: DeserializeOwned>(&self, date: NaiveDate, name: &str) -> Result<Option<T>> {
        let path = self.path(date, name);
        let loaded = read_json(&path)?;
        if loaded.is_none() {
            info!(path = %path.display(), "No artifact found");
        }
        Ok(loaded)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
