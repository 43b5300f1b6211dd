//! Paid-usage ledger
//!
//! One JSON line per successful paid provider call:
//! `{ timestamp, adapter, fromLang, toLang, text }` where `text` holds the
//! first 100 characters of the translated input.

use super::AuditError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Input text kept in a paid-usage record, in characters
pub const PAID_TEXT_MAX_CHARS: usize = 100;

/// Default ledger file name
pub const DEFAULT_PAID_USAGE_LOG: &str = "paid_translation_usage.log";

/// Truncate to at most `max_chars` characters (never splits a code point)
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// One billable provider call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaidUsageRecord {
    pub timestamp: DateTime<Utc>,
    /// Provider name
    pub adapter: String,
    pub from_lang: String,
    pub to_lang: String,
    /// Input text, truncated to [`PAID_TEXT_MAX_CHARS`]
    pub text: String,
}

impl PaidUsageRecord {
    pub fn new(adapter: &str, text: &str, from_lang: &str, to_lang: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            adapter: adapter.to_string(),
            from_lang: from_lang.to_string(),
            to_lang: to_lang.to_string(),
            text: truncate_chars(text, PAID_TEXT_MAX_CHARS).to_string(),
        }
    }
}

/// Append-only JSONL ledger of paid provider calls
#[derive(Debug)]
pub struct PaidUsageLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl PaidUsageLog {
    /// Open (or create) the ledger in append mode
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Open the ledger under its default file name inside `dir`
    pub fn open_in(dir: impl AsRef<Path>) -> Result<Self, AuditError> {
        Self::open(dir.as_ref().join(DEFAULT_PAID_USAGE_LOG))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush
    pub fn append(&self, record: &PaidUsageRecord) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = self
            .file
            .lock()
            .map_err(|e| AuditError::Unavailable(format!("paid usage log poisoned: {}", e)))?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}
