//! Concrete audit sinks

use super::{AuditError, AuditEvent, AuditKind, AuditSink};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Renders audit events as structured `tracing` events
///
/// `error` events are logged at ERROR, `paid-usage` at WARN (billable calls
/// must stand out), everything else at INFO.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let data = event.data.to_string();
        let user_id = event.user_id.as_deref().unwrap_or("-");
        match event.kind {
            AuditKind::Error => error!(
                target: "talkkin::audit",
                kind = %event.kind,
                source = %event.source,
                user_id,
                locale = %event.locale,
                data = %data,
                "{}",
                event.message
            ),
            AuditKind::PaidUsage => warn!(
                target: "talkkin::audit",
                kind = %event.kind,
                source = %event.source,
                user_id,
                locale = %event.locale,
                data = %data,
                "{}",
                event.message
            ),
            _ => info!(
                target: "talkkin::audit",
                kind = %event.kind,
                source = %event.source,
                user_id,
                locale = %event.locale,
                data = %data,
                "{}",
                event.message
            ),
        }
        Ok(())
    }
}

/// Append-only in-memory audit log
///
/// Clones share the same underlying log.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events, oldest first
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Recorded events of one kind, oldest first
    pub fn events_of(&self, kind: AuditKind) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut events = self
            .events
            .lock()
            .map_err(|e| AuditError::Unavailable(format!("memory sink poisoned: {}", e)))?;
        events.push(event.clone());
        Ok(())
    }
}

/// Append-only line-delimited JSON file sink
///
/// One event per line. Writes are serialized through an internal lock so
/// lines from concurrent requests never interleave.
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditSink {
    /// Open (or create) the file in append mode
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

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        let mut file = self
            .file
            .lock()
            .map_err(|e| AuditError::Unavailable(format!("jsonl sink poisoned: {}", e)))?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// Forwards each event to every inner sink
///
/// All sinks are attempted even if one fails; the first failure is returned.
#[derive(Clone, Default)]
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn AuditSink>) {
        self.sinks.push(sink);
    }
}

impl AuditSink for FanoutAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(event) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
