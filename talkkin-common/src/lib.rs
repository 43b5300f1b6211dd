//! # Talk Kin Common Library
//!
//! Shared code for the Talk Kin routing services including:
//! - Error types
//! - Audit event model and audit sinks
//! - Configuration loading
//! - Tracing initialisation

pub mod audit;
pub mod config;
pub mod error;
pub mod logging;

pub use audit::{AuditEvent, AuditKind, AuditSink};
pub use error::{Error, Result};
