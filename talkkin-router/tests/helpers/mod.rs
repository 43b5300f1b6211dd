//! Test Helper Utilities
//!
//! Shared utilities for the talkkin-router integration tests

#![allow(dead_code)]

pub mod log_capture;
pub mod mocks;

pub use log_capture::LogCapture;
pub use mocks::{mock_plugin, CallCounter, FailingAuditSink, MockRecognizer, MockTranslator};
