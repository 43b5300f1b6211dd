//! Broadcast fan-out of audit events to live subscribers

use super::{AuditError, AuditEvent, AuditSink};
use tokio::sync::broadcast;

/// Audit event distribution bus
///
/// Wraps `tokio::broadcast`:
/// - Non-blocking publish (slow subscribers don't block routing)
/// - Multiple concurrent subscribers (dashboards, exporters)
/// - Lagged subscribers lose the oldest events, never block producers
///
/// Publishing with no subscribers is not an error; audit delivery to the
/// bus is best-effort by nature. Use [`super::JsonlAuditSink`] for a durable
/// trail.
///
/// # Examples
///
/// ```
/// use talkkin_common::audit::{AuditBus, AuditEvent, AuditKind, AuditSink};
///
/// let bus = AuditBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.record(&AuditEvent::new(AuditKind::Decision, "orchestrator", "fused")).unwrap();
///
/// let event = rx.try_recv().unwrap();
/// assert_eq!(event.source, "orchestrator");
/// ```
#[derive(Clone)]
pub struct AuditBus {
    tx: broadcast::Sender<AuditEvent>,
    capacity: usize,
}

impl AuditBus {
    /// Creates a new bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events published before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.tx.subscribe()
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl AuditSink for AuditBus {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        // Err only means nobody is listening right now
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}
