//! Audit publishing.
//!
//! The pipeline calls [`AuditPublisher::publish`] at fixed transition points.
//! The publisher fans each event out to its registered handlers in
//! registration order. Storage and querying belong to the handlers.
//!
//! ## NIST 800-53 Rev5: AU-5 (Response to Audit Logging Process Failures)
//!
//! A failing handler is reported through `tracing` and does not stop
//! delivery to the remaining handlers, nor the request being processed.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::event::{AuditEvent, AuditEventKind};

/// Receiver of audit events.
#[async_trait]
pub trait AuditHandler: Send + Sync {
    /// Records an audit event.
    async fn append(&self, event: &AuditEvent) -> Result<()>;
}

/// Writes audit events as structured `tracing` records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditHandler;

impl TracingAuditHandler {
    /// Creates a new tracing handler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditHandler for TracingAuditHandler {
    async fn append(&self, event: &AuditEvent) -> Result<()> {
        let payload = serde_json::to_string(&event.payload)?;
        match event.kind {
            AuditEventKind::ErrorResponse | AuditEventKind::UnrecoverableError => {
                tracing::warn!(
                    event_id = %event.id,
                    event_kind = %event.kind,
                    correlation_id = ?event.correlation_id,
                    sp = ?event.sp_entity_id,
                    payload = %payload,
                    "saml_audit_event"
                );
            }
            _ => {
                tracing::info!(
                    event_id = %event.id,
                    event_kind = %event.kind,
                    correlation_id = ?event.correlation_id,
                    sp = ?event.sp_entity_id,
                    payload = %payload,
                    "saml_audit_event"
                );
            }
        }
        Ok(())
    }
}

/// Keeps audit events in memory.
///
/// Intended for tests and development.
#[derive(Debug, Default)]
pub struct MemoryAuditHandler {
    events: RwLock<Vec<AuditEvent>>,
}

impl MemoryAuditHandler {
    /// Creates an empty handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().clone()
    }

    /// Returns the kinds of all recorded events, in order.
    #[must_use]
    pub fn kinds(&self) -> Vec<AuditEventKind> {
        self.events.read().iter().map(|e| e.kind).collect()
    }

    /// Returns the recorded events with the given correlation id.
    #[must_use]
    pub fn events_for(&self, correlation_id: &str) -> Vec<AuditEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.correlation_id.as_deref() == Some(correlation_id))
            .cloned()
            .collect()
    }

    /// Removes all recorded events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl AuditHandler for MemoryAuditHandler {
    async fn append(&self, event: &AuditEvent) -> Result<()> {
        self.events.write().push(event.clone());
        Ok(())
    }
}

/// Forwards audit events to a channel consumed elsewhere.
#[derive(Debug, Clone)]
pub struct ChannelAuditHandler {
    sender: mpsc::UnboundedSender<AuditEvent>,
}

impl ChannelAuditHandler {
    /// Creates a handler together with the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AuditEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl AuditHandler for ChannelAuditHandler {
    async fn append(&self, event: &AuditEvent) -> Result<()> {
        self.sender
            .send(event.clone())
            .map_err(|_| Error::Audit("audit channel closed".into()))
    }
}

/// Publishes audit events to an ordered list of handlers.
#[derive(Clone, Default)]
pub struct AuditPublisher {
    handlers: Vec<Arc<dyn AuditHandler>>,
}

impl std::fmt::Debug for AuditPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditPublisher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl AuditPublisher {
    /// Creates a publisher without handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn AuditHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Delivers the event to every handler.
    pub async fn publish(&self, event: AuditEvent) {
        for handler in &self.handlers {
            if let Err(e) = handler.append(&event).await {
                tracing::warn!(
                    error = %e,
                    event_id = %event.id,
                    event_kind = %event.kind,
                    "Audit handler failed"
                );
            }
        }
    }
}
