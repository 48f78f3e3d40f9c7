//! Audit sink boundary.
//!
//! Every authentication attempt, success or failure, produces an
//! `AuditEvent`. Emission is fire-and-forget: a slow or failing sink must
//! never delay or fail the primary response.

use crate::models::AuditEvent;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Spawn the sink write so the caller never waits on it.
pub fn emit(sink: &Arc<dyn AuditSink>, event: AuditEvent) {
    let sink = sink.clone();
    tokio::spawn(async move {
        sink.record(event).await;
    });
}

/// Default sink: structured log lines.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        tracing::info!(
            audit = true,
            action = %event.action,
            outcome = ?event.outcome,
            user_id = ?event.user_id,
            client_id = %event.client_id,
            "audit event"
        );
    }
}

/// Collecting sink for tests.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
