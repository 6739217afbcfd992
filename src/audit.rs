//! Audit-log boundary.
//!
//! The engine reports every state change here but never depends on the sink
//! succeeding: recording is fire-and-forget, and implementations must not
//! panic or block on network I/O.

use serde_json::Value;

/// One audit record: who did what to which entity.
#[derive(Clone, Debug)]
pub struct AuditRecord {
    /// Operator user id; `None` for scheduler-driven transitions.
    pub actor: Option<u64>,
    pub action: &'static str,
    pub entity: &'static str,
    pub entity_id: u64,
    pub payload: Value,
}

pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Default sink: structured tracing records under the `audit` target.
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record(&self, record: AuditRecord) {
        tracing::info!(
            target: "audit",
            actor = ?record.actor,
            action = record.action,
            entity = record.entity,
            entity_id = record.entity_id,
            payload = %record.payload,
            "audit"
        );
    }
}
