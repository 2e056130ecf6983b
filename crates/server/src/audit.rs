use storefront_core::audit::{AuditEvent, AuditOutcome, AuditSink};
use tracing::{info, warn};

/// Forwards audit events to the process log.
#[derive(Clone, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let account_id = event.account_id.as_ref().map(|id| id.0.as_str()).unwrap_or("anonymous");
        let provider = event.provider.as_deref().unwrap_or("none");
        let metadata = event
            .metadata
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(" ");

        match event.outcome {
            AuditOutcome::Success => info!(
                event_name = %event.event_type,
                correlation_id = %event.correlation_id,
                account_id = %account_id,
                provider = %provider,
                actor = %event.actor,
                category = ?event.category,
                metadata = %metadata,
                "audit event"
            ),
            AuditOutcome::Rejected | AuditOutcome::Failed => warn!(
                event_name = %event.event_type,
                correlation_id = %event.correlation_id,
                account_id = %account_id,
                provider = %provider,
                actor = %event.actor,
                category = ?event.category,
                outcome = ?event.outcome,
                metadata = %metadata,
                "audit event"
            ),
        }
    }
}
