use chrono::Utc;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::AssessmentStore;
use crate::error::Result;
use crate::models::audit_log::AuditLog;

const MAX_AUDIT_ROWS: i64 = 500;

#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn AssessmentStore>,
}

impl AuditService {
    pub fn new(store: Arc<dyn AssessmentStore>) -> Self {
        Self { store }
    }

    pub async fn log(
        &self,
        actor: Option<&str>,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        changes: Option<JsonValue>,
    ) -> Result<AuditLog> {
        let entry = AuditLog {
            id: Uuid::new_v4(),
            actor: actor.map(str::to_string),
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            changes,
            created_at: Utc::now(),
        };
        self.store.insert_audit_log(&entry).await
    }

    /// Records an entry without failing the caller; the change it describes
    /// has already been committed.
    pub async fn record(
        &self,
        actor: Option<&str>,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        changes: Option<JsonValue>,
    ) {
        if let Err(e) = self
            .log(actor, action, entity_type, entity_id, changes)
            .await
        {
            tracing::warn!(error = %e, action, %entity_id, "failed to write audit log");
        }
    }

    pub async fn list(&self, entity_id: Option<Uuid>, limit: Option<i64>) -> Result<Vec<AuditLog>> {
        let limit = limit.unwrap_or(100).clamp(1, MAX_AUDIT_ROWS);
        self.store.list_audit_logs(entity_id, limit).await
    }
}
