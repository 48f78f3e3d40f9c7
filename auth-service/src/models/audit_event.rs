//! Audit event model - structured authentication attempt records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
}

/// One authentication attempt, success or failure. Forwarded to the
/// audit sink fire-and-forget; never blocks the primary response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    /// e.g. "login", "login_failed", "recovery_code_login"
    pub action: String,
    pub user_id: Option<Uuid>,
    pub outcome: AuditOutcome,
    /// Client identifier (usually the remote IP)
    pub client_id: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn success(action: &str, user_id: Option<Uuid>, client_id: &str) -> Self {
        Self::new(action, user_id, AuditOutcome::Success, client_id)
    }

    pub fn failure(action: &str, user_id: Option<Uuid>, client_id: &str) -> Self {
        Self::new(action, user_id, AuditOutcome::Failure, client_id)
    }

    fn new(action: &str, user_id: Option<Uuid>, outcome: AuditOutcome, client_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: action.to_string(),
            user_id,
            outcome,
            client_id: client_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_constructors() {
        let ok = AuditEvent::success("login", Some(Uuid::new_v4()), "1.2.3.4");
        assert_eq!(ok.outcome, AuditOutcome::Success);

        let bad = AuditEvent::failure("login_failed", None, "1.2.3.4");
        assert_eq!(bad.outcome, AuditOutcome::Failure);
        assert!(bad.user_id.is_none());
    }
}
