// ABOUTME: Core types for the approval rendezvous — request, decision, and resolved record.
// ABOUTME: Decision is a closed two-way choice; timeout is a distinct terminal outcome, not a decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A tool call waiting on a human decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub session_id: String,
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// The user's decision on a pending request. Timeout is never encoded here —
/// it is the absence of a decision by `expires_at`, surfaced as
/// `ApprovalOutcome::TimedOut` instead (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approve,
    Deny,
}

/// What `wait_for_decision` resolves to, and what a settled `ApprovalRecord`
/// stores as its terminal decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOutcome {
    Approved,
    Denied,
    TimedOut,
}

/// The durable record of a request plus however it was settled, the unit
/// the manager exposes for inspection and the unit `resolve` finalizes.
///
/// `decision` holds the full three-way outcome (§3: `APPROVE`/`DENY`/`TIMEOUT`),
/// not just the two-way `ApprovalDecision` a human can submit — a timeout is
/// a terminal resolution of the record, not an absence of one, so
/// `is_resolved` must flip to true when it fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub request: ApprovalRequest,
    pub decision: Option<ApprovalOutcome>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

impl ApprovalRecord {
    pub fn pending(request: ApprovalRequest) -> Self {
        Self {
            request,
            decision: None,
            resolved_at: None,
            resolved_by: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.decision.is_some()
    }
}
