// ABOUTME: Approval manager — the out-of-band rendezvous between a paused tool call and a human decision.
// ABOUTME: One linearization point (`complete`) guarantees the first transition wins, whether it comes from `resolve` or the timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use super::types::{ApprovalDecision, ApprovalOutcome, ApprovalRecord, ApprovalRequest};

struct PendingApproval {
    record: ApprovalRecord,
    sender: Option<oneshot::Sender<ApprovalDecision>>,
    timeout_handle: JoinHandle<()>,
}

/// Coordinates approval requests raised mid-turn by the reasoning loop with
/// decisions delivered asynchronously, from a different call path entirely
/// (typically a channel adapter relaying a human's reply).
///
/// Mirrors the teacher's `ApprovalEngine` in shape (a mutex-guarded shared
/// map, a `resolve` entry point) but the unit of concurrency here is one
/// UUID-keyed rendezvous rather than a persistent tool/pattern allowlist —
/// the allowlist and command-safety layer the teacher built on top of that
/// is sandboxing policy, out of scope for this core.
#[derive(Clone)]
pub struct ApprovalManager {
    pending: Arc<Mutex<HashMap<Uuid, PendingApproval>>>,
}

impl Default for ApprovalManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ApprovalManager {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a new request and return a receiver the caller awaits for
    /// the outcome. The manager itself owns the timeout timer, so the
    /// outcome arrives even if no caller is actively waiting (§4.4).
    pub async fn request(
        &self,
        request: ApprovalRequest,
        timeout: Duration,
    ) -> oneshot::Receiver<ApprovalOutcome> {
        let (decision_tx, decision_rx) = oneshot::channel::<ApprovalDecision>();
        let (outcome_tx, outcome_rx) = oneshot::channel::<ApprovalOutcome>();

        let id = request.id;
        let manager = self.clone();
        let timeout_handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if manager.complete(id, None, None).await {
                warn!(approval_id = %id, "approval request timed out");
            }
        });

        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                id,
                PendingApproval {
                    record: ApprovalRecord::pending(request),
                    sender: Some(decision_tx),
                    timeout_handle,
                },
            );
        }

        tokio::spawn(async move {
            let outcome = match decision_rx.await {
                Ok(ApprovalDecision::Approve) => ApprovalOutcome::Approved,
                Ok(ApprovalDecision::Deny) => ApprovalOutcome::Denied,
                Err(_) => ApprovalOutcome::TimedOut,
            };
            let _ = outcome_tx.send(outcome);
        });

        outcome_rx
    }

    /// Deliver a human decision for a pending request. Returns `false` if
    /// the request is unknown or already resolved — a late or duplicate
    /// decision is silently dropped, never an error (§4.4, §8 invariant:
    /// first transition wins).
    pub async fn resolve(&self, id: Uuid, decision: ApprovalDecision, resolved_by: impl Into<String>) -> bool {
        let resolved_by = resolved_by.into();
        self.complete(id, Some(decision), Some(resolved_by)).await
    }

    /// Single linearization point: checks the record is still unresolved,
    /// stamps it, and only then notifies the waiter. `decision: None` is the
    /// timeout path. Returns whether this call performed the transition.
    async fn complete(&self, id: Uuid, decision: Option<ApprovalDecision>, resolved_by: Option<String>) -> bool {
        let mut pending = self.pending.lock().await;
        let Some(entry) = pending.get_mut(&id) else {
            return false;
        };
        if entry.record.is_resolved() {
            return false;
        }

        entry.record.resolved_at = Some(Utc::now());
        entry.record.resolved_by = resolved_by;

        match decision {
            Some(d) => {
                entry.record.decision = Some(match d {
                    ApprovalDecision::Approve => ApprovalOutcome::Approved,
                    ApprovalDecision::Deny => ApprovalOutcome::Denied,
                });
                if let Some(sender) = entry.sender.take() {
                    let _ = sender.send(d);
                }
                entry.timeout_handle.abort();
                info!(approval_id = %id, decision = ?d, "approval resolved");
            }
            None => {
                // Timeout: this IS the decision (§3: decision ∈ {APPROVE, DENY, TIMEOUT}),
                // not an absence of one. Drop the sender so the waiting receiver observes
                // a closed channel and maps it to ApprovalOutcome::TimedOut itself.
                entry.record.decision = Some(ApprovalOutcome::TimedOut);
                entry.sender.take();
            }
        }

        true
    }

    /// Look up the current state of a request, resolved or not.
    pub async fn get(&self, id: Uuid) -> Option<ApprovalRecord> {
        self.pending.lock().await.get(&id).map(|entry| entry.record.clone())
    }

    /// Snapshot every request still awaiting a decision. A channel adapter
    /// polls this to learn which approval ids it should surface to a human
    /// approver — the manager itself never pushes a notification.
    pub async fn list_unresolved(&self) -> Vec<ApprovalRecord> {
        self.pending
            .lock()
            .await
            .values()
            .map(|entry| entry.record.clone())
            .filter(|record| !record.is_resolved())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: Uuid) -> ApprovalRequest {
        ApprovalRequest {
            id,
            session_id: "s1".to_string(),
            tool_call_id: "call-1".to_string(),
            tool_name: "bash".to_string(),
            arguments: serde_json::json!({"command": "ls"}),
            description: "bash(ls)".to_string(),
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::seconds(60),
        }
    }

    #[tokio::test]
    async fn approve_resolves_to_approved() {
        let manager = ApprovalManager::new();
        let id = Uuid::new_v4();
        let rx = manager.request(request(id), Duration::from_secs(5)).await;

        manager.resolve(id, ApprovalDecision::Approve, "user-1").await;

        assert_eq!(rx.await.unwrap(), ApprovalOutcome::Approved);
    }

    #[tokio::test]
    async fn deny_resolves_to_denied() {
        let manager = ApprovalManager::new();
        let id = Uuid::new_v4();
        let rx = manager.request(request(id), Duration::from_secs(5)).await;

        manager.resolve(id, ApprovalDecision::Deny, "user-1").await;

        assert_eq!(rx.await.unwrap(), ApprovalOutcome::Denied);
    }

    #[tokio::test(start_paused = true)]
    async fn unresolved_request_times_out() {
        let manager = ApprovalManager::new();
        let id = Uuid::new_v4();
        let rx = manager.request(request(id), Duration::from_millis(50)).await;

        tokio::time::advance(Duration::from_millis(100)).await;

        assert_eq!(rx.await.unwrap(), ApprovalOutcome::TimedOut);
    }

    #[tokio::test]
    async fn second_resolve_is_ignored() {
        let manager = ApprovalManager::new();
        let id = Uuid::new_v4();
        let rx = manager.request(request(id), Duration::from_secs(5)).await;

        assert!(manager.resolve(id, ApprovalDecision::Approve, "user-1").await);
        assert!(!manager.resolve(id, ApprovalDecision::Deny, "user-2").await);

        assert_eq!(rx.await.unwrap(), ApprovalOutcome::Approved);
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_after_timeout_is_ignored() {
        let manager = ApprovalManager::new();
        let id = Uuid::new_v4();
        let rx = manager.request(request(id), Duration::from_millis(50)).await;

        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(rx.await.unwrap(), ApprovalOutcome::TimedOut);

        let record = manager.get(id).await.unwrap();
        assert!(record.is_resolved());
        assert_eq!(record.decision, Some(ApprovalOutcome::TimedOut));

        assert!(!manager.resolve(id, ApprovalDecision::Approve, "late-operator").await);
        let record = manager.get(id).await.unwrap();
        assert_eq!(record.decision, Some(ApprovalOutcome::TimedOut));
        assert_ne!(record.resolved_by.as_deref(), Some("late-operator"));
    }

    #[tokio::test]
    async fn resolve_unknown_id_returns_false() {
        let manager = ApprovalManager::new();
        assert!(!manager.resolve(Uuid::new_v4(), ApprovalDecision::Approve, "user-1").await);
    }

    #[tokio::test]
    async fn get_reflects_resolution() {
        let manager = ApprovalManager::new();
        let id = Uuid::new_v4();
        let _rx = manager.request(request(id), Duration::from_secs(5)).await;

        assert!(!manager.get(id).await.unwrap().is_resolved());

        manager.resolve(id, ApprovalDecision::Approve, "user-1").await;

        assert!(manager.get(id).await.unwrap().is_resolved());
    }
}
