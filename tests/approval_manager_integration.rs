// ABOUTME: Cross-module integration tests for ApprovalManager's concurrent rendezvous behavior.
// ABOUTME: Complements the in-module unit tests with scenarios involving multiple callers and requests.

use std::time::Duration;

use orchestra::approval::{ApprovalDecision, ApprovalManager, ApprovalOutcome, ApprovalRequest};

fn sample_request(tool_name: &str) -> ApprovalRequest {
    let now = chrono::Utc::now();
    ApprovalRequest {
        id: uuid::Uuid::new_v4(),
        session_id: "s1".to_string(),
        tool_call_id: format!("call-{tool_name}"),
        tool_name: tool_name.to_string(),
        arguments: serde_json::json!({}),
        description: format!("{tool_name}()"),
        created_at: now,
        expires_at: now + chrono::Duration::seconds(60),
    }
}

// Two independent requests resolve independently: approving one never
// disturbs the other's pending state.
#[tokio::test]
async fn independent_requests_resolve_independently() {
    let manager = ApprovalManager::new();

    let req_a = sample_request("bash");
    let req_b = sample_request("write_file");
    let id_a = req_a.id;
    let id_b = req_b.id;

    let rx_a = manager.request(req_a, Duration::from_secs(5)).await;
    let rx_b = manager.request(req_b, Duration::from_secs(5)).await;

    manager.resolve(id_a, ApprovalDecision::Approve, "operator").await;

    assert_eq!(rx_a.await.unwrap(), ApprovalOutcome::Approved);
    assert!(!manager.get(id_b).await.unwrap().is_resolved());

    manager.resolve(id_b, ApprovalDecision::Deny, "operator").await;
    assert_eq!(rx_b.await.unwrap(), ApprovalOutcome::Denied);
}

// list_unresolved reflects exactly the requests still awaiting a decision,
// across several concurrently pending requests.
#[tokio::test]
async fn list_unresolved_tracks_pending_set() {
    let manager = ApprovalManager::new();

    let req_a = sample_request("bash");
    let req_b = sample_request("write_file");
    let id_a = req_a.id;

    let _rx_a = manager.request(req_a, Duration::from_secs(5)).await;
    let _rx_b = manager.request(req_b, Duration::from_secs(5)).await;

    assert_eq!(manager.list_unresolved().await.len(), 2);

    manager.resolve(id_a, ApprovalDecision::Approve, "operator").await;

    let remaining = manager.list_unresolved().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].request.tool_name, "write_file");
}

// A decision delivered from a separate task (modeling a channel adapter
// relaying a human reply on its own task) still reaches the original
// awaiter, exercising the manager's `Clone` + `Arc`-shared state.
#[tokio::test]
async fn decision_from_another_task_reaches_original_awaiter() {
    let manager = ApprovalManager::new();
    let request = sample_request("bash");
    let id = request.id;

    let rx = manager.request(request, Duration::from_secs(5)).await;

    let manager_clone = manager.clone();
    tokio::spawn(async move {
        manager_clone.resolve(id, ApprovalDecision::Approve, "operator-on-other-task").await;
    });

    assert_eq!(rx.await.unwrap(), ApprovalOutcome::Approved);
    let record = manager.get(id).await.unwrap();
    assert_eq!(record.resolved_by.as_deref(), Some("operator-on-other-task"));
}

// One request timing out does not affect a sibling request that resolves
// normally around the same time.
#[tokio::test(start_paused = true)]
async fn one_timeout_does_not_affect_sibling_request() {
    let manager = ApprovalManager::new();

    let req_slow = sample_request("bash");
    let req_fast = sample_request("write_file");
    let id_fast = req_fast.id;

    let rx_slow = manager.request(req_slow, Duration::from_millis(50)).await;
    let rx_fast = manager.request(req_fast, Duration::from_secs(5)).await;

    manager.resolve(id_fast, ApprovalDecision::Approve, "operator").await;
    tokio::time::advance(Duration::from_millis(100)).await;

    assert_eq!(rx_slow.await.unwrap(), ApprovalOutcome::TimedOut);
    assert_eq!(rx_fast.await.unwrap(), ApprovalOutcome::Approved);
}
