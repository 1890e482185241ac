// ABOUTME: The reasoning loop — drives one turn of conversation between a session and a model.
// ABOUTME: Request/response, not streaming (an orthogonal transport concern); bounded by an iteration cap.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{info, warn};

use crate::approval::{ApprovalManager, ApprovalOutcome, ApprovalRequest};
use crate::error::ModelErrorKind;
use crate::model::{Message, ModelAdapter, ModelOptions, ToolCallRef};
use crate::runtime::Notifier;
use crate::session::SessionContext;
use crate::store::TranscriptStore;
use crate::tools::{PolicyCheck, Registry, ToolResult};

/// Upper bound on model round-trips within a single turn (§4.6). A turn
/// that keeps requesting tools past this point is cut off with a sentinel
/// message rather than looping forever.
pub const MAX_ITERATIONS: u32 = 10;

/// What a turn produced once it stops requesting tools.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub final_text: Option<String>,
    pub iterations: u32,
    pub hit_iteration_cap: bool,
}

/// Run one turn: call the model, execute any requested tools through the
/// approval gate, and loop back with the results until the model stops
/// asking for tools or the iteration cap is hit.
///
/// Mirrors the teacher's `conversation_turn`/`execute_tool_calls` shape,
/// de-streamed to a single request/response call per iteration and without
/// the TUI event channel — callers observe the turn only through the final
/// `TurnOutcome` and the mutated `session.messages`.
pub async fn run_turn(
    adapter: &ModelAdapter,
    registry: &Registry,
    approval_manager: &ApprovalManager,
    session: &mut SessionContext,
    system_prompt: &str,
    options: &ModelOptions,
    approval_timeout: Duration,
    notifier: Option<&dyn Notifier>,
    store: Option<&TranscriptStore>,
) -> Result<TurnOutcome, ModelErrorKind> {
    let mut iterations = 0u32;

    loop {
        iterations += 1;
        if iterations > MAX_ITERATIONS {
            let sentinel = Message::assistant("Error: Maximum tool execution iterations reached");
            log_and_push(session, store, sentinel.clone()).await;
            warn!(session_id = %session.session_id, "reasoning loop hit iteration cap");
            return Ok(TurnOutcome {
                final_text: Some(sentinel.content),
                iterations: iterations - 1,
                hit_iteration_cap: true,
            });
        }

        let tool_schemas = registry.schemas_for(session.session_type);
        let tools = if tool_schemas.is_empty() {
            None
        } else {
            Some(tool_schemas.as_slice())
        };

        let response = adapter
            .chat(&session.messages, tools, system_prompt, options)
            .await?;

        if response.tool_calls.is_empty() {
            let assistant_msg = Message::assistant(response.text.clone().unwrap_or_default());
            log_and_push(session, store, assistant_msg).await;
            return Ok(TurnOutcome {
                final_text: response.text,
                iterations,
                hit_iteration_cap: false,
            });
        }

        // Checked before the assistant message is recorded/persisted (§4.6 edge
        // cases): an assistant turn with unresolvable tool calls must never be
        // written to the transcript, or a later rehydration would load an
        // assistant message whose tool_calls have no matching tool results.
        if let Some(dup) = first_duplicate_id(&response.tool_calls) {
            return Err(ModelErrorKind::Malformed(format!(
                "duplicate tool_call_id in one response: {dup}"
            )));
        }

        let assistant_msg =
            Message::assistant_tool_calls(response.text.clone().unwrap_or_default(), response.tool_calls.clone());
        log_and_push(session, store, assistant_msg).await;

        for call in &response.tool_calls {
            let result_msg =
                execute_one_call(registry, approval_manager, session, call, approval_timeout, notifier).await;
            log_and_push(session, store, result_msg).await;
        }
    }
}

/// §4.6 edge case: a response with two tool calls sharing one `tool_call_id`
/// can't be keyed 1:1 into a tool-result batch, so it's treated as an
/// adapter malformed response rather than executed.
fn first_duplicate_id(calls: &[ToolCallRef]) -> Option<&str> {
    let mut seen = HashSet::new();
    for call in calls {
        if !seen.insert(call.id.as_str()) {
            return Some(call.id.as_str());
        }
    }
    None
}

async fn log_and_push(session: &mut SessionContext, store: Option<&TranscriptStore>, message: Message) {
    if let Some(store) = store {
        if let Err(e) = store.append(&session.session_id, &session.channel, &message) {
            warn!(session_id = %session.session_id, error = %e, "failed to persist transcript entry");
        }
    }
    session.push_message(message);
}

/// Run the full policy → approval → execution pipeline for one tool call,
/// returning the `Message::tool_result` to feed back to the model.
async fn execute_one_call(
    registry: &Registry,
    approval_manager: &ApprovalManager,
    session: &SessionContext,
    call: &ToolCallRef,
    approval_timeout: Duration,
    notifier: Option<&dyn Notifier>,
) -> Message {
    match registry.check_policy(&call.name, session.session_type) {
        PolicyCheck::UnknownTool => {
            Message::tool_result(call.id.clone(), ToolResult::failure(format!("unknown tool: {}", call.name)).as_model_content())
        }
        PolicyCheck::Denied => Message::tool_result(
            call.id.clone(),
            ToolResult::failure(format!("'{}' is not permitted in this session", call.name)).as_model_content(),
        ),
        PolicyCheck::RequiresApproval => {
            let result =
                run_with_approval(registry, approval_manager, session, call, approval_timeout, notifier).await;
            Message::tool_result(call.id.clone(), result.as_model_content())
        }
        PolicyCheck::Allowed => {
            let result = run_tool(registry, call, session).await;
            Message::tool_result(call.id.clone(), result.as_model_content())
        }
    }
}

/// §4.6: if no Notifier is available, a gated call fails immediately with a
/// distinct error rather than silently skipping the approval gate.
async fn run_with_approval(
    registry: &Registry,
    approval_manager: &ApprovalManager,
    session: &SessionContext,
    call: &ToolCallRef,
    approval_timeout: Duration,
    notifier: Option<&dyn Notifier>,
) -> ToolResult {
    let Some(notifier) = notifier else {
        return ToolResult::failure("approval required but no channel");
    };

    let request = ApprovalRequest {
        id: uuid::Uuid::new_v4(),
        session_id: session.session_id.clone(),
        tool_call_id: call.id.clone(),
        tool_name: call.name.clone(),
        arguments: call.arguments.clone(),
        description: format!("{}({})", call.name, call.arguments),
        created_at: chrono::Utc::now(),
        expires_at: chrono::Utc::now() + chrono::Duration::from_std(approval_timeout).unwrap_or_default(),
    };
    let request_id = request.id;
    let prompt = format!(
        "Approval needed: {}({}) — reply /approve {} or /deny {}",
        call.name, call.arguments, request_id, request_id
    );

    let rx = approval_manager.request(request, approval_timeout).await;
    // Delivery is best-effort (§6): a failed send does not abort the wait,
    // the timeout is the safety net (§8 property 7).
    notifier.send(&session.sender_id, &prompt).await;
    info!(tool = %call.name, approval_id = %request_id, "awaiting approval");

    match rx.await {
        Ok(ApprovalOutcome::Approved) => run_tool(registry, call, session).await,
        Ok(ApprovalOutcome::Denied) => ToolResult::failure("denied by approver"),
        Ok(ApprovalOutcome::TimedOut) | Err(_) => ToolResult::failure("approval request timed out"),
    }
}

/// §4.6: `context.workspace ?? "."` — tools run against the session's
/// workspace if one was set, or the current directory otherwise.
async fn run_tool(registry: &Registry, call: &ToolCallRef, session: &SessionContext) -> ToolResult {
    let Some(tool) = registry.get(&call.name) else {
        return ToolResult::failure(format!("unknown tool: {}", call.name));
    };

    let default_workspace = std::path::Path::new(".");
    let workspace = session.workspace.as_deref().unwrap_or(default_workspace);

    let timeout = Duration::from_secs(tool.policy().max_execution_time_seconds);
    match tokio::time::timeout(
        timeout,
        tool.execute(call.arguments.clone(), workspace, session.session_type),
    )
    .await
    {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => ToolResult::failure(format!("tool execution error: {e}")),
        Err(_) => ToolResult::failure("tool execution timed out"),
    }
}
