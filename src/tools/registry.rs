// ABOUTME: Tool trait, policy, and registry — the pluggable surface the reasoning loop dispatches onto.
// ABOUTME: Policy is enforced at two gates: schema filtering before the model sees a tool, and re-checked before execution.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::model::ToolSchema;
use crate::session::SessionType;

/// Per-tool admission rules (§3, §4.3).
///
/// `allowed_session_types` is the schema-filtering gate: a tool absent from
/// a session's type is never offered to the model for that session at all.
/// `requires_approval` and `max_execution_time_seconds` apply only once a
/// call for that tool has already been admitted.
#[derive(Debug, Clone)]
pub struct ToolPolicy {
    pub allowed_session_types: HashSet<SessionType>,
    pub requires_approval: bool,
    pub max_execution_time_seconds: u64,
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self {
            allowed_session_types: HashSet::from([SessionType::Main]),
            requires_approval: false,
            max_execution_time_seconds: 30,
        }
    }
}

impl ToolPolicy {
    /// A policy open to every session type, still ungated on approval.
    pub fn open() -> Self {
        Self {
            allowed_session_types: HashSet::from([
                SessionType::Main,
                SessionType::Dm,
                SessionType::Group,
                SessionType::Topic,
            ]),
            ..Self::default()
        }
    }

    pub fn requiring_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.max_execution_time_seconds = seconds;
        self
    }

    pub fn allows(&self, session_type: SessionType) -> bool {
        self.allowed_session_types.contains(&session_type)
    }
}

/// Outcome of one tool execution. Failure is data, never a raised error
/// (§7): a tool that fails produces a `ToolResult` the model reads back,
/// not a panic or a propagated `anyhow::Error` up through the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }

    /// The text handed back to the model as the content of a tool-result message.
    pub fn as_model_content(&self) -> String {
        match (&self.output, &self.error) {
            (Some(output), _) if self.success => output.clone(),
            (_, Some(error)) => format!("Error: {error}"),
            _ => String::new(),
        }
    }
}

/// A callable capability the model may invoke. Kept as an `async_trait`
/// object (the teacher's `tools::ask_user::Tool` shape), with `policy`
/// made a first-class trait method rather than looked up out-of-band.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> Value;
    fn policy(&self) -> &ToolPolicy;
    /// `workspace` is the session's working directory (`context.workspace ?? "."`, §4.6);
    /// `session_type` lets a tool body vary its own behavior by trust level
    /// beyond the registry's admit/deny gate (§3's `execute` signature).
    async fn execute(
        &self,
        arguments: Value,
        workspace: &Path,
        session_type: SessionType,
    ) -> Result<ToolResult, anyhow::Error>;
}

/// The set of tools a runtime knows about. Registration is expected to
/// happen once at startup; lookups happen on every turn.
#[derive(Default)]
pub struct Registry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registration is exclusive by name; re-registering an existing name
    /// overwrites it and logs (§4.3: "re-registering the same name
    /// overwrites and SHOULD log").
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "tool re-registered, overwriting previous entry");
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Schema-filtering gate (§4.3a): only tools admitted for this session
    /// type are presented to the model at all.
    pub fn schemas_for(&self, session_type: SessionType) -> Vec<ToolSchema> {
        self.tools
            .values()
            .filter(|tool| tool.policy().allows(session_type))
            .map(|tool| ToolSchema {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.schema(),
            })
            .collect()
    }

    /// Execution-time gate (§4.3b): re-checks policy defensively even
    /// though the model should only ever have seen admitted tools.
    pub fn check_policy(&self, name: &str, session_type: SessionType) -> PolicyCheck {
        match self.tools.get(name) {
            None => PolicyCheck::UnknownTool,
            Some(tool) if !tool.policy().allows(session_type) => PolicyCheck::Denied,
            Some(tool) if tool.policy().requires_approval => PolicyCheck::RequiresApproval,
            Some(_) => PolicyCheck::Allowed,
        }
    }
}

/// Result of a policy check at the execution gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyCheck {
    Allowed,
    RequiresApproval,
    Denied,
    UnknownTool,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool {
        policy: ToolPolicy,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes its input back."
        }

        fn schema(&self) -> Value {
            serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        fn policy(&self) -> &ToolPolicy {
            &self.policy
        }

        async fn execute(
            &self,
            arguments: Value,
            _workspace: &Path,
            _session_type: SessionType,
        ) -> Result<ToolResult, anyhow::Error> {
            let text = arguments
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Ok(ToolResult::ok(text.to_string()))
        }
    }

    fn registry_with_echo(policy: ToolPolicy) -> Registry {
        let mut registry = Registry::new();
        registry.register(Box::new(EchoTool { policy }));
        registry
    }

    #[test]
    fn default_policy_is_main_only_no_approval() {
        let policy = ToolPolicy::default();
        assert!(policy.allows(SessionType::Main));
        assert!(!policy.allows(SessionType::Group));
        assert!(!policy.requires_approval);
    }

    #[test]
    fn schemas_for_filters_by_session_type() {
        let registry = registry_with_echo(ToolPolicy::default());
        assert_eq!(registry.schemas_for(SessionType::Main).len(), 1);
        assert!(registry.schemas_for(SessionType::Group).is_empty());
    }

    #[test]
    fn check_policy_unknown_tool() {
        let registry = registry_with_echo(ToolPolicy::default());
        assert_eq!(registry.check_policy("nope", SessionType::Main), PolicyCheck::UnknownTool);
    }

    #[test]
    fn check_policy_denied_for_disallowed_session_type() {
        let registry = registry_with_echo(ToolPolicy::default());
        assert_eq!(registry.check_policy("echo", SessionType::Group), PolicyCheck::Denied);
    }

    #[test]
    fn check_policy_requires_approval_when_flagged() {
        let registry = registry_with_echo(ToolPolicy::default().requiring_approval());
        assert_eq!(
            registry.check_policy("echo", SessionType::Main),
            PolicyCheck::RequiresApproval
        );
    }

    #[test]
    fn check_policy_allowed_in_open_case() {
        let registry = registry_with_echo(ToolPolicy::open());
        assert_eq!(registry.check_policy("echo", SessionType::Topic), PolicyCheck::Allowed);
    }

    #[tokio::test]
    async fn execute_echo_tool() {
        let registry = registry_with_echo(ToolPolicy::default());
        let tool = registry.get("echo").unwrap();
        let result = tool
            .execute(serde_json::json!({"text": "hi"}), Path::new("."), SessionType::Main)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output.as_deref(), Some("hi"));
    }

    #[test]
    fn tool_result_failure_renders_error_prefix() {
        let result = ToolResult::failure("boom");
        assert_eq!(result.as_model_content(), "Error: boom");
    }
}
