// ABOUTME: Echo tool — returns its input back unchanged, for exercising the reasoning loop manually.
// ABOUTME: Open to every session type and never gated, since it has no side effects to approve.

use async_trait::async_trait;
use serde_json::Value;

use crate::session::SessionType;

use super::registry::{Tool, ToolPolicy, ToolResult};

/// Trivial tool that echoes its `text` argument back as output.
pub struct EchoTool {
    policy: ToolPolicy,
}

impl Default for EchoTool {
    fn default() -> Self {
        Self {
            policy: ToolPolicy::open(),
        }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the given text back. Useful for exercising the tool-call path."
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The text to echo back"
                }
            },
            "required": ["text"]
        })
    }

    fn policy(&self) -> &ToolPolicy {
        &self.policy
    }

    async fn execute(
        &self,
        arguments: Value,
        _workspace: &std::path::Path,
        _session_type: SessionType,
    ) -> Result<ToolResult, anyhow::Error> {
        let text = arguments
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(ToolResult::ok(text.to_string()))
    }
}
