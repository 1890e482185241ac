// ABOUTME: Runtime — the top-level orchestrator wiring model, tools, approvals, sessions, and storage.
// ABOUTME: Generalizes the teacher's single-workspace `App` to the multi-session case this core requires.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};

use crate::approval::ApprovalManager;
use crate::config::LlmConfig;
use crate::error::ModelErrorKind;
use crate::model::{self, ModelAdapter, ModelOptions};
use crate::reasoning::{self, TurnOutcome};
use crate::session::SessionContext;
use crate::store::TranscriptStore;
use crate::tools::{Registry, Tool};

/// Outbound notification surface a channel adapter implements. The
/// reasoning loop never calls this directly — it is a collaborator the
/// binding layer around `Runtime` can use to relay replies, modeled on the
/// teacher's `async_trait`-based `Tool` so it composes the same way.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient_id: &str, content: &str) -> bool;
}

/// Top-level orchestrator: one per process, owning every session's state
/// and the shared collaborators a turn needs.
///
/// The session cache is a `DashMap` rather than a single `Mutex<HashMap<..>>`
/// (§5): lookups are read-mostly and should not contend with each other,
/// only per-session turns need exclusivity, which the inner
/// `Mutex<SessionContext>` provides.
///
/// Model adapters are likewise cached in a `DashMap`, keyed by resolved
/// model id, and built lazily on first use (§9's "lazy provider client
/// construction" design note) rather than eagerly at construction — a turn
/// that names a `model` override builds (and thereafter reuses) its own
/// adapter instead of sharing the default one.
///
/// The tool registry is read-mostly (every turn calls `schemas_for`/
/// `check_policy`/`get`) but registration is a first-class Runtime
/// operation too (§6: `register_tool`), so it sits behind a
/// `tokio::sync::RwLock`: a short exclusive lock on `register_tool`
/// (§5), shared reads everywhere else.
pub struct Runtime {
    sessions: DashMap<String, Arc<Mutex<SessionContext>>>,
    llm_config: LlmConfig,
    adapters: DashMap<String, Arc<ModelAdapter>>,
    registry: RwLock<Registry>,
    approval_manager: ApprovalManager,
    store: Option<TranscriptStore>,
    notifier: Option<Arc<dyn Notifier>>,
    approval_timeout: Duration,
    system_prompt: String,
    model_options: ModelOptions,
    max_messages: usize,
}

impl Runtime {
    pub fn new(llm_config: LlmConfig, registry: Registry, system_prompt: impl Into<String>) -> Self {
        Self {
            sessions: DashMap::new(),
            llm_config,
            adapters: DashMap::new(),
            registry: RwLock::new(registry),
            approval_manager: ApprovalManager::new(),
            store: None,
            notifier: None,
            approval_timeout: Duration::from_secs(300),
            system_prompt: system_prompt.into(),
            model_options: ModelOptions::default(),
            max_messages: 200,
        }
    }

    pub fn with_store(mut self, store: TranscriptStore) -> Self {
        self.store = Some(store);
        self
    }

    /// The Notifier is optional (§6): without one, a gated tool call fails
    /// closed rather than silently skipping the approval gate (§4.6).
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = timeout;
        self
    }

    pub fn with_model_options(mut self, options: ModelOptions) -> Self {
        self.model_options = options;
        self
    }

    /// Bound on how many trailing Store messages are rehydrated into a
    /// freshly-created session's in-memory transcript (§4.7, `storage.max_messages`).
    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages;
        self
    }

    /// Register a tool after construction (§6's Runtime API). Takes the
    /// registry's exclusive lock just long enough to insert (§5); every
    /// turn's `schemas_for`/`check_policy`/`get` calls only ever need the
    /// shared read side.
    pub async fn register_tool(&self, tool: Box<dyn Tool>) {
        self.registry.write().await.register(tool);
    }

    /// Resolve (and lazily build/cache) the adapter for a turn's model.
    fn adapter_for(&self, model_override: Option<&str>) -> Result<Arc<ModelAdapter>, ModelErrorKind> {
        let key = model_override.unwrap_or(&self.llm_config.model).to_string();
        if let Some(existing) = self.adapters.get(&key) {
            return Ok(existing.clone());
        }

        let adapter = model::create_adapter(&self.llm_config, model_override)
            .map_err(|e| ModelErrorKind::Unavailable(e.to_string()))?;
        let adapter = Arc::new(adapter);
        Ok(self
            .adapters
            .entry(key)
            .or_insert_with(|| adapter.clone())
            .clone())
    }

    /// Look up a session's cached context, or build a fresh one — rehydrating
    /// its tail from the Store, bounded by `max_messages`, if one is
    /// configured (§4.7 step 1).
    fn session_slot(&self, session_id: &str, channel: &str, sender_id: &str) -> Arc<Mutex<SessionContext>> {
        if let Some(existing) = self.sessions.get(session_id) {
            return existing.clone();
        }

        let mut ctx = SessionContext::new(session_id, channel, sender_id);
        if let Some(store) = &self.store {
            if let Err(e) = store.create(session_id, channel) {
                warn!(session_id = %session_id, error = %e, "failed to write transcript store header");
            }
            match store.load_tail(session_id, self.max_messages) {
                Ok(tail) => {
                    for message in tail {
                        ctx.push_message(message);
                    }
                }
                Err(e) => warn!(session_id = %session_id, error = %e, "failed to rehydrate transcript tail"),
            }
        }

        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ctx)))
            .clone()
    }

    /// Process one inbound message end to end: admit it into the session,
    /// run the reasoning loop, and return the turn's outcome.
    ///
    /// Concurrent calls for the same `session_id` serialize on that
    /// session's own mutex (§5's at-most-one-turn-per-session guarantee);
    /// calls for different sessions proceed independently. `model`, if
    /// given, overrides the configured default for this turn only.
    #[instrument(skip(self, text), fields(session_id = %session_id))]
    pub async fn chat(
        &self,
        session_id: &str,
        channel: &str,
        sender_id: &str,
        text: &str,
        model: Option<&str>,
    ) -> Result<TurnOutcome, ModelErrorKind> {
        let adapter = self.adapter_for(model)?;
        let slot = self.session_slot(session_id, channel, sender_id);
        let mut session = slot.lock().await;

        let user_msg = crate::model::Message::user(text);
        if let Some(store) = &self.store {
            if let Err(e) = store.append(&session.session_id, &session.channel, &user_msg) {
                warn!(session_id = %session.session_id, error = %e, "failed to persist user message");
            }
        }
        session.push_message(user_msg);

        let registry = self.registry.read().await;
        let outcome = reasoning::run_turn(
            &adapter,
            &registry,
            &self.approval_manager,
            &mut session,
            &self.system_prompt,
            &self.model_options,
            self.approval_timeout,
            self.notifier.as_deref(),
            self.store.as_ref(),
        )
        .await?;

        info!(iterations = outcome.iterations, "turn complete");
        Ok(outcome)
    }

    /// Deliver a human decision for a pending approval raised mid-turn.
    pub async fn resolve_approval(
        &self,
        approval_id: uuid::Uuid,
        decision: crate::approval::ApprovalDecision,
        resolved_by: impl Into<String>,
    ) -> bool {
        self.approval_manager.resolve(approval_id, decision, resolved_by).await
    }

    pub fn list_sessions(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub async fn get_session(&self, session_id: &str) -> Option<SessionContext> {
        let slot = self.sessions.get(session_id)?.clone();
        Some(slot.lock().await.clone())
    }

    pub fn clear_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_llm_config() -> LlmConfig {
        LlmConfig {
            provider: "local".to_string(),
            model: "test-model".to_string(),
            ..LlmConfig::default()
        }
    }

    fn test_runtime() -> Runtime {
        Runtime::new(test_llm_config(), Registry::new(), "you are a test assistant")
    }

    #[test]
    fn new_runtime_has_no_sessions() {
        let runtime = test_runtime();
        assert!(runtime.list_sessions().is_empty());
    }

    #[tokio::test]
    async fn session_slot_is_created_on_demand() {
        let runtime = test_runtime();
        let slot = runtime.session_slot("s1", "cli", "u1");
        assert_eq!(slot.lock().await.session_id, "s1");
        assert_eq!(runtime.list_sessions(), vec!["s1".to_string()]);
    }

    #[tokio::test]
    async fn session_slot_is_stable_across_calls() {
        let runtime = test_runtime();
        let a = runtime.session_slot("s1", "cli", "u1");
        let b = runtime.session_slot("s1", "cli", "u1");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn clear_session_removes_it() {
        let runtime = test_runtime();
        let _ = runtime.session_slot("s1", "cli", "u1");
        runtime.clear_session("s1");
        assert!(runtime.list_sessions().is_empty());
    }

    #[tokio::test]
    async fn get_session_returns_none_when_absent() {
        let runtime = test_runtime();
        assert!(runtime.get_session("missing").await.is_none());
    }

    #[tokio::test]
    async fn register_tool_is_visible_to_later_turns() {
        let runtime = test_runtime();
        assert!(runtime.registry.read().await.schemas_for(crate::session::SessionType::Main).is_empty());

        runtime.register_tool(Box::new(crate::tools::EchoTool::default())).await;

        let schemas = runtime.registry.read().await.schemas_for(crate::session::SessionType::Main);
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "echo");
    }

    #[test]
    fn adapter_for_default_uses_configured_model() {
        let runtime = test_runtime();
        let adapter = runtime.adapter_for(None).unwrap();
        assert_eq!(adapter.model_id(), "test-model");
    }

    #[test]
    fn adapter_for_override_builds_a_distinct_cached_adapter() {
        let runtime = test_runtime();
        let default_adapter = runtime.adapter_for(None).unwrap();
        let override_adapter = runtime.adapter_for(Some("other-model")).unwrap();
        assert_eq!(override_adapter.model_id(), "other-model");
        assert_ne!(default_adapter.model_id(), override_adapter.model_id());

        let override_again = runtime.adapter_for(Some("other-model")).unwrap();
        assert!(Arc::ptr_eq(&override_adapter, &override_again));
    }

    #[tokio::test]
    async fn session_slot_rehydrates_tail_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(dir.path());
        store.append("s1", "cli", &crate::model::Message::user("earlier")).unwrap();
        store.append("s1", "cli", &crate::model::Message::assistant("reply")).unwrap();

        let runtime = test_runtime().with_store(store);
        let slot = runtime.session_slot("s1", "cli", "u1");
        let ctx = slot.lock().await;
        assert_eq!(ctx.messages.len(), 2);
        assert_eq!(ctx.messages[0].content, "earlier");
        assert_eq!(ctx.messages[1].content, "reply");
    }

    #[tokio::test]
    async fn session_slot_rehydration_respects_max_messages() {
        let dir = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(dir.path());
        for i in 0..5 {
            store
                .append("s1", "cli", &crate::model::Message::user(format!("msg{i}")))
                .unwrap();
        }

        let runtime = test_runtime().with_store(store).with_max_messages(2);
        let slot = runtime.session_slot("s1", "cli", "u1");
        let ctx = slot.lock().await;
        assert_eq!(ctx.messages.len(), 2);
        assert_eq!(ctx.messages[0].content, "msg3");
        assert_eq!(ctx.messages[1].content, "msg4");
    }
}
