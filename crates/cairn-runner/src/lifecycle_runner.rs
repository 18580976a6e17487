//! Runs one agent from `queued` to a terminal or `reviewing` state
//! (spec §4.6). Each arrow in the sequence persists the lifecycle record
//! before the next step runs; any failure anywhere in the chain captures
//! the error message and transitions the agent straight to `errored`.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use cairn_core::{AgentId, AgentState, Error, LifecycleRecord, Result, TaskPriority};
use cairn_store::submission::parse_submission;
use cairn_store::{FileOverlay, LifecycleStore};

use crate::codegen::CodeGenerator;
use crate::external_functions::ExternalFunctions;
use crate::llm_client::LlmClient;
use crate::sandbox::{Sandbox, SandboxLimits, SandboxOutcome};

/// Everything one lifecycle run needs, bundled so the Worker Pool only
/// has to pass a single handle per agent. Mirrors the lifecycle record's
/// own `task`/`priority`/`transition` so a context reopened on recovery
/// (no lifecycle record mutation in hand yet) still carries them.
pub struct AgentContext {
    pub agent_id: AgentId,
    pub task: String,
    pub priority: TaskPriority,
    pub overlay: Arc<FileOverlay>,
    pub functions: Arc<ExternalFunctions>,
    state: Mutex<(AgentState, DateTime<Utc>)>,
}

impl AgentContext {
    pub fn new(
        agent_id: AgentId,
        task: String,
        priority: TaskPriority,
        overlay: Arc<FileOverlay>,
        llm: Option<Arc<dyn LlmClient>>,
    ) -> Self {
        let functions = Arc::new(ExternalFunctions::new(agent_id.clone(), overlay.clone(), llm));
        Self {
            agent_id,
            task,
            priority,
            overlay,
            functions,
            state: Mutex::new((AgentState::Queued, Utc::now())),
        }
    }

    /// Move to a new state, bumping `state_changed_at`. Called alongside
    /// `LifecycleRecord::transition` so the in-memory context and the
    /// persisted record never disagree about the agent's current state.
    pub fn transition(&self, new_state: AgentState) {
        let mut guard = self.state.lock().expect("agent context state lock poisoned");
        *guard = (new_state, Utc::now());
    }

    pub fn state(&self) -> AgentState {
        self.state.lock().expect("agent context state lock poisoned").0
    }

    pub fn state_changed_at(&self) -> DateTime<Utc> {
        self.state.lock().expect("agent context state lock poisoned").1
    }
}

pub struct LifecycleRunner {
    lifecycle_store: Arc<LifecycleStore>,
    code_generator: Arc<CodeGenerator>,
    sandbox: Arc<dyn Sandbox>,
    limits: SandboxLimits,
}

impl LifecycleRunner {
    pub fn new(
        lifecycle_store: Arc<LifecycleStore>,
        code_generator: Arc<CodeGenerator>,
        sandbox: Arc<dyn Sandbox>,
        limits: SandboxLimits,
    ) -> Self {
        Self {
            lifecycle_store,
            code_generator,
            sandbox,
            limits,
        }
    }

    /// Drive `record` from `queued` to `reviewing` or `errored`, persisting
    /// at every transition. Returns the final record.
    pub async fn run(&self, mut record: LifecycleRecord, context: Arc<AgentContext>) -> Result<LifecycleRecord> {
        if let Err(e) = self.advance(&mut record, &context).await {
            record.fail(e.to_string());
            self.lifecycle_store.save(record.clone()).await?;
            return Ok(record);
        }
        Ok(record)
    }

    async fn advance(&self, record: &mut LifecycleRecord, context: &AgentContext) -> Result<()> {
        record.transition(AgentState::Spawning);
        context.transition(AgentState::Spawning);
        self.lifecycle_store.save(record.clone()).await?;

        record.transition(AgentState::Generating);
        context.transition(AgentState::Generating);
        self.lifecycle_store.save(record.clone()).await?;
        let code = self.code_generator.generate(&record.task).await?;

        record.transition(AgentState::Executing);
        context.transition(AgentState::Executing);
        self.lifecycle_store.save(record.clone()).await?;
        let outcome = self
            .sandbox
            .execute(&code, context.functions.clone(), self.limits.clone())
            .await;
        match outcome {
            SandboxOutcome::Ok { .. } => {}
            SandboxOutcome::Failed(failure) => return Err(Error::SandboxError(failure)),
        }

        record.transition(AgentState::Submitting);
        context.transition(AgentState::Submitting);
        self.lifecycle_store.save(record.clone()).await?;
        record.submission = context
            .overlay
            .kv_get(cairn_store::submission::SUBMISSION_KEY)
            .and_then(|raw| parse_submission(&raw));

        record.transition(AgentState::Reviewing);
        context.transition(AgentState::Reviewing);
        self.lifecycle_store.save(record.clone()).await?;
        Ok(())
    }
}

pub fn default_limits_from(settings: &cairn_core::settings::ExecutorSettings) -> SandboxLimits {
    SandboxLimits {
        max_duration: settings.max_execution_time,
        max_memory_bytes: settings.max_memory_bytes,
        max_recursion_depth: settings.max_recursion_depth,
    }
}

pub const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(500);
