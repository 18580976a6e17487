//! The public entry point (spec §4.8). Composes the queue, the overlay
//! store, the lifecycle store, the worker pool, the signal adapter, and
//! recovery into a single handle callers submit [`Command`]s to.

use std::sync::Arc;

use dashmap::DashMap;

use cairn_core::{
    new_agent_id, AgentId, AgentState, CairnSettings, Error, LifecycleRecord, Result,
};
use cairn_runner::lifecycle_runner::{default_limits_from, AgentContext, LifecycleRunner};
use cairn_runner::worker_pool::{ContextResolver, WorkerPool};
use cairn_runner::{CodeGenerator, LlmClient, ScriptSandbox};
use cairn_store::object_store::{LocalObjectStore, ObjectStore};
use cairn_store::{FileOverlay, LifecycleStore, PriorityQueue};

use crate::command::Command;
use crate::merge::merge_into_stable;
use crate::recovery::{recover, OverlayBackingProbe};
use crate::signal_adapter::SignalAdapter;

const STABLE_OVERLAY_ID: &str = "stable";
const MARKER_KEY: &str = "__marker__";

pub struct Orchestrator {
    settings: CairnSettings,
    object_store: Arc<dyn ObjectStore>,
    lifecycle_store: Arc<LifecycleStore>,
    queue: Arc<PriorityQueue>,
    stable_overlay: Arc<FileOverlay>,
    contexts: DashMap<AgentId, Arc<AgentContext>>,
    runner: Arc<LifecycleRunner>,
}

impl Orchestrator {
    /// `initialize` (spec §4.8): create scratch directories, open the
    /// stable overlay and the lifecycle-store backing, run Recovery,
    /// and start the Worker Pool and (if enabled) the Signal Adapter.
    pub async fn initialize(settings: CairnSettings, llm: Option<Arc<dyn LlmClient>>) -> Result<Arc<Self>> {
        std::fs::create_dir_all(&settings.paths.cairn_home).map_err(Error::Io)?;
        let object_store: Arc<dyn ObjectStore> =
            Arc::new(LocalObjectStore::new(settings.paths.cairn_home.join("store")));

        let stable_overlay = Arc::new(FileOverlay::new(STABLE_OVERLAY_ID, object_store.clone(), None));
        stable_overlay.restore_from_store().await?;

        let lifecycle_store = Arc::new(LifecycleStore::new(object_store.clone()));
        lifecycle_store.restore_from_store().await?;

        let queue = Arc::new(PriorityQueue::new());
        let code_generator = Arc::new(CodeGenerator::new(
            llm.unwrap_or_else(|| Arc::new(UnconfiguredLlmClient) as Arc<dyn LlmClient>),
        ));
        let sandbox = Arc::new(ScriptSandbox::new());
        let limits = default_limits_from(&settings.executor);
        let runner = Arc::new(LifecycleRunner::new(lifecycle_store.clone(), code_generator, sandbox, limits));

        let orchestrator = Arc::new(Self {
            settings,
            object_store,
            lifecycle_store,
            queue,
            stable_overlay,
            contexts: DashMap::new(),
            runner,
        });

        let probe = ObjectStoreBackingProbe { store: orchestrator.object_store.clone() };
        let report = recover(&orchestrator.lifecycle_store, &orchestrator.queue, &probe).await?;
        tracing::info!(
            re_enqueued = report.re_enqueued.len(),
            marked_errored = report.marked_errored.len(),
            left_in_place = report.left_in_place.len(),
            "recovery complete"
        );
        orchestrator.persist_snapshot().await;

        let pool = Arc::new(WorkerPool::new(
            orchestrator.queue.clone(),
            orchestrator.lifecycle_store.clone(),
            orchestrator.runner.clone(),
            orchestrator.clone() as Arc<dyn ContextResolver>,
            orchestrator.settings.orchestrator.max_concurrent_agents,
        ));
        let _pool_handle = pool.spawn();

        if orchestrator.settings.orchestrator.enable_signal_polling {
            let adapter = Arc::new(SignalAdapter::new(orchestrator.settings.paths.cairn_home.join("signals"), true));
            let _signal_handle = adapter.spawn(orchestrator.clone());
        }

        Ok(orchestrator)
    }

    pub async fn submit_command(&self, command: Command) -> Result<CommandOutcome> {
        match command {
            Command::Queue { task, priority } => {
                let agent_id = self.queue_agent(task, priority).await?;
                Ok(CommandOutcome::AgentId(agent_id))
            }
            Command::Accept { agent_id } => {
                self.accept(&agent_id).await?;
                Ok(CommandOutcome::Unit)
            }
            Command::Reject { agent_id } => {
                self.reject(&agent_id).await?;
                Ok(CommandOutcome::Unit)
            }
            Command::Status { agent_id } => Ok(CommandOutcome::Record(self.status(&agent_id)?)),
            Command::ListAgents => Ok(CommandOutcome::Records(self.list_agents())),
        }
    }

    async fn queue_agent(&self, task: String, priority: cairn_core::TaskPriority) -> Result<AgentId> {
        let agent_id = new_agent_id();
        let overlay = Arc::new(FileOverlay::new(agent_id.clone(), self.object_store.clone(), Some(self.stable_overlay.clone())));
        // Marker so Recovery can tell this overlay's backing exists even
        // before the agent's script has written anything.
        overlay.kv_set(MARKER_KEY, "1".to_string()).await?;

        let context = Arc::new(AgentContext::new(agent_id.clone(), task.clone(), priority, overlay, None));
        self.contexts.insert(agent_id.clone(), context);

        let record = LifecycleRecord::new(agent_id.clone(), task, priority, agent_id.clone());
        self.lifecycle_store.save(record).await?;
        self.queue.enqueue(agent_id.clone(), priority).await;
        self.persist_snapshot().await;
        Ok(agent_id)
    }

    async fn accept(&self, agent_id: &str) -> Result<()> {
        let mut record = self.require_reviewing(agent_id)?;
        record.transition(AgentState::Accepted);
        self.lifecycle_store.save(record.clone()).await?;

        if let Some(submission) = &record.submission {
            // Rehydrate the context if this agent predates the current
            // process (e.g. it was already `reviewing` at recovery time
            // and never re-dispatched), the same path the Worker Pool
            // uses before running a lifecycle.
            let owned_id: AgentId = agent_id.to_string();
            let context = ContextResolver::resolve(self, &owned_id).await?;
            let report = merge_into_stable(&context.overlay, &self.stable_overlay, submission).await;
            tracing::info!(agent_id, merged = report.merged.len(), failed = report.failed.len(), "merge complete");
        }

        self.trash_agent(agent_id).await
    }

    async fn reject(&self, agent_id: &str) -> Result<()> {
        let mut record = self.require_reviewing(agent_id)?;
        record.transition(AgentState::Rejected);
        self.lifecycle_store.save(record).await?;
        self.trash_agent(agent_id).await
    }

    fn require_reviewing(&self, agent_id: &str) -> Result<LifecycleRecord> {
        let record = self
            .lifecycle_store
            .load(agent_id)
            .ok_or_else(|| Error::NotFound(format!("unknown agent: {agent_id}")))?;
        if record.state != AgentState::Reviewing {
            return Err(Error::InvalidState(format!(
                "agent {agent_id} is {}, not reviewing",
                record.state
            )));
        }
        Ok(record)
    }

    /// Idempotent cleanup: drop the in-memory context and rename the
    /// overlay's backing location into the trash namespace so Recovery
    /// skips it and `cleanup_old` can later find it via
    /// `overlay_location`. Calling this twice on the same agent has the
    /// same effect as calling it once.
    pub async fn trash_agent(&self, agent_id: &str) -> Result<()> {
        self.contexts.remove(agent_id);

        if let Some(mut record) = self.lifecycle_store.load(agent_id) {
            if !record.overlay_location.starts_with("trash/") {
                record.overlay_location = format!("trash/{}", record.overlay_location);
                self.lifecycle_store.save(record).await?;
            }
        }
        self.persist_snapshot().await;
        Ok(())
    }

    pub fn status(&self, agent_id: &str) -> Result<LifecycleRecord> {
        self.lifecycle_store
            .load(agent_id)
            .ok_or_else(|| Error::NotFound(format!("unknown agent: {agent_id}")))
    }

    pub fn list_agents(&self) -> Vec<LifecycleRecord> {
        self.lifecycle_store.list_all()
    }

    async fn persist_snapshot(&self) {
        let snapshot = serde_json::json!({
            "queue_depth": self.queue.size().await,
            "active_agents": self.lifecycle_store.list_active().len(),
            "updated_at": chrono::Utc::now(),
        });
        let path = self.settings.paths.cairn_home.join("state").join("orchestrator.json");
        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return;
            }
        }
        if let Ok(bytes) = serde_json::to_vec_pretty(&snapshot) {
            let _ = std::fs::write(path, bytes);
        }
    }
}

#[async_trait::async_trait]
impl ContextResolver for Orchestrator {
    async fn resolve(&self, agent_id: &AgentId) -> Result<Arc<AgentContext>> {
        if let Some(context) = self.contexts.get(agent_id) {
            return Ok(context.clone());
        }
        // Agent predates this process (recovered from a restart): reopen
        // its overlay from the backing store.
        let record = self
            .lifecycle_store
            .load(agent_id)
            .ok_or_else(|| Error::NotFound(format!("unknown agent: {agent_id}")))?;
        let overlay = Arc::new(FileOverlay::new(agent_id.clone(), self.object_store.clone(), Some(self.stable_overlay.clone())));
        overlay.restore_from_store().await?;
        let context = Arc::new(AgentContext::new(agent_id.clone(), record.task, record.priority, overlay, None));
        self.contexts.insert(agent_id.clone(), context.clone());
        Ok(context)
    }
}

struct ObjectStoreBackingProbe {
    store: Arc<dyn ObjectStore>,
}

#[async_trait::async_trait]
impl OverlayBackingProbe for ObjectStoreBackingProbe {
    async fn exists(&self, overlay_location: &str) -> bool {
        let marker = format!("overlay/{overlay_location}/kv/{MARKER_KEY}");
        self.store.exists(&marker).await.unwrap_or(false)
    }
}

struct UnconfiguredLlmClient;

#[async_trait::async_trait]
impl LlmClient for UnconfiguredLlmClient {
    async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
        Err(anyhow::anyhow!("no LLM client configured"))
    }
}

#[derive(Debug, Clone)]
pub enum CommandOutcome {
    AgentId(AgentId),
    Record(LifecycleRecord),
    Records(Vec<LifecycleRecord>),
    Unit,
}
