use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cairn_core::{AgentId, CairnSettings, TaskPriority};
use cairn_orchestrator::Orchestrator;
use cairn_store::object_store::LocalObjectStore;
use cairn_store::LifecycleStore;

#[derive(Parser)]
#[command(name = "cairn", about = "Cairn agent orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator as a long-lived service
    Up,

    /// Queue a task with HIGH default priority
    Spawn {
        task: String,
        #[arg(long)]
        priority: Option<String>,
    },

    /// Queue a task with NORMAL default priority
    Queue {
        task: String,
        #[arg(long)]
        priority: Option<String>,
    },

    /// Accept a reviewing agent's changes into stable
    Accept { agent_id: String },

    /// Reject a reviewing agent's changes
    Reject { agent_id: String },

    /// Report one agent's lifecycle state
    Status { agent_id: String },

    /// List every known agent
    ListAgents,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cairn=info")))
        .init();

    let cli = Cli::parse();
    let settings = CairnSettings::from_env()?;

    let exit_code = match cli.command {
        Commands::Up => run_up(settings).await?,
        Commands::Spawn { task, priority } => submit_signal(&settings, "spawn", &task, priority)?,
        Commands::Queue { task, priority } => submit_signal(&settings, "queue", &task, priority)?,
        Commands::Accept { agent_id } => submit_agent_signal(&settings, "accept", &agent_id)?,
        Commands::Reject { agent_id } => submit_agent_signal(&settings, "reject", &agent_id)?,
        Commands::Status { agent_id } => print_status(&settings, &agent_id).await?,
        Commands::ListAgents => print_list_agents(&settings).await?,
    };

    std::process::exit(exit_code);
}

async fn run_up(settings: CairnSettings) -> Result<i32> {
    let _orchestrator = Orchestrator::initialize(settings, None).await?;
    tracing::info!("cairn orchestrator is up");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(0)
}

fn signals_dir(settings: &CairnSettings) -> PathBuf {
    settings.paths.cairn_home.join("signals")
}

/// `spawn`/`queue`: write a one-shot JSON payload into the signals
/// directory for a running `up` process to pick up. The CLI does not
/// run the orchestrator itself for these subcommands.
fn submit_signal(settings: &CairnSettings, tag: &str, task: &str, priority: Option<String>) -> Result<i32> {
    let dir = signals_dir(settings);
    std::fs::create_dir_all(&dir)?;

    let mut payload = serde_json::json!({"type": tag, "task": task});
    if let Some(p) = priority {
        let parsed: TaskPriority = p.parse().map_err(|e: cairn_core::Error| anyhow!(e.to_string()))?;
        payload["priority"] = serde_json::Value::String(parsed.to_string().to_ascii_uppercase());
    }

    let filename = format!("{tag}-{}.json", uuid::Uuid::new_v4());
    std::fs::write(dir.join(filename), serde_json::to_vec(&payload)?)?;
    println!("submitted {tag} command");
    Ok(0)
}

fn submit_agent_signal(settings: &CairnSettings, tag: &str, agent_id: &str) -> Result<i32> {
    let dir = signals_dir(settings);
    std::fs::create_dir_all(&dir)?;

    let payload = serde_json::json!({"type": tag, "agent_id": agent_id});
    let filename = format!("{tag}-{agent_id}.json");
    std::fs::write(dir.join(filename), serde_json::to_vec(&payload)?)?;
    println!("submitted {tag} for {agent_id}");
    Ok(0)
}

/// `status`/`list-agents` read the Lifecycle Store directly rather than
/// the orchestrator's summary snapshot, which is for display only.
async fn open_lifecycle_store(settings: &CairnSettings) -> Result<LifecycleStore> {
    let object_store = Arc::new(LocalObjectStore::new(settings.paths.cairn_home.join("store")));
    let store = LifecycleStore::new(object_store);
    store.restore_from_store().await?;
    Ok(store)
}

async fn print_status(settings: &CairnSettings, agent_id: &AgentId) -> Result<i32> {
    let store = open_lifecycle_store(settings).await?;
    match store.load(agent_id) {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(0)
        }
        None => {
            eprintln!("unknown agent: {agent_id}");
            Ok(1)
        }
    }
}

async fn print_list_agents(settings: &CairnSettings) -> Result<i32> {
    let store = open_lifecycle_store(settings).await?;
    let agents = store.list_all();
    println!("{}", serde_json::to_string_pretty(&agents)?);
    Ok(0)
}
