//! Normalized tagged command type shared by every input adapter (spec
//! §4.4): the CLI, the signal poller, and any in-process caller all
//! construct the same `Command` through the same parser.

use cairn_core::{AgentId, Error, Result, TaskPriority};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Queue { task: String, priority: TaskPriority },
    Accept { agent_id: AgentId },
    Reject { agent_id: AgentId },
    Status { agent_id: AgentId },
    ListAgents,
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().to_ascii_lowercase().replace('-', "_")
}

/// Parse a `(type_tag, payload)` pair into a normalized [`Command`].
/// Pure and shared by every adapter — the signal poller, the CLI, and
/// any in-process caller all funnel through this one function.
pub fn parse_command(type_tag: &str, payload: &serde_json::Value) -> Result<Command> {
    let tag = normalize_tag(type_tag);
    // "spawn" is an alias for "queue" but changes the priority default.
    let default_priority = if tag == "spawn" { TaskPriority::High } else { TaskPriority::Normal };

    match tag.as_str() {
        "queue" | "spawn" => {
            let task = payload
                .get("task")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if task.is_empty() {
                return Err(Error::InvalidCommand("queue: task must not be empty".into()));
            }
            let priority = match payload.get("priority").and_then(|v| v.as_str()) {
                Some(p) => p.parse::<TaskPriority>()?,
                None => default_priority,
            };
            Ok(Command::Queue { task, priority })
        }
        "accept" => Ok(Command::Accept { agent_id: require_agent_id(payload, "accept")? }),
        "reject" => Ok(Command::Reject { agent_id: require_agent_id(payload, "reject")? }),
        "status" => Ok(Command::Status { agent_id: require_agent_id(payload, "status")? }),
        "list_agents" => Ok(Command::ListAgents),
        other => Err(Error::InvalidCommand(format!("unknown command: {other}"))),
    }
}

fn require_agent_id(payload: &serde_json::Value, command: &str) -> Result<AgentId> {
    match payload.get("agent_id").and_then(|v| v.as_str()) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(Error::InvalidCommand(format!("{command}: agent_id is required"))),
    }
}
