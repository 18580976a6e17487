use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

// ── ID types ──

/// Short opaque identifier, unique for the lifetime of the installation.
pub type AgentId = String;

/// Mint a fresh agent id: `agent-` followed by 8 hex characters.
pub fn new_agent_id() -> AgentId {
    let hex = Uuid::new_v4().simple().to_string();
    format!("agent-{}", &hex[..8])
}

// ── Task priority ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskPriority {
    Low = 1,
    Normal = 2,
    High = 3,
    Urgent = 4,
}

impl TaskPriority {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TaskPriority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(Error::InvalidCommand(format!(
                "unknown priority: {other}"
            ))),
        }
    }
}

// ── Agent state ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Queued,
    Spawning,
    Generating,
    Executing,
    Submitting,
    Reviewing,
    Accepted,
    Rejected,
    Errored,
}

impl AgentState {
    /// Terminal states: the lifecycle cannot progress further.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected | Self::Errored)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Spawning => "spawning",
            Self::Generating => "generating",
            Self::Executing => "executing",
            Self::Submitting => "submitting",
            Self::Reviewing => "reviewing",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Errored => "errored",
        }
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Submission payload ──

/// The script's self-reported summary of its work, surfaced to the
/// human reviewer. Stored in the agent overlay's KV namespace under the
/// fixed key `"submission"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub summary: String,
    pub changed_files: Vec<String>,
}

/// The canonical, tagged on-disk form of a stored submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub agent_id: AgentId,
    pub submission: Submission,
}

// ── Lifecycle record ──

/// Persisted, authoritative state of one agent. Updated on every
/// transition; `state_changed_at` must never precede `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleRecord {
    pub agent_id: AgentId,
    pub task: String,
    pub priority: TaskPriority,
    pub state: AgentState,
    pub created_at: DateTime<Utc>,
    pub state_changed_at: DateTime<Utc>,
    /// Opaque handle into the overlay store (a relative directory name).
    pub overlay_location: String,
    pub submission: Option<Submission>,
    pub error: Option<String>,
}

impl LifecycleRecord {
    pub fn new(agent_id: AgentId, task: String, priority: TaskPriority, overlay_location: String) -> Self {
        let now = Utc::now();
        Self {
            agent_id,
            task,
            priority,
            state: AgentState::Queued,
            created_at: now,
            state_changed_at: now,
            overlay_location,
            submission: None,
            error: None,
        }
    }

    /// Move to a new state, bumping `state_changed_at`. Does not persist;
    /// callers are responsible for writing the record through the
    /// lifecycle store immediately after.
    pub fn transition(&mut self, new_state: AgentState) {
        self.state = new_state;
        self.state_changed_at = Utc::now();
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.transition(AgentState::Errored);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_is_ascending_by_urgency() {
        assert!(TaskPriority::Urgent > TaskPriority::High);
        assert!(TaskPriority::High > TaskPriority::Normal);
        assert!(TaskPriority::Normal > TaskPriority::Low);
    }

    #[test]
    fn priority_round_trips_through_str() {
        for p in [
            TaskPriority::Low,
            TaskPriority::Normal,
            TaskPriority::High,
            TaskPriority::Urgent,
        ] {
            let s = p.to_string();
            assert_eq!(TaskPriority::from_str(&s).unwrap(), p);
        }
    }

    #[test]
    fn unknown_priority_is_invalid_command() {
        assert!(TaskPriority::from_str("extreme").is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(AgentState::Accepted.is_terminal());
        assert!(AgentState::Rejected.is_terminal());
        assert!(AgentState::Errored.is_terminal());
        assert!(!AgentState::Reviewing.is_terminal());
        assert!(!AgentState::Queued.is_terminal());
    }

    #[test]
    fn new_agent_id_has_expected_shape() {
        let id = new_agent_id();
        assert!(id.starts_with("agent-"));
        assert_eq!(id.len(), "agent-".len() + 8);
    }

    #[test]
    fn transition_never_moves_state_changed_at_before_created_at() {
        let mut record = LifecycleRecord::new(
            new_agent_id(),
            "do a thing".into(),
            TaskPriority::Normal,
            "overlay-1".into(),
        );
        record.transition(AgentState::Spawning);
        assert!(record.state_changed_at >= record.created_at);
    }
}
