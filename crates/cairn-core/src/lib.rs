pub mod error;
pub mod settings;
pub mod types;

pub use error::{Error, Result, SandboxFailure};
pub use settings::CairnSettings;
pub use types::{
    new_agent_id, AgentId, AgentState, LifecycleRecord, Submission, SubmissionRecord,
    TaskPriority,
};
