//! The script sandbox contract (spec §1, §4.6). Out of scope as an
//! implementation concern — the core only depends on [`Sandbox`]. A
//! concrete reference implementation lives in [`crate::script_sandbox`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cairn_core::SandboxFailure;

use crate::external_functions::ExternalFunctions;

#[derive(Debug, Clone)]
pub struct SandboxLimits {
    pub max_duration: Duration,
    pub max_memory_bytes: u64,
    pub max_recursion_depth: u32,
}

/// The sandbox's contract is to always return — it never propagates a
/// Rust error, only one of these outcomes.
#[derive(Debug, Clone)]
pub enum SandboxOutcome {
    Ok { value: serde_json::Value, duration: Duration },
    Failed(SandboxFailure),
}

impl SandboxOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn execute(
        &self,
        code: &str,
        external_functions: Arc<ExternalFunctions>,
        limits: SandboxLimits,
    ) -> SandboxOutcome;
}
