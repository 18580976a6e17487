pub mod codegen;
pub mod external_functions;
pub mod lifecycle_runner;
pub mod llm_client;
pub mod paths;
pub mod sandbox;
pub mod script_sandbox;
pub mod worker_pool;

pub use codegen::CodeGenerator;
pub use external_functions::ExternalFunctions;
pub use lifecycle_runner::{AgentContext, LifecycleRunner};
pub use llm_client::{AnthropicClient, LlmClient};
pub use sandbox::{Sandbox, SandboxLimits, SandboxOutcome};
pub use script_sandbox::ScriptSandbox;
pub use worker_pool::{ContextResolver, WorkerPool};
