use thiserror::Error;

/// Failure classification for a single sandbox execution.
///
/// Matches the outcome contract external implementers of the sandbox
/// must honor: anything other than a successful run collapses into one
/// of these kinds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SandboxFailure {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("execution timed out")]
    Timeout,
    #[error("memory limit exceeded")]
    MemoryExceeded,
    #[error("recursion depth exceeded")]
    RecursionExceeded,
    #[error("unknown sandbox failure: {0}")]
    Unknown(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("too large: {0}")]
    TooLarge(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("code generation failed: {0}")]
    GenerationError(String),

    #[error("sandbox error: {0}")]
    SandboxError(#[from] SandboxFailure),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("llm unavailable: {0}")]
    LlmUnavailable(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
