pub mod command;
pub mod merge;
pub mod orchestrator;
pub mod recovery;
pub mod signal_adapter;

pub use command::{parse_command, Command};
pub use orchestrator::{CommandOutcome, Orchestrator};
pub use recovery::{recover, OverlayBackingProbe, RecoveryReport};
pub use signal_adapter::SignalAdapter;
