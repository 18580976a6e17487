pub mod lifecycle_store;
pub mod object_store;
pub mod overlay;
pub mod queue;
pub mod search;
pub mod submission;

pub use lifecycle_store::LifecycleStore;
pub use object_store::{LocalObjectStore, ObjectStore};
pub use overlay::{DirEntry, FileOverlay, OverlayEntry, Stat};
pub use queue::{PriorityQueue, QueuedTask};
