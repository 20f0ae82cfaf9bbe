pub mod api;
pub mod config;
pub mod error;
pub mod keys;
pub mod outline;
pub mod session;
pub mod sync;

#[cfg(test)]
mod test_helpers;

// Convenience re-exports
pub use api::client::HttpStore;
pub use api::memory::MemoryStore;
pub use api::store::GraphStore;
pub use api::types;
pub use error::{OutlineError, Result, SyncIssue};
pub use outline::{Action, Block, BlockView, Gesture, Outline};
pub use session::{PageSession, SessionOptions, SyncStatus};
