pub mod backend;
pub mod orchestrator;
pub mod store;

pub use backend::{ClientError, HttpSearchBackend, SearchBackend};
pub use orchestrator::{Orchestrator, OrchestratorHandle, OrchestratorOptions, Trigger};
pub use store::{reduce, Action, LastError, SearchQuery, SearchState};
