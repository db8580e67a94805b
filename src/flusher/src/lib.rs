//! Container flush engine
//!
//! Empties and then deletes every container under one or more
//! `bucket[/path]` scopes of an account:
//! - Scope parsing and container hierarchy encoding
//! - Paged container enumeration
//! - Object-flush and container-delete worker pools over a drainable queue
//! - Fixed-delay retry of election failures
//! - Progress reporting and run summary

pub mod backend;
pub mod counters;
pub mod orchestrator;
pub mod queue;
pub mod reporter;
pub mod retry;
pub mod scope;
pub mod summary;
pub mod worker;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use backend::{BackendError, BackendResult, ProxyBackend, StorageBackend};
pub use counters::{Counters, Tally};
pub use orchestrator::{FlushConfig, Flusher};
pub use queue::WorkQueue;
pub use scope::Scope;
pub use summary::RunSummary;
pub use worker::{WorkerMode, WorkerStats};
