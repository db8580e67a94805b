//! Storage backend interfaces
//!
//! The engine only depends on two narrow services: listing (containers of
//! an account, objects of a container) and deletion (bulk object delete,
//! container delete). Both are traits so the orchestrator can run against
//! the HTTP proxy in production and an in-memory double in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod proxy;

pub use proxy::ProxyBackend;

/// One object returned by a container listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

/// One page of a container's objects
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectListing {
    #[serde(default)]
    pub objects: Vec<ObjectEntry>,
}

impl ObjectListing {
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.objects.iter().map(|o| o.name.clone()).collect()
    }

    pub fn total_bytes(&self) -> u64 {
        self.objects.iter().map(|o| o.size).sum()
    }
}

/// One row of an account's container listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEntry {
    pub name: String,
    pub file_count: u64,
    pub byte_count: u64,
    pub is_partial: bool,
}

impl ContainerEntry {
    pub fn new(name: impl Into<String>, file_count: u64, byte_count: u64) -> Self {
        Self {
            name: name.into(),
            file_count,
            byte_count,
            is_partial: false,
        }
    }
}

/// Per-object outcome of a bulk deletion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// Names the backend confirmed as removed
    pub deleted: Vec<String>,
    /// Names left in place, with the reason given for each
    pub failed: Vec<(String, BackendError)>,
}

impl DeleteReport {
    /// Report for a request where every name was removed
    pub fn all_deleted(names: &[String]) -> Self {
        Self {
            deleted: names.to_vec(),
            failed: Vec::new(),
        }
    }

    /// Error describing a round that removed nothing. Election failures come
    /// first so the caller retries them.
    pub fn into_error(self, container: &str, remaining: usize) -> BackendError {
        let mut fallback = None;
        for (_, err) in self.failed {
            if err.is_transient() {
                return err;
            }
            fallback.get_or_insert(err);
        }
        fallback.unwrap_or_else(|| BackendError::NoProgress {
            container: container.to_string(),
            remaining,
        })
    }
}

/// Errors returned by backend calls
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The replicated metadata group owning the container has no leader.
    /// Transient: the caller is expected to wait and retry.
    #[error("election failed: {0}")]
    ElectionFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backend returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    Decode(String),

    /// Objects keep showing up in listings although deletions were accepted
    #[error("{remaining} object(s) could not be removed from {container}")]
    NoProgress { container: String, remaining: usize },
}

impl BackendError {
    /// Whether this error reflects temporary unavailability of the
    /// metadata group rather than a failure of the request itself.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::ElectionFailed(_))
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Read side of the backend
#[async_trait]
pub trait ListingService: Send + Sync {
    /// Verify the backend answers for this account. Called once at startup.
    async fn check(&self, _account: &str) -> BackendResult<()> {
        Ok(())
    }

    /// List (a page of) the objects of a container
    async fn list_objects(&self, account: &str, container: &str) -> BackendResult<ObjectListing>;

    /// List containers whose name starts with `prefix`, strictly after
    /// `marker`. An empty page ends the listing.
    async fn list_containers(
        &self,
        account: &str,
        prefix: &str,
        marker: Option<&str>,
    ) -> BackendResult<Vec<ContainerEntry>>;
}

/// Write side of the backend
#[async_trait]
pub trait DeletionService: Send + Sync {
    /// Delete `names` from a container, reporting the outcome per object
    async fn delete_objects(
        &self,
        account: &str,
        container: &str,
        names: &[String],
    ) -> BackendResult<DeleteReport>;

    async fn delete_container(&self, account: &str, container: &str) -> BackendResult<()>;
}

/// Everything the engine needs from a backend
pub trait StorageBackend: ListingService + DeletionService {}

impl<T> StorageBackend for T where T: ListingService + DeletionService {}
