//! Deletion workers
//!
//! A worker drains container names from the shared [`WorkQueue`] until a
//! dequeue times out. Depending on its mode it either empties each container
//! of its objects or deletes the (already empty) container itself.
//! Election failures are retried in place; any other failure abandons the
//! container for this pass and the worker moves on. So does a flush round
//! that removes nothing.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{BackendError, BackendResult, StorageBackend};
use crate::counters::Counters;
use crate::queue::WorkQueue;
use crate::retry::ElectionRetry;

/// What a worker does with each container it dequeues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    /// List and bulk-delete objects until the container is empty
    FlushObjects,
    /// Delete the container
    DeleteContainer,
}

impl fmt::Display for WorkerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerMode::FlushObjects => write!(f, "objects"),
            WorkerMode::DeleteContainer => write!(f, "containers"),
        }
    }
}

/// Per-worker outcome, returned when the worker exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u64,
    pub abandoned: u64,
}

/// Outcome of one list-then-delete round on a container
enum Round {
    Drained,
    Deleted,
}

/// One member of a deletion pool
pub struct Worker {
    id: usize,
    mode: WorkerMode,
    account: Arc<str>,
    backend: Arc<dyn StorageBackend>,
    queue: WorkQueue<String>,
    progress: Counters,
    retry: ElectionRetry,
    dequeue_timeout: Duration,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        mode: WorkerMode,
        account: Arc<str>,
        backend: Arc<dyn StorageBackend>,
        queue: WorkQueue<String>,
        progress: Counters,
        retry: ElectionRetry,
        dequeue_timeout: Duration,
    ) -> Self {
        Self {
            id,
            mode,
            account,
            backend,
            queue,
            progress,
            retry,
            dequeue_timeout,
        }
    }

    /// Process tasks until the queue stays empty for the dequeue timeout.
    pub async fn run(self) -> WorkerStats {
        let mut stats = WorkerStats::default();

        while let Some(container) = self.queue.get(self.dequeue_timeout).await {
            match self.process(&container).await {
                Ok(()) => stats.processed += 1,
                Err(e) => {
                    stats.abandoned += 1;
                    tracing::error!(
                        worker = self.id,
                        mode = %self.mode,
                        container = %container,
                        error = %e,
                        "Abandoning container for this pass"
                    );
                }
            }

            if let Err(e) = self.queue.task_done() {
                tracing::error!(worker = self.id, error = %e, "Queue bookkeeping error");
            }
        }

        tracing::debug!(
            worker = self.id,
            mode = %self.mode,
            processed = stats.processed,
            abandoned = stats.abandoned,
            "Leaving worker"
        );
        stats
    }

    async fn process(&self, container: &str) -> BackendResult<()> {
        match self.mode {
            WorkerMode::FlushObjects => self.flush_objects(container).await,
            WorkerMode::DeleteContainer => self.delete_container(container).await,
        }
    }

    /// Alternate listing and bulk deletion until a listing comes back empty.
    async fn flush_objects(&self, container: &str) -> BackendResult<()> {
        // Names reported removed by the latest successful round
        let mut last_deleted = HashSet::new();
        loop {
            match self.flush_round(container, &mut last_deleted).await {
                Ok(Round::Drained) => return Ok(()),
                Ok(Round::Deleted) => {}
                // An election failure restarts from the listing
                Err(e) => self.retry.absorb(e, container).await?,
            }
        }
    }

    async fn flush_round(
        &self,
        container: &str,
        last_deleted: &mut HashSet<String>,
    ) -> BackendResult<Round> {
        let listing = self.backend.list_objects(&self.account, container).await?;
        if listing.is_empty() {
            return Ok(Round::Drained);
        }

        // Everything listed was already reported removed: the backend is not
        // actually deleting
        if listing
            .objects
            .iter()
            .all(|object| last_deleted.contains(&object.name))
        {
            return Err(BackendError::NoProgress {
                container: container.to_string(),
                remaining: listing.objects.len(),
            });
        }

        let names = listing.names();
        tracing::debug!(
            worker = self.id,
            container = %container,
            count = names.len(),
            "Deleting objects"
        );
        let report = self
            .backend
            .delete_objects(&self.account, container, &names)
            .await?;
        if report.deleted.is_empty() {
            return Err(report.into_error(container, names.len()));
        }
        if !report.failed.is_empty() {
            tracing::warn!(
                worker = self.id,
                container = %container,
                deleted = report.deleted.len(),
                failed = report.failed.len(),
                "Some objects were not deleted"
            );
        }

        let removed: HashSet<&str> = report.deleted.iter().map(String::as_str).collect();
        let (files, bytes) = listing
            .objects
            .iter()
            .filter(|object| removed.contains(object.name.as_str()))
            .fold((0u64, 0u64), |(files, bytes), object| {
                (files + 1, bytes + object.size)
            });
        self.progress.add(files, bytes);

        *last_deleted = report.deleted.into_iter().collect();
        Ok(Round::Deleted)
    }

    async fn delete_container(&self, container: &str) -> BackendResult<()> {
        tracing::debug!(worker = self.id, container = %container, "Deleting container");
        let backend = &self.backend;
        let account = &*self.account;
        self.retry
            .run(container, move || backend.delete_container(account, container))
            .await?;
        self.progress.add(1, 0);
        Ok(())
    }
}
