//! Flush orchestration
//!
//! Scopes are flushed one after the other. For each scope the orchestrator
//! enumerates the containers under the scope prefix, empties them with a
//! pool of object-flush workers, and once that phase has fully drained
//! deletes the containers with a pool of container-delete workers.
//!
//! Each phase gets its own queue and counters. The queue is filled before
//! any worker starts, so a worker only times out once the phase has no
//! pending work left.

use std::sync::Arc;
use std::time::Duration;

use common::config::Configuration;

use crate::backend::{BackendResult, ContainerEntry, StorageBackend};
use crate::counters::Counters;
use crate::queue::WorkQueue;
use crate::reporter::Reporter;
use crate::retry::ElectionRetry;
use crate::scope::Scope;
use crate::summary::{PhaseTotals, RunSummary, ScopeReport};
use crate::worker::{Worker, WorkerMode, WorkerStats};

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushConfig {
    pub account: String,
    pub namespace: String,
    /// Workers per phase
    pub workers: usize,
    /// How long an idle worker waits for a task before exiting
    pub dequeue_timeout: Duration,
    pub report_interval: Duration,
    pub election_retry_delay: Duration,
}

impl From<&Configuration> for FlushConfig {
    fn from(config: &Configuration) -> Self {
        Self {
            account: config.account.clone(),
            namespace: config.namespace.clone(),
            workers: config.flush.workers,
            dequeue_timeout: config.flush.dequeue_timeout,
            report_interval: config.flush.report_interval,
            election_retry_delay: config.flush.election_retry_delay,
        }
    }
}

/// Containers found under a scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopePlan {
    /// Every in-scope container, in listing order
    pub containers: Vec<String>,
    /// Containers that still hold objects
    pub object_tasks: Vec<String>,
}

impl ScopePlan {
    fn record(&mut self, entry: ContainerEntry) {
        if entry.file_count > 0 {
            self.object_tasks.push(entry.name.clone());
        }
        self.containers.push(entry.name);
    }
}

/// Outcome of one drain phase
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseOutcome {
    pub totals: PhaseTotals,
    pub elections_failed: u64,
    pub workers: WorkerStats,
}

/// Drives enumeration and the two drain phases for each scope
pub struct Flusher {
    config: FlushConfig,
    account: Arc<str>,
    backend: Arc<dyn StorageBackend>,
    reporter: Reporter,
    /// Election failures seen since this flusher was created
    elections_seen: Counters,
}

impl Flusher {
    pub fn new(config: FlushConfig, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            account: Arc::from(config.account.as_str()),
            reporter: Reporter::new(config.report_interval),
            config,
            backend,
            elections_seen: Counters::new(),
        }
    }

    /// Election failures counted by every phase run so far
    pub fn elections_failed(&self) -> u64 {
        self.elections_seen.total().files
    }

    /// Flush every scope in order. Scope failures are recorded in the
    /// summary and never stop the run.
    pub async fn run(&self, scopes: &[Scope]) -> RunSummary {
        let mut summary = RunSummary::default();

        for scope in scopes {
            match self.flush_scope(scope).await {
                Ok(report) => summary.record(report),
                Err(e) => {
                    tracing::error!(
                        scope = %scope,
                        prefix = %scope.prefix(),
                        error = %e,
                        "Failed to enumerate containers, skipping path"
                    );
                    summary.record_failure(scope.clone(), e.to_string());
                }
            }
        }

        summary
    }

    /// Empty then delete every container under `scope`.
    ///
    /// Fails only when enumeration fails, in which case nothing in the scope
    /// has been touched.
    pub async fn flush_scope(&self, scope: &Scope) -> BackendResult<ScopeReport> {
        tracing::info!(scope = %scope, prefix = %scope.prefix(), "Flushing path");

        let enumeration = Counters::new();
        let plan = self.enumerate(scope, &enumeration).await;
        self.elections_seen.add(enumeration.total().files, 0);
        let plan = plan?;
        tracing::info!(
            scope = %scope,
            containers = plan.containers.len(),
            with_objects = plan.object_tasks.len(),
            "Enumerated containers"
        );

        let objects = self
            .drain_phase(WorkerMode::FlushObjects, plan.object_tasks)
            .await;
        let containers = self
            .drain_phase(WorkerMode::DeleteContainer, plan.containers)
            .await;

        let mut report = ScopeReport::new(scope.clone());
        report.objects = objects.totals;
        report.containers = containers.totals;
        report.elections_failed = enumeration.total().files
            + objects.elections_failed
            + containers.elections_failed;
        report.abandoned = objects.workers.abandoned + containers.workers.abandoned;

        tracing::info!(
            scope = %scope,
            objects = report.objects.files,
            bytes = report.objects.bytes,
            containers = report.containers.files,
            elections_failed = report.elections_failed,
            abandoned = report.abandoned,
            "Path flushed"
        );
        Ok(report)
    }

    /// Page through the account's containers under the scope prefix.
    pub async fn enumerate(&self, scope: &Scope, elections: &Counters) -> BackendResult<ScopePlan> {
        let retry = ElectionRetry::new(self.config.election_retry_delay, elections.clone());
        let backend = &self.backend;
        let account = &*self.account;
        let prefix = scope.prefix();

        let mut plan = ScopePlan::default();
        let mut marker: Option<String> = None;

        loop {
            let page_marker = marker.as_deref();
            let page = retry
                .run(prefix, move || {
                    backend.list_containers(account, prefix, page_marker)
                })
                .await?;

            let Some(last) = page.last() else {
                break;
            };
            let next_marker = last.name.clone();

            for entry in page {
                if scope.contains(&entry.name) {
                    plan.record(entry);
                } else {
                    tracing::trace!(container = %entry.name, "Outside of path, skipping");
                }
            }

            // A marker that does not move would page forever
            if marker.as_deref() == Some(next_marker.as_str()) {
                break;
            }
            marker = Some(next_marker);
        }

        Ok(plan)
    }

    /// Run one phase to completion over `tasks`.
    pub async fn drain_phase(&self, mode: WorkerMode, tasks: Vec<String>) -> PhaseOutcome {
        if tasks.is_empty() {
            tracing::debug!(phase = %mode, "Nothing to do");
            return PhaseOutcome::default();
        }

        let queue = WorkQueue::new();
        let progress = Counters::new();
        let elections = Counters::new();

        let task_count = tasks.len();
        for task in tasks {
            queue.put(task);
        }

        let workers = self.config.workers.min(task_count).max(1);
        tracing::debug!(phase = %mode, tasks = task_count, workers, "Starting phase");

        let handles: Vec<_> = (0..workers)
            .map(|id| {
                let worker = Worker::new(
                    id,
                    mode,
                    self.account.clone(),
                    self.backend.clone(),
                    queue.clone(),
                    progress.clone(),
                    ElectionRetry::new(self.config.election_retry_delay, elections.clone()),
                    self.config.dequeue_timeout,
                );
                tokio::spawn(worker.run())
            })
            .collect();

        let earlier_elections = self.elections_failed();
        self.reporter
            .watch(mode, &queue, &progress, &elections, earlier_elections)
            .await;
        queue.join().await;

        let mut stats = WorkerStats::default();
        for handle in handles {
            match handle.await {
                Ok(worker) => {
                    stats.processed += worker.processed;
                    stats.abandoned += worker.abandoned;
                }
                Err(e) => tracing::error!(phase = %mode, error = %e, "Worker task failed"),
            }
        }

        self.elections_seen.add(elections.total().files, 0);

        let outcome = PhaseOutcome {
            totals: PhaseTotals::new(progress.total(), progress.elapsed()),
            elections_failed: elections.total().files,
            workers: stats,
        };
        tracing::debug!(
            phase = %mode,
            files = outcome.totals.files,
            bytes = outcome.totals.bytes,
            elapsed_secs = outcome.totals.elapsed.as_secs_f64(),
            processed = stats.processed,
            abandoned = stats.abandoned,
            "Phase drained"
        );
        outcome
    }
}
