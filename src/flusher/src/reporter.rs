//! Live progress line
//!
//! While a phase drains, the orchestrator hands control to the reporter,
//! which wakes up at most every tick and, once per report interval, prints
//! the rates observed since the previous report on a single line of stderr.

use std::io::Write;
use std::time::{Duration, Instant};

use crate::counters::{Counters, Tally};
use crate::queue::WorkQueue;
use crate::summary::rate;
use crate::worker::WorkerMode;

const MAX_TICK: Duration = Duration::from_secs(1);

/// Rates observed over one report window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusLine {
    pub mode: WorkerMode,
    pub files_per_sec: f64,
    pub bytes_per_sec: f64,
    pub elections_per_sec: f64,
    pub elections_total: u64,
}

impl StatusLine {
    pub fn new(
        mode: WorkerMode,
        progress: Tally,
        elections: Tally,
        elections_total: u64,
        elapsed: Duration,
    ) -> Self {
        Self {
            mode,
            files_per_sec: rate(progress.files, elapsed),
            bytes_per_sec: rate(progress.bytes, elapsed),
            elections_per_sec: rate(elections.files, elapsed),
            elections_total,
        }
    }

    pub fn render(&self) -> String {
        let elections = format!(
            "Elections failed: {:5.2}/s total: {}",
            self.elections_per_sec, self.elections_total
        );
        match self.mode {
            WorkerMode::FlushObjects => format!(
                "Objects: {:5.2} / Size: {:5.2} {}",
                self.files_per_sec, self.bytes_per_sec, elections
            ),
            WorkerMode::DeleteContainer => {
                format!("Containers: {:5.2} {}", self.files_per_sec, elections)
            }
        }
    }
}

/// Periodic status printer for a draining phase
#[derive(Debug, Clone)]
pub struct Reporter {
    interval: Duration,
    tick: Duration,
}

impl Reporter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            tick: interval.min(MAX_TICK),
        }
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Rates over the current window. `earlier_elections` is the number of
    /// election failures counted before this phase, so the reported total
    /// covers the whole run.
    pub fn snapshot(
        mode: WorkerMode,
        progress: &Counters,
        elections: &Counters,
        earlier_elections: u64,
        elapsed: Duration,
    ) -> StatusLine {
        StatusLine::new(
            mode,
            progress.reset(),
            elections.reset(),
            earlier_elections + elections.total().files,
            elapsed,
        )
    }

    /// Report until `queue` has no pending task left. Tasks still being
    /// processed are not waited for; the caller joins the queue afterwards.
    pub async fn watch<T>(
        &self,
        mode: WorkerMode,
        queue: &WorkQueue<T>,
        progress: &Counters,
        elections: &Counters,
        earlier_elections: u64,
    ) {
        let mut last_width = 0;

        while !queue.is_empty() {
            let window_start = Instant::now();
            while !queue.is_empty() && window_start.elapsed() < self.interval {
                tokio::time::sleep(self.tick).await;
            }

            let elapsed = window_start.elapsed();
            let line = Self::snapshot(mode, progress, elections, earlier_elections, elapsed)
                .render();
            tracing::debug!(phase = %mode, status = %line, "Progress");
            last_width = print_status(&line, last_width);
        }

        if last_width > 0 {
            eprintln!();
        }
    }
}

/// Overwrite the current stderr line, returning the printed width
fn print_status(line: &str, previous_width: usize) -> usize {
    let padding = previous_width.saturating_sub(line.len());
    let mut stderr = std::io::stderr().lock();
    // Progress output is best effort
    let _ = write!(stderr, "\r{line}{}", " ".repeat(padding));
    let _ = stderr.flush();
    line.len()
}
