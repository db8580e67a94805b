//! Run totals and the end-of-run report

use std::fmt;
use std::time::Duration;

use crate::counters::Tally;
use crate::scope::Scope;

const BYTE_UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

/// Format a byte count with binary units and two decimals.
pub fn format_bytes(bytes: f64) -> String {
    let mut value = bytes;
    let mut unit = 0;
    while value.abs() >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", BYTE_UNITS[unit])
}

/// Per-second rate, zero when nothing was timed
pub fn rate(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { count as f64 / secs } else { 0.0 }
}

/// Totals of one drain phase
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseTotals {
    pub files: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl PhaseTotals {
    pub fn new(tally: Tally, elapsed: Duration) -> Self {
        Self {
            files: tally.files,
            bytes: tally.bytes,
            elapsed,
        }
    }

    pub fn files_per_sec(&self) -> f64 {
        rate(self.files, self.elapsed)
    }

    pub fn bytes_per_sec(&self) -> f64 {
        rate(self.bytes, self.elapsed)
    }

    /// Fold another phase in; durations add up since phases never overlap
    pub fn merge(&mut self, other: &PhaseTotals) {
        self.files += other.files;
        self.bytes += other.bytes;
        self.elapsed += other.elapsed;
    }
}

/// What flushing one scope achieved
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeReport {
    pub scope: Scope,
    pub objects: PhaseTotals,
    pub containers: PhaseTotals,
    pub elections_failed: u64,
    /// Containers given up on after a non-transient error
    pub abandoned: u64,
}

impl ScopeReport {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            objects: PhaseTotals::default(),
            containers: PhaseTotals::default(),
            elections_failed: 0,
            abandoned: 0,
        }
    }
}

/// A scope whose enumeration failed; nothing was deleted from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedScope {
    pub scope: Scope,
    pub reason: String,
}

/// Run-wide totals
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub objects: PhaseTotals,
    pub containers: PhaseTotals,
    pub elections_failed: u64,
    pub abandoned: u64,
    pub scopes: Vec<ScopeReport>,
    pub failed: Vec<FailedScope>,
}

impl RunSummary {
    pub fn record(&mut self, report: ScopeReport) {
        self.objects.merge(&report.objects);
        self.containers.merge(&report.containers);
        self.elections_failed += report.elections_failed;
        self.abandoned += report.abandoned;
        self.scopes.push(report);
    }

    pub fn record_failure(&mut self, scope: Scope, reason: impl Into<String>) {
        self.failed.push(FailedScope {
            scope,
            reason: reason.into(),
        });
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let objects = &self.objects;
        writeln!(f, "Objects:")?;
        writeln!(f, "    - ran during {:5.2}", objects.elapsed.as_secs_f64())?;
        writeln!(
            f,
            "    - {} objects removed (size {})",
            objects.files,
            format_bytes(objects.bytes as f64)
        )?;
        writeln!(
            f,
            "    - {:5.2} objects/s ({} avg. size/s)",
            objects.files_per_sec(),
            format_bytes(objects.bytes_per_sec())
        )?;
        writeln!(f)?;

        let containers = &self.containers;
        writeln!(f, "Containers:")?;
        writeln!(f, "    - ran during {:5.2}", containers.elapsed.as_secs_f64())?;
        writeln!(f, "    - {} containers", containers.files)?;
        writeln!(f, "    - {:5.2} containers/s", containers.files_per_sec())?;
        writeln!(f)?;

        write!(f, "Elections failed: {}", self.elections_failed)?;

        if self.has_failures() {
            writeln!(f)?;
            writeln!(f)?;
            write!(f, "Failed paths:")?;
            for failed in &self.failed {
                write!(f, "\n    - {}: {}", failed.scope, failed.reason)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0.0), "0.00 B");
        assert_eq!(format_bytes(500.0), "500.00 B");
        assert_eq!(format_bytes(1024.0), "1.00 KiB");
        assert_eq!(format_bytes(1536.0), "1.50 KiB");
        assert_eq!(format_bytes(5.0 * 1024.0 * 1024.0 * 1024.0), "5.00 GiB");
        assert_eq!(format_bytes(2.0 * 1024f64.powi(7)), "2048.00 EiB");
    }

    #[test]
    fn test_rate_is_zero_without_elapsed_time() {
        assert_eq!(rate(100, Duration::ZERO), 0.0);
        assert_eq!(rate(100, Duration::from_secs(4)), 25.0);
    }

    #[test]
    fn test_record_folds_scopes() {
        let mut summary = RunSummary::default();

        let mut first = ScopeReport::new(Scope::parse("a").unwrap());
        first.objects = PhaseTotals::new(Tally::new(5, 500), Duration::from_secs(1));
        first.containers = PhaseTotals::new(Tally::new(2, 0), Duration::from_secs(1));
        first.elections_failed = 3;

        let mut second = ScopeReport::new(Scope::parse("b/x").unwrap());
        second.objects = PhaseTotals::new(Tally::new(1, 10), Duration::from_secs(2));
        second.abandoned = 1;

        summary.record(first);
        summary.record(second);

        assert_eq!(summary.objects.files, 6);
        assert_eq!(summary.objects.bytes, 510);
        assert_eq!(summary.objects.elapsed, Duration::from_secs(3));
        assert_eq!(summary.containers.files, 2);
        assert_eq!(summary.elections_failed, 3);
        assert_eq!(summary.abandoned, 1);
        assert_eq!(summary.scopes.len(), 2);
        assert!(!summary.has_failures());
    }

    #[test]
    fn test_display() {
        let mut summary = RunSummary::default();
        let mut report = ScopeReport::new(Scope::parse("bucket").unwrap());
        report.objects = PhaseTotals::new(Tally::new(5, 500), Duration::from_secs(2));
        report.containers = PhaseTotals::new(Tally::new(2, 0), Duration::from_secs(1));
        report.elections_failed = 1;
        summary.record(report);

        let expected = "\
Objects:
    - ran during  2.00
    - 5 objects removed (size 500.00 B)
    -  2.50 objects/s (250.00 B avg. size/s)

Containers:
    - ran during  1.00
    - 2 containers
    -  2.00 containers/s

Elections failed: 1";
        assert_eq!(summary.to_string(), expected);
    }

    #[test]
    fn test_display_lists_failed_scopes() {
        let mut summary = RunSummary::default();
        summary.record_failure(Scope::parse("bucket/logs").unwrap(), "network error: reset");

        let text = summary.to_string();
        assert!(text.contains("    - ran during  0.00"));
        assert!(text.ends_with("Failed paths:\n    - bucket/logs: network error: reset"));
    }
}
