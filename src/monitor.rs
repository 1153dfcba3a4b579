use crate::protocol::LookupStatus;
use std::time::Instant;
use tracing::info;

/// Running tally of lookup outcomes with a once-a-second progress log.
///
/// Owned by the batch driver; updated inline as results are drained, so no
/// background task or shared state is involved.
pub struct ProgressMonitor {
    started: Instant,
    last_report: Instant,
    last_total: u64,
    aliased: u64,
    no_match: u64,
    errors: u64,
}

impl ProgressMonitor {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_report: now,
            last_total: 0,
            aliased: 0,
            no_match: 0,
            errors: 0,
        }
    }

    pub fn record(&mut self, status: LookupStatus) {
        match status {
            LookupStatus::Success => self.aliased += 1,
            LookupStatus::NoMatch => self.no_match += 1,
            LookupStatus::UnknownError => self.errors += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.aliased + self.no_match + self.errors
    }

    pub fn aliased(&self) -> u64 {
        self.aliased
    }

    pub fn no_match(&self) -> u64 {
        self.no_match
    }

    /// Log throughput if at least a second has passed since the last report.
    pub fn maybe_report(&mut self) {
        let elapsed = self.last_report.elapsed();
        if elapsed.as_secs_f64() < 1.0 {
            return;
        }
        let total = self.total();
        let rate = total as f64 / self.started.elapsed().as_secs_f64();
        info!(
            "Total Processed: {} ({:.2} IPs/sec; +{}) -> Aliased: {}; No-match: {}",
            total,
            rate,
            total - self.last_total,
            self.aliased,
            self.no_match
        );
        self.last_total = total;
        self.last_report = Instant::now();
    }

    /// Final summary at end of run.
    pub fn summarize(&self) {
        let elapsed = self.started.elapsed().as_secs_f64();
        info!(
            "Finished: {} lookups in {:.2}s ({:.2} IPs/sec) -> Aliased: {}; No-match: {}; Errors: {}",
            self.total(),
            elapsed,
            self.total() as f64 / elapsed.max(f64::EPSILON),
            self.aliased,
            self.no_match,
            self.errors
        );
    }
}

impl Default for ProgressMonitor {
    fn default() -> Self {
        Self::new()
    }
}
