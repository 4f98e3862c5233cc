use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::humanize::ByteSize;

/// Aggregate statistics for one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub project: String,
    pub workers: usize,
    /// Items put on the queue this run
    pub scheduled: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    /// Ledger totals after the run
    pub succeeded: u64,
    pub failed: u64,
    pub pending: u64,
    /// Size of the whole collection
    pub total: u64,
    /// Failed items found in the ledger when the run started
    pub previous_failures: u64,
    pub bytes_written: ByteSize,
    pub checkpoints: u64,
    pub interrupted: bool,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl RunReport {
    pub fn is_empty(&self) -> bool {
        self.scheduled == 0
    }

    /// Requests per second over the run
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.scheduled as f64 / secs
        } else {
            0.0
        }
    }

    /// Succeeded items over the whole collection
    pub fn success_ratio(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.succeeded as f64 / self.total as f64
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "==== Stats ====")?;
        if self.is_empty() {
            writeln!(f, " Nothing to do: no pending items")?;
        } else {
            writeln!(f, " Max of {} concurrent downloads", self.workers)?;
            writeln!(
                f,
                " {} image requests in {:.2} seconds",
                self.scheduled,
                self.elapsed.as_secs_f64()
            )?;
            writeln!(
                f,
                " average of {:.2} image requests per second",
                self.throughput()
            )?;
            writeln!(f, " {} written", self.bytes_written)?;
        }
        if self.interrupted {
            writeln!(f, " run interrupted before the batch finished")?;
        }
        writeln!(f, " failed: {}, never attempted: {}", self.failed, self.pending)?;
        write!(
            f,
            " collection downloaded: {}/{} images ({:.1}%)",
            self.succeeded,
            self.total,
            self.success_ratio() * 100.0
        )
    }
}
