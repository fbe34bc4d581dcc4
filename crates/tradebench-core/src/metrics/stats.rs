use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TimingStats: derived summary of one operation's samples
// ---------------------------------------------------------------------------

/// Summary statistics for the duration samples of a single operation.
///
/// Always derived from the raw samples at query time; never updated in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TimingStats {
    pub count: u64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl TimingStats {
    /// Reduce a set of samples. Returns `None` when `samples` is empty.
    pub fn from_samples(samples: &[Duration]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = samples.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        sorted.sort_unstable_by(f64::total_cmp);

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();

        Some(Self {
            count: count as u64,
            min_ms: sorted[0],
            max_ms: sorted[count - 1],
            mean_ms: sum / count as f64,
            p50_ms: percentile(&sorted, 50.0),
            p95_ms: percentile(&sorted, 95.0),
            p99_ms: percentile(&sorted, 99.0),
        })
    }

    /// Look up a statistic by its report name (`count`, `min_ms`, ...).
    pub fn get(&self, stat: &str) -> Option<f64> {
        let v = match stat {
            "count" => self.count as f64,
            "min_ms" => self.min_ms,
            "max_ms" => self.max_ms,
            "mean_ms" => self.mean_ms,
            "p50_ms" => self.p50_ms,
            "p95_ms" => self.p95_ms,
            "p99_ms" => self.p99_ms,
            _ => return None,
        };
        Some(v)
    }
}

/// Statistic names in report order.
pub const STAT_NAMES: [&str; 7] = [
    "count", "min_ms", "max_ms", "mean_ms", "p50_ms", "p95_ms", "p99_ms",
];

/// Nearest-rank percentile of an ascending slice.
///
/// `p` must be in the range (0.0, 100.0]. Returns 0 for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    let idx = idx.saturating_sub(1).min(sorted.len() - 1);
    sorted[idx]
}
