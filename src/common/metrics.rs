//! Prometheus-compatible metrics
//!
//! Each server owns one [`MetricsRegistry`]; handlers bump counters and the
//! `/metrics` route renders them in text exposition format.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Histogram bucket boundaries for latency measurements (in milliseconds)
const LATENCY_BUCKETS: [f64; 9] = [1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0];

/// A simple histogram implementation for latency tracking
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    boundaries: Vec<f64>,
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new() -> Self {
        Self::with_buckets(&LATENCY_BUCKETS)
    }

    pub fn with_buckets(boundaries: &[f64]) -> Self {
        let buckets = (0..=boundaries.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            boundaries: boundaries.to_vec(),
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record a value in milliseconds
    pub fn observe(&self, value_ms: f64) {
        let idx = self
            .boundaries
            .iter()
            .position(|&b| value_ms <= b)
            .unwrap_or(self.boundaries.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add((value_ms * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_duration(&self, d: Duration) {
        self.observe(d.as_secs_f64() * 1000.0);
    }

    /// Cumulative bucket counts, `+Inf` last
    pub fn get_buckets(&self) -> Vec<(f64, u64)> {
        let mut cumulative = 0u64;
        let mut result = Vec::with_capacity(self.buckets.len());
        for (i, &boundary) in self.boundaries.iter().enumerate() {
            cumulative += self.buckets[i].load(Ordering::Relaxed);
            result.push((boundary, cumulative));
        }
        cumulative += self.buckets[self.boundaries.len()].load(Ordering::Relaxed);
        result.push((f64::INFINITY, cumulative));
        result
    }

    pub fn sum(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic counter
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Per-server metrics
#[derive(Debug)]
pub struct MetricsRegistry {
    prefix: &'static str,

    pub reads: Counter,
    pub writes_ok: Counter,
    pub writes_old_version: Counter,
    pub writes_missing_blocks: Counter,
    pub writes_not_leader: Counter,
    pub writes_replication_failed: Counter,

    pub rounds_committed: Counter,
    pub rounds_aborted: Counter,
    pub round_latency: Histogram,

    pub proposals_staged: Counter,
    pub proposals_rejected: Counter,

    pub unavailable_rejections: Counter,

    pub blocks_stored: Counter,
    pub bytes_stored: Counter,
    pub block_lookups: Counter,

    start_time: Instant,
}

impl MetricsRegistry {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            reads: Counter::new(),
            writes_ok: Counter::new(),
            writes_old_version: Counter::new(),
            writes_missing_blocks: Counter::new(),
            writes_not_leader: Counter::new(),
            writes_replication_failed: Counter::new(),
            rounds_committed: Counter::new(),
            rounds_aborted: Counter::new(),
            round_latency: Histogram::new(),
            proposals_staged: Counter::new(),
            proposals_rejected: Counter::new(),
            unavailable_rejections: Counter::new(),
            blocks_stored: Counter::new(),
            bytes_stored: Counter::new(),
            block_lookups: Counter::new(),
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn counter(&self, out: &mut String, name: &str, help: &str, value: u64) {
        let _ = writeln!(out, "# HELP {}_{} {}", self.prefix, name, help);
        let _ = writeln!(out, "# TYPE {}_{} counter", self.prefix, name);
        let _ = writeln!(out, "{}_{} {}", self.prefix, name, value);
    }

    /// Generate Prometheus-compatible metrics output
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        let p = self.prefix;

        self.counter(&mut out, "reads_total", "File reads served", self.reads.get());

        let _ = writeln!(out, "# HELP {}_writes_total Write outcomes by result", p);
        let _ = writeln!(out, "# TYPE {}_writes_total counter", p);
        for (result, c) in [
            ("ok", &self.writes_ok),
            ("old_version", &self.writes_old_version),
            ("missing_blocks", &self.writes_missing_blocks),
            ("not_leader", &self.writes_not_leader),
            ("replication_failed", &self.writes_replication_failed),
        ] {
            let _ = writeln!(out, "{}_writes_total{{result=\"{}\"}} {}", p, result, c.get());
        }

        self.counter(
            &mut out,
            "rounds_committed_total",
            "Replication rounds that reached quorum",
            self.rounds_committed.get(),
        );
        self.counter(
            &mut out,
            "rounds_aborted_total",
            "Replication rounds that missed quorum",
            self.rounds_aborted.get(),
        );
        self.counter(
            &mut out,
            "proposals_staged_total",
            "Proposals staged by this follower",
            self.proposals_staged.get(),
        );
        self.counter(
            &mut out,
            "proposals_rejected_total",
            "Proposals refused by this follower",
            self.proposals_rejected.get(),
        );
        self.counter(
            &mut out,
            "unavailable_total",
            "Requests refused while crashed",
            self.unavailable_rejections.get(),
        );
        self.counter(
            &mut out,
            "blocks_stored_total",
            "Blocks newly stored",
            self.blocks_stored.get(),
        );
        self.counter(
            &mut out,
            "bytes_stored_total",
            "Block bytes newly stored",
            self.bytes_stored.get(),
        );
        self.counter(
            &mut out,
            "block_lookups_total",
            "Block presence or content lookups",
            self.block_lookups.get(),
        );

        let _ = writeln!(out, "# HELP {}_round_duration_ms Replication round latency", p);
        let _ = writeln!(out, "# TYPE {}_round_duration_ms histogram", p);
        for (le, count) in self.round_latency.get_buckets() {
            let le = if le.is_infinite() {
                "+Inf".to_string()
            } else {
                le.to_string()
            };
            let _ = writeln!(out, "{}_round_duration_ms_bucket{{le=\"{}\"}} {}", p, le, count);
        }
        let _ = writeln!(out, "{}_round_duration_ms_sum {}", p, self.round_latency.sum());
        let _ = writeln!(out, "{}_round_duration_ms_count {}", p, self.round_latency.count());

        let _ = writeln!(out, "# HELP {}_uptime_seconds Server uptime in seconds", p);
        let _ = writeln!(out, "# TYPE {}_uptime_seconds gauge", p);
        let _ = writeln!(out, "{}_uptime_seconds {}", p, self.uptime_seconds());

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram() {
        let h = Histogram::new();
        h.observe(0.5);
        h.observe(7.0);
        h.observe(5000.0);

        let buckets = h.get_buckets();
        assert_eq!(buckets[0], (1.0, 1));
        assert_eq!(buckets[2], (10.0, 2));
        assert_eq!(buckets.last().unwrap().1, 3);
        assert_eq!(h.count(), 3);
    }

    #[test]
    fn test_prometheus_output() {
        let m = MetricsRegistry::new("blocksync_meta");
        m.writes_ok.inc();
        m.writes_old_version.add(2);
        let text = m.to_prometheus();
        assert!(text.contains("blocksync_meta_writes_total{result=\"ok\"} 1"));
        assert!(text.contains("blocksync_meta_writes_total{result=\"old_version\"} 2"));
        assert!(text.contains("blocksync_meta_round_duration_ms_bucket{le=\"+Inf\"} 0"));
    }
}
