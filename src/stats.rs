//! Statistics computation for benchmark results.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::sample::{duration_ms, TimingSample};

/// Width of one latency histogram bucket in milliseconds.
pub const HISTOGRAM_BUCKET_MS: u128 = 10;

/// Samples needed before p99.9 is reported.
pub const P999_MIN_SAMPLES: usize = 1_000;

/// Samples needed before p99.99 is reported.
pub const P9999_MIN_SAMPLES: usize = 10_000;

/// Mean, population standard deviation and range of a series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Summarizes `values`, or `None` for an empty series.
///
/// The standard deviation divides by `n`, not `n - 1`.
pub fn summarize(values: &[f64]) -> Option<Summary> {
    if values.is_empty() {
        return None;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;

    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Some(Summary {
        mean,
        std,
        min,
        max,
    })
}

/// Percentile `p` (0-100) of ascending `sorted`, linearly interpolated
/// between the two nearest order statistics.
pub fn percentile(sorted: &[Duration], p: f64) -> Duration {
    let Some(last) = sorted.len().checked_sub(1) else {
        return Duration::ZERO;
    };
    if p <= 0.0 {
        return sorted[0];
    }
    if p >= 100.0 {
        return sorted[last];
    }

    let index = (p / 100.0) * last as f64;
    let lower = index.floor() as usize;
    let upper = (index.ceil() as usize).min(last);
    let weight = index - lower as f64;

    let lower_ns = sorted[lower].as_nanos() as f64;
    let upper_ns = sorted[upper].as_nanos() as f64;
    Duration::from_nanos((lower_ns + (upper_ns - lower_ns) * weight).round() as u64)
}

/// Sparse histogram of latencies in 10 ms buckets: bucket `k` holds
/// latencies in `[10k, 10k + 10)` ms.
pub fn latency_histogram(latencies: &[Duration]) -> BTreeMap<u64, usize> {
    let mut histogram = BTreeMap::new();
    for latency in latencies {
        let bucket = (latency.as_millis() / HISTOGRAM_BUCKET_MS) as u64;
        *histogram.entry(bucket).or_insert(0) += 1;
    }
    histogram
}

/// Aggregated statistics over a completed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    pub requests_per_second: f64,
    #[serde(with = "duration_ms")]
    pub min_latency: Duration,
    #[serde(with = "duration_ms")]
    pub max_latency: Duration,
    #[serde(with = "duration_ms")]
    pub mean_latency: Duration,
    #[serde(with = "duration_ms")]
    pub p50: Duration,
    #[serde(with = "duration_ms")]
    pub p90: Duration,
    #[serde(with = "duration_ms")]
    pub p95: Duration,
    #[serde(with = "duration_ms")]
    pub p99: Duration,
    /// Zero unless at least [`P999_MIN_SAMPLES`] samples were collected.
    #[serde(rename = "p99_9", with = "duration_ms", skip_serializing_if = "Duration::is_zero")]
    pub p999: Duration,
    /// Zero unless at least [`P9999_MIN_SAMPLES`] samples were collected.
    #[serde(rename = "p99_99", with = "duration_ms", skip_serializing_if = "Duration::is_zero")]
    pub p9999: Duration,
    /// Successful responses per status code; failed samples are excluded.
    pub status_codes: BTreeMap<u16, usize>,
    pub error_rate: f64,
    pub total_bytes: u64,
    pub bytes_per_second: f64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub histogram: BTreeMap<u64, usize>,
}

impl Stats {
    /// Computes statistics for `samples` collected over `window`.
    ///
    /// An empty sample set yields the all-zero default.
    pub fn compute(samples: &[TimingSample], window: Duration) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let n = samples.len();
        let mut stats = Stats {
            total_requests: n,
            duration: window,
            ..Default::default()
        };

        let mut latencies = Vec::with_capacity(n);
        let mut total_nanos: u128 = 0;
        for sample in samples {
            latencies.push(sample.total);
            total_nanos += sample.total.as_nanos();
            stats.total_bytes += sample.response_size;

            if sample.is_success() {
                stats.successful_requests += 1;
                *stats.status_codes.entry(sample.status_code).or_insert(0) += 1;
            } else {
                stats.failed_requests += 1;
            }
        }

        latencies.sort_unstable();

        stats.min_latency = latencies[0];
        stats.max_latency = latencies[n - 1];
        stats.mean_latency = Duration::from_nanos((total_nanos / n as u128) as u64);

        stats.p50 = percentile(&latencies, 50.0);
        stats.p90 = percentile(&latencies, 90.0);
        stats.p95 = percentile(&latencies, 95.0);
        stats.p99 = percentile(&latencies, 99.0);
        if n >= P999_MIN_SAMPLES {
            stats.p999 = percentile(&latencies, 99.9);
        }
        if n >= P9999_MIN_SAMPLES {
            stats.p9999 = percentile(&latencies, 99.99);
        }

        stats.histogram = latency_histogram(&latencies);

        let seconds = window.as_secs_f64();
        if seconds > 0.0 {
            stats.requests_per_second = n as f64 / seconds;
            stats.bytes_per_second = stats.total_bytes as f64 / seconds;
        }
        stats.error_rate = stats.failed_requests as f64 / n as f64;

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn ms(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|&v| Duration::from_millis(v)).collect()
    }

    fn sample(latency_ms: u64, status: u16) -> TimingSample {
        TimingSample {
            total: Duration::from_millis(latency_ms),
            status_code: status,
            response_size: 100,
            ..Default::default()
        }
    }

    #[test]
    fn summarize_uses_population_std() {
        let summary = summarize(&[2.0, 4.0, 6.0, 8.0]).unwrap();
        assert_eq!(summary.mean, 5.0);
        assert!((summary.std - 5.0_f64.sqrt()).abs() < 1e-9);
        assert_eq!(summary.min, 2.0);
        assert_eq!(summary.max, 8.0);

        let flat = summarize(&[5.0, 5.0, 5.0, 5.0]).unwrap();
        assert_eq!(flat.std, 0.0);

        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn percentile_interpolates() {
        let sorted = ms(&[10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);

        assert_eq!(percentile(&sorted, 0.0), Duration::from_millis(10));
        assert_eq!(percentile(&sorted, 100.0), Duration::from_millis(100));
        // index 4.5 sits halfway between 50 and 60
        assert_eq!(percentile(&sorted, 50.0), Duration::from_millis(55));
        // index 8.1 is 10% of the way from 90 to 100
        assert_eq!(percentile(&sorted, 90.0), Duration::from_millis(91));
    }

    #[test]
    fn percentile_clamps_out_of_range() {
        let sorted = ms(&[1, 2, 3]);
        assert_eq!(percentile(&sorted, -5.0), Duration::from_millis(1));
        assert_eq!(percentile(&sorted, 150.0), Duration::from_millis(3));
    }

    #[test]
    fn percentile_of_empty_and_single() {
        assert_eq!(percentile(&[], 50.0), Duration::ZERO);

        let single = ms(&[42]);
        for p in [0.0, 50.0, 99.0, 100.0] {
            assert_eq!(percentile(&single, p), Duration::from_millis(42));
        }
    }

    #[test]
    fn percentile_bounds_hold_for_random_sets() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let len = rng.gen_range(1..500);
            let mut latencies: Vec<Duration> = (0..len)
                .map(|_| Duration::from_micros(rng.gen_range(0..5_000_000)))
                .collect();
            latencies.sort_unstable();

            assert_eq!(percentile(&latencies, 0.0), latencies[0]);
            assert_eq!(percentile(&latencies, 100.0), latencies[len - 1]);

            let p50 = percentile(&latencies, 50.0);
            let p99 = percentile(&latencies, 99.0);
            assert!(latencies[0] <= p50 && p50 <= p99 && p99 <= latencies[len - 1]);

            let histogram = latency_histogram(&latencies);
            assert_eq!(histogram.values().sum::<usize>(), len);
        }
    }

    #[test]
    fn histogram_uses_ten_millisecond_buckets() {
        let histogram = latency_histogram(&ms(&[5, 15, 25, 95, 105]));
        let expected: BTreeMap<u64, usize> = [(0, 1), (1, 1), (2, 1), (9, 1), (10, 1)].into();
        assert_eq!(histogram, expected);

        let edges = latency_histogram(&ms(&[0, 9, 10, 19, 20]));
        let expected: BTreeMap<u64, usize> = [(0, 2), (1, 2), (2, 1)].into();
        assert_eq!(edges, expected);
    }

    #[test]
    fn compute_reference_example() {
        let samples: Vec<_> = [50, 100, 150, 200, 250]
            .iter()
            .map(|&l| sample(l, 200))
            .collect();

        let stats = Stats::compute(&samples, Duration::from_secs(1));

        assert_eq!(stats.total_requests, 5);
        assert_eq!(stats.successful_requests, 5);
        assert_eq!(stats.min_latency, Duration::from_millis(50));
        assert_eq!(stats.max_latency, Duration::from_millis(250));
        assert_eq!(stats.mean_latency, Duration::from_millis(150));
        assert_eq!(stats.p50, Duration::from_millis(150));
        assert_eq!(stats.status_codes.get(&200), Some(&5));
        assert_eq!(stats.total_bytes, 500);
        assert_eq!(stats.requests_per_second, 5.0);
        assert_eq!(stats.bytes_per_second, 500.0);
        assert_eq!(stats.error_rate, 0.0);
        assert_eq!(stats.p999, Duration::ZERO);
        assert_eq!(stats.p9999, Duration::ZERO);
    }

    #[test]
    fn compute_excludes_errors_from_status_codes() {
        let mut failed = sample(30, 0);
        failed.error = Some("timeout".into());
        let samples = vec![sample(10, 200), sample(20, 404), failed];

        let stats = Stats::compute(&samples, Duration::from_secs(2));

        assert_eq!(stats.successful_requests, 2);
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.status_codes.len(), 2);
        assert!(!stats.status_codes.contains_key(&0));
        assert!((stats.error_rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.histogram.values().sum::<usize>(), 3);
    }

    #[test]
    fn compute_extended_percentiles_need_enough_samples() {
        let small: Vec<_> = (0..999).map(|i| sample(i % 100, 200)).collect();
        let stats = Stats::compute(&small, Duration::from_secs(1));
        assert_eq!(stats.p999, Duration::ZERO);

        let large: Vec<_> = (0..1_000).map(|i| sample(1 + i % 100, 200)).collect();
        let stats = Stats::compute(&large, Duration::from_secs(1));
        assert!(stats.p999 > Duration::ZERO);
        assert_eq!(stats.p9999, Duration::ZERO);

        let huge: Vec<_> = (0..10_000).map(|i| sample(1 + i % 100, 200)).collect();
        let stats = Stats::compute(&huge, Duration::from_secs(1));
        assert!(stats.p9999 >= stats.p999);
        assert!(stats.p9999 > Duration::ZERO);
    }

    #[test]
    fn compute_empty_is_zero() {
        let stats = Stats::compute(&[], Duration::from_secs(1));
        assert_eq!(stats, Stats::default());
        assert_eq!(stats.total_requests, 0);
    }

    #[test]
    fn zero_window_reports_no_throughput() {
        let stats = Stats::compute(&[sample(10, 200)], Duration::ZERO);
        assert_eq!(stats.requests_per_second, 0.0);
        assert_eq!(stats.bytes_per_second, 0.0);
    }

    #[test]
    fn json_omits_missing_extended_percentiles() {
        let stats = Stats::compute(&[sample(10, 200)], Duration::from_secs(1));
        let json = serde_json::to_value(&stats).unwrap();

        assert!(json.get("p99_9").is_none());
        assert!(json.get("p99_99").is_none());
        assert_eq!(json["p50"], 10);
        assert_eq!(json["status_codes"]["200"], 1);
        assert_eq!(json["histogram"]["1"], 1);
    }
}
