//! Concurrent load generator.
//!
//! Expands URLs x repetitions into a pre-filled job queue and drains it with
//! a fixed pool of worker threads. Each worker drives its requests on the
//! shared tokio runtime and records every sample, failed or not, into the
//! collector. The collector is finalized only after all workers have joined.

use crossbeam_channel::{bounded, Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Method;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::capture::{Request, TimingCapture};
use crate::collector::Collector;
use crate::error::{ConfigError, LoadError};
use crate::shutdown::Shutdown;

/// One request to issue. Consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub url: String,
    pub sequence_id: usize,
}

/// Load run configuration.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub urls: Vec<String>,
    pub requests_per_url: usize,
    pub concurrency: usize,
    /// Method, headers and body shared by every job; the URL is replaced.
    pub request: Request,
}

impl LoadConfig {
    /// Rejects configurations that must not dispatch any job.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.urls.is_empty() {
            return Err(ConfigError::NoUrls);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency(self.concurrency));
        }
        if self.requests_per_url == 0 {
            return Err(ConfigError::InvalidRequestCount(self.requests_per_url));
        }
        if Method::from_bytes(self.request.method.as_bytes()).is_err() {
            return Err(ConfigError::InvalidMethod(self.request.method.clone()));
        }
        Ok(())
    }

    pub fn total_jobs(&self) -> usize {
        self.urls.len() * self.requests_per_url
    }
}

/// Jobs in URL-major order: every repetition of the first URL, then the next.
pub fn enumerate_jobs(urls: &[String], requests_per_url: usize) -> Vec<Job> {
    urls.iter()
        .flat_map(|url| std::iter::repeat(url).take(requests_per_url))
        .enumerate()
        .map(|(sequence_id, url)| Job {
            url: url.clone(),
            sequence_id,
        })
        .collect()
}

/// Outcome of a run. The measurements themselves live in the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub dispatched: usize,
    pub completed: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    /// True when an interrupt stopped the run before the queue was drained.
    pub fn interrupted(&self) -> bool {
        self.completed < self.dispatched
    }
}

pub struct LoadGenerator {
    capture: Arc<dyn TimingCapture>,
    collector: Arc<Collector>,
    runtime: Arc<Runtime>,
    shutdown: Shutdown,
    show_progress: bool,
}

impl LoadGenerator {
    pub fn new(
        capture: Arc<dyn TimingCapture>,
        collector: Arc<Collector>,
        runtime: Arc<Runtime>,
    ) -> Self {
        Self {
            capture,
            collector,
            runtime,
            shutdown: Shutdown::new(),
            show_progress: false,
        }
    }

    /// Workers stop taking jobs once `shutdown` is triggered.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn collector(&self) -> &Arc<Collector> {
        &self.collector
    }

    /// Runs every job once and finalizes the collector.
    ///
    /// Blocks the calling thread; must not be called from inside the runtime.
    pub fn run(&self, config: &LoadConfig) -> Result<RunSummary, LoadError> {
        config.validate()?;

        let jobs = enumerate_jobs(&config.urls, config.requests_per_url);
        let total = jobs.len();
        info!(
            jobs = total,
            urls = config.urls.len(),
            concurrency = config.concurrency,
            capture = self.capture.name(),
            "starting load run"
        );

        let pb = self.progress_bar(total);

        // Capacity equals the job count so enqueueing never blocks.
        let (tx, rx): (Sender<Job>, Receiver<Job>) = bounded(total);
        for job in jobs {
            tx.send(job).map_err(|_| LoadError::QueueClosed)?;
        }
        drop(tx);

        let start = Instant::now();
        let completed = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::with_capacity(config.concurrency);

        for worker_idx in 0..config.concurrency {
            let rx = rx.clone();
            let capture = self.capture.clone();
            let collector = self.collector.clone();
            let runtime = self.runtime.clone();
            let shutdown = self.shutdown.clone();
            let request = config.request.clone();
            let completed = completed.clone();
            let pb = pb.clone();

            let handle = thread::Builder::new()
                .name(format!("loadgen-worker-{}", worker_idx))
                .spawn(move || {
                    while !shutdown.is_triggered() {
                        let Ok(job) = rx.recv() else {
                            break;
                        };

                        let request = request.with_url(&job.url);
                        let sample = runtime.block_on(capture.measure(&request));
                        if let Some(error) = &sample.error {
                            debug!(
                                worker = worker_idx,
                                job = job.sequence_id,
                                url = %job.url,
                                %error,
                                "request failed"
                            );
                        }
                        collector.record(sample);
                        completed.fetch_add(1, Ordering::Relaxed);
                        pb.inc(1);
                    }
                })?;
            handles.push(handle);
        }

        let mut panicked = None;
        for (worker_idx, handle) in handles.into_iter().enumerate() {
            if handle.join().is_err() {
                warn!(worker = worker_idx, "worker thread panicked");
                if panicked.is_none() {
                    panicked = Some(worker_idx);
                }
            }
        }

        pb.finish();
        self.collector.finalize();

        if let Some(worker_idx) = panicked {
            return Err(LoadError::WorkerPanicked(worker_idx));
        }

        let summary = RunSummary {
            dispatched: total,
            completed: completed.load(Ordering::Relaxed),
            elapsed: start.elapsed(),
        };
        if summary.interrupted() {
            warn!(
                completed = summary.completed,
                dispatched = summary.dispatched,
                "load run interrupted"
            );
        }
        Ok(summary)
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("  Requests [{bar:40}] {pos}/{len} ({per_sec})")
        {
            pb.set_style(style);
        }
        pb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(urls: &[&str], requests_per_url: usize, concurrency: usize) -> LoadConfig {
        LoadConfig {
            urls: urls.iter().map(|u| u.to_string()).collect(),
            requests_per_url,
            concurrency,
            request: Request::get(""),
        }
    }

    #[test]
    fn jobs_are_url_major() {
        let urls = vec!["http://a".to_string(), "http://b".to_string()];
        let jobs = enumerate_jobs(&urls, 3);

        assert_eq!(jobs.len(), 6);
        let order: Vec<&str> = jobs.iter().map(|j| j.url.as_str()).collect();
        assert_eq!(
            order,
            ["http://a", "http://a", "http://a", "http://b", "http://b", "http://b"]
        );
        let ids: Vec<usize> = jobs.iter().map(|j| j.sequence_id).collect();
        assert_eq!(ids, (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn validation() {
        assert_eq!(config(&["http://a"], 10, 4).validate(), Ok(()));
        assert_eq!(config(&[], 10, 4).validate(), Err(ConfigError::NoUrls));
        assert_eq!(
            config(&["http://a"], 10, 0).validate(),
            Err(ConfigError::InvalidConcurrency(0))
        );
        assert_eq!(
            config(&["http://a"], 0, 4).validate(),
            Err(ConfigError::InvalidRequestCount(0))
        );

        let mut bad_method = config(&["http://a"], 1, 1);
        bad_method.request.method = "GE T".to_string();
        assert_eq!(
            bad_method.validate(),
            Err(ConfigError::InvalidMethod("GE T".to_string()))
        );
    }

    #[test]
    fn concurrency_may_exceed_jobs() {
        let config = config(&["http://a", "http://b"], 2, 64);
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.total_jobs(), 4);
    }
}
