//! Thread-safe accumulation of samples from concurrent workers.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::sample::TimingSample;
use crate::stats::Stats;

struct CollectorState {
    samples: Vec<TimingSample>,
    started: Instant,
    finished: Option<Instant>,
}

impl CollectorState {
    fn fresh() -> Self {
        Self {
            samples: Vec::new(),
            started: Instant::now(),
            finished: None,
        }
    }
}

/// Collects samples for one run and aggregates them on demand.
///
/// The measurement window opens when the collector is created (or reset) and
/// closes at [`Collector::finalize`]. All state sits behind a single lock.
pub struct Collector {
    state: Mutex<CollectorState>,
}

impl Collector {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CollectorState::fresh()),
        }
    }

    /// Appends a sample. Safe to call from any number of threads.
    pub fn record(&self, sample: TimingSample) {
        self.state.lock().samples.push(sample);
    }

    /// Closes the measurement window. Calling it again moves the end later.
    pub fn finalize(&self) {
        let mut state = self.state.lock();
        state.finished = Some(Instant::now());
        debug!(samples = state.samples.len(), "collector finalized");
    }

    /// Number of samples recorded so far.
    pub fn len(&self) -> usize {
        self.state.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of the measurement window, or `None` before `finalize`.
    pub fn window(&self) -> Option<Duration> {
        let state = self.state.lock();
        state.finished.map(|end| end.duration_since(state.started))
    }

    /// Aggregates everything recorded so far.
    ///
    /// Meant to be called after [`Collector::finalize`]; before that the
    /// window is measured up to now and throughput will drift.
    pub fn calculate(&self) -> Stats {
        let state = self.state.lock();
        let end = match state.finished {
            Some(end) => end,
            None => {
                warn!("calculating statistics before the collector was finalized");
                Instant::now()
            }
        };
        Stats::compute(&state.samples, end.duration_since(state.started))
    }

    /// Drops all samples and reopens the window for an independent run.
    pub fn reset(&self) {
        *self.state.lock() = CollectorState::fresh();
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}
