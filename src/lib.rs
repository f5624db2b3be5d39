//! HTTP latency measurement and load generation.
//!
//! A [`LoadGenerator`] fans requests out over a fixed pool of workers, each
//! measured by a [`TimingCapture`], and fans the resulting samples into a
//! [`Collector`] that aggregates them into [`Stats`]. Single requests can
//! additionally be measured chunk by chunk through the [`streaming`] module
//! to tell progressive delivery from server-side buffering.

pub mod capture;
pub mod collector;
pub mod config;
pub mod error;
pub mod loadgen;
pub mod report;
pub mod sample;
pub mod shutdown;
pub mod stats;
pub mod streaming;
pub mod urls;

pub use capture::{CaptureOptions, HttpCapture, Request, TimingCapture};
pub use collector::Collector;
pub use error::{ConfigError, LoadError, StreamingError};
pub use loadgen::{Job, LoadConfig, LoadGenerator, RunSummary};
pub use sample::TimingSample;
pub use shutdown::Shutdown;
pub use stats::Stats;
pub use streaming::{StreamReport, StreamingReader};
