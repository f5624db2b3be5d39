//! Chunk-level timing of response bodies and delivery-pattern analysis.
//!
//! [`StreamingReader`] timestamps every non-empty read of a body. The chunk
//! timeline it produces feeds [`analyze_buffering`], which classifies the
//! delivery as steady, moderate, burst or stalled and estimates whether the
//! server buffered the response, and [`detect_stalls`], which reports pauses
//! longer than a threshold.

mod analysis;
mod headers;
mod reader;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::error::StreamingError;
use crate::sample::duration_ms;

pub use analysis::{
    analyze_buffering, buffering_score, calculate_confidence, detect_buffering,
    detect_chunk_pattern, detect_stalls, inter_chunk_delays, DEFAULT_STALL_THRESHOLD,
    LONG_DELAY_MS,
};
pub use headers::StreamingInfo;
pub use reader::StreamingReader;

/// One non-empty read from a response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkTiming {
    #[serde(rename = "sequence")]
    pub sequence_number: usize,
    pub size: usize,
    /// Time since the stream was opened.
    #[serde(rename = "elapsed_time", with = "duration_ms")]
    pub elapsed: Duration,
    pub timestamp: DateTime<Utc>,
    /// Megabits per second since the previous read.
    pub throughput_mbps: f64,
}

/// Delivery classification derived from the coefficient of variation of
/// inter-chunk delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkPattern {
    Steady,
    Moderate,
    Burst,
    Stalled,
    /// Fewer than two chunks; nothing to classify.
    #[default]
    InsufficientData,
}

impl ChunkPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkPattern::Steady => "steady",
            ChunkPattern::Moderate => "moderate",
            ChunkPattern::Burst => "burst",
            ChunkPattern::Stalled => "stalled",
            ChunkPattern::InsufficientData => "insufficient_data",
        }
    }
}

impl fmt::Display for ChunkPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistical view of inter-chunk delays and the buffering verdict.
///
/// Delay figures are in milliseconds. With fewer than two chunks the pattern
/// is [`ChunkPattern::InsufficientData`], delays are zero and min/max are -1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferingAnalysis {
    #[serde(with = "duration_ms")]
    pub time_to_first_byte: Duration,
    /// Gap between the first and second chunk.
    #[serde(with = "duration_ms")]
    pub first_chunk_gap: Duration,
    pub chunk_pattern: ChunkPattern,
    pub stall_count: usize,
    #[serde(with = "duration_ms")]
    pub total_stall_time: Duration,
    #[serde(rename = "chunk_timing_cv")]
    pub cv: f64,
    pub buffering_detected: bool,
    pub mean_delay_ms: f64,
    pub stddev_delay_ms: f64,
    pub min_delay_ms: f64,
    pub max_delay_ms: f64,
    /// 0-1, grows with the number of chunks and the clarity of the pattern.
    pub confidence: f64,
}

impl BufferingAnalysis {
    /// The sentinel produced for 0 or 1 chunks.
    pub fn insufficient_data(time_to_first_byte: Duration) -> Self {
        Self {
            time_to_first_byte,
            first_chunk_gap: Duration::ZERO,
            chunk_pattern: ChunkPattern::InsufficientData,
            stall_count: 0,
            total_stall_time: Duration::ZERO,
            cv: 0.0,
            buffering_detected: false,
            mean_delay_ms: 0.0,
            stddev_delay_ms: 0.0,
            min_delay_ms: -1.0,
            max_delay_ms: -1.0,
            confidence: 0.0,
        }
    }

    pub fn is_insufficient(&self) -> bool {
        self.chunk_pattern == ChunkPattern::InsufficientData
    }
}

impl Default for BufferingAnalysis {
    fn default() -> Self {
        Self::insufficient_data(Duration::ZERO)
    }
}

/// A pause in delivery longer than the stall threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StallInfo {
    #[serde(rename = "start_time", with = "duration_ms")]
    pub start: Duration,
    #[serde(rename = "end_time", with = "duration_ms")]
    pub end: Duration,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    /// Bytes delivered before the chunk that opened the gap.
    #[serde(rename = "position")]
    pub bytes_before: u64,
}

/// Everything observed about one response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamReport {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub chunk_timings: Vec<ChunkTiming>,
    pub bytes_per_second: f64,
    #[serde(with = "duration_ms")]
    pub first_chunk_time: Duration,
    #[serde(with = "duration_ms")]
    pub last_chunk_time: Duration,
    pub total_chunks: usize,
    pub total_bytes: u64,
    pub average_chunk_size: u64,
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming_info: Option<StreamingInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffering_analysis: Option<BufferingAnalysis>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stalls: Vec<StallInfo>,
}

impl StreamReport {
    /// Attaches buffering analysis and stall detection. A body with no chunks
    /// gets neither.
    pub fn with_analysis(mut self, stall_threshold: Duration) -> Self {
        if self.chunk_timings.is_empty() {
            return self;
        }

        let stalls = detect_stalls(&self.chunk_timings, stall_threshold);
        let mut analysis = analyze_buffering(&self.chunk_timings);
        analysis.stall_count = stalls.len();
        analysis.total_stall_time = stalls.iter().map(|s| s.duration).sum();

        self.buffering_analysis = Some(analysis);
        self.stalls = stalls;
        self
    }

    /// Checks that the body was delivered progressively.
    ///
    /// A single-chunk body is rejected: one read cannot show progressive
    /// delivery, even though the analysis itself reports it as
    /// `insufficient_data` rather than buffered.
    pub fn validate_streaming(&self) -> Result<(), StreamingError> {
        let analysis = self
            .buffering_analysis
            .as_ref()
            .ok_or(StreamingError::NoAnalysis)?;

        if analysis.is_insufficient() {
            return Err(StreamingError::InsufficientData {
                chunks: self.total_chunks,
            });
        }

        if analysis.buffering_detected {
            return Err(StreamingError::BufferingDetected {
                pattern: analysis.chunk_pattern.to_string(),
                cv: analysis.cv,
            });
        }

        if let Some(info) = &self.streaming_info {
            if !info.is_streaming_likely {
                return Err(StreamingError::HeadersNotStreaming);
            }
        }

        Ok(())
    }
}
