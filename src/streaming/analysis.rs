//! Delivery-pattern classification, buffering heuristics and stall detection.

use std::time::Duration;

use super::{BufferingAnalysis, ChunkPattern, ChunkTiming, StallInfo};
use crate::stats::summarize;

/// Default gap that counts as a stall.
pub const DEFAULT_STALL_THRESHOLD: Duration = Duration::from_millis(500);

/// Inter-chunk delay (ms) that counts as long when telling burst from stalled.
pub const LONG_DELAY_MS: f64 = 500.0;

const STEADY_CV: f64 = 0.3;
const MODERATE_CV: f64 = 0.7;
const STALLED_RATIO: f64 = 0.3;

/// Delay between each consecutive pair of chunks, in milliseconds.
pub fn inter_chunk_delays(chunks: &[ChunkTiming]) -> Vec<f64> {
    chunks
        .windows(2)
        .map(|pair| pair[1].elapsed.saturating_sub(pair[0].elapsed).as_nanos() as f64 / 1e6)
        .collect()
}

/// Analyzes the chunk timeline of one response.
///
/// Needs at least two chunks; anything less yields the insufficient-data
/// sentinel with only the time to first byte filled in.
pub fn analyze_buffering(chunks: &[ChunkTiming]) -> BufferingAnalysis {
    let time_to_first_byte = chunks.first().map(|c| c.elapsed).unwrap_or_default();
    if chunks.len() < 2 {
        return BufferingAnalysis::insufficient_data(time_to_first_byte);
    }

    let delays = inter_chunk_delays(chunks);
    let Some(summary) = summarize(&delays) else {
        return BufferingAnalysis::insufficient_data(time_to_first_byte);
    };

    let cv = if summary.mean > 0.0 {
        summary.std / summary.mean
    } else {
        0.0
    };

    let mut analysis = BufferingAnalysis {
        time_to_first_byte,
        first_chunk_gap: chunks[1].elapsed.saturating_sub(chunks[0].elapsed),
        chunk_pattern: detect_chunk_pattern(cv, &delays),
        cv,
        mean_delay_ms: summary.mean,
        stddev_delay_ms: summary.std,
        min_delay_ms: summary.min,
        max_delay_ms: summary.max,
        ..BufferingAnalysis::insufficient_data(time_to_first_byte)
    };
    analysis.buffering_detected = detect_buffering(&analysis, chunks.len());
    analysis.confidence = calculate_confidence(&analysis, chunks.len());
    analysis
}

/// Classifies delivery from the coefficient of variation of `delays` (ms).
///
/// High-variation timelines are `Stalled` when more than 30% of delays exceed
/// [`LONG_DELAY_MS`], otherwise `Burst`.
pub fn detect_chunk_pattern(cv: f64, delays: &[f64]) -> ChunkPattern {
    if cv < STEADY_CV {
        return ChunkPattern::Steady;
    }
    if cv < MODERATE_CV {
        return ChunkPattern::Moderate;
    }

    if delays.is_empty() {
        return ChunkPattern::Burst;
    }
    let long_delays = delays.iter().filter(|&&d| d > LONG_DELAY_MS).count();
    let stall_ratio = long_delays as f64 / delays.len() as f64;
    if stall_ratio > STALLED_RATIO {
        ChunkPattern::Stalled
    } else {
        ChunkPattern::Burst
    }
}

/// Sums the buffering signals for a response of `total_chunks` chunks.
pub fn buffering_score(analysis: &BufferingAnalysis, total_chunks: usize) -> u32 {
    let mut score = 0;

    // everything arrived in one read
    if total_chunks == 1 {
        score += 2;
    }
    if analysis.time_to_first_byte > Duration::from_secs(1)
        && analysis.chunk_pattern == ChunkPattern::Burst
    {
        score += 1;
    }
    if analysis.first_chunk_gap > Duration::from_secs(1) {
        score += 1;
    }
    if analysis.cv < STEADY_CV && analysis.time_to_first_byte > Duration::from_millis(500) {
        score += 1;
    }

    score
}

/// True when at least two buffering signals fire.
pub fn detect_buffering(analysis: &BufferingAnalysis, total_chunks: usize) -> bool {
    buffering_score(analysis, total_chunks) >= 2
}

/// Confidence in the verdict, capped at 1.0.
pub fn calculate_confidence(analysis: &BufferingAnalysis, total_chunks: usize) -> f64 {
    let mut confidence = 0.5;

    if total_chunks >= 10 {
        confidence += 0.3;
    } else if total_chunks >= 5 {
        confidence += 0.2;
    } else if total_chunks >= 2 {
        confidence += 0.1;
    }

    if analysis.chunk_pattern == ChunkPattern::Steady || analysis.buffering_detected {
        confidence += 0.2;
    }

    f64::min(confidence, 1.0)
}

/// Reports every gap between consecutive chunks longer than `threshold`.
pub fn detect_stalls(chunks: &[ChunkTiming], threshold: Duration) -> Vec<StallInfo> {
    let mut stalls = Vec::new();
    let mut bytes_before: u64 = 0;

    for pair in chunks.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);
        let delay = curr.elapsed.saturating_sub(prev.elapsed);
        if delay > threshold {
            stalls.push(StallInfo {
                start: prev.elapsed,
                end: curr.elapsed,
                duration: delay,
                bytes_before,
            });
        }
        bytes_before += prev.size as u64;
    }

    stalls
}
