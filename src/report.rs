//! Text and JSON rendering of samples and statistics.

use clap::ValueEnum;
use reqwest::StatusCode;
use serde::Serialize;
use std::io::{self, Write};
use std::time::Duration;

use crate::sample::TimingSample;
use crate::stats::{Stats, HISTOGRAM_BUCKET_MS};
use crate::streaming::StreamReport;

const HISTOGRAM_WIDTH: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

pub fn banner(w: &mut impl Write, title: &str) -> io::Result<()> {
    writeln!(w, "{}", "=".repeat(60))?;
    writeln!(w, "{}", title)?;
    writeln!(w, "{}", "=".repeat(60))
}

/// Pretty-printed JSON followed by a newline.
pub fn write_json<T: Serialize>(w: &mut impl Write, value: &T) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *w, value)?;
    writeln!(w)
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Sub-millisecond values keep two decimals, seconds switch to `s`.
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1 {
        format!("{:.2}ms", d.as_secs_f64() * 1000.0)
    } else if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}

fn status_line(code: u16) -> String {
    let reason = StatusCode::from_u16(code)
        .ok()
        .and_then(|s| s.canonical_reason());
    match reason {
        Some(reason) => format!("{} {}", code, reason),
        None => code.to_string(),
    }
}

fn share(part: Duration, total: Duration) -> f64 {
    if total.is_zero() {
        0.0
    } else {
        part.as_secs_f64() / total.as_secs_f64() * 100.0
    }
}

/// Phase breakdown of one request.
pub fn write_sample(w: &mut impl Write, sample: &TimingSample, verbose: bool) -> io::Result<()> {
    if let Some(error) = &sample.error {
        writeln!(w, "\nRequest failed: {}", error)?;
        writeln!(w, "  After: {}", format_duration(sample.total))?;
        return Ok(());
    }

    writeln!(w, "\nStatus: {}", status_line(sample.status_code))?;
    writeln!(w, "Time:   {}", format_duration(sample.total))?;
    if !sample.protocol.is_empty() {
        writeln!(w, "Proto:  {}", sample.protocol)?;
    }

    writeln!(w, "\nTiming Breakdown:")?;
    let tls_measured = !sample.tls_handshake.is_zero();
    let connect_label = if sample.secure && !tls_measured {
        "TCP + TLS"
    } else {
        "TCP Connection"
    };
    let mut phases = vec![
        ("DNS Lookup", sample.dns_lookup),
        (connect_label, sample.tcp_connection),
    ];
    if tls_measured {
        phases.push(("TLS Handshake", sample.tls_handshake));
    }
    phases.push(("Server Processing", sample.server_processing));
    phases.push(("Content Transfer", sample.content_transfer));

    for (label, duration) in phases {
        writeln!(
            w,
            "  {:<18} {:>10}  {:>5.1}%",
            label,
            format_duration(duration),
            share(duration, sample.total)
        )?;
    }
    writeln!(w, "  {:<18} {:>10}  {:>5}", "Total", format_duration(sample.total), "100%")?;

    if !sample.response_headers.is_empty() {
        writeln!(w, "\nResponse Headers:")?;
        for (name, value) in &sample.response_headers {
            writeln!(w, "  {}: {}", name, value)?;
        }
    }

    if let Some(body) = &sample.response_body {
        writeln!(w, "\nResponse Body:")?;
        writeln!(w, "{}", body)?;
    }

    if verbose {
        writeln!(w, "\nResponse Size: {}", format_bytes(sample.response_size))?;
        if let Some(length) = sample.content_length {
            writeln!(w, "Content Length: {}", format_bytes(length))?;
        }
    }

    if let Some(report) = &sample.streaming {
        write_stream_report(w, report, verbose)?;
    }
    Ok(())
}

/// Streaming section: header verdict, delivery pattern, stalls, throughput.
pub fn write_stream_report(
    w: &mut impl Write,
    report: &StreamReport,
    verbose: bool,
) -> io::Result<()> {
    if let Some(info) = &report.streaming_info {
        writeln!(w, "\nStreaming Headers:")?;
        if info.is_streaming_likely {
            writeln!(w, "  Streaming likely")?;
        } else {
            writeln!(w, "  Streaming not indicated")?;
        }
        if info.is_chunked {
            writeln!(w, "  Transfer-Encoding: chunked")?;
        }
        match info.content_length {
            Some(length) => writeln!(w, "  Content-Length: {}", format_bytes(length))?,
            None => writeln!(w, "  Content-Length: not set")?,
        }
        if !info.content_type.is_empty() {
            writeln!(w, "  Content-Type: {}", info.content_type)?;
        }
        if !info.x_accel_buffering.is_empty() {
            writeln!(w, "  X-Accel-Buffering: {}", info.x_accel_buffering)?;
        }
    }

    if let Some(analysis) = &report.buffering_analysis {
        writeln!(w, "\nDelivery:")?;
        writeln!(w, "  Pattern: {}", analysis.chunk_pattern)?;
        if analysis.buffering_detected {
            writeln!(w, "  Status:  buffering detected")?;
        } else {
            writeln!(w, "  Status:  progressive delivery")?;
        }
        writeln!(w, "  Time to first byte: {}", format_duration(analysis.time_to_first_byte))?;
        if analysis.first_chunk_gap > Duration::ZERO {
            writeln!(w, "  First chunk gap:    {}", format_duration(analysis.first_chunk_gap))?;
        }
        writeln!(w, "  Coefficient of variation: {:.2}", analysis.cv)?;
        if analysis.mean_delay_ms > 0.0 {
            writeln!(w, "  Mean delay: {:.2}ms", analysis.mean_delay_ms)?;
            writeln!(w, "  Std dev:    {:.2}ms", analysis.stddev_delay_ms)?;
            if analysis.min_delay_ms >= 0.0 && analysis.max_delay_ms >= 0.0 {
                writeln!(
                    w,
                    "  Range:      {:.2}ms - {:.2}ms",
                    analysis.min_delay_ms, analysis.max_delay_ms
                )?;
            }
        }
        writeln!(
            w,
            "  Confidence: {:.0}% ({} chunks)",
            analysis.confidence * 100.0,
            report.total_chunks
        )?;
    }

    if !report.stalls.is_empty() {
        let total: Duration = report.stalls.iter().map(|s| s.duration).sum();
        writeln!(w, "\nStalls:")?;
        writeln!(w, "  Count: {}", report.stalls.len())?;
        writeln!(w, "  Total stall time: {}", format_duration(total))?;
        if verbose {
            for (i, stall) in report.stalls.iter().enumerate() {
                writeln!(
                    w,
                    "  #{}: {} at {} (after {})",
                    i + 1,
                    format_duration(stall.duration),
                    format_duration(stall.start),
                    format_bytes(stall.bytes_before)
                )?;
            }
        }
    }

    writeln!(w, "\nStream Performance:")?;
    if !report.protocol.is_empty() {
        writeln!(w, "  Protocol: {}", report.protocol)?;
    }
    writeln!(w, "  Chunks: {}", report.total_chunks)?;
    writeln!(w, "  Bytes: {}", format_bytes(report.total_bytes))?;
    writeln!(w, "  Average chunk: {}", format_bytes(report.average_chunk_size))?;
    writeln!(w, "  Throughput: {}/s", format_bytes(report.bytes_per_second as u64))?;
    writeln!(w, "  First chunk: {}", format_duration(report.first_chunk_time))?;
    writeln!(w, "  Last chunk: {}", format_duration(report.last_chunk_time))?;

    if verbose && !report.chunk_timings.is_empty() && report.chunk_timings.len() <= 20 {
        writeln!(w, "\nChunks:")?;
        for chunk in &report.chunk_timings {
            writeln!(
                w,
                "  #{:<3} {:>9} at {:>8} ({:.2} Mbps)",
                chunk.sequence_number,
                format_bytes(chunk.size as u64),
                format_duration(chunk.elapsed),
                chunk.throughput_mbps
            )?;
        }
    }
    Ok(())
}

/// Aggregate results of a load run.
pub fn write_stats(w: &mut impl Write, stats: &Stats, verbose: bool) -> io::Result<()> {
    writeln!(w, "\nRequests:")?;
    writeln!(w, "  Total:      {}", stats.total_requests)?;
    writeln!(w, "  Successful: {}", stats.successful_requests)?;
    writeln!(w, "  Failed:     {}", stats.failed_requests)?;
    writeln!(w, "  Error rate: {:.2}%", stats.error_rate * 100.0)?;
    writeln!(w, "  Duration:   {}", format_duration(stats.duration))?;

    writeln!(w, "\nLatency:")?;
    let mut rows = vec![
        ("Min", stats.min_latency),
        ("Mean", stats.mean_latency),
        ("Max", stats.max_latency),
        ("p50", stats.p50),
        ("p90", stats.p90),
        ("p95", stats.p95),
        ("p99", stats.p99),
    ];
    if stats.p999 > Duration::ZERO {
        rows.push(("p99.9", stats.p999));
    }
    if stats.p9999 > Duration::ZERO {
        rows.push(("p99.99", stats.p9999));
    }
    for (label, value) in rows {
        writeln!(w, "  {:<7} {}", format!("{}:", label), format_duration(value))?;
    }

    if !stats.status_codes.is_empty() {
        writeln!(w, "\nStatus Codes:")?;
        for (code, count) in &stats.status_codes {
            let pct = *count as f64 / stats.total_requests as f64 * 100.0;
            writeln!(w, "  {:<28} {:>8}  {:>5.1}%", status_line(*code), count, pct)?;
        }
    }

    if verbose && !stats.histogram.is_empty() {
        let peak = stats.histogram.values().copied().max().unwrap_or(1).max(1);
        writeln!(w, "\nLatency Histogram:")?;
        for (bucket, count) in &stats.histogram {
            let lower = *bucket as u128 * HISTOGRAM_BUCKET_MS;
            let width = (count * HISTOGRAM_WIDTH).div_ceil(peak);
            writeln!(
                w,
                "  {:>6}-{:<6} {:>8} {}",
                format!("{}ms", lower),
                format!("{}ms", lower + HISTOGRAM_BUCKET_MS),
                count,
                "#".repeat(width)
            )?;
        }
    }

    writeln!(w, "\nThroughput:")?;
    writeln!(w, "  Requests/sec: {:.2}", stats.requests_per_second)?;
    writeln!(w, "  Transferred:  {}", format_bytes(stats.total_bytes))?;
    writeln!(w, "  Bytes/sec:    {}/s", format_bytes(stats.bytes_per_second as u64))?;
    Ok(())
}
