use bytes::Bytes;
use chrono::Utc;
use futures::Stream;
use std::io::{self, Read};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use super::{ChunkTiming, StreamReport};

/// Decorates a body source and timestamps every non-empty read.
///
/// Works over blocking [`Read`] sources and over byte streams such as
/// `reqwest::Response::bytes_stream`. Only the owner of the reader appends
/// chunks; [`StreamingReader::report`] takes a snapshot.
pub struct StreamingReader<R> {
    inner: R,
    started: Instant,
    last_read: Instant,
    finished: Option<Instant>,
    chunks: Vec<ChunkTiming>,
    total_bytes: u64,
    protocol: String,
}

impl<R> StreamingReader<R> {
    pub fn new(inner: R) -> Self {
        let now = Instant::now();
        Self {
            inner,
            started: now,
            last_read: now,
            finished: None,
            chunks: Vec::new(),
            total_bytes: 0,
            protocol: String::new(),
        }
    }

    /// Protocol label copied into the report, e.g. `HTTP/1.1`.
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    fn observe(&mut self, n: usize) {
        let now = Instant::now();
        let interval = now.duration_since(self.last_read).as_secs_f64();
        let throughput_mbps = if interval > 0.0 {
            (n as f64 * 8.0) / interval / 1e6
        } else {
            0.0
        };

        self.chunks.push(ChunkTiming {
            sequence_number: self.chunks.len(),
            size: n,
            elapsed: now.duration_since(self.started),
            timestamp: Utc::now(),
            throughput_mbps,
        });
        self.total_bytes += n as u64;
        self.last_read = now;
    }

    fn mark_finished(&mut self) {
        if self.finished.is_none() {
            self.finished = Some(Instant::now());
        }
    }

    pub fn chunks(&self) -> &[ChunkTiming] {
        &self.chunks
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Snapshot of the chunk timeline, without buffering analysis.
    ///
    /// Throughput is measured up to end-of-stream. For a stream that was not
    /// drained it falls back to the last chunk, then to now.
    pub fn report(&self) -> StreamReport {
        let total_chunks = self.chunks.len();
        let window = match (self.finished, self.chunks.last()) {
            (Some(end), _) => end.duration_since(self.started),
            (None, Some(last)) => last.elapsed,
            (None, None) => self.started.elapsed(),
        };
        let bytes_per_second = if window > Duration::ZERO {
            self.total_bytes as f64 / window.as_secs_f64()
        } else {
            0.0
        };

        StreamReport {
            chunk_timings: self.chunks.clone(),
            bytes_per_second,
            first_chunk_time: self.chunks.first().map(|c| c.elapsed).unwrap_or_default(),
            last_chunk_time: self.chunks.last().map(|c| c.elapsed).unwrap_or_default(),
            total_chunks,
            total_bytes: self.total_bytes,
            average_chunk_size: if total_chunks > 0 {
                self.total_bytes / total_chunks as u64
            } else {
                0
            },
            protocol: self.protocol.clone(),
            ..Default::default()
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for StreamingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.observe(n);
        } else if !buf.is_empty() {
            self.mark_finished();
        }
        Ok(n)
    }
}

impl<S, E> Stream for StreamingReader<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) if bytes.is_empty() => continue,
                Poll::Ready(Some(Ok(bytes))) => {
                    this.observe(bytes.len());
                    return Poll::Ready(Some(Ok(bytes)));
                }
                Poll::Ready(None) => {
                    this.mark_finished();
                    return Poll::Ready(None);
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::StreamExt;
    use std::thread;

    /// Yields at most `step` bytes per read, sleeping before each one.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            thread::sleep(Duration::from_millis(1));
            let end = (self.pos + self.step.min(buf.len())).min(self.data.len());
            let n = end - self.pos;
            buf[..n].copy_from_slice(&self.data[self.pos..end]);
            self.pos = end;
            Ok(n)
        }
    }

    #[test]
    fn one_chunk_per_non_empty_read() {
        let source = Trickle {
            data: vec![7u8; 53],
            pos: 0,
            step: 10,
        };
        let mut reader = StreamingReader::new(source).with_protocol("HTTP/1.1");
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();

        assert_eq!(out.len(), 53);
        let report = reader.report();
        assert_eq!(report.total_chunks, 6);
        assert_eq!(report.total_bytes, 53);
        assert_eq!(report.average_chunk_size, 8);
        assert_eq!(report.protocol, "HTTP/1.1");
        assert_eq!(report.chunk_timings.last().unwrap().size, 3);
        assert!(report.bytes_per_second > 0.0);

        for (i, chunk) in report.chunk_timings.iter().enumerate() {
            assert_eq!(chunk.sequence_number, i);
        }
        for pair in report.chunk_timings.windows(2) {
            assert!(pair[1].elapsed >= pair[0].elapsed);
        }
        assert_eq!(report.first_chunk_time, report.chunk_timings[0].elapsed);
        assert_eq!(report.last_chunk_time, report.chunk_timings[5].elapsed);
    }

    fn trickle(len: usize, step: usize) -> Trickle {
        Trickle {
            data: vec![1u8; len],
            pos: 0,
            step,
        }
    }

    #[test]
    fn throughput_window_is_fixed_at_end_of_stream() {
        let mut reader = StreamingReader::new(trickle(40, 10));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();

        let drained = reader.report().bytes_per_second;
        assert!(drained > 0.0);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(reader.report().bytes_per_second, drained);
    }

    #[test]
    fn undrained_window_ends_at_last_chunk() {
        let mut reader = StreamingReader::new(trickle(40, 10));
        let mut buf = [0u8; 10];
        reader.read_exact(&mut buf).unwrap();
        reader.read_exact(&mut buf).unwrap();

        thread::sleep(Duration::from_millis(30));
        let report = reader.report();
        let last = report.chunk_timings[1].elapsed;
        assert_eq!(report.total_chunks, 2);
        assert_eq!(report.bytes_per_second, 20.0 / last.as_secs_f64());
    }

    #[test]
    fn chunk_throughput_uses_time_since_previous_read() {
        let mut reader = StreamingReader::new(trickle(50, 10));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();

        let mut previous = Duration::ZERO;
        for chunk in reader.chunks() {
            let interval = (chunk.elapsed - previous).as_secs_f64();
            let expected = chunk.size as f64 * 8.0 / interval / 1e6;
            assert!(chunk.throughput_mbps > 0.0);
            // every read sleeps at least 1ms first
            assert!(chunk.throughput_mbps <= chunk.size as f64 * 8.0 / 1e3);
            assert!((chunk.throughput_mbps - expected).abs() < expected * 0.05);
            previous = chunk.elapsed;
        }
    }

    #[test]
    fn zero_interval_reports_zero_throughput() {
        let mut reader = StreamingReader::new(io::empty());
        // the interval saturates to zero
        reader.last_read = Instant::now() + Duration::from_secs(60);
        reader.observe(10);

        assert_eq!(reader.chunks()[0].throughput_mbps, 0.0);
        assert_eq!(reader.total_bytes(), 10);
    }

    #[test]
    fn empty_source_has_no_chunks() {
        let mut reader = StreamingReader::new(io::empty());
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();

        let report = reader.report();
        assert_eq!(report.total_chunks, 0);
        assert_eq!(report.total_bytes, 0);
        assert_eq!(report.average_chunk_size, 0);
        assert_eq!(report.first_chunk_time, Duration::ZERO);
    }

    #[test]
    fn stream_skips_empty_frames() {
        let frames: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"data: one\n\n")),
            Ok(Bytes::new()),
            Ok(Bytes::from_static(b"data: two\n\n")),
            Ok(Bytes::from_static(b"data: three\n\n")),
        ];
        let mut reader = StreamingReader::new(futures::stream::iter(frames));

        let received = block_on(async {
            let mut received = Vec::new();
            while let Some(frame) = reader.next().await {
                received.push(frame.unwrap());
            }
            received
        });

        assert_eq!(received.len(), 3);
        assert_eq!(StreamingReader::chunks(&reader).len(), 3);
        assert_eq!(reader.total_bytes(), 11 + 11 + 13);
        assert_eq!(reader.report().total_chunks, 3);
    }

    #[test]
    fn stream_errors_pass_through_unrecorded() {
        let frames: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        let mut reader = StreamingReader::new(futures::stream::iter(frames));

        block_on(async {
            assert!(reader.next().await.unwrap().is_ok());
            assert!(reader.next().await.unwrap().is_err());
        });
        assert_eq!(StreamingReader::chunks(&reader).len(), 1);
        assert_eq!(reader.total_bytes(), 3);
    }
}
