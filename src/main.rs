//! HTTP Benchmark
//!
//! Measures the timing phases of single HTTP requests and runs concurrent
//! load tests against one or more URLs.
//!
//! Modes:
//! - Single request (`-n 1`, one URL): phase breakdown, optional chunk-level
//!   streaming analysis
//! - Load test: latency percentiles, status codes, throughput

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::warn;

use http_benchmark::capture::{CaptureOptions, HttpCapture, Request, TimingCapture};
use http_benchmark::config::{
    parse_connect_to, parse_duration, parse_headers, parse_resolve, ConnectTo, ResolveOverride,
};
use http_benchmark::report::{self, OutputFormat};
use http_benchmark::shutdown::{self, Shutdown};
use http_benchmark::urls::{read_url_file, read_url_stdin};
use http_benchmark::{Collector, ConfigError, LoadConfig, LoadGenerator, TimingSample};

extern crate jemallocator;

#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

/// HTTP benchmark configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "http-benchmark", version)]
#[command(about = "Measure HTTP request timing, streaming delivery and load behavior")]
pub struct Config {
    /// Target URLs
    pub url: Vec<String>,

    /// Number of requests per URL
    #[arg(short = 'n', long, default_value_t = 1)]
    pub requests: usize,

    /// Concurrent workers
    #[arg(short, long, default_value_t = 1)]
    pub concurrency: usize,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Request header as 'Key: Value' (repeatable)
    #[arg(short = 'H', long)]
    pub header: Vec<String>,

    /// Request body
    #[arg(long)]
    pub data: Option<String>,

    /// Per-request timeout (e.g. 500ms, 30s, 2m)
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub timeout: Duration,

    /// Accept invalid TLS certificates
    #[arg(short = 'k', long, default_value_t = false)]
    pub insecure: bool,

    /// File with one URL per line, '-' for stdin
    #[arg(short = 'L', long)]
    pub url_list: Option<PathBuf>,

    /// Read URLs from stdin
    #[arg(long, default_value_t = false)]
    pub stdin: bool,

    /// Include response headers in the output
    #[arg(short = 'i', long, default_value_t = false)]
    pub include: bool,

    /// Send a HEAD request and show the headers
    #[arg(short = 'I', long, default_value_t = false)]
    pub head: bool,

    /// Show the response body
    #[arg(long, default_value_t = false)]
    pub show_body: bool,

    /// Show the response body for 4xx and 5xx responses
    #[arg(long, default_value_t = false)]
    pub show_error: bool,

    /// Record chunk-level timing of the response body
    #[arg(long, default_value_t = false)]
    pub streaming: bool,

    /// Fail unless the response is delivered progressively (implies --streaming)
    #[arg(long, default_value_t = false)]
    pub expect_streaming: bool,

    /// Inter-chunk gap reported as a stall
    #[arg(long, default_value = "500ms", value_parser = parse_duration)]
    pub stall_threshold: Duration,

    /// Pin host:port to an address, as host:port:addr (repeatable)
    #[arg(long, value_parser = parse_resolve)]
    pub resolve: Vec<ResolveOverride>,

    /// Connect to another host:port instead, as host1:port1:host2:port2 (repeatable)
    #[arg(long, value_parser = parse_connect_to)]
    pub connect_to: Vec<ConnectTo>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    /// Show additional details
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Only print results and errors
    #[arg(short, long, default_value_t = false)]
    pub quiet: bool,
}

impl Config {
    fn normalize(&mut self) {
        if self.head {
            self.method = "HEAD".to_string();
            self.include = true;
        }
        if self.expect_streaming {
            self.streaming = true;
        }
    }

    fn show_banners(&self) -> bool {
        self.output == OutputFormat::Table && !self.quiet
    }

    fn collect_urls(&self) -> Result<Vec<String>> {
        let mut urls = self.url.clone();
        match &self.url_list {
            Some(path) if path.as_os_str() == "-" => urls.extend(read_url_stdin()?),
            Some(path) => urls.extend(read_url_file(path)?),
            None => {}
        }
        if self.stdin {
            urls.extend(read_url_stdin()?);
        }
        if urls.is_empty() {
            return Err(ConfigError::NoUrls.into());
        }
        Ok(urls)
    }

    fn request(&self) -> Result<Request> {
        Ok(Request {
            url: String::new(),
            method: self.method.to_ascii_uppercase(),
            headers: parse_headers(&self.header)?,
            body: self.data.clone().map(Bytes::from),
        })
    }
}

fn run_single(
    config: &Config,
    runtime: &Runtime,
    capture: &HttpCapture,
    request: &Request,
) -> Result<()> {
    if config.show_banners() {
        println!("\n{}", "=".repeat(60));
        println!("Request: {} {}", request.method, request.url);
        println!("{}", "=".repeat(60));
    }

    let sample: TimingSample = if config.streaming {
        runtime.block_on(capture.measure_streaming(request, config.stall_threshold))
    } else {
        runtime.block_on(capture.measure(request))
    };

    let mut stdout = io::stdout().lock();
    match config.output {
        OutputFormat::Table => report::write_sample(&mut stdout, &sample, config.verbose)?,
        OutputFormat::Json => report::write_json(&mut stdout, &sample)?,
    }
    stdout.flush()?;

    if config.expect_streaming && sample.is_success() {
        let Some(stream) = &sample.streaming else {
            bail!("streaming validation failed: no streaming report captured");
        };
        stream.validate_streaming()?;
        if !config.quiet {
            if let Some(analysis) = &stream.buffering_analysis {
                println!(
                    "\nStreaming validation passed (pattern: {}, CV: {:.2}, {} chunks)",
                    analysis.chunk_pattern, analysis.cv, stream.total_chunks
                );
            }
        }
    }

    if let Some(error) = &sample.error {
        bail!("request error: {}", error);
    }
    Ok(())
}

fn run_load(
    config: &Config,
    runtime: Arc<Runtime>,
    capture: HttpCapture,
    load: &LoadConfig,
    shutdown: Shutdown,
) -> Result<()> {
    if config.streaming {
        warn!("--streaming applies to single requests only; ignored in load mode");
    }

    if config.show_banners() {
        println!("\n{}", "=".repeat(60));
        println!("Load Test");
        println!("{}", "=".repeat(60));
        println!("\nConfiguration:");
        println!("  URLs: {}", load.urls.len());
        println!("  Requests per URL: {}", load.requests_per_url);
        println!("  Total requests: {}", load.total_jobs());
        println!("  Concurrency: {}", load.concurrency);
        println!("  Method: {}", load.request.method);
        println!("  Timeout: {}", report::format_duration(config.timeout));
        println!();
    }

    let collector = Arc::new(Collector::new());
    let generator = LoadGenerator::new(Arc::new(capture), collector.clone(), runtime)
        .with_shutdown(shutdown)
        .with_progress(config.show_banners());
    let summary = generator.run(load)?;

    let stats = collector.calculate();
    let mut stdout = io::stdout().lock();
    match config.output {
        OutputFormat::Table => {
            if !config.quiet {
                report::banner(&mut stdout, "LOAD TEST RESULTS")?;
            }
            if summary.interrupted() {
                writeln!(
                    stdout,
                    "\nInterrupted: {} of {} requests completed",
                    summary.completed, summary.dispatched
                )?;
            }
            report::write_stats(&mut stdout, &stats, config.verbose)?;
        }
        OutputFormat::Json => report::write_json(&mut stdout, &stats)?,
    }
    stdout.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let mut config = Config::parse();
    config.normalize();

    let urls = config.collect_urls()?;
    let request = config.request()?;
    let load = LoadConfig {
        urls,
        requests_per_url: config.requests,
        concurrency: config.concurrency,
        request,
    };
    load.validate()?;

    let single = load.requests_per_url == 1 && load.urls.len() == 1;

    let runtime = Arc::new(
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to build tokio runtime")?,
    );
    let shutdown = Shutdown::new();
    shutdown::install(&runtime, shutdown.clone());

    let capture = HttpCapture::new(CaptureOptions {
        timeout: config.timeout,
        insecure: config.insecure,
        include_headers: config.include,
        show_body: config.show_body,
        show_error_body: config.show_error,
        reuse_connections: !single,
        max_idle_per_host: config.concurrency,
        resolve: config.resolve.clone(),
        connect_to: config.connect_to.clone(),
    })
    .context("Failed to build HTTP client")?;

    if single {
        let request = load.request.with_url(&load.urls[0]);
        run_single(&config, &runtime, &capture, &request)
    } else {
        run_load(&config, runtime, capture, &load, shutdown)
    }
}
