//! Timing capture over a `reqwest` client.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::{Client, Method, Response, Url};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::connector::ConnectTimingLayer;
use super::resolver::TimedResolver;
use super::scope::{ConnectionPhases, RequestScope, Route};
use super::traits::{Request, TimingCapture};
use crate::config::{ConnectTo, ResolveOverride};
use crate::sample::TimingSample;
use crate::streaming::{StreamingInfo, StreamingReader};

pub const DEFAULT_USER_AGENT: &str = concat!("http-benchmark/", env!("CARGO_PKG_VERSION"));
pub const MAX_REDIRECTS: usize = 10;

/// Client behavior for one run.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Per-request timeout covering the whole exchange including the body.
    pub timeout: Duration,
    /// Accept invalid TLS certificates.
    pub insecure: bool,
    pub include_headers: bool,
    pub show_body: bool,
    /// Keep the body of responses with status >= 400.
    pub show_error_body: bool,
    /// Pool connections between requests. Off for single requests so that
    /// connection setup is part of the measurement.
    pub reuse_connections: bool,
    pub max_idle_per_host: usize,
    pub resolve: Vec<ResolveOverride>,
    /// Checked before `resolve`, as curl does.
    pub connect_to: Vec<ConnectTo>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            insecure: false,
            include_headers: false,
            show_body: false,
            show_error_body: false,
            reuse_connections: true,
            max_idle_per_host: 1,
            resolve: Vec::new(),
            connect_to: Vec::new(),
        }
    }
}

/// Measures real HTTP exchanges.
pub struct HttpCapture {
    client: Client,
    options: CaptureOptions,
}

impl HttpCapture {
    pub fn new(options: CaptureOptions) -> reqwest::Result<Self> {
        let max_idle = if options.reuse_connections {
            options.max_idle_per_host.max(1)
        } else {
            0
        };

        let mut builder = Client::builder()
            .timeout(options.timeout)
            .danger_accept_invalid_certs(options.insecure)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .dns_resolver(Arc::new(TimedResolver::new()))
            .connector_layer(ConnectTimingLayer)
            .pool_max_idle_per_host(max_idle);

        Ok(Self {
            client: builder.build()?,
            options,
        })
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    async fn execute(&self, request: &Request, stall_threshold: Option<Duration>) -> TimingSample {
        let start = Instant::now();

        let method = match Method::from_bytes(request.method.as_bytes()) {
            Ok(method) => method,
            Err(e) => return TimingSample::failed(describe(e), start.elapsed()),
        };
        let url = Url::parse(&request.url).ok();
        let scope = match url.as_ref().map(|url| self.scope_for(url)) {
            Some(Ok(scope)) => scope,
            Some(Err(e)) => return TimingSample::failed(e, start.elapsed()),
            None => RequestScope::new(),
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.has_header(USER_AGENT.as_str()) {
            builder = builder.header(USER_AGENT, DEFAULT_USER_AGENT);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = scope.run(builder.send()).await;
        let time_to_first_byte = start.elapsed();
        let phases = scope.phases();
        let secure = url.is_some_and(|url| url.scheme() == "https");

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %request.url, error = %e, "request failed");
                let mut sample = TimingSample::failed(describe(e), time_to_first_byte);
                apply_phases(&mut sample, &phases, secure);
                return sample;
            }
        };

        let mut sample = TimingSample {
            time_to_first_byte,
            status_code: response.status().as_u16(),
            protocol: format!("{:?}", response.version()),
            content_length: content_length(response.headers()),
            ..Default::default()
        };
        apply_phases(&mut sample, &phases, response.url().scheme() == "https");
        sample.server_processing = time_to_first_byte.saturating_sub(sample.connection_setup());
        if self.options.include_headers {
            sample.response_headers = header_map(response.headers());
        }

        let keep_body = self.options.show_body
            || (self.options.show_error_body && sample.status_code >= 400);
        let body_start = Instant::now();

        match stall_threshold {
            Some(threshold) => {
                let info = StreamingInfo::from_headers(response.headers());
                let mut reader = StreamingReader::new(Box::pin(response.bytes_stream()))
                    .with_protocol(sample.protocol.clone());
                let drained = drain(&mut reader, keep_body).await;
                drained.apply(&mut sample);

                let mut report = reader.report().with_analysis(threshold);
                report.streaming_info = Some(info);
                sample.streaming = Some(report);
            }
            None => {
                drain_response(response, keep_body).await.apply(&mut sample);
            }
        }

        sample.content_transfer = body_start.elapsed();
        sample.total = start.elapsed();
        sample
    }
}

impl HttpCapture {
    /// Scope for one request, carrying the `--connect-to` or `--resolve`
    /// route that matches its host and port.
    fn scope_for(&self, url: &Url) -> Result<RequestScope, String> {
        let scope = RequestScope::new();
        let (Some(host), Some(port)) = (url.host_str(), url.port_or_known_default()) else {
            return Ok(scope);
        };

        let connect_to = self
            .options
            .connect_to
            .iter()
            .find(|rule| rule.host.eq_ignore_ascii_case(host) && rule.port == port);
        if let Some(rule) = connect_to {
            // The client always dials the port written in the URL.
            if url.port().is_some() && rule.target_port != port {
                return Err(format!(
                    "--connect-to {}:{} cannot move the explicit port in {} to {}",
                    rule.host, rule.port, url, rule.target_port
                ));
            }
            let route = Route::Redirected {
                host: rule.target_host.clone(),
                port: rule.target_port,
            };
            return Ok(scope.with_route(host, route));
        }

        let pinned = self
            .options
            .resolve
            .iter()
            .find(|entry| entry.host.eq_ignore_ascii_case(host) && entry.addr.port() == port);
        Ok(match pinned {
            Some(entry) => scope.with_route(host, Route::Pinned(entry.addr)),
            None => scope,
        })
    }
}

/// Fills the connection phases. With TLS the handshake cannot be told apart
/// from the TCP connect, so both land in `tcp_connection`.
fn apply_phases(sample: &mut TimingSample, phases: &ConnectionPhases, secure: bool) {
    sample.dns_lookup = phases.dns_lookup;
    sample.tcp_connection = phases.handshake();
    sample.secure = secure;
}

#[async_trait]
impl TimingCapture for HttpCapture {
    fn name(&self) -> &'static str {
        "reqwest"
    }

    async fn measure(&self, request: &Request) -> TimingSample {
        self.execute(request, None).await
    }

    async fn measure_streaming(&self, request: &Request, stall_threshold: Duration) -> TimingSample {
        self.execute(request, Some(stall_threshold)).await
    }
}

/// What was read from a body before it ended or failed.
struct Drained {
    size: u64,
    body: Option<Vec<u8>>,
    error: Option<String>,
}

impl Drained {
    fn apply(self, sample: &mut TimingSample) {
        sample.response_size = self.size;
        sample.response_body = self.body.map(|b| String::from_utf8_lossy(&b).into_owned());
        sample.error = self.error;
    }
}

async fn drain_response(response: Response, keep_body: bool) -> Drained {
    drain(&mut Box::pin(response.bytes_stream()), keep_body).await
}

async fn drain<S>(stream: &mut S, keep_body: bool) -> Drained
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    let mut drained = Drained {
        size: 0,
        body: keep_body.then(Vec::new),
        error: None,
    };

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(bytes) => {
                drained.size += bytes.len() as u64;
                if let Some(body) = drained.body.as_mut() {
                    body.extend_from_slice(&bytes);
                }
            }
            Err(e) => {
                drained.error = Some(describe(e));
                break;
            }
        }
    }

    drained
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    map
}

/// Error text including every source, e.g. `error sending request: connection refused`.
fn describe(e: impl std::error::Error + Send + Sync + 'static) -> String {
    format!("{:#}", anyhow::Error::new(e))
}
