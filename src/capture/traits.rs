//! The seam between the load generator and the network.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::sample::TimingSample;

/// Everything needed to issue one request, minus the target.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// The same request aimed at another URL.
    pub fn with_url(&self, url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..self.clone()
        }
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

/// Measures HTTP exchanges.
///
/// Implementations never fail: transport errors are reported through
/// [`TimingSample::error`] together with whatever phases were captured.
#[async_trait]
pub trait TimingCapture: Send + Sync {
    /// Returns the name of this capture.
    fn name(&self) -> &'static str;

    /// Performs one exchange and drains the body.
    async fn measure(&self, request: &Request) -> TimingSample;

    /// Like [`TimingCapture::measure`], additionally attaching a chunk-level
    /// [`StreamReport`](crate::streaming::StreamReport).
    async fn measure_streaming(&self, request: &Request, _stall_threshold: Duration) -> TimingSample {
        self.measure(request).await
    }
}
