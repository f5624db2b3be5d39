//! Per-request measurement shared by the capture, the collector and the reports.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::streaming::StreamReport;

/// Serializes a [`Duration`] as whole milliseconds.
pub(crate) mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}

/// One measured HTTP exchange.
///
/// Phase durations reflect whatever was captured before a failure, so a
/// sample with `error` set may still carry a non-zero `dns_lookup` or `total`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TimingSample {
    #[serde(with = "duration_ms")]
    pub dns_lookup: Duration,
    /// TCP connect, plus the TLS handshake when `tls_handshake` was not
    /// measured on its own.
    #[serde(with = "duration_ms")]
    pub tcp_connection: Duration,
    #[serde(with = "duration_ms")]
    pub tls_handshake: Duration,
    #[serde(with = "duration_ms")]
    pub server_processing: Duration,
    #[serde(with = "duration_ms")]
    pub content_transfer: Duration,
    #[serde(with = "duration_ms")]
    pub time_to_first_byte: Duration,
    #[serde(with = "duration_ms")]
    pub total: Duration,

    /// The exchange ran over TLS.
    pub secure: bool,

    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    pub response_size: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub protocol: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub response_headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,

    /// Transport or protocol failure; `None` means the exchange completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Chunk-level delivery report, present only for streaming measurements.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming: Option<StreamReport>,
}

impl TimingSample {
    /// A sample for an exchange that failed after `total` elapsed.
    pub fn failed(error: impl Into<String>, total: Duration) -> Self {
        Self {
            total,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Sum of the connection-setup phases.
    pub fn connection_setup(&self) -> Duration {
        self.dns_lookup + self.tcp_connection + self.tls_handshake
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_serialize_as_milliseconds() {
        let sample = TimingSample {
            dns_lookup: Duration::from_micros(12_700),
            total: Duration::from_millis(250),
            status_code: 200,
            ..Default::default()
        };

        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["dns_lookup"], 12);
        assert_eq!(json["total"], 250);
        assert_eq!(json["status_code"], 200);
        assert!(json.get("error").is_none());
        assert!(json.get("streaming").is_none());
        assert!(json.get("response_headers").is_none());
    }

    #[test]
    fn failed_sample_carries_error() {
        let sample = TimingSample::failed("connection refused", Duration::from_millis(3));
        assert!(!sample.is_success());
        assert_eq!(sample.total, Duration::from_millis(3));
        assert_eq!(sample.status_code, 0);

        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["error"], "connection refused");
    }

    #[test]
    fn connection_setup_sums_phases() {
        let sample = TimingSample {
            dns_lookup: Duration::from_millis(5),
            tcp_connection: Duration::from_millis(10),
            tls_handshake: Duration::from_millis(20),
            ..Default::default()
        };
        assert_eq!(sample.connection_setup(), Duration::from_millis(35));
    }
}
