use reqwest::header::{HeaderMap, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use serde::Serialize;

const X_ACCEL_BUFFERING: &str = "x-accel-buffering";

/// What the response headers say about progressive delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamingInfo {
    pub transfer_encoding: String,
    /// `None` when the body length is unknown up front.
    pub content_length: Option<u64>,
    pub content_type: String,
    pub cache_control: String,
    /// nginx buffering control.
    pub x_accel_buffering: String,
    pub is_chunked: bool,
    pub is_streaming_likely: bool,
}

impl StreamingInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let transfer_encoding = joined(headers, TRANSFER_ENCODING.as_str());
        let is_chunked = transfer_encoding
            .split(',')
            .any(|enc| enc.trim().eq_ignore_ascii_case("chunked"));
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let content_type = joined(headers, CONTENT_TYPE.as_str());
        let x_accel_buffering = joined(headers, X_ACCEL_BUFFERING);

        let is_streaming_likely = is_chunked
            || content_length.is_none()
            || content_type.to_ascii_lowercase().contains("stream")
            || x_accel_buffering.eq_ignore_ascii_case("no");

        Self {
            transfer_encoding,
            content_length,
            content_type,
            cache_control: joined(headers, CACHE_CONTROL.as_str()),
            x_accel_buffering,
            is_chunked,
            is_streaming_likely,
        }
    }
}

fn joined(headers: &HeaderMap, name: &str) -> String {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn chunked_transfer_is_streaming() {
        let info = StreamingInfo::from_headers(&headers(&[
            ("transfer-encoding", "Chunked"),
            ("content-type", "application/json"),
        ]));
        assert!(info.is_chunked);
        assert!(info.is_streaming_likely);
        assert_eq!(info.transfer_encoding, "Chunked");
        assert_eq!(info.content_length, None);
    }

    #[test]
    fn fixed_length_json_is_not_streaming() {
        let info = StreamingInfo::from_headers(&headers(&[
            ("content-length", "2048"),
            ("content-type", "application/json"),
            ("cache-control", "no-cache"),
        ]));
        assert!(!info.is_chunked);
        assert!(!info.is_streaming_likely);
        assert_eq!(info.content_length, Some(2048));
        assert_eq!(info.cache_control, "no-cache");
    }

    #[test]
    fn event_stream_content_type_is_streaming() {
        let info = StreamingInfo::from_headers(&headers(&[
            ("content-length", "10"),
            ("content-type", "text/Event-Stream"),
        ]));
        assert!(info.is_streaming_likely);
    }

    #[test]
    fn accel_buffering_off_is_streaming() {
        let info = StreamingInfo::from_headers(&headers(&[
            ("content-length", "10"),
            ("x-accel-buffering", "NO"),
        ]));
        assert_eq!(info.x_accel_buffering, "NO");
        assert!(info.is_streaming_likely);
    }

    #[test]
    fn missing_length_is_streaming() {
        let info = StreamingInfo::from_headers(&HeaderMap::new());
        assert!(info.is_streaming_likely);
        assert!(info.content_type.is_empty());
    }
}
