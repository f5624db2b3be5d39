//! Parsers for command-line values.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::error::ConfigError;

/// A `--resolve host:port:addr` entry pinning a host to an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOverride {
    pub host: String,
    pub addr: SocketAddr,
}

/// A `--connect-to host:port:target_host:target_port` entry sending
/// connections for one authority to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTo {
    pub host: String,
    pub port: u16,
    pub target_host: String,
    pub target_port: u16,
}

/// Parses `Key: Value` header arguments.
pub fn parse_headers(raw: &[String]) -> Result<Vec<(String, String)>, ConfigError> {
    raw.iter()
        .map(|entry| {
            let (key, value) = entry
                .split_once(':')
                .ok_or_else(|| ConfigError::InvalidHeader(entry.clone()))?;
            let key = key.trim();
            if key.is_empty() || key.contains(char::is_whitespace) {
                return Err(ConfigError::InvalidHeader(entry.clone()));
            }
            Ok((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Parses a `host:port:addr` entry. IPv6 addresses may be bracketed.
pub fn parse_resolve(entry: &str) -> Result<ResolveOverride, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidResolve {
        entry: entry.to_string(),
        reason: reason.to_string(),
    };

    let mut parts = entry.splitn(3, ':');
    let host = parts.next().unwrap_or_default().trim();
    let port = parts.next().unwrap_or_default().trim();
    let addr = parts.next().unwrap_or_default().trim();
    if host.is_empty() || port.is_empty() || addr.is_empty() {
        return Err(invalid("expected host:port:addr"));
    }

    let port: u16 = port.parse().map_err(|_| invalid("port must be a number"))?;
    let ip: IpAddr = addr
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .map_err(|_| invalid("address must be an IP address"))?;

    Ok(ResolveOverride {
        host: host.to_string(),
        addr: SocketAddr::new(ip, port),
    })
}

/// Parses a `host:port:target_host:target_port` entry. Fields are trimmed.
pub fn parse_connect_to(entry: &str) -> Result<ConnectTo, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidConnectTo {
        entry: entry.to_string(),
        reason: reason.to_string(),
    };

    let parts: Vec<&str> = entry.splitn(4, ':').map(str::trim).collect();
    let &[host, port, target_host, target_port] = parts.as_slice() else {
        return Err(invalid("expected host1:port1:host2:port2"));
    };
    if [host, port, target_host, target_port].iter().any(|p| p.is_empty()) {
        return Err(invalid("all fields must be non-empty"));
    }

    let port_number = |raw: &str| match raw.parse::<u16>() {
        Ok(0) | Err(_) => Err(invalid("ports must be numbers between 1 and 65535")),
        Ok(port) => Ok(port),
    };

    Ok(ConnectTo {
        host: host.to_ascii_lowercase(),
        port: port_number(port)?,
        target_host: target_host.to_string(),
        target_port: port_number(target_port)?,
    })
}

/// Parses durations such as `500ms`, `30s`, `2m`, `1.5s` or `1m30s`.
/// A bare `0` is accepted.
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(raw.to_string());
    let s = raw.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_end == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_end].parse().map_err(|_| invalid())?;
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_end..];

        let nanos = (value * nanos_per_unit).round();
        if !nanos.is_finite() || nanos >= u64::MAX as f64 {
            return Err(invalid());
        }
        total += Duration::from_nanos(nanos as u64);
    }

    Ok(total)
}
