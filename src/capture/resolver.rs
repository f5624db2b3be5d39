use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::error::Error;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::debug;

use super::scope::{RequestScope, Route};

type BoxError = Box<dyn Error + Send + Sync>;

/// DNS resolver that times each lookup and follows the route of the request
/// in scope.
///
/// The client only resolves when it opens a new connection, so a request that
/// reuses a pooled connection reports zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimedResolver;

impl TimedResolver {
    pub fn new() -> Self {
        Self
    }
}

impl Resolve for TimedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        // Taken here, while the request's own task drives the connector.
        let scope = RequestScope::current();
        Box::pin(resolve(scope, name.as_str().to_string()))
    }
}

async fn resolve(scope: Option<RequestScope>, host: String) -> Result<Addrs, BoxError> {
    let route = scope.as_ref().and_then(|s| s.route_for(&host)).cloned();
    let addrs = match route {
        Some(Route::Pinned(addr)) => {
            debug!(host = %host, addr = %addr, "pinned address");
            vec![addr]
        }
        Some(Route::Redirected { host: target, port }) => {
            debug!(host = %host, target = %target, port, "connect-to");
            lookup(scope.as_ref(), &target, port).await?
        }
        None => lookup(scope.as_ref(), &host, 0).await?,
    };
    Ok(Box::new(addrs.into_iter()))
}

async fn lookup(
    scope: Option<&RequestScope>,
    host: &str,
    port: u16,
) -> Result<Vec<SocketAddr>, BoxError> {
    let start = Instant::now();
    let result = tokio::net::lookup_host((host, port)).await;
    let elapsed = start.elapsed();
    if let Some(scope) = scope {
        scope.record_dns(elapsed);
    }
    debug!(host = %host, elapsed_ms = elapsed.as_millis() as u64, "dns lookup");

    Ok(result?.collect())
}
