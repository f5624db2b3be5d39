//! Per-request connection bookkeeping.
//!
//! The client resolves and connects from inside the future of the request
//! that needs a new connection. [`RequestScope::run`] makes a scope visible to
//! that future through a task-local, so the resolver and the connector layer
//! charge their timings to the request that triggered them, and read the
//! route that request should take.

use parking_lot::Mutex;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

tokio::task_local! {
    static CURRENT: RequestScope;
}

/// Where a connection for the request's host goes instead of its DNS answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Skip DNS and connect to this address.
    Pinned(SocketAddr),
    /// Resolve another host and connect to its port.
    Redirected { host: String, port: u16 },
}

/// Connection phases observed while a request was in scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionPhases {
    pub dns_lookup: Duration,
    /// Time spent in the connector, DNS included.
    pub connect: Duration,
    pub connections: usize,
}

impl ConnectionPhases {
    /// Connect time without the DNS lookup: TCP, plus TLS for https.
    pub fn handshake(&self) -> Duration {
        self.connect.saturating_sub(self.dns_lookup)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    phases: Arc<Mutex<ConnectionPhases>>,
    route: Option<(String, Route)>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes connections to `host` made while this scope is current.
    pub fn with_route(mut self, host: &str, route: Route) -> Self {
        self.route = Some((host.to_ascii_lowercase(), route));
        self
    }

    pub fn phases(&self) -> ConnectionPhases {
        *self.phases.lock()
    }

    /// Polls `future` with this scope current.
    pub async fn run<F: Future>(&self, future: F) -> F::Output {
        CURRENT.scope(self.clone(), future).await
    }

    /// The scope of the request being polled, if any. Connections finished
    /// in the background after their request moved on have none.
    pub(crate) fn current() -> Option<RequestScope> {
        CURRENT.try_with(Clone::clone).ok()
    }

    pub(crate) fn route_for(&self, host: &str) -> Option<&Route> {
        match &self.route {
            Some((routed, route)) if routed.eq_ignore_ascii_case(host) => Some(route),
            _ => None,
        }
    }

    pub(crate) fn record_dns(&self, elapsed: Duration) {
        self.phases.lock().dns_lookup += elapsed;
    }

    pub(crate) fn record_connect(&self, elapsed: Duration) {
        let mut phases = self.phases.lock();
        phases.connect += elapsed;
        phases.connections += 1;
    }
}
