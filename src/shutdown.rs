//! Interrupt handling: stop taking jobs, then force-exit after a grace period.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::warn;

/// Time allowed for in-flight requests after an interrupt.
pub const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Cloneable stop flag shared with the load workers.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}

/// Spawns a task on `runtime` that triggers `shutdown` on Ctrl-C or SIGTERM
/// and exits the process with status 1 once [`GRACE_PERIOD`] has passed.
pub fn install(runtime: &Runtime, shutdown: Shutdown) {
    runtime.spawn(async move {
        let signal = wait_for_signal().await;
        eprintln!("\n\nReceived {}, shutting down gracefully...", signal);
        warn!(signal, "interrupt received, no new requests will start");
        shutdown.trigger();

        tokio::time::sleep(GRACE_PERIOD).await;
        eprintln!("Forced shutdown after timeout");
        std::process::exit(1);
    });
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM");
            let _ = tokio::signal::ctrl_c().await;
            return "interrupt";
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "interrupt",
        _ = terminate.recv() => "terminate",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "interrupt"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_is_shared_between_clones() {
        let shutdown = Shutdown::new();
        let worker_view = shutdown.clone();
        assert!(!worker_view.is_triggered());

        shutdown.trigger();
        assert!(worker_view.is_triggered());
    }
}
