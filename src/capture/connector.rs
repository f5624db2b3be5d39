use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};

use super::scope::RequestScope;

/// Connector layer timing every connection the client opens, DNS lookup,
/// TCP connect and TLS handshake together, for the request in scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectTimingLayer;

impl<S> Layer<S> for ConnectTimingLayer {
    type Service = ConnectTiming<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ConnectTiming { inner }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectTiming<S> {
    inner: S,
}

impl<S, R> Service<R> for ConnectTiming<S>
where
    S: Service<R> + 'static,
    S::Future: Send + 'static,
    R: 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: R) -> Self::Future {
        let scope = RequestScope::current();
        let start = Instant::now();
        let connecting = self.inner.call(request);

        Box::pin(async move {
            let result = connecting.await;
            if let Some(scope) = scope {
                scope.record_connect(start.elapsed());
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn connect_time_is_charged_to_the_scope() {
        let inner = tower::service_fn(|delay: Duration| async move {
            tokio::time::sleep(delay).await;
            Ok::<_, std::convert::Infallible>(())
        });
        let mut service = ConnectTimingLayer.layer(inner);

        let scope = RequestScope::new();
        scope
            .run(async { service.call(Duration::from_millis(20)).await })
            .await
            .unwrap();

        let phases = scope.phases();
        assert_eq!(phases.connections, 1);
        assert!(phases.connect >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn connections_outside_a_scope_are_not_recorded() {
        let inner = tower::service_fn(|_: ()| async { Ok::<_, std::convert::Infallible>(()) });
        let mut service = ConnectTimingLayer.layer(inner);

        let scope = RequestScope::new();
        let connecting = service.call(());
        scope.run(connecting).await.unwrap();

        assert_eq!(scope.phases().connections, 0);
    }
}
