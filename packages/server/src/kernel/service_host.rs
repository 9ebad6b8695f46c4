//! Long-running services with coordinated shutdown.
//!
//! Each [`Service`] runs on its own task and watches a shared
//! `CancellationToken`. The host cancels the token on ctrl-c and then waits
//! for every service to return.

use anyhow::Result;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// A background service run by the [`ServiceHost`].
#[async_trait::async_trait]
pub trait Service: Send + 'static {
    fn name(&self) -> &'static str;

    /// Run until `shutdown` is cancelled.
    async fn run(self: Box<Self>, shutdown: CancellationToken) -> Result<()>;
}

#[derive(Default)]
pub struct ServiceHost {
    services: Vec<Box<dyn Service>>,
    shutdown: CancellationToken,
}

impl ServiceHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, service: impl Service) -> Self {
        self.services.push(Box::new(service));
        self
    }

    /// Token cancelled when the host shuts down. Clone it to stop other
    /// tasks (e.g. the HTTP server) at the same time.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Start every service, wait for ctrl-c, then drain.
    pub async fn run_until_shutdown(self) -> Result<()> {
        let shutdown = self.shutdown.clone();
        let ctrl_c = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
            }
            ctrl_c.cancel();
        });
        self.run(shutdown).await
    }

    /// Start every service and wait until all of them have returned.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let mut tasks = JoinSet::new();
        for service in self.services {
            let name = service.name();
            let token = shutdown.clone();
            info!(service = name, "starting service");
            tasks.spawn(async move { (name, service.run(token).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => info!(service = name, "service stopped"),
                Ok((name, Err(e))) => {
                    error!(service = name, error = %e, "service failed");
                    shutdown.cancel();
                }
                Err(e) => {
                    error!(error = %e, "service task panicked");
                    shutdown.cancel();
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct Waiter(Arc<AtomicBool>);

    #[async_trait::async_trait]
    impl Service for Waiter {
        fn name(&self) -> &'static str {
            "waiter"
        }

        async fn run(self: Box<Self>, shutdown: CancellationToken) -> Result<()> {
            shutdown.cancelled().await;
            self.0.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_services_stop_when_token_is_cancelled() {
        let stopped = Arc::new(AtomicBool::new(false));
        let host = ServiceHost::new().with_service(Waiter(stopped.clone()));
        let token = host.shutdown_token();

        let handle = tokio::spawn(host.run(token.clone()));
        tokio::task::yield_now().await;
        assert!(!stopped.load(Ordering::SeqCst));

        token.cancel();
        handle.await.unwrap().unwrap();
        assert!(stopped.load(Ordering::SeqCst));
    }
}
