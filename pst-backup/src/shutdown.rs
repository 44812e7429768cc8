//! Cancellation of the running job on SIGINT and SIGTERM.
//!
//! The first signal cancels the job token; the pipeline then aborts the
//! upload session or kills the compressor in flight before it returns.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Shutdown coordinator
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Token cancelled on the first signal
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for SIGTERM or SIGINT, then cancel the job
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    error!("Failed to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), cancelling backup...");
            }
            _ = terminate => {
                info!("Received SIGTERM, cancelling backup...");
            }
            _ = self.token.cancelled() => return,
        }

        self.token.cancel();
    }

    /// Spawn the signal listener. It exits once the token is cancelled.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.wait_for_signal().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listener_exits_when_job_ends() {
        let token = CancellationToken::new();
        let handle = ShutdownCoordinator::new(token.clone()).spawn();

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_token_is_shared() {
        let token = CancellationToken::new();
        let coordinator = ShutdownCoordinator::new(token.clone());

        coordinator.token().cancel();
        assert!(token.is_cancelled());
    }
}
