use tokio_util::sync::CancellationToken;
use tracing::info;

/// Process-wide graceful-shutdown switch.
///
/// Wraps the root [`CancellationToken`] observed by the control loop and by
/// every command execution. Requesting a stop is monotonic: once set it never
/// reverts, and repeated requests are idempotent. Cancelling the token wakes
/// any armed sleep (tick pause or retry backoff) promptly; an in-flight child
/// process is deliberately left to finish or hit its own timeout.
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    root: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the shutdown flag. Safe to call from signal handlers and from
    /// any task; later calls are no-ops.
    pub fn request_stop(&self) {
        if !self.root.is_cancelled() {
            info!("termination requested: we will exit gracefully soon");
            self.root.cancel();
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// A token clone for threading into suspension points.
    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::ShutdownCoordinator;

    #[test]
    fn starts_not_shutting_down() {
        let sd = ShutdownCoordinator::new();
        assert!(!sd.is_shutting_down());
        assert!(!sd.token().is_cancelled());
    }

    #[test]
    fn request_stop_is_monotonic_and_idempotent() {
        let sd = ShutdownCoordinator::new();
        sd.request_stop();
        assert!(sd.is_shutting_down());
        sd.request_stop();
        assert!(sd.is_shutting_down());
    }

    #[test]
    fn clones_share_the_flag() {
        let sd = ShutdownCoordinator::new();
        let other = sd.clone();
        let token = sd.token();

        other.request_stop();
        assert!(sd.is_shutting_down());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn token_wakes_armed_waiters() {
        let sd = ShutdownCoordinator::new();
        let token = sd.token();

        let waiter = tokio::spawn(async move { token.cancelled().await });
        sd.request_stop();
        waiter.await.unwrap();
    }
}
