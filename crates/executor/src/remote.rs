use async_trait::async_trait;
use crawlgrid_core::{FetchErrorKind, Payload, Target};

/// One slot's worth of remote fetch capability.
///
/// Implementations must be safe to call concurrently on *distinct*
/// instances. The engine never calls `execute` twice concurrently on the
/// same instance. Every failure is reported as a [`FetchErrorKind`];
/// implementations should not panic, and a panic is treated by the engine
/// as [`FetchErrorKind::ExecutorUnavailable`].
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Human-readable label used in logs.
    fn name(&self) -> &str;

    async fn execute(&self, target: &Target) -> Result<Payload, FetchErrorKind>;
}
