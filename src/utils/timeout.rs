//! Timeout wrappers for peer liveness checks.
//!
//! The four windows below correspond directly to the quiescence points a
//! `Peer` state machine waits on: completing a handshake, receiving any
//! traffic at all, answering a `ping`, and finishing assembly of a
//! `merkleblock` plus its matched transactions. Callers needing a
//! non-default window should pass a `Duration` straight to `with_timeout`
//! rather than reach for a dedicated wrapper — these four are just the
//! commonly reused defaults.

use std::time::Duration;
use tokio::time::{timeout, Timeout};

/// Apply a timeout to an arbitrary future.
pub fn with_timeout<F>(future: F, duration: Duration) -> Timeout<F>
where
    F: std::future::Future,
{
    timeout(duration, future)
}

/// Default window to complete `version`/`verack` handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// Default window before a silent peer is considered idle.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default window to receive a `pong` after sending `ping`.
pub const DEFAULT_PONG_TIMEOUT: Duration = Duration::from_secs(30);

/// Default window to receive all transactions matched by a `merkleblock`
/// before the partial block is discarded as stalled.
pub const DEFAULT_BLOCK_ASSEMBLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Await the handshake within [`DEFAULT_HANDSHAKE_TIMEOUT`].
pub async fn with_handshake_timeout<F, T>(operation: F) -> Result<T, tokio::time::error::Elapsed>
where
    F: std::future::Future<Output = T>,
{
    timeout(DEFAULT_HANDSHAKE_TIMEOUT, operation).await
}

/// Await inbound traffic within [`DEFAULT_IDLE_TIMEOUT`].
pub async fn with_idle_timeout<F, T>(operation: F) -> Result<T, tokio::time::error::Elapsed>
where
    F: std::future::Future<Output = T>,
{
    timeout(DEFAULT_IDLE_TIMEOUT, operation).await
}

/// Await a pong within [`DEFAULT_PONG_TIMEOUT`].
pub async fn with_pong_timeout<F, T>(operation: F) -> Result<T, tokio::time::error::Elapsed>
where
    F: std::future::Future<Output = T>,
{
    timeout(DEFAULT_PONG_TIMEOUT, operation).await
}

/// Await block assembly within [`DEFAULT_BLOCK_ASSEMBLY_TIMEOUT`].
pub async fn with_block_assembly_timeout<F, T>(
    operation: F,
) -> Result<T, tokio::time::error::Elapsed>
where
    F: std::future::Future<Output = T>,
{
    timeout(DEFAULT_BLOCK_ASSEMBLY_TIMEOUT, operation).await
}
