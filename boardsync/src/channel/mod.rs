//! Push channel abstraction.
//!
//! Defines the [`PushChannel`] trait for the board's live event stream.
//! Concrete implementations:
//! - [`ws::WsChannel`] — WebSocket connection with automatic reconnect
//! - [`loopback::LoopbackChannel`] — in-process pair for testing
//!
//! An absent or disconnected channel is a degraded mode, not a fatal
//! condition: messages still flow through the persistence gateway, only
//! live fan-out pauses.

pub mod loopback;
pub mod ws;

use std::time::Duration;

use boardsync_proto::event::PushFrame;

/// Errors that can occur during push channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The channel has no live connection.
    #[error("push channel is disconnected")]
    Disconnected,

    /// The operation timed out.
    #[error("push channel operation timed out")]
    Timeout,

    /// A frame failed to encode or decode.
    #[error(transparent)]
    Codec(#[from] boardsync_proto::event::CodecError),

    /// An underlying I/O error.
    #[error("push channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The board's live event stream.
///
/// One long-lived subscription per board, owned by the message sync
/// engine — never ad hoc per-component connections.
pub trait PushChannel: Send + Sync {
    /// Publish a frame for fan-out to the other clients of the board.
    fn publish(
        &self,
        frame: &PushFrame,
    ) -> impl std::future::Future<Output = Result<(), ChannelError>> + Send;

    /// Wait for the next frame broadcast by the server.
    fn next_event(
        &self,
    ) -> impl std::future::Future<Output = Result<PushFrame, ChannelError>> + Send;

    /// Whether the channel currently has a live connection.
    fn is_connected(&self) -> bool;
}

/// Exponential backoff schedule for reconnecting a dropped channel.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// The delay to wait before the given (zero-based) attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}
