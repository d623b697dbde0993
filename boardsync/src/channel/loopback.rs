//! Loopback push channel for testing.
//!
//! Uses in-process [`tokio::sync::mpsc`] channels to stand in for a board
//! subscription. Created via [`LoopbackChannel::create_pair`]: frames
//! published on one endpoint arrive at the other, so a test can play the
//! server relay by publishing into the client's endpoint.

use tokio::sync::{Mutex, mpsc};

use boardsync_proto::event::PushFrame;

use super::{ChannelError, PushChannel};

/// In-process push channel backed by `tokio::sync::mpsc` channels.
pub struct LoopbackChannel {
    tx: mpsc::Sender<PushFrame>,
    rx: Mutex<mpsc::Receiver<PushFrame>>,
}

impl LoopbackChannel {
    /// Creates a pair of connected endpoints with the given buffer size.
    /// Frames published on one side are received by the other.
    #[must_use]
    pub fn create_pair(buffer: usize) -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::channel(buffer);
        let (tx_b, rx_b) = mpsc::channel(buffer);
        (
            Self {
                tx: tx_b,
                rx: Mutex::new(rx_a),
            },
            Self {
                tx: tx_a,
                rx: Mutex::new(rx_b),
            },
        )
    }
}

impl PushChannel for LoopbackChannel {
    async fn publish(&self, frame: &PushFrame) -> Result<(), ChannelError> {
        self.tx
            .send(frame.clone())
            .await
            .map_err(|_| ChannelError::Disconnected)
    }

    async fn next_event(&self) -> Result<PushFrame, ChannelError> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(ChannelError::Disconnected)
    }

    fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}
