//! WebSocket push channel.
//!
//! Implements the [`PushChannel`] trait over a WebSocket subscription to
//! the board's event stream. Frames are JSON text. The connection is
//! established and re-established by a background maintenance task with
//! exponential backoff, so the channel degrades instead of failing:
//! [`WsChannel::open`] returns immediately, publishes fail fast with
//! [`ChannelError::Disconnected`] while the link is down, and
//! `next_event` simply waits across reconnects.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use boardsync_proto::event::{self, PushFrame};

use super::{ChannelError, PushChannel, ReconnectPolicy};

/// Write half of the WebSocket connection.
type WsSink =
    futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// Read half of the WebSocket connection.
type WsReader = futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Timeout for a single connection attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket push channel with automatic reconnect.
pub struct WsChannel {
    url: String,
    sink: Arc<Mutex<Option<WsSink>>>,
    incoming: Mutex<mpsc::Receiver<PushFrame>>,
    connected: Arc<AtomicBool>,
    _maintenance: tokio::task::JoinHandle<()>,
}

impl WsChannel {
    /// Opens a channel to the board's push endpoint.
    ///
    /// Returns immediately; the connection is established (and, after any
    /// drop, re-established per `policy`) by a background task. Until the
    /// link is up, [`publish`](PushChannel::publish) fails with
    /// [`ChannelError::Disconnected`] and `next_event` waits.
    #[must_use]
    pub fn open(url: impl Into<String>, policy: ReconnectPolicy, buffer: usize) -> Self {
        let url = url.into();
        let (tx, rx) = mpsc::channel(buffer);
        let sink = Arc::new(Mutex::new(None));
        let connected = Arc::new(AtomicBool::new(false));
        let maintenance = tokio::spawn(maintenance_loop(
            url.clone(),
            policy,
            tx,
            Arc::clone(&sink),
            Arc::clone(&connected),
        ));
        Self {
            url,
            sink,
            incoming: Mutex::new(rx),
            connected,
            _maintenance: maintenance,
        }
    }

    /// The push endpoint URL this channel subscribes to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl PushChannel for WsChannel {
    async fn publish(&self, frame: &PushFrame) -> Result<(), ChannelError> {
        let text = event::encode(frame)?;
        let mut slot = self.sink.lock().await;
        let Some(sink) = slot.as_mut() else {
            return Err(ChannelError::Disconnected);
        };
        if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
            tracing::warn!(err = %e, "push publish failed");
            self.connected.store(false, Ordering::Relaxed);
            *slot = None;
            return Err(ChannelError::Disconnected);
        }
        Ok(())
    }

    async fn next_event(&self) -> Result<PushFrame, ChannelError> {
        let mut rx = self.incoming.lock().await;
        rx.recv().await.ok_or(ChannelError::Disconnected)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// Background task: connect, read frames until the link drops, back off,
/// reconnect. Exits when the channel value (and with it the frame
/// receiver) has been dropped.
async fn maintenance_loop(
    url: String,
    policy: ReconnectPolicy,
    tx: mpsc::Sender<PushFrame>,
    sink_slot: Arc<Mutex<Option<WsSink>>>,
    connected: Arc<AtomicBool>,
) {
    let mut attempt: u32 = 0;
    loop {
        match tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str())).await {
            Ok(Ok((ws_stream, _response))) => {
                attempt = 0;
                let (sink, reader) = ws_stream.split();
                *sink_slot.lock().await = Some(sink);
                connected.store(true, Ordering::Relaxed);
                tracing::info!(url = %url, "push channel connected");

                read_frames(reader, &tx).await;

                connected.store(false, Ordering::Relaxed);
                *sink_slot.lock().await = None;
                tracing::info!(url = %url, "push channel link lost");
            }
            Ok(Err(e)) => {
                tracing::debug!(url = %url, attempt, err = %e, "push channel connect failed");
            }
            Err(_) => {
                tracing::debug!(url = %url, attempt, "push channel connect timed out");
            }
        }

        if tx.is_closed() {
            break;
        }
        let delay = policy.delay_for(attempt);
        attempt = attempt.saturating_add(1);
        tokio::time::sleep(delay).await;
        if tx.is_closed() {
            break;
        }
    }
    tracing::debug!(url = %url, "push channel maintenance task exiting");
}

/// Reads frames until the connection closes or the receiver goes away.
/// Malformed frames are logged and skipped, not a disconnect.
async fn read_frames(mut reader: WsReader, tx: &mpsc::Sender<PushFrame>) {
    while let Some(result) = reader.next().await {
        match result {
            Ok(WsMessage::Text(text)) => match event::decode(&text) {
                Ok(frame) => {
                    if tx.send(frame).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed push frame, skipping");
                }
            },
            Ok(WsMessage::Binary(data)) => match std::str::from_utf8(&data) {
                Ok(text) => match event::decode(text) {
                    Ok(frame) => {
                        if tx.send(frame).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(err = %e, "malformed binary push frame, skipping");
                    }
                },
                Err(_) => {
                    tracing::warn!("non-UTF-8 push frame, skipping");
                }
            },
            Ok(WsMessage::Close(_)) => {
                tracing::info!("push channel closed by server");
                return;
            }
            Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)) => {}
            Err(e) => {
                tracing::warn!(err = %e, "push channel read error");
                return;
            }
        }
    }
}
