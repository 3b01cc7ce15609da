//! Per-viewer WebSocket session.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use smsfeed_core::ConnectionId;

use super::registry::{ConnectionRegistry, ViewerHandle};
use super::sink::ChannelSink;

/// Per-session knobs, copied out of the server config.
#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    pub queue_capacity: usize,
    pub heartbeat_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    ClientClosed,
    TransportError,
    /// The broadcaster dropped this viewer after a failed delivery.
    Pruned,
    Shutdown,
}

/// `tokio::time::interval` panics on a zero period.
const MIN_HEARTBEAT: Duration = Duration::from_millis(100);

/// Upper bound on the close handshake write during shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Registry membership for one session. Dropping it deregisters the viewer,
/// including when the session future unwinds or is dropped mid-await.
struct Registration {
    registry: Arc<ConnectionRegistry>,
    conn_id: ConnectionId,
}

impl Registration {
    fn new(registry: Arc<ConnectionRegistry>, handle: ViewerHandle) -> Self {
        let conn_id = handle.id().clone();
        registry.add(handle);
        Self { registry, conn_id }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(&self.conn_id);
    }
}

/// Run one viewer session until the client leaves, the socket fails, or the
/// server shuts down. The viewer is registered for exactly the lifetime of
/// this call.
///
/// The session is passive: inbound frames are read only to notice a close.
pub async fn run_viewer_session(
    socket: WebSocket,
    registry: Arc<ConnectionRegistry>,
    options: SessionOptions,
    shutdown: CancellationToken,
) -> SessionEnd {
    let mut ping = tokio::time::interval(options.heartbeat_interval.max(MIN_HEARTBEAT));
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let (sink, mut rx) = ChannelSink::channel(options.queue_capacity);
    let registration = Registration::new(registry, ViewerHandle::new(Arc::new(sink)));
    let conn_id = registration.conn_id.clone();
    info!(conn_id = %conn_id, viewers = registration.registry.len(), "viewer connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer: drain queued payloads to the socket, ping on an interval.
    let writer = async {
        ping.tick().await; // consume first immediate tick

        loop {
            let frame = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                payload = rx.recv() => match payload {
                    Some(payload) => WsMessage::Text(payload.to_string().into()),
                    None => return SessionEnd::Pruned,
                },
                _ = ping.tick() => {
                    trace!(conn_id = %conn_id, "sending ping");
                    WsMessage::Ping(Bytes::new())
                }
            };

            // A stalled client must not hold the session past shutdown.
            tokio::select! {
                biased;
                () = shutdown.cancelled() => return SessionEnd::Shutdown,
                sent = ws_tx.send(frame) => {
                    if sent.is_err() {
                        return SessionEnd::TransportError;
                    }
                }
            }
        }

        let close = WsMessage::Close(Some(CloseFrame {
            code: close_code::AWAY,
            reason: "server shutting down".into(),
        }));
        if tokio::time::timeout(CLOSE_TIMEOUT, ws_tx.send(close)).await.is_err() {
            debug!(conn_id = %conn_id, "close frame not written before timeout");
        }
        SessionEnd::Shutdown
    };

    // Reader: only watches for the session to end.
    let reader = async {
        while let Some(frame) = ws_rx.next().await {
            match frame {
                Ok(WsMessage::Close(_)) => return SessionEnd::ClientClosed,
                Ok(_) => {}
                Err(e) => {
                    debug!(conn_id = %conn_id, error = %e, "viewer socket error");
                    return SessionEnd::TransportError;
                }
            }
        }
        SessionEnd::ClientClosed
    };

    let end = tokio::select! {
        end = writer => end,
        end = reader => end,
    };

    let registry = Arc::clone(&registration.registry);
    drop(registration);
    info!(conn_id = %conn_id, reason = ?end, viewers = registry.len(), "viewer disconnected");
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let opts = SessionOptions::default();
        assert_eq!(opts.queue_capacity, 64);
        assert_eq!(opts.heartbeat_interval, Duration::from_secs(30));
    }

    #[test]
    fn registration_lasts_until_dropped() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (sink, _rx) = ChannelSink::channel(1);
        let registration = Registration::new(registry.clone(), ViewerHandle::new(Arc::new(sink)));
        assert!(registry.contains(&registration.conn_id));

        drop(registration);
        assert!(registry.is_empty());
    }

    #[test]
    fn registration_is_released_when_the_session_panics() {
        let registry = Arc::new(ConnectionRegistry::new());
        let inner = registry.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let (sink, _rx) = ChannelSink::channel(1);
            let _registration = Registration::new(inner, ViewerHandle::new(Arc::new(sink)));
            panic!("session failed");
        }));
        assert!(result.is_err());
        assert!(registry.is_empty());
    }
}
