//! The delivery channel for one connected participant.

use std::sync::Arc;
use std::time::Duration;

use pairplay_transport::{Connection, ConnectionId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::{SessionConfig, SessionError};

/// Wraps the single active connection of a seated participant.
///
/// Frames go into a bounded queue and a dedicated writer task sends them in
/// order. If a write fails or misses `write_timeout`, the writer closes the
/// connection, which in turn ends the participant's receive loop.
///
/// Replacing a participant's channel on reconnect is just dropping in a new
/// `ParticipantChannel` and [`close`](Self::close)-ing the old one.
pub struct ParticipantChannel<C: Connection> {
    conn: Arc<C>,
    outbound: mpsc::Sender<Vec<u8>>,
    writer: JoinHandle<()>,
    close_timeout: Duration,
}

impl<C: Connection> ParticipantChannel<C> {
    /// Starts the writer task for `conn`.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn open(conn: Arc<C>, config: &SessionConfig) -> Self {
        let (outbound, rx) = mpsc::channel(config.outbound_capacity.max(1));
        let writer = tokio::spawn(write_loop(
            Arc::clone(&conn),
            rx,
            config.write_timeout,
            config.close_timeout,
        ));
        Self {
            conn,
            outbound,
            writer,
            close_timeout: config.close_timeout,
        }
    }

    /// The id of the wrapped connection.
    pub fn id(&self) -> ConnectionId {
        self.conn.id()
    }

    /// The wrapped connection.
    pub fn connection(&self) -> &Arc<C> {
        &self.conn
    }

    /// `false` once the writer has stopped.
    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Queues a frame without waiting.
    ///
    /// # Errors
    /// - [`SessionError::QueueFull`] if the queue is at capacity; the frame
    ///   is dropped.
    /// - [`SessionError::ChannelClosed`] if the writer has stopped.
    pub fn deliver(&self, frame: Vec<u8>) -> Result<(), SessionError> {
        self.outbound.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SessionError::QueueFull(self.id()),
            TrySendError::Closed(_) => SessionError::ChannelClosed(self.id()),
        })
    }

    /// Flushes queued frames and closes the connection.
    ///
    /// Both steps are bounded by `close_timeout`; whatever is still queued
    /// after that is discarded.
    pub async fn close(self) {
        let Self {
            conn,
            outbound,
            mut writer,
            close_timeout,
        } = self;
        let id = conn.id();

        drop(outbound);
        if tokio::time::timeout(close_timeout, &mut writer).await.is_err() {
            tracing::debug!(conn_id = %id, "flush timed out, dropping queue");
            writer.abort();
        }
        close_bounded(&*conn, close_timeout).await;
    }
}

/// Drains the queue into the connection until the queue closes or a write
/// goes wrong.
async fn write_loop<C: Connection>(
    conn: Arc<C>,
    mut rx: mpsc::Receiver<Vec<u8>>,
    write_timeout: Duration,
    close_timeout: Duration,
) {
    let id = conn.id();
    let mut failed = false;
    while let Some(frame) = rx.recv().await {
        match tokio::time::timeout(write_timeout, conn.send(&frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(conn_id = %id, error = %e, "write failed");
                failed = true;
                break;
            }
            Err(_) => {
                tracing::warn!(
                    conn_id = %id,
                    timeout_ms = write_timeout.as_millis() as u64,
                    "write deadline missed"
                );
                failed = true;
                break;
            }
        }
    }

    // Drained normally: the owner closes the connection. Otherwise close it
    // here so the receive loop notices.
    if failed {
        rx.close();
        close_bounded(&*conn, close_timeout).await;
    }
}

async fn close_bounded<C: Connection>(conn: &C, close_timeout: Duration) {
    let id = conn.id();
    match tokio::time::timeout(close_timeout, conn.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::debug!(conn_id = %id, error = %e, "close failed");
        }
        Err(_) => tracing::debug!(conn_id = %id, "close timed out"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pairplay_transport::{MemoryConnection, MemoryPeer, TransportError};

    use super::*;

    /// Every send fails and `close` never completes.
    struct BrokenConnection {
        id: ConnectionId,
        close_calls: AtomicUsize,
    }

    impl Connection for BrokenConnection {
        type Error = TransportError;

        async fn send(&self, _data: &[u8]) -> Result<(), TransportError> {
            Err(TransportError::ConnectionClosed(self.id.to_string()))
        }

        async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
            Ok(None)
        }

        async fn close(&self) -> Result<(), TransportError> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<Result<(), TransportError>>().await
        }

        fn id(&self) -> ConnectionId {
            self.id
        }
    }

    fn open(
        config: &SessionConfig,
    ) -> (ParticipantChannel<MemoryConnection>, MemoryPeer) {
        let (conn, peer) = MemoryConnection::pair();
        (ParticipantChannel::open(Arc::new(conn), config), peer)
    }

    #[tokio::test]
    async fn test_deliver_reaches_peer_in_order() {
        let (channel, mut peer) = open(&SessionConfig::default());

        channel.deliver(b"one".to_vec()).unwrap();
        channel.deliver(b"two".to_vec()).unwrap();

        assert_eq!(peer.recv().await, Some(b"one".to_vec()));
        assert_eq!(peer.recv().await, Some(b"two".to_vec()));
        assert!(channel.is_open());
    }

    #[tokio::test]
    async fn test_id_matches_connection() {
        let (conn, _peer) = MemoryConnection::pair();
        let expected = conn.id();
        let channel =
            ParticipantChannel::open(Arc::new(conn), &SessionConfig::default());
        assert_eq!(channel.id(), expected);
        assert_eq!(channel.connection().id(), expected);
    }

    #[tokio::test]
    async fn test_full_queue_drops_frame() {
        let config = SessionConfig {
            outbound_capacity: 1,
            ..SessionConfig::default()
        };
        let (channel, peer) = open(&config);
        peer.stall();

        // The writer takes the first frame and parks on the stalled send,
        // the second fills the queue, the third has nowhere to go.
        channel.deliver(b"a".to_vec()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        channel.deliver(b"b".to_vec()).unwrap();
        assert!(matches!(
            channel.deliver(b"c".to_vec()),
            Err(SessionError::QueueFull(_))
        ));
    }

    #[tokio::test]
    async fn test_missed_write_deadline_closes_connection() {
        let config = SessionConfig {
            write_timeout: Duration::from_millis(30),
            ..SessionConfig::default()
        };
        let (channel, mut peer) = open(&config);
        peer.stall();

        channel.deliver(b"stuck".to_vec()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), peer.closed())
            .await
            .expect("writer should close the connection");
        // Give the writer a moment to finish tearing down.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!channel.is_open());
        assert!(matches!(
            channel.deliver(b"late".to_vec()),
            Err(SessionError::ChannelClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_close_flushes_then_closes() {
        let (channel, mut peer) = open(&SessionConfig::default());
        channel.deliver(b"bye".to_vec()).unwrap();

        channel.close().await;

        assert!(peer.is_closed());
        assert_eq!(peer.recv().await, Some(b"bye".to_vec()));
        assert_eq!(peer.recv().await, None);
    }

    #[tokio::test]
    async fn test_close_with_stalled_peer_is_bounded() {
        let config = SessionConfig {
            close_timeout: Duration::from_millis(30),
            ..SessionConfig::default()
        };
        let (channel, peer) = open(&config);
        peer.stall();
        channel.deliver(b"stuck".to_vec()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), channel.close())
            .await
            .expect("close should not hang on a stalled peer");
        assert!(peer.is_closed());
    }

    #[tokio::test]
    async fn test_failed_write_with_hanging_close_is_bounded() {
        let config = SessionConfig {
            close_timeout: Duration::from_millis(30),
            ..SessionConfig::default()
        };
        let conn = Arc::new(BrokenConnection {
            id: ConnectionId::next(),
            close_calls: AtomicUsize::new(0),
        });
        let channel = ParticipantChannel::open(Arc::clone(&conn), &config);

        channel.deliver(b"lost".to_vec()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while conn.close_calls.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("a failed write should close the connection");
        assert!(!channel.is_open());

        // The writer gives up on the hanging close, then so does `close`.
        tokio::time::timeout(Duration::from_secs(1), channel.close())
            .await
            .expect("close should not hang on a connection that never closes");
        assert_eq!(conn.close_calls.load(Ordering::SeqCst), 2);
    }
}
