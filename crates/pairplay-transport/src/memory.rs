//! In-process connection pair.
//!
//! [`MemoryConnection`] is the server half and implements [`Connection`];
//! [`MemoryPeer`] is the client half that tests drive directly. The peer can
//! also stall delivery to simulate a client that stopped reading.

use tokio::sync::{mpsc, watch, Mutex};

use crate::{Connection, ConnectionId, TransportError};

/// Server side of an in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    inbound: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    closed: watch::Sender<bool>,
    stalled: watch::Receiver<bool>,
}

/// Client side of an in-memory connection.
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    closed: watch::Receiver<bool>,
    stalled: watch::Sender<bool>,
}

impl MemoryConnection {
    /// Creates a connected pair.
    pub fn pair() -> (MemoryConnection, MemoryPeer) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        let (stall_tx, stall_rx) = watch::channel(false);

        let conn = MemoryConnection {
            id: ConnectionId::next(),
            inbound: Mutex::new(in_rx),
            outbound: out_tx,
            closed: closed_tx,
            stalled: stall_rx,
        };
        let peer = MemoryPeer {
            inbound: Some(in_tx),
            outbound: out_rx,
            closed: closed_rx,
            stalled: stall_tx,
        };
        (conn, peer)
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

impl Connection for MemoryConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let mut stalled = self.stalled.clone();
        let mut closed = self.closed.subscribe();
        // Park while the peer is stalled; a close releases the sender.
        tokio::select! {
            _ = stalled.wait_for(|s| !*s) => {}
            _ = closed.wait_for(|c| *c) => {}
        }
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed(self.id.to_string()));
        }
        self.outbound
            .send(data.to_vec())
            .map_err(|_| TransportError::ConnectionClosed(self.id.to_string()))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Ok(None);
        }
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            msg = inbound.recv() => Ok(msg),
            _ = closed.wait_for(|c| *c) => Ok(None),
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.closed.send_replace(true);
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

impl MemoryPeer {
    /// Sends a frame to the server side. Returns `false` once hung up or
    /// closed.
    pub fn send(&self, data: impl Into<Vec<u8>>) -> bool {
        if *self.closed.borrow() {
            return false;
        }
        match &self.inbound {
            Some(tx) => tx.send(data.into()).is_ok(),
            None => false,
        }
    }

    /// Waits for the next frame from the server. `None` once the server
    /// closed the connection and everything sent before the close was read.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        loop {
            if let Ok(frame) = self.outbound.try_recv() {
                return Some(frame);
            }
            if *self.closed.borrow() {
                return None;
            }
            tokio::select! {
                frame = self.outbound.recv() => return frame,
                changed = self.closed.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }

    /// Returns a frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.outbound.try_recv().ok()
    }

    /// Simulates the client going away: the server's `recv` yields `None`
    /// after draining what was already sent.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Makes server sends block until [`resume`](Self::resume).
    pub fn stall(&self) {
        self.stalled.send_replace(true);
    }

    /// Lets blocked server sends through again.
    pub fn resume(&self) {
        self.stalled.send_replace(false);
    }

    /// Returns `true` once the server side closed the connection.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Waits until the server side closes the connection.
    pub async fn closed(&mut self) {
        let _ = self.closed.wait_for(|c| *c).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_pair_delivers_both_ways() {
        let (conn, mut peer) = MemoryConnection::pair();

        assert!(peer.send(b"ping".to_vec()));
        assert_eq!(conn.recv().await.unwrap(), Some(b"ping".to_vec()));

        conn.send(b"pong").await.unwrap();
        assert_eq!(peer.recv().await, Some(b"pong".to_vec()));
    }

    #[tokio::test]
    async fn test_hang_up_ends_server_recv() {
        let (conn, mut peer) = MemoryConnection::pair();
        peer.send(b"last".to_vec());
        peer.hang_up();

        assert_eq!(conn.recv().await.unwrap(), Some(b"last".to_vec()));
        assert_eq!(conn.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_close_wakes_pending_recv() {
        let (conn, mut peer) = MemoryConnection::pair();
        let conn = std::sync::Arc::new(conn);

        let reader = {
            let conn = std::sync::Arc::clone(&conn);
            tokio::spawn(async move { conn.recv().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        conn.close().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("recv should wake on close")
            .unwrap();
        assert_eq!(result.unwrap(), None);
        assert!(peer.is_closed());
        assert!(!peer.send(b"late".to_vec()));
        assert_eq!(peer.recv().await, None);
    }

    #[tokio::test]
    async fn test_stall_blocks_send_until_resume() {
        let (conn, mut peer) = MemoryConnection::pair();
        peer.stall();

        let blocked =
            tokio::time::timeout(Duration::from_millis(20), conn.send(b"x"))
                .await;
        assert!(blocked.is_err(), "send should block while stalled");

        peer.resume();
        conn.send(b"y").await.unwrap();
        assert_eq!(peer.recv().await, Some(b"y".to_vec()));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (conn, _peer) = MemoryConnection::pair();
        conn.close().await.unwrap();
        assert!(matches!(
            conn.send(b"x").await,
            Err(TransportError::ConnectionClosed(_))
        ));
    }
}
