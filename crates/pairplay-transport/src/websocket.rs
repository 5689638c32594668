//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! The upgrade callback captures the request path and the `token` cookie.
//! Clients that arrive without a token get a fresh one, returned in a
//! `Set-Cookie` header so the browser presents it again on reconnect.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::header::{COOKIE, SET_COOKIE};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::{Connection, ConnectionId, Transport, TransportError};

/// Name of the cookie that carries the reconnection token.
const TOKEN_COOKIE: &str = "token";

/// Upper bound on the HTTP upgrade exchange.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// What the upgrade request told us about the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Request path, e.g. `/ws/tetris/9m4e2mr0ui3e8a215n4g`.
    pub path: String,
    /// Reconnection token from the cookie, or a freshly issued one.
    pub token: String,
    /// `true` when the token was issued during this handshake.
    pub token_issued: bool,
}

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl WebSocketTransport {
    /// Accepts the next TCP connection without upgrading it.
    ///
    /// The upgrade can take up to the handshake timeout, so servers should
    /// run [`PendingUpgrade::upgrade`] off the accept loop.
    pub async fn accept_pending(
        &self,
    ) -> Result<PendingUpgrade, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        Ok(PendingUpgrade { stream, addr })
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    /// Accepts and upgrades in one step. A client that stalls the upgrade
    /// holds this call for up to the handshake timeout.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        self.accept_pending().await?.upgrade().await
    }
}

/// A TCP connection that has not completed the WebSocket upgrade yet.
pub struct PendingUpgrade {
    stream: TcpStream,
    addr: SocketAddr,
}

impl PendingUpgrade {
    /// The remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the HTTP upgrade, bounded by the handshake timeout.
    pub async fn upgrade(
        self,
    ) -> Result<WebSocketConnection, TransportError> {
        let Self { stream, addr } = self;
        let mut path = String::new();
        let mut presented: Option<String> = None;
        let issued = issue_token();

        let callback = |req: &Request,
                        mut resp: Response|
         -> Result<Response, ErrorResponse> {
            path = req.uri().path().to_string();
            presented = token_from_cookies(req);
            if presented.is_none() {
                let cookie = format!("{TOKEN_COOKIE}={issued}; Path=/");
                if let Ok(value) = HeaderValue::from_str(&cookie) {
                    resp.headers_mut().append(SET_COOKIE, value);
                }
            }
            Ok(resp)
        };

        let ws = tokio::time::timeout(
            HANDSHAKE_TIMEOUT,
            tokio_tungstenite::accept_hdr_async(stream, callback),
        )
        .await
        .map_err(|_| TransportError::HandshakeTimeout)?
        .map_err(|e| {
            TransportError::AcceptFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })?;

        let handshake = match presented {
            Some(token) => Handshake {
                path,
                token,
                token_issued: false,
            },
            None => Handshake {
                path,
                token: issued,
                token_issued: true,
            },
        };

        let id = ConnectionId::next();
        tracing::debug!(
            %id,
            %addr,
            path = %handshake.path,
            token_issued = handshake.token_issued,
            "accepted WebSocket connection"
        );

        let (sink, stream) = ws.split();
        let (closed, _) = watch::channel(false);
        Ok(WebSocketConnection {
            id,
            handshake,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            closed,
        })
    }
}

/// A single WebSocket connection.
///
/// The socket is split so a writer never waits behind a pending read.
pub struct WebSocketConnection {
    id: ConnectionId,
    handshake: Handshake,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    closed: watch::Sender<bool>,
}

impl WebSocketConnection {
    /// Path and token captured during the upgrade.
    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    /// Sends a close frame carrying an application close code, then shuts
    /// the connection down.
    pub async fn close_with(
        &self,
        code: u16,
        reason: &str,
    ) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        self.shutdown(Some(frame)).await
    }

    async fn shutdown(
        &self,
        frame: Option<CloseFrame>,
    ) -> Result<(), TransportError> {
        self.closed.send_replace(true);
        let mut sink = self.sink.lock().await;
        let result = sink.send(Message::Close(frame)).await;
        let _ = sink.close().await;
        result.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        if *self.closed.borrow() {
            return Err(TransportError::ConnectionClosed(self.id.to_string()));
        }
        // Browsers hand binary frames to scripts as blobs, so JSON goes
        // out as text.
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::text(text.to_owned()),
            Err(_) => Message::binary(data.to_vec()),
        };
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Ok(None);
        }
        let mut stream = self.stream.lock().await;
        loop {
            let msg = tokio::select! {
                msg = stream.next() => msg,
                _ = closed.wait_for(|c| *c) => return Ok(None),
            };
            match msg {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.shutdown(None).await
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// Pulls the reconnection token out of the request's `Cookie` headers.
/// Empty values count as absent.
fn token_from_cookies(req: &Request) -> Option<String> {
    req.headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Generates a random 32-character hex token (128 bits of entropy).
fn issue_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_cookie(cookie: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("/ws/tetris/abc");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_token_from_cookies_finds_token_among_others() {
        let req = request_with_cookie(Some("theme=dark; token=abc123; x=1"));
        assert_eq!(token_from_cookies(&req), Some("abc123".to_string()));
    }

    #[test]
    fn test_token_from_cookies_missing() {
        let req = request_with_cookie(Some("theme=dark"));
        assert_eq!(token_from_cookies(&req), None);

        let req = request_with_cookie(None);
        assert_eq!(token_from_cookies(&req), None);
    }

    #[test]
    fn test_token_from_cookies_empty_value_is_absent() {
        let req = request_with_cookie(Some("token="));
        assert_eq!(token_from_cookies(&req), None);
    }

    #[test]
    fn test_issue_token_is_hex_and_unique() {
        let a = issue_token();
        let b = issue_token();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
