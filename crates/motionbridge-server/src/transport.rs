//! WebSocket listener with startup port discovery.
//!
//! The bridge speaks binary WebSocket frames on localhost. An explicitly
//! configured port is used or the server fails fast; otherwise the listener
//! scans a fixed range upward from the default base and binds the first
//! free port.

use std::net::SocketAddr;

use motionbridge_core::{DEFAULT_PORT_BASE, PORT_SCAN_RANGE};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;

use crate::error::ServerError;

/// Listening socket for inbound bridge sessions.
pub struct WsListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl WsListener {
    /// Bind to an explicit port, or scan for a free one when `None`.
    ///
    /// Port `0` is honored as "let the OS pick", which the tests lean on.
    pub async fn bind(port: Option<u16>) -> Result<Self, ServerError> {
        match port {
            Some(port) => {
                let listener = TcpListener::bind(("127.0.0.1", port))
                    .await
                    .map_err(|source| ServerError::Bind { port, source })?;
                Self::from_listener(listener).await
            },
            None => {
                for candidate in DEFAULT_PORT_BASE..DEFAULT_PORT_BASE + PORT_SCAN_RANGE {
                    match TcpListener::bind(("127.0.0.1", candidate)).await {
                        Ok(listener) => {
                            tracing::debug!(port = candidate, "port scan acquired a listener");
                            return Self::from_listener(listener).await;
                        },
                        Err(_) => continue,
                    }
                }
                Err(ServerError::NoFreePort {
                    base: DEFAULT_PORT_BASE,
                    end: DEFAULT_PORT_BASE + PORT_SCAN_RANGE,
                })
            },
        }
    }

    async fn from_listener(listener: TcpListener) -> Result<Self, ServerError> {
        let local_addr = listener.local_addr()?;
        Ok(Self { listener, local_addr })
    }

    /// Accept one TCP connection. The WebSocket handshake happens in the
    /// per-session task so a slow client cannot stall the accept loop.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ServerError> {
        Ok(self.listener.accept().await?)
    }

    /// Address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Upgrade an accepted TCP stream to a WebSocket session.
pub async fn upgrade(stream: TcpStream) -> Result<WebSocketStream<TcpStream>, ServerError> {
    tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|err| ServerError::Handshake(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let listener = WsListener::bind(Some(0)).await.unwrap();
        assert_ne!(listener.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn explicit_port_conflict_fails_fast() {
        let first = WsListener::bind(Some(0)).await.unwrap();
        let taken = first.local_addr().port();

        let result = WsListener::bind(Some(taken)).await;
        assert!(matches!(result, Err(ServerError::Bind { port, .. }) if port == taken));
    }

    #[tokio::test]
    async fn scan_skips_occupied_ports() {
        // Occupy the scan base so the scan has to move past it.
        let _squatter = TcpListener::bind(("127.0.0.1", DEFAULT_PORT_BASE)).await;

        let listener = WsListener::bind(None).await.unwrap();
        let port = listener.local_addr().port();
        assert!(port >= DEFAULT_PORT_BASE);
        assert!(port < DEFAULT_PORT_BASE + PORT_SCAN_RANGE);
    }
}
