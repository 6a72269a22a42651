//! WebSocket server for the codoc relay

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use codoc_core::RoomRegistry;
use codoc_protocol::{codec, ServerMessage};
use codoc_storage::DocumentStore;

use crate::handler::ConnectionHandler;
use crate::DEFAULT_STORE_TIMEOUT_MS;

/// Server-side connection settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Allowed `Origin` header values; empty means any origin is accepted.
    pub allowed_origins: Vec<String>,
    /// Time budget for store lookups during `get-document`.
    pub store_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        }
    }
}

/// WebSocket relay server
pub struct WebSocketServer {
    registry: Arc<RoomRegistry>,
    store: Arc<dyn DocumentStore>,
    addr: SocketAddr,
    config: ServerConfig,
}

impl WebSocketServer {
    pub fn new(registry: Arc<RoomRegistry>, store: Arc<dyn DocumentStore>, addr: SocketAddr) -> Self {
        Self {
            registry,
            store,
            addr,
            config: ServerConfig::default(),
        }
    }

    /// Restrict handshakes to the given `Origin` values.
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.config.allowed_origins = origins;
        self
    }

    /// Override the store lookup time budget.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.config.store_timeout = timeout;
        self
    }

    /// Start the WebSocket server
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "codoc relay listening");

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let registry = self.registry.clone();
                    let store = self.store.clone();
                    let config = self.config.clone();

                    tokio::spawn(async move {
                        if let Err(e) =
                            Self::handle_connection(stream, registry, store, config).await
                        {
                            error!(peer = %peer_addr, error = %e, "WebSocket connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        registry: Arc<RoomRegistry>,
        store: Arc<dyn DocumentStore>,
        config: ServerConfig,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let allowed = config.allowed_origins.clone();
        let ws_stream = accept_hdr_async(stream, move |req: &Request, resp: Response| {
            check_origin(req, resp, &allowed)
        })
        .await?;

        Self::run_session(ws_stream, registry, store, config).await;
        Ok(())
    }

    /// The post-handshake connection loop. Every exit path, send failures
    /// included, falls through to `cleanup()` so room membership never
    /// outlives the connection.
    async fn run_session<S>(
        ws_stream: tokio_tungstenite::WebSocketStream<S>,
        registry: Arc<RoomRegistry>,
        store: Arc<dyn DocumentStore>,
        config: ServerConfig,
    ) where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let (mut write, mut read) = ws_stream.split();

        let mut handler = ConnectionHandler::new(registry, store)
            .with_store_timeout(config.store_timeout);
        let client_id = handler.connection_id;
        let mut events = handler.subscribe_events();

        info!(client = %client_id, "Client connected");

        'session: loop {
            tokio::select! {
                // Inbound frames from this client
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let replies = match codec::decode_client(&text) {
                                Ok(message) => handler.handle_message(message).await,
                                Err(e) => {
                                    warn!(client = %client_id, error = %e, "Undecodable frame");
                                    vec![ServerMessage::error("PARSE_ERROR", e.to_string())]
                                }
                            };
                            for reply in replies {
                                if let Err(e) = write
                                    .send(Message::Text(codec::encode_server(&reply)))
                                    .await
                                {
                                    warn!(client = %client_id, error = %e, "Failed to send reply, closing connection");
                                    break 'session;
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                warn!(client = %client_id, error = %e, "Failed to send pong, closing connection");
                                break 'session;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!(client = %client_id, "Client disconnected");
                            break 'session;
                        }
                        Some(Ok(_)) => {
                            // Binary and other frame types are not part of the protocol.
                        }
                        Some(Err(e)) => {
                            error!(client = %client_id, error = %e, "WebSocket read error");
                            break 'session;
                        }
                    }
                }

                // Changes relayed from room peers
                result = events.recv() => {
                    match result {
                        Ok(event) => {
                            if handler.wants(&event) {
                                let reply = ServerMessage::changes_received(event.delta);
                                if let Err(e) = write
                                    .send(Message::Text(codec::encode_server(&reply)))
                                    .await
                                {
                                    // Best-effort delivery: a recipient gone
                                    // mid-broadcast is dropped, not retried.
                                    debug!(client = %client_id, error = %e, "Dropped delivery to closing connection");
                                    break 'session;
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(client = %client_id, missed = n, "Client lagged behind relay stream");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            break 'session;
                        }
                    }
                }
            }
        }

        handler.cleanup();
    }
}

/// Handshake-time origin allow-list, the browser-facing deployment's
/// cross-origin policy. An empty list accepts any origin.
fn check_origin(
    req: &Request,
    resp: Response,
    allowed: &[String],
) -> Result<Response, ErrorResponse> {
    if allowed.is_empty() {
        return Ok(resp);
    }

    let origin = req
        .headers()
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if allowed.iter().any(|a| a == origin) {
        Ok(resp)
    } else {
        warn!(origin = %origin, "Rejected handshake from disallowed origin");
        let mut response = ErrorResponse::new(Some("Origin not allowed".into()));
        *response.status_mut() = StatusCode::FORBIDDEN;
        Err(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codoc_protocol::ClientMessage;
    use codoc_storage::MemoryStore;
    use tokio_tungstenite::tungstenite::http;
    use tokio_tungstenite::tungstenite::protocol::Role;

    fn request_with_origin(origin: Option<&str>) -> Request {
        let mut builder = http::Request::builder().uri("ws://localhost/");
        if let Some(origin) = origin {
            builder = builder.header("origin", origin);
        }
        builder.body(()).unwrap()
    }

    fn empty_response() -> Response {
        http::Response::builder().body(()).unwrap()
    }

    #[test]
    fn test_any_origin_when_unrestricted() {
        let req = request_with_origin(Some("http://evil.example"));
        assert!(check_origin(&req, empty_response(), &[]).is_ok());
    }

    #[test]
    fn test_allowed_origin_accepted() {
        let allowed = vec!["http://localhost:3000".to_string()];
        let req = request_with_origin(Some("http://localhost:3000"));
        assert!(check_origin(&req, empty_response(), &allowed).is_ok());
    }

    #[tokio::test]
    async fn test_membership_released_when_reply_send_fails() {
        let (client_io, server_io) = tokio::io::duplex(1024);
        let mut client = tokio_tungstenite::WebSocketStream::from_raw_socket(
            client_io,
            Role::Client,
            None,
        )
        .await;
        let server = tokio_tungstenite::WebSocketStream::from_raw_socket(
            server_io,
            Role::Server,
            None,
        )
        .await;

        // The request is buffered, then the client goes away before the
        // server can write its reply.
        client
            .send(Message::Text(codec::encode_client(
                &ClientMessage::get_document("doc1"),
            )))
            .await
            .unwrap();
        drop(client);

        let registry = Arc::new(RoomRegistry::new());
        let store = Arc::new(MemoryStore::new());
        WebSocketServer::run_session(server, registry.clone(), store, ServerConfig::default())
            .await;

        // The failed reply send must not leak the joined room membership.
        assert_eq!(registry.stats().member_count, 0);
        assert_eq!(registry.stats().room_count, 0);
    }

    #[test]
    fn test_disallowed_origin_rejected() {
        let allowed = vec!["http://localhost:3000".to_string()];

        let req = request_with_origin(Some("http://other.example"));
        let err = check_origin(&req, empty_response(), &allowed).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let req = request_with_origin(None);
        assert!(check_origin(&req, empty_response(), &allowed).is_err());
    }
}
