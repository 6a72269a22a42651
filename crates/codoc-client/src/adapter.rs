//! The sync adapter - wires an editor capability to the relay
//!
//! Lifecycle per document: connect, issue one `get-document`, hold the
//! loading gate (local edits dropped, saves skipped) until `load-document`
//! arrives, then relay user edits out and peer changes in, snapshotting the
//! full content to the server on a fixed interval. Switching documents is a
//! teardown plus a fresh adapter run on a new connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use codoc_core::Delta;
use codoc_protocol::{codec, ClientMessage, ServerMessage};

use crate::editor::{EditOrigin, Editor, LocalEdit};

/// Default periodic-save interval.
pub const DEFAULT_SAVE_INTERVAL_MS: u64 = 2000;

/// Client-side errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Server rejected the session: {code} {message}")]
    Rejected { code: String, message: String },
}

/// The network seam the adapter runs over.
///
/// Production uses [`WsTransport`]; tests drive the adapter through an
/// in-process channel transport.
#[async_trait]
pub trait SyncTransport: Send {
    async fn send(&mut self, msg: ClientMessage) -> Result<(), ClientError>;

    /// The next server message, or `None` once the connection is closed.
    async fn recv(&mut self) -> Option<ServerMessage>;

    async fn close(&mut self);
}

/// WebSocket transport over `tokio-tungstenite`.
pub struct WsTransport {
    write: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
    read: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl WsTransport {
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        let (write, read) = stream.split();
        info!(url = %url, "Connected to relay");
        Ok(Self { write, read })
    }
}

#[async_trait]
impl SyncTransport for WsTransport {
    async fn send(&mut self, msg: ClientMessage) -> Result<(), ClientError> {
        self.write
            .send(Message::Text(codec::encode_client(&msg)))
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))
    }

    async fn recv(&mut self) -> Option<ServerMessage> {
        while let Some(frame) = self.read.next().await {
            match frame {
                Ok(Message::Text(text)) => match codec::decode_server(&text) {
                    Ok(msg) => return Some(msg),
                    Err(e) => {
                        warn!(error = %e, "Undecodable server frame, skipped");
                    }
                },
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "WebSocket read error");
                    return None;
                }
            }
        }
        None
    }

    async fn close(&mut self) {
        let _ = self.write.send(Message::Close(None)).await;
    }
}

/// Adapter settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub document_id: String,
    pub save_interval: Duration,
}

impl SyncConfig {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            save_interval: Duration::from_millis(DEFAULT_SAVE_INTERVAL_MS),
        }
    }

    pub fn with_save_interval(mut self, interval: Duration) -> Self {
        self.save_interval = interval;
        self
    }
}

/// Bridges one editor capability and one relay connection.
pub struct SyncAdapter<T: SyncTransport, E: Editor> {
    transport: T,
    editor: Arc<Mutex<E>>,
    config: SyncConfig,
}

impl<T: SyncTransport, E: Editor> SyncAdapter<T, E> {
    pub fn new(transport: T, editor: Arc<Mutex<E>>, config: SyncConfig) -> Self {
        Self {
            transport,
            editor,
            config,
        }
    }

    /// Run the session until the connection closes or the edit stream ends.
    ///
    /// `edits` carries change notifications from the editor capability; only
    /// `User`-origin events are forwarded, which is what prevents remote
    /// changes applied through [`Editor::apply`] from echoing back out.
    pub async fn run(
        mut self,
        mut edits: mpsc::UnboundedReceiver<LocalEdit>,
    ) -> Result<(), ClientError> {
        // Editing stays blocked until the initial snapshot lands.
        self.editor.lock().set_enabled(false);
        self.transport
            .send(ClientMessage::get_document(self.config.document_id.clone()))
            .await?;

        let mut loaded = false;
        let mut save_timer = tokio::time::interval(self.config.save_interval);
        save_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick of an interval fires immediately; consume it so the
        // first save happens one full interval after connect.
        save_timer.tick().await;

        loop {
            tokio::select! {
                msg = self.transport.recv() => {
                    match msg {
                        Some(ServerMessage::LoadDocument { delta }) => {
                            debug!(doc_id = %self.config.document_id, "Document loaded, editing unlocked");
                            self.editor.lock().load(delta);
                            loaded = true;
                        }
                        Some(ServerMessage::ChangesReceived { delta }) => {
                            // Incremental apply, never a full replace, and
                            // never re-emitted (apply is the Remote path).
                            self.editor.lock().apply(delta);
                        }
                        Some(ServerMessage::Error { code, message }) => {
                            if loaded {
                                warn!(code = %code, message = %message, "Server reported an error");
                            } else {
                                // Failing the initial load is fatal for the
                                // session; surfacing it beats hanging on the gate.
                                return Err(ClientError::Rejected { code, message });
                            }
                        }
                        None => {
                            info!(doc_id = %self.config.document_id, "Connection closed");
                            return Ok(());
                        }
                    }
                }

                edit = edits.recv() => {
                    match edit {
                        Some(edit) => {
                            if edit.origin != EditOrigin::User {
                                continue;
                            }
                            if !loaded {
                                debug!("Dropped local edit before initial load");
                                continue;
                            }
                            self.transport.send(ClientMessage::send_changes(edit.delta)).await?;
                        }
                        None => {
                            // Editor torn down: end the session.
                            self.transport.close().await;
                            return Ok(());
                        }
                    }
                }

                _ = save_timer.tick() => {
                    if loaded {
                        let snapshot = self.editor.lock().contents();
                        self.transport.send(ClientMessage::save_document(snapshot)).await?;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::LineEditor;

    /// In-process transport: the test plays the server.
    struct ChannelTransport {
        outbound: mpsc::UnboundedSender<ClientMessage>,
        inbound: mpsc::UnboundedReceiver<ServerMessage>,
    }

    #[async_trait]
    impl SyncTransport for ChannelTransport {
        async fn send(&mut self, msg: ClientMessage) -> Result<(), ClientError> {
            self.outbound
                .send(msg)
                .map_err(|_| ClientError::Connection("closed".into()))
        }

        async fn recv(&mut self) -> Option<ServerMessage> {
            self.inbound.recv().await
        }

        async fn close(&mut self) {}
    }

    struct Harness {
        from_adapter: mpsc::UnboundedReceiver<ClientMessage>,
        to_adapter: mpsc::UnboundedSender<ServerMessage>,
        edits: mpsc::UnboundedSender<LocalEdit>,
        editor: Arc<Mutex<LineEditor>>,
        task: tokio::task::JoinHandle<Result<(), ClientError>>,
    }

    fn spawn_adapter(config: SyncConfig) -> Harness {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (edit_tx, edit_rx) = mpsc::unbounded_channel();
        let editor = Arc::new(Mutex::new(LineEditor::new()));

        let transport = ChannelTransport {
            outbound: out_tx,
            inbound: in_rx,
        };
        let adapter = SyncAdapter::new(transport, editor.clone(), config);
        let task = tokio::spawn(adapter.run(edit_rx));

        Harness {
            from_adapter: out_rx,
            to_adapter: in_tx,
            edits: edit_tx,
            editor,
            task,
        }
    }

    fn long_save_config() -> SyncConfig {
        // Long save interval keeps timer traffic out of gating tests.
        SyncConfig::new("doc1").with_save_interval(Duration::from_secs(3600))
    }

    #[tokio::test(start_paused = true)]
    async fn test_issues_single_get_document() {
        let mut h = spawn_adapter(long_save_config());

        let first = h.from_adapter.recv().await.unwrap();
        assert_eq!(first, ClientMessage::get_document("doc1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_gate_drops_early_edits() {
        let mut h = spawn_adapter(long_save_config());
        h.from_adapter.recv().await.unwrap(); // get-document

        // Edits before load-document are dropped, not queued.
        h.edits.send(LocalEdit::user(Delta::insert("early"))).unwrap();
        h.to_adapter
            .send(ServerMessage::load_document(Delta::empty()))
            .unwrap();
        h.edits.send(LocalEdit::user(Delta::insert("late"))).unwrap();

        let sent = h.from_adapter.recv().await.unwrap();
        assert_eq!(sent, ClientMessage::send_changes(Delta::insert("late")));
        assert!(h.editor.lock().is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_changes_not_echoed() {
        let mut h = spawn_adapter(long_save_config());
        h.from_adapter.recv().await.unwrap();
        h.to_adapter
            .send(ServerMessage::load_document(Delta::empty()))
            .unwrap();

        // A peer's change arrives and is applied locally.
        h.to_adapter
            .send(ServerMessage::changes_received(Delta::insert("peer edit")))
            .unwrap();
        // The editor reports it as a programmatic change.
        h.edits
            .send(LocalEdit::remote(Delta::insert("peer edit")))
            .unwrap();
        // Then the user types something.
        h.edits.send(LocalEdit::user(Delta::insert("mine"))).unwrap();

        // Only the user edit goes out.
        let sent = h.from_adapter.recv().await.unwrap();
        assert_eq!(sent, ClientMessage::send_changes(Delta::insert("mine")));
        assert_eq!(h.editor.lock().text(), "peer edit");
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_save_sends_full_contents() {
        let mut h = spawn_adapter(
            SyncConfig::new("doc1").with_save_interval(Duration::from_millis(2000)),
        );
        h.from_adapter.recv().await.unwrap();
        h.to_adapter
            .send(ServerMessage::load_document(Delta::new(serde_json::json!(
                "base "
            ))))
            .unwrap();
        h.to_adapter
            .send(ServerMessage::changes_received(Delta::insert("more")))
            .unwrap();

        // The paused clock advances once the adapter is idle on its timer.
        let saved = h.from_adapter.recv().await.unwrap();
        assert_eq!(
            saved,
            ClientMessage::save_document(Delta::new(serde_json::json!("base more")))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_save_before_load() {
        let mut h = spawn_adapter(
            SyncConfig::new("doc1").with_save_interval(Duration::from_millis(2000)),
        );
        h.from_adapter.recv().await.unwrap();

        // Give the timer several intervals' worth of paused time.
        tokio::time::sleep(Duration::from_millis(7000)).await;
        assert!(
            h.from_adapter.try_recv().is_err(),
            "no save-document may be sent before the document loads"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_before_load_ends_session() {
        let mut h = spawn_adapter(long_save_config());
        h.from_adapter.recv().await.unwrap();

        h.to_adapter
            .send(ServerMessage::error("STORE_UNAVAILABLE", "backend down"))
            .unwrap();

        let result = h.task.await.unwrap();
        assert!(matches!(
            result,
            Err(ClientError::Rejected { code, .. }) if code == "STORE_UNAVAILABLE"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_on_edit_stream_end() {
        let mut h = spawn_adapter(long_save_config());
        h.from_adapter.recv().await.unwrap();
        h.to_adapter
            .send(ServerMessage::load_document(Delta::empty()))
            .unwrap();

        drop(h.edits);
        let result = h.task.await.unwrap();
        assert!(result.is_ok());
    }
}
