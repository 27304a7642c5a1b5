//! WebSocket client for the list server.
//!
//! Speaks the same text-envelope protocol as browsers do. Outbound requests
//! go through a writer task; a reader task decodes list updates into
//! [`ClientEvent`]s.

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;

use crate::model::ListDocument;
use crate::protocol::{decode_update, AddItem, Envelope, ProtocolError, RemoveItem, Request};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    /// New state of a list this connection subscribed to
    ListUpdated {
        list_id: String,
        document: ListDocument,
    },
}

/// A connection to a list server.
pub struct ListClient {
    server_url: String,
    state: Arc<RwLock<ConnectionState>>,
    outgoing_tx: Option<mpsc::Sender<String>>,
    event_rx: Option<mpsc::Receiver<ClientEvent>>,
    event_tx: mpsc::Sender<ClientEvent>,
}

impl ListClient {
    pub fn new(server_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            server_url: server_url.into(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
        }
    }

    /// Create a client and connect it.
    pub async fn connect_to(server_url: impl Into<String>) -> Result<Self, ProtocolError> {
        let mut client = Self::new(server_url);
        client.connect().await?;
        Ok(client)
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<ClientEvent>> {
        self.event_rx.take()
    }

    /// Connect and spawn the reader and writer tasks.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let ws_stream = match tokio_tungstenite::connect_async(self.server_url.as_str()).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                log::warn!("Failed to connect to {}: {e}", self.server_url);
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ProtocolError::ConnectionClosed);
            }
        };
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
        self.outgoing_tx = Some(out_tx);

        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if ws_writer.send(Message::text(text)).await.is_err() {
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(ClientEvent::Connected).await;

        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match Self::decode_event(text.as_str()) {
                        Ok(event) => {
                            if event_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => log::warn!("Ignoring undecodable frame: {e}"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(ClientEvent::Disconnected).await;
        });

        Ok(())
    }

    fn decode_event(text: &str) -> Result<ClientEvent, ProtocolError> {
        let envelope = Envelope::decode(text)?;
        Ok(ClientEvent::ListUpdated {
            document: decode_update(&envelope.data)?,
            list_id: envelope.event,
        })
    }

    /// Send any request.
    pub async fn send(&self, request: &Request) -> Result<(), ProtocolError> {
        let tx = self
            .outgoing_tx
            .as_ref()
            .ok_or(ProtocolError::ConnectionClosed)?;
        tx.send(request.encode()?)
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Send a raw text frame, bypassing encoding.
    pub async fn send_raw(&self, text: impl Into<String>) -> Result<(), ProtocolError> {
        let tx = self
            .outgoing_tx
            .as_ref()
            .ok_or(ProtocolError::ConnectionClosed)?;
        tx.send(text.into())
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    pub async fn subscribe(&self, list_id: impl Into<String>) -> Result<(), ProtocolError> {
        self.send(&Request::Subscribe(list_id.into())).await
    }

    pub async fn unsubscribe(&self, list_id: impl Into<String>) -> Result<(), ProtocolError> {
        self.send(&Request::Unsubscribe(list_id.into())).await
    }

    pub async fn add_item(&self, req: AddItem) -> Result<(), ProtocolError> {
        self.send(&Request::Add(req)).await
    }

    pub async fn remove_item(&self, req: RemoveItem) -> Result<(), ProtocolError> {
        self.send(&Request::Remove(req)).await
    }

    /// Wait for the next list update, skipping lifecycle events.
    ///
    /// Returns `None` once the connection is gone or the event receiver has
    /// been taken.
    pub async fn next_update(&mut self) -> Option<(String, ListDocument)> {
        let rx = self.event_rx.as_mut()?;
        loop {
            match rx.recv().await? {
                ClientEvent::ListUpdated { list_id, document } => return Some((list_id, document)),
                ClientEvent::Disconnected => return None,
                ClientEvent::Connected => {}
            }
        }
    }

    /// Drop the writer, which closes the socket.
    pub fn disconnect(&mut self) {
        self.outgoing_tx = None;
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}
