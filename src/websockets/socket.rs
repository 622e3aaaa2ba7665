use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::registry::ConnectionId;

/// Upper bound for one outbound transport write; a send that takes longer
/// counts as failed and tears the connection down
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Simple WebSocket abstraction - all we care about is send/receive
#[async_trait]
pub trait SocketWrapper: Send {
    /// Send a text message to the client
    async fn send_message(&mut self, message: String) -> Result<(), SocketError>;

    /// Receive the next text message from the client (None if connection
    /// closed)
    async fn receive_message(&mut self) -> Result<Option<String>, SocketError>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), SocketError>;
}

/// Handler for incoming WebSocket messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle an incoming message from the client
    async fn handle_message(&self, connection_id: ConnectionId, user_id: &str, message: String);
}

#[derive(Debug)]
pub enum SocketError {
    SendFailed(String),
    SendTimedOut,
    ReceiveFailed(String),
}

/// Direct implementation on axum's WebSocket
#[async_trait]
impl SocketWrapper for WebSocket {
    async fn send_message(&mut self, message: String) -> Result<(), SocketError> {
        self.send(Message::Text(message))
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }

    async fn receive_message(&mut self) -> Result<Option<String>, SocketError> {
        loop {
            match self.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Close(_))) => return Ok(None),
                // ignore binary/ping/pong frames
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(SocketError::ReceiveFailed(e.to_string())),
                // connection closed
                None => return Ok(None),
            }
        }
    }

    async fn close(&mut self) -> Result<(), SocketError> {
        self.send(Message::Close(None))
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }
}

/// A managed WebSocket connection
///
/// Owns the transport: pumps outbound frames from the registry channel to
/// the socket and feeds inbound client messages to the handler, until
/// either side closes.
pub struct Connection {
    pub connection_id: ConnectionId,
    pub user_id: String,
    socket: Box<dyn SocketWrapper>,
    outbound_receiver: mpsc::UnboundedReceiver<String>,
    message_handler: Arc<dyn MessageHandler>,
    send_timeout: Duration,
}

impl Connection {
    pub fn new(
        connection_id: ConnectionId,
        user_id: String,
        socket: Box<dyn SocketWrapper>,
        outbound_receiver: mpsc::UnboundedReceiver<String>,
        message_handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            connection_id,
            user_id,
            socket,
            outbound_receiver,
            message_handler,
            send_timeout: SEND_TIMEOUT,
        }
    }

    /// Connection with a custom send deadline, for tests
    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    /// Run the connection - handles both sending and receiving until
    /// disconnect
    pub async fn run(mut self) -> Result<(), SocketError> {
        loop {
            tokio::select! {
                // Outbound messages (from our app to the client)
                msg = self.outbound_receiver.recv() => {
                    match msg {
                        Some(message) => {
                            match timeout(self.send_timeout, self.socket.send_message(message)).await {
                                Ok(Ok(())) => {}
                                Ok(Err(e)) => return Err(e),
                                Err(_) => return Err(SocketError::SendTimedOut),
                            }
                        }
                        None => break, // Channel closed, disconnect
                    }
                }

                // Inbound messages (from the client to our app)
                msg = self.socket.receive_message() => {
                    match msg {
                        Ok(Some(message)) => {
                            self.message_handler
                                .handle_message(self.connection_id, &self.user_id, message)
                                .await;
                        }
                        Ok(None) => break, // Client disconnected
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        // Clean disconnect
        let _ = self.socket.close().await;
        Ok(())
    }
}
