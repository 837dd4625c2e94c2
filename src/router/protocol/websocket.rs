//! WebSocket adapter: one message carries one packet. Unlike TCP/UDP, the
//! egress side writes the raw payload only (no fixed header) per spec; the
//! timestamp/sequence/metadata travel as the binary message's leading JSON
//! line is *not* used here — the router keeps them out-of-band in its own
//! bookkeeping and the wire only needs to carry the payload a consumer cares
//! about. Ingress still needs timestamp/sequence, so inbound messages use
//! the same header+metadata+payload layout as TCP/UDP.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, accept_async, connect_async};

use crate::error::OrchestratorError;
use crate::router::packet::StreamPacket;
use crate::router::protocol::{Egress, Ingress};

pub struct WebSocketIngress {
    stream_name: String,
    port: u16,
    listener: Option<TcpListener>,
    socket: Option<WebSocketStream<TcpStream>>,
}

impl WebSocketIngress {
    pub fn new(stream_name: String, port: u16) -> Self {
        Self {
            stream_name,
            port,
            listener: None,
            socket: None,
        }
    }
}

#[async_trait]
impl Ingress for WebSocketIngress {
    async fn accept(&mut self) -> Result<(), OrchestratorError> {
        if self.listener.is_none() {
            let listener = TcpListener::bind(("0.0.0.0", self.port))
                .await
                .map_err(|e| OrchestratorError::FrameDecodeError {
                    stream: self.stream_name.clone(),
                    reason: format!("failed to bind ingress port {}: {e}", self.port),
                })?;
            self.listener = Some(listener);
        }

        let listener = self.listener.as_ref().expect("just set above");
        let (stream, addr) = listener
            .accept()
            .await
            .map_err(|e| OrchestratorError::FrameDecodeError {
                stream: self.stream_name.clone(),
                reason: format!("accept failed: {e}"),
            })?;
        let ws = accept_async(stream)
            .await
            .map_err(|e| OrchestratorError::FrameDecodeError {
                stream: self.stream_name.clone(),
                reason: format!("websocket handshake failed: {e}"),
            })?;
        tracing::info!(stream = %self.stream_name, %addr, "producer connected");
        self.socket = Some(ws);
        Ok(())
    }

    async fn read_packet(&mut self) -> Result<Option<StreamPacket>, OrchestratorError> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(OrchestratorError::FrameDecodeError {
                stream: self.stream_name.clone(),
                reason: "read_packet called before accept".to_string(),
            });
        };

        loop {
            match socket.next().await {
                Some(Ok(Message::Binary(bytes))) => {
                    return StreamPacket::decode(bytes.into(), &self.stream_name).map(Some);
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.socket = None;
                    return Ok(None);
                }
                Some(Ok(_)) => continue, // ping/pong/text: ignore, keep reading
                Some(Err(e)) => {
                    self.socket = None;
                    return Err(OrchestratorError::FrameDecodeError {
                        stream: self.stream_name.clone(),
                        reason: format!("websocket read failed: {e}"),
                    });
                }
            }
        }
    }
}

pub struct WebSocketEgress {
    stream_name: String,
    host: String,
    port: u16,
    socket: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl WebSocketEgress {
    pub fn new(stream_name: String, host: String, port: u16) -> Self {
        Self {
            stream_name,
            host,
            port,
            socket: None,
        }
    }
}

#[async_trait]
impl Egress for WebSocketEgress {
    async fn connect(&mut self, dial_timeout: Duration) -> Result<(), OrchestratorError> {
        let url = format!("ws://{}:{}/{}", self.host, self.port, self.stream_name);
        let (socket, _) = tokio::time::timeout(dial_timeout, connect_async(&url))
            .await
            .map_err(|_| OrchestratorError::ConsumerUnreachable {
                stream: self.stream_name.clone(),
                consumer: url.clone(),
                reason: "dial timed out".to_string(),
            })?
            .map_err(|e| OrchestratorError::ConsumerUnreachable {
                stream: self.stream_name.clone(),
                consumer: url.clone(),
                reason: e.to_string(),
            })?;
        self.socket = Some(socket);
        Ok(())
    }

    async fn write_packet(&mut self, packet: &StreamPacket) -> Result<(), OrchestratorError> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(OrchestratorError::ConsumerUnreachable {
                stream: self.stream_name.clone(),
                consumer: format!("{}:{}", self.host, self.port),
                reason: "write before connect".to_string(),
            });
        };
        socket
            .send(Message::Binary(packet.payload.to_vec().into()))
            .await
            .map_err(|e| OrchestratorError::ConsumerUnreachable {
                stream: self.stream_name.clone(),
                consumer: format!("{}:{}", self.host, self.port),
                reason: e.to_string(),
            })
    }
}
