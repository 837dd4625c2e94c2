//! TCP length-prefixed frame adapter.
//!
//! Ingress is a server: the router owns the stream's port and accepts the
//! one producer connection. Egress is a client: the router dials out to
//! each registered consumer (grounded on `liminal::processors::common::tcp`'s
//! client/server `TcpConnection`, generalised to the router's own framing).

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::OrchestratorError;
use crate::router::packet::StreamPacket;
use crate::router::protocol::{Egress, Ingress};

/// Read once per packet, up to this many bytes of payload, matching the
/// spec's "bounded chunk per read" framing.
const MAX_PAYLOAD_CHUNK: usize = 64 * 1024;
const HEADER_LEN: usize = 20;

pub struct TcpIngress {
    stream_name: String,
    listener: Option<TcpListener>,
    port: u16,
    conn: Option<TcpStream>,
}

impl TcpIngress {
    pub fn new(stream_name: String, port: u16) -> Self {
        Self {
            stream_name,
            listener: None,
            port,
            conn: None,
        }
    }
}

#[async_trait]
impl Ingress for TcpIngress {
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
        tracing::info!(stream = %self.stream_name, %addr, "producer connected");
        self.conn = Some(stream);
        Ok(())
    }

    async fn read_packet(&mut self) -> Result<Option<StreamPacket>, OrchestratorError> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(OrchestratorError::FrameDecodeError {
                stream: self.stream_name.clone(),
                reason: "read_packet called before accept".to_string(),
            });
        };

        let mut header = [0u8; HEADER_LEN];
        match conn.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.conn = None;
                return Ok(None);
            }
            Err(e) => {
                self.conn = None;
                return Err(OrchestratorError::FrameDecodeError {
                    stream: self.stream_name.clone(),
                    reason: format!("header read failed: {e}"),
                });
            }
        }

        let metadata_len = u32::from_be_bytes(header[16..20].try_into().unwrap()) as usize;
        let mut metadata_buf = vec![0u8; metadata_len];
        conn.read_exact(&mut metadata_buf)
            .await
            .map_err(|e| OrchestratorError::FrameDecodeError {
                stream: self.stream_name.clone(),
                reason: format!("metadata read failed: {e}"),
            })?;

        let mut payload_buf = vec![0u8; MAX_PAYLOAD_CHUNK];
        let n = conn
            .read(&mut payload_buf)
            .await
            .map_err(|e| OrchestratorError::FrameDecodeError {
                stream: self.stream_name.clone(),
                reason: format!("payload read failed: {e}"),
            })?;
        payload_buf.truncate(n);

        let mut frame = bytes::BytesMut::with_capacity(HEADER_LEN + metadata_buf.len() + payload_buf.len());
        frame.extend_from_slice(&header);
        frame.extend_from_slice(&metadata_buf);
        frame.extend_from_slice(&payload_buf);

        StreamPacket::decode(frame.freeze(), &self.stream_name).map(Some)
    }
}

pub struct TcpEgress {
    stream_name: String,
    host: String,
    port: u16,
    conn: Option<TcpStream>,
}

impl TcpEgress {
    pub fn new(stream_name: String, host: String, port: u16) -> Self {
        Self {
            stream_name,
            host,
            port,
            conn: None,
        }
    }
}

#[async_trait]
impl Egress for TcpEgress {
    async fn connect(&mut self, dial_timeout: Duration) -> Result<(), OrchestratorError> {
        let target = format!("{}:{}", self.host, self.port);
        let conn = tokio::time::timeout(dial_timeout, TcpStream::connect(&target))
            .await
            .map_err(|_| OrchestratorError::ConsumerUnreachable {
                stream: self.stream_name.clone(),
                consumer: target.clone(),
                reason: "dial timed out".to_string(),
            })?
            .map_err(|e| OrchestratorError::ConsumerUnreachable {
                stream: self.stream_name.clone(),
                consumer: target.clone(),
                reason: e.to_string(),
            })?;
        self.conn = Some(conn);
        Ok(())
    }

    async fn write_packet(&mut self, packet: &StreamPacket) -> Result<(), OrchestratorError> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(OrchestratorError::ConsumerUnreachable {
                stream: self.stream_name.clone(),
                consumer: format!("{}:{}", self.host, self.port),
                reason: "write before connect".to_string(),
            });
        };
        let encoded = packet.encode()?;
        conn.write_all(&encoded)
            .await
            .map_err(|e| OrchestratorError::ConsumerUnreachable {
                stream: self.stream_name.clone(),
                consumer: format!("{}:{}", self.host, self.port),
                reason: e.to_string(),
            })
    }
}
