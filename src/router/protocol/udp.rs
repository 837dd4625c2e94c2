//! UDP datagram adapter: one datagram carries exactly one encoded packet.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use crate::error::OrchestratorError;
use crate::router::packet::StreamPacket;
use crate::router::protocol::{Egress, Ingress};

const MAX_DATAGRAM: usize = 64 * 1024;

pub struct UdpIngress {
    stream_name: String,
    port: u16,
    socket: Option<UdpSocket>,
}

impl UdpIngress {
    pub fn new(stream_name: String, port: u16) -> Self {
        Self {
            stream_name,
            port,
            socket: None,
        }
    }
}

#[async_trait]
impl Ingress for UdpIngress {
    async fn accept(&mut self) -> Result<(), OrchestratorError> {
        if self.socket.is_none() {
            let socket = UdpSocket::bind(("0.0.0.0", self.port))
                .await
                .map_err(|e| OrchestratorError::FrameDecodeError {
                    stream: self.stream_name.clone(),
                    reason: format!("failed to bind ingress port {}: {e}", self.port),
                })?;
            self.socket = Some(socket);
        }
        Ok(())
    }

    async fn read_packet(&mut self) -> Result<Option<StreamPacket>, OrchestratorError> {
        let Some(socket) = self.socket.as_ref() else {
            return Err(OrchestratorError::FrameDecodeError {
                stream: self.stream_name.clone(),
                reason: "read_packet called before accept".to_string(),
            });
        };

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, addr) = socket
            .recv_from(&mut buf)
            .await
            .map_err(|e| OrchestratorError::FrameDecodeError {
                stream: self.stream_name.clone(),
                reason: format!("recv failed: {e}"),
            })?;
        buf.truncate(n);
        tracing::trace!(stream = %self.stream_name, %addr, bytes = n, "datagram received");

        StreamPacket::decode(bytes::Bytes::from(buf), &self.stream_name).map(Some)
    }
}

pub struct UdpEgress {
    stream_name: String,
    host: String,
    port: u16,
    socket: Option<UdpSocket>,
}

impl UdpEgress {
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
impl Egress for UdpEgress {
    async fn connect(&mut self, dial_timeout: Duration) -> Result<(), OrchestratorError> {
        let target = format!("{}:{}", self.host, self.port);
        let bind_and_connect = async {
            let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
            socket.connect(&target).await?;
            Ok::<_, std::io::Error>(socket)
        };
        let socket = tokio::time::timeout(dial_timeout, bind_and_connect)
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
        self.socket = Some(socket);
        Ok(())
    }

    async fn write_packet(&mut self, packet: &StreamPacket) -> Result<(), OrchestratorError> {
        let Some(socket) = self.socket.as_ref() else {
            return Err(OrchestratorError::ConsumerUnreachable {
                stream: self.stream_name.clone(),
                consumer: format!("{}:{}", self.host, self.port),
                reason: "write before connect".to_string(),
            });
        };
        let encoded = packet.encode()?;
        socket
            .send(&encoded)
            .await
            .map(|_| ())
            .map_err(|e| OrchestratorError::ConsumerUnreachable {
                stream: self.stream_name.clone(),
                consumer: format!("{}:{}", self.host, self.port),
                reason: e.to_string(),
            })
    }
}
