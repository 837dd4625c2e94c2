//! Protocol adapters: one ingress/egress implementation per wire protocol,
//! modeled as a tagged sum type rather than a subclass hierarchy, per the
//! design notes.

pub mod lsl;
pub mod tcp;
pub mod udp;
pub mod websocket;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::OrchestratorError;
use crate::router::packet::StreamPacket;
use crate::topology::Protocol;

/// Where a router listens for its single producer.
#[async_trait]
pub trait Ingress: Send {
    /// Wait for (re)connection from the producer.
    async fn accept(&mut self) -> Result<(), OrchestratorError>;

    /// Read the next packet. `Ok(None)` means the producer disconnected
    /// cleanly; the router should log it and call `accept` again.
    async fn read_packet(&mut self) -> Result<Option<StreamPacket>, OrchestratorError>;
}

/// Where a router writes to one registered consumer.
#[async_trait]
pub trait Egress: Send {
    async fn connect(&mut self, dial_timeout: Duration) -> Result<(), OrchestratorError>;
    async fn write_packet(&mut self, packet: &StreamPacket) -> Result<(), OrchestratorError>;
}

/// Consumer dial target, protocol-tagged.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConsumerEndpoint {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
}

pub fn ingress_for(protocol: Protocol, stream: &str, port: u16) -> Box<dyn Ingress> {
    match protocol {
        Protocol::Tcp => Box::new(tcp::TcpIngress::new(stream.to_string(), port)),
        Protocol::Udp => Box::new(udp::UdpIngress::new(stream.to_string(), port)),
        Protocol::WebSocket => Box::new(websocket::WebSocketIngress::new(stream.to_string(), port)),
        Protocol::LslLike => Box::new(lsl::LslIngress::new(stream.to_string())),
    }
}

pub fn egress_for(endpoint: ConsumerEndpoint, stream: String) -> Box<dyn Egress> {
    match endpoint.protocol {
        Protocol::Tcp => Box::new(tcp::TcpEgress::new(stream, endpoint.host, endpoint.port)),
        Protocol::Udp => Box::new(udp::UdpEgress::new(stream, endpoint.host, endpoint.port)),
        Protocol::WebSocket => {
            Box::new(websocket::WebSocketEgress::new(stream, endpoint.host, endpoint.port))
        }
        Protocol::LslLike => Box::new(lsl::LslEgress::new(stream)),
    }
}
