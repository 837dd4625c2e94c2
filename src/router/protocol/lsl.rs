//! LSL-like adapter.
//!
//! There is no real lab-streaming-layer transport here: the "protocol" is an
//! in-process pull API, the same shape `liminal`'s `Subscriber::Flume`
//! variant gives processors. A producer phase pushes samples onto a bounded
//! `flume` channel; the router pulls from it exactly like any other ingress.
//! Egress is the mirror: consumers pull finished packets off their own
//! channel rather than the router pushing over a socket.

use std::time::Duration;

use async_trait::async_trait;
use flume::{Receiver, Sender};

use crate::error::OrchestratorError;
use crate::router::packet::StreamPacket;
use crate::router::protocol::{Egress, Ingress};

const CHANNEL_CAPACITY: usize = 256;

pub struct LslIngress {
    stream_name: String,
    tx: Sender<StreamPacket>,
    rx: Receiver<StreamPacket>,
}

impl LslIngress {
    pub fn new(stream_name: String) -> Self {
        let (tx, rx) = flume::bounded(CHANNEL_CAPACITY);
        Self { stream_name, tx, rx }
    }

    /// Handle a producer phase uses to push pulled samples into the router.
    pub fn sample_sender(&self) -> Sender<StreamPacket> {
        self.tx.clone()
    }
}

#[async_trait]
impl Ingress for LslIngress {
    /// There is no handshake: the channel exists from construction.
    async fn accept(&mut self) -> Result<(), OrchestratorError> {
        Ok(())
    }

    async fn read_packet(&mut self) -> Result<Option<StreamPacket>, OrchestratorError> {
        match self.rx.recv_async().await {
            Ok(packet) => Ok(Some(packet)),
            Err(flume::RecvError::Disconnected) => Ok(None),
        }
    }
}

pub struct LslEgress {
    stream_name: String,
    tx: Sender<StreamPacket>,
    rx: Receiver<StreamPacket>,
}

impl LslEgress {
    pub fn new(stream_name: String) -> Self {
        let (tx, rx) = flume::bounded(CHANNEL_CAPACITY);
        Self { stream_name, tx, rx }
    }

    /// Handle a consumer phase uses to pull delivered samples back out.
    pub fn sample_receiver(&self) -> Receiver<StreamPacket> {
        self.rx.clone()
    }
}

#[async_trait]
impl Egress for LslEgress {
    /// No dial step for an in-process channel.
    async fn connect(&mut self, _dial_timeout: Duration) -> Result<(), OrchestratorError> {
        Ok(())
    }

    async fn write_packet(&mut self, packet: &StreamPacket) -> Result<(), OrchestratorError> {
        self.tx
            .send_async(packet.clone())
            .await
            .map_err(|_| OrchestratorError::ConsumerUnreachable {
                stream: self.stream_name.clone(),
                consumer: "in-process".to_string(),
                reason: "consumer channel closed".to_string(),
            })
    }
}
