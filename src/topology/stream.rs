//! Stream declarations: the hypergraph's named multicast channels.

use serde::Deserialize;

/// Wire protocol a stream's router speaks with its ingress and consumers.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// LSL-like sample outlet: pulled samples, each becomes one packet.
    LslLike,
    /// TCP length-prefixed frames (see `router::packet` for the wire form).
    Tcp,
    /// WebSocket messages; one message per packet.
    WebSocket,
    /// UDP datagrams; one datagram per packet.
    Udp,
}

/// Opaque schema metadata a stream may carry (channel count, sample rate,
/// ...). The core never interprets this; it is forwarded verbatim in the
/// status snapshot for monitoring layers built atop the core.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct SchemaMetadata {
    #[serde(flatten)]
    pub fields: std::collections::HashMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Stream {
    pub name: String,
    pub protocol: Protocol,
    pub port: u16,
    #[serde(default = "Stream::default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default)]
    pub schema: Option<SchemaMetadata>,
}

impl Stream {
    fn default_buffer_size() -> usize {
        128
    }
}
