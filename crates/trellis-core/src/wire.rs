//! Trellis wire format — discovery messages exchanged with proxies.
//!
//! The message shapes follow the v2 discovery protocol: a proxy sends a
//! `DiscoveryRequest` carrying its node description, the server answers with
//! a `DiscoveryResponse` holding an ordered list of opaque resources.
//!
//! On the reference TCP transport every message is one JSON object on its own
//! line. Resource payloads are opaque bytes and travel hex-encoded.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Type URL for cluster resources.
pub const CLUSTER_TYPE_URL: &str = "type.googleapis.com/envoy.api.v2.Cluster";

/// Upper bound on a frame body, not counting the `\n` terminator.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

// ── Messages ─────────────────────────────────────────────────────────────────

/// Self-description sent by a proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    /// Opaque node id, conventionally `type~ip~id~domain`.
    pub id: String,
    /// Service cluster the proxy belongs to.
    pub cluster: String,
    pub metadata: BTreeMap<String, String>,
}

/// Reason a proxy rejected a previous response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorDetail {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryRequest {
    /// Version of the last response the proxy accepted. Empty on the first request.
    pub version_info: String,
    /// Present on the first request of a stream; proxies may omit it afterwards.
    pub node: Option<Node>,
    pub resource_names: Vec<String>,
    pub type_url: String,
    /// Nonce of the response this request acknowledges.
    pub response_nonce: String,
    /// Set when the proxy rejected the response identified by `response_nonce`.
    pub error_detail: Option<ErrorDetail>,
}

impl DiscoveryRequest {
    /// First request of a stream for the given node id.
    pub fn initial(node_id: impl Into<String>, type_url: impl Into<String>) -> Self {
        Self {
            node: Some(Node {
                id: node_id.into(),
                ..Node::default()
            }),
            type_url: type_url.into(),
            ..Self::default()
        }
    }

    /// Acknowledgement (or rejection, when `error` is set) of `response`.
    pub fn ack(response: &DiscoveryResponse, error: Option<ErrorDetail>) -> Self {
        Self {
            version_info: response.version_info.clone(),
            type_url: response.type_url.clone(),
            response_nonce: response.nonce.clone(),
            error_detail: error,
            ..Self::default()
        }
    }
}

/// One opaque configuration object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub type_url: String,
    #[serde(with = "hex_bytes")]
    pub value: Bytes,
}

impl Resource {
    pub fn new(type_url: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            type_url: type_url.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryResponse {
    pub version_info: String,
    pub resources: Vec<Resource>,
    pub type_url: String,
    pub nonce: String,
}

// ── Framing ──────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("frame of {0} bytes exceeds the frame size limit")]
    FrameTooLarge(usize),
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Encode a message as a single newline-terminated frame.
pub fn encode_frame<T: Serialize>(msg: &T) -> Result<Vec<u8>, WireError> {
    let mut buf = serde_json::to_vec(msg)?;
    if buf.len() > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(buf.len()));
    }
    buf.push(b'\n');
    Ok(buf)
}

/// Decode one frame. Surrounding whitespace, including the line terminator, is ignored.
pub fn decode_frame<T: for<'de> Deserialize<'de>>(line: &[u8]) -> Result<T, WireError> {
    let body = line.strip_suffix(b"\n").unwrap_or(line);
    if body.len() > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(body.len()));
    }
    Ok(serde_json::from_slice(body.trim_ascii())?)
}

mod hex_bytes {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Bytes, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
        let text = String::deserialize(d)?;
        hex::decode(text)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
