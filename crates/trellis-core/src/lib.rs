//! trellis-core — shared types, wire format, identity and configuration.
//! All other Trellis crates depend on this one.

pub mod config;
pub mod identity;
pub mod version;
pub mod wire;

pub use identity::{IdentityError, NodeType, ParsedIdentity};
pub use wire::{DiscoveryRequest, DiscoveryResponse, ErrorDetail, Node, Resource, CLUSTER_TYPE_URL};
