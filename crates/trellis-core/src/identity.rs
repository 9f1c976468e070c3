//! Proxy identity — parsed from the node id a proxy reports on its first request.
//!
//! Node ids follow the `type~ip~id~domain` convention, e.g.
//! `sidecar~10.4.0.7~reviews-v1-7d9f.bookinfo~bookinfo.svc.cluster.local`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const SEPARATOR: char = '~';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Sidecar,
    Ingress,
    Router,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Sidecar => "sidecar",
            NodeType::Ingress => "ingress",
            NodeType::Router => "router",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sidecar" => Ok(NodeType::Sidecar),
            "ingress" => Ok(NodeType::Ingress),
            "router" => Ok(NodeType::Router),
            _ => Err(()),
        }
    }
}

/// Structured proxy identity. Immutable once attached to a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedIdentity {
    pub node_type: NodeType,
    pub ip_address: String,
    /// Workload id, typically `<pod>.<namespace>`.
    pub id: String,
    /// DNS domain, typically `<namespace>.svc.cluster.local`.
    pub domain: String,
}

impl ParsedIdentity {
    /// Sidecar identity with only an id set. Handy for tests and simple parsers.
    pub fn sidecar(id: impl Into<String>) -> Self {
        Self {
            node_type: NodeType::Sidecar,
            ip_address: String::new(),
            id: id.into(),
            domain: String::new(),
        }
    }

    /// First label of the domain, which by convention is the namespace.
    pub fn namespace(&self) -> Option<&str> {
        self.domain.split('.').next().filter(|ns| !ns.is_empty())
    }

    /// Re-assemble the `type~ip~id~domain` form.
    pub fn service_node(&self) -> String {
        format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            self.node_type, self.ip_address, self.id, self.domain
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("missing parts in the service node {0:?}")]
    MissingParts(String),
    #[error("invalid node type (valid types: ingress, sidecar, router) in the service node {0:?}")]
    InvalidNodeType(String),
    #[error("empty workload id in the service node {0:?}")]
    EmptyId(String),
}

/// Parse a `type~ip~id~domain` node id.
pub fn parse_service_node(node: &str) -> Result<ParsedIdentity, IdentityError> {
    let parts: Vec<&str> = node.split(SEPARATOR).collect();
    if parts.len() != 4 {
        return Err(IdentityError::MissingParts(node.to_string()));
    }

    let node_type = parts[0]
        .parse::<NodeType>()
        .map_err(|_| IdentityError::InvalidNodeType(node.to_string()))?;

    if parts[2].is_empty() {
        return Err(IdentityError::EmptyId(node.to_string()));
    }

    Ok(ParsedIdentity {
        node_type,
        ip_address: parts[1].to_string(),
        id: parts[2].to_string(),
        domain: parts[3].to_string(),
    })
}
