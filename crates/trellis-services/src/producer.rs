//! Collaborator seams: resource generation and identity parsing.
//!
//! Both are called from many stream handlers at once and must be safe for
//! unlimited concurrent use.

use anyhow::Result;
use trellis_core::identity::{parse_service_node, IdentityError};
use trellis_core::{ParsedIdentity, Resource};

/// Builds the resources a proxy should currently receive.
///
/// Implementations own their view of the service graph. Must not have side effects.
pub trait ResourceProducer: Send + Sync {
    fn build_resources(&self, identity: &ParsedIdentity) -> Result<Vec<Resource>>;
}

impl<F> ResourceProducer for F
where
    F: Fn(&ParsedIdentity) -> Result<Vec<Resource>> + Send + Sync,
{
    fn build_resources(&self, identity: &ParsedIdentity) -> Result<Vec<Resource>> {
        self(identity)
    }
}

/// Turns the node id a proxy reports into a structured identity.
pub trait IdentityParser: Send + Sync {
    fn parse(&self, node_id: &str) -> Result<ParsedIdentity, IdentityError>;
}

impl<F> IdentityParser for F
where
    F: Fn(&str) -> Result<ParsedIdentity, IdentityError> + Send + Sync,
{
    fn parse(&self, node_id: &str) -> Result<ParsedIdentity, IdentityError> {
        self(node_id)
    }
}

/// Parses the `type~ip~id~domain` node id convention.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceNodeParser;

impl IdentityParser for ServiceNodeParser {
    fn parse(&self, node_id: &str) -> Result<ParsedIdentity, IdentityError> {
        parse_service_node(node_id)
    }
}
