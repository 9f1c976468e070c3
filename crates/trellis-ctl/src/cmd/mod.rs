//! CLI command modules.

pub mod connections;
pub mod debug;
pub mod http;
pub mod status;
