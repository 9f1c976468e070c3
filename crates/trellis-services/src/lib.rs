//! trellis-services — the discovery stream engine.
//!
//! One [`Connection`] per proxy stream, tracked in a [`ConnectionRegistry`].
//! Each stream is driven by a handler task plus a reader task; the
//! [`PushDispatcher`] fans an invalidation out to every registered
//! connection through its single-slot [`PushSignal`].

pub mod connection;
pub mod dispatch;
pub mod error;
pub mod graph;
mod handler;
pub mod memory;
pub mod producer;
pub mod registry;
pub mod server;
pub mod signal;
pub mod stream;
pub mod transport;

pub use connection::{Connection, ConnectionInfo};
pub use dispatch::{PushDispatcher, PushSummary};
pub use error::{DiscoveryError, StreamError};
pub use graph::{ClusterSpec, GraphError, GraphProducer, ServiceGraph};
pub use producer::{IdentityParser, ResourceProducer, ServiceNodeParser};
pub use registry::ConnectionRegistry;
pub use server::{DiscoveryServer, VerboseFlag};
pub use signal::{push_signal, PushReceiver, PushSignal, SignalOutcome};
pub use stream::{RequestSource, ResponseSink};
pub use transport::{DiscoveryListener, FrameReader, FrameWriter};
