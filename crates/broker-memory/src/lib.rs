//! In-memory implementation of the broker transport.
//!
//! Queues are declared and bound to the topic exchange explicitly, the same way a
//! subscription registry would do it on a real broker. Everything lives in the
//! process, so this is what the local runner and the tests use.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod broker;
mod connection;
mod error;
mod receiver;
mod routing;
mod sender;

pub use broker::MemoryBroker;
pub use connection::{MemoryConnection, MemoryConnector};
pub use error::Error;
pub use receiver::MemoryReceiver;
pub use routing::binding_matches;
pub use sender::MemorySender;
