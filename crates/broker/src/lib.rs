//! Abstract interface for the AMQP broker transport used by publishers and subscribers.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Connectors open connections to a broker.
pub mod connection;

/// Messages are the envelopes exchanged with the broker.
pub mod message;

/// Receivers stream messages out of a queue.
pub mod receiver;

/// Senders push messages into an exchange.
pub mod sender;

/// Connection settings (plain, TLS or SASL).
pub mod settings;

/// Sinks accept messages for a subject and report how the send went.
pub mod sink;

pub use connection::{Connection, Connector, TransportError};
pub use message::{DEFAULT_CONTENT_TYPE, Message};
pub use receiver::Receiver;
pub use sender::Sender;
pub use settings::{BrokerOptions, ConnectionSettings, Security};
pub use sink::{CreditSender, MessageSink, SendOutcome};

/// Exchange every publisher sends to; the message subject is the routing key.
pub const TOPIC_EXCHANGE_ENDPOINT: &str = "/exchange/amq.topic";
