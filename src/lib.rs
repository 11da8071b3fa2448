//! AMQP 1.0 Protocol Implementation in Rust
//!
//! This library provides an AMQP 1.0 client protocol engine: connection,
//! session, and link state machines, a message model, and a transport
//! contract an embedder supplies its own socket/TLS implementation for.
//!
//! # Features
//!
//! - **Connection/session/link lifecycle**: a single generic resource state
//!   machine (`resource`) shared across all three
//! - **Async/Await**: built on top of Tokio
//! - **Type Safety**: strongly typed AMQP values and messages
//! - **Builder Pattern**: fluent builder APIs for configuration
//! - **Error Handling**: a `thiserror`-derived error taxonomy, including
//!   delivery-outcome errors (rejected/released/modified)
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use dumq_amqp::prelude::*;
//! use dumq_amqp::transport::LoopbackTransport;
//! use tokio::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut connection = ConnectionBuilder::new()
//!         .hostname("localhost")
//!         .port(5672)
//!         .timeout(Duration::from_secs(30))
//!         .container_id("my-app")
//!         .build(Box::new(LoopbackTransport::new()));
//!
//!     connection.open().await?;
//!
//!     let session_request = connection.create_session().await?;
//!     session_request.wait().await?;
//!
//!     let session = connection.session(0).unwrap();
//!     let handle = session.create_sender(LinkBuilder::new().name("my-sender").target("my-queue").build_config())?;
//!     let sender = session.sender(handle).unwrap();
//!     sender.attach()?;
//!     sender.on_attached();
//!
//!     let message = Message::text("Hello, AMQP!");
//!     let (delivery_id, request) = session.send(handle, message)?;
//!     println!("Message sent with delivery ID: {}", delivery_id);
//!     request.wait().await?;
//!
//!     connection.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Core Concepts
//!
//! ## AMQP Values
//!
//! ```rust
//! use dumq_amqp::types::AmqpValue;
//!
//! let values = vec![
//!     AmqpValue::String("Hello".to_string()),
//!     AmqpValue::Int(42),
//!     AmqpValue::Boolean(true),
//!     AmqpValue::Double(3.14159),
//!     AmqpValue::Uuid(uuid::Uuid::new_v4()),
//!     AmqpValue::Binary(vec![1, 2, 3, 4]),
//! ];
//! ```
//!
//! ## Messages
//!
//! ```rust
//! use dumq_amqp::message::Message;
//! use dumq_amqp::types::AmqpSymbol;
//!
//! let text_msg = Message::text("Hello, World!");
//! let binary_msg = Message::binary(b"Binary data".to_vec());
//!
//! let complex_msg = Message::builder()
//!     .build()
//!     .with_message_id("msg-001")
//!     .with_subject("Test Message")
//!     .with_content_type(AmqpSymbol::from("text/plain"));
//! ```
//!
//! # Architecture
//!
//! - **`connection`**: handshake, heartbeat, session multiplexing
//! - **`session`**: flow control windows, link handle table, acknowledgement policy
//! - **`link`**: sender/receiver credit, settlement, redelivery
//! - **`message`**: AMQP message structures
//! - **`codec`**: message/body codec bridge (opaque and typed object payloads)
//! - **`types`**: AMQP value types and data structures
//! - **`transport`**: transport contract the engine is written against
//! - **`resource`**: the generic open/close state machine shared by
//!   connection/session/link
//! - **`request`**: the oneshot-backed async completion ledger
//! - **`factory`**: connection-factory configuration and URI parsing
//! - **`error`**: error taxonomy

pub mod types;
pub mod condition;
pub mod error;
pub mod request;
pub mod resource;
pub mod connection;
pub mod session;
pub mod link;
pub mod message;
pub mod codec;
pub mod transport;
pub mod factory;

pub use types::{AmqpValue, AmqpSymbol, AmqpList, AmqpMap, SenderSettleMode, ReceiverSettleMode, TerminusDurability, TerminusExpiryPolicy};
pub use condition::{AmqpCondition, AmqpErrorCondition, ConditionCategory};
pub use message::{Message, MessageBuilder, Properties, Header, Body};
pub use error::{AmqpError, AmqpResult};
pub use request::Request;
pub use connection::{Connection, ConnectionBuilder};
pub use session::{Session, SessionBuilder};
pub use link::{LinkBuilder, Sender, Receiver};
pub use factory::{ConnectionFactory, ConnectionFactoryConfig};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        Connection, ConnectionBuilder,
        Session, SessionBuilder,
        LinkBuilder, Sender, Receiver,
        Message, MessageBuilder,
        Request,
        AmqpError, AmqpResult,
        AmqpValue, AmqpSymbol, AmqpList, AmqpMap, AmqpCondition, AmqpErrorCondition, ConditionCategory,
        SenderSettleMode, ReceiverSettleMode, Properties, Header, Body,
        ConnectionFactory, ConnectionFactoryConfig,
    };
}
