//! AMQP 1.0 Error Handling
//!
//! This module provides comprehensive error handling for AMQP 1.0 operations.
//! It defines error types for various failure scenarios and provides convenient
//! constructors for creating specific error instances.
//!
//! # Overview
//!
//! The error system is designed to provide detailed information about what went
//! wrong during AMQP operations, making it easier to debug and handle errors
//! appropriately. A failure tied to a specific outstanding request (send,
//! receive, durable-unsubscribe) completes that request with the error and
//! nothing else; a failure with no single owner closes the owning resource
//! and is additionally surfaced through a connection's exception listener.
//!
//! # Error Types
//!
//! - **Connection**: Errors related to connection establishment and management
//! - **Session**: Errors related to session operations
//! - **Link**: Errors related to sender and receiver links
//! - **Transport**: Low-level transport errors
//! - **Encoding/Decoding**: Errors in AMQP value serialization/deserialization
//! - **Protocol**: AMQP protocol violations
//! - **Timeout**: Operation timeouts
//! - **IO**: Standard I/O errors
//! - **Serialization**: JSON serialization errors
//! - **InvalidState**: State machine violations
//! - **NotImplemented**: Unimplemented features
//! - **Configuration**: Malformed connection-factory configuration
//! - **SubscriptionInUse / NoSuchSubscription**: Durable-subscription lifecycle errors
//! - **Rejected / Released / Modified**: Delivery outcomes reported through disposition
//!
//! # Examples
//!
//! ## Error Handling
//!
//! ```rust
//! use dumq_amqp::error::{AmqpError, AmqpResult};
//!
//! fn handle_amqp_operation() -> AmqpResult<()> {
//!     match some_operation() {
//!         Ok(result) => Ok(result),
//!         Err(AmqpError::Connection(msg)) => {
//!             eprintln!("Connection error: {}", msg);
//!             Err(AmqpError::connection("Failed to connect"))
//!         }
//!         Err(AmqpError::Timeout(msg)) => {
//!             eprintln!("Timeout error: {}", msg);
//!             Err(AmqpError::timeout("Operation timed out"))
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! ```
//!
//! ## Creating Custom Errors
//!
//! ```rust
//! use dumq_amqp::error::AmqpError;
//!
//! // Create specific error types
//! let conn_error = AmqpError::connection("Failed to establish connection");
//! let timeout_error = AmqpError::timeout("Operation timed out");
//! let state_error = AmqpError::invalid_state("Connection is not open");
//! ```

use thiserror::Error;
use crate::condition::AmqpCondition;

/// AMQP 1.0 specific error types
#[derive(Error, Debug)]
pub enum AmqpError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Link error: {0}")]
    Link(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// AMQP protocol error with condition code
    #[error("AMQP error: {condition} - {description}")]
    AmqpProtocol {
        condition: AmqpCondition,
        description: String,
    },

    /// Malformed or unrecognized connection-factory configuration, including
    /// an unrecognized `jms.`-prefixed remoteURI query parameter.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A destination name does not refer to anything the peer recognizes.
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// Attach to a durable subscription that another consumer already holds open.
    #[error("Durable subscription '{0}' is already in use")]
    SubscriptionInUse(String),

    /// Unsubscribe requested for a durable subscription the peer has no record of.
    #[error("No such durable subscription: '{0}'")]
    NoSuchSubscription(String),

    /// The peer's disposition settled a delivery as `rejected`.
    #[error("Delivery rejected: {0}")]
    Rejected(String),

    /// The peer's disposition settled a delivery as `released`.
    #[error("Delivery released")]
    Released,

    /// The peer's disposition settled a delivery as `modified`.
    #[error("Delivery modified (delivery-failed={delivery_failed}, undeliverable-here={undeliverable_here})")]
    Modified {
        delivery_failed: bool,
        undeliverable_here: bool,
    },
}

/// Result type for AMQP operations
pub type AmqpResult<T> = Result<T, AmqpError>;

impl AmqpError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        AmqpError::Connection(msg.into())
    }

    /// Create a session error
    pub fn session(msg: impl Into<String>) -> Self {
        AmqpError::Session(msg.into())
    }

    /// Create a link error
    pub fn link(msg: impl Into<String>) -> Self {
        AmqpError::Link(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        AmqpError::Transport(msg.into())
    }

    /// Create an encoding error
    pub fn encoding(msg: impl Into<String>) -> Self {
        AmqpError::Encoding(msg.into())
    }

    /// Create a decoding error
    pub fn decoding(msg: impl Into<String>) -> Self {
        AmqpError::Decoding(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        AmqpError::Protocol(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        AmqpError::Timeout(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        AmqpError::InvalidState(msg.into())
    }

    /// Create a not implemented error
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        AmqpError::NotImplemented(msg.into())
    }

    /// Create an AMQP protocol error with condition code
    pub fn amqp_protocol(condition: AmqpCondition, description: impl Into<String>) -> Self {
        AmqpError::AmqpProtocol {
            condition,
            description: description.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        AmqpError::Configuration(msg.into())
    }

    /// Create an invalid-destination error
    pub fn invalid_destination(msg: impl Into<String>) -> Self {
        AmqpError::InvalidDestination(msg.into())
    }

    /// Create a subscription-in-use error
    pub fn subscription_in_use(name: impl Into<String>) -> Self {
        AmqpError::SubscriptionInUse(name.into())
    }

    /// Create a no-such-subscription error
    pub fn no_such_subscription(name: impl Into<String>) -> Self {
        AmqpError::NoSuchSubscription(name.into())
    }

    /// Create a rejected-delivery error
    pub fn rejected(msg: impl Into<String>) -> Self {
        AmqpError::Rejected(msg.into())
    }

    /// Get the error condition if this is an AMQP protocol error
    pub fn condition(&self) -> Option<&AmqpCondition> {
        match self {
            AmqpError::AmqpProtocol { condition, .. } => Some(condition),
            _ => None,
        }
    }

    /// Get the error code as a string
    pub fn error_code(&self) -> &str {
        match self {
            AmqpError::Connection(_) => "connection-error",
            AmqpError::Session(_) => "session-error",
            AmqpError::Link(_) => "link-error",
            AmqpError::Transport(_) => "transport-error",
            AmqpError::Encoding(_) => "encoding-error",
            AmqpError::Decoding(_) => "decoding-error",
            AmqpError::Protocol(_) => "protocol-error",
            AmqpError::Timeout(_) => "timeout-error",
            AmqpError::Io(_) => "io-error",
            AmqpError::Serialization(_) => "serialization-error",
            AmqpError::InvalidState(_) => "invalid-state-error",
            AmqpError::NotImplemented(_) => "not-implemented-error",
            AmqpError::AmqpProtocol { condition, .. } => condition.as_str(),
            AmqpError::Configuration(_) => "configuration-error",
            AmqpError::InvalidDestination(_) => "invalid-destination-error",
            AmqpError::SubscriptionInUse(_) => "subscription-in-use-error",
            AmqpError::NoSuchSubscription(_) => "no-such-subscription-error",
            AmqpError::Rejected(_) => "rejected-error",
            AmqpError::Released => "released-error",
            AmqpError::Modified { .. } => "modified-error",
        }
    }

    pub fn error_code_num(&self) -> u16 {
        match self {
            AmqpError::AmqpProtocol { condition, .. } => condition.code_num(),
            _ => 500,
        }
    }

    /// Whether this error represents a delivery outcome (rejected/released/modified)
    /// reported via disposition, rather than a connection/session/link-level failure.
    pub fn is_delivery_outcome(&self) -> bool {
        matches!(self, AmqpError::Rejected(_) | AmqpError::Released | AmqpError::Modified { .. })
    }
}
