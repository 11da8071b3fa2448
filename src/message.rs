//! AMQP 1.0 Message System
//!
//! This module provides the message structures and manipulation utilities for AMQP 1.0.
//! Messages are the primary unit of data transfer in AMQP 1.0 and can contain various
//! types of content and metadata.
//!
//! # Overview
//!
//! AMQP 1.0 messages consist of several sections:
//!
//! - **Header**: Contains delivery-related information
//! - **Delivery Annotations**: Transport-level annotations
//! - **Message Annotations**: Application-level annotations
//! - **Properties**: Application-level properties
//! - **Application Properties**: Custom application data
//! - **Body**: The actual message content
//! - **Footer**: Transport-level trailing information
//!
//! # Examples
//!
//! ## Creating Simple Messages
//!
//! ```rust
//! use dumq_amqp::message::Message;
//!
//! // Text message
//! let text_msg = Message::text("Hello, World!");
//!
//! // Binary message
//! let binary_msg = Message::binary(b"Binary data");
//! ```
//!
//! ## Creating Complex Messages
//!
//! ```rust
//! use dumq_amqp::message::{Message, MessageBuilder, Body};
//! use dumq_amqp::types::{AmqpValue, AmqpSymbol};
//!
//! let message = Message::builder()
//!     .body(Body::Value(AmqpValue::String("Custom content".to_string())))
//!     .build()
//!     .with_message_id("msg-001")
//!     .with_subject("Test Message")
//!     .with_content_type(AmqpSymbol::from("text/plain"));
//! ```
//!
//! ## Accessing Message Content
//!
//! ```rust
//! use dumq_amqp::message::Message;
//!
//! let message = Message::text("Hello, World!");
//!
//! // Get text content
//! if let Some(text) = message.body_as_text() {
//!     println!("Message text: {}", text);
//! }
//!
//! // Get binary content
//! if let Some(binary) = message.body_as_binary() {
//!     println!("Message binary: {:?}", binary);
//! }
//! ```

use crate::{AmqpMap, AmqpSymbol, AmqpValue, types::AmqpList};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message-annotations key carrying the JMS message-kind tag. Set by the
/// sending side, read by the receiving side in preference to content-type
/// or body-section shape when deciding how to surface a delivery.
pub const JMS_MSG_TYPE_ANNOTATION_KEY: &str = "x-opt-jms-msg-type";

/// Well-known content-type symbol for an opaque-serialized object body.
/// Stable and must match exactly across implementations.
pub const OPAQUE_OBJECT_CONTENT_TYPE: &str = "application/x-java-serialized-object";

/// Body-flavour tag carried in `x-opt-jms-msg-type`. Values follow the
/// stable wire tagging scheme; `Object` covers both opaque and AMQP-typed
/// ObjectMessage bodies, which are further distinguished by content-type and
/// section shape (see [`Message::resolve_body_kind`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JmsMsgKind {
    Message = 0,
    Object = 1,
    Map = 2,
    Bytes = 3,
    Stream = 4,
    Text = 5,
}

impl JmsMsgKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(JmsMsgKind::Message),
            1 => Some(JmsMsgKind::Object),
            2 => Some(JmsMsgKind::Map),
            3 => Some(JmsMsgKind::Bytes),
            4 => Some(JmsMsgKind::Stream),
            5 => Some(JmsMsgKind::Text),
            _ => None,
        }
    }
}

/// Resolved body flavour, used by receivers to decide how to surface a
/// delivery to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Text,
    Bytes,
    Map,
    Stream,
    /// Opaque application-serialized object in a `data` section.
    ObjectOpaque,
    /// Native AMQP-typed object in an `amqp-value` section.
    ObjectTyped,
    Unknown,
}

/// AMQP 1.0 Message structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message header
    pub header: Option<Header>,
    /// Message delivery annotations
    pub delivery_annotations: Option<AmqpMap>,
    /// Message annotations
    pub message_annotations: Option<AmqpMap>,
    /// Message properties
    pub properties: Option<Properties>,
    /// Application properties
    pub application_properties: Option<AmqpMap>,
    /// Message body
    pub body: Option<Body>,
    /// Footer
    pub footer: Option<AmqpMap>,
}

/// AMQP 1.0 Message Header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Whether the message is durable
    pub durable: Option<bool>,
    /// Priority of the message
    pub priority: Option<u8>,
    /// Time to live in milliseconds
    pub ttl: Option<u32>,
    /// Whether the message should be delivered at first head
    pub first_acquirer: Option<bool>,
    /// Delivery count
    pub delivery_count: Option<u32>,
}

impl Header {
    /// Create a new empty header
    pub fn new() -> Self {
        Header {
            durable: None,
            priority: None,
            ttl: None,
            first_acquirer: None,
            delivery_count: None,
        }
    }
}

impl Default for Header {
    fn default() -> Self {
        Header::new()
    }
}

/// AMQP 1.0 Message Properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    /// Message ID
    pub message_id: Option<AmqpValue>,
    /// User ID
    pub user_id: Option<Vec<u8>>,
    /// To address
    pub to: Option<String>,
    /// Subject
    pub subject: Option<String>,
    /// Reply to address
    pub reply_to: Option<String>,
    /// Correlation ID
    pub correlation_id: Option<AmqpValue>,
    /// Content type
    pub content_type: Option<AmqpSymbol>,
    /// Content encoding
    pub content_encoding: Option<AmqpSymbol>,
    /// Absolute expiry time
    pub absolute_expiry_time: Option<i64>,
    /// Creation time
    pub creation_time: Option<i64>,
    /// Group ID
    pub group_id: Option<String>,
    /// Group sequence
    pub group_sequence: Option<u32>,
    /// Reply to group ID
    pub reply_to_group_id: Option<String>,
}

impl Default for Properties {
    fn default() -> Self {
        Properties {
            message_id: None,
            user_id: None,
            to: None,
            subject: None,
            reply_to: None,
            correlation_id: None,
            content_type: None,
            content_encoding: None,
            absolute_expiry_time: None,
            creation_time: None,
            group_id: None,
            group_sequence: None,
            reply_to_group_id: None,
        }
    }
}

impl Properties {
    /// Create a new empty properties
    pub fn new() -> Self {
        Properties::default()
    }
}

/// AMQP 1.0 Message Body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Body {
    /// Data body (binary)
    Data(Vec<u8>),
    /// Amqp value body
    Value(AmqpValue),
    /// Amqp sequence body
    Sequence(AmqpList),
    /// Multiple data sections
    Multiple(Vec<Body>),
}

/// Message Builder for constructing AMQP 1.0 messages
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    message: Message,
}

impl MessageBuilder {
    /// Create a new message builder
    pub fn new() -> Self {
        MessageBuilder {
            message: Message {
                header: None,
                delivery_annotations: None,
                message_annotations: None,
                properties: None,
                application_properties: None,
                body: None,
                footer: None,
            },
        }
    }

    /// Set the message header
    pub fn header(mut self, header: Header) -> Self {
        self.message.header = Some(header);
        self
    }

    /// Set delivery annotations
    pub fn delivery_annotations(mut self, annotations: AmqpMap) -> Self {
        self.message.delivery_annotations = Some(annotations);
        self
    }

    /// Set message annotations
    pub fn message_annotations(mut self, annotations: AmqpMap) -> Self {
        self.message.message_annotations = Some(annotations);
        self
    }

    /// Set message properties
    pub fn properties(mut self, properties: Properties) -> Self {
        self.message.properties = Some(properties);
        self
    }

    /// Set application properties
    pub fn application_properties(mut self, properties: AmqpMap) -> Self {
        self.message.application_properties = Some(properties);
        self
    }

    /// Set message body
    pub fn body(mut self, body: Body) -> Self {
        self.message.body = Some(body);
        self
    }

    /// Set footer
    pub fn footer(mut self, footer: AmqpMap) -> Self {
        self.message.footer = Some(footer);
        self
    }

    /// Build the message
    pub fn build(self) -> Message {
        self.message
    }
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Message {
    /// Create a new empty message
    pub fn new() -> Self {
        Message {
            header: None,
            delivery_annotations: None,
            message_annotations: None,
            properties: None,
            application_properties: None,
            body: None,
            footer: None,
        }
    }

    /// Create a new message builder
    pub fn builder() -> MessageBuilder {
        MessageBuilder::new()
    }

    /// Create a simple text message
    pub fn text(text: impl Into<String>) -> Self {
        MessageBuilder::new()
            .body(Body::Value(AmqpValue::String(text.into())))
            .build()
    }

    /// Create a simple binary message
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        MessageBuilder::new()
            .body(Body::Data(data.into()))
            .build()
    }

    /// Get the message body as text if it's a string value
    pub fn body_as_text(&self) -> Option<&str> {
        match &self.body {
            Some(Body::Value(AmqpValue::String(s))) => Some(s),
            _ => None,
        }
    }

    /// Get the message body as binary data
    pub fn body_as_binary(&self) -> Option<&[u8]> {
        match &self.body {
            Some(Body::Data(data)) => Some(data),
            _ => None,
        }
    }

    /// Get the message ID as a string
    pub fn message_id_as_string(&self) -> Option<String> {
        match &self.properties {
            Some(props) => match &props.message_id {
                Some(AmqpValue::String(s)) => Some(s.clone()),
                Some(AmqpValue::Uuid(uuid)) => Some(uuid.to_string()),
                _ => None,
            },
            None => None,
        }
    }

    /// Set a simple message ID (string)
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        if self.properties.is_none() {
            self.properties = Some(Properties {
                message_id: None,
                user_id: None,
                to: None,
                subject: None,
                reply_to: None,
                correlation_id: None,
                content_type: None,
                content_encoding: None,
                absolute_expiry_time: None,
                creation_time: None,
                group_id: None,
                group_sequence: None,
                reply_to_group_id: None,
            });
        }
        
        if let Some(props) = &mut self.properties {
            props.message_id = Some(AmqpValue::String(id.into()));
        }
        
        self
    }

    /// Set a UUID message ID
    pub fn with_uuid_message_id(mut self, id: Uuid) -> Self {
        if self.properties.is_none() {
            self.properties = Some(Properties {
                message_id: None,
                user_id: None,
                to: None,
                subject: None,
                reply_to: None,
                correlation_id: None,
                content_type: None,
                content_encoding: None,
                absolute_expiry_time: None,
                creation_time: None,
                group_id: None,
                group_sequence: None,
                reply_to_group_id: None,
            });
        }
        
        if let Some(props) = &mut self.properties {
            props.message_id = Some(AmqpValue::Uuid(id));
        }
        
        self
    }

    /// Set the subject
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        if self.properties.is_none() {
            self.properties = Some(Properties {
                message_id: None,
                user_id: None,
                to: None,
                subject: None,
                reply_to: None,
                correlation_id: None,
                content_type: None,
                content_encoding: None,
                absolute_expiry_time: None,
                creation_time: None,
                group_id: None,
                group_sequence: None,
                reply_to_group_id: None,
            });
        }
        
        if let Some(props) = &mut self.properties {
            props.subject = Some(subject.into());
        }
        
        self
    }

    /// Create an ObjectMessage with an opaque, application-serialized body.
    /// Per §4.7: a single `data` section, `properties.content-type` set to
    /// the well-known opaque-object tag, and the JMS-type annotation marking
    /// it an ObjectMessage.
    pub fn object_opaque(serialized: impl Into<Vec<u8>>) -> Self {
        let mut message = MessageBuilder::new()
            .body(Body::Data(serialized.into()))
            .build()
            .with_content_type(AmqpSymbol::from(OPAQUE_OBJECT_CONTENT_TYPE))
            .with_jms_msg_kind(JmsMsgKind::Object);
        message.apply_default_durability();
        message
    }

    /// Create an ObjectMessage with a native AMQP-typed body (map, list, or
    /// scalar). Per the resolved Open Question in §9, no content-type is set
    /// on typed bodies.
    pub fn object_typed(value: AmqpValue) -> Self {
        let mut message = MessageBuilder::new()
            .body(Body::Value(value))
            .build()
            .with_jms_msg_kind(JmsMsgKind::Object);
        message.apply_default_durability();
        message
    }

    /// Tag this message with a JMS body-kind annotation.
    pub fn with_jms_msg_kind(mut self, kind: JmsMsgKind) -> Self {
        let mut annotations = self.message_annotations.take().unwrap_or_default();
        annotations.insert(
            AmqpSymbol::from(JMS_MSG_TYPE_ANNOTATION_KEY),
            AmqpValue::Ubyte(kind as u8),
        );
        self.message_annotations = Some(annotations);
        self
    }

    /// Read the JMS body-kind annotation, if present.
    pub fn jms_msg_kind(&self) -> Option<JmsMsgKind> {
        let annotations = self.message_annotations.as_ref()?;
        match annotations.get(&AmqpSymbol::from(JMS_MSG_TYPE_ANNOTATION_KEY))? {
            AmqpValue::Ubyte(v) => JmsMsgKind::from_u8(*v),
            _ => None,
        }
    }

    /// Resolve the effective body flavour for a received message. The
    /// `x-opt-jms-msg-type` annotation takes precedence; when absent, falls
    /// back to content-type, and finally to the raw body section shape.
    pub fn resolve_body_kind(&self) -> BodyKind {
        if let Some(JmsMsgKind::Object) = self.jms_msg_kind() {
            return match &self.body {
                Some(Body::Data(_)) => BodyKind::ObjectOpaque,
                Some(Body::Value(_)) => BodyKind::ObjectTyped,
                _ => BodyKind::Unknown,
            };
        }
        if let Some(kind) = self.jms_msg_kind() {
            return match kind {
                JmsMsgKind::Text => BodyKind::Text,
                JmsMsgKind::Bytes => BodyKind::Bytes,
                JmsMsgKind::Map => BodyKind::Map,
                JmsMsgKind::Stream => BodyKind::Stream,
                JmsMsgKind::Object | JmsMsgKind::Message => BodyKind::Unknown,
            };
        }

        let content_type_is_opaque = self
            .properties
            .as_ref()
            .and_then(|p| p.content_type.as_ref())
            .map(|ct| ct.as_str() == OPAQUE_OBJECT_CONTENT_TYPE)
            .unwrap_or(false);
        if content_type_is_opaque {
            return BodyKind::ObjectOpaque;
        }

        match &self.body {
            Some(Body::Data(_)) => BodyKind::Bytes,
            Some(Body::Value(AmqpValue::String(_))) => BodyKind::Text,
            Some(Body::Value(_)) => BodyKind::ObjectTyped,
            Some(Body::Sequence(_)) => BodyKind::Stream,
            Some(Body::Multiple(_)) => BodyKind::Unknown,
            None => BodyKind::Unknown,
        }
    }

    /// Set the content type
    pub fn with_content_type(mut self, content_type: impl Into<AmqpSymbol>) -> Self {
        if self.properties.is_none() {
            self.properties = Some(Properties {
                message_id: None,
                user_id: None,
                to: None,
                subject: None,
                reply_to: None,
                correlation_id: None,
                content_type: None,
                content_encoding: None,
                absolute_expiry_time: None,
                creation_time: None,
                group_id: None,
                group_sequence: None,
                reply_to_group_id: None,
            });
        }
        
        if let Some(props) = &mut self.properties {
            props.content_type = Some(content_type.into());
        }

        self
    }

    /// Explicitly mark the message non-durable (or durable). Overrides the
    /// default applied by [`Message::apply_default_durability`].
    pub fn with_durable(mut self, durable: bool) -> Self {
        let mut header = self.header.take().unwrap_or_default();
        header.durable = Some(durable);
        self.header = Some(header);
        self
    }

    /// Per §4.7: unless the application explicitly set non-durable, the
    /// header's durable bit is true. Leaves an explicit `Some(_)` alone and
    /// only fills in the default when durable was never set.
    pub fn apply_default_durability(&mut self) {
        let header = self.header.get_or_insert_with(Header::new);
        if header.durable.is_none() {
            header.durable = Some(true);
        }
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::text(text)
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Message::binary(data)
    }
}

#[cfg(test)]
mod object_message_tests {
    use super::*;

    #[test]
    fn opaque_object_message_sets_content_type_and_annotation() {
        let msg = Message::object_opaque(b"myObjectString".to_vec());
        assert_eq!(
            msg.properties.as_ref().unwrap().content_type.as_ref().unwrap().as_str(),
            OPAQUE_OBJECT_CONTENT_TYPE
        );
        assert_eq!(msg.jms_msg_kind(), Some(JmsMsgKind::Object));
        assert_eq!(msg.resolve_body_kind(), BodyKind::ObjectOpaque);
    }

    #[test]
    fn typed_object_message_does_not_set_content_type() {
        let mut map = AmqpMap::new();
        map.insert(AmqpSymbol::from("key"), AmqpValue::String("myObjectString".to_string()));
        let msg = Message::object_typed(AmqpValue::Map(map));
        assert!(msg.properties.is_none() || msg.properties.as_ref().unwrap().content_type.is_none());
        assert_eq!(msg.resolve_body_kind(), BodyKind::ObjectTyped);
    }

    #[test]
    fn resolve_by_annotation_takes_precedence_over_content_type() {
        // annotation says Object/typed even though content-type happens to be opaque
        let mut msg = Message::builder()
            .body(Body::Value(AmqpValue::Int(1)))
            .build()
            .with_jms_msg_kind(JmsMsgKind::Object)
            .with_content_type(AmqpSymbol::from(OPAQUE_OBJECT_CONTENT_TYPE));
        msg.body = Some(Body::Value(AmqpValue::Int(1)));
        assert_eq!(msg.resolve_body_kind(), BodyKind::ObjectTyped);
    }

    #[test]
    fn resolve_falls_back_to_content_type_without_annotation() {
        let msg = Message::builder()
            .body(Body::Data(b"expectedContent".to_vec()))
            .build()
            .with_content_type(AmqpSymbol::from(OPAQUE_OBJECT_CONTENT_TYPE));
        assert_eq!(msg.resolve_body_kind(), BodyKind::ObjectOpaque);
    }

    #[test]
    fn resolve_falls_back_to_section_shape() {
        let text = Message::text("hi");
        assert_eq!(text.resolve_body_kind(), BodyKind::Text);
        let bin = Message::binary(b"raw".to_vec());
        assert_eq!(bin.resolve_body_kind(), BodyKind::Bytes);
    }
} 