//! Transport contract
//!
//! The byte-level transport (real sockets, TLS) is out of scope for this
//! crate: the protocol engine is written against a trait, and a real
//! deployment supplies its own implementation of it. What's defined here is
//! the contract itself, matching the external interface the engine expects
//! (`connect`/`is_connected`/`close`/`send`/`allocate_send_buffer` plus a
//! listener for inbound data and transport-level failures), and a
//! `LoopbackTransport` test double the crate's own test suite uses to drive
//! connection/session/link engines end-to-end without a real broker.
//!
//! Frames themselves keep the teacher's `Frame`/`FrameHeader` shape: the
//! transport moves opaque byte buffers, and `Frame` is the typed view the
//! engine puts on top of one.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{AmqpError, AmqpResult};

/// AMQP 1.0 Frame types
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Amqp = 0x00,
    Sasl = 0x01,
}

/// AMQP 1.0 frame header. Kept as the typed payload shape the connection and
/// session engines exchange over a [`Transport`]; the byte representation is
/// only ever used between this crate and its own test transport.
#[derive(Debug, Clone)]
pub struct FrameHeader {
    pub size: u32,
    pub data_offset: u8,
    pub frame_type: u8,
    pub channel: u16,
}

impl FrameHeader {
    pub fn new(size: u32, frame_type: u8, channel: u16) -> Self {
        FrameHeader {
            size,
            data_offset: 2,
            frame_type,
            channel,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = BytesMut::new();
        buffer.put_u32(self.size);
        buffer.put_u8(self.data_offset);
        buffer.put_u8(self.frame_type);
        buffer.put_u16(self.channel);
        buffer.to_vec()
    }

    pub fn decode(data: &[u8]) -> AmqpResult<Self> {
        if data.len() < 8 {
            return Err(AmqpError::decoding("insufficient data for frame header"));
        }
        let mut buffer = Bytes::copy_from_slice(data);
        Ok(FrameHeader {
            size: buffer.get_u32(),
            data_offset: buffer.get_u8(),
            frame_type: buffer.get_u8(),
            channel: buffer.get_u16(),
        })
    }
}

/// A single AMQP frame: header plus an opaque performative payload.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(header: FrameHeader, payload: Vec<u8>) -> Self {
        Frame { header, payload }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(&self.header.encode());
        buffer.extend_from_slice(&self.payload);
        buffer.to_vec()
    }

    pub fn decode(data: &[u8]) -> AmqpResult<Self> {
        if data.len() < 8 {
            return Err(AmqpError::decoding("insufficient data for frame"));
        }
        let header = FrameHeader::decode(&data[..8])?;
        Ok(Frame {
            header,
            payload: data[8..].to_vec(),
        })
    }
}

/// Receives events from a [`Transport`]: inbound data, and the two ways a
/// transport can stop working (a clean close vs. an error).
pub trait TransportListener: Send + Sync {
    fn on_data(&self, buffer: Bytes);
    fn on_transport_closed(&self);
    fn on_transport_error(&self, cause: AmqpError);
}

/// The byte transport the protocol engine is written against. Real
/// implementations (TCP, TLS, WebSocket) live outside this crate.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&mut self) -> AmqpResult<()>;
    fn is_connected(&self) -> bool;
    async fn close(&mut self) -> AmqpResult<()>;
    async fn send(&mut self, buffer: Bytes) -> AmqpResult<()>;
    fn allocate_send_buffer(&self, size: usize) -> BytesMut;
    fn set_listener(&mut self, listener: Arc<dyn TransportListener>);
}

/// An in-memory transport that loops written bytes straight back to its own
/// listener (optionally through a peer's listener, for a two-party test
/// harness). Used only by this crate's test suite.
pub struct LoopbackTransport {
    connected: bool,
    listener: Option<Arc<dyn TransportListener>>,
    /// Another `LoopbackTransport`'s inbound buffer, if paired — writes here
    /// are delivered to the peer's listener rather than our own.
    peer_inbox: Option<Arc<Mutex<Vec<Bytes>>>>,
    inbox: Arc<Mutex<Vec<Bytes>>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        LoopbackTransport {
            connected: false,
            listener: None,
            peer_inbox: None,
            inbox: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create two transports wired to each other's inbox, so writes on one
    /// side are observed as `on_data` callbacks fed from the other.
    pub fn pair() -> (LoopbackTransport, LoopbackTransport) {
        let mut a = LoopbackTransport::new();
        let mut b = LoopbackTransport::new();
        a.peer_inbox = Some(b.inbox.clone());
        b.peer_inbox = Some(a.inbox.clone());
        (a, b)
    }

    /// Deliver everything written by the peer into our own listener. In a
    /// real transport this happens off an I/O reactor; here the test driver
    /// calls it explicitly to keep behavior deterministic.
    pub fn pump(&self) {
        if let Some(listener) = &self.listener {
            let mut buffered = self.inbox.lock().unwrap();
            for chunk in buffered.drain(..) {
                listener.on_data(chunk);
            }
        }
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn connect(&mut self) -> AmqpResult<()> {
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn close(&mut self) -> AmqpResult<()> {
        self.connected = false;
        if let Some(listener) = &self.listener {
            listener.on_transport_closed();
        }
        Ok(())
    }

    async fn send(&mut self, buffer: Bytes) -> AmqpResult<()> {
        if !self.connected {
            return Err(AmqpError::transport("transport is not connected"));
        }
        match &self.peer_inbox {
            Some(inbox) => {
                inbox.lock().unwrap().push(buffer);
                Ok(())
            }
            None => {
                self.inbox.lock().unwrap().push(buffer);
                Ok(())
            }
        }
    }

    fn allocate_send_buffer(&self, size: usize) -> BytesMut {
        BytesMut::with_capacity(size)
    }

    fn set_listener(&mut self, listener: Arc<dyn TransportListener>) {
        self.listener = Some(listener);
    }
}
