//! Session engine
//!
//! A session multiplexes links over a connection: it owns the outgoing
//! delivery-id counter, the incoming/outgoing flow-control windows, the
//! handle table mapping link handles to links, and the acknowledgement
//! policy that decides when a received delivery's disposition is emitted.

use std::collections::HashMap;

use log::debug;
use uuid::Uuid;

use crate::error::{AmqpError, AmqpResult};
use crate::link::{DeliveryOutcome, LinkConfig, Receiver, Sender};
use crate::message::Message;
use crate::request::Request;
use crate::resource::Resource;
use crate::types::AmqpValue;

/// How the session decides when to emit a disposition for a received
/// delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcknowledgeMode {
    /// Emit accepted-settled as soon as the application's receive call
    /// returns normally.
    Auto,
    /// Dispositions are emitted only on an explicit acknowledge, which also
    /// acknowledges every prior unacknowledged delivery on the session.
    Client,
    /// Like `Auto`, but dispositions may be batched by the caller.
    DupsOk,
    /// Dispositions are buffered until commit; rollback releases or
    /// modifies buffered deliveries instead.
    Transacted,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub name: String,
    pub incoming_window: u32,
    pub outgoing_window: u32,
    pub properties: HashMap<String, AmqpValue>,
    pub acknowledge_mode: AcknowledgeMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            name: Uuid::new_v4().to_string(),
            incoming_window: 100,
            outgoing_window: 100,
            properties: HashMap::new(),
            acknowledge_mode: AcknowledgeMode::Auto,
        }
    }
}

/// AMQP 1.0 Session.
pub struct Session {
    config: SessionConfig,
    resource: Resource<()>,
    id: String,
    connection_id: String,
    channel: u16,
    senders: HashMap<u32, Sender>,
    receivers: HashMap<u32, Receiver>,
    next_handle: u32,
    next_outgoing_id: u32,
    /// Owning sender handle for every delivery-id still in flight, so a
    /// disposition can be routed to the one sender that sent it instead of
    /// being broadcast to every sender on the session.
    delivery_owners: HashMap<u32, u32>,
    /// Buffered (delivery, outcome) pairs awaiting commit, used only in
    /// `Transacted` mode.
    transaction_buffer: Vec<(u32, DeliveryOutcome)>,
}

impl Session {
    pub fn new(channel: u16, connection_id: String) -> Self {
        let id = format!("{}-session-{}", connection_id, channel);
        Session {
            config: SessionConfig::default(),
            resource: Resource::new(id.clone()),
            id,
            connection_id,
            channel,
            senders: HashMap::new(),
            receivers: HashMap::new(),
            next_handle: 0,
            next_outgoing_id: 0,
            delivery_owners: HashMap::new(),
            transaction_buffer: Vec::new(),
        }
    }

    pub fn begin(&mut self) -> AmqpResult<Request<()>> {
        self.resource.open()
    }

    pub fn on_begun(&mut self) {
        self.resource.on_remote_opened(());
    }

    /// End the session. Per §4.2's "children forcibly closed first" rule,
    /// this detaches every link before emitting `end`.
    pub fn end(&mut self) -> AmqpResult<Request<()>> {
        for sender in self.senders.values_mut() {
            let _ = sender.detach();
        }
        for receiver in self.receivers.values_mut() {
            let _ = receiver.detach();
        }
        self.resource.close()
    }

    pub fn on_ended(&mut self, err: Option<AmqpError>) {
        self.resource.on_remote_closed(err);
    }

    fn next_handle(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    pub fn next_outgoing_delivery_id(&mut self) -> u32 {
        let id = self.next_outgoing_id;
        self.next_outgoing_id += 1;
        id
    }

    pub fn create_sender(&mut self, config: LinkConfig) -> AmqpResult<u32> {
        if !self.resource.is_open() {
            return Err(AmqpError::invalid_state("session is not active"));
        }
        let handle = self.next_handle();
        let sender = Sender::new(config, self.id.clone());
        self.senders.insert(handle, sender);
        Ok(handle)
    }

    pub fn create_receiver(&mut self, config: LinkConfig) -> AmqpResult<u32> {
        if !self.resource.is_open() {
            return Err(AmqpError::invalid_state("session is not active"));
        }
        let handle = self.next_handle();
        let receiver = Receiver::new(config, self.id.clone());
        self.receivers.insert(handle, receiver);
        Ok(handle)
    }

    pub fn sender(&mut self, handle: u32) -> Option<&mut Sender> {
        self.senders.get_mut(&handle)
    }

    pub fn receiver(&mut self, handle: u32) -> Option<&mut Receiver> {
        self.receivers.get_mut(&handle)
    }

    /// Send `message` on the sender attached at `handle`, assigning it the
    /// next delivery-id from the session's own counter rather than a
    /// per-sender one, per the invariant that delivery-ids are strictly
    /// monotonic across the whole session.
    pub fn send(&mut self, handle: u32, message: Message) -> AmqpResult<(u32, Request<()>)> {
        if !self.senders.get(&handle).map(|s| s.is_open()).unwrap_or(false) {
            return Err(AmqpError::invalid_state(format!("no attached sender for handle {}", handle)));
        }
        let delivery_id = self.next_outgoing_delivery_id();
        let sender = self.senders.get_mut(&handle).expect("checked above");
        let request = sender.send(delivery_id, message)?;
        self.delivery_owners.insert(delivery_id, handle);
        Ok((delivery_id, request))
    }

    /// Route a `disposition` covering delivery-ids `first..=last` to the one
    /// sender that owns each id, looked up via the delivery-id -> handle
    /// ledger built by [`Session::send`]. A range that doesn't correspond to
    /// any outstanding delivery is a stale or duplicate disposition and is
    /// ignored; a range that partially overlaps the ledger (some ids known,
    /// others not) is a protocol violation and fails closed rather than
    /// settling the resolvable subset.
    pub fn route_disposition(
        &mut self,
        first: u32,
        last: u32,
        outcome_for: impl Fn(u32) -> DeliveryOutcome,
    ) -> AmqpResult<()> {
        if first > last {
            return Err(AmqpError::protocol(format!("malformed disposition range {}..{}", first, last)));
        }

        let known = (first..=last).filter(|id| self.delivery_owners.contains_key(id)).count();
        let span = (last - first + 1) as usize;
        if known == 0 {
            debug!("{}: disposition for unknown delivery range {}..{}", self.id, first, last);
            return Ok(());
        }
        if known != span {
            return Err(AmqpError::protocol(format!(
                "disposition range {}..{} partially overlaps in-flight deliveries",
                first, last
            )));
        }

        for delivery_id in first..=last {
            if let Some(handle) = self.delivery_owners.remove(&delivery_id) {
                if let Some(sender) = self.senders.get_mut(&handle) {
                    sender.on_disposition(delivery_id, outcome_for(delivery_id));
                }
            }
        }
        Ok(())
    }

    /// Apply the session's acknowledgement policy to a successfully
    /// delivered message. Returns the disposition that should be sent now,
    /// or `None` if the disposition is deferred (client-ack, or buffered in
    /// a transaction).
    pub fn acknowledge_policy_outcome(&mut self, delivery_id: u32) -> Option<DeliveryOutcome> {
        match self.config.acknowledge_mode {
            AcknowledgeMode::Auto | AcknowledgeMode::DupsOk => Some(DeliveryOutcome::Accepted),
            AcknowledgeMode::Client => None,
            AcknowledgeMode::Transacted => {
                self.transaction_buffer.push((delivery_id, DeliveryOutcome::Accepted));
                None
            }
        }
    }

    /// Explicit client-acknowledge: acknowledges `delivery_id` and every
    /// prior unacknowledged delivery on the session (tracked by the caller
    /// via `upto_and_including`).
    pub fn client_acknowledge(&mut self, upto_and_including: u32) -> Vec<u32> {
        (0..=upto_and_including).collect()
    }

    /// Commit a transacted session's buffered dispositions, returning them
    /// for the caller to actually send.
    pub fn commit(&mut self) -> Vec<(u32, DeliveryOutcome)> {
        std::mem::take(&mut self.transaction_buffer)
    }

    /// Roll back a transacted session: buffered deliveries are released (or
    /// modified with delivery-count incremented, left to the caller) rather
    /// than accepted.
    pub fn rollback(&mut self) -> Vec<(u32, DeliveryOutcome)> {
        std::mem::take(&mut self.transaction_buffer)
            .into_iter()
            .map(|(id, _)| (id, DeliveryOutcome::Released))
            .collect()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn channel(&self) -> u16 {
        self.channel
    }

    pub fn is_open(&self) -> bool {
        self.resource.is_open()
    }

    pub fn incoming_window(&self) -> u32 {
        self.config.incoming_window
    }

    pub fn outgoing_window(&self) -> u32 {
        self.config.outgoing_window
    }

    pub fn acknowledge_mode(&self) -> AcknowledgeMode {
        self.config.acknowledge_mode
    }
}

/// Session Builder.
#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    pub fn new() -> Self {
        SessionBuilder { config: SessionConfig::default() }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn incoming_window(mut self, size: u32) -> Self {
        self.config.incoming_window = size;
        self
    }

    pub fn outgoing_window(mut self, size: u32) -> Self {
        self.config.outgoing_window = size;
        self
    }

    pub fn acknowledge_mode(mut self, mode: AcknowledgeMode) -> Self {
        self.config.acknowledge_mode = mode;
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: AmqpValue) -> Self {
        self.config.properties.insert(key.into(), value);
        self
    }

    pub fn build(self, channel: u16, connection_id: String) -> Session {
        let mut session = Session::new(channel, connection_id);
        session.config = self.config;
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn begun_session() -> Session {
        let mut session = Session::new(1, "conn".to_string());
        session.begin().unwrap();
        session.on_begun();
        session
    }

    #[test]
    fn session_begin_transitions_to_open() {
        let session = begun_session();
        assert!(session.is_open());
        assert_eq!(session.id(), "conn-session-1");
    }

    #[test]
    fn create_sender_requires_open_session() {
        let mut session = Session::new(1, "conn".to_string());
        assert!(session.create_sender(LinkConfig::default()).is_err());
    }

    #[tokio::test]
    async fn disposition_range_settles_all_covered_deliveries() {
        let mut session = begun_session();
        let handle = session.create_sender(LinkConfig::default()).unwrap();
        {
            let sender = session.sender(handle).unwrap();
            sender.attach().unwrap();
            sender.on_attached();
        }
        let (id_a, req_a) = session.send(handle, Message::text("a")).unwrap();
        let (id_b, req_b) = session.send(handle, Message::text("b")).unwrap();

        session
            .route_disposition(id_a.min(id_b), id_a.max(id_b), |_| DeliveryOutcome::Accepted)
            .unwrap();

        assert!(req_a.wait().await.is_ok());
        assert!(req_b.wait().await.is_ok());
    }

    #[tokio::test]
    async fn delivery_ids_are_assigned_from_a_single_session_wide_counter() {
        let mut session = begun_session();
        let handle_a = session.create_sender(LinkConfig::default()).unwrap();
        let handle_b = session.create_sender(LinkConfig::default()).unwrap();
        for handle in [handle_a, handle_b] {
            let sender = session.sender(handle).unwrap();
            sender.attach().unwrap();
            sender.on_attached();
        }

        let (id_a1, _) = session.send(handle_a, Message::text("a1")).unwrap();
        let (id_b1, _) = session.send(handle_b, Message::text("b1")).unwrap();
        let (id_a2, _) = session.send(handle_a, Message::text("a2")).unwrap();

        assert_eq!([id_a1, id_b1, id_a2], [0, 1, 2]);
    }

    #[tokio::test]
    async fn disposition_routes_only_to_the_owning_sender() {
        let mut session = begun_session();
        let handle_a = session.create_sender(LinkConfig::default()).unwrap();
        let handle_b = session.create_sender(LinkConfig::default()).unwrap();
        for handle in [handle_a, handle_b] {
            let sender = session.sender(handle).unwrap();
            sender.attach().unwrap();
            sender.on_attached();
        }

        let (id_a, req_a) = session.send(handle_a, Message::text("a")).unwrap();
        let (id_b, req_b) = session.send(handle_b, Message::text("b")).unwrap();

        session.route_disposition(id_a, id_a, |_| DeliveryOutcome::Accepted).unwrap();

        assert!(req_a.wait().await.is_ok());
        assert_eq!(session.sender(handle_b).unwrap().in_flight_count(), 1);

        session.route_disposition(id_b, id_b, |_| DeliveryOutcome::Accepted).unwrap();
        assert!(req_b.wait().await.is_ok());
    }

    #[tokio::test]
    async fn disposition_range_partially_overlapping_in_flight_deliveries_fails_closed() {
        let mut session = begun_session();
        let handle = session.create_sender(LinkConfig::default()).unwrap();
        {
            let sender = session.sender(handle).unwrap();
            sender.attach().unwrap();
            sender.on_attached();
        }
        let (id, _req) = session.send(handle, Message::text("only")).unwrap();

        let err = session
            .route_disposition(id, id + 1, |_| DeliveryOutcome::Accepted)
            .unwrap_err();
        assert!(matches!(err, AmqpError::Protocol(_)));

        // The known half of the range must not have been settled by the
        // rejected call.
        assert_eq!(session.sender(handle).unwrap().in_flight_count(), 1);
    }

    #[tokio::test]
    async fn disposition_for_wholly_unknown_range_is_a_silent_no_op() {
        let mut session = begun_session();
        session.route_disposition(900, 901, |_| DeliveryOutcome::Accepted).unwrap();
    }

    #[test]
    fn auto_ack_mode_accepts_immediately() {
        let mut session = begun_session();
        let outcome = session.acknowledge_policy_outcome(1);
        assert_eq!(outcome, Some(DeliveryOutcome::Accepted));
    }

    #[test]
    fn client_ack_mode_defers_disposition() {
        let mut session = SessionBuilder::new()
            .acknowledge_mode(AcknowledgeMode::Client)
            .build(1, "conn".to_string());
        session.begin().unwrap();
        session.on_begun();
        assert_eq!(session.acknowledge_policy_outcome(1), None);
    }

    #[test]
    fn transacted_mode_buffers_until_commit() {
        let mut session = SessionBuilder::new()
            .acknowledge_mode(AcknowledgeMode::Transacted)
            .build(1, "conn".to_string());
        session.begin().unwrap();
        session.on_begun();
        assert_eq!(session.acknowledge_policy_outcome(1), None);
        let committed = session.commit();
        assert_eq!(committed.len(), 1);
    }

    #[test]
    fn rollback_releases_buffered_deliveries() {
        let mut session = SessionBuilder::new()
            .acknowledge_mode(AcknowledgeMode::Transacted)
            .build(1, "conn".to_string());
        session.begin().unwrap();
        session.on_begun();
        session.acknowledge_policy_outcome(1);
        let rolled_back = session.rollback();
        assert_eq!(rolled_back, vec![(1, DeliveryOutcome::Released)]);
    }
}
