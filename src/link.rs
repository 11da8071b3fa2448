//! Sender and Receiver link engines
//!
//! A link is attached within a session and moves messages in one direction.
//! Both roles share the same open/close lifecycle (handled by
//! [`crate::resource::Resource`]) but differ in what happens while attached:
//! a `Sender` hands out deliveries and waits on their disposition, a
//! `Receiver` holds a prefetch credit budget and replenishes it as the
//! application drains its inbound queue.

use std::collections::HashMap;

use log::{debug, warn};
use uuid::Uuid;

use crate::error::{AmqpError, AmqpResult};
use crate::message::Message;
use crate::request::{Request, Sender as Completer};
use crate::resource::Resource;
use crate::types::{AmqpValue, ReceiverSettleMode, SenderSettleMode, TerminusDurability, TerminusExpiryPolicy};

/// Link configuration shared by senders and receivers.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub name: String,
    pub source: Option<String>,
    pub target: Option<String>,
    pub sender_settle_mode: SenderSettleMode,
    pub receiver_settle_mode: ReceiverSettleMode,
    pub properties: HashMap<String, AmqpValue>,
    pub source_config: Option<TerminusConfig>,
    pub target_config: Option<TerminusConfig>,
    /// Name of the durable subscription this link resumes, if any.
    pub subscription_name: Option<String>,
    /// Prefetch credit budget for a receiver; unused by senders.
    pub prefetch: u32,
    /// Reorder the locally buffered prefetch window by descending message
    /// priority, FIFO among equal priorities.
    pub local_priority_ordering: bool,
    /// Force `send` to wait for the delivery's disposition before returning.
    pub force_sync_send: bool,
    /// Maximum times a delivery may be redelivered before the receiver
    /// settles it as `rejected` instead of re-queuing it.
    pub max_redeliveries: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            name: Uuid::new_v4().to_string(),
            source: None,
            target: None,
            sender_settle_mode: SenderSettleMode::Mixed,
            receiver_settle_mode: ReceiverSettleMode::First,
            properties: HashMap::new(),
            source_config: None,
            target_config: None,
            subscription_name: None,
            prefetch: 100,
            local_priority_ordering: false,
            force_sync_send: false,
            max_redeliveries: 5,
        }
    }
}

/// Terminus (source or target) configuration.
#[derive(Debug, Clone)]
pub struct TerminusConfig {
    pub durability: TerminusDurability,
    pub expiry_policy: TerminusExpiryPolicy,
    pub timeout: u32,
    pub properties: HashMap<String, AmqpValue>,
}

impl Default for TerminusConfig {
    fn default() -> Self {
        TerminusConfig {
            durability: TerminusDurability::None,
            expiry_policy: TerminusExpiryPolicy::SessionEnd,
            timeout: 0,
            properties: HashMap::new(),
        }
    }
}

/// Outcome of a settled delivery, as reported by a peer's disposition.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    Accepted,
    Rejected { description: String },
    Released,
    Modified { delivery_failed: bool, undeliverable_here: bool },
}

impl DeliveryOutcome {
    fn into_result(self) -> AmqpResult<()> {
        match self {
            DeliveryOutcome::Accepted => Ok(()),
            DeliveryOutcome::Rejected { description } => Err(AmqpError::rejected(description)),
            DeliveryOutcome::Released => Err(AmqpError::Released),
            DeliveryOutcome::Modified { delivery_failed, undeliverable_here } => {
                Err(AmqpError::Modified { delivery_failed, undeliverable_here })
            }
        }
    }
}

/// AMQP 1.0 Sender link.
pub struct Sender {
    config: LinkConfig,
    session_id: String,
    handle: u32,
    resource: Resource<()>,
    /// Deliveries sent but not yet settled, keyed by delivery-id.
    in_flight: HashMap<u32, Completer<()>>,
}

impl Sender {
    pub fn new(config: LinkConfig, session_id: String) -> Self {
        let label = format!("{}-sender-{}", session_id, config.name);
        Sender {
            config,
            session_id,
            handle: 0,
            resource: Resource::new(label),
            in_flight: HashMap::new(),
        }
    }

    pub fn attach(&mut self) -> AmqpResult<Request<()>> {
        self.resource.open()
    }

    pub fn on_attached(&mut self) {
        self.resource.on_remote_opened(());
    }

    pub fn detach(&mut self) -> AmqpResult<Request<()>> {
        self.resource.close()
    }

    /// The peer's detach arrived. Any deliveries still awaiting disposition
    /// fail with a link error.
    pub fn on_detached(&mut self, err: Option<AmqpError>) {
        let reason = err
            .as_ref()
            .map(|e| AmqpError::link(e.to_string()))
            .unwrap_or_else(|| AmqpError::link("link detached before delivery was settled"));
        self.resource.on_remote_closed(err);
        for (_, completer) in self.in_flight.drain() {
            completer.complete(Err(AmqpError::link(reason.to_string())));
        }
    }

    /// Send a message under `delivery_id`, which the caller (the owning
    /// session) allocates from its session-wide counter so that delivery-ids
    /// are strictly monotonic across every sender on the session rather than
    /// per-link. Returns a `Request` resolving once the delivery is settled.
    /// A presettled sender (settle mode `Settled`) resolves the request
    /// immediately rather than waiting on a disposition.
    pub fn send(&mut self, delivery_id: u32, mut message: Message) -> AmqpResult<Request<()>> {
        if !self.resource.is_open() {
            return Err(AmqpError::invalid_state("sender is not attached"));
        }
        message.apply_default_durability();

        debug!("{}: sending delivery {}", self.config.name, delivery_id);

        if self.config.sender_settle_mode == SenderSettleMode::Settled {
            return Ok(Request::ready(Ok(())));
        }

        let (request, completer) = Request::new();
        self.in_flight.insert(delivery_id, completer);
        Ok(request)
    }

    /// A `disposition` performative arrived settling `delivery_id`.
    pub fn on_disposition(&mut self, delivery_id: u32, outcome: DeliveryOutcome) {
        match self.in_flight.remove(&delivery_id) {
            Some(completer) => completer.complete(outcome.into_result()),
            None => warn!("{}: disposition for unknown delivery {}", self.config.name, delivery_id),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn is_open(&self) -> bool {
        self.resource.is_open()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

/// A single buffered inbound delivery.
#[derive(Debug, Clone)]
struct Pending {
    message: Message,
    delivery_id: u32,
    redelivery_count: u32,
}

/// AMQP 1.0 Receiver link.
pub struct Receiver {
    config: LinkConfig,
    session_id: String,
    handle: u32,
    resource: Resource<()>,
    credit: u32,
    queue: Vec<Pending>,
    delivery_count: u32,
    next_delivery_id: u32,
    /// Redelivery counters surviving across the delivery leaving and
    /// re-entering the buffered queue, keyed by delivery-id.
    redelivery_counts: HashMap<u32, u32>,
    /// Set once reattach to a durable subscription observes a non-null
    /// remote source; `Some(false)` means the peer returned a null source
    /// and the subscription should be treated as fresh.
    resumed_subscription: Option<bool>,
}

impl Receiver {
    pub fn new(config: LinkConfig, session_id: String) -> Self {
        let label = format!("{}-receiver-{}", session_id, config.name);
        Receiver {
            config,
            session_id,
            handle: 0,
            resource: Resource::new(label),
            credit: 0,
            queue: Vec::new(),
            delivery_count: 0,
            next_delivery_id: 1,
            redelivery_counts: HashMap::new(),
            resumed_subscription: None,
        }
    }

    pub fn attach(&mut self) -> AmqpResult<Request<()>> {
        self.resource.open()
    }

    /// The peer's attach arrived. `remote_source_present` distinguishes a
    /// resumed durable subscription (`true`) from a fresh one (`false`,
    /// i.e. the peer returned a null source on reattach).
    pub fn on_attached(&mut self, remote_source_present: bool) {
        if self.config.subscription_name.is_some() {
            self.resumed_subscription = Some(remote_source_present);
        }
        self.resource.on_remote_opened(());
        self.issue_initial_credit();
    }

    fn issue_initial_credit(&mut self) {
        self.credit = self.config.prefetch;
        debug!("{}: initial credit {}", self.config.name, self.credit);
    }

    /// Attach was refused because the named durable subscription is already
    /// held open by another consumer.
    pub fn on_attach_refused_subscription_in_use(&mut self) -> AmqpError {
        let name = self
            .config
            .subscription_name
            .clone()
            .unwrap_or_else(|| self.config.name.clone());
        AmqpError::subscription_in_use(name)
    }

    pub fn detach(&mut self) -> AmqpResult<Request<()>> {
        self.resource.close()
    }

    pub fn on_detached(&mut self, err: Option<AmqpError>) {
        self.resource.on_remote_closed(err);
    }

    /// A `transfer` performative delivering `message` arrived. Decrements
    /// credit and buffers the message, reordering by priority if the link
    /// is configured to do so.
    pub fn on_transfer(&mut self, message: Message) -> AmqpResult<()> {
        if !self.resource.is_open() {
            return Err(AmqpError::invalid_state("receiver is not attached"));
        }
        if self.credit == 0 {
            return Err(AmqpError::link("transfer received with no credit outstanding"));
        }
        self.credit -= 1;
        let delivery_id = self.next_delivery_id;
        self.next_delivery_id += 1;
        self.delivery_count += 1;

        let pending = Pending { message, delivery_id, redelivery_count: 0 };
        if self.config.local_priority_ordering {
            let priority = |p: &Pending| {
                p.message.header.as_ref().and_then(|h| h.priority).unwrap_or(4)
            };
            let insert_at = self
                .queue
                .iter()
                .position(|existing| priority(existing) < priority(&pending))
                .unwrap_or(self.queue.len());
            self.queue.insert(insert_at, pending);
        } else {
            self.queue.push(pending);
        }

        if self.credit <= self.config.prefetch / 2 {
            self.credit += self.config.prefetch - self.credit;
            debug!("{}: replenished credit to {}", self.config.name, self.credit);
        }
        Ok(())
    }

    /// Pop the next available delivery, if any. Returns the message and an
    /// opaque delivery handle the caller passes to [`Receiver::acknowledge`].
    pub fn receive(&mut self) -> AmqpResult<Option<(u32, Message)>> {
        if !self.resource.is_open() {
            return Err(AmqpError::invalid_state("receiver is not attached"));
        }
        if self.queue.is_empty() {
            return Ok(None);
        }
        let pending = self.queue.remove(0);
        Ok(Some((pending.delivery_id, pending.message)))
    }

    /// Settle `delivery_id` with `outcome`. A `Released` or
    /// `Modified{delivery_failed: true}` outcome redelivers the message
    /// unless it has already exceeded `max_redeliveries`, in which case it
    /// is settled as rejected instead of looping forever.
    pub fn acknowledge(&mut self, delivery_id: u32, message: Message, outcome: DeliveryOutcome) -> DeliveryOutcome {
        match outcome {
            DeliveryOutcome::Accepted => DeliveryOutcome::Accepted,
            DeliveryOutcome::Released
            | DeliveryOutcome::Modified { delivery_failed: true, .. } => {
                let redelivery_count = self.redelivery_counts.entry(delivery_id).or_insert(0);
                *redelivery_count += 1;
                if *redelivery_count > self.config.max_redeliveries {
                    warn!(
                        "{}: delivery {} exceeded max redeliveries ({}), rejecting",
                        self.config.name, delivery_id, self.config.max_redeliveries
                    );
                    self.redelivery_counts.remove(&delivery_id);
                    DeliveryOutcome::Rejected {
                        description: "exceeded maximum redelivery count".to_string(),
                    }
                } else {
                    let count = *redelivery_count;
                    self.queue.push(Pending { message, delivery_id, redelivery_count: count });
                    DeliveryOutcome::Released
                }
            }
            other => other,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn credit(&self) -> u32 {
        self.credit
    }

    pub fn delivery_count(&self) -> u32 {
        self.delivery_count
    }

    pub fn is_open(&self) -> bool {
        self.resource.is_open()
    }

    pub fn resumed_subscription(&self) -> Option<bool> {
        self.resumed_subscription
    }
}

/// Link Builder for constructing senders and receivers.
#[derive(Debug, Clone, Default)]
pub struct LinkBuilder {
    config: LinkConfig,
}

impl LinkBuilder {
    pub fn new() -> Self {
        LinkBuilder { config: LinkConfig::default() }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.config.source = Some(source.into());
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.config.target = Some(target.into());
        self
    }

    pub fn sender_settle_mode(mut self, mode: SenderSettleMode) -> Self {
        self.config.sender_settle_mode = mode;
        self
    }

    pub fn receiver_settle_mode(mut self, mode: ReceiverSettleMode) -> Self {
        self.config.receiver_settle_mode = mode;
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: AmqpValue) -> Self {
        self.config.properties.insert(key.into(), value);
        self
    }

    pub fn source_config(mut self, config: TerminusConfig) -> Self {
        self.config.source_config = Some(config);
        self
    }

    pub fn target_config(mut self, config: TerminusConfig) -> Self {
        self.config.target_config = Some(config);
        self
    }

    pub fn subscription_name(mut self, name: impl Into<String>) -> Self {
        self.config.subscription_name = Some(name.into());
        self
    }

    pub fn prefetch(mut self, prefetch: u32) -> Self {
        self.config.prefetch = prefetch;
        self
    }

    pub fn local_priority_ordering(mut self, enabled: bool) -> Self {
        self.config.local_priority_ordering = enabled;
        self
    }

    pub fn force_sync_send(mut self, enabled: bool) -> Self {
        self.config.force_sync_send = enabled;
        self
    }

    pub fn max_redeliveries(mut self, max: u32) -> Self {
        self.config.max_redeliveries = max;
        self
    }

    pub fn build_sender(self, session_id: String) -> Sender {
        Sender::new(self.config, session_id)
    }

    pub fn build_receiver(self, session_id: String) -> Receiver {
        Receiver::new(self.config, session_id)
    }

    /// Build the raw config, for callers that create the `Sender`/`Receiver`
    /// through `Session::create_sender`/`create_receiver` instead of
    /// directly.
    pub fn build_config(self) -> LinkConfig {
        self.config
    }
}

/// Terminus Builder for constructing source/target configurations.
#[derive(Debug, Clone, Default)]
pub struct TerminusBuilder {
    config: TerminusConfig,
}

impl TerminusBuilder {
    pub fn new() -> Self {
        TerminusBuilder { config: TerminusConfig::default() }
    }

    pub fn durability(mut self, durability: TerminusDurability) -> Self {
        self.config.durability = durability;
        self
    }

    pub fn expiry_policy(mut self, policy: TerminusExpiryPolicy) -> Self {
        self.config.expiry_policy = policy;
        self
    }

    pub fn timeout(mut self, timeout: u32) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: AmqpValue) -> Self {
        self.config.properties.insert(key.into(), value);
        self
    }

    pub fn build(self) -> TerminusConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Header;

    fn attached_sender(settle_mode: SenderSettleMode) -> Sender {
        let mut sender = LinkBuilder::new()
            .name("test-sender")
            .sender_settle_mode(settle_mode)
            .build_sender("test-session".to_string());
        let _ = sender.attach().unwrap();
        sender.on_attached();
        sender
    }

    fn attached_receiver(prefetch: u32) -> Receiver {
        let mut receiver = LinkBuilder::new()
            .name("test-receiver")
            .prefetch(prefetch)
            .build_receiver("test-session".to_string());
        let _ = receiver.attach().unwrap();
        receiver.on_attached(true);
        receiver
    }

    #[tokio::test]
    async fn presettled_send_completes_immediately() {
        let mut sender = attached_sender(SenderSettleMode::Settled);
        let request = sender.send(1, Message::text("hi")).unwrap();
        assert!(request.wait().await.is_ok());
        assert_eq!(sender.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn unsettled_send_waits_for_disposition() {
        let mut sender = attached_sender(SenderSettleMode::Unsettled);
        let request = sender.send(1, Message::text("hi")).unwrap();
        assert_eq!(sender.in_flight_count(), 1);
        sender.on_disposition(1, DeliveryOutcome::Accepted);
        assert!(request.wait().await.is_ok());
    }

    #[tokio::test]
    async fn rejected_disposition_fails_the_request() {
        let mut sender = attached_sender(SenderSettleMode::Unsettled);
        let request = sender.send(1, Message::text("hi")).unwrap();
        sender.on_disposition(
            1,
            DeliveryOutcome::Rejected { description: "bad message".to_string() },
        );
        let err = request.wait().await.unwrap_err();
        assert!(matches!(err, AmqpError::Rejected(_)));
    }

    #[test]
    fn send_without_attach_fails() {
        let mut sender = LinkBuilder::new().build_sender("s".to_string());
        assert!(sender.send(1, Message::text("hi")).is_err());
    }

    #[test]
    fn receiver_issues_initial_credit_on_attach() {
        let receiver = attached_receiver(10);
        assert_eq!(receiver.credit(), 10);
    }

    #[test]
    fn receiver_buffers_and_returns_transfers_in_order() {
        let mut receiver = attached_receiver(10);
        receiver.on_transfer(Message::text("first")).unwrap();
        receiver.on_transfer(Message::text("second")).unwrap();
        let (_, first) = receiver.receive().unwrap().unwrap();
        assert_eq!(first.body_as_text(), Some("first"));
        let (_, second) = receiver.receive().unwrap().unwrap();
        assert_eq!(second.body_as_text(), Some("second"));
    }

    #[test]
    fn local_priority_ordering_reorders_buffered_window() {
        let mut receiver = LinkBuilder::new()
            .name("priority-receiver")
            .prefetch(10)
            .local_priority_ordering(true)
            .build_receiver("test-session".to_string());
        receiver.attach().unwrap();
        receiver.on_attached(true);

        let low = Message::builder()
            .header(Header { priority: Some(1), ..Header::new() })
            .body(crate::message::Body::Value(AmqpValue::String("low".to_string())))
            .build();
        let high = Message::builder()
            .header(Header { priority: Some(9), ..Header::new() })
            .body(crate::message::Body::Value(AmqpValue::String("high".to_string())))
            .build();

        receiver.on_transfer(low).unwrap();
        receiver.on_transfer(high).unwrap();

        let (_, first) = receiver.receive().unwrap().unwrap();
        assert_eq!(first.body_as_text(), Some("high"));
    }

    #[test]
    fn redelivery_beyond_max_rejects_instead_of_looping() {
        let mut receiver = LinkBuilder::new()
            .name("redelivery-receiver")
            .prefetch(10)
            .max_redeliveries(1)
            .build_receiver("test-session".to_string());
        receiver.attach().unwrap();
        receiver.on_attached(true);

        receiver.on_transfer(Message::text("poison")).unwrap();
        let (id, msg) = receiver.receive().unwrap().unwrap();
        let outcome = receiver.acknowledge(id, msg, DeliveryOutcome::Released);
        assert_eq!(outcome, DeliveryOutcome::Released);

        let (id2, msg2) = receiver.receive().unwrap().unwrap();
        let outcome2 = receiver.acknowledge(id2, msg2, DeliveryOutcome::Released);
        assert!(matches!(outcome2, DeliveryOutcome::Rejected { .. }));
    }

    #[test]
    fn durable_reattach_with_null_source_is_treated_as_fresh() {
        let mut receiver = LinkBuilder::new()
            .name("durable-receiver")
            .subscription_name("my-subscription")
            .build_receiver("test-session".to_string());
        receiver.attach().unwrap();
        receiver.on_attached(false);
        assert_eq!(receiver.resumed_subscription(), Some(false));
    }

    #[test]
    fn subscription_in_use_refusal_names_the_subscription() {
        let mut receiver = LinkBuilder::new()
            .subscription_name("dup-subscription")
            .build_receiver("test-session".to_string());
        let err = receiver.on_attach_refused_subscription_in_use();
        assert!(matches!(err, AmqpError::SubscriptionInUse(name) if name == "dup-subscription"));
    }
}
