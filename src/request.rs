//! Async request ledger
//!
//! AMQP is fundamentally an asynchronous, pipelined protocol: a `send` on a
//! link can be outstanding for an arbitrary number of round-trips before the
//! peer's disposition settles it, and a durable-unsubscribe has to wait for a
//! detach to come back on a completely different frame from the one that
//! requested it. This module gives every such outstanding operation a single
//! completion handle so the connection/session/link engines can stash a
//! `Request<T>` in a table keyed by delivery-id, handle, or name and complete
//! it exactly once when the matching performative (or transport failure)
//! arrives.
//!
//! A `Request<T>` is deliberately *not* reusable: completing it consumes it,
//! matching the one-shot nature of an AMQP delivery outcome or a single
//! attach/detach round-trip.

use tokio::sync::oneshot;

use crate::error::{AmqpError, AmqpResult};

/// The receiving half of an outstanding asynchronous operation.
///
/// Awaiting a `Request<T>` blocks until [`Sender::complete`] is called on the
/// matching [`Sender`], or until the sender is dropped without completing
/// (which resolves to a `Transport` error, modeling "the connection went away
/// before we heard back").
pub struct Request<T> {
    receiver: oneshot::Receiver<AmqpResult<T>>,
}

/// The completing half of an outstanding asynchronous operation.
///
/// Exactly one of the two outcomes happens: either [`Sender::complete`] runs
/// once, or the `Sender` is dropped and the paired [`Request`] observes a
/// `Transport` error instead of hanging forever.
pub struct Sender<T> {
    sender: oneshot::Sender<AmqpResult<T>>,
}

impl<T> Request<T> {
    /// Create a linked (`Request`, `Sender`) pair. The request is fulfilled
    /// exactly once, either by the sender completing it or by the sender
    /// being dropped.
    pub fn new() -> (Request<T>, Sender<T>) {
        let (tx, rx) = oneshot::channel();
        (Request { receiver: rx }, Sender { sender: tx })
    }

    /// Build a request that is already satisfied, for call sites that need a
    /// uniform `Request<T>` return type even when no round-trip is actually
    /// required (e.g. a presettled send).
    pub fn ready(value: AmqpResult<T>) -> Request<T> {
        let (request, sender) = Request::new();
        sender.complete(value);
        request
    }

    /// Await the outcome of the operation this request represents.
    pub async fn wait(self) -> AmqpResult<T> {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => Err(AmqpError::transport(
                "connection closed before the outstanding request was completed",
            )),
        }
    }
}

impl<T> Sender<T> {
    /// Complete the paired request with `value`. Consumes the sender so it
    /// cannot be completed twice.
    pub fn complete(self, value: AmqpResult<T>) {
        // A dropped Request (the caller stopped awaiting it) is not our
        // problem to report; there's nobody left to tell.
        let _ = self.sender.send(value);
    }

    /// Wrap this sender so that `hook` runs immediately before the value is
    /// delivered to the waiting `Request`. Used to unregister bookkeeping
    /// (e.g. a pending-unsubscribe-by-name entry) at the moment of
    /// completion rather than leaving it for the caller to remember.
    pub fn wrapping<F>(self, hook: F) -> impl FnOnce(AmqpResult<T>)
    where
        F: FnOnce(&AmqpResult<T>) + Send + 'static,
        T: Send + 'static,
    {
        move |value: AmqpResult<T>| {
            hook(&value);
            self.complete(value);
        }
    }
}
