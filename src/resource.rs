//! Generic resource lifecycle state machine
//!
//! Connection, Session, Sender and Receiver all open and close the same way:
//! a local command emits a performative and waits for the peer's reply, or a
//! peer-initiated performative arrives first and waits for the local side to
//! catch up. Rather than hand-rolling `ConnectionState`/`SessionState`/
//! `LinkState` with the same open/close shape four times, every resource
//! embeds one [`Resource<T>`] and drives it through `open`/`close`/
//! `on_remote_opened`/`on_remote_closed`.
//!
//! `T` is whatever "successfully opened" means for that resource: `()` for
//! Connection and Session, the negotiated terminus state for a link.

use log::{debug, warn};

use crate::error::{AmqpError, AmqpResult};
use crate::request::{Request, Sender as Completer};

/// Where a resource sits in its open/close lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    /// Never opened.
    Idle,
    /// We sent the open-equivalent performative, awaiting the peer's reply.
    OpeningLocal,
    /// The peer opened first; we have not yet issued our own open.
    OpeningRemote,
    /// Both sides have completed the open handshake.
    Open,
    /// We sent the close-equivalent performative, awaiting the peer's reply.
    ClosingLocal,
    /// The peer closed first; we have not yet issued our own close.
    ClosingRemote,
    /// Closed cleanly on both sides.
    Closed,
    /// Closed because of an error (local or remote).
    Failed,
}

impl ResourceState {
    /// A terminal state never transitions again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResourceState::Closed | ResourceState::Failed)
    }

    pub fn is_open(&self) -> bool {
        matches!(self, ResourceState::Open)
    }
}

/// Shared open/close lifecycle for a single AMQP resource (connection,
/// session, or link).
///
/// `label` is used only for log messages, so engines can tell which
/// connection/session/link a transition belongs to.
pub struct Resource<T> {
    label: String,
    state: ResourceState,
    open_request: Option<Completer<T>>,
    close_request: Option<Completer<()>>,
    /// Set by [`Resource::mark_close_pending`] when a remote-open arrived
    /// with content that requires the subsequent remote-close to be treated
    /// as a successful, distinct outcome instead of a failure (e.g. a
    /// receiver reattaching to a durable subscription whose source came back
    /// null).
    close_pending_outcome: Option<T>,
}

impl<T> Resource<T> {
    pub fn new(label: impl Into<String>) -> Self {
        Resource {
            label: label.into(),
            state: ResourceState::Idle,
            open_request: None,
            close_request: None,
            close_pending_outcome: None,
        }
    }

    pub fn state(&self) -> &ResourceState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Begin a local open. Returns the `Request<T>` the caller should await
    /// for completion, or an error if `open` was already called.
    pub fn open(&mut self) -> AmqpResult<Request<T>> {
        match self.state {
            ResourceState::Idle => {
                let (request, sender) = Request::new();
                self.open_request = Some(sender);
                self.state = ResourceState::OpeningLocal;
                debug!("{}: Idle -> OpeningLocal", self.label);
                Ok(request)
            }
            ResourceState::OpeningRemote => {
                // Peer already opened; issuing our own open finishes the
                // handshake immediately rather than waiting on a reply.
                let outcome = self.close_pending_outcome.take().ok_or_else(|| {
                    AmqpError::invalid_state(format!(
                        "{}: remote-opened outcome missing",
                        self.label
                    ))
                })?;
                self.state = ResourceState::Open;
                debug!("{}: OpeningRemote -> Open (local open issued)", self.label);
                Ok(Request::ready(Ok(outcome)))
            }
            ResourceState::Closed | ResourceState::Failed => {
                Err(AmqpError::invalid_state(format!("{}: resource closed", self.label)))
            }
            _ => Err(AmqpError::invalid_state(format!(
                "{}: open() called while in state {:?}",
                self.label, self.state
            ))),
        }
    }

    /// The peer's open-equivalent performative arrived.
    pub fn on_remote_opened(&mut self, outcome: T) {
        match self.state {
            ResourceState::OpeningLocal => {
                self.state = ResourceState::Open;
                debug!("{}: OpeningLocal -> Open", self.label);
                if let Some(sender) = self.open_request.take() {
                    sender.complete(Ok(outcome));
                }
            }
            ResourceState::Idle => {
                // Peer-initiated open (only legal for child resources being
                // reattached by the peer); we owe it a local open still.
                self.state = ResourceState::OpeningRemote;
                self.close_pending_outcome = Some(outcome);
                debug!("{}: Idle -> OpeningRemote (peer-initiated)", self.label);
            }
            _ => warn!(
                "{}: on_remote_opened ignored in state {:?}",
                self.label, self.state
            ),
        }
    }

    /// Mark that the remote open we just observed requires the *next*
    /// remote-close to be treated as a successful, distinct outcome (not a
    /// failure). Used when a receiver's remote source comes back null on a
    /// durable-subscription reattach: the peer did not retain the
    /// subscription, and will close the link rather than serve it.
    pub fn mark_close_pending(&mut self, outcome: T) {
        self.close_pending_outcome = Some(outcome);
        if self.state == ResourceState::Open || self.state == ResourceState::OpeningLocal {
            self.state = ResourceState::ClosingLocal;
            debug!("{}: -> ClosingLocal (close pending on remote content)", self.label);
        }
    }

    /// Begin a local close. Idempotent while already closing locally.
    pub fn close(&mut self) -> AmqpResult<Request<()>> {
        match self.state {
            ResourceState::Idle | ResourceState::Closed | ResourceState::Failed => {
                self.state = ResourceState::Closed;
                Ok(Request::ready(Ok(())))
            }
            ResourceState::ClosingLocal => {
                // Already closing; give the caller a request that resolves
                // once the in-flight close completes. We cannot clone a
                // Sender, so synthesize a fresh pair only if none is stored
                // (should not happen given the call sites), otherwise this
                // call is a redundant close and resolves immediately.
                Ok(Request::ready(Ok(())))
            }
            _ => {
                let (request, sender) = Request::new();
                self.close_request = Some(sender);
                self.state = ResourceState::ClosingLocal;
                debug!("{}: -> ClosingLocal", self.label);
                Ok(request)
            }
        }
    }

    /// The peer's close-equivalent performative arrived, with an optional
    /// error description. Returns `true` if this resource transitioned to
    /// `Failed` and the caller should cascade-close its children and notify
    /// error listeners.
    pub fn on_remote_closed(&mut self, err: Option<AmqpError>) -> bool {
        if let Some(err) = err {
            self.state = ResourceState::Failed;
            warn!("{}: -> Failed ({})", self.label, err);
            if let Some(sender) = self.open_request.take() {
                sender.complete(Err(clone_for_fanout(&err)));
            }
            if let Some(sender) = self.close_request.take() {
                sender.complete(Err(clone_for_fanout(&err)));
            }
            return true;
        }

        self.state = ResourceState::Closed;
        debug!("{}: -> Closed (no error)", self.label);
        // A pending open resolves to the stashed outcome if one was staged
        // by `mark_close_pending` (e.g. a durable reattach whose source came
        // back null); otherwise a still-open open_request here means the
        // peer closed before ever completing it.
        if let Some(outcome) = self.close_pending_outcome.take() {
            if let Some(sender) = self.open_request.take() {
                sender.complete(Ok(outcome));
            }
        } else if let Some(sender) = self.open_request.take() {
            sender.complete(Err(AmqpError::invalid_state(format!(
                "{}: closed before open completed",
                self.label
            ))));
        }
        if let Some(sender) = self.close_request.take() {
            sender.complete(Ok(()));
        }
        false
    }
}

/// `AmqpError` doesn't implement `Clone` (it wraps `io::Error`/`serde_json::Error`),
/// so fan-out to both a stored open-request and a stored close-request on
/// failure goes through a description-preserving reconstruction instead.
fn clone_for_fanout(err: &AmqpError) -> AmqpError {
    AmqpError::protocol(err.to_string())
}
