//! Actors, addresses, handler shapes, and the turn context
//!
//! An actor is an `ActorCell` in the runtime's table:
//! - a mailbox guarded together with its scheduling status
//! - a behavior (handler closure owning the actor state)
//! - a fixed handler shape chosen at creation
//!
//! Addresses (`ActorRef`) are what handles point at. The number of live
//! address values decides reachability; the last one to go terminates an
//! idle actor.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::mem::size_of;
use std::sync::{Arc, Weak};

use super::handle::Handle;
use super::mailbox::{Delivery, Envelope, IDLE_QUEUE_CAPACITY, Mailbox, Status};
use super::{Runtime, Shared};

/// Table slot plus `Arc` header for one cell
const BOOKKEEPING: usize = size_of::<(ActorId, Arc<ActorCell>)>() + 2 * size_of::<usize>();

/// Upper bound on [`ActorRef::footprint`] while an actor is idle
///
/// Independent of how many messages the actor has handled. Actor state
/// lives outside this figure.
pub const IDLE_FOOTPRINT: usize =
    BOOKKEEPING + size_of::<ActorCell>() + IDLE_QUEUE_CAPACITY * size_of::<Envelope>();

/// Actor address within one runtime
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId(pub u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<0.0.{:x}>", self.0)
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Handler shape, fixed when the actor is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shape {
    /// Invoked as `(turn, state, payload)`; accepts only tells
    Plain,
    /// Invoked as `(turn, state, reply_to, payload)`; accepts tells and asks
    Ask,
}

/// What kind of actor a cell hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Actor,
    Continuation { single_shot: bool, owner: ActorId },
}

pub(crate) type PlainFn = Box<dyn FnMut(&Turn<'_>, Handle) + Send>;
pub(crate) type AskFn = Box<dyn FnMut(&Turn<'_>, Option<Handle>, Handle) + Send>;

/// Handler closure together with the state it captured
pub(crate) enum Behavior {
    Plain(PlainFn),
    Ask(AskFn),
}

impl Behavior {
    pub(crate) fn shape(&self) -> Shape {
        match self {
            Behavior::Plain(_) => Shape::Plain,
            Behavior::Ask(_) => Shape::Ask,
        }
    }

    /// Run one envelope through the handler
    pub(crate) fn dispatch(&mut self, turn: &Turn<'_>, envelope: Envelope) {
        let Envelope { payload, reply_to } = envelope;
        match self {
            Behavior::Plain(handler) => {
                if let Some(reply_to) = reply_to {
                    // Sends reject this before enqueueing.
                    tracing::error!(actor = %turn.id(), reply_to = %reply_to, "reply target delivered to plain handler; dropped");
                }
                handler(turn, payload)
            }
            Behavior::Ask(handler) => handler(turn, reply_to, payload),
        }
    }
}

/// Everything a terminated actor still owned
pub(crate) type Remains = (VecDeque<Envelope>, Option<Behavior>);

thread_local! {
    static BURIAL: RefCell<Option<Vec<Remains>>> = const { RefCell::new(None) };
}

/// Resets the burial list if a drop unwinds mid-drain
struct Draining;

impl Drop for Draining {
    fn drop(&mut self) {
        let rest = BURIAL.with(|list| list.borrow_mut().take());
        drop(rest);
    }
}

/// Drop a terminated actor's remains
///
/// Remains released while another burial is running on this thread are
/// queued and dropped by the outer call, so a chain of actors that each own
/// the next one is released iteratively instead of one stack frame per link.
pub(crate) fn bury(remains: Remains) {
    let first = BURIAL.with(|list| {
        let mut list = list.borrow_mut();
        match list.as_mut() {
            Some(pending) => {
                pending.push(remains);
                None
            }
            None => {
                *list = Some(Vec::new());
                Some(remains)
            }
        }
    });
    let Some(first) = first else {
        return;
    };

    let _draining = Draining;
    drop(first);
    while let Some(next) = BURIAL.with(|list| list.borrow_mut().as_mut().and_then(Vec::pop)) {
        drop(next);
    }
}

/// Table entry for one actor
pub(crate) struct ActorCell {
    id: ActorId,
    shape: Shape,
    kind: Kind,
    pub(crate) mailbox: Mutex<Mailbox>,
    pub(crate) behavior: Mutex<Option<Behavior>>,
}

impl ActorCell {
    /// New cell, owned by the spawning thread as its first (init) turn
    pub(crate) fn new(id: ActorId, shape: Shape, kind: Kind) -> Self {
        Self {
            id,
            shape,
            kind,
            mailbox: Mutex::new(Mailbox::new(Status::Running)),
            behavior: Mutex::new(None),
        }
    }

    pub(crate) fn id(&self) -> ActorId {
        self.id
    }

    pub(crate) fn shape(&self) -> Shape {
        self.shape
    }

    pub(crate) fn kind(&self) -> Kind {
        self.kind
    }

    pub(crate) fn is_single_shot(&self) -> bool {
        matches!(self.kind, Kind::Continuation { single_shot: true, .. })
    }

    /// Mark terminated and detach everything the actor still owns
    ///
    /// Returns `None` if the cell was already terminated. The caller drops
    /// the returned values after all locks are released.
    pub(crate) fn dismantle(&self) -> Option<Remains> {
        let leftovers = self.mailbox.lock().terminate()?;
        let behavior = self.behavior.lock().take();
        Some((leftovers, behavior))
    }
}

impl fmt::Debug for ActorCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorCell")
            .field("id", &self.id)
            .field("shape", &self.shape)
            .field("kind", &self.kind)
            .finish()
    }
}

/// The address value an actor handle points at
///
/// Each `ActorRef` accounts for one address reference in its cell's mailbox;
/// dropping it gives that reference back.
pub struct ActorRef {
    cell: Arc<ActorCell>,
    runtime: Weak<Shared>,
}

impl ActorRef {
    /// Wrap a cell whose address count was already incremented for this ref
    pub(crate) fn adopt(cell: Arc<ActorCell>, runtime: Weak<Shared>) -> Self {
        Self { cell, runtime }
    }

    /// Actor address
    pub fn id(&self) -> ActorId {
        self.cell.id()
    }

    /// Handler shape of the addressed actor
    pub fn shape(&self) -> Shape {
        self.cell.shape()
    }

    /// Whether the address belongs to a continuation
    pub fn is_continuation(&self) -> bool {
        matches!(self.cell.kind(), Kind::Continuation { .. })
    }

    /// Whether the addressed actor has terminated
    pub fn is_terminated(&self) -> bool {
        self.cell.mailbox.lock().status() == Status::Terminated
    }

    /// Envelopes queued and not yet handled
    pub fn pending(&self) -> usize {
        self.cell.mailbox.lock().len()
    }

    /// Address of the actor a continuation was created for
    pub fn owner(&self) -> Option<ActorId> {
        match self.cell.kind() {
            Kind::Continuation { owner, .. } => Some(owner),
            Kind::Actor => None,
        }
    }

    /// Bytes the runtime holds for this actor, excluding its state
    ///
    /// At most [`IDLE_FOOTPRINT`] whenever the actor is idle.
    pub fn footprint(&self) -> usize {
        let queued = self.cell.mailbox.lock().capacity();
        BOOKKEEPING + size_of::<ActorCell>() + queued * size_of::<Envelope>()
    }

    pub(crate) fn deliver(&self, envelope: Envelope) -> Delivery {
        match self.runtime.upgrade() {
            Some(shared) => shared.deliver(&self.cell, envelope),
            None => Delivery::Discarded,
        }
    }
}

impl Drop for ActorRef {
    fn drop(&mut self) {
        let unreachable = self.cell.mailbox.lock().release_address();
        if !unreachable {
            return;
        }
        match self.runtime.upgrade() {
            Some(shared) => shared.terminate(&self.cell, VecDeque::new()),
            None => {
                if let Some(remains) = self.cell.dismantle() {
                    bury(remains);
                }
            }
        }
    }
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ActorRef").field(&self.cell.id()).finish()
    }
}

/// Context handed to a handler for the duration of one turn
pub struct Turn<'a> {
    runtime: &'a Runtime,
    myself: &'a Handle,
    cell: &'a Arc<ActorCell>,
}

impl<'a> Turn<'a> {
    pub(crate) fn new(runtime: &'a Runtime, myself: &'a Handle, cell: &'a Arc<ActorCell>) -> Self {
        Self {
            runtime,
            myself,
            cell,
        }
    }

    /// Runtime the actor lives in; use it to spawn or build continuations
    pub fn runtime(&self) -> &'a Runtime {
        self.runtime
    }

    /// Borrowed handle to the running actor's own address
    pub fn myself(&self) -> &'a Handle {
        self.myself
    }

    /// Running actor's address
    pub fn id(&self) -> ActorId {
        self.cell.id()
    }

    /// Tell the running actor a message (looping actors)
    pub fn send(&self, payload: Handle) -> Delivery {
        self.runtime.shared().deliver(
            self.cell,
            Envelope {
                payload,
                reply_to: None,
            },
        )
    }
}
