//! Mailboxes and the Tell/Ask protocol
//!
//! A mailbox is the FIFO of pending envelopes plus the actor's scheduling
//! status, kept under one lock so that every status transition sees a
//! consistent queue. The transitions are:
//!
//! ```text
//! (init turn) Running -> Idle | Scheduled | Terminated
//! Idle      --admit-->       Scheduled      (one run-queue entry)
//! Scheduled --begin_turn-->  Running
//! Running   --end_turn-->    Scheduled | Idle | Terminated
//! Idle      --last address-> Terminated
//! ```

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;

use super::Shared;
use super::actor::{ActorCell, ActorRef, Shape};
use super::error::{ContractError, ContractResult};
use super::handle::Handle;

/// Queue capacity an idle mailbox keeps; larger buffers are released
pub(crate) const IDLE_QUEUE_CAPACITY: usize = 4;

/// Payload plus optional reply target
#[derive(Debug)]
pub struct Envelope {
    /// Message payload
    pub payload: Handle,
    /// Reply target; present only for asks
    pub reply_to: Option<Handle>,
}

/// Scheduling status of an actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// No pending work
    Idle,
    /// Has exactly one entry in the run queue
    Scheduled,
    /// A turn is executing
    Running,
    /// Gone; further sends are discarded
    Terminated,
}

/// Outcome of a successful send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delivery {
    /// The envelope is in the target's mailbox
    Enqueued,
    /// The target had terminated (or its runtime shut down); the handles
    /// passed in were released
    Discarded,
}

pub(crate) enum Admission {
    Enqueued { wake: bool },
    Rejected(Envelope),
}

pub(crate) enum TurnStart {
    Deliver(Envelope),
    /// Nothing queued; the actor went idle
    Empty,
    /// Terminated while queued
    Stale,
}

pub(crate) enum TurnEnd {
    Requeue,
    Idle,
    Terminate(VecDeque<Envelope>),
}

/// Pending envelopes, scheduling status, and live address count
#[derive(Debug)]
pub(crate) struct Mailbox {
    queue: VecDeque<Envelope>,
    status: Status,
    addresses: usize,
}

impl Mailbox {
    /// Fresh mailbox in the given status, with one address outstanding
    pub(crate) fn new(status: Status) -> Self {
        Self {
            queue: VecDeque::new(),
            status,
            addresses: 1,
        }
    }

    pub(crate) fn status(&self) -> Status {
        self.status
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    fn go_idle(&mut self) {
        self.status = Status::Idle;
        self.queue.shrink_to(IDLE_QUEUE_CAPACITY);
    }

    /// Enqueue an envelope; `wake` is set only on the Idle -> Scheduled edge
    pub(crate) fn admit(&mut self, envelope: Envelope) -> Admission {
        match self.status {
            Status::Terminated => Admission::Rejected(envelope),
            Status::Idle => {
                self.queue.push_back(envelope);
                self.status = Status::Scheduled;
                Admission::Enqueued { wake: true }
            }
            Status::Scheduled | Status::Running => {
                self.queue.push_back(envelope);
                Admission::Enqueued { wake: false }
            }
        }
    }

    /// Take the next envelope and enter Running
    ///
    /// The running turn holds a self address, counted here.
    pub(crate) fn begin_turn(&mut self) -> TurnStart {
        if self.status != Status::Scheduled {
            return TurnStart::Stale;
        }
        match self.queue.pop_front() {
            Some(envelope) => {
                self.status = Status::Running;
                self.addresses += 1;
                TurnStart::Deliver(envelope)
            }
            None => {
                self.go_idle();
                TurnStart::Empty
            }
        }
    }

    /// Leave Running after a turn
    ///
    /// `retire` terminates regardless of pending work (single-shot
    /// continuations after their delivery).
    pub(crate) fn end_turn(&mut self, retire: bool) -> TurnEnd {
        if self.status != Status::Running {
            return TurnEnd::Idle;
        }
        if retire {
            self.status = Status::Terminated;
            return TurnEnd::Terminate(mem::take(&mut self.queue));
        }
        if !self.queue.is_empty() {
            self.status = Status::Scheduled;
            TurnEnd::Requeue
        } else if self.addresses == 0 {
            self.status = Status::Terminated;
            TurnEnd::Terminate(VecDeque::new())
        } else {
            self.go_idle();
            TurnEnd::Idle
        }
    }

    /// Give back one address; true if the actor must terminate now
    pub(crate) fn release_address(&mut self) -> bool {
        self.addresses = self.addresses.saturating_sub(1);
        if self.addresses == 0 && self.status == Status::Idle {
            self.status = Status::Terminated;
            true
        } else {
            false
        }
    }

    /// Force termination, returning whatever was still queued
    pub(crate) fn terminate(&mut self) -> Option<VecDeque<Envelope>> {
        if self.status == Status::Terminated {
            return None;
        }
        self.status = Status::Terminated;
        Some(mem::take(&mut self.queue))
    }
}

impl Shared {
    /// Enqueue on a cell, scheduling it if it was idle
    pub(crate) fn deliver(&self, cell: &Arc<ActorCell>, envelope: Envelope) -> Delivery {
        if self.is_closed() {
            self.stats.discard();
            return Delivery::Discarded;
        }
        let admission = cell.mailbox.lock().admit(envelope);
        match admission {
            Admission::Enqueued { wake } => {
                if wake {
                    self.scheduler.schedule(cell.clone());
                }
                Delivery::Enqueued
            }
            Admission::Rejected(envelope) => {
                self.stats.discard();
                tracing::debug!(actor = %cell.id(), payload = %envelope.payload, "send to terminated actor discarded");
                Delivery::Discarded
            }
        }
    }
}

impl Handle {
    /// Fire-and-forget send
    ///
    /// Borrows the target and consumes `payload`. Sending to a terminated
    /// actor is not an error: the payload is released and
    /// `Delivery::Discarded` returned.
    pub fn tell(&self, payload: Handle) -> ContractResult<Delivery> {
        let target = self.target()?;
        Ok(target.deliver(Envelope {
            payload,
            reply_to: None,
        }))
    }

    /// Request/reply send
    ///
    /// Borrows the target and consumes both `reply_to` and `payload`. Only
    /// ask-capable actors accept a reply target; on any error both handles
    /// are released and nothing is enqueued.
    pub fn ask(&self, reply_to: Handle, payload: Handle) -> ContractResult<Delivery> {
        let target = self.target()?;
        if target.shape() == Shape::Plain {
            return Err(ContractError::AskToPlainActor {
                address: target.id(),
            });
        }
        Ok(target.deliver(Envelope {
            payload,
            reply_to: Some(reply_to),
        }))
    }

    fn target(&self) -> ContractResult<&ActorRef> {
        self.value()
            .as_actor()
            .ok_or(ContractError::NotAnActor { found: self.kind() })
    }
}
