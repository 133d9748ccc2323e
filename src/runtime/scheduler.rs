//! Worker pool, run queue, and quiescence tracking
//!
//! The run queue holds at most one entry per actor (admission coalesces).
//! A worker pops an actor, runs exactly one turn, and either requeues it at
//! the back or lets it go idle. `active` counts actors that are Scheduled or
//! Running; quiescence is `active == 0`.

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::actor::{ActorCell, ActorRef, Turn};
use super::error::{Result, RuntimeError};
use super::handle::Handle;
use super::mailbox::{TurnEnd, TurnStart};
use super::{RunReport, Runtime, RuntimeId, Shared, WeakRuntime};

enum Job {
    Run(Arc<ActorCell>),
    Stop,
}

/// Run queue plus the threads draining it
pub(crate) struct Scheduler {
    sender: Sender<Job>,
    receiver: Receiver<Job>,
    active: AtomicUsize,
    quiescence: Mutex<()>,
    quiescent: Condvar,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            active: AtomicUsize::new(0),
            quiescence: Mutex::new(()),
            quiescent: Condvar::new(),
            workers: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Count an actor that is about to run outside the queue (init turns)
    pub(crate) fn activate(&self) {
        self.active.fetch_add(1, Ordering::AcqRel);
    }

    /// Idle -> Scheduled: count the actor and queue it
    pub(crate) fn schedule(&self, cell: Arc<ActorCell>) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        self.activate();
        self.requeue(cell);
    }

    /// Queue an already counted actor
    pub(crate) fn requeue(&self, cell: Arc<ActorCell>) {
        // Both channel ends live in `self`, so the send cannot fail.
        let _ = self.sender.send(Job::Run(cell));
    }

    /// An actor left Scheduled/Running for good or for Idle
    pub(crate) fn retire(&self) {
        if self.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = self.quiescence.lock();
            self.quiescent.notify_all();
        }
    }

    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Entries waiting in the run queue
    pub(crate) fn backlog(&self) -> usize {
        self.receiver.len()
    }

    pub(crate) fn wait(&self) {
        let mut guard = self.quiescence.lock();
        while self.active() != 0 {
            self.quiescent.wait(&mut guard);
        }
    }

    pub(crate) fn wait_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.quiescence.lock();
        while self.active() != 0 {
            if self.quiescent.wait_until(&mut guard, deadline).timed_out() {
                return self.active() == 0;
            }
        }
        true
    }

    /// Start `count` worker threads
    ///
    /// Workers hold the runtime weakly; the pool stops once the last
    /// `Runtime` value is gone.
    pub(crate) fn start_workers(&self, runtime: &Runtime, count: usize, name: &str) -> Result<()> {
        let mut workers = self.workers.lock();
        for index in 0..count {
            let weak = runtime.downgrade();
            let receiver = self.receiver.clone();
            let id = runtime.id();
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", name, index))
                .spawn(move || worker_loop(weak, receiver, index, id));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    drop(workers);
                    self.stop();
                    return Err(RuntimeError::WorkerSpawn(err));
                }
            }
        }
        Ok(())
    }

    /// Stop and join every worker; idempotent
    ///
    /// When called from a worker (the runtime's last reference dropped
    /// there) that worker is not joined; it exits on its own once the
    /// current turn returns.
    pub(crate) fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let workers = std::mem::take(&mut *self.workers.lock());
        for _ in 0..workers.len() {
            let _ = self.sender.send(Job::Stop);
        }
        let current = thread::current().id();
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                tracing::error!("worker thread panicked outside a turn");
            }
        }
        // Anything still queued belongs to actors the caller is about to drain.
        while self.receiver.try_recv().is_ok() {}
        self.active.store(0, Ordering::Release);
        let _guard = self.quiescence.lock();
        self.quiescent.notify_all();
    }
}

/// Runtime-wide counters
#[derive(Default)]
pub(crate) struct Stats {
    spawned: AtomicU64,
    terminated: AtomicU64,
    turns: AtomicU64,
    discarded: AtomicU64,
    panicked: AtomicU64,
}

impl Stats {
    pub(crate) fn spawn(&self) {
        self.spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn terminate(&self) {
        self.terminated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn turn(&self) {
        self.turns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn discard(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn panic(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn report(&self, live: usize) -> RunReport {
        RunReport {
            spawned: self.spawned.load(Ordering::Relaxed),
            terminated: self.terminated.load(Ordering::Relaxed),
            turns: self.turns.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            live,
        }
    }
}

fn worker_loop(weak: WeakRuntime, receiver: Receiver<Job>, index: usize, id: RuntimeId) {
    let span = tracing::debug_span!("worker", index, runtime = %id);
    let _enter = span.enter();

    while let Ok(job) = receiver.recv() {
        match job {
            Job::Run(cell) => {
                let Some(runtime) = weak.upgrade() else {
                    break;
                };
                execute_turn(&runtime, cell);
            }
            Job::Stop => break,
        }
    }
    tracing::debug!("worker stopped");
}

/// Run one turn of a scheduled actor
fn execute_turn(runtime: &Runtime, cell: Arc<ActorCell>) {
    let shared = runtime.shared();
    let start = cell.mailbox.lock().begin_turn();
    let envelope = match start {
        TurnStart::Deliver(envelope) => envelope,
        TurnStart::Empty => {
            shared.scheduler.retire();
            return;
        }
        TurnStart::Stale => return,
    };

    let myself = Handle::actor(ActorRef::adopt(cell.clone(), Arc::downgrade(shared)));
    {
        let mut behavior = cell.behavior.lock();
        if let Some(behavior) = behavior.as_mut() {
            let turn = Turn::new(runtime, &myself, &cell);
            if shared.config.debug {
                tracing::trace!(actor = %cell.id(), payload = %envelope.payload, "turn");
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| behavior.dispatch(&turn, envelope)));
            if outcome.is_err() {
                shared.stats.panic();
                tracing::error!(actor = %cell.id(), "handler panicked; message dropped");
            }
        }
    }
    shared.stats.turn();
    drop(myself);
    shared.finish_turn(&cell, true);
}

impl Shared {
    /// Leave Running and route the actor to its next status
    pub(crate) fn finish_turn(&self, cell: &Arc<ActorCell>, delivered: bool) {
        let retire = delivered && cell.is_single_shot();
        let end = cell.mailbox.lock().end_turn(retire);
        match end {
            TurnEnd::Requeue => self.scheduler.requeue(cell.clone()),
            TurnEnd::Idle => self.scheduler.retire(),
            TurnEnd::Terminate(leftovers) => {
                self.terminate(cell, leftovers);
                self.scheduler.retire();
            }
        }
    }
}
