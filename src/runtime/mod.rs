//! Runtime orchestrator and public API
//!
//! `Runtime` is the explicit context threaded through every operation. It
//! owns the actor table, the scheduler, and the worker pool; several
//! runtimes can coexist in one process.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use uuid::Uuid;

// Submodules
pub mod actor;
pub mod config;
pub mod continuation;
pub mod error;
pub mod handle;
pub mod mailbox;
pub mod object;
pub mod pattern;
pub mod registry;
pub mod scheduler;

pub use actor::{ActorId, ActorRef, IDLE_FOOTPRINT, Shape, Turn};
pub use config::RuntimeConfig;
pub use error::{ContractError, Result, RuntimeError};
pub use handle::Handle;
pub use mailbox::{Delivery, Envelope, Status};
pub use object::{Value, ValueKind};
pub use pattern::{Literal, Pattern};

use actor::{ActorCell, Behavior, Kind, bury};
use registry::ActorTable;
use scheduler::{Scheduler, Stats};

/// Identifier of one runtime instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuntimeId(pub Uuid);

impl RuntimeId {
    /// Create a new random RuntimeId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RuntimeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Counters describing what a runtime did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Actors and continuations created
    pub spawned: u64,
    /// Actors and continuations that terminated
    pub terminated: u64,
    /// Handler turns executed
    pub turns: u64,
    /// Sends discarded because the target had terminated
    pub discarded: u64,
    /// Turns whose handler panicked
    pub panicked: u64,
    /// Actors still in the table when the report was taken
    pub live: usize,
}

/// State shared by every clone of a runtime and by its workers
pub(crate) struct Shared {
    id: RuntimeId,
    pub(crate) config: RuntimeConfig,
    pub(crate) table: ActorTable,
    pub(crate) scheduler: Scheduler,
    pub(crate) stats: Stats,
    closed: AtomicBool,
}

impl Shared {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Remove a terminated actor and drop what it owned
    ///
    /// The cell's status must already be Terminated.
    pub(crate) fn terminate(&self, cell: &Arc<ActorCell>, leftovers: VecDeque<Envelope>) {
        let entry = self.table.remove(cell.id());
        let behavior = cell.behavior.lock().take();
        self.stats.terminate();
        tracing::debug!(actor = %cell.id(), discarded = leftovers.len(), "actor terminated");
        drop(entry);
        bury((leftovers, behavior));
    }

    /// Stop the pool and drop every remaining actor
    ///
    /// Returns how many actors were still in the table, or `None` if the
    /// runtime was already closed.
    fn close(&self) -> Option<usize> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return None;
        }
        self.scheduler.stop();

        let cells = self.table.drain();
        let remaining = cells.len();
        for cell in cells {
            if let Some(remains) = cell.dismantle() {
                self.stats.terminate();
                bury(remains);
            }
        }
        Some(remaining)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(remaining) = self.close() {
            tracing::debug!(runtime = %self.id, remaining, "runtime dropped without shutdown");
        }
    }
}

/// Handle to a running actor runtime
///
/// Cloning is cheap; all clones refer to the same runtime. Dropping the last
/// clone shuts the runtime down. Actor states that keep a `Runtime` clone
/// keep it alive until `shutdown` is called.
#[derive(Clone)]
pub struct Runtime {
    shared: Arc<Shared>,
}

/// Non-owning reference to a runtime
#[derive(Clone)]
pub(crate) struct WeakRuntime(Weak<Shared>);

impl WeakRuntime {
    pub(crate) fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(|shared| Runtime { shared })
    }
}

impl Runtime {
    /// Create a runtime and start its worker pool
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let workers = config.worker_count();
        let thread_name = config.thread_name.clone();
        let runtime = Runtime {
            shared: Arc::new(Shared {
                id: RuntimeId::new(),
                config,
                table: ActorTable::new(),
                scheduler: Scheduler::new(),
                stats: Stats::default(),
                closed: AtomicBool::new(false),
            }),
        };
        runtime
            .shared
            .scheduler
            .start_workers(&runtime, workers, &thread_name)?;
        tracing::info!(runtime = %runtime.id(), workers, "runtime started");
        Ok(runtime)
    }

    /// Boot a runtime, run `entry` once, and block until quiescence
    ///
    /// The pool is shut down before returning. Programs whose actors keep
    /// sending to themselves never become quiescent, and neither does this
    /// call.
    pub fn start<F>(config: RuntimeConfig, entry: F) -> Result<RunReport>
    where
        F: FnOnce(&Runtime),
    {
        let runtime = Runtime::new(config)?;
        entry(&runtime);
        runtime.wait_quiescent();
        tracing::info!(runtime = %runtime.id(), "runtime quiescent");
        Ok(runtime.shutdown())
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub(crate) fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Arc::downgrade(&self.shared))
    }

    /// Runtime instance identifier
    pub fn id(&self) -> RuntimeId {
        self.shared.id
    }

    /// Configuration the runtime was built with
    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    /// Number of actors currently in the table
    pub fn live_actors(&self) -> usize {
        self.shared.table.len()
    }

    /// Whether the actor with this address is still in the table
    pub fn is_alive(&self, id: ActorId) -> bool {
        self.shared.table.contains(id)
    }

    /// Actors currently Scheduled or Running
    pub fn active_actors(&self) -> usize {
        self.shared.scheduler.active()
    }

    /// Runnable actors waiting in the run queue
    pub fn backlog(&self) -> usize {
        self.shared.scheduler.backlog()
    }

    /// Snapshot of the runtime counters
    pub fn report(&self) -> RunReport {
        self.shared.stats.report(self.live_actors())
    }

    /// Block until no actor is Scheduled or Running
    pub fn wait_quiescent(&self) {
        self.shared.scheduler.wait();
    }

    /// Like `wait_quiescent`, giving up after `timeout`; true if quiescent
    pub fn wait_quiescent_timeout(&self, timeout: Duration) -> bool {
        self.shared.scheduler.wait_for(timeout)
    }

    /// Stop the worker pool and drop every remaining actor
    ///
    /// Remaining states and continuation frames are dropped here, which is
    /// also where reference cycles between actors are finally broken. Later
    /// sends are discarded and later spawns produce terminated actors.
    /// Idempotent. Must not be called from inside a handler.
    pub fn shutdown(&self) -> RunReport {
        let Some(remaining) = self.shared.close() else {
            return self.report();
        };
        let report = self.report();
        tracing::info!(runtime = %self.id(), remaining, turns = report.turns, "runtime shut down");
        report
    }

    /// Spawn a plain actor owning `state`
    pub fn spawn<S, F>(&self, state: S, handler: F) -> Handle
    where
        S: Send + 'static,
        F: FnMut(&Turn<'_>, &mut S, Handle) + Send + 'static,
    {
        self.spawn_with(move |_turn: &Turn<'_>| state, handler)
    }

    /// Spawn a plain actor whose state is built by `init`
    ///
    /// `init` runs once, as the actor's first turn, on the calling thread.
    /// It may send to the actor; those messages are handled after it returns.
    pub fn spawn_with<S, I, F>(&self, init: I, mut handler: F) -> Handle
    where
        S: Send + 'static,
        I: FnOnce(&Turn<'_>) -> S,
        F: FnMut(&Turn<'_>, &mut S, Handle) + Send + 'static,
    {
        self.install(Shape::Plain, Kind::Actor, move |turn: &Turn<'_>| {
            let mut state = init(turn);
            Behavior::Plain(Box::new(move |turn: &Turn<'_>, payload: Handle| {
                handler(turn, &mut state, payload)
            }))
        })
    }

    /// Spawn an ask-capable actor owning `state`
    pub fn spawn_responder<S, F>(&self, state: S, mut handler: F) -> Handle
    where
        S: Send + 'static,
        F: FnMut(&Turn<'_>, &mut S, Option<Handle>, Handle) + Send + 'static,
    {
        self.install(Shape::Ask, Kind::Actor, move |_turn: &Turn<'_>| {
            let mut state = state;
            Behavior::Ask(Box::new(
                move |turn: &Turn<'_>, reply_to: Option<Handle>, payload: Handle| {
                    handler(turn, &mut state, reply_to, payload)
                },
            ))
        })
    }

    /// Spawn an ask-capable actor without state
    pub fn spawn_stateless<F>(&self, mut handler: F) -> Handle
    where
        F: FnMut(&Turn<'_>, Option<Handle>, Handle) + Send + 'static,
    {
        self.spawn_responder((), move |turn: &Turn<'_>, _state: &mut (), reply_to, payload| {
            handler(turn, reply_to, payload)
        })
    }

    /// Create a table entry and run `build` as its init turn
    pub(crate) fn install<B>(&self, shape: Shape, kind: Kind, build: B) -> Handle
    where
        B: FnOnce(&Turn<'_>) -> Behavior,
    {
        let shared = &self.shared;
        let cell = Arc::new(ActorCell::new(shared.table.next_id(), shape, kind));
        let handle = Handle::actor(ActorRef::adopt(cell.clone(), Arc::downgrade(shared)));
        shared.stats.spawn();

        if shared.is_closed() {
            tracing::warn!(actor = %cell.id(), "spawn on a shut down runtime; actor is inert");
            if let Some(remains) = cell.dismantle() {
                shared.stats.terminate();
                bury(remains);
            }
            return handle;
        }

        shared.table.insert(cell.clone());
        shared.scheduler.activate();

        let built = {
            let turn = Turn::new(self, &handle, &cell);
            panic::catch_unwind(AssertUnwindSafe(|| build(&turn)))
        };
        match built {
            Ok(behavior) => {
                debug_assert_eq!(behavior.shape(), shape);
                *cell.behavior.lock() = Some(behavior);
                tracing::debug!(actor = %cell.id(), ?shape, "actor spawned");
                shared.finish_turn(&cell, false);
                handle
            }
            Err(payload) => {
                tracing::error!(actor = %cell.id(), "actor initializer panicked");
                shared.finish_turn(&cell, false);
                drop(handle);
                panic::resume_unwind(payload)
            }
        }
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("id", &self.shared.id)
            .field("live_actors", &self.live_actors())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn single_worker() -> RuntimeConfig {
        RuntimeConfig {
            workers: 1,
            ..RuntimeConfig::default()
        }
    }

    #[test]
    fn test_start_runs_entry_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let report = Runtime::start(single_worker(), move |_rt| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.turns, 0);
    }

    #[test]
    fn test_dropping_unused_actor_terminates_it() {
        let rt = Runtime::new(single_worker()).unwrap();
        let actor = rt.spawn((), |_turn: &Turn<'_>, _state: &mut (), _payload: Handle| {});
        let id = actor.address().unwrap();
        assert!(rt.is_alive(id));
        drop(actor);
        assert!(!rt.is_alive(id));
        assert_eq!(rt.live_actors(), 0);
        rt.shutdown();
    }

    #[test]
    fn test_shutdown_is_idempotent_and_closes_runtime() {
        let rt = Runtime::new(single_worker()).unwrap();
        let actor = rt.spawn(0u32, |_turn: &Turn<'_>, count: &mut u32, _payload: Handle| {
            *count += 1;
        });
        let first = rt.shutdown();
        assert_eq!(first.live, 0);
        assert_eq!(first.terminated, 1);
        assert_eq!(rt.shutdown(), first);

        assert_eq!(actor.tell(Handle::int(1)), Ok(Delivery::Discarded));
        let late = rt.spawn((), |_turn: &Turn<'_>, _state: &mut (), _payload: Handle| {});
        assert_eq!(rt.live_actors(), 0);
        drop(late);
    }

    struct CountDrop(Arc<AtomicUsize>);

    impl Drop for CountDrop {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_dropping_last_runtime_stops_pool() {
        let rt = Runtime::new(RuntimeConfig {
            workers: 2,
            ..RuntimeConfig::default()
        })
        .unwrap();
        let drops = Arc::new(AtomicUsize::new(0));
        let actor = rt.spawn(
            CountDrop(drops.clone()),
            |_turn: &Turn<'_>, _state: &mut CountDrop, _payload: Handle| {},
        );
        let weak = Arc::downgrade(rt.shared());

        drop(rt);
        assert!(weak.upgrade().is_none());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(actor.tell(Handle::int(1)), Ok(Delivery::Discarded));
    }

    #[test]
    fn test_dropping_runtime_after_turns_releases_it() {
        let rt = Runtime::new(RuntimeConfig {
            workers: 4,
            ..RuntimeConfig::default()
        })
        .unwrap();
        let turns = Arc::new(AtomicUsize::new(0));
        let seen = turns.clone();
        let actor = rt.spawn((), move |_turn: &Turn<'_>, _state: &mut (), _payload: Handle| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        for i in 0..100 {
            actor.tell(Handle::int(i)).unwrap();
        }
        rt.wait_quiescent();
        assert_eq!(turns.load(Ordering::SeqCst), 100);
        let weak = Arc::downgrade(rt.shared());

        drop(rt);
        let address = actor.value().as_actor().unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !address.is_terminated() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(address.is_terminated());
        assert_eq!(weak.strong_count(), 0);
    }

    #[test]
    fn test_init_turn_sees_own_address() {
        let rt = Runtime::new(single_worker()).unwrap();
        let recorded = Arc::new(parking_lot::Mutex::new(None));
        let sink = recorded.clone();
        let actor = rt.spawn_with(
            move |turn: &Turn<'_>| {
                *sink.lock() = Some(turn.id());
            },
            |_turn: &Turn<'_>, _state: &mut (), _payload: Handle| {},
        );
        assert_eq!(*recorded.lock(), actor.address());
        rt.shutdown();
    }
}
