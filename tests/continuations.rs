//! Continuation lifecycle tests

use canopy::{Delivery, Handle, Runtime, RuntimeConfig, Turn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Frame {
    calls: Arc<AtomicUsize>,
    drops: Arc<AtomicUsize>,
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

fn runtime() -> Runtime {
    Runtime::new(RuntimeConfig {
        workers: 2,
        ..RuntimeConfig::default()
    })
    .unwrap()
}

fn owner(rt: &Runtime) -> Handle {
    rt.spawn((), |_turn: &Turn<'_>, _state: &mut (), _payload: Handle| {})
}

fn counting_frame() -> (Frame, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let drops = Arc::new(AtomicUsize::new(0));
    let frame = Frame {
        calls: calls.clone(),
        drops: drops.clone(),
    };
    (frame, calls, drops)
}

fn count_call(_turn: &Turn<'_>, frame: &mut Frame, _reply_to: Option<Handle>, _payload: Handle) {
    frame.calls.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn test_no_invocation_before_first_send() {
    let rt = runtime();
    let owner = owner(&rt);
    let (frame, calls, drops) = counting_frame();
    let cont = rt.continue_with(&owner, frame, count_call).unwrap();

    rt.wait_quiescent();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    cont.tell(Handle::unit()).unwrap();
    rt.wait_quiescent();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    rt.shutdown();
}

#[test]
fn test_reusable_frame_dropped_once_when_unreachable() {
    let rt = runtime();
    let owner = owner(&rt);
    let (frame, calls, drops) = counting_frame();
    let cont = rt.continue_with(&owner, frame, count_call).unwrap();

    for _ in 0..3 {
        cont.tell(Handle::unit()).unwrap();
    }
    drop(cont);
    rt.wait_quiescent();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    rt.shutdown();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_single_shot_discards_queued_envelopes() {
    let rt = runtime();
    let owner = owner(&rt);
    let (frame, calls, drops) = counting_frame();
    let cont = rt.continue_once(&owner, frame, count_call).unwrap();

    let payload = Handle::atom("late");
    cont.tell(Handle::unit()).unwrap();
    let second = cont.tell(payload.clone()).unwrap();
    rt.wait_quiescent();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(payload.ref_count(), 1);
    assert!(matches!(second, Delivery::Enqueued | Delivery::Discarded));
    assert_eq!(cont.tell(Handle::unit()), Ok(Delivery::Discarded));
    rt.shutdown();
}

#[test]
fn test_frame_handles_are_released_at_termination() {
    let rt = runtime();
    let owner = owner(&rt);
    let stashed = Handle::atom("stashed");

    let cont = rt
        .continue_with(
            &owner,
            stashed.clone(),
            |_turn: &Turn<'_>, _frame: &mut Handle, _reply, _payload| {},
        )
        .unwrap();
    assert_eq!(stashed.ref_count(), 2);

    drop(cont);
    assert_eq!(stashed.ref_count(), 1);
    rt.shutdown();
}

#[test]
fn test_cycle_through_frame_is_broken_at_shutdown() {
    let rt = runtime();
    let (frame, _calls, drops) = counting_frame();

    // The holder stores the continuation; the continuation keeps the holder
    // alive as its owner.
    let holder = rt.spawn(
        None::<Handle>,
        |_turn: &Turn<'_>, slot: &mut Option<Handle>, payload: Handle| {
            *slot = Some(payload);
        },
    );
    let cont = rt.continue_with(&holder, frame, count_call).unwrap();
    holder.tell(cont).unwrap();
    drop(holder);
    rt.wait_quiescent();

    assert_eq!(rt.live_actors(), 2);
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    let report = rt.shutdown();
    assert_eq!(report.live, 0);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_continuation_can_reply_through_its_own_ask() {
    let rt = runtime();
    let doubler = rt.spawn_stateless(|_turn: &Turn<'_>, reply_to: Option<Handle>, payload: Handle| {
        if let Some(reply_to) = reply_to {
            let n = payload.as_int().unwrap_or(0);
            reply_to.tell(Handle::int(n * 2)).unwrap();
        }
    });
    let results = Arc::new(Mutex::new(Vec::new()));

    // Chain: the first continuation asks again with its own result.
    let second = rt
        .continue_once(
            &doubler,
            results.clone(),
            |_turn: &Turn<'_>, results: &mut Arc<Mutex<Vec<i64>>>, _reply, payload: Handle| {
                results.lock().push(payload.as_int().unwrap());
            },
        )
        .unwrap();
    let first = rt
        .continue_once(
            &doubler,
            (doubler.clone(), Some(second)),
            |_turn: &Turn<'_>, frame: &mut (Handle, Option<Handle>), _reply, payload: Handle| {
                if let Some(next) = frame.1.take() {
                    frame.0.ask(next, payload).unwrap();
                }
            },
        )
        .unwrap();

    doubler.ask(first, Handle::int(5)).unwrap();
    rt.wait_quiescent();
    assert_eq!(*results.lock(), vec![20]);
    rt.shutdown();
}
