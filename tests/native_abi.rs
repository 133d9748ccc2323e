//! Native ABI tests
//!
//! Drives the runtime the way generated code does: through `extern "C"`
//! callbacks, raw state buffers, and handles passed by value.

use canopy::Handle;
use canopy::ffi::*;
use canopy::runtime::Runtime;
use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

const COUNT_TO: u64 = 10;

static COUNTER_RESULT: AtomicI64 = AtomicI64::new(-1);
static COUNTER_INITS: AtomicUsize = AtomicUsize::new(0);

extern "C" fn counter_init(_rt: *const Runtime, myself: *const Handle, state: *mut c_void) {
    COUNTER_INITS.fetch_add(1, Ordering::SeqCst);
    let myself = unsafe { &*myself };
    unsafe { *(state as *mut u64) = 0 };
    canopy_send(myself, canopy_new_int(0));
}

extern "C" fn counter_recv(
    _rt: *const Runtime,
    myself: *const Handle,
    state: *mut c_void,
    payload: Handle,
) {
    let count = unsafe { &mut *(state as *mut u64) };
    *count += 1;
    canopy_drop(payload);
    if *count < COUNT_TO {
        canopy_send(unsafe { &*myself }, canopy_new_int(*count as i64));
    } else {
        COUNTER_RESULT.store(*count as i64, Ordering::SeqCst);
    }
}

extern "C" fn counter_entry(rt: *const Runtime) {
    let rt = unsafe { &*rt };
    let counter = canopy_new_actor(rt, std::mem::size_of::<u64>(), Some(counter_init), counter_recv);
    canopy_drop(counter);
}

#[test]
fn test_counter_program_runs_to_quiescence() {
    canopy_start_runtime(counter_entry);
    assert_eq!(COUNTER_INITS.load(Ordering::SeqCst), 1);
    assert_eq!(COUNTER_RESULT.load(Ordering::SeqCst), COUNT_TO as i64);
}

static REPLY_SUM: AtomicI64 = AtomicI64::new(0);
static FRAME_DROPS: AtomicUsize = AtomicUsize::new(0);
static FRAME_AT_DROP: AtomicI64 = AtomicI64::new(0);

extern "C" fn forward(
    _rt: *const Runtime,
    _myself: *const Handle,
    state: *mut c_void,
    reply_to: Handle,
    payload: Handle,
) {
    assert!(state.is_null());
    if reply_to.address().is_some() {
        canopy_tell(&reply_to, payload);
    } else {
        canopy_drop(payload);
    }
    canopy_drop(reply_to);
}

extern "C" fn on_reply(
    _rt: *const Runtime,
    _myself: *const Handle,
    frame: *mut c_void,
    reply_to: Handle,
    payload: Handle,
) {
    let base = unsafe { &mut *(frame as *mut i64) };
    *base += payload.as_int().unwrap_or(0);
    REPLY_SUM.store(*base, Ordering::SeqCst);
    canopy_drop(reply_to);
    canopy_drop(payload);
}

extern "C" fn on_frame_drop(rt: *const Runtime, frame: *mut c_void) {
    assert!(!rt.is_null());
    FRAME_AT_DROP.store(unsafe { *(frame as *const i64) }, Ordering::SeqCst);
    FRAME_DROPS.fetch_add(1, Ordering::SeqCst);
}

extern "C" fn continuation_entry(rt: *const Runtime) {
    let rt = unsafe { &*rt };
    let echo = canopy_new_stateless_actor(rt, forward);

    let mut frame: *mut c_void = ptr::null_mut();
    let cont = canopy_continue(
        rt,
        &echo,
        std::mem::size_of::<i64>(),
        &mut frame,
        on_reply,
        on_frame_drop,
    );
    assert_eq!(unsafe { *(frame as *const i64) }, 0);
    unsafe { *(frame as *mut i64) = 41 };

    canopy_ask(&echo, cont, canopy_new_int(1));
    canopy_drop(echo);
}

#[test]
fn test_continuation_destructor_runs_once() {
    canopy_start_runtime(continuation_entry);
    assert_eq!(REPLY_SUM.load(Ordering::SeqCst), 42);
    assert_eq!(FRAME_DROPS.load(Ordering::SeqCst), 1);
    assert_eq!(FRAME_AT_DROP.load(Ordering::SeqCst), 42);
}

#[test]
fn test_atoms_and_patterns() {
    let atom = unsafe { canopy_new_atom(c"hello".as_ptr()) };
    assert_eq!(atom.as_atom(), Some("hello"));
    canopy_print(&atom);

    let pattern = unsafe { canopy_eq_atom(c"hello".as_ptr()) };
    let other = canopy_new_float(0.5);
    unsafe {
        assert!(canopy_match(&*pattern, &atom));
        assert!(!canopy_match(&*pattern, &other));
        canopy_drop_pattern(pattern);
    }
    canopy_drop(other);
    canopy_drop(atom);
}

static OWNED_HANDLED: AtomicUsize = AtomicUsize::new(0);

extern "C" fn owned_recv(
    _rt: *const Runtime,
    _myself: *const Handle,
    state: *mut c_void,
    payload: Handle,
) {
    let total = unsafe { &mut *(state as *mut i64) };
    *total += payload.as_int().unwrap_or(0);
    canopy_drop(payload);
    OWNED_HANDLED.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn test_caller_owned_runtime_lifecycle() {
    let rt = canopy_new_runtime();
    assert!(!rt.is_null());
    let other = canopy_new_runtime();
    unsafe {
        assert_ne!((*rt).id(), (*other).id());
        canopy_exit(other);
    }

    let actor = canopy_new_actor(unsafe { &*rt }, std::mem::size_of::<i64>(), None, owned_recv);
    for n in 1..=5 {
        canopy_tell(&actor, canopy_new_int(n));
    }
    canopy_wait_quiescent(unsafe { &*rt });
    assert_eq!(OWNED_HANDLED.load(Ordering::SeqCst), 5);
    assert_eq!(unsafe { (*rt).live_actors() }, 1);

    unsafe { canopy_exit(rt) };
    assert!(actor.value().as_actor().unwrap().is_terminated());
    canopy_tell(&actor, canopy_new_int(6));
    assert_eq!(OWNED_HANDLED.load(Ordering::SeqCst), 5);
    canopy_drop(actor);

    unsafe { canopy_exit(ptr::null_mut()) };
}

#[test]
fn test_int_handles_cover_the_full_range() {
    for value in [i64::MIN, -1, 0, 1, i64::MAX] {
        let handle = canopy_new_int(value);
        assert_eq!(handle.as_int(), Some(value));
        let pattern = canopy_eq_int(value);
        unsafe {
            assert!(canopy_match(&*pattern, &handle));
            canopy_drop_pattern(pattern);
        }
        canopy_drop(handle);
    }
    let max = canopy_new_int(i64::MAX);
    assert_eq!(max.to_string(), i64::MAX.to_string());
    canopy_drop(max);
}
