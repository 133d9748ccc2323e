//! Native ABI
//!
//! Flat `extern "C"` surface for code generated by a compiler targeting the
//! runtime. Handles cross the boundary by value (ownership moves) or as
//! `*const Handle` / `&Handle` (borrowed). Actor state and continuation
//! frames are zeroed, caller-sized buffers.
//!
//! The ABI has no error channel. Contract violations that the safe layer
//! reports as [`ContractError`] are logged and abort the process here.

use std::alloc::{self, Layout};
use std::ffi::{CStr, c_char, c_void};
use std::fmt;
use std::ptr::{self, NonNull};

use crate::runtime::{ContractError, Handle, Pattern, Runtime, RuntimeConfig, Turn, WeakRuntime};

/// Alignment of every state and frame buffer
const BUFFER_ALIGN: usize = 16;

/// Entry point run once by [`canopy_start_runtime`]
pub type EntryFn = extern "C" fn(rt: *const Runtime);

/// Initializer run as an actor's first turn, against its zeroed state
pub type InitFn = extern "C" fn(rt: *const Runtime, myself: *const Handle, state: *mut c_void);

/// Plain handler; owns `payload`
pub type RecvFn =
    extern "C" fn(rt: *const Runtime, myself: *const Handle, state: *mut c_void, payload: Handle);

/// Ask-capable handler; owns `reply_to` and `payload`
///
/// `reply_to` is a unit handle when the message was a tell.
pub type AskFn = extern "C" fn(
    rt: *const Runtime,
    myself: *const Handle,
    state: *mut c_void,
    reply_to: Handle,
    payload: Handle,
);

/// Frame destructor; must release any handles stored in the frame
pub type DropFn = extern "C" fn(rt: *const Runtime, frame: *mut c_void);

#[repr(C, align(16))]
struct Aligned([u8; BUFFER_ALIGN]);

/// Zeroed heap buffer with a fixed alignment
struct RawBuffer {
    ptr: NonNull<u8>,
    size: usize,
}

// The buffer is only touched by the single running turn of its actor.
unsafe impl Send for RawBuffer {}

impl RawBuffer {
    fn zeroed(size: usize) -> RawBuffer {
        if size == 0 {
            return RawBuffer {
                ptr: NonNull::<Aligned>::dangling().cast(),
                size,
            };
        }
        let layout = Self::layout(size);
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        match NonNull::new(raw) {
            Some(ptr) => RawBuffer { ptr, size },
            None => alloc::handle_alloc_error(layout),
        }
    }

    fn layout(size: usize) -> Layout {
        match Layout::from_size_align(size, BUFFER_ALIGN) {
            Ok(layout) => layout,
            Err(err) => abort_with("buffer size overflows the address space", err),
        }
    }

    fn as_ptr(&self) -> *mut c_void {
        self.ptr.as_ptr().cast()
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        if self.size != 0 {
            unsafe { alloc::dealloc(self.ptr.as_ptr(), Self::layout(self.size)) }
        }
    }
}

/// Continuation frame: a buffer plus the destructor that empties it
struct NativeFrame {
    buffer: RawBuffer,
    destructor: DropFn,
    runtime: WeakRuntime,
}

impl Drop for NativeFrame {
    fn drop(&mut self) {
        let runtime = self.runtime.upgrade();
        let rt = runtime.as_ref().map_or(ptr::null(), |rt| rt as *const Runtime);
        (self.destructor)(rt, self.buffer.as_ptr());
    }
}

fn abort_with(what: &str, err: impl fmt::Display) -> ! {
    tracing::error!(%err, "{}", what);
    std::process::abort()
}

fn contract_violation(err: ContractError) -> ! {
    abort_with("contract violation at the native boundary", err)
}

fn turn_ptrs(turn: &Turn<'_>) -> (*const Runtime, *const Handle) {
    (turn.runtime(), turn.myself())
}

/// Default configuration with `CANOPY_WORKERS` / `CANOPY_DEBUG` applied
fn env_config() -> RuntimeConfig {
    match RuntimeConfig::default().with_env_overrides() {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(%err, "ignoring environment overrides");
            RuntimeConfig::default()
        }
    }
}

/// Boot a runtime, run `entry` once, and block until quiescence
///
/// Configuration is the default with `CANOPY_WORKERS` / `CANOPY_DEBUG`
/// applied.
#[unsafe(no_mangle)]
pub extern "C" fn canopy_start_runtime(entry: EntryFn) {
    if let Err(err) = Runtime::start(env_config(), |rt: &Runtime| entry(rt)) {
        abort_with("runtime failed to start", err);
    }
}

/// Create a runtime owned by the caller; release it with [`canopy_exit`]
///
/// Configured like [`canopy_start_runtime`].
#[unsafe(no_mangle)]
pub extern "C" fn canopy_new_runtime() -> *mut Runtime {
    match Runtime::new(env_config()) {
        Ok(rt) => Box::into_raw(Box::new(rt)),
        Err(err) => abort_with("runtime failed to start", err),
    }
}

/// Block until no actor of `rt` is Scheduled or Running
#[unsafe(no_mangle)]
pub extern "C" fn canopy_wait_quiescent(rt: &Runtime) {
    rt.wait_quiescent();
}

/// Shut down and free a runtime from [`canopy_new_runtime`]
///
/// Remaining actor states and frames are dropped. Null is ignored.
///
/// # Safety
///
/// `rt` must come from `canopy_new_runtime`, must not have been passed here
/// already, and must not be used afterwards. Must not be called from inside
/// a handler.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn canopy_exit(rt: *mut Runtime) {
    if rt.is_null() {
        return;
    }
    let rt = unsafe { Box::from_raw(rt) };
    let report = rt.shutdown();
    tracing::debug!(runtime = %rt.id(), turns = report.turns, "runtime released");
}

/// Spawn a plain actor with `state_size` bytes of zeroed state
///
/// `init`, if given, runs once as the first turn. The state buffer is freed
/// without a destructor when the actor terminates.
#[unsafe(no_mangle)]
pub extern "C" fn canopy_new_actor(
    rt: &Runtime,
    state_size: usize,
    init: Option<InitFn>,
    handler: RecvFn,
) -> Handle {
    rt.spawn_with(
        move |turn: &Turn<'_>| {
            let state = RawBuffer::zeroed(state_size);
            if let Some(init) = init {
                let (rt, myself) = turn_ptrs(turn);
                init(rt, myself, state.as_ptr());
            }
            state
        },
        move |turn: &Turn<'_>, state: &mut RawBuffer, payload: Handle| {
            let (rt, myself) = turn_ptrs(turn);
            handler(rt, myself, state.as_ptr(), payload)
        },
    )
}

/// Spawn an ask-capable actor without state; `state` is passed as null
#[unsafe(no_mangle)]
pub extern "C" fn canopy_new_stateless_actor(rt: &Runtime, handler: AskFn) -> Handle {
    rt.spawn_stateless(move |turn: &Turn<'_>, reply_to: Option<Handle>, payload: Handle| {
        let (rt, myself) = turn_ptrs(turn);
        handler(
            rt,
            myself,
            ptr::null_mut(),
            reply_to.unwrap_or_else(Handle::unit),
            payload,
        )
    })
}

/// Create a reusable continuation owned by `owner`
///
/// The zeroed frame is returned through `out_frame` and must be filled in
/// before the returned handle is shared. `destructor` runs exactly once,
/// when the continuation terminates or its runtime shuts down.
#[unsafe(no_mangle)]
pub extern "C" fn canopy_continue(
    rt: &Runtime,
    owner: &Handle,
    frame_size: usize,
    out_frame: &mut *mut c_void,
    handler: AskFn,
    destructor: DropFn,
) -> Handle {
    if owner.address().is_none() {
        contract_violation(ContractError::NotAnActor { found: owner.kind() });
    }
    let frame = NativeFrame {
        buffer: RawBuffer::zeroed(frame_size),
        destructor,
        runtime: rt.downgrade(),
    };
    *out_frame = frame.buffer.as_ptr();
    let continuation = rt.continue_with(
        owner,
        frame,
        move |turn: &Turn<'_>, frame: &mut NativeFrame, reply_to: Option<Handle>, payload: Handle| {
            let (rt, myself) = turn_ptrs(turn);
            handler(
                rt,
                myself,
                frame.buffer.as_ptr(),
                reply_to.unwrap_or_else(Handle::unit),
                payload,
            )
        },
    );
    continuation.unwrap_or_else(|err| contract_violation(err))
}

/// Fire-and-forget send; borrows `target`, consumes `payload`
#[unsafe(no_mangle)]
pub extern "C" fn canopy_tell(target: &Handle, payload: Handle) {
    if let Err(err) = target.tell(payload) {
        contract_violation(err);
    }
}

/// Tell addressed to the running actor's own handle
#[unsafe(no_mangle)]
pub extern "C" fn canopy_send(myself: &Handle, payload: Handle) {
    canopy_tell(myself, payload)
}

/// Request/reply send; borrows `target`, consumes `reply_to` and `payload`
#[unsafe(no_mangle)]
pub extern "C" fn canopy_ask(target: &Handle, reply_to: Handle, payload: Handle) {
    if let Err(err) = target.ask(reply_to, payload) {
        contract_violation(err);
    }
}

/// New integer handle
#[unsafe(no_mangle)]
pub extern "C" fn canopy_new_int(value: i64) -> Handle {
    Handle::int(value)
}

/// New float handle
#[unsafe(no_mangle)]
pub extern "C" fn canopy_new_float(value: f64) -> Handle {
    Handle::float(value)
}

/// New atom from a NUL-terminated string (invalid UTF-8 is replaced)
///
/// # Safety
///
/// `text` must point to a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn canopy_new_atom(text: *const c_char) -> Handle {
    let text = unsafe { CStr::from_ptr(text) };
    Handle::atom(text.to_string_lossy())
}

/// Print a value to stdout; borrows
#[unsafe(no_mangle)]
pub extern "C" fn canopy_print(handle: &Handle) {
    handle.print();
}

/// Release one reference
#[unsafe(no_mangle)]
pub extern "C" fn canopy_drop(handle: Handle) {
    drop(handle);
}

/// Mint another reference to the same value
#[unsafe(no_mangle)]
pub extern "C" fn canopy_clone(handle: &Handle) -> Handle {
    handle.clone()
}

/// Pattern matching one integer; free with [`canopy_drop_pattern`]
#[unsafe(no_mangle)]
pub extern "C" fn canopy_eq_int(value: i64) -> *mut Pattern {
    Box::into_raw(Box::new(Pattern::int(value)))
}

/// Pattern matching one atom; free with [`canopy_drop_pattern`]
///
/// # Safety
///
/// `text` must point to a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn canopy_eq_atom(text: *const c_char) -> *mut Pattern {
    let text = unsafe { CStr::from_ptr(text) };
    Box::into_raw(Box::new(Pattern::atom(text.to_string_lossy())))
}

/// Test a borrowed handle against a pattern
#[unsafe(no_mangle)]
pub extern "C" fn canopy_match(pattern: &Pattern, subject: &Handle) -> bool {
    subject.matches(pattern)
}

/// Free a pattern
///
/// # Safety
///
/// `pattern` must come from `canopy_eq_int` / `canopy_eq_atom` and not have
/// been freed already. Null is ignored.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn canopy_drop_pattern(pattern: *mut Pattern) {
    if !pattern.is_null() {
        drop(unsafe { Box::from_raw(pattern) });
    }
}
