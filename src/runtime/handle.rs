//! Owned, atomically reference-counted handles
//!
//! A `Handle` is one unit of ownership over a [`Value`]. Moving a handle
//! transfers that unit, `clone` mints another, and dropping releases it. The
//! value is freed by whichever thread releases the last unit.
//!
//! The layout is a single non-null pointer so a handle crosses the native ABI
//! as one word, and `&Handle` as a pointer to that word.

use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{self, AtomicUsize, Ordering};

use super::actor::{ActorId, ActorRef};
use super::object::{Value, ValueKind};
use super::pattern::Pattern;

/// Counts above this are treated as a leak-driven overflow and abort.
const MAX_REFCOUNT: usize = isize::MAX as usize;

struct ObjectBox {
    refs: AtomicUsize,
    value: Value,
}

/// Reference-counted handle to a runtime value
#[repr(transparent)]
pub struct Handle {
    ptr: NonNull<ObjectBox>,
}

// The boxed value is immutable apart from the atomic count, and every
// variant of `Value` is itself `Send + Sync`.
unsafe impl Send for Handle {}
unsafe impl Sync for Handle {}

impl Handle {
    /// Box a value with a reference count of one
    pub fn new(value: Value) -> Handle {
        let boxed = Box::new(ObjectBox {
            refs: AtomicUsize::new(1),
            value,
        });
        Handle {
            ptr: NonNull::from(Box::leak(boxed)),
        }
    }

    /// New integer handle
    pub fn int(value: i64) -> Handle {
        Handle::new(Value::Int(value))
    }

    /// New float handle
    pub fn float(value: f64) -> Handle {
        Handle::new(Value::Float(value))
    }

    /// New atom handle
    pub fn atom(text: impl Into<String>) -> Handle {
        Handle::new(Value::atom(text))
    }

    /// New unit handle
    pub fn unit() -> Handle {
        Handle::new(Value::Unit)
    }

    pub(crate) fn actor(actor: ActorRef) -> Handle {
        Handle::new(Value::Actor(actor))
    }

    fn inner(&self) -> &ObjectBox {
        // The pointer stays valid while this handle holds its unit.
        unsafe { self.ptr.as_ref() }
    }

    /// Borrow the referenced value
    pub fn value(&self) -> &Value {
        &self.inner().value
    }

    /// Kind of the referenced value
    pub fn kind(&self) -> ValueKind {
        self.value().kind()
    }

    /// Current number of live units for the referenced value
    ///
    /// Only a snapshot: other threads may clone or release concurrently.
    pub fn ref_count(&self) -> usize {
        self.inner().refs.load(Ordering::Acquire)
    }

    /// Whether both handles reference the same boxed value
    pub fn ptr_eq(this: &Handle, other: &Handle) -> bool {
        this.ptr == other.ptr
    }

    /// Integer payload, if any
    pub fn as_int(&self) -> Option<i64> {
        match self.value() {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float payload, if any
    pub fn as_float(&self) -> Option<f64> {
        match self.value() {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Atom text, if any
    pub fn as_atom(&self) -> Option<&str> {
        match self.value() {
            Value::Atom(v) => Some(v),
            _ => None,
        }
    }

    /// Actor address, if this handle references an actor or continuation
    pub fn address(&self) -> Option<ActorId> {
        self.value().as_actor().map(ActorRef::id)
    }

    /// Test the referenced value against a pattern
    pub fn matches(&self, pattern: &Pattern) -> bool {
        pattern.matches(self.value())
    }

    /// Debug print to stdout; borrows, no count change
    pub fn print(&self) {
        println!("{}", self);
    }
}

impl Clone for Handle {
    fn clone(&self) -> Self {
        let old = self.inner().refs.fetch_add(1, Ordering::Relaxed);
        if old > MAX_REFCOUNT {
            std::process::abort();
        }
        Handle { ptr: self.ptr }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if self.inner().refs.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }
        atomic::fence(Ordering::Acquire);
        // Last unit: no other handle can observe the box any more.
        drop(unsafe { Box::from_raw(self.ptr.as_ptr()) });
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        Handle::ptr_eq(self, other) || self.value() == other.value()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.value(), f)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("value", self.value())
            .field("refs", &self.ref_count())
            .finish()
    }
}

impl From<i64> for Handle {
    fn from(value: i64) -> Self {
        Handle::int(value)
    }
}

impl From<f64> for Handle {
    fn from(value: f64) -> Self {
        Handle::float(value)
    }
}

impl From<&str> for Handle {
    fn from(value: &str) -> Self {
        Handle::atom(value)
    }
}
