use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{MapError, TypeError};
use crate::target::ErasedTarget;

/// Host value carried inside the runtime without being interpreted by it.
///
/// An `Opaque` either wraps a single value of a concrete host type or wraps
/// nothing (the runtime's nil-of-userdata). The wrapped type's name is kept
/// for diagnostics.
#[derive(Clone)]
pub struct Opaque {
    payload: Option<Arc<dyn Any + Send + Sync>>,
    type_name: &'static str,
}

impl Opaque {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            payload: Some(Arc::new(value)),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Wrap an already shared payload without copying it.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            payload: Some(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn nil() -> Self {
        Self {
            payload: None,
            type_name: "nil",
        }
    }

    pub fn is_nil(&self) -> bool {
        self.payload.is_none()
    }

    pub fn payload(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.payload.as_deref()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.as_deref().and_then(|p| p.downcast_ref())
    }

    /// Wrapped type name with module paths stripped (`Vec<i32>`, not
    /// `alloc::vec::Vec<i32>`). `"nil"` when nothing is wrapped.
    pub fn type_name(&self) -> String {
        short_type_name(self.type_name)
    }

    /// Payload address, 0 when nil. Stable while this `Opaque` is alive.
    pub(crate) fn addr(&self) -> usize {
        self.payload
            .as_ref()
            .map_or(0, |p| Arc::as_ptr(p) as *const () as usize)
    }

    /// Identity: two opaques are the same if they share a payload, or are both nil.
    pub fn same(&self, other: &Opaque) -> bool {
        match (&self.payload, &other.payload) {
            (Some(a), Some(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Default for Opaque {
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "userdata: {}", self.type_name())
    }
}

impl PartialEq for Opaque {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

/// Drop module qualifiers from a `std::any::type_name` rendering.
pub(crate) fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();
    let mut chars = full.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_alphanumeric() || c == '_' {
            segment.push(c);
        } else if c == ':' && chars.peek() == Some(&':') {
            chars.next();
            segment.clear();
        } else {
            out.push_str(&segment);
            segment.clear();
            out.push(c);
        }
    }
    out.push_str(&segment);
    out
}

/// Copy `payload` into `slot` if it is exactly a `T`.
pub fn assign_cloned<T: Clone + 'static>(slot: &mut T, payload: &dyn Any) -> bool {
    match payload.downcast_ref::<T>() {
        Some(v) => {
            *slot = v.clone();
            true
        }
        None => false,
    }
}

/// Map an opaque object into any non-interface target.
///
/// A nil payload is accepted only by targets with a nil state (pointers,
/// slices, maps, interfaces, function and channel handles). A present
/// payload must have exactly the target's type; nothing is coerced.
pub(crate) fn bridge(obj: &Opaque, target: &mut dyn ErasedTarget) -> Result<(), MapError> {
    match obj.payload() {
        None => {
            if !target.has_nil_state() {
                return Err(TypeError::opaque(target.desc(), obj).into());
            }
            target.reset();
            Ok(())
        }
        Some(payload) => {
            if target.accept_opaque(payload) {
                Ok(())
            } else {
                Err(TypeError::opaque(target.desc(), obj).into())
            }
        }
    }
}
