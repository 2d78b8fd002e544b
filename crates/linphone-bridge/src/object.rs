//! Wrapper base capability
//!
//! Every generated entity type implements [`NativeObject`] and is handed out
//! as a [`Wrapper`]. Handle-only entity types are declared with
//! [`native_object!`](crate::native_object).

use crate::handle::NativeHandle;
use crate::lifetime::Reference;
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Host-side state of one native object.
///
/// The state is built once per live identity with [`from_native`] and shared
/// by every wrapper resolved for the same handle while any of them is alive.
/// It may therefore carry derived or mutable state (caches, listener
/// registrations) without it being duplicated or going stale between
/// resolutions. Once every wrapper is gone, the next resolution builds it
/// again from the handle.
///
/// [`from_native`]: NativeObject::from_native
pub trait NativeObject: Any + Send + Sync + Sized {
    /// Build the state for `handle`. `handle` is never null.
    fn from_native(handle: NativeHandle) -> Self;

    /// The handle this state was built for.
    fn native_handle(&self) -> NativeHandle;
}

/// A host wrapper around one native handle.
///
/// Clones share the state and the owned reference (if any): the reference
/// is released once, when the last clone is dropped. Dropping may happen on
/// any thread.
pub struct Wrapper<T: NativeObject> {
    object: Arc<T>,
    reference: Option<Arc<Reference>>,
}

impl<T: NativeObject> Wrapper<T> {
    pub(crate) fn new(object: Arc<T>, reference: Option<Reference>) -> Self {
        Self {
            object,
            reference: reference.map(Arc::new),
        }
    }

    /// The wrapped native handle.
    pub fn handle(&self) -> NativeHandle {
        self.object.native_handle()
    }

    /// Whether this wrapper keeps the native object alive.
    pub fn holds_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// The shared state.
    pub fn object(&self) -> &Arc<T> {
        &self.object
    }

    /// Whether both wrappers share the same host state.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.object, &b.object)
    }
}

impl<T: NativeObject> Clone for Wrapper<T> {
    fn clone(&self) -> Self {
        Self {
            object: Arc::clone(&self.object),
            reference: self.reference.clone(),
        }
    }
}

impl<T: NativeObject> Deref for Wrapper<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.object
    }
}

impl<T: NativeObject> PartialEq for Wrapper<T> {
    fn eq(&self, other: &Self) -> bool {
        self.handle() == other.handle()
    }
}

impl<T: NativeObject> Eq for Wrapper<T> {}

impl<T: NativeObject> Hash for Wrapper<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle().hash(state);
    }
}

impl<T: NativeObject> fmt::Debug for Wrapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wrapper")
            .field("type", &std::any::type_name::<T>())
            .field("handle", &self.handle())
            .field("holds_reference", &self.holds_reference())
            .finish()
    }
}

/// Declare handle-only entity types.
///
/// ```ignore
/// linphone_bridge::native_object! {
///     /// A SIP address.
///     pub struct Address;
///     pub struct Call;
/// }
/// ```
#[macro_export]
macro_rules! native_object {
    ($($(#[$meta:meta])* $vis:vis struct $name:ident;)+) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            $vis struct $name {
                handle: $crate::NativeHandle,
            }

            impl $crate::NativeObject for $name {
                fn from_native(handle: $crate::NativeHandle) -> Self {
                    Self { handle }
                }

                fn native_handle(&self) -> $crate::NativeHandle {
                    self.handle
                }
            }
        )+
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    crate::native_object! {
        struct Address;
    }

    fn handle_of(slot: &mut u64) -> NativeHandle {
        NativeHandle::from(slot as *mut u64)
    }

    #[test]
    fn test_macro_stores_handle() {
        let mut slot = 0u64;
        let h = handle_of(&mut slot);
        let address = Address::from_native(h);
        assert_eq!(address.native_handle(), h);
    }

    #[test]
    fn test_borrowed_wrapper_holds_no_reference() {
        let mut slot = 0u64;
        let h = handle_of(&mut slot);
        let wrapper = Wrapper::new(Arc::new(Address::from_native(h)), None);
        assert!(!wrapper.holds_reference());
        assert_eq!(wrapper.handle(), h);
        assert_eq!(wrapper.native_handle(), h);
    }

    #[test]
    fn test_clones_share_state() {
        let mut slot = 0u64;
        let h = handle_of(&mut slot);
        let a = Wrapper::new(Arc::new(Address::from_native(h)), None);
        let b = a.clone();
        assert!(Wrapper::ptr_eq(&a, &b));
        assert_eq!(Arc::strong_count(a.object()), 2);
    }

    #[test]
    fn test_equality_follows_handle() {
        let mut slot = 0u64;
        let h = handle_of(&mut slot);
        let a = Wrapper::new(Arc::new(Address::from_native(h)), None);
        let b = Wrapper::new(Arc::new(Address::from_native(h)), None);
        assert!(!Wrapper::ptr_eq(&a, &b));
        assert_eq!(a, b);

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }
}
