//! Sequence marshaling
//!
//! Native → host: [`ForeignList`], [`ForeignStringList`] and
//! [`ForeignStringArray`] are lazy, single-pass views over native memory.
//! They do not own or free what they walk, and the native collection must
//! stay valid and unmodified while they are iterated.
//!
//! Host → native: [`Bridge::build_string_list`] and
//! [`Bridge::build_object_list`] append to a fresh bctoolbox list.

use crate::bridge::Bridge;
use crate::error::{BridgeError, Result};
use crate::handle::NativeHandle;
use crate::object::{NativeObject, Wrapper};
use std::ffi::{c_char, CStr, CString};
use std::iter::FusedIterator;
use std::marker::PhantomData;

// ============================================================================
// Native -> host
// ============================================================================

/// Decode a native narrow string. Returns `None` for null.
///
/// Bytes that are not UTF-8 are replaced rather than rejected.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for the duration of the call.
pub unsafe fn string_from_native(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

/// Wrappers for the payloads of a native list.
///
/// Payloads are resolved without acquiring a reference: the list owns them.
/// Iteration stops at the first null node or null payload.
pub struct ForeignList<'b, T> {
    bridge: &'b Bridge,
    node: NativeHandle,
    _t: PhantomData<fn() -> T>,
}

impl<T: NativeObject> Iterator for ForeignList<'_, T> {
    type Item = Wrapper<T>;

    fn next(&mut self) -> Option<Wrapper<T>> {
        if self.node.is_null() {
            return None;
        }
        let api = self.bridge.api();
        // SAFETY: non-null nodes come from the list head the caller vouched
        // for, or from list_next on a node of that list.
        let payload = unsafe { api.list_get_data(self.node) };
        if payload.is_null() {
            self.node = NativeHandle::NULL;
            return None;
        }
        // SAFETY: payloads of a live list are live objects of type T.
        let wrapper = unsafe { self.bridge.resolve_borrowed::<T>(payload) };
        self.node = unsafe { api.list_next(self.node) };
        wrapper
    }
}

impl<T: NativeObject> FusedIterator for ForeignList<'_, T> {}

/// Strings held as payloads of a native list.
pub struct ForeignStringList<'b> {
    bridge: &'b Bridge,
    node: NativeHandle,
}

impl Iterator for ForeignStringList<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.node.is_null() {
            return None;
        }
        let api = self.bridge.api();
        // SAFETY: see ForeignList::next.
        let payload = unsafe { api.list_get_data(self.node) };
        let value = unsafe { string_from_native(payload.as_raw().cast()) };
        self.node = if value.is_some() {
            unsafe { api.list_next(self.node) }
        } else {
            NativeHandle::NULL
        };
        value
    }
}

impl FusedIterator for ForeignStringList<'_> {}

/// Strings of a null-terminated native `char *` array.
///
/// Reads memory directly; no native entry point is involved.
pub struct ForeignStringArray {
    cursor: *const *const c_char,
}

impl Iterator for ForeignStringArray {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.cursor.is_null() {
            return None;
        }
        // SAFETY: the cursor starts at an array the caller vouched for and
        // never moves past its null terminator.
        let slot = unsafe { *self.cursor };
        if slot.is_null() {
            self.cursor = std::ptr::null();
            return None;
        }
        self.cursor = unsafe { self.cursor.add(1) };
        unsafe { string_from_native(slot) }
    }
}

impl FusedIterator for ForeignStringArray {}

impl Bridge {
    /// Wrappers for a native list of objects, starting at `head`.
    ///
    /// # Safety
    /// `head` must be null or the head of a live list whose payloads are
    /// live objects of the type `T` wraps. The list must outlive iteration.
    pub unsafe fn marshal_list<T: NativeObject>(&self, head: NativeHandle) -> ForeignList<'_, T> {
        ForeignList {
            bridge: self,
            node: head,
            _t: PhantomData,
        }
    }

    /// Strings of a native list of `char *`, starting at `head`.
    ///
    /// # Safety
    /// `head` must be null or the head of a live list whose payloads are
    /// NUL-terminated strings. The list must outlive iteration.
    pub unsafe fn marshal_string_list(&self, head: NativeHandle) -> ForeignStringList<'_> {
        ForeignStringList { bridge: self, node: head }
    }

    /// Strings of a null-terminated `char *` array starting at `start`.
    ///
    /// # Safety
    /// `start` must be null or point to a null-terminated array of
    /// NUL-terminated strings that outlives iteration.
    pub unsafe fn marshal_string_array(&self, start: NativeHandle) -> ForeignStringArray {
        ForeignStringArray {
            cursor: start.as_raw() as *const *const c_char,
        }
    }

    // ========================================================================
    // Host -> native
    // ========================================================================

    /// Build a native list holding native copies of `items`, in order.
    ///
    /// Returns the null handle for an empty input. Fails, without calling
    /// the native side, if any string contains a NUL byte. The caller owns
    /// the returned list.
    pub fn build_string_list<I, S>(&self, items: I) -> Result<NativeHandle>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let strings = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| CString::new(item.as_ref()).map_err(|_| BridgeError::InteriorNul { index }))
            .collect::<Result<Vec<_>>>()?;

        let mut list = NativeHandle::NULL;
        for value in &strings {
            // SAFETY: `list` is null or the head returned by the previous
            // append.
            list = unsafe { self.api().list_append_string(list, value) };
        }
        Ok(list)
    }

    /// Build a native list of the handles of `items`, in order.
    ///
    /// No reference is acquired or released: the list borrows the objects.
    /// Returns the null handle for an empty input.
    pub fn build_object_list<'w, T, I>(&self, items: I) -> NativeHandle
    where
        T: NativeObject,
        I: IntoIterator<Item = &'w Wrapper<T>>,
    {
        items.into_iter().fold(NativeHandle::NULL, |list, item| {
            // SAFETY: see build_string_list.
            unsafe { self.api().list_append(list, item.handle()) }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimulatedNative;

    crate::native_object! {
        struct Friend;
    }

    #[test]
    fn test_null_inputs_are_empty() {
        let native = SimulatedNative::new();
        let bridge = Bridge::new(native.clone());

        unsafe {
            assert_eq!(bridge.marshal_list::<Friend>(NativeHandle::NULL).count(), 0);
            assert_eq!(bridge.marshal_string_list(NativeHandle::NULL).count(), 0);
            assert_eq!(bridge.marshal_string_array(NativeHandle::NULL).count(), 0);
            assert!(string_from_native(std::ptr::null()).is_none());
        }
        assert_eq!(native.calls().total(), 0);
    }

    #[test]
    fn test_string_from_native_is_lossy() {
        let bytes = b"caf\xe9\0";
        let decoded = unsafe { string_from_native(bytes.as_ptr().cast()) }.unwrap();
        assert_eq!(decoded, "caf\u{fffd}");
    }

    #[test]
    fn test_list_stops_at_null_payload() {
        let native = SimulatedNative::new();
        let bridge = Bridge::new(native.clone());
        let a = native.new_object();
        let b = native.new_object();
        let c = native.new_object();
        let head = native.list_of(&[a, NativeHandle::NULL, b, c]);

        let handles: Vec<_> = unsafe { bridge.marshal_list::<Friend>(head) }.map(|f| f.handle()).collect();
        assert_eq!(handles, vec![a]);

        native.free_list(head);
        for h in [a, b, c] {
            native.release(h);
        }
    }

    #[test]
    fn test_string_list_stops_at_null_payload() {
        let native = SimulatedNative::new();
        let bridge = Bridge::new(native.clone());
        let alice = CString::new("sip:alice@example.com").unwrap();
        let bob = CString::new("sip:bob@example.com").unwrap();
        let head = native.list_of(&[
            NativeHandle::from(alice.as_ptr()),
            NativeHandle::NULL,
            NativeHandle::from(bob.as_ptr()),
        ]);

        let mut values = unsafe { bridge.marshal_string_list(head) };
        assert_eq!(values.next().as_deref(), Some("sip:alice@example.com"));
        assert!(values.next().is_none());
        assert!(values.next().is_none());
        assert_eq!(native.calls().list_nexts, 1);

        native.free_list(head);
    }

    #[test]
    fn test_string_list_stops_at_last_node() {
        let native = SimulatedNative::new();
        let bridge = Bridge::new(native.clone());
        let alice = CString::new("sip:alice@example.com").unwrap();
        let head = native.list_of(&[NativeHandle::from(alice.as_ptr())]);

        let values: Vec<_> = unsafe { bridge.marshal_string_list(head) }.collect();
        assert_eq!(values, vec!["sip:alice@example.com"]);
        assert_eq!(native.calls().list_get_datas, 1);
        assert_eq!(native.calls().list_nexts, 1);

        native.free_list(head);
    }

    #[test]
    fn test_list_iteration_is_lazy() {
        let native = SimulatedNative::new();
        let bridge = Bridge::new(native.clone());
        let a = native.new_object();
        let b = native.new_object();
        let head = native.list_of(&[a, b]);
        native.reset_calls();

        let mut friends = unsafe { bridge.marshal_list::<Friend>(head) };
        assert_eq!(native.calls().total(), 0);

        let first = friends.next().unwrap();
        assert_eq!(first.handle(), a);
        assert!(!first.holds_reference());
        assert_eq!(native.calls().list_nexts, 1);

        drop(friends);
        drop(first);
        native.free_list(head);
        native.release(a);
        native.release(b);
    }

    #[test]
    fn test_marshaled_payloads_take_no_reference() {
        let native = SimulatedNative::new();
        let bridge = Bridge::new(native.clone());
        let a = native.new_object();
        let head = native.list_of(&[a]);

        let friends: Vec<_> = unsafe { bridge.marshal_list::<Friend>(head) }.collect();
        assert_eq!(friends.len(), 1);
        assert_eq!(native.ref_count(a), Some(1));
        drop(friends);
        assert_eq!(native.ref_count(a), Some(1));

        native.free_list(head);
        native.release(a);
    }

    #[test]
    fn test_string_array_stops_at_first_null() {
        let native = SimulatedNative::new();
        let bridge = Bridge::new(native.clone());
        let array = native.string_array(&["sip:alice@example.com", "sip:bob@example.com"]);

        let values: Vec<_> = unsafe { bridge.marshal_string_array(array) }.collect();
        assert_eq!(values, vec!["sip:alice@example.com", "sip:bob@example.com"]);
        assert_eq!(native.calls().total(), 0);
    }

    #[test]
    fn test_empty_string_array() {
        let native = SimulatedNative::new();
        let bridge = Bridge::new(native.clone());
        let array = native.string_array(&[]);

        assert_eq!(unsafe { bridge.marshal_string_array(array) }.count(), 0);
    }

    #[test]
    fn test_build_string_list_rejects_interior_nul() {
        let native = SimulatedNative::new();
        let bridge = Bridge::new(native.clone());

        let err = bridge.build_string_list(["ok", "bad\0value"]).unwrap_err();
        assert_eq!(err, BridgeError::InteriorNul { index: 1 });
        assert_eq!(native.calls().total(), 0);
    }

    #[test]
    fn test_build_object_list_keeps_order_and_counts() {
        let native = SimulatedNative::new();
        let bridge = Bridge::new(native.clone());
        let a = native.new_object();
        let b = native.new_object();

        let wa = unsafe { bridge.resolve_owned::<Friend>(a) }.unwrap();
        let wb = unsafe { bridge.resolve_owned::<Friend>(b) }.unwrap();
        native.reset_calls();

        let head = bridge.build_object_list([&wb, &wa]);
        assert_eq!(native.list_payloads(head), vec![b, a]);
        assert_eq!(native.calls().refs, 0);
        assert_eq!(native.calls().unrefs, 0);
        assert_eq!(native.calls().appends, 2);

        native.free_list(head);
        drop((wa, wb));
        native.release(a);
        native.release(b);
    }
}
