//! In-process simulation of the native library
//!
//! [`SimulatedNative`] implements [`NativeApi`] over a small heap of
//! reference-counted objects with attachment slots, bctoolbox-shaped list
//! nodes and null-terminated string arrays. It counts every entry point call
//! so tests can assert on reference balance and laziness.
//!
//! Destructors of attachments run outside the heap lock, before the object's
//! storage is freed, as the real library does.

mod heap;

pub use heap::NativeCalls;

use crate::handle::NativeHandle;
use crate::native::{DataDestroy, NativeApi};
use heap::{Heap, ListNode, Released};
use parking_lot::Mutex;
use std::ffi::{c_char, c_int, c_void, CStr};
use std::fmt;
use std::sync::Arc;

/// Simulated native library. Clones share the same heap.
#[derive(Clone, Default)]
pub struct SimulatedNative {
    heap: Arc<Mutex<Heap>>,
}

impl SimulatedNative {
    /// Create an empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an object with a reference count of one, owned by the test.
    pub fn new_object(&self) -> NativeHandle {
        self.heap.lock().allocate()
    }

    /// Current reference count, or `None` once the object is destroyed.
    pub fn ref_count(&self, handle: NativeHandle) -> Option<u32> {
        self.heap.lock().objects.get(&handle.addr()).map(|object| object.refs)
    }

    /// Whether the object is still allocated.
    pub fn is_alive(&self, handle: NativeHandle) -> bool {
        self.ref_count(handle).is_some()
    }

    /// Drop one reference on behalf of the test. Not counted as a call.
    pub fn release(&self, handle: NativeHandle) {
        let released = self.heap.lock().unref(handle.addr());
        released.run();
    }

    /// Number of attachments stored on the object.
    pub fn attachment_count(&self, handle: NativeHandle) -> usize {
        self.heap
            .lock()
            .objects
            .get(&handle.addr())
            .map_or(0, |object| object.attachments.len())
    }

    /// Whether the object has an attachment under `tag`.
    pub fn has_attachment(&self, handle: NativeHandle, tag: &str) -> bool {
        self.heap.lock().objects.get(&handle.addr()).is_some_and(|object| {
            object
                .attachments
                .iter()
                .any(|attachment| attachment.tag.as_bytes() == tag.as_bytes())
        })
    }

    /// Make `data_set` fail with a negative status.
    pub fn reject_attachments(&self, reject: bool) {
        self.heap.lock().reject_attachments = reject;
    }

    /// Build a null-terminated `char *` array. It lives as long as the heap.
    pub fn string_array(&self, values: &[&str]) -> NativeHandle {
        self.heap.lock().string_array(values)
    }

    /// Build a list whose payloads are `payloads`, in order, and return its
    /// head. Null payloads are stored as is.
    pub fn list_of(&self, payloads: &[NativeHandle]) -> NativeHandle {
        let mut heap = self.heap.lock();
        payloads
            .iter()
            .fold(NativeHandle::NULL, |head, payload| heap.append(head, payload.as_raw()))
    }

    /// Build a list of native string copies.
    pub fn string_list(&self, values: &[&str]) -> NativeHandle {
        let mut heap = self.heap.lock();
        values.iter().fold(NativeHandle::NULL, |head, value| {
            let copy = heap.copy_string(value.as_bytes());
            heap.append(head, copy.cast())
        })
    }

    /// Payloads of a list, in order, up to the first null payload.
    pub fn list_payloads(&self, head: NativeHandle) -> Vec<NativeHandle> {
        let heap = self.heap.lock();
        heap.walk(head).into_iter().take_while(|payload| !payload.is_null()).collect()
    }

    /// String payloads of a list, in order.
    pub fn list_strings(&self, head: NativeHandle) -> Vec<String> {
        self.list_payloads(head)
            .into_iter()
            // SAFETY: string payloads are CStrings owned by the heap.
            .map(|payload| unsafe { CStr::from_ptr(payload.as_raw() as *const c_char) })
            .map(|value| value.to_string_lossy().into_owned())
            .collect()
    }

    /// Free the nodes of a list (not its payloads).
    pub fn free_list(&self, head: NativeHandle) {
        self.heap.lock().free_list(head);
    }

    /// Free the nodes of a string list and its string copies.
    pub fn free_string_list(&self, head: NativeHandle) {
        self.heap.lock().free_string_list(head);
    }

    /// Entry points called so far, in order (the first 4096).
    pub fn call_log(&self) -> Vec<&'static str> {
        self.heap.lock().log.clone()
    }

    /// Snapshot of the call counters.
    pub fn calls(&self) -> NativeCalls {
        self.heap.lock().calls
    }

    /// Reset the call counters and log.
    pub fn reset_calls(&self) {
        let mut heap = self.heap.lock();
        heap.calls = NativeCalls::default();
        heap.log.clear();
    }
}

impl fmt::Debug for SimulatedNative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let heap = self.heap.lock();
        f.debug_struct("SimulatedNative")
            .field("objects", &heap.objects.len())
            .field("calls", &heap.calls)
            .finish()
    }
}

impl NativeApi for SimulatedNative {
    unsafe fn object_ref(&self, handle: NativeHandle) -> NativeHandle {
        let mut heap = self.heap.lock();
        heap.record("object_ref", |calls| calls.refs += 1);
        heap.acquire(handle.addr());
        handle
    }

    unsafe fn object_unref(&self, handle: NativeHandle) {
        let released = {
            let mut heap = self.heap.lock();
            heap.record("object_unref", |calls| calls.unrefs += 1);
            heap.unref(handle.addr())
        };
        released.run();
    }

    unsafe fn data_get(&self, handle: NativeHandle, tag: &CStr) -> *mut c_void {
        let mut heap = self.heap.lock();
        heap.record("data_get", |calls| calls.data_gets += 1);
        heap.attachment(handle.addr(), tag)
    }

    unsafe fn data_set(&self, handle: NativeHandle, tag: &CStr, data: *mut c_void, destroy: DataDestroy) -> c_int {
        let replaced = {
            let mut heap = self.heap.lock();
            heap.record("data_set", |calls| calls.data_sets += 1);
            if heap.reject_attachments {
                return -1;
            }
            match heap.set_attachment(handle.addr(), tag, data as usize, destroy) {
                Ok(replaced) => replaced,
                Err(()) => return -1,
            }
        };
        match replaced {
            Some(previous) => {
                Released::attachments(vec![previous]).run();
                1
            }
            None => 0,
        }
    }

    unsafe fn list_next(&self, node: NativeHandle) -> NativeHandle {
        self.heap.lock().record("list_next", |calls| calls.list_nexts += 1);
        let node = node.as_raw() as *const ListNode;
        NativeHandle::from((*node).next)
    }

    unsafe fn list_get_data(&self, node: NativeHandle) -> NativeHandle {
        self.heap.lock().record("list_get_data", |calls| calls.list_get_datas += 1);
        let node = node.as_raw() as *const ListNode;
        NativeHandle::from((*node).data)
    }

    unsafe fn list_append_string(&self, list: NativeHandle, value: &CStr) -> NativeHandle {
        let mut heap = self.heap.lock();
        heap.record("list_append", |calls| calls.appends += 1);
        let copy = heap.copy_string(value.to_bytes());
        heap.append(list, copy.cast())
    }

    unsafe fn list_append(&self, list: NativeHandle, handle: NativeHandle) -> NativeHandle {
        let mut heap = self.heap.lock();
        heap.record("list_append", |calls| calls.appends += 1);
        heap.append(list, handle.as_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_object_starts_with_one_reference() {
        let native = SimulatedNative::new();
        let h = native.new_object();
        assert_eq!(native.ref_count(h), Some(1));
        native.release(h);
        assert!(!native.is_alive(h));
    }

    #[test]
    fn test_unknown_unref_is_counted() {
        let native = SimulatedNative::new();
        let h = native.new_object();
        native.release(h);
        unsafe { native.object_unref(h) };
        assert_eq!(native.calls().over_releases, 1);
    }

    #[test]
    fn test_attachment_destructor_runs_on_free() {
        static DESTROYED: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);
        unsafe extern "C" fn destroy(_data: *mut c_void) {
            DESTROYED.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }

        let native = SimulatedNative::new();
        let h = native.new_object();
        let mut payload = 0u8;
        let data = (&mut payload as *mut u8).cast();

        assert_eq!(unsafe { native.data_set(h, c"k", data, Some(destroy)) }, 0);
        assert_eq!(unsafe { native.data_get(h, c"k") }, data);
        assert_eq!(unsafe { native.data_set(h, c"k", data, Some(destroy)) }, 1);
        assert_eq!(DESTROYED.load(std::sync::atomic::Ordering::SeqCst), 1);

        native.release(h);
        assert_eq!(DESTROYED.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(native.calls().attachment_destructors, 2);
    }

    #[test]
    fn test_lists_walk_in_order() {
        let native = SimulatedNative::new();
        let a = native.new_object();
        let b = native.new_object();
        let head = native.list_of(&[a, b]);
        assert_eq!(native.list_payloads(head), vec![a, b]);

        let strings = native.string_list(&["x", "y"]);
        assert_eq!(native.list_strings(strings), vec!["x", "y"]);
        assert_eq!(native.calls().total(), 0);

        native.free_list(head);
        native.free_string_list(strings);
        native.release(a);
        native.release(b);
    }

    #[test]
    fn test_call_log_records_entry_points() {
        let native = SimulatedNative::new();
        let h = native.new_object();
        unsafe {
            native.object_ref(h);
            native.object_unref(h);
        }
        assert_eq!(native.call_log(), vec!["object_ref", "object_unref"]);
        native.reset_calls();
        assert_eq!(native.calls().total(), 0);
        native.release(h);
    }
}
