//! Native collaborator interface
//!
//! The bridge consumes a fixed set of native entry points: reference
//! counting, the per-object attachment slot, and the bctoolbox list
//! primitives. [`NativeApi`] abstracts them so the bridge can run against the
//! real libraries ([`LinphoneApi`], feature `linphone`) or the in-process
//! simulation used by tests.
//!
//! # Trust boundary
//!
//! Native data structures are trusted to be well formed. A cyclic list or a
//! dangling payload is not detected; it is undefined behavior in the real
//! libraries.

use crate::handle::NativeHandle;
use std::ffi::{c_int, c_void, CStr};

/// Destructor the native side runs on an attachment when it is replaced or
/// when its owning object is destroyed.
pub type DataDestroy = Option<unsafe extern "C" fn(data: *mut c_void)>;

/// The native entry points consumed by the bridge.
///
/// Implementations must be callable from any thread: wrappers release their
/// references wherever they are dropped.
pub trait NativeApi: Send + Sync {
    /// Increment the reference count of `handle` and return it.
    ///
    /// # Safety
    /// `handle` must be a live native object.
    unsafe fn object_ref(&self, handle: NativeHandle) -> NativeHandle;

    /// Decrement the reference count of `handle`, destroying it at zero.
    ///
    /// # Safety
    /// `handle` must be a live native object on which the caller owns a
    /// reference.
    unsafe fn object_unref(&self, handle: NativeHandle);

    /// Attachment stored under `tag`, or null.
    ///
    /// # Safety
    /// `handle` must be a live native object.
    unsafe fn data_get(&self, handle: NativeHandle, tag: &CStr) -> *mut c_void;

    /// Store `data` under `tag`, running the destructor of any previous
    /// value. Returns a negative status on failure; belle-sip returns 1 when
    /// a previous value was replaced and 0 otherwise.
    ///
    /// # Safety
    /// `handle` must be a live native object, and `destroy` must accept
    /// `data`.
    unsafe fn data_set(&self, handle: NativeHandle, tag: &CStr, data: *mut c_void, destroy: DataDestroy) -> c_int;

    /// Next node of a list, or null.
    ///
    /// # Safety
    /// `node` must be a live list node.
    unsafe fn list_next(&self, node: NativeHandle) -> NativeHandle;

    /// Payload of a list node, or null.
    ///
    /// # Safety
    /// `node` must be a live list node.
    unsafe fn list_get_data(&self, node: NativeHandle) -> NativeHandle;

    /// Append a native copy of `value` and return the new head.
    ///
    /// # Safety
    /// `list` must be null or the head of a live list.
    unsafe fn list_append_string(&self, list: NativeHandle, value: &CStr) -> NativeHandle;

    /// Append `handle` as a payload and return the new head. Does not touch
    /// the payload's reference count.
    ///
    /// # Safety
    /// `list` must be null or the head of a live list.
    unsafe fn list_append(&self, list: NativeHandle, handle: NativeHandle) -> NativeHandle;
}

// ============================================================================
// liblinphone
// ============================================================================

/// [`NativeApi`] backed by libbellesip and libbctoolbox.
#[cfg(feature = "linphone")]
#[derive(Debug, Clone, Copy, Default)]
pub struct LinphoneApi;

#[cfg(feature = "linphone")]
impl NativeApi for LinphoneApi {
    unsafe fn object_ref(&self, handle: NativeHandle) -> NativeHandle {
        NativeHandle::from(linphone_bridge_sys::belle_sip_object_ref(handle.as_raw()))
    }

    unsafe fn object_unref(&self, handle: NativeHandle) {
        linphone_bridge_sys::belle_sip_object_unref(handle.as_raw());
    }

    unsafe fn data_get(&self, handle: NativeHandle, tag: &CStr) -> *mut c_void {
        linphone_bridge_sys::belle_sip_object_data_get(handle.as_raw().cast(), tag.as_ptr())
    }

    unsafe fn data_set(&self, handle: NativeHandle, tag: &CStr, data: *mut c_void, destroy: DataDestroy) -> c_int {
        linphone_bridge_sys::belle_sip_object_data_set(handle.as_raw().cast(), tag.as_ptr(), data, destroy)
    }

    unsafe fn list_next(&self, node: NativeHandle) -> NativeHandle {
        NativeHandle::from(linphone_bridge_sys::bctbx_list_next(node.as_raw() as *const linphone_bridge_sys::bctbx_list_t))
    }

    unsafe fn list_get_data(&self, node: NativeHandle) -> NativeHandle {
        NativeHandle::from(linphone_bridge_sys::bctbx_list_get_data(node.as_raw() as *const linphone_bridge_sys::bctbx_list_t))
    }

    unsafe fn list_append_string(&self, list: NativeHandle, value: &CStr) -> NativeHandle {
        let copy = linphone_bridge_sys::bctbx_strdup(value.as_ptr());
        NativeHandle::from(linphone_bridge_sys::bctbx_list_append(list.as_raw().cast(), copy.cast()))
    }

    unsafe fn list_append(&self, list: NativeHandle, handle: NativeHandle) -> NativeHandle {
        NativeHandle::from(linphone_bridge_sys::bctbx_list_append(list.as_raw().cast(), handle.as_raw()))
    }
}
