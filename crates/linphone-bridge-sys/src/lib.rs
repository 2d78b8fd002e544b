#![allow(non_camel_case_types)]

//! Raw bindings to the parts of belle-sip and bctoolbox that the binding
//! substrate consumes.
//!
//! Only the reference counting, attachment slot and list primitives are
//! declared here. Generated per-entity bindings declare their own entry
//! points.
//!
//! Linking is opt-in: enable the `link` feature to emit link directives for
//! `libbellesip` and `libbctoolbox`. Without it the declarations compile but
//! nothing may call them.

use libc::{c_char, c_int, c_void};

// ============================================================================
// Opaque Types
// ============================================================================

/// Opaque belle-sip object. Every liblinphone entity starts with one.
#[repr(C)]
pub struct belle_sip_object_t {
    _private: [u8; 0],
}

/// bctoolbox doubly-linked list node.
///
/// The layout is public API of bctoolbox; the substrate only walks `next`
/// through `bctbx_list_next` and reads `data` through `bctbx_list_get_data`.
#[repr(C)]
pub struct bctbx_list_t {
    pub next: *mut bctbx_list_t,
    pub prev: *mut bctbx_list_t,
    pub data: *mut c_void,
}

/// Destructor invoked by belle-sip when an attachment is replaced or its
/// owning object is destroyed.
pub type belle_sip_data_destroy = Option<unsafe extern "C" fn(data: *mut c_void)>;

// ============================================================================
// belle-sip object API
// ============================================================================

#[cfg_attr(feature = "link", link(name = "bellesip"))]
extern "C" {
    /// Increments the reference count and returns `obj`.
    pub fn belle_sip_object_ref(obj: *mut c_void) -> *mut belle_sip_object_t;

    /// Decrements the reference count, destroying the object at zero.
    pub fn belle_sip_object_unref(obj: *mut c_void);

    /// Returns the attachment stored under `name`, or NULL.
    pub fn belle_sip_object_data_get(obj: *mut belle_sip_object_t, name: *const c_char) -> *mut c_void;

    /// Stores `data` under `name`. Returns 0 when stored, 1 when a previous
    /// value under the same name was replaced (and passed to its destructor).
    pub fn belle_sip_object_data_set(
        obj: *mut belle_sip_object_t,
        name: *const c_char,
        data: *mut c_void,
        destroy_func: belle_sip_data_destroy,
    ) -> c_int;
}

// ============================================================================
// bctoolbox list API
// ============================================================================

#[cfg_attr(feature = "link", link(name = "bctoolbox"))]
extern "C" {
    pub fn bctbx_list_next(elem: *const bctbx_list_t) -> *mut bctbx_list_t;

    pub fn bctbx_list_get_data(elem: *const bctbx_list_t) -> *mut c_void;

    /// Appends `data` and returns the (possibly new) head.
    pub fn bctbx_list_append(elem: *mut bctbx_list_t, data: *mut c_void) -> *mut bctbx_list_t;

    /// Heap copy owned by bctoolbox, released with `bctbx_free`.
    pub fn bctbx_strdup(tmp: *const c_char) -> *mut c_char;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_node_layout() {
        // next, prev, data: three pointers, no padding.
        assert_eq!(std::mem::size_of::<bctbx_list_t>(), 3 * std::mem::size_of::<*mut c_void>());
        assert_eq!(std::mem::align_of::<bctbx_list_t>(), std::mem::align_of::<*mut c_void>());
    }
}
