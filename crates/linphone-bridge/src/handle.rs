//! Opaque native handles
//!
//! A [`NativeHandle`] is the address of a native heap object (or list node,
//! or string array). The bridge never dereferences it; it only hands it back
//! to [`NativeApi`](crate::NativeApi) entry points.

use std::ffi::c_void;
use std::fmt;

/// Opaque, non-owning reference to a native heap object.
///
/// Several handles may alias the same native object over time. Holding a
/// handle does not keep the object alive; see [`Wrapper`](crate::Wrapper)
/// for ownership.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(*mut c_void);

// SAFETY: a handle is an address. It is only ever passed back to native entry
// points, whose thread-safety is the native library's contract.
unsafe impl Send for NativeHandle {}
unsafe impl Sync for NativeHandle {}

impl NativeHandle {
    /// The null handle. Resolves to nothing and marshals to empty sequences.
    pub const NULL: Self = Self(std::ptr::null_mut());

    /// Wrap a raw native pointer.
    #[inline]
    pub const fn from_raw(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    /// The raw pointer, for passing to native entry points.
    #[inline]
    pub const fn as_raw(self) -> *mut c_void {
        self.0
    }

    /// Whether this is the null handle.
    #[inline]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    /// Address as an integer (for hashing and diagnostics).
    #[inline]
    pub fn addr(self) -> usize {
        self.0 as usize
    }
}

impl Default for NativeHandle {
    fn default() -> Self {
        Self::NULL
    }
}

impl<T> From<*mut T> for NativeHandle {
    fn from(ptr: *mut T) -> Self {
        Self(ptr.cast())
    }
}

impl<T> From<*const T> for NativeHandle {
    fn from(ptr: *const T) -> Self {
        Self(ptr as *mut c_void)
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeHandle({:p})", self.0)
    }
}

impl fmt::Pointer for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_null_handle() {
        assert!(NativeHandle::NULL.is_null());
        assert!(NativeHandle::default().is_null());
        assert_eq!(NativeHandle::NULL.addr(), 0);
    }

    #[test]
    fn test_handle_from_pointer() {
        let mut slot = 7u32;
        let handle = NativeHandle::from(&mut slot as *mut u32);
        assert!(!handle.is_null());
        assert_eq!(handle.as_raw() as *mut u32, &mut slot as *mut u32);
        assert_eq!(handle, NativeHandle::from_raw(handle.as_raw()));
    }

    #[test]
    fn test_handles_hash_by_address() {
        let a = 1u8;
        let b = 2u8;
        let ha = NativeHandle::from(&a as *const u8);
        let hb = NativeHandle::from(&b as *const u8);

        let mut set = HashSet::new();
        set.insert(ha);
        set.insert(ha);
        set.insert(hb);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_debug_shows_address() {
        let s = format!("{:?}", NativeHandle::NULL);
        assert!(s.starts_with("NativeHandle(0x"));
    }
}
