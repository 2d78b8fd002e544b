//! Lifetime bridge
//!
//! A [`Reference`] is one owned native reference. It is created either by
//! acquiring a new reference or by adopting one the caller already owns, and
//! it releases that reference exactly once, when dropped. It is not `Clone`,
//! so a second release cannot be expressed.

use crate::handle::NativeHandle;
use crate::native::NativeApi;
use std::fmt;
use std::sync::Arc;

/// One owned reference on a native object.
pub struct Reference {
    handle: NativeHandle,
    api: Arc<dyn NativeApi>,
}

impl Reference {
    /// Acquire a new reference on `handle`.
    ///
    /// # Safety
    /// `handle` must be a live, non-null native object.
    pub(crate) unsafe fn acquire(api: &Arc<dyn NativeApi>, handle: NativeHandle) -> Self {
        let returned = api.object_ref(handle);
        debug_assert_eq!(returned, handle, "object_ref returned a different object");
        tracing::trace!(handle = ?handle, "acquired native reference");
        Self {
            handle,
            api: Arc::clone(api),
        }
    }

    /// Take over a reference the caller already owns.
    ///
    /// # Safety
    /// The caller must own one reference on `handle` and give it up.
    pub(crate) unsafe fn adopt(api: &Arc<dyn NativeApi>, handle: NativeHandle) -> Self {
        tracing::trace!(handle = ?handle, "adopted native reference");
        Self {
            handle,
            api: Arc::clone(api),
        }
    }

    /// The object this reference keeps alive.
    pub fn handle(&self) -> NativeHandle {
        self.handle
    }
}

impl Drop for Reference {
    fn drop(&mut self) {
        if self.handle.is_null() {
            return;
        }
        // SAFETY: constructed by acquire/adopt, so exactly one reference is
        // owned here, and Reference is not Clone.
        unsafe { self.api.object_unref(self.handle) };
        tracing::trace!(handle = ?self.handle, "released native reference");
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference").field("handle", &self.handle).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimulatedNative;

    fn api(native: &SimulatedNative) -> Arc<dyn NativeApi> {
        Arc::new(native.clone())
    }

    #[test]
    fn test_acquire_then_drop_is_symmetric() {
        let native = SimulatedNative::new();
        let api = api(&native);
        let h = native.new_object();

        let reference = unsafe { Reference::acquire(&api, h) };
        assert_eq!(native.ref_count(h), Some(2));
        assert_eq!(reference.handle(), h);

        drop(reference);
        assert_eq!(native.ref_count(h), Some(1));
        assert_eq!(native.calls().unrefs, 1);
    }

    #[test]
    fn test_adopt_releases_owned_reference() {
        let native = SimulatedNative::new();
        let api = api(&native);
        let h = native.new_object();

        let reference = unsafe { Reference::adopt(&api, h) };
        assert_eq!(native.ref_count(h), Some(1));
        assert_eq!(native.calls().refs, 0);

        drop(reference);
        assert!(!native.is_alive(h));
        assert_eq!(native.calls().over_releases, 0);
    }

    #[test]
    fn test_null_reference_never_releases() {
        let native = SimulatedNative::new();
        let api = api(&native);

        drop(unsafe { Reference::adopt(&api, NativeHandle::NULL) });
        assert_eq!(native.calls().total(), 0);
    }
}
