//! Handle identity resolver
//!
//! [`Bridge`] turns native handles into [`Wrapper`]s. Generated entity code
//! calls a native function, gets back a handle, and resolves it here (or
//! through the marshaling helpers when the result is a collection).

use crate::error::Result;
use crate::handle::NativeHandle;
use crate::identity::{identities, intern_tag, release_attachment, AttachmentMarker, IdentityKey, TagId};
use crate::lifetime::Reference;
use crate::native::NativeApi;
use crate::object::{NativeObject, Wrapper};
use crate::options::{BridgeOptions, DEFAULT_ATTACHMENT_TAG_C};
use std::ffi::CString;
use std::fmt;
use std::sync::Arc;

/// How a resolved wrapper relates to the native reference count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ownership {
    /// Borrowed view; nothing is released on drop.
    Borrowed,
    /// Acquire a new reference, released on drop.
    Acquire,
    /// Take over a reference the caller owns, released on drop.
    Adopt,
}

/// Entry point for resolving and marshaling native handles.
///
/// Cheap to clone; clones share the native API.
#[derive(Clone)]
pub struct Bridge {
    api: Arc<dyn NativeApi>,
    tag: Arc<CString>,
    tag_id: TagId,
    options: BridgeOptions,
}

impl Bridge {
    /// Create a bridge with default options.
    pub fn new(api: impl NativeApi + 'static) -> Self {
        let options = BridgeOptions::default();
        let tag = DEFAULT_ATTACHMENT_TAG_C.to_owned();
        Self {
            api: Arc::new(api),
            tag_id: intern_tag(&tag),
            tag: Arc::new(tag),
            options,
        }
    }

    /// Create a bridge with validated options.
    pub fn with_options(api: impl NativeApi + 'static, options: BridgeOptions) -> Result<Self> {
        let tag = options.tag_cstring()?;
        Ok(Self {
            api: Arc::new(api),
            tag_id: intern_tag(&tag),
            tag: Arc::new(tag),
            options,
        })
    }

    /// The native entry points.
    pub fn api(&self) -> &Arc<dyn NativeApi> {
        &self.api
    }

    /// The options this bridge was created with.
    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Resolve `handle` to its wrapper.
    ///
    /// Returns `None` for the null handle without calling the native side.
    /// With `acquire`, the wrapper owns a new reference that it releases when
    /// dropped; the reference is taken before the handle's identity is
    /// published.
    ///
    /// # Safety
    /// `handle` must be null or a live native object of the type `T` wraps.
    pub unsafe fn resolve<T: NativeObject>(&self, handle: NativeHandle, acquire: bool) -> Option<Wrapper<T>> {
        let ownership = if acquire { Ownership::Acquire } else { Ownership::Borrowed };
        self.resolve_with(handle, ownership)
    }

    /// [`resolve`](Self::resolve) acquiring a reference.
    ///
    /// # Safety
    /// See [`resolve`](Self::resolve).
    pub unsafe fn resolve_owned<T: NativeObject>(&self, handle: NativeHandle) -> Option<Wrapper<T>> {
        self.resolve_with(handle, Ownership::Acquire)
    }

    /// [`resolve`](Self::resolve) without acquiring a reference. The
    /// wrapper is a view; the caller keeps the object alive.
    ///
    /// # Safety
    /// See [`resolve`](Self::resolve).
    pub unsafe fn resolve_borrowed<T: NativeObject>(&self, handle: NativeHandle) -> Option<Wrapper<T>> {
        self.resolve_with(handle, Ownership::Borrowed)
    }

    /// Resolve a handle whose reference the caller already owns, such as the
    /// result of a native `_new`/`_create` function. The wrapper releases it.
    ///
    /// # Safety
    /// `handle` must be null or a live native object on which the caller owns
    /// one reference, which passes to the wrapper.
    pub unsafe fn adopt<T: NativeObject>(&self, handle: NativeHandle) -> Option<Wrapper<T>> {
        self.resolve_with(handle, Ownership::Adopt)
    }

    /// Whether `handle` currently has a host identity.
    pub fn is_tracked(&self, handle: NativeHandle) -> bool {
        !handle.is_null() && identities().contains(self.key(handle))
    }

    fn key(&self, handle: NativeHandle) -> IdentityKey {
        IdentityKey {
            handle,
            tag: self.tag_id,
        }
    }

    unsafe fn resolve_with<T: NativeObject>(&self, handle: NativeHandle, ownership: Ownership) -> Option<Wrapper<T>> {
        if handle.is_null() {
            return None;
        }

        let reference = match ownership {
            Ownership::Borrowed => None,
            Ownership::Acquire => Some(Reference::acquire(&self.api, handle)),
            Ownership::Adopt => Some(Reference::adopt(&self.api, handle)),
        };

        let key = self.key(handle);
        let attachment = self.api.data_get(handle, &self.tag);
        let lookup = identities().lookup::<T>(key, attachment);
        if lookup.install {
            self.attach(key);
        }
        if lookup.built && !attachment.is_null() {
            tracing::debug!(handle = ?handle, ty = std::any::type_name::<T>(), "rebuilt wrapper state");
        }

        Some(Wrapper::new(lookup.object, reference))
    }

    /// Install this bridge's identity marker on the key's object. The marker
    /// is published only once the native side holds it.
    unsafe fn attach(&self, key: IdentityKey) {
        let handle = key.handle;
        let marker = AttachmentMarker::leak(key);
        let status = self.api.data_set(handle, &self.tag, marker, Some(release_attachment));
        if status < 0 {
            tracing::warn!(handle = ?handle, status, "failed to install identity attachment");
            identities().abandon(key);
            AttachmentMarker::reclaim(marker);
            return;
        }
        identities().publish(key, marker);
        if status > 0 {
            tracing::debug!(handle = ?handle, "replaced previous identity attachment");
        } else {
            tracing::trace!(handle = ?handle, "installed identity attachment");
        }
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge").field("options", &self.options).finish()
    }
}
