//! Handle identity table
//!
//! Maps each tracked native handle to weak references on the live wrapper
//! state, one slot per wrapper type. The native object carries an attachment
//! (an [`AttachmentMarker`]) whose destructor evicts the handle's entry when
//! the native object dies, so a recycled address never sees stale state.
//!
//! The table is process-wide because the attachment destructor is a plain C
//! function pointer with no context argument. It is sharded, so resolutions
//! of different handles rarely contend. Entries are keyed by handle and
//! attachment tag: bridges configured with different tags keep separate
//! identities for the same object.

use crate::handle::NativeHandle;
use crate::object::NativeObject;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::ffi::{c_void, CStr, CString};
use std::sync::{Arc, Weak};

static IDENTITIES: Lazy<IdentityTable> = Lazy::new(IdentityTable::new);
static TAGS: Lazy<Mutex<Vec<CString>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// The process-wide identity table.
pub(crate) fn identities() -> &'static IdentityTable {
    &IDENTITIES
}

/// Interned attachment tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TagId(pub(crate) usize);

/// Intern `tag`; equal tags get equal ids for the life of the process.
pub(crate) fn intern_tag(tag: &CStr) -> TagId {
    let mut tags = TAGS.lock();
    if let Some(index) = tags.iter().position(|known| known.as_c_str() == tag) {
        return TagId(index);
    }
    tags.push(tag.to_owned());
    TagId(tags.len() - 1)
}

/// One native object as seen through one attachment tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct IdentityKey {
    pub(crate) handle: NativeHandle,
    pub(crate) tag: TagId,
}

type ErasedWeak = Weak<dyn Any + Send + Sync>;

/// Marker value used while the resolver that created an entry has not yet
/// installed its attachment.
const PENDING: usize = 0;

/// Attachment payload stored on the native object.
pub(crate) struct AttachmentMarker {
    key: IdentityKey,
}

impl AttachmentMarker {
    /// Leak a marker for `key`; ownership passes to the native side.
    pub(crate) fn leak(key: IdentityKey) -> *mut c_void {
        Box::into_raw(Box::new(Self { key })).cast()
    }

    /// Reclaim a marker that the native side refused.
    ///
    /// # Safety
    /// `data` must come from [`leak`](Self::leak) and not be owned by the
    /// native side.
    pub(crate) unsafe fn reclaim(data: *mut c_void) {
        drop(Box::from_raw(data.cast::<Self>()));
    }
}

/// Attachment destructor handed to the native side.
pub(crate) unsafe extern "C" fn release_attachment(data: *mut c_void) {
    if data.is_null() {
        return;
    }
    let marker = Box::from_raw(data.cast::<AttachmentMarker>());
    identities().evict(marker.key, data as usize);
    tracing::trace!(handle = ?marker.key.handle, "identity attachment destroyed");
}

struct IdentityEntry {
    /// Address of the installed marker, or `PENDING`.
    marker: usize,
    objects: Vec<(TypeId, ErasedWeak)>,
}

impl IdentityEntry {
    fn pending() -> Self {
        Self {
            marker: PENDING,
            objects: Vec::new(),
        }
    }

    fn weak_for(&self, type_id: TypeId) -> Option<ErasedWeak> {
        self.objects
            .iter()
            .find(|(id, _)| *id == type_id)
            .map(|(_, weak)| weak.clone())
    }
}

/// Outcome of a table lookup.
pub(crate) struct Lookup<T> {
    /// Shared wrapper state for the handle.
    pub object: Arc<T>,
    /// Whether the caller must install a fresh attachment.
    pub install: bool,
    /// Whether `object` was built by this lookup.
    pub built: bool,
}

/// Weak-reference table keyed by native handle and tag.
pub(crate) struct IdentityTable {
    entries: DashMap<IdentityKey, IdentityEntry>,
}

impl IdentityTable {
    fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Resolve `key` to its shared `T` state.
    ///
    /// `attachment` is what the native side currently stores under the key's
    /// tag. When it is not this table's marker for the key, the entry is
    /// claimed and the caller is told to install a new one.
    pub(crate) fn lookup<T: NativeObject>(&self, key: IdentityKey, attachment: *mut c_void) -> Lookup<T> {
        let install = self.claim(key, attachment);
        if let Some(object) = self.live::<T>(key) {
            return Lookup {
                object,
                install,
                built: false,
            };
        }

        // Built outside the shard lock: from_native may resolve other handles.
        let built = Arc::new(T::from_native(key.handle));
        let object = self.record(key, built);
        Lookup {
            object,
            install,
            built: true,
        }
    }

    /// Decide whether the caller owns attachment installation for `key`.
    ///
    /// A null `attachment` may be a read that raced the installer, so only a
    /// non-null value that is not our marker invalidates the entry.
    fn claim(&self, key: IdentityKey, attachment: *mut c_void) -> bool {
        match self.entries.entry(key) {
            Entry::Vacant(vacant) => {
                vacant.insert(IdentityEntry::pending());
                true
            }
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let replaced = !attachment.is_null() && entry.marker != PENDING && entry.marker != attachment as usize;
                if replaced {
                    // Our marker was overwritten under our tag. Start over for
                    // this address.
                    entry.marker = PENDING;
                    entry.objects.clear();
                }
                replaced
            }
        }
    }

    fn live<T: NativeObject>(&self, key: IdentityKey) -> Option<Arc<T>> {
        let weak = self.entries.get(&key)?.weak_for(TypeId::of::<T>())?;
        weak.upgrade()?.downcast::<T>().ok()
    }

    /// Record `built` unless another resolver recorded a live `T` first.
    ///
    /// Only an existing entry is updated. If the entry went away while
    /// `built` was being constructed (the installer abandoned it, or the
    /// native object died), `built` is returned uncached.
    fn record<T: NativeObject>(&self, key: IdentityKey, built: Arc<T>) -> Arc<T> {
        let type_id = TypeId::of::<T>();
        let erased: Arc<dyn Any + Send + Sync> = built.clone();
        let winner = {
            let Some(mut entry) = self.entries.get_mut(&key) else {
                tracing::trace!(handle = ?key.handle, "identity entry gone, state not cached");
                return built;
            };
            entry.objects.retain(|(_, weak)| weak.strong_count() > 0);
            let existing = entry.weak_for(type_id).and_then(|weak| weak.upgrade());
            if existing.is_none() {
                entry.objects.retain(|(id, _)| *id != type_id);
                entry.objects.push((type_id, Arc::downgrade(&erased)));
            }
            existing
        };
        winner
            .and_then(|object| object.downcast::<T>().ok())
            .unwrap_or(built)
    }

    /// Mark the attachment at `marker` as installed for `key`.
    pub(crate) fn publish(&self, key: IdentityKey, marker: *mut c_void) {
        if let Some(mut entry) = self.entries.get_mut(&key) {
            entry.marker = marker as usize;
        }
    }

    /// Drop the entry for `key` if its marker is still `marker`.
    pub(crate) fn evict(&self, key: IdentityKey, marker: usize) {
        self.entries.remove_if(&key, |_, entry| entry.marker == marker);
    }

    /// Drop the entry for `key` if no attachment was ever published for it.
    pub(crate) fn abandon(&self, key: IdentityKey) {
        self.evict(key, PENDING);
    }

    /// Whether `key` has an entry.
    pub(crate) fn contains(&self, key: IdentityKey) -> bool {
        self.entries.contains_key(&key)
    }
}
