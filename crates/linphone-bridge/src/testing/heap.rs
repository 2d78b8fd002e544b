//! Simulated native heap

use crate::handle::NativeHandle;
use crate::native::DataDestroy;
use std::collections::{HashMap, HashSet};
use std::ffi::{c_char, c_void, CStr, CString};

/// Entry point call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NativeCalls {
    /// `object_ref` calls
    pub refs: usize,
    /// `object_unref` calls
    pub unrefs: usize,
    /// `data_get` calls
    pub data_gets: usize,
    /// `data_set` calls
    pub data_sets: usize,
    /// `list_next` calls
    pub list_nexts: usize,
    /// `list_get_data` calls
    pub list_get_datas: usize,
    /// `list_append` and `list_append_string` calls
    pub appends: usize,
    /// Attachment destructors run (on replace or on free)
    pub attachment_destructors: usize,
    /// Reference count operations on objects that were not alive
    pub over_releases: usize,
}

impl NativeCalls {
    /// Total entry point calls.
    pub fn total(&self) -> usize {
        self.refs + self.unrefs + self.data_gets + self.data_sets + self.list_nexts + self.list_get_datas + self.appends
    }
}

pub(crate) struct Attachment {
    pub(crate) tag: CString,
    pub(crate) data: usize,
    pub(crate) destroy: DataDestroy,
}

pub(crate) struct SimObject {
    storage: Box<u64>,
    pub(crate) refs: u32,
    pub(crate) attachments: Vec<Attachment>,
}

/// Same layout as `bctbx_list_t`.
#[repr(C)]
pub(crate) struct ListNode {
    pub(crate) next: *mut ListNode,
    #[allow(dead_code)]
    pub(crate) prev: *mut ListNode,
    pub(crate) data: *mut c_void,
}

/// Work to do once the heap lock is released.
#[derive(Default)]
pub(crate) struct Released {
    attachments: Vec<Attachment>,
    storage: Option<Box<u64>>,
}

impl Released {
    pub(crate) fn attachments(attachments: Vec<Attachment>) -> Self {
        Self {
            attachments,
            storage: None,
        }
    }

    /// Run attachment destructors, then free the object's storage.
    pub(crate) fn run(self) {
        for attachment in self.attachments {
            if let Some(destroy) = attachment.destroy {
                // SAFETY: the destructor was registered for this data.
                unsafe { destroy(attachment.data as *mut c_void) };
            }
        }
        drop(self.storage);
    }
}

#[derive(Default)]
pub(crate) struct Heap {
    pub(crate) objects: HashMap<usize, SimObject>,
    nodes: HashSet<usize>,
    strings: HashSet<usize>,
    arrays: Vec<Box<[usize]>>,
    pub(crate) calls: NativeCalls,
    pub(crate) log: Vec<&'static str>,
    pub(crate) reject_attachments: bool,
}

/// Entries kept in the call log; counters keep counting past it.
pub(crate) const LOG_CAPACITY: usize = 4096;

impl Heap {
    pub(crate) fn record(&mut self, name: &'static str, bump: impl FnOnce(&mut NativeCalls)) {
        if self.log.len() < LOG_CAPACITY {
            self.log.push(name);
        }
        bump(&mut self.calls);
    }

    pub(crate) fn allocate(&mut self) -> NativeHandle {
        let storage = Box::new(0u64);
        let addr = &*storage as *const u64 as usize;
        self.objects.insert(
            addr,
            SimObject {
                storage,
                refs: 1,
                attachments: Vec::new(),
            },
        );
        NativeHandle::from_raw(addr as *mut c_void)
    }

    pub(crate) fn acquire(&mut self, addr: usize) {
        match self.objects.get_mut(&addr) {
            Some(object) => object.refs += 1,
            None => self.calls.over_releases += 1,
        }
    }

    /// Drop one reference; at zero, detach the object for destruction.
    pub(crate) fn unref(&mut self, addr: usize) -> Released {
        let Some(object) = self.objects.get_mut(&addr) else {
            self.calls.over_releases += 1;
            return Released::default();
        };
        object.refs -= 1;
        if object.refs > 0 {
            return Released::default();
        }
        let Some(object) = self.objects.remove(&addr) else {
            return Released::default();
        };
        self.calls.attachment_destructors += object.attachments.iter().filter(|a| a.destroy.is_some()).count();
        Released {
            attachments: object.attachments,
            storage: Some(object.storage),
        }
    }

    pub(crate) fn attachment(&self, addr: usize, tag: &CStr) -> *mut c_void {
        self.objects
            .get(&addr)
            .and_then(|object| object.attachments.iter().find(|a| a.tag.as_c_str() == tag))
            .map_or(std::ptr::null_mut(), |a| a.data as *mut c_void)
    }

    /// Store an attachment. `Err` if the object is unknown; `Ok(Some(_))`
    /// carries the replaced attachment.
    pub(crate) fn set_attachment(
        &mut self,
        addr: usize,
        tag: &CStr,
        data: usize,
        destroy: DataDestroy,
    ) -> Result<Option<Attachment>, ()> {
        let object = self.objects.get_mut(&addr).ok_or(())?;
        let fresh = Attachment {
            tag: tag.to_owned(),
            data,
            destroy,
        };
        let previous = match object.attachments.iter_mut().find(|a| a.tag.as_c_str() == tag) {
            Some(slot) => Some(std::mem::replace(slot, fresh)),
            None => {
                object.attachments.push(fresh);
                None
            }
        };
        if previous.as_ref().is_some_and(|a| a.destroy.is_some()) {
            self.calls.attachment_destructors += 1;
        }
        Ok(previous)
    }

    /// Append a node carrying `data` and return the list head.
    pub(crate) fn append(&mut self, head: NativeHandle, data: *mut c_void) -> NativeHandle {
        let node = Box::into_raw(Box::new(ListNode {
            next: std::ptr::null_mut(),
            prev: std::ptr::null_mut(),
            data,
        }));
        self.nodes.insert(node as usize);
        if head.is_null() {
            return NativeHandle::from(node);
        }
        // SAFETY: every node reachable from a head came from this heap.
        unsafe {
            let mut tail = head.as_raw() as *mut ListNode;
            while !(*tail).next.is_null() {
                tail = (*tail).next;
            }
            (*tail).next = node;
            (*node).prev = tail;
        }
        head
    }

    /// Payloads of every node, in order.
    pub(crate) fn walk(&self, head: NativeHandle) -> Vec<NativeHandle> {
        let mut payloads = Vec::new();
        let mut node = head.as_raw() as *const ListNode;
        while !node.is_null() && self.nodes.contains(&(node as usize)) {
            // SAFETY: checked to be a live node of this heap.
            unsafe {
                payloads.push(NativeHandle::from((*node).data));
                node = (*node).next;
            }
        }
        payloads
    }

    pub(crate) fn free_list(&mut self, head: NativeHandle) {
        let mut node = head.as_raw() as *mut ListNode;
        while !node.is_null() && self.nodes.remove(&(node as usize)) {
            // SAFETY: removed from the live set, so freed exactly once.
            let owned = unsafe { Box::from_raw(node) };
            node = owned.next;
        }
    }

    /// Free the nodes of a list and the string copies it carries.
    pub(crate) fn free_string_list(&mut self, head: NativeHandle) {
        for payload in self.walk(head) {
            if self.strings.remove(&payload.addr()) {
                // SAFETY: produced by CString::into_raw and no longer tracked.
                drop(unsafe { CString::from_raw(payload.as_raw().cast()) });
            }
        }
        self.free_list(head);
    }

    /// Heap copy of `bytes` (truncated at the first NUL).
    pub(crate) fn copy_string(&mut self, bytes: &[u8]) -> *mut c_char {
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        let copy = CString::new(&bytes[..end]).unwrap_or_default().into_raw();
        self.strings.insert(copy as usize);
        copy
    }

    pub(crate) fn string_array(&mut self, values: &[&str]) -> NativeHandle {
        let mut slots: Vec<usize> = values
            .iter()
            .map(|value| self.copy_string(value.as_bytes()) as usize)
            .collect();
        slots.push(0);
        let array = slots.into_boxed_slice();
        let start = array.as_ptr();
        self.arrays.push(array);
        NativeHandle::from(start)
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        for node in self.nodes.drain() {
            // SAFETY: live nodes are owned by the heap.
            drop(unsafe { Box::from_raw(node as *mut ListNode) });
        }
        for string in self.strings.drain() {
            // SAFETY: produced by CString::into_raw.
            drop(unsafe { CString::from_raw(string as *mut c_char) });
        }
        self.arrays.clear();
        for (_, object) in self.objects.drain() {
            Released {
                attachments: object.attachments,
                storage: Some(object.storage),
            }
            .run();
        }
    }
}
