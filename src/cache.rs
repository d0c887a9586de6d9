//! Process-wide cache of resolved handles.
//!
//! The cache is the only owner of long-lived resolved handles. An entry is
//! created on the first successful resolution and removed when its endpoint
//! is observed dead; it is never refreshed in place.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::ipc::binder::HandleRef;
use crate::remote::RemoteBinderProxy;
use crate::service::ServiceId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Service(ServiceId),
    /// Peer manager of the named process.
    Process(String),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Service(id) => write!(f, "service {id}"),
            CacheKey::Process(name) => write!(f, "process {name}"),
        }
    }
}

#[derive(Clone)]
pub(crate) enum CacheEntry {
    /// Same-process object; never dies from this process's point of view.
    Direct(HandleRef),
    Proxy(Arc<RemoteBinderProxy>),
}

impl CacheEntry {
    pub(crate) fn handle(&self) -> HandleRef {
        match self {
            CacheEntry::Direct(handle) => Arc::clone(handle),
            CacheEntry::Proxy(proxy) => Arc::clone(proxy) as HandleRef,
        }
    }

    fn is_live(&self) -> bool {
        match self {
            CacheEntry::Direct(handle) => handle.is_alive(),
            CacheEntry::Proxy(proxy) => proxy.is_bound(),
        }
    }

    fn is_proxy(&self, other: &RemoteBinderProxy) -> bool {
        match self {
            CacheEntry::Proxy(proxy) => std::ptr::eq(Arc::as_ptr(proxy), other),
            CacheEntry::Direct(_) => false,
        }
    }

    fn release(&self) {
        if let CacheEntry::Proxy(proxy) = self {
            proxy.release();
        }
    }
}

#[derive(Default)]
pub struct HandleCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl HandleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live entry for `key`. An entry whose endpoint already died is dropped
    /// here, even if its death notification has not been delivered yet.
    pub(crate) fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let mut entries = self.entries.lock();
        let entry = entries.get(key)?;
        if entry.is_live() {
            return Some(entry.clone());
        }
        debug!("[cache] dropping dead entry for {key}");
        let dead = entries.remove(key);
        drop(entries);
        if let Some(dead) = dead {
            dead.release();
        }
        None
    }

    /// Inserts `entry` unless a live entry already exists, and returns the
    /// entry that ends up cached. A losing entry is released.
    pub(crate) fn put(&self, key: CacheKey, entry: CacheEntry) -> CacheEntry {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&key) {
            if existing.is_live() {
                let existing = existing.clone();
                drop(entries);
                entry.release();
                return existing;
            }
        }
        let replaced = entries.insert(key, entry.clone());
        drop(entries);
        if let Some(dead) = replaced {
            dead.release();
        }
        entry
    }

    /// Removes the entry for `key` only if it is `proxy`. Called from death
    /// notifications, which may arrive after a newer entry replaced it.
    pub(crate) fn evict(&self, key: &CacheKey, proxy: &RemoteBinderProxy) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_proxy(proxy) => {
                entries.remove(key);
                debug!("[cache] evicted {key}");
                true
            }
            _ => false,
        }
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        let removed = self.entries.lock().remove(key);
        match removed {
            Some(entry) => {
                entry.release();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// The cached handle for `key`, without liveness filtering.
    pub fn peek(&self, key: &CacheKey) -> Option<HandleRef> {
        self.entries.lock().get(key).map(CacheEntry::handle)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        let drained: Vec<_> = self.entries.lock().drain().map(|(_, e)| e).collect();
        for entry in drained {
            entry.release();
        }
    }
}
