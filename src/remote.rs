//! Liveness-aware wrapper around resolved handles.
//!
//! A `RemoteBinderProxy` presents one stable handle to callers while the
//! transport handle under it may die and be re-acquired:
//!
//! ```text
//! Unbound --resolve--> Bound --death--> Dead --next call--> Bound
//!                        (observer linked)  (cleared, evicted)
//! ```
//!
//! On death the proxy clears its handle and evicts its own cache entry, so
//! the next `get_service` resolves from scratch. Callers still holding the
//! proxy re-resolve transparently on their next call.

use std::any::Any;
use std::sync::{Arc, Weak};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::cache::{CacheEntry, CacheKey, HandleCache};
use crate::core_proxy::CoreServiceProxy;
use crate::error::TransportError;
use crate::ipc::binder::{recipient, same_handle, Binder, DeathRecipient, HandleRef, Stub};
use crate::ipc::parcel::Parcel;

pub(crate) struct RemoteBinderProxy {
    key: CacheKey,
    remote: Mutex<Option<HandleRef>>,
    core: Arc<CoreServiceProxy>,
    cache: Weak<HandleCache>,
    me: Weak<RemoteBinderProxy>,
}

/// Builds the cache entry for a freshly resolved handle. Same-process
/// objects are cached as they are; everything else gets a proxy.
///
/// Returns `None` when the handle died before a death observer could be
/// linked; such a handle is treated as unresolved.
pub(crate) fn create_entry(
    key: CacheKey,
    binder: HandleRef,
    core: &Arc<CoreServiceProxy>,
    cache: &Arc<HandleCache>,
) -> Option<CacheEntry> {
    if binder.local_stub().is_some() {
        debug!("[remote] {key} is a local object, no proxy needed");
        return Some(CacheEntry::Direct(binder));
    }
    RemoteBinderProxy::new(key, binder, core, cache).map(CacheEntry::Proxy)
}

impl RemoteBinderProxy {
    fn new(
        key: CacheKey,
        binder: HandleRef,
        core: &Arc<CoreServiceProxy>,
        cache: &Arc<HandleCache>,
    ) -> Option<Arc<Self>> {
        let proxy = Arc::new_cyclic(|me| Self {
            key,
            remote: Mutex::new(None),
            core: Arc::clone(core),
            cache: Arc::downgrade(cache),
            me: me.clone(),
        });
        if let Err(err) = binder.link_to_death(proxy.recipient()) {
            warn!("[remote] {} died before it was linked: {err}", proxy.key);
            return None;
        }
        *proxy.remote.lock() = Some(binder);
        Some(proxy)
    }

    fn recipient(&self) -> Weak<dyn DeathRecipient> {
        recipient(&self.me)
    }

    /// Whether a live handle is held. Never re-resolves.
    pub(crate) fn is_bound(&self) -> bool {
        self.remote
            .lock()
            .as_ref()
            .is_some_and(|remote| remote.is_alive())
    }

    /// Stops watching the held handle; used when the proxy leaves the cache
    /// without a death notification.
    pub(crate) fn release(&self) {
        if let Some(remote) = self.remote.lock().as_ref() {
            remote.unlink_to_death(&self.recipient());
        }
    }

    pub(crate) fn held(&self) -> Option<HandleRef> {
        let remote = self.remote.lock().clone()?;
        remote.is_alive().then_some(remote)
    }

    fn get_remote_binder(&self) -> Result<HandleRef, TransportError> {
        if let Some(remote) = self.held() {
            return Ok(remote);
        }
        let resolved = match &self.key {
            CacheKey::Service(id) => self.core.get_core_service(id),
            CacheKey::Process(name) => self.core.get_other_manager(name),
        };
        let remote = match resolved {
            Ok(Some(remote)) => remote,
            Ok(None) => return Err(TransportError::DeadObject),
            Err(err) => {
                debug!("[remote] re-resolving {} failed: {err}", self.key);
                return Err(TransportError::DeadObject);
            }
        };

        // Link under the slot lock so concurrent re-binders link only once.
        let mut slot = self.remote.lock();
        if let Some(current) = slot.as_ref().filter(|current| current.is_alive()) {
            return Ok(Arc::clone(current));
        }
        remote.link_to_death(self.recipient())?;
        debug!("[remote] re-bound {}", self.key);
        *slot = Some(Arc::clone(&remote));
        Ok(remote)
    }
}

impl DeathRecipient for RemoteBinderProxy {
    fn binder_died(&self, who: &HandleRef) {
        {
            let mut remote = self.remote.lock();
            if !remote.as_ref().is_some_and(|held| same_handle(held, who)) {
                return;
            }
            *remote = None;
        }
        debug!("[binder_died] {}", self.key);
        if let Some(cache) = self.cache.upgrade() {
            cache.evict(&self.key, self);
        }
    }
}

impl Binder for RemoteBinderProxy {
    fn descriptor(&self) -> Result<String, TransportError> {
        self.get_remote_binder()?.descriptor()
    }

    fn transact(&self, code: u32, data: Parcel) -> Result<Parcel, TransportError> {
        self.get_remote_binder()?.transact(code, data)
    }

    fn is_alive(&self) -> bool {
        self.get_remote_binder()
            .map(|remote| remote.is_alive())
            .unwrap_or(false)
    }

    fn ping(&self) -> bool {
        self.get_remote_binder()
            .map(|remote| remote.ping())
            .unwrap_or(false)
    }

    fn link_to_death(&self, recipient: Weak<dyn DeathRecipient>) -> Result<(), TransportError> {
        self.get_remote_binder()?.link_to_death(recipient)
    }

    fn unlink_to_death(&self, recipient: &Weak<dyn DeathRecipient>) -> bool {
        self.get_remote_binder()
            .map(|remote| remote.unlink_to_death(recipient))
            .unwrap_or(false)
    }

    fn local_stub(&self) -> Option<Arc<dyn Stub>> {
        None
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
