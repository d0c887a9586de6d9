//! Per-process proxy to the root registry.
//!
//! Holds at most one registry client, resolved through the discovery channel
//! on first use and dropped when the registry dies. The next caller after a
//! death resolves a fresh one; nothing reconnects eagerly.
//!
//! Resolution is serialized: at most one `refresh` runs at a time per
//! process. Other callers either wait for it or see its result.

use std::sync::{Arc, OnceLock, Weak};

use log::{debug, warn};
use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::ipc::binder::{recipient, same_handle, DeathRecipient, HandleRef, Interface, Transport};
use crate::ipc::discovery::{fetch_root, DiscoveryConfig};
use crate::peer::{LocalPeerManager, PeerManagerStub};
use crate::process::ProcessIdentity;
use crate::registry::{CoreRegistry, CoreRegistryClient};
use crate::service::ServiceId;
use crate::service_list::ServiceList;

pub struct CoreServiceProxy {
    identity: Arc<ProcessIdentity>,
    transport: Arc<dyn Transport>,
    services: Arc<ServiceList>,
    discovery: DiscoveryConfig,
    base: RwLock<Option<CoreRegistryClient>>,
    refresh_lock: Mutex<()>,
    peer_manager: OnceLock<HandleRef>,
    me: Weak<CoreServiceProxy>,
}

impl CoreServiceProxy {
    pub fn new(
        identity: Arc<ProcessIdentity>,
        transport: Arc<dyn Transport>,
        services: Arc<ServiceList>,
        discovery: DiscoveryConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            identity,
            transport,
            services,
            discovery,
            base: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            peer_manager: OnceLock::new(),
            me: me.clone(),
        })
    }

    /// Whether a live registry client is currently held.
    pub fn is_connected(&self) -> bool {
        self.current().is_some()
    }

    /// The registry client, resolving one if none is held.
    pub fn registry(&self) -> Result<CoreRegistryClient> {
        if let Some(base) = self.current() {
            return Ok(base);
        }
        let _guard = self.refresh_lock.lock();
        if let Some(base) = self.current() {
            return Ok(base);
        }
        self.refresh().ok_or(Error::DiscoveryUnavailable)
    }

    /// Raw handle of a service as returned by the root registry.
    pub fn get_core_service(&self, id: &ServiceId) -> Result<Option<HandleRef>> {
        self.registry()?.get_core_service(id)
    }

    pub fn install_other_manager(&self, process: &str, manager: HandleRef) -> Result<()> {
        self.registry()?.install_other_manager(process, manager)
    }

    pub fn get_other_manager(&self, process: &str) -> Result<Option<HandleRef>> {
        self.registry()?.get_other_manager(process)
    }

    /// This process's peer manager, created once and reused across reconnects.
    pub fn peer_manager(&self) -> HandleRef {
        self.peer_manager
            .get_or_init(|| {
                let manager = LocalPeerManager::new(Arc::clone(&self.services));
                self.transport.publish(Arc::new(PeerManagerStub::new(manager)))
            })
            .clone()
    }

    /// Drops the held client and stops watching it.
    pub fn disconnect(&self) {
        let base = self.base.write().take();
        if let Some(base) = base {
            base.as_binder().unlink_to_death(&recipient(&self.me));
        }
    }

    fn current(&self) -> Option<CoreRegistryClient> {
        let base = self.base.read().clone()?;
        if base.as_binder().is_alive() {
            return Some(base);
        }
        // Died before the notification arrived.
        let mut slot = self.base.write();
        if slot
            .as_ref()
            .is_some_and(|held| same_handle(held.as_binder(), base.as_binder()))
        {
            *slot = None;
        }
        None
    }

    /// Runs with `refresh_lock` held.
    fn refresh(&self) -> Option<CoreRegistryClient> {
        debug!("[refresh] {} resolving root registry", self.identity);
        let binder = match fetch_root(self.transport.discovery(), &self.discovery) {
            Ok(Some(binder)) => binder,
            Ok(None) => {
                debug!("[refresh] root registry not available");
                return None;
            }
            Err(err) => {
                warn!("[refresh] discovery failed: {err}");
                return None;
            }
        };

        if let Err(err) = binder.link_to_death(recipient(&self.me)) {
            warn!("[refresh] root registry died during resolution: {err}");
            return None;
        }
        let base = CoreRegistryClient::from_binder(binder);

        if !self.identity.is_core() {
            let process = self.identity.process_name();
            if let Err(err) = base.install_other_manager(process, self.peer_manager()) {
                warn!("[refresh] failed to install peer manager for {process}: {err}");
            }
        }

        *self.base.write() = Some(base.clone());
        Some(base)
    }
}

impl DeathRecipient for CoreServiceProxy {
    fn binder_died(&self, who: &HandleRef) {
        let mut base = self.base.write();
        if base
            .as_ref()
            .is_some_and(|held| same_handle(held.as_binder(), who))
        {
            debug!("[binder_died] root registry died, will resolve on next use");
            *base = None;
        }
    }
}
