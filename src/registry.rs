//! Root registry contract and its core-process implementation.
//!
//! The root registry is hosted by the core process and handed out through
//! the discovery channel. It resolves services implemented in the core
//! process and keeps the peer managers other processes installed, so it can
//! also forward requests for services implemented elsewhere.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::ipc::binder::{recipient, same_handle, DeathRecipient, HandleRef, Interface, Stub};
use crate::ipc::parcel::Parcel;
use crate::peer::{PeerManager, PeerManagerClient};
use crate::process::Route;
use crate::service::ServiceId;
use crate::service_list::ServiceList;

pub const DESCRIPTOR: &str = "svclink.ICoreServiceManager";

pub const GET_CORE_SERVICE: u32 = 1;
pub const INSTALL_OTHER_MANAGER: u32 = 2;
pub const GET_OTHER_MANAGER: u32 = 3;

/// Contract of the root registry.
pub trait CoreRegistry: Send + Sync {
    fn get_core_service(&self, id: &ServiceId) -> Result<Option<HandleRef>>;

    /// Registers `manager` as the peer manager of `process`. Last writer wins.
    fn install_other_manager(&self, process: &str, manager: HandleRef) -> Result<()>;

    /// The peer manager `process` installed, or `None` if it never did.
    fn get_other_manager(&self, process: &str) -> Result<Option<HandleRef>>;
}

/// Server-side dispatch for a `CoreRegistry`.
pub struct CoreRegistryStub<T: ?Sized> {
    inner: Arc<T>,
}

impl<T: CoreRegistry + ?Sized> CoreRegistryStub<T> {
    pub fn new(inner: Arc<T>) -> Self {
        Self { inner }
    }
}

impl<T: CoreRegistry + ?Sized> Stub for CoreRegistryStub<T> {
    fn descriptor(&self) -> &str {
        DESCRIPTOR
    }

    fn on_transact(&self, code: u32, data: &mut Parcel) -> Result<Parcel> {
        let mut reply = Parcel::new();
        match code {
            GET_CORE_SERVICE => {
                let id = data.read_service_id()?;
                reply.write_handle(self.inner.get_core_service(&id)?);
            }
            INSTALL_OTHER_MANAGER => {
                let process = data.read_str()?;
                let manager = data
                    .read_handle()?
                    .ok_or(Error::InvalidArgument("peer manager handle is required"))?;
                self.inner.install_other_manager(&process, manager)?;
            }
            GET_OTHER_MANAGER => {
                let process = data.read_str()?;
                reply.write_handle(self.inner.get_other_manager(&process)?);
            }
            _ => return Err(Error::UnknownTransaction(code)),
        }
        Ok(reply)
    }
}

/// Client side of the root registry.
#[derive(Clone)]
pub struct CoreRegistryClient {
    binder: HandleRef,
}

impl Interface for CoreRegistryClient {
    const DESCRIPTOR: &'static str = DESCRIPTOR;

    fn from_binder(binder: HandleRef) -> Self {
        Self { binder }
    }

    fn as_binder(&self) -> &HandleRef {
        &self.binder
    }
}

impl CoreRegistry for CoreRegistryClient {
    fn get_core_service(&self, id: &ServiceId) -> Result<Option<HandleRef>> {
        let mut data = Parcel::new();
        data.write_service_id(id);
        let mut reply = self.binder.transact(GET_CORE_SERVICE, data)?;
        reply.read_handle()
    }

    fn install_other_manager(&self, process: &str, manager: HandleRef) -> Result<()> {
        let mut data = Parcel::new();
        data.write_str(process);
        data.write_handle(Some(manager));
        self.binder.transact(INSTALL_OTHER_MANAGER, data)?;
        Ok(())
    }

    fn get_other_manager(&self, process: &str) -> Result<Option<HandleRef>> {
        let mut data = Parcel::new();
        data.write_str(process);
        let mut reply = self.binder.transact(GET_OTHER_MANAGER, data)?;
        reply.read_handle()
    }
}

/// The authoritative registry, living in the core process.
pub struct RootRegistry {
    services: Arc<ServiceList>,
    others: Mutex<HashMap<String, HandleRef>>,
    me: Weak<RootRegistry>,
}

impl RootRegistry {
    pub fn new(services: Arc<ServiceList>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            services,
            others: Mutex::new(HashMap::new()),
            me: me.clone(),
        })
    }

    /// Names of the processes with a registered peer manager.
    pub fn registered_processes(&self) -> Vec<String> {
        let mut names: Vec<_> = self.others.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl CoreRegistry for RootRegistry {
    fn get_core_service(&self, id: &ServiceId) -> Result<Option<HandleRef>> {
        debug!("[root] get_core_service {id}");
        if !self.services.identity().is_core() {
            debug!("[root] not running in the core process");
            return Ok(None);
        }
        let descriptor = self.services.get(id)?;
        match self.services.classify(descriptor) {
            Route::Local => self.services.local_instance(descriptor).map(Some),
            Route::Core => Ok(None),
            Route::Peer(process) => {
                let manager = match self.get_other_manager(&process)? {
                    Some(manager) => PeerManagerClient::from_binder(manager),
                    None => {
                        debug!("[root] no peer manager registered for {process}");
                        return Ok(None);
                    }
                };
                match manager.get_service(id) {
                    Ok(handle) => Ok(handle),
                    Err(err) => {
                        warn!("[root] peer {process} failed to resolve {id}: {err}");
                        Ok(None)
                    }
                }
            }
        }
    }

    fn install_other_manager(&self, process: &str, manager: HandleRef) -> Result<()> {
        if process.is_empty() {
            return Err(Error::InvalidArgument("process name cannot be empty"));
        }
        if let Some(existing) = self.others.lock().get(process) {
            if same_handle(existing, &manager) {
                return Ok(());
            }
        }
        let watcher = recipient(&self.me);
        manager.link_to_death(watcher.clone())?;
        let previous = self
            .others
            .lock()
            .insert(process.to_string(), Arc::clone(&manager));
        if let Some(previous) = previous {
            if !same_handle(&previous, &manager) {
                previous.unlink_to_death(&watcher);
            }
        }
        debug!("[root] installed peer manager for {process}");
        Ok(())
    }

    fn get_other_manager(&self, process: &str) -> Result<Option<HandleRef>> {
        Ok(self.others.lock().get(process).cloned())
    }
}

impl DeathRecipient for RootRegistry {
    fn binder_died(&self, who: &HandleRef) {
        self.others.lock().retain(|process, manager| {
            let dead = same_handle(manager, who);
            if dead {
                debug!("[root] peer manager of {process} died");
            }
            !dead
        });
    }
}
