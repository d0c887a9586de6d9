//! Peer manager: lets sibling processes resolve services implemented here.
//!
//! Each non-core process installs one peer manager into the root registry
//! under its own process name. The manager only reads the immutable
//! `ServiceList`; it never refers back to the root registry proxy.

use std::sync::Arc;

use log::debug;

use crate::error::{Error, Result};
use crate::ipc::binder::{HandleRef, Interface, Stub};
use crate::ipc::parcel::Parcel;
use crate::service::ServiceId;
use crate::service_list::ServiceList;

pub const DESCRIPTOR: &str = "svclink.IOtherServiceManager";

pub const GET_SERVICE: u32 = 1;

/// Contract of a process's peer manager.
pub trait PeerManager: Send + Sync {
    /// Handle of service `id`, implemented in the manager's process.
    fn get_service(&self, id: &ServiceId) -> Result<Option<HandleRef>>;
}

/// Peer manager backed by this process's descriptor table.
pub struct LocalPeerManager {
    services: Arc<ServiceList>,
}

impl LocalPeerManager {
    pub fn new(services: Arc<ServiceList>) -> Self {
        Self { services }
    }
}

impl PeerManager for LocalPeerManager {
    /// Remote callers are expected to know the topology, so an id that is
    /// not installed here is an invalid argument rather than "not found".
    fn get_service(&self, id: &ServiceId) -> Result<Option<HandleRef>> {
        if matches!(id, ServiceId::Name(name) if name.is_empty()) {
            return Err(Error::InvalidArgument("service id cannot be empty"));
        }
        let descriptor = match self.services.get(id) {
            Ok(descriptor) => descriptor,
            Err(Error::NotInstalled(_)) => {
                debug!("[peer] service {id} not installed");
                return Err(Error::InvalidArgument("service not installed in this process"));
            }
            Err(err) => return Err(err),
        };
        self.services.local_instance(descriptor).map(Some)
    }
}

/// Server-side dispatch for a `PeerManager`.
pub struct PeerManagerStub<T> {
    inner: T,
}

impl<T: PeerManager> PeerManagerStub<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T: PeerManager> Stub for PeerManagerStub<T> {
    fn descriptor(&self) -> &str {
        DESCRIPTOR
    }

    fn on_transact(&self, code: u32, data: &mut Parcel) -> Result<Parcel> {
        match code {
            GET_SERVICE => {
                let id = data.read_service_id()?;
                let mut reply = Parcel::new();
                reply.write_handle(self.inner.get_service(&id)?);
                Ok(reply)
            }
            _ => Err(Error::UnknownTransaction(code)),
        }
    }
}

/// Client side of a remote `PeerManager`.
#[derive(Clone)]
pub struct PeerManagerClient {
    binder: HandleRef,
}

impl Interface for PeerManagerClient {
    const DESCRIPTOR: &'static str = DESCRIPTOR;

    fn from_binder(binder: HandleRef) -> Self {
        Self { binder }
    }

    fn as_binder(&self) -> &HandleRef {
        &self.binder
    }
}

impl PeerManager for PeerManagerClient {
    fn get_service(&self, id: &ServiceId) -> Result<Option<HandleRef>> {
        let mut data = Parcel::new();
        data.write_service_id(id);
        let mut reply = self.binder.transact(GET_SERVICE, data)?;
        reply.read_handle()
    }
}
