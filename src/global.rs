//! Process-wide service manager.
//!
//! Application code registers its descriptors once at startup with [`init`]
//! and resolves through [`get_service`] from anywhere afterwards. The manager
//! is built on first use, so `init` can run before the transport is ready to
//! serve.
//!
//! Tests and multi-process simulations should hold explicit
//! [`ServiceManager`] values instead; there is one slot per OS process.

use std::sync::Arc;

use log::debug;
use parking_lot::{const_rwlock, RwLock};

use crate::error::{Error, Result};
use crate::ipc::binder::{HandleRef, Interface};
use crate::manager::{ServiceManager, ServiceManagerBuilder};
use crate::service::ServiceId;

enum Slot {
    Empty,
    Pending(ServiceManagerBuilder),
    Ready(Arc<ServiceManager>),
}

static RUNTIME: RwLock<Slot> = const_rwlock(Slot::Empty);

/// Registers the process-wide manager. Fails if one is already registered.
pub fn init(builder: ServiceManagerBuilder) -> Result<()> {
    let mut slot = RUNTIME.write();
    if !matches!(*slot, Slot::Empty) {
        return Err(Error::AlreadyInitialized);
    }
    *slot = Slot::Pending(builder);
    Ok(())
}

pub fn is_initialized() -> bool {
    !matches!(*RUNTIME.read(), Slot::Empty)
}

/// The process-wide manager, built on first call.
///
/// A build failure empties the slot; the caller has to `init` again.
pub fn manager() -> Result<Arc<ServiceManager>> {
    if let Slot::Ready(manager) = &*RUNTIME.read() {
        return Ok(Arc::clone(manager));
    }
    let mut slot = RUNTIME.write();
    match std::mem::replace(&mut *slot, Slot::Empty) {
        Slot::Empty => Err(Error::NotInitialized),
        Slot::Ready(manager) => {
            *slot = Slot::Ready(Arc::clone(&manager));
            Ok(manager)
        }
        Slot::Pending(builder) => {
            let manager = builder.build()?;
            debug!("[global] built service manager for {}", manager.identity());
            *slot = Slot::Ready(Arc::clone(&manager));
            Ok(manager)
        }
    }
}

pub fn get_service(id: impl Into<ServiceId>) -> Result<Option<HandleRef>> {
    manager()?.get_service(id)
}

pub fn get<I: Interface>(id: impl Into<ServiceId>) -> Result<Option<I>> {
    manager()?.get(id)
}

/// Drops the process-wide manager, returning it if it had been built.
pub fn teardown() -> Option<Arc<ServiceManager>> {
    let previous = std::mem::replace(&mut *RUNTIME.write(), Slot::Empty);
    match previous {
        Slot::Ready(manager) => {
            manager.shutdown();
            Some(manager)
        }
        Slot::Pending(_) | Slot::Empty => None,
    }
}
