//! Cross-process service location.
//!
//! Every process of an application installs the same table of service
//! descriptors. Asking for a service returns a handle: the local instance
//! when this process implements it, otherwise a cached proxy resolved
//! through the root registry hosted by the core process, or through the
//! peer manager of the sibling process that implements it.
//!
//! Handles to remote services survive the death of their process: the
//! proxy re-resolves on the next call and the cache drops the stale entry.

pub mod cache;
pub mod config;
pub mod core_proxy;
pub mod error;
#[cfg(feature = "fabric")]
pub mod fabric;
pub mod global;
pub mod ipc;
pub mod manager;
pub mod peer;
pub mod process;
pub mod provider;
pub mod registry;
mod remote;
pub mod service;
pub mod service_list;

pub use cache::{CacheKey, HandleCache};
pub use config::RuntimeConfig;
pub use core_proxy::CoreServiceProxy;
pub use error::{Error, Result, TransportError};
#[cfg(feature = "fabric")]
pub use fabric::{Fabric, FabricProcess};
pub use ipc::{Binder, Bundle, DeathRecipient, HandleRef, Interface, Parcel, Stub, Transport};
pub use manager::{ServiceManager, ServiceManagerBuilder};
pub use peer::{PeerManager, PeerManagerClient};
pub use process::{Placement, ProcessIdentity, Route};
pub use registry::{CoreRegistry, CoreRegistryClient, RootRegistry};
pub use service::{ServiceDescriptor, ServiceId};
pub use service_list::ServiceList;
