//! Top-level resolver.
//!
//! `ServiceManager` is one process's view of the service topology: its
//! descriptor table, its handle cache and its proxy to the root registry.
//! In the core process it also hosts the root registry and the discovery
//! provider.
//!
//! ```no_run
//! use std::sync::Arc;
//! use svclink::{Fabric, RuntimeConfig, ServiceManager};
//!
//! let fabric = Fabric::new();
//! let transport = fabric.spawn("com.example");
//! let manager = ServiceManager::builder(RuntimeConfig::for_process("com.example", "com.example"), transport)
//!     .build()?;
//! let handle = manager.get_service(0)?;
//! # Ok::<(), svclink::Error>(())
//! ```

use std::sync::Arc;

use log::{debug, error, warn};

use crate::cache::{CacheKey, HandleCache};
use crate::config::RuntimeConfig;
use crate::core_proxy::CoreServiceProxy;
use crate::error::{Error, Result};
use crate::ipc::binder::{HandleRef, Interface, Transport};
use crate::peer::{PeerManager, PeerManagerClient};
use crate::process::{ProcessIdentity, Route};
use crate::provider::CoreProvider;
use crate::registry::RootRegistry;
use crate::remote::create_entry;
use crate::service::{ServiceDescriptor, ServiceId};
use crate::service_list::ServiceList;

/// Collects descriptor installations before the table is frozen.
pub struct ServiceManagerBuilder {
    config: RuntimeConfig,
    transport: Arc<dyn Transport>,
    descriptors: Vec<ServiceDescriptor>,
}

impl ServiceManagerBuilder {
    pub fn install(mut self, descriptor: ServiceDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn install_all(mut self, descriptors: impl IntoIterator<Item = ServiceDescriptor>) -> Self {
        self.descriptors.extend(descriptors);
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Freezes the descriptor table. In the core process this also publishes
    /// the root registry on the discovery channel.
    pub fn build(self) -> Result<Arc<ServiceManager>> {
        self.config.validate()?;
        let identity = Arc::new(self.config.identity());

        let mut services = ServiceList::new(
            Arc::clone(&identity),
            Arc::clone(&self.transport),
            self.config.min_service_id,
            self.config.max_service_id,
        );
        for descriptor in self.descriptors {
            services.install(descriptor)?;
        }
        let services = Arc::new(services);

        let root = if identity.is_core() {
            let registry = RootRegistry::new(Arc::clone(&services));
            let provider = CoreProvider::new(
                self.config.discovery.clone(),
                Arc::clone(&registry),
                self.transport.as_ref(),
            );
            self.transport
                .serve_discovery(&self.config.discovery.address, Arc::new(provider))?;
            debug!("[build] {identity} serving root registry");
            Some(registry)
        } else {
            None
        };

        let core = CoreServiceProxy::new(
            Arc::clone(&identity),
            Arc::clone(&self.transport),
            Arc::clone(&services),
            self.config.discovery.clone(),
        );

        Ok(Arc::new(ServiceManager {
            identity,
            services,
            cache: Arc::new(HandleCache::new()),
            core,
            root,
        }))
    }
}

pub struct ServiceManager {
    identity: Arc<ProcessIdentity>,
    services: Arc<ServiceList>,
    cache: Arc<HandleCache>,
    core: Arc<CoreServiceProxy>,
    root: Option<Arc<RootRegistry>>,
}

impl ServiceManager {
    pub fn builder(config: RuntimeConfig, transport: Arc<dyn Transport>) -> ServiceManagerBuilder {
        ServiceManagerBuilder {
            config,
            transport,
            descriptors: Vec::new(),
        }
    }

    /// Resolves service `id` to a handle.
    ///
    /// # Errors
    ///
    /// Only wiring bugs are errors: `OutOfRange`, `InvalidArgument` and
    /// `NotInstalled`. A service that cannot be reached right now resolves
    /// to `Ok(None)`; the next call tries again from scratch.
    pub fn get_service(&self, id: impl Into<ServiceId>) -> Result<Option<HandleRef>> {
        let id = id.into();
        let descriptor = self.services.get(&id).map_err(|err| {
            error!("[get_service] {err}");
            err
        })?;

        let key = CacheKey::Service(id.clone());
        let resolved = match self.services.classify(descriptor) {
            Route::Local => {
                debug!("[get_service] {id} implemented here, returning directly");
                return self.services.local_instance(descriptor).map(Some);
            }
            Route::Core => {
                if let Some(handle) = self.cached(&key) {
                    return Ok(Some(handle));
                }
                debug!("[get_service] {id} resolving through root registry");
                self.core.get_core_service(&id)
            }
            Route::Peer(process) => {
                if let Some(handle) = self.cached(&key) {
                    return Ok(Some(handle));
                }
                debug!("[get_service] {id} resolving through peer {process}");
                match self.get_other_service_manager(&process) {
                    Some(manager) => manager.get_service(&id),
                    None => Ok(None),
                }
            }
        };

        let binder = match resolved {
            Ok(Some(binder)) => binder,
            Ok(None) => {
                warn!("[get_service] {id} unresolved");
                return Ok(None);
            }
            Err(err) => {
                warn!("[get_service] {id} failed: {err}");
                return Ok(None);
            }
        };

        let Some(entry) = create_entry(key.clone(), binder, &self.core, &self.cache) else {
            warn!("[get_service] {id} died while resolving");
            return Ok(None);
        };
        Ok(Some(self.cache.put(key, entry).handle()))
    }

    fn cached(&self, key: &CacheKey) -> Option<HandleRef> {
        let entry = self.cache.get(key)?;
        debug!("[get_service] {key} cache hit");
        Some(entry.handle())
    }

    /// Resolves service `id` and adapts it to the capability `I`.
    pub fn get<I: Interface>(&self, id: impl Into<ServiceId>) -> Result<Option<I>> {
        let id = id.into();
        let installed = self.services.get(&id)?.interface();
        if installed != I::DESCRIPTOR {
            let err = Error::InterfaceMismatch {
                id,
                installed,
                requested: I::DESCRIPTOR,
            };
            error!("[get] {err}");
            return Err(err);
        }
        Ok(self.get_service(id)?.map(I::from_binder))
    }

    /// Peer manager of `process`, or `None` if it never registered with the
    /// root registry or the registry is unreachable.
    pub fn get_other_service_manager(&self, process: &str) -> Option<PeerManagerClient> {
        let key = CacheKey::Process(process.to_string());
        if let Some(entry) = self.cache.get(&key) {
            debug!("[get_other_service_manager] {process} cache hit");
            return Some(PeerManagerClient::from_binder(entry.handle()));
        }

        let binder = match self.core.get_other_manager(process) {
            Ok(Some(binder)) => binder,
            Ok(None) => {
                warn!("[get_other_service_manager] {process} has no peer manager registered");
                return None;
            }
            Err(err) => {
                warn!("[get_other_service_manager] {process} failed: {err}");
                return None;
            }
        };
        let Some(entry) = create_entry(key.clone(), binder, &self.core, &self.cache) else {
            warn!("[get_other_service_manager] {process} died while resolving");
            return None;
        };
        Some(PeerManagerClient::from_binder(self.cache.put(key, entry).handle()))
    }

    pub fn identity(&self) -> &ProcessIdentity {
        &self.identity
    }

    pub fn services(&self) -> &ServiceList {
        &self.services
    }

    pub fn cache(&self) -> &HandleCache {
        &self.cache
    }

    pub fn core(&self) -> &Arc<CoreServiceProxy> {
        &self.core
    }

    /// The root registry, when this is the core process.
    pub fn root_registry(&self) -> Option<&Arc<RootRegistry>> {
        self.root.as_ref()
    }

    /// Drops every cached handle and the registry connection.
    pub fn shutdown(&self) {
        debug!("[shutdown] {}", self.identity);
        self.cache.clear();
        self.core.disconnect();
    }
}
