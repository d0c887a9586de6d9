//! Discovery provider hosted by the core process.

use std::sync::Arc;

use log::debug;

use crate::ipc::binder::{HandleRef, Transport};
use crate::ipc::discovery::{DiscoveryConfig, DiscoveryProvider};
use crate::ipc::parcel::Bundle;
use crate::registry::{CoreRegistryStub, RootRegistry};

/// Answers discovery requests with a bundle carrying the root registry handle.
pub struct CoreProvider {
    config: DiscoveryConfig,
    registry: Arc<RootRegistry>,
    handle: HandleRef,
}

impl CoreProvider {
    /// Publishes `registry` through `transport`; the provider hands out that
    /// one handle for its whole lifetime.
    pub fn new(config: DiscoveryConfig, registry: Arc<RootRegistry>, transport: &dyn Transport) -> Self {
        let handle = transport.publish(Arc::new(CoreRegistryStub::new(Arc::clone(&registry))));
        Self {
            config,
            registry,
            handle,
        }
    }

    pub fn registry(&self) -> &Arc<RootRegistry> {
        &self.registry
    }

    pub fn registry_handle(&self) -> &HandleRef {
        &self.handle
    }

    fn core_bundle(&self) -> Bundle {
        let mut bundle = Bundle::new();
        bundle.put_handle(&self.config.bundle_key, Arc::clone(&self.handle));
        bundle
    }
}

impl DiscoveryProvider for CoreProvider {
    fn call(&self, method: &str, _arg: Option<&str>, _extras: Option<&Bundle>) -> Option<Bundle> {
        if method != self.config.method {
            debug!("[provider] unknown method {method}");
            return None;
        }
        Some(self.core_bundle())
    }

    fn query(&self) -> Option<Bundle> {
        Some(self.core_bundle())
    }
}
