//! Rendezvous with the root registry.
//!
//! The host platform exposes a well-known address every process can reach
//! without prior coordination. Two retrieval strategies exist: a direct
//! `call` (request/response) and, on platforms that lack it, a record
//! `query` whose extras carry the handle.
//!
//! Fallback policy: `query` is used only when the platform reports the
//! direct call as unsupported. A direct call that answers with a payload
//! lacking a usable handle means the provider is not serving a registry, so
//! the root registry is treated as unavailable.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::ipc::binder::HandleRef;
use crate::ipc::parcel::Bundle;

pub const DEFAULT_ADDRESS: &str = "svclink.CoreProvider";
pub const DEFAULT_METHOD: &str = "serviceprovide";
pub const DEFAULT_BUNDLE_KEY: &str = "service_manager";

/// Client side of the discovery channel.
pub trait DiscoveryChannel: Send + Sync {
    /// Whether the running platform offers the direct call primitive.
    fn supports_call(&self) -> bool;

    fn call(
        &self,
        address: &str,
        method: &str,
        arg: Option<&str>,
        extras: Option<Bundle>,
    ) -> Result<Option<Bundle>, TransportError>;

    fn query(&self, address: &str) -> Result<Option<Bundle>, TransportError>;
}

/// Provider side, hosted by the core process.
pub trait DiscoveryProvider: Send + Sync {
    fn call(&self, method: &str, arg: Option<&str>, extras: Option<&Bundle>) -> Option<Bundle>;

    fn query(&self) -> Option<Bundle>;
}

/// Where and how to ask for the root registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub address: String,
    pub method: String,
    pub bundle_key: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            method: DEFAULT_METHOD.to_string(),
            bundle_key: DEFAULT_BUNDLE_KEY.to_string(),
        }
    }
}

/// Retrieves the root registry handle, trying the direct call first.
///
/// `Ok(None)` means the provider is not available yet; the caller may retry
/// later from scratch.
pub fn fetch_root(
    channel: &dyn DiscoveryChannel,
    config: &DiscoveryConfig,
) -> Result<Option<HandleRef>, TransportError> {
    if channel.supports_call() {
        match channel.call(&config.address, &config.method, None, None) {
            Ok(Some(bundle)) => {
                let handle = bundle.handle(&config.bundle_key);
                if handle.is_none() {
                    warn!(
                        "discovery call on {} returned no {} entry",
                        config.address, config.bundle_key
                    );
                }
                return Ok(handle);
            }
            Ok(None) => {
                debug!("discovery call on {} returned nothing", config.address);
                return Ok(None);
            }
            Err(TransportError::Unsupported) => {
                debug!("discovery call unsupported, falling back to query");
            }
            Err(err) => return Err(err),
        }
    }

    Ok(channel
        .query(&config.address)?
        .and_then(|extras| extras.handle(&config.bundle_key)))
}
