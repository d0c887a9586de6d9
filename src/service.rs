//! Installable service descriptors.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::ipc::binder::{HandleRef, Interface, Stub, Transport};
use crate::process::Placement;

/// Identifier of an installable service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceId {
    /// Numeric id, checked against the configured valid range.
    Num(i32),
    /// Named id; must not be empty.
    Name(String),
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceId::Num(n) => write!(f, "{n}"),
            ServiceId::Name(name) => write!(f, "{name:?}"),
        }
    }
}

impl From<i32> for ServiceId {
    fn from(value: i32) -> Self {
        ServiceId::Num(value)
    }
}

impl From<&str> for ServiceId {
    fn from(value: &str) -> Self {
        ServiceId::Name(value.to_string())
    }
}

impl From<String> for ServiceId {
    fn from(value: String) -> Self {
        ServiceId::Name(value)
    }
}

impl From<&ServiceId> for ServiceId {
    fn from(value: &ServiceId) -> Self {
        value.clone()
    }
}

type Factory = dyn Fn() -> Arc<dyn Stub> + Send + Sync;

/// Describes where a service is implemented and how to build its one local
/// instance.
///
/// The same descriptor must be installed in every process before that
/// process asks for the service.
pub struct ServiceDescriptor {
    id: ServiceId,
    placement: Placement,
    interface: &'static str,
    factory: Box<Factory>,
    instance: OnceLock<HandleRef>,
}

impl ServiceDescriptor {
    /// Descriptor for a service exposing interface `I`.
    ///
    /// `factory` runs at most once per process, the first time the local
    /// instance is needed in the implementing process.
    pub fn new<I, F, S>(id: impl Into<ServiceId>, placement: Placement, factory: F) -> Self
    where
        I: Interface,
        F: Fn() -> S + Send + Sync + 'static,
        S: Stub + 'static,
    {
        Self {
            id: id.into(),
            placement,
            interface: I::DESCRIPTOR,
            factory: Box::new(move || Arc::new(factory()) as Arc<dyn Stub>),
            instance: OnceLock::new(),
        }
    }

    pub fn id(&self) -> &ServiceId {
        &self.id
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    pub fn interface(&self) -> &'static str {
        self.interface
    }

    /// Whether the local instance has been created in this process.
    pub fn is_instantiated(&self) -> bool {
        self.instance.get().is_some()
    }

    pub(crate) fn instance(&self, transport: &dyn Transport) -> HandleRef {
        self.instance
            .get_or_init(|| transport.publish((self.factory)()))
            .clone()
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("id", &self.id)
            .field("placement", &self.placement)
            .field("interface", &self.interface)
            .field("instantiated", &self.is_instantiated())
            .finish()
    }
}
