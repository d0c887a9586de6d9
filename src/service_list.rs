//! Per-process service descriptor table.
//!
//! Built once at process start and read-only afterwards, so lookups take no
//! lock.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::error::{Error, Result};
use crate::ipc::binder::{HandleRef, Transport};
use crate::process::{ProcessIdentity, Route};
use crate::service::{ServiceDescriptor, ServiceId};

pub struct ServiceList {
    identity: Arc<ProcessIdentity>,
    transport: Arc<dyn Transport>,
    min_id: i32,
    max_id: i32,
    services: HashMap<ServiceId, ServiceDescriptor>,
}

impl ServiceList {
    pub(crate) fn new(
        identity: Arc<ProcessIdentity>,
        transport: Arc<dyn Transport>,
        min_id: i32,
        max_id: i32,
    ) -> Self {
        Self {
            identity,
            transport,
            min_id,
            max_id,
            services: HashMap::new(),
        }
    }

    /// Installs `descriptor`. A second descriptor for an already installed id
    /// is ignored, so the first one's factory stays the only one.
    pub(crate) fn install(&mut self, descriptor: ServiceDescriptor) -> Result<()> {
        self.validate(descriptor.id())?;
        if self.services.contains_key(descriptor.id()) {
            debug!("[install] service {} already installed", descriptor.id());
            return Ok(());
        }
        self.services.insert(descriptor.id().clone(), descriptor);
        Ok(())
    }

    /// Rejects ids that can never be installed.
    pub fn validate(&self, id: &ServiceId) -> Result<()> {
        match id {
            ServiceId::Num(n) if *n < self.min_id || *n > self.max_id => Err(Error::OutOfRange {
                id: *n,
                min: self.min_id,
                max: self.max_id,
            }),
            ServiceId::Name(name) if name.is_empty() => {
                Err(Error::InvalidArgument("service name cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    pub fn get(&self, id: &ServiceId) -> Result<&ServiceDescriptor> {
        self.validate(id)?;
        self.services
            .get(id)
            .ok_or_else(|| Error::NotInstalled(id.clone()))
    }

    pub fn contains(&self, id: &ServiceId) -> bool {
        self.services.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ServiceId> {
        self.services.keys()
    }

    pub fn classify(&self, descriptor: &ServiceDescriptor) -> Route {
        self.identity.route(descriptor.placement())
    }

    pub fn identity(&self) -> &ProcessIdentity {
        &self.identity
    }

    /// The process-wide instance of a service implemented here, created on
    /// first use.
    pub fn local_instance(&self, descriptor: &ServiceDescriptor) -> Result<HandleRef> {
        if self.classify(descriptor) != Route::Local {
            return Err(Error::WrongProcess {
                id: descriptor.id().clone(),
                expected: self.identity.implementing_process(descriptor.placement()),
                actual: self.identity.process_name().to_string(),
            });
        }
        Ok(descriptor.instance(self.transport.as_ref()))
    }
}

#[cfg(all(test, feature = "fabric"))]
mod tests {
    use super::*;
    use crate::fabric::Fabric;
    use crate::ipc::binder::{Interface, Stub};
    use crate::ipc::parcel::Parcel;
    use crate::process::Placement;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Nop;

    impl Stub for Nop {
        fn descriptor(&self) -> &str {
            NopClient::DESCRIPTOR
        }

        fn on_transact(&self, _code: u32, _data: &mut Parcel) -> Result<Parcel> {
            Ok(Parcel::new())
        }
    }

    struct NopClient(HandleRef);

    impl Interface for NopClient {
        const DESCRIPTOR: &'static str = "test.Nop";

        fn from_binder(binder: HandleRef) -> Self {
            Self(binder)
        }

        fn as_binder(&self) -> &HandleRef {
            &self.0
        }
    }

    fn list(fabric: &Fabric, process: &str) -> ServiceList {
        let transport = fabric.spawn(process);
        let identity = Arc::new(ProcessIdentity::new("pkg", process, ":core"));
        ServiceList::new(identity, transport, 0, 15)
    }

    #[test]
    fn out_of_range_is_distinct_from_not_installed() {
        let fabric = Fabric::new();
        let services = list(&fabric, "pkg");
        assert!(matches!(
            services.get(&ServiceId::Num(16)),
            Err(Error::OutOfRange { id: 16, .. })
        ));
        assert!(matches!(
            services.get(&ServiceId::Num(-1)),
            Err(Error::OutOfRange { id: -1, .. })
        ));
        assert!(matches!(services.get(&ServiceId::Num(3)), Err(Error::NotInstalled(_))));
        assert!(matches!(
            services.get(&ServiceId::from("")),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn duplicate_install_keeps_one_factory() {
        let created = Arc::new(AtomicUsize::new(0));
        let fabric = Fabric::new();
        let mut services = list(&fabric, "pkg:core");
        for _ in 0..2 {
            let created = Arc::clone(&created);
            services
                .install(ServiceDescriptor::new::<NopClient, _, _>(1, Placement::Core, move || {
                    created.fetch_add(1, Ordering::SeqCst);
                    Nop
                }))
                .unwrap();
        }
        assert_eq!(services.len(), 1);

        let descriptor = services.get(&ServiceId::Num(1)).unwrap();
        let first = services.local_instance(descriptor).unwrap();
        let second = services.local_instance(descriptor).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn local_instance_only_in_implementing_process() {
        let fabric = Fabric::new();
        let mut services = list(&fabric, "pkg");
        services
            .install(ServiceDescriptor::new::<NopClient, _, _>(2, Placement::Core, || Nop))
            .unwrap();
        let descriptor = services.get(&ServiceId::Num(2)).unwrap();
        assert_eq!(services.classify(descriptor), Route::Core);
        assert!(matches!(
            services.local_instance(descriptor),
            Err(Error::WrongProcess { .. })
        ));
        assert!(!descriptor.is_instantiated());
    }

    #[test]
    fn install_rejects_invalid_ids() {
        let fabric = Fabric::new();
        let mut services = list(&fabric, "pkg");
        let err = services
            .install(ServiceDescriptor::new::<NopClient, _, _>(99, Placement::Core, || Nop))
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }
}
