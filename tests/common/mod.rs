#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use svclink::{
    Error, Fabric, HandleRef, Interface, Parcel, Placement, RuntimeConfig, ServiceDescriptor,
    ServiceManager, Stub,
};

pub const PACKAGE: &str = "com.example";
pub const CORE: &str = "com.example:core";
pub const MAIN: &str = "com.example";
pub const PEER_C: &str = "com.example:c";
pub const PEER_D: &str = "com.example:d";

/// Implemented in the core process.
pub const CORE_GREETER: i32 = 0;
/// Implemented in the main process.
pub const MAIN_GREETER: i32 = 1;
/// Implemented in `:c`.
pub const C_GREETER: i32 = 2;
/// Implemented in `:d`.
pub const D_GREETER: i32 = 3;
/// Named service implemented in the core process.
pub const NAMED_GREETER: &str = "greeter.named";
/// Named service implemented in `:d`.
pub const NAMED_D_GREETER: &str = "greeter.d";

pub const GREET: u32 = 1;
pub const EXPLODE: u32 = 2;
pub const INSTANCE: u32 = 3;
pub const REJECT: u32 = 4;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

pub struct Greeter {
    process: String,
    instance: u64,
}

impl Greeter {
    pub fn new(process: &str) -> Self {
        Self {
            process: process.to_string(),
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::SeqCst),
        }
    }
}

impl Stub for Greeter {
    fn descriptor(&self) -> &str {
        GreeterClient::DESCRIPTOR
    }

    fn on_transact(&self, code: u32, data: &mut Parcel) -> svclink::Result<Parcel> {
        let mut reply = Parcel::new();
        match code {
            GREET => {
                let name = data.read_str()?;
                reply.write_str(&format!("hello {name} from {}", self.process));
            }
            EXPLODE => panic!("greeter in {} exploded", self.process),
            INSTANCE => reply.write_i64(self.instance as i64),
            REJECT => return Err(Error::InvalidArgument("rejected")),
            _ => return Err(Error::UnknownTransaction(code)),
        }
        Ok(reply)
    }
}

pub struct GreeterClient(HandleRef);

impl Interface for GreeterClient {
    const DESCRIPTOR: &'static str = "test.IGreeter";

    fn from_binder(binder: HandleRef) -> Self {
        Self(binder)
    }

    fn as_binder(&self) -> &HandleRef {
        &self.0
    }
}

impl GreeterClient {
    pub fn greet(&self, name: &str) -> svclink::Result<String> {
        let mut data = Parcel::new();
        data.write_str(name);
        self.0.transact(GREET, data)?.read_str()
    }

    pub fn explode(&self) -> svclink::Result<()> {
        self.0.transact(EXPLODE, Parcel::new())?;
        Ok(())
    }

    pub fn reject(&self) -> svclink::Result<()> {
        self.0.transact(REJECT, Parcel::new())?;
        Ok(())
    }

    pub fn instance(&self) -> svclink::Result<u64> {
        Ok(self.0.transact(INSTANCE, Parcel::new())?.read_i64()? as u64)
    }
}

/// Interface nothing is installed under; used for mismatch checks.
pub struct OtherClient(HandleRef);

impl Interface for OtherClient {
    const DESCRIPTOR: &'static str = "test.IOther";

    fn from_binder(binder: HandleRef) -> Self {
        Self(binder)
    }

    fn as_binder(&self) -> &HandleRef {
        &self.0
    }
}

/// A fabric plus the descriptor set every process installs.
pub struct World {
    pub fabric: Fabric,
    created: Arc<HashMap<i32, AtomicUsize>>,
}

impl World {
    pub fn new() -> Self {
        let created = [CORE_GREETER, MAIN_GREETER, C_GREETER, D_GREETER]
            .into_iter()
            .map(|id| (id, AtomicUsize::new(0)))
            .collect();
        Self {
            fabric: Fabric::new(),
            created: Arc::new(created),
        }
    }

    /// How many times the factory of `id` ran, across all processes.
    pub fn created(&self, id: i32) -> usize {
        self.created
            .get(&id)
            .map(|count| count.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn config(&self, process: &str) -> RuntimeConfig {
        RuntimeConfig::for_process(PACKAGE, process)
    }

    fn descriptor(&self, id: i32, placement: Placement, process: &str) -> ServiceDescriptor {
        let created = Arc::clone(&self.created);
        let process = process.to_string();
        ServiceDescriptor::new::<GreeterClient, _, _>(id, placement, move || {
            if let Some(count) = created.get(&id) {
                count.fetch_add(1, Ordering::SeqCst);
            }
            Greeter::new(&process)
        })
    }

    pub fn start(&self, process: &str) -> Arc<ServiceManager> {
        self.start_with(self.config(process))
    }

    pub fn start_with(&self, config: RuntimeConfig) -> Arc<ServiceManager> {
        let process = config.process_name.clone().expect("process name");
        ServiceManager::builder(config, self.fabric.spawn(&process))
            .install(self.descriptor(CORE_GREETER, Placement::Core, CORE))
            .install(self.descriptor(MAIN_GREETER, Placement::Process(String::new()), MAIN))
            .install(self.descriptor(C_GREETER, Placement::Process(":c".to_string()), PEER_C))
            .install(self.descriptor(D_GREETER, Placement::Process(":d".to_string()), PEER_D))
            .install(ServiceDescriptor::new::<GreeterClient, _, _>(
                NAMED_GREETER,
                Placement::Core,
                || Greeter::new(CORE),
            ))
            .install(ServiceDescriptor::new::<GreeterClient, _, _>(
                NAMED_D_GREETER,
                Placement::Process(":d".to_string()),
                || Greeter::new(PEER_D),
            ))
            .build()
            .expect("build manager")
    }

    /// Starts a non-core process and registers its peer manager.
    pub fn start_peer(&self, process: &str) -> Arc<ServiceManager> {
        let manager = self.start(process);
        manager.core().registry().expect("reach root registry");
        manager
    }

    pub fn kill(&self, process: &str) {
        assert!(self.fabric.kill(process), "{process} was not running");
        self.fabric.flush_notifications();
    }

    pub fn discovery_requests(&self) -> usize {
        self.fabric.discovery_calls() + self.fabric.discovery_queries()
    }
}

pub fn greeter(manager: &ServiceManager, id: i32) -> GreeterClient {
    manager
        .get::<GreeterClient>(id)
        .expect("valid id")
        .expect("service available")
}
