use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::info;

use svclink::{
    Error, Fabric, HandleRef, Interface, Parcel, Placement, RuntimeConfig, ServiceDescriptor,
    ServiceManager, Stub,
};

const COUNTER_ID: i32 = 0;
const GREETER_ID: i32 = 1;

const INCREMENT: u32 = 1;
const GREET: u32 = 1;

/// Simulates a core process, a worker process and a client on the in-memory
/// transport, then restarts the core process.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Application package
    #[arg(long, default_value = "com.example")]
    package: String,

    /// Optional JSON runtime config used as the base for every process
    #[arg(long)]
    config: Option<PathBuf>,

    /// Suffix of the worker process
    #[arg(long, default_value = ":worker")]
    worker_suffix: String,

    /// How many times to kill and restart the core process
    #[arg(long, default_value_t = 1)]
    restarts: usize,

    /// Resolve the root registry through query only, like an older platform
    #[arg(long)]
    legacy_discovery: bool,
}

#[derive(Default)]
struct Counter {
    value: AtomicI64,
}

impl Stub for Counter {
    fn descriptor(&self) -> &str {
        CounterClient::DESCRIPTOR
    }

    fn on_transact(&self, code: u32, _data: &mut Parcel) -> svclink::Result<Parcel> {
        match code {
            INCREMENT => {
                let mut reply = Parcel::new();
                reply.write_i64(self.value.fetch_add(1, Ordering::SeqCst) + 1);
                Ok(reply)
            }
            _ => Err(Error::UnknownTransaction(code)),
        }
    }
}

struct CounterClient(HandleRef);

impl Interface for CounterClient {
    const DESCRIPTOR: &'static str = "demo.ICounter";

    fn from_binder(binder: HandleRef) -> Self {
        Self(binder)
    }

    fn as_binder(&self) -> &HandleRef {
        &self.0
    }
}

impl CounterClient {
    fn increment(&self) -> svclink::Result<i64> {
        self.0.transact(INCREMENT, Parcel::new())?.read_i64()
    }
}

struct Greeter {
    process: String,
}

impl Stub for Greeter {
    fn descriptor(&self) -> &str {
        GreeterClient::DESCRIPTOR
    }

    fn on_transact(&self, code: u32, data: &mut Parcel) -> svclink::Result<Parcel> {
        match code {
            GREET => {
                let name = data.read_str()?;
                let mut reply = Parcel::new();
                reply.write_str(&format!("hello {name}, from {}", self.process));
                Ok(reply)
            }
            _ => Err(Error::UnknownTransaction(code)),
        }
    }
}

struct GreeterClient(HandleRef);

impl Interface for GreeterClient {
    const DESCRIPTOR: &'static str = "demo.IGreeter";

    fn from_binder(binder: HandleRef) -> Self {
        Self(binder)
    }

    fn as_binder(&self) -> &HandleRef {
        &self.0
    }
}

impl GreeterClient {
    fn greet(&self, name: &str) -> svclink::Result<String> {
        let mut data = Parcel::new();
        data.write_str(name);
        self.0.transact(GREET, data)?.read_str()
    }
}

struct Topology {
    base: RuntimeConfig,
    worker_suffix: String,
}

impl Topology {
    fn process(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.base.package)
    }

    fn start(&self, fabric: &Fabric, process: &str) -> Result<Arc<ServiceManager>> {
        let mut config = self.base.clone();
        config.process_name = Some(process.to_string());
        let worker = self.process(&self.worker_suffix);
        ServiceManager::builder(config, fabric.spawn(process))
            .install(ServiceDescriptor::new::<CounterClient, _, _>(
                COUNTER_ID,
                Placement::Core,
                Counter::default,
            ))
            .install(ServiceDescriptor::new::<GreeterClient, _, _>(
                GREETER_ID,
                Placement::Process(self.worker_suffix.clone()),
                move || Greeter {
                    process: worker.clone(),
                },
            ))
            .build()
            .with_context(|| format!("failed to start {process}"))
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut base = match &args.config {
        Some(path) => RuntimeConfig::from_json_path(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    base.package = args.package.clone();
    let topology = Topology {
        base: base.with_env_overrides(),
        worker_suffix: args.worker_suffix.clone(),
    };

    let fabric = Fabric::new();
    fabric.set_call_supported(!args.legacy_discovery);

    let core_name = topology.process(&topology.base.core_suffix);
    let worker_name = topology.process(&topology.worker_suffix);
    let client_name = topology.process("");

    let mut core = topology.start(&fabric, &core_name)?;
    let worker = topology.start(&fabric, &worker_name)?;
    let client = topology.start(&fabric, &client_name)?;
    worker
        .core()
        .registry()
        .context("worker could not reach the root registry")?;

    let counter: CounterClient = client
        .get(COUNTER_ID)?
        .ok_or_else(|| anyhow!("counter unavailable"))?;
    let greeter: GreeterClient = client
        .get(GREETER_ID)?
        .ok_or_else(|| anyhow!("greeter unavailable"))?;

    info!("counter -> {}", counter.increment()?);
    info!("counter -> {}", counter.increment()?);
    info!("{}", greeter.greet(&client_name)?);

    for round in 1..=args.restarts {
        info!("restart {round}: killing {core_name}");
        fabric.kill(&core_name);
        fabric.flush_notifications();
        core.shutdown();
        core = topology.start(&fabric, &core_name)?;

        // The held capability re-resolves against the new core instance.
        info!("counter -> {}", counter.increment()?);
        worker
            .core()
            .registry()
            .context("worker could not reconnect")?;
        info!("{}", greeter.greet(&client_name)?);
    }

    info!(
        "discovery calls: {}, queries: {}",
        fabric.discovery_calls(),
        fabric.discovery_queries()
    );
    core.shutdown();
    worker.shutdown();
    client.shutdown();
    Ok(())
}
