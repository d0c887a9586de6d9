use criterion::{black_box, BatchSize, Criterion};
use criterion::{criterion_group, criterion_main};

use svclink::{
    Error, Fabric, HandleRef, Interface, Parcel, Placement, RuntimeConfig, ServiceDescriptor,
    ServiceManager, Stub,
};

const PACKAGE: &str = "bench.app";
const CORE_ID: i32 = 0;
const LOCAL_ID: i32 = 1;

struct Nop;

impl Stub for Nop {
    fn descriptor(&self) -> &str {
        NopClient::DESCRIPTOR
    }

    fn on_transact(&self, code: u32, _data: &mut Parcel) -> svclink::Result<Parcel> {
        match code {
            1 => Ok(Parcel::new()),
            _ => Err(Error::UnknownTransaction(code)),
        }
    }
}

struct NopClient(HandleRef);

impl Interface for NopClient {
    const DESCRIPTOR: &'static str = "bench.INop";

    fn from_binder(binder: HandleRef) -> Self {
        Self(binder)
    }

    fn as_binder(&self) -> &HandleRef {
        &self.0
    }
}

fn start(fabric: &Fabric, process: &str) -> std::sync::Arc<ServiceManager> {
    ServiceManager::builder(RuntimeConfig::for_process(PACKAGE, process), fabric.spawn(process))
        .install(ServiceDescriptor::new::<NopClient, _, _>(CORE_ID, Placement::Core, || Nop))
        .install(ServiceDescriptor::new::<NopClient, _, _>(
            LOCAL_ID,
            Placement::Process(String::new()),
            || Nop,
        ))
        .build()
        .expect("build")
}

fn bench_resolve(c: &mut Criterion) {
    let fabric = Fabric::new();
    let _core = start(&fabric, "bench.app:core");
    let client = start(&fabric, PACKAGE);

    let mut group = c.benchmark_group("resolve");
    group.bench_function("local", |b| {
        b.iter(|| client.get_service(black_box(LOCAL_ID)).expect("local"));
    });

    client.get_service(CORE_ID).expect("warm").expect("core service");
    group.bench_function("cached", |b| {
        b.iter(|| client.get_service(black_box(CORE_ID)).expect("cached"));
    });

    group.bench_function("cold", |b| {
        b.iter_batched(
            || client.cache().clear(),
            |_| client.get_service(black_box(CORE_ID)).expect("cold"),
            BatchSize::SmallInput,
        );
    });

    let handle = client.get_service(CORE_ID).expect("resolve").expect("core service");
    group.bench_function("transact", |b| {
        b.iter(|| handle.transact(1, Parcel::new()).expect("transact"));
    });
    group.finish();
}

criterion_group!(benches, bench_resolve);
criterion_main!(benches);
