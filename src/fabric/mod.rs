//! In-memory multi-process transport.
//!
//! `Fabric` stands in for the host platform in tests, benches and the demo
//! binary. Each `FabricProcess` plays one OS process: objects it publishes
//! are reachable from other processes through handles that are translated
//! whenever a parcel crosses a process boundary, and a handle that comes
//! back to its owner is the owner's local object again.
//!
//! `kill` marks every object of a process dead and queues death
//! notifications for the processes still running; they are delivered on a
//! dedicated thread. `flush_notifications` waits for that queue to drain.

mod node;
mod notifier;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use log::debug;
use parking_lot::Mutex;

use crate::error::TransportError;
use crate::ipc::binder::{HandleRef, Stub, Transport};
use crate::ipc::discovery::{DiscoveryChannel, DiscoveryProvider};
use crate::ipc::parcel::{Bundle, Value};

use self::node::{FabricBinder, Node};
use self::notifier::{Notification, Notifier};

struct Served {
    owner: Weak<FabricProcess>,
    provider: Arc<dyn DiscoveryProvider>,
}

#[derive(Default)]
struct HubState {
    processes: HashMap<String, Arc<FabricProcess>>,
    providers: HashMap<String, Served>,
}

struct Hub {
    state: Mutex<HubState>,
    notifier: Notifier,
    next_node: AtomicU64,
    call_supported: AtomicBool,
    discovery_calls: AtomicUsize,
    discovery_queries: AtomicUsize,
    transactions: Mutex<HashMap<(String, u32), usize>>,
}

impl Hub {
    fn count_transaction(&self, descriptor: &str, code: u32) {
        *self
            .transactions
            .lock()
            .entry((descriptor.to_string(), code))
            .or_default() += 1;
    }

    fn provider(&self, address: &str) -> Option<(Arc<FabricProcess>, Arc<dyn DiscoveryProvider>)> {
        let state = self.state.lock();
        let served = state.providers.get(address)?;
        let owner = served.owner.upgrade().filter(|owner| owner.is_alive())?;
        Some((owner, Arc::clone(&served.provider)))
    }

    fn kill(&self, name: &str) -> bool {
        let (process, survivors, withdrawn) = {
            let mut state = self.state.lock();
            let Some(process) = state.processes.remove(name) else {
                return false;
            };
            let addresses: Vec<String> = state
                .providers
                .iter()
                .filter(|(_, served)| std::ptr::eq(served.owner.as_ptr(), Arc::as_ptr(&process)))
                .map(|(address, _)| address.clone())
                .collect();
            let withdrawn: Vec<Served> = addresses
                .iter()
                .filter_map(|address| state.providers.remove(address))
                .collect();
            let survivors: Vec<_> = state.processes.values().cloned().collect();
            (process, survivors, withdrawn)
        };
        drop(withdrawn);

        process.alive.store(false, Ordering::SeqCst);
        let published: Vec<_> = process.published.lock().drain(..).collect();
        for node in published.iter().filter_map(Weak::upgrade) {
            node.kill();
        }
        process.handles.lock().clear();

        let pending: Vec<Notification> = survivors
            .iter()
            .flat_map(|survivor| survivor.dead_links())
            .collect();
        debug!(
            "[fabric] killed {name}, {} death notification(s) queued",
            pending.len()
        );
        self.notifier.deliver(pending);
        true
    }
}

/// The simulated platform. Dropping it kills every process still running.
pub struct Fabric {
    hub: Arc<Hub>,
}

impl Fabric {
    pub fn new() -> Self {
        Self {
            hub: Arc::new(Hub {
                state: Mutex::new(HubState::default()),
                notifier: Notifier::spawn(),
                next_node: AtomicU64::new(1),
                call_supported: AtomicBool::new(true),
                discovery_calls: AtomicUsize::new(0),
                discovery_queries: AtomicUsize::new(0),
                transactions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Starts process `name`, or returns it if it is already running.
    /// A process spawned after `kill` is a new incarnation with no objects.
    pub fn spawn(&self, name: &str) -> Arc<FabricProcess> {
        let mut state = self.hub.state.lock();
        if let Some(process) = state.processes.get(name) {
            return Arc::clone(process);
        }
        let process = Arc::new_cyclic(|me| FabricProcess {
            name: name.to_string(),
            hub: Arc::clone(&self.hub),
            alive: AtomicBool::new(true),
            handles: Mutex::new(HashMap::new()),
            published: Mutex::new(Vec::new()),
            me: me.clone(),
        });
        state.processes.insert(name.to_string(), Arc::clone(&process));
        debug!("[fabric] spawned {name}");
        process
    }

    pub fn process(&self, name: &str) -> Option<Arc<FabricProcess>> {
        self.hub.state.lock().processes.get(name).cloned()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.hub.state.lock().processes.contains_key(name)
    }

    /// Names of the running processes, sorted.
    pub fn processes(&self) -> Vec<String> {
        let mut names: Vec<_> = self.hub.state.lock().processes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Kills process `name`. Returns false if it was not running.
    pub fn kill(&self, name: &str) -> bool {
        self.hub.kill(name)
    }

    /// Waits until every death notification queued so far has been delivered.
    pub fn flush_notifications(&self) {
        self.hub.notifier.flush();
    }

    /// Simulates a platform without the direct discovery call.
    pub fn set_call_supported(&self, supported: bool) {
        self.hub.call_supported.store(supported, Ordering::SeqCst);
    }

    pub fn discovery_calls(&self) -> usize {
        self.hub.discovery_calls.load(Ordering::SeqCst)
    }

    pub fn discovery_queries(&self) -> usize {
        self.hub.discovery_queries.load(Ordering::SeqCst)
    }

    /// Transactions sent to objects with interface `descriptor` using `code`.
    pub fn transaction_count(&self, descriptor: &str, code: u32) -> usize {
        self.hub
            .transactions
            .lock()
            .get(&(descriptor.to_string(), code))
            .copied()
            .unwrap_or(0)
    }

    pub fn reset_counters(&self) {
        self.hub.discovery_calls.store(0, Ordering::SeqCst);
        self.hub.discovery_queries.store(0, Ordering::SeqCst);
        self.hub.transactions.lock().clear();
    }
}

impl Default for Fabric {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Fabric {
    fn drop(&mut self) {
        for name in self.processes() {
            self.hub.kill(&name);
        }
    }
}

/// One simulated process. Implements the transport a `ServiceManager` runs on.
pub struct FabricProcess {
    name: String,
    hub: Arc<Hub>,
    alive: AtomicBool,
    /// At most one handle per node, for stable identity.
    handles: Mutex<HashMap<u64, Weak<FabricBinder>>>,
    published: Mutex<Vec<Weak<Node>>>,
    me: Weak<FabricProcess>,
}

impl FabricProcess {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn hub(&self) -> &Hub {
        &self.hub
    }

    fn handle_for(&self, node: &Arc<Node>) -> HandleRef {
        let mut handles = self.handles.lock();
        if let Some(handle) = handles.get(&node.id()).and_then(Weak::upgrade) {
            return handle;
        }
        let handle = Arc::new(FabricBinder::new(Arc::clone(node), self));
        handles.insert(node.id(), Arc::downgrade(&handle));
        handle
    }

    /// Translates a value arriving in this process.
    fn import(&self, value: Value) -> Result<Value, TransportError> {
        match value {
            Value::Handle(handle) => {
                let binder = handle
                    .as_any()
                    .downcast_ref::<FabricBinder>()
                    .ok_or(TransportError::Unmarshalable)?;
                Ok(Value::Handle(self.handle_for(binder.node())))
            }
            other => Ok(other),
        }
    }

    fn import_bundle(&self, bundle: Option<Bundle>) -> Result<Option<Bundle>, TransportError> {
        bundle.map(|bundle| bundle.try_map(|value| self.import(value))).transpose()
    }

    /// Death links on handles whose node is gone. Each link fires once.
    fn dead_links(&self) -> Vec<Notification> {
        let handles: Vec<Arc<FabricBinder>> = {
            let mut map = self.handles.lock();
            map.retain(|_, handle| handle.strong_count() > 0);
            map.values().filter_map(Weak::upgrade).collect()
        };
        let mut pending = Vec::new();
        for handle in handles.iter().filter(|handle| !handle.node().is_alive()) {
            for recipient in handle.take_recipients() {
                pending.push((recipient, Arc::clone(handle) as HandleRef));
            }
        }
        pending
    }
}

impl Transport for FabricProcess {
    fn discovery(&self) -> &dyn DiscoveryChannel {
        self
    }

    fn publish(&self, stub: Arc<dyn Stub>) -> HandleRef {
        let id = self.hub.next_node.fetch_add(1, Ordering::Relaxed);
        let node = Arc::new(Node::new(id, stub, self.me.clone()));
        {
            let mut published = self.published.lock();
            if self.is_alive() {
                published.push(Arc::downgrade(&node));
            } else {
                node.kill();
            }
        }
        self.handle_for(&node)
    }

    fn serve_discovery(
        &self,
        address: &str,
        provider: Arc<dyn DiscoveryProvider>,
    ) -> Result<(), TransportError> {
        if !self.is_alive() {
            return Err(TransportError::DeadObject);
        }
        let served = Served {
            owner: self.me.clone(),
            provider,
        };
        let replaced = self
            .hub
            .state
            .lock()
            .providers
            .insert(address.to_string(), served);
        drop(replaced);
        debug!("[fabric] {} serving {address}", self.name);
        Ok(())
    }
}

impl DiscoveryChannel for FabricProcess {
    fn supports_call(&self) -> bool {
        self.hub.call_supported.load(Ordering::SeqCst)
    }

    fn call(
        &self,
        address: &str,
        method: &str,
        arg: Option<&str>,
        extras: Option<Bundle>,
    ) -> Result<Option<Bundle>, TransportError> {
        if !self.is_alive() {
            return Err(TransportError::DeadObject);
        }
        if !self.supports_call() {
            return Err(TransportError::Unsupported);
        }
        self.hub.discovery_calls.fetch_add(1, Ordering::SeqCst);
        let Some((owner, provider)) = self.hub.provider(address) else {
            debug!("[fabric] nothing served at {address}");
            return Ok(None);
        };
        let extras = owner.import_bundle(extras)?;
        let reply = provider.call(method, arg, extras.as_ref());
        self.import_bundle(reply)
    }

    fn query(&self, address: &str) -> Result<Option<Bundle>, TransportError> {
        if !self.is_alive() {
            return Err(TransportError::DeadObject);
        }
        self.hub.discovery_queries.fetch_add(1, Ordering::SeqCst);
        let Some((_, provider)) = self.hub.provider(address) else {
            debug!("[fabric] nothing served at {address}");
            return Ok(None);
        };
        self.import_bundle(provider.query())
    }
}

/// Death observers currently linked on a fabric handle.
#[cfg(test)]
pub(crate) fn death_links(handle: &HandleRef) -> usize {
    handle
        .as_any()
        .downcast_ref::<FabricBinder>()
        .map_or(0, FabricBinder::linked)
}
