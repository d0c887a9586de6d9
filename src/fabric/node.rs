use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use log::warn;
use parking_lot::Mutex;

use super::FabricProcess;
use crate::error::TransportError;
use crate::ipc::binder::{same_recipient, Binder, DeathRecipient, Stub};
use crate::ipc::parcel::Parcel;

/// A published object. Lives as long as some process holds a handle to it.
pub(super) struct Node {
    id: u64,
    descriptor: String,
    stub: Arc<dyn Stub>,
    owner: Weak<FabricProcess>,
    alive: AtomicBool,
}

impl Node {
    pub(super) fn new(id: u64, stub: Arc<dyn Stub>, owner: Weak<FabricProcess>) -> Self {
        Self {
            id,
            descriptor: stub.descriptor().to_string(),
            stub,
            owner,
            alive: AtomicBool::new(true),
        }
    }

    pub(super) fn id(&self) -> u64 {
        self.id
    }

    pub(super) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub(super) fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub(super) fn is_owned_by(&self, process: &FabricProcess) -> bool {
        std::ptr::eq(self.owner.as_ptr(), process)
    }
}

/// One process's handle on a node. A process holds at most one live
/// `FabricBinder` per node, so handle identity survives round trips.
pub(super) struct FabricBinder {
    node: Arc<Node>,
    holder: Weak<FabricProcess>,
    local: bool,
    recipients: Mutex<Vec<Weak<dyn DeathRecipient>>>,
}

impl FabricBinder {
    pub(super) fn new(node: Arc<Node>, holder: &FabricProcess) -> Self {
        let local = node.is_owned_by(holder);
        Self {
            node,
            holder: holder.me.clone(),
            local,
            recipients: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn node(&self) -> &Arc<Node> {
        &self.node
    }

    #[cfg(test)]
    pub(super) fn linked(&self) -> usize {
        self.recipients.lock().len()
    }

    pub(super) fn take_recipients(&self) -> Vec<Weak<dyn DeathRecipient>> {
        std::mem::take(&mut *self.recipients.lock())
    }

    fn holder(&self) -> Result<Arc<FabricProcess>, TransportError> {
        self.holder
            .upgrade()
            .filter(|holder| holder.is_alive())
            .ok_or(TransportError::DeadObject)
    }
}

impl Binder for FabricBinder {
    fn descriptor(&self) -> Result<String, TransportError> {
        if !self.is_alive() {
            return Err(TransportError::DeadObject);
        }
        Ok(self.node.descriptor.clone())
    }

    fn transact(&self, code: u32, data: Parcel) -> Result<Parcel, TransportError> {
        let holder = self.holder()?;
        let owner = match self.node.owner.upgrade() {
            Some(owner) if self.node.is_alive() => owner,
            _ => return Err(TransportError::DeadObject),
        };
        holder.hub().count_transaction(&self.node.descriptor, code);

        let mut data = if self.local {
            data
        } else {
            data.try_map(|value| owner.import(value))?
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.node.stub.on_transact(code, &mut data)
        }));
        match outcome {
            Ok(Ok(reply)) if self.local => Ok(reply),
            Ok(Ok(reply)) => reply.try_map(|value| holder.import(value)),
            Ok(Err(err)) => Err(TransportError::Remote(err.to_string())),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(
                    "[fabric] {} panicked in transaction {code}: {message}",
                    self.node.descriptor
                );
                Err(TransportError::Failed(message))
            }
        }
    }

    fn is_alive(&self) -> bool {
        self.node.is_alive() && self.holder().is_ok()
    }

    fn link_to_death(&self, recipient: Weak<dyn DeathRecipient>) -> Result<(), TransportError> {
        let mut recipients = self.recipients.lock();
        if !self.is_alive() {
            return Err(TransportError::DeadObject);
        }
        recipients.push(recipient);
        Ok(())
    }

    fn unlink_to_death(&self, recipient: &Weak<dyn DeathRecipient>) -> bool {
        let mut recipients = self.recipients.lock();
        let before = recipients.len();
        recipients.retain(|linked| !same_recipient(linked, recipient));
        recipients.len() != before
    }

    fn local_stub(&self) -> Option<Arc<dyn Stub>> {
        (self.local && self.node.is_alive()).then(|| Arc::clone(&self.node.stub))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "service panicked".to_string()
}
