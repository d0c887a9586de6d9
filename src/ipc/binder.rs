use std::any::Any;
use std::sync::{Arc, Weak};

use crate::error::{Result, TransportError};
use crate::ipc::discovery::{DiscoveryChannel, DiscoveryProvider};
use crate::ipc::parcel::Parcel;

/// Shared reference to a transport handle.
pub type HandleRef = Arc<dyn Binder>;

/// An opaque, transport-level reference to a service object that may live in
/// this process or in another one.
pub trait Binder: Send + Sync {
    /// Interface descriptor of the object behind the handle.
    fn descriptor(&self) -> std::result::Result<String, TransportError>;

    /// Sends one transaction and blocks until the reply or a transport failure.
    fn transact(&self, code: u32, data: Parcel) -> std::result::Result<Parcel, TransportError>;

    fn is_alive(&self) -> bool;

    fn ping(&self) -> bool {
        self.is_alive()
    }

    /// Registers `recipient` to be told when the object behind this handle
    /// dies. Fails with `DeadObject` if it is already dead.
    fn link_to_death(
        &self,
        recipient: Weak<dyn DeathRecipient>,
    ) -> std::result::Result<(), TransportError>;

    fn unlink_to_death(&self, recipient: &Weak<dyn DeathRecipient>) -> bool;

    /// The in-process implementation, when the handle points into this process.
    fn local_stub(&self) -> Option<Arc<dyn Stub>>;

    fn as_any(&self) -> &dyn Any;
}

/// Server side of an interface: decodes a transaction and produces the reply.
pub trait Stub: Send + Sync {
    fn descriptor(&self) -> &str;

    fn on_transact(&self, code: u32, data: &mut Parcel) -> Result<Parcel>;
}

/// Liveness observer. Called on the transport's notification thread.
pub trait DeathRecipient: Send + Sync {
    fn binder_died(&self, who: &HandleRef);
}

/// Typed capability obtained by adapting a handle.
pub trait Interface: Sized + Send + Sync {
    const DESCRIPTOR: &'static str;

    fn from_binder(binder: HandleRef) -> Self;

    fn as_binder(&self) -> &HandleRef;
}

/// What a process needs from the host platform.
pub trait Transport: Send + Sync {
    fn discovery(&self) -> &dyn DiscoveryChannel;

    /// Makes a local stub reachable through a handle that can be passed to
    /// other processes.
    fn publish(&self, stub: Arc<dyn Stub>) -> HandleRef;

    /// Hosts a discovery provider at `address`. Only the core process does this.
    fn serve_discovery(
        &self,
        address: &str,
        provider: Arc<dyn DiscoveryProvider>,
    ) -> std::result::Result<(), TransportError>;
}

/// Compares two handles by identity. Only the data address counts; vtable
/// pointers for one type are not guaranteed unique.
pub fn same_handle(a: &HandleRef, b: &HandleRef) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Identity comparison for registered death recipients.
pub fn same_recipient(a: &Weak<dyn DeathRecipient>, b: &Weak<dyn DeathRecipient>) -> bool {
    a.as_ptr() as *const () == b.as_ptr() as *const ()
}

/// Turns a `Weak` to a concrete recipient into the trait-object form the
/// transport stores.
pub fn recipient<T: DeathRecipient + 'static>(weak: &Weak<T>) -> Weak<dyn DeathRecipient> {
    let weak: Weak<dyn DeathRecipient> = weak.clone();
    weak
}

