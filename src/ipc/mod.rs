//! Transport-facing contracts.
//!
//! Everything the resolver needs from the host platform is expressed here as
//! traits: handles (`Binder`), server-side objects (`Stub`), liveness
//! observers (`DeathRecipient`), typed adapters (`Interface`), the discovery
//! rendezvous and the per-process `Transport`. `crate::fabric` is an
//! in-memory implementation of all of them.

pub mod binder;
pub mod discovery;
pub mod parcel;

pub use binder::{recipient, same_handle, same_recipient, Binder, DeathRecipient, HandleRef, Interface, Stub, Transport};
pub use discovery::{fetch_root, DiscoveryChannel, DiscoveryConfig, DiscoveryProvider};
pub use parcel::{Bundle, Parcel, Value};
