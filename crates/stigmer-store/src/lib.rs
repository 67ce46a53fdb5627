//! Stigmer Store — persistence layer for the control plane.
//!
//! Two tiers:
//!
//! - [`KvStore`]: raw byte-level `get`/`set`/`delete`/`scan_prefix` with
//!   per-key compare-and-swap. Backed by embedded [sled] in the daemon and
//!   by [`MemoryKvStore`] in tests. [`ScopedKvStore`] prefixes every key
//!   with a namespace.
//! - [`TypedStore`]: prost-encoded resources keyed `{kind}/{id}`, with the
//!   `{kind}:slug/{org}/{slug}` index and tombstone audit records.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod kv;
pub mod typed;

pub use error::{StoreError, StoreResult};
pub use kv::{KvStore, MemoryKvStore, ScopedKvStore, SledKvStore};
pub use typed::TypedStore;
