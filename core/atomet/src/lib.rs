//! ATOMET: Atomic, Tagged, Online METrics.
//!
//! Atomet is an in-process metrics registry. Callers register named,
//! optionally-tagged numeric instruments (counters, gauges, and
//! label-parameterized families of them) inside a [`Set`], mutate them
//! from any number of concurrent call sites, and export their current
//! values in the Prometheus text format.
//!
//! # This crate
//! The crate is built around three pieces:
//! 1. Interned, validated identifiers ([`Ident`], [`Tag`]): a
//!    process-wide weak-reference cache deduplicates identifier strings
//!    and pays validation at most once per distinct live identifier.
//! 2. The [`Set`] registry: maps each (family, tag set) identity to a
//!    single instrument, with a double-checked creation protocol that
//!    guarantees at most one instance per identity under concurrent
//!    creation.
//! 3. Instrument families ([`CounterVec`], [`GaugeVec`]): the family and
//!    label names are validated and partially hashed once, and each
//!    `with_label_values` call completes the identity cheaply.
//!
//! Instrument handles are plain `Arc`s: after creation, mutation goes
//! straight to the instrument's atomics and bypasses the registry.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use atomet::Set;
//!
//! let set = Arc::new(Set::new());
//!
//! let requests = atomet::CounterVec::new(&set, "http_requests_total", &["code"])?;
//! requests.with_label_values(&["200"])?.inc();
//!
//! let queue_depth = set.new_gauge("queue_depth", &[])?;
//! queue_depth.set(17.0);
//!
//! let mut out = String::new();
//! set.write_prometheus(&mut out)?;
//! assert_eq!(
//!     out,
//!     "http_requests_total{code=\"200\"} 1\nqueue_depth 17\n"
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Concurrency
//! There is no suspension point anywhere in the crate: every operation is
//! either a plain atomic access or holds a registry lock for a short,
//! bounded critical section. Identifier validation and instrument
//! allocation never run under a set's lock on the get-or-create paths.
//!
//! # Known limitations
//! - Identity hashes are 64-bit and collisions are not disambiguated;
//!   two colliding identities are treated as the same metric.
//! - Tag order is significant: the same label/value pairs in a different
//!   order register as distinct identities.
//! - Hashes are seeded per process and are not stable across restarts.

pub mod counter;
pub mod error;
mod export;
pub mod gauge;
mod hash;
pub mod ident;
pub mod set;

pub use counter::{Counter, CounterVec};
pub use error::MetricError;
pub use gauge::{Gauge, GaugeVec};
pub use ident::{Ident, Tag};
pub use set::{Metric, RegisteredMetric, Set};
