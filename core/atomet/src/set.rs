//! Metric registries.
//!
//! A [`Set`] owns a mapping from identity hash to registered metric. A
//! process may hold many independent sets; they share nothing but the
//! process-wide identifier cache. For a given identity, a set hands out a
//! single instrument object for its whole lifetime: entries are inserted
//! once and never replaced or removed.
//!
//! The registry lock is held only across lookups and check-and-insert
//! operations, never across identifier validation, allocation or
//! caller-supplied code. Instruments are mutated through their own atomic
//! operations, outside the lock entirely.

use std::collections::hash_map;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::counter::Counter;
use crate::error::MetricError;
use crate::gauge::Gauge;
use crate::hash;
use crate::ident::{Ident, Tag};

/// The closed set of instrument kinds a [`Set`] can hold.
///
/// Cloning a `Metric` clones a handle to the same underlying instrument.
#[derive(Debug, Clone)]
pub enum Metric {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
}

impl Metric {
    /// The current value, whatever the kind.
    pub fn value(&self) -> f64 {
        match self {
            Metric::Counter(c) => c.get() as f64,
            Metric::Gauge(g) => g.get(),
        }
    }

    pub fn as_counter(&self) -> Option<&Arc<Counter>> {
        match self {
            Metric::Counter(c) => Some(c),
            Metric::Gauge(_) => None,
        }
    }

    pub fn as_gauge(&self) -> Option<&Arc<Gauge>> {
        match self {
            Metric::Gauge(g) => Some(g),
            Metric::Counter(_) => None,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Metric::Counter(_) => "counter",
            Metric::Gauge(_) => "gauge",
        }
    }
}

/// One registered metric: its identity plus the instrument.
///
/// The identity is immutable after insertion; only the instrument's own
/// interface mutates anything.
#[derive(Debug, Clone)]
pub struct RegisteredMetric {
    pub family: Ident,
    pub tags: Box<[Tag]>,
    pub metric: Metric,
}

/// A registry of metrics.
///
/// See the [module docs](self) for the ownership and locking rules.
#[derive(Default)]
pub struct Set {
    metrics: Mutex<FxHashMap<u64, RegisteredMetric>>,
}

impl Set {
    pub fn new() -> Set {
        Set::default()
    }

    /// The number of registered metrics.
    pub fn len(&self) -> usize {
        self.metrics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.lock().is_empty()
    }

    /// A point-in-time copy of the registered metrics, for exporters.
    ///
    /// Entries clone cheaply: identities are shared allocations and
    /// metrics are handles. Order is unspecified;
    /// [`write_prometheus`](Set::write_prometheus) sorts its output.
    pub fn snapshot(&self) -> Vec<RegisteredMetric> {
        self.metrics.lock().values().cloned().collect()
    }

    /// Strict registration: fails if the identity is already present.
    ///
    /// The lock is held across the check-and-insert. Identifier validation
    /// has already happened in the caller.
    pub(crate) fn register(
        &self,
        family: Ident,
        tags: Vec<Tag>,
        metric: Metric,
    ) -> Result<(), MetricError> {
        let key = hash::identity_hash(&family, &tags);
        let mut metrics = self.metrics.lock();
        if metrics.contains_key(&key) {
            return Err(MetricError::DuplicateRegistration {
                family: family.to_string(),
            });
        }
        metrics.insert(
            key,
            RegisteredMetric {
                family,
                tags: tags.into(),
                metric,
            },
        );
        Ok(())
    }

    /// Optimistic half of the double-checked protocol: the lock is taken
    /// only to look up the key.
    pub(crate) fn lookup(&self, key: u64) -> Option<Metric> {
        self.metrics.lock().get(&key).map(|m| m.metric.clone())
    }

    /// Second half of the double-checked protocol.
    ///
    /// The caller validated identifiers and built `fresh` outside the
    /// lock. Here the key is re-checked under the lock: if another thread
    /// registered the identity in the interim, `fresh` is discarded and
    /// the winner's instrument is returned, so every caller observes the
    /// same object. Collapsing this re-check into the earlier optimistic
    /// read would break the exactly-once-per-identity guarantee.
    pub(crate) fn insert_or_existing(
        &self,
        key: u64,
        family: Ident,
        tags: Vec<Tag>,
        fresh: Metric,
    ) -> Metric {
        let mut metrics = self.metrics.lock();
        match metrics.entry(key) {
            hash_map::Entry::Occupied(entry) => entry.get().metric.clone(),
            hash_map::Entry::Vacant(entry) => {
                entry.insert(RegisteredMetric {
                    family,
                    tags: tags.into(),
                    metric: fresh.clone(),
                });
                fresh
            }
        }
    }
}
