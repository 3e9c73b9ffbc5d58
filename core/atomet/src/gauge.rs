//! Gauges and gauge families.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::MetricError;
use crate::hash::{self, IdentityHash};
use crate::ident::{Ident, Tag};
use crate::set::{Metric, Set};

/// A 64-bit float instrument.
///
/// A gauge is either directly settable or exclusively driven by a
/// zero-argument callback supplied at creation. The two modes are
/// mutually exclusive: on a callback gauge, [`get`](Gauge::get) invokes
/// the callback synchronously and direct mutation is a caller error,
/// which is logged and ignored rather than crashing.
pub struct Gauge {
    inner: GaugeInner,
}

enum GaugeInner {
    /// Directly settable value, stored as f64 bits.
    Value(AtomicU64),
    /// Observation callback; the gauge holds no value of its own.
    Callback(Box<dyn Fn() -> f64 + Send + Sync>),
}

impl Gauge {
    pub(crate) fn settable() -> Gauge {
        Gauge {
            inner: GaugeInner::Value(AtomicU64::new(0.0f64.to_bits())),
        }
    }

    pub(crate) fn with_callback(callback: Box<dyn Fn() -> f64 + Send + Sync>) -> Gauge {
        Gauge {
            inner: GaugeInner::Callback(callback),
        }
    }

    pub fn get(&self) -> f64 {
        match &self.inner {
            GaugeInner::Value(bits) => f64::from_bits(bits.load(Ordering::Relaxed)),
            GaugeInner::Callback(observe) => observe(),
        }
    }

    pub fn set(&self, value: f64) {
        match &self.inner {
            GaugeInner::Value(bits) => bits.store(value.to_bits(), Ordering::Relaxed),
            GaugeInner::Callback(_) => {
                log::warn!("ignoring set({value}) on a callback-driven gauge");
            }
        }
    }

    /// Adds `delta` to the gauge without losing concurrent updates.
    pub fn add(&self, delta: f64) {
        match &self.inner {
            GaugeInner::Value(bits) => {
                let mut current = bits.load(Ordering::Relaxed);
                loop {
                    let next = (f64::from_bits(current) + delta).to_bits();
                    match bits.compare_exchange_weak(
                        current,
                        next,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => break,
                        Err(actual) => current = actual,
                    }
                }
            }
            GaugeInner::Callback(_) => {
                log::warn!("ignoring add({delta}) on a callback-driven gauge");
            }
        }
    }

    pub fn sub(&self, delta: f64) {
        self.add(-delta);
    }

    pub fn inc(&self) {
        self.add(1.0);
    }

    pub fn dec(&self) {
        self.add(-1.0);
    }
}

impl fmt::Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            GaugeInner::Value(_) => f.debug_struct("Gauge").field("value", &self.get()).finish(),
            GaugeInner::Callback(_) => f.debug_struct("Gauge").field("callback", &"..").finish(),
        }
    }
}

/// Panics on instrument-kind mismatch, which is a programming error (two
/// call sites used the same identity for different kinds).
fn expect_gauge(metric: Metric, family: &str) -> Arc<Gauge> {
    match metric {
        Metric::Gauge(g) => g,
        other => panic!(
            "metric {family:?} is already registered as a {}",
            other.kind()
        ),
    }
}

impl Set {
    /// Registers and returns a new directly-settable gauge.
    ///
    /// # Errors
    /// Same contract as [`new_counter`](Set::new_counter).
    pub fn new_gauge(&self, family: &str, tags: &[&str]) -> Result<Arc<Gauge>, MetricError> {
        let family = Ident::family(family)?;
        let tags = Tag::from_flat(tags)?;
        self.new_gauge_with(family, tags)
    }

    /// Pre-validated registration path for a directly-settable gauge.
    pub fn new_gauge_with(&self, family: Ident, tags: Vec<Tag>) -> Result<Arc<Gauge>, MetricError> {
        let gauge = Arc::new(Gauge::settable());
        self.register(family, tags, Metric::Gauge(Arc::clone(&gauge)))?;
        Ok(gauge)
    }

    /// Registers and returns a gauge that calls `observe` to obtain its
    /// value. Direct mutation of the returned gauge is ignored.
    ///
    /// # Errors
    /// Same contract as [`new_counter`](Set::new_counter).
    pub fn new_gauge_fn(
        &self,
        family: &str,
        observe: impl Fn() -> f64 + Send + Sync + 'static,
        tags: &[&str],
    ) -> Result<Arc<Gauge>, MetricError> {
        let family = Ident::family(family)?;
        let tags = Tag::from_flat(tags)?;
        let gauge = Arc::new(Gauge::with_callback(Box::new(observe)));
        self.register(family, tags, Metric::Gauge(Arc::clone(&gauge)))?;
        Ok(gauge)
    }

    /// Returns the directly-settable gauge registered under the given
    /// identity, creating it if absent. Same double-checked protocol and
    /// contract as [`get_or_create_counter`](Set::get_or_create_counter).
    pub fn get_or_create_gauge(
        &self,
        family: &str,
        tags: &[&str],
    ) -> Result<Arc<Gauge>, MetricError> {
        if tags.len() % 2 != 0 {
            return Err(MetricError::MalformedTagList { len: tags.len() });
        }
        let key = hash::flat_hash(family, tags);
        if let Some(existing) = self.lookup(key) {
            return Ok(expect_gauge(existing, family));
        }
        let family_ident = Ident::family(family)?;
        let tags = Tag::from_flat(tags)?;
        let fresh = Arc::new(Gauge::settable());
        let metric = self.insert_or_existing(key, family_ident, tags, Metric::Gauge(fresh));
        Ok(expect_gauge(metric, family))
    }
}

/// A gauge family: a metric family bound to its label names but not yet
/// to values. See [`CounterVec`](crate::CounterVec) for the protocol.
///
/// Families of callback gauges are not offered: a per-combination
/// callback has no useful meaning, so vec members are always directly
/// settable.
pub struct GaugeVec {
    set: Arc<Set>,
    family: Ident,
    labels: Box<[Ident]>,
    partial: IdentityHash,
}

impl GaugeVec {
    /// Creates a gauge family bound to `set`. Same contract as
    /// [`CounterVec::new`](crate::CounterVec::new).
    pub fn new(set: &Arc<Set>, family: &str, labels: &[&str]) -> Result<GaugeVec, MetricError> {
        let family = Ident::family(family)?;
        let labels: Vec<Ident> = labels.iter().map(|l| Ident::new(l)).collect::<Result<_, _>>()?;
        let partial = hash::partial_hash(&family, &labels);
        Ok(GaugeVec {
            set: Arc::clone(set),
            family,
            labels: labels.into(),
            partial,
        })
    }

    /// Returns the gauge for this combination of label values, creating
    /// it if absent. Same contract as
    /// [`CounterVec::with_label_values`](crate::CounterVec::with_label_values).
    pub fn with_label_values(&self, values: &[&str]) -> Result<Arc<Gauge>, MetricError> {
        if values.len() != self.labels.len() {
            return Err(MetricError::LabelCountMismatch {
                expected: self.labels.len(),
                actual: values.len(),
            });
        }
        let key = hash::finish_hash(self.partial, values);
        if let Some(existing) = self.set.lookup(key) {
            return Ok(expect_gauge(existing, self.family.as_str()));
        }
        let tags: Vec<Tag> = self
            .labels
            .iter()
            .zip(values)
            .map(|(label, value)| Ok(Tag::new(label.clone(), Ident::value(value)?)))
            .collect::<Result<_, _>>()?;
        let fresh = Arc::new(Gauge::settable());
        let metric =
            self.set
                .insert_or_existing(key, self.family.clone(), tags, Metric::Gauge(fresh));
        Ok(expect_gauge(metric, self.family.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::MetricError;

    #[test]
    fn gauge_serial() {
        let set = Set::new();
        let g = set.new_gauge("GaugeSerial", &[]).unwrap();
        assert_eq!(g.get(), 0.0);
        g.set(1.5);
        assert_eq!(g.get(), 1.5);
        g.add(0.25);
        assert_eq!(g.get(), 1.75);
        g.sub(0.75);
        assert_eq!(g.get(), 1.0);
        g.inc();
        g.dec();
        assert_eq!(g.get(), 1.0);
    }

    #[test]
    fn callback_gauge_observes() {
        let _ = env_logger::builder().is_test(true).try_init();

        let set = Set::new();
        let g = set.new_gauge_fn("process_start_time", || 1234.5, &[]).unwrap();
        assert_eq!(g.get(), 1234.5);

        // Direct mutation is a caller error: logged, ignored, no crash.
        g.set(0.0);
        g.add(1.0);
        assert_eq!(g.get(), 1234.5);
    }

    #[test]
    fn new_gauge_duplicate() {
        let set = Set::new();
        set.new_gauge("dup_gauge", &[]).unwrap();
        assert!(matches!(
            set.new_gauge("dup_gauge", &[]),
            Err(MetricError::DuplicateRegistration { .. })
        ));
    }

    #[test]
    fn get_or_create_gauge_distinguishes_tags() {
        let set = Set::new();
        set.get_or_create_gauge("g", &[]).unwrap().set(1.0);
        set.get_or_create_gauge("g", &["a", "1"]).unwrap().set(2.0);
        assert_eq!(set.get_or_create_gauge("g", &[]).unwrap().get(), 1.0);
        assert_eq!(
            set.get_or_create_gauge("g", &["a", "1"]).unwrap().get(),
            2.0
        );
    }

    #[test]
    fn odd_tag_list_on_existing_gauge_errors() {
        let set = Set::new();
        set.new_gauge("bare_gauge", &[]).unwrap().set(7.0);
        assert!(matches!(
            set.get_or_create_gauge("bare_gauge", &["orphan_label"]),
            Err(MetricError::MalformedTagList { len: 1 })
        ));
        assert_eq!(set.get_or_create_gauge("bare_gauge", &[]).unwrap().get(), 7.0);
    }

    #[test]
    #[should_panic(expected = "already registered as a counter")]
    fn kind_mismatch_panics() {
        let set = Set::new();
        set.new_counter("mixed_kind_gauge", &[]).unwrap();
        let _ = set.get_or_create_gauge("mixed_kind_gauge", &[]);
    }

    #[test]
    fn gauge_vec() {
        let set = Arc::new(Set::new());
        let vec = GaugeVec::new(&set, "temperature", &["sensor"]).unwrap();
        vec.with_label_values(&["cpu"]).unwrap().set(54.5);
        vec.with_label_values(&["gpu"]).unwrap().set(47.0);
        assert_eq!(vec.with_label_values(&["cpu"]).unwrap().get(), 54.5);
        assert_eq!(vec.with_label_values(&["gpu"]).unwrap().get(), 47.0);
    }

    #[test]
    fn gauge_add_concurrent() {
        const THREADS: usize = 64;
        const INNER: usize = 100;

        let set = Set::new();
        let g = set.new_gauge("concurrent_gauge", &[]).unwrap();
        std::thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    for _ in 0..INNER {
                        g.add(1.0);
                    }
                });
            }
        });
        // f64 sums of small integers are exact, so no update may be lost.
        assert_eq!(g.get(), (THREADS * INNER) as f64);
    }
}
