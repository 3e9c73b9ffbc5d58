//! Counters and counter families.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::MetricError;
use crate::hash::{self, IdentityHash};
use crate::ident::{Ident, Tag};
use crate::set::{Metric, Set};

/// A 64-bit integer instrument.
///
/// All operations are atomic: any number of threads can mutate the same
/// counter without lost updates. No ordering of increments across threads
/// is guaranteed beyond that.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn add(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Panics on instrument-kind mismatch, which is a programming error (two
/// call sites used the same identity for different kinds).
fn expect_counter(metric: Metric, family: &str) -> Arc<Counter> {
    match metric {
        Metric::Counter(c) => c,
        other => panic!(
            "metric {family:?} is already registered as a {}",
            other.kind()
        ),
    }
}

impl Set {
    /// Registers and returns a new counter with the given family and tags.
    ///
    /// Tags are flat alternating label/value strings, for instance
    /// `set.new_counter("family", &["label1", "value1", "label2", "value2"])`.
    ///
    /// # Errors
    /// Fails with [`MetricError::DuplicateRegistration`] if the identity is
    /// already registered, [`MetricError::InvalidIdentifier`] or
    /// [`MetricError::MalformedTagList`] on bad input.
    pub fn new_counter(&self, family: &str, tags: &[&str]) -> Result<Arc<Counter>, MetricError> {
        let family = Ident::family(family)?;
        let tags = Tag::from_flat(tags)?;
        self.new_counter_with(family, tags)
    }

    /// Pre-validated registration path: the caller interned the family and
    /// tags once and reuses them across registrations.
    pub fn new_counter_with(
        &self,
        family: Ident,
        tags: Vec<Tag>,
    ) -> Result<Arc<Counter>, MetricError> {
        let counter = Arc::new(Counter::default());
        self.register(family, tags, Metric::Counter(Arc::clone(&counter)))?;
        Ok(counter)
    }

    /// Returns the counter registered under the given identity, creating
    /// it if absent. Never fails on duplicates: concurrent callers with
    /// the same identity all receive the same instrument.
    ///
    /// Prefer [`new_counter`](Set::new_counter) plus a kept handle when
    /// performance is critical: the handle bypasses the registry entirely.
    ///
    /// # Errors
    /// Fails with [`MetricError::InvalidIdentifier`] or
    /// [`MetricError::MalformedTagList`] on bad input.
    ///
    /// # Panics
    /// Panics if the identity is already registered as another instrument
    /// kind.
    pub fn get_or_create_counter(
        &self,
        family: &str,
        tags: &[&str],
    ) -> Result<Arc<Counter>, MetricError> {
        // An odd list must fail before hashing: hashing pairs, it would
        // otherwise collapse onto the identity of its even prefix.
        if tags.len() % 2 != 0 {
            return Err(MetricError::MalformedTagList { len: tags.len() });
        }
        let key = hash::flat_hash(family, tags);
        if let Some(existing) = self.lookup(key) {
            return Ok(expect_counter(existing, family));
        }
        // Miss: validate and allocate outside the lock, then re-check.
        let family_ident = Ident::family(family)?;
        let tags = Tag::from_flat(tags)?;
        let fresh = Arc::new(Counter::default());
        let metric = self.insert_or_existing(key, family_ident, tags, Metric::Counter(fresh));
        Ok(expect_counter(metric, family))
    }
}

/// A counter family: a metric family bound to its label names but not yet
/// to values.
///
/// The family and labels are validated once, at construction, and the
/// corresponding hash state is precomputed; each
/// [`with_label_values`](CounterVec::with_label_values) call completes a
/// copy of that state with its values. The vec owns no instruments, it
/// only delegates to its parent [`Set`].
pub struct CounterVec {
    set: Arc<Set>,
    family: Ident,
    labels: Box<[Ident]>,
    partial: IdentityHash,
}

impl CounterVec {
    /// Creates a counter family bound to `set`. No entry is inserted until
    /// [`with_label_values`](CounterVec::with_label_values) is called.
    ///
    /// # Errors
    /// Fails with [`MetricError::InvalidIdentifier`] if the family or a
    /// label violates the identifier grammar.
    pub fn new(set: &Arc<Set>, family: &str, labels: &[&str]) -> Result<CounterVec, MetricError> {
        let family = Ident::family(family)?;
        let labels: Vec<Ident> = labels.iter().map(|l| Ident::new(l)).collect::<Result<_, _>>()?;
        let partial = hash::partial_hash(&family, &labels);
        Ok(CounterVec {
            set: Arc::clone(set),
            family,
            labels: labels.into(),
            partial,
        })
    }

    /// Returns the counter for this combination of label values, creating
    /// it if absent. Values are paired positionally with the vec's labels.
    ///
    /// # Errors
    /// Fails with [`MetricError::LabelCountMismatch`] if the value count
    /// differs from the label count, or
    /// [`MetricError::InvalidIdentifier`] if a value is empty or contains
    /// characters the exposition format would have to escape.
    ///
    /// # Panics
    /// Panics if the identity is already registered as another instrument
    /// kind.
    pub fn with_label_values(&self, values: &[&str]) -> Result<Arc<Counter>, MetricError> {
        if values.len() != self.labels.len() {
            return Err(MetricError::LabelCountMismatch {
                expected: self.labels.len(),
                actual: values.len(),
            });
        }
        let key = hash::finish_hash(self.partial, values);
        if let Some(existing) = self.set.lookup(key) {
            return Ok(expect_counter(existing, self.family.as_str()));
        }
        // Miss: intern the values and build the tag set outside the lock.
        let tags: Vec<Tag> = self
            .labels
            .iter()
            .zip(values)
            .map(|(label, value)| Ok(Tag::new(label.clone(), Ident::value(value)?)))
            .collect::<Result<_, _>>()?;
        let fresh = Arc::new(Counter::default());
        let metric =
            self.set
                .insert_or_existing(key, self.family.clone(), tags, Metric::Counter(fresh));
        Ok(expect_counter(metric, self.family.as_str()))
    }
}
