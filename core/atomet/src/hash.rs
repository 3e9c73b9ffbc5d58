//! Seeded identity hashing, with a precompute/finish split for vecs.
//!
//! A metric identity is the tuple (family, tag set). It maps to a single
//! `u64` by folding the family, then each tag label, then each tag value,
//! in call order. Labels are folded before values so that a vec can
//! precompute the family+labels part once and complete it per call with
//! the values alone, yielding the same hash as the one-shot computation.
//!
//! All hashes in the process share one random seed chosen at first use, so
//! they are not stable across restarts or processes; that is fine for an
//! in-process registry.
//!
//! Hash collisions are not disambiguated: two distinct identities that
//! collide are treated as the same metric. This is a deliberate speed
//! trade-off, inherited from the registry design.

use std::hash::BuildHasher;
use std::sync::LazyLock;

use rustc_hash::FxRandomState;

use crate::ident::{Ident, Tag};

/// Process-wide seed for identity and identifier-cache hashes.
static SEED: LazyLock<FxRandomState> = LazyLock::new(FxRandomState::new);

/// Multiplier used to mix each folded component (the fxhash constant).
const FOLD: u64 = 0x51_7c_c1_b7_27_22_0a_95;

/// Accumulated hash over the string components of a metric identity.
///
/// The state is `Copy` on purpose: a vec precomputes the family+labels part
/// once at construction, and every `with_label_values` call folds its
/// values into its own copy. The precomputed state is never mutated after
/// construction, so unboundedly many calls can share it without
/// synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IdentityHash(u64);

impl IdentityHash {
    pub(crate) fn new() -> Self {
        IdentityHash(0)
    }

    /// Folds one string component into the state.
    ///
    /// Folding is order-sensitive: the same components in a different
    /// order produce a different hash. Tag order is caller-significant
    /// throughout the registry.
    pub(crate) fn write(&mut self, component: &str) {
        self.0 = (self.0.rotate_left(5) ^ SEED.hash_one(component)).wrapping_mul(FOLD);
    }

    pub(crate) fn finish(self) -> u64 {
        self.0
    }
}

/// Hash of the content of a single identifier, used as the interner cache
/// key. Shares the process seed with identity hashing.
pub(crate) fn content_hash(content: &str) -> u64 {
    SEED.hash_one(content)
}

/// Hash of a full identity given as raw strings: the family followed by a
/// flat list of alternating label/value strings.
///
/// Must stay bit-identical to [`identity_hash`] called with the interned
/// equivalent of the same strings, and to [`finish_hash`] over the
/// matching precomputed state: the optimistic-read paths hash raw caller
/// input, while registration hashes validated tags, and all of them must
/// find the same map slot. Callers must reject odd-length lists before
/// hashing: pair-wise folding would otherwise map an odd list onto the
/// identity of its even prefix.
pub(crate) fn flat_hash(family: &str, flat_tags: &[&str]) -> u64 {
    let mut h = IdentityHash::new();
    h.write(family);
    for pair in flat_tags.chunks_exact(2) {
        h.write(pair[0]);
    }
    for pair in flat_tags.chunks_exact(2) {
        h.write(pair[1]);
    }
    h.finish()
}

/// Hash of a full identity given as validated components.
pub(crate) fn identity_hash(family: &Ident, tags: &[Tag]) -> u64 {
    let mut h = IdentityHash::new();
    h.write(family.as_str());
    for tag in tags {
        h.write(tag.label().as_str());
    }
    for tag in tags {
        h.write(tag.value().as_str());
    }
    h.finish()
}

/// Precomputes the family+labels part of a vec identity.
pub(crate) fn partial_hash(family: &Ident, labels: &[Ident]) -> IdentityHash {
    let mut h = IdentityHash::new();
    h.write(family.as_str());
    for label in labels {
        h.write(label.as_str());
    }
    h
}

/// Completes a precomputed state with per-call values.
///
/// Values are folded into a copy of `partial`; the precomputed state
/// itself is left untouched. For labels `L` and values `V`,
/// `finish_hash(partial_hash(F, L), V)` is bit-identical to
/// [`identity_hash`] of the full zipped tag set.
pub(crate) fn finish_hash(partial: IdentityHash, values: &[&str]) -> u64 {
    let mut h = partial;
    for value in values {
        h.write(value);
    }
    h.finish()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::{assert_eq, assert_ne};

    use super::*;

    fn idents(parts: &[&str]) -> Vec<Ident> {
        parts.iter().map(|p| Ident::new(p).unwrap()).collect()
    }

    #[test]
    fn flat_and_interned_hashes_agree() {
        let family = Ident::family("requests_total").unwrap();
        let tags = Tag::from_flat(&["method", "get", "code", "200"]).unwrap();
        assert_eq!(
            flat_hash("requests_total", &["method", "get", "code", "200"]),
            identity_hash(&family, &tags),
        );
    }

    #[test]
    fn tagless_hashes_agree() {
        let family = Ident::family("uptime").unwrap();
        assert_eq!(flat_hash("uptime", &[]), identity_hash(&family, &[]));
    }

    #[test]
    fn partial_finish_matches_one_shot_hash() {
        let family = Ident::family("foo").unwrap();
        let labels = idents(&["a", "b"]);
        let partial = partial_hash(&family, &labels);

        let finished = finish_hash(partial, &["1", "2"]);
        assert_eq!(finished, flat_hash("foo", &["a", "1", "b", "2"]));

        let tags = Tag::from_flat(&["a", "1", "b", "2"]).unwrap();
        assert_eq!(finished, identity_hash(&family, &tags));

        // The precomputed state is untouched and reusable.
        assert_eq!(finish_hash(partial, &["1", "2"]), finished);
        assert_ne!(finish_hash(partial, &["1", "3"]), finished);
    }

    #[test]
    fn tag_order_is_significant() {
        assert_ne!(
            flat_hash("foo", &["a", "1", "b", "2"]),
            flat_hash("foo", &["b", "2", "a", "1"]),
        );
    }

    #[test]
    fn distinct_identities_hash_apart() {
        assert_ne!(flat_hash("foo", &[]), flat_hash("bar", &[]));
        assert_ne!(flat_hash("foo", &[]), flat_hash("foo", &["a", "1"]));
        assert_ne!(flat_hash("foo", &["a", "1"]), flat_hash("foo", &["a", "2"]));
    }
}
