//! Interned, validated identifiers and tags.
//!
//! Identifier strings (metric families, tag labels, tag values) are
//! deduplicated through a process-wide cache so that repeated use of the
//! same content costs one lookup instead of one validation plus one
//! allocation. The cache holds only weak references: it never keeps an
//! identifier alive, it only lets live ones be found and reused. Once the
//! last owner of an identifier drops it, the string is reclaimed and the
//! stale cache slot is removed by the next caller that observes it.
//!
//! The grammar depends on the position the string is used in: families
//! and labels follow the strict identifier grammar (families may also
//! contain `:`), while tag values only exclude the characters that would
//! need escaping in the exposition format. The cache is shared across
//! positions, so the fast path re-checks the position fit of a cached
//! string; full grammar validation still happens only when a string is
//! first installed.
//!
//! Because of the interner, two [`Ident`]s built from equal content share
//! the same allocation for as long as any owner keeps it alive, and
//! comparing them is usually a pointer comparison. Code that constructs
//! identifier-like strings by other means must not rely on that.

use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::MetricError;
use crate::hash;

/// Process-wide identifier cache, keyed by the seeded content hash.
///
/// Key collisions are not disambiguated, like everywhere else in the
/// registry.
static IDENT_CACHE: LazyLock<DashMap<u64, Weak<str>>> = LazyLock::new(DashMap::new);

/// An interned, validated identifier.
///
/// What counts as valid depends on where the identifier is used:
/// - [`Ident::new`] (tag labels): non-empty, ASCII alphanumerics and
///   underscores, no leading digit.
/// - [`Ident::family`] (metric families): same, plus `:` as a namespace
///   separator.
/// - [`Ident::value`] (tag values): non-empty, anything except `"`, `\`
///   and newline, so exposition output needs no escaping. Digit-leading
///   values such as `"1"` or `"200"` are common and fine.
///
/// `Ident` is cheap to clone (it is a shared allocation) and can be kept
/// around to skip re-validation on hot registration paths.
#[derive(Debug, Clone)]
pub struct Ident(Arc<str>);

/// The position an identifier is interned for; selects the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Family,
    Label,
    Value,
}

impl Ident {
    /// Interns a tag label.
    ///
    /// # Errors
    /// Returns [`MetricError::InvalidIdentifier`] if `content` is empty or
    /// violates the identifier grammar.
    pub fn new(content: &str) -> Result<Ident, MetricError> {
        intern(content, Position::Label)
    }

    /// Interns a metric family name, which may contain `:`.
    ///
    /// # Errors
    /// Returns [`MetricError::InvalidIdentifier`] if `content` is empty or
    /// violates the identifier grammar.
    pub fn family(content: &str) -> Result<Ident, MetricError> {
        intern(content, Position::Family)
    }

    /// Interns a tag value.
    ///
    /// # Errors
    /// Returns [`MetricError::InvalidIdentifier`] if `content` is empty or
    /// contains `"`, `\` or a newline.
    pub fn value(content: &str) -> Result<Ident, MetricError> {
        intern(content, Position::Value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq for Ident {
    fn eq(&self, other: &Self) -> bool {
        // Interned idents of equal content share their allocation, so the
        // pointer comparison is the common case.
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for Ident {}

impl Hash for Ident {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Ident {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A (label, value) pair attached to a metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    label: Ident,
    value: Ident,
}

impl Tag {
    pub fn new(label: Ident, value: Ident) -> Tag {
        Tag { label, value }
    }

    pub fn label(&self) -> &Ident {
        &self.label
    }

    pub fn value(&self) -> &Ident {
        &self.value
    }

    /// Builds a tag set from a flat list of alternating label/value
    /// strings, e.g. `&["method", "get", "code", "200"]`.
    ///
    /// # Errors
    /// Returns [`MetricError::MalformedTagList`] if the list has odd
    /// length, and [`MetricError::InvalidIdentifier`] if a label or value
    /// violates its grammar.
    pub fn from_flat(flat: &[&str]) -> Result<Vec<Tag>, MetricError> {
        if flat.len() % 2 != 0 {
            return Err(MetricError::MalformedTagList { len: flat.len() });
        }
        flat.chunks_exact(2)
            .map(|pair| {
                Ok(Tag {
                    label: Ident::new(pair[0])?,
                    value: Ident::value(pair[1])?,
                })
            })
            .collect()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=\"{}\"", self.label, self.value)
    }
}

/// Looks `content` up in the cache, installing a validated copy on miss.
///
/// Grammar validation runs at most once per distinct live identifier:
/// the fast path only upgrades the cached weak reference and re-checks
/// the position fit, since the same content may have been interned for a
/// laxer position than the one requested now.
fn intern(content: &str, position: Position) -> Result<Ident, MetricError> {
    fn invalid(content: &str) -> MetricError {
        MetricError::InvalidIdentifier {
            name: content.to_owned(),
        }
    }

    if content.is_empty() {
        return Err(MetricError::InvalidIdentifier { name: String::new() });
    }
    let key = hash::content_hash(content);

    // Fast path: shared lookup, no shard write lock, no validation.
    if let Some(cached) = IDENT_CACHE.get(&key).map(|slot| slot.value().clone()) {
        if let Some(live) = cached.upgrade() {
            if !matches_position(&live, position) {
                return Err(invalid(content));
            }
            return Ok(Ident(live));
        }
        // The referenced string was dropped by its last owner. Remove the
        // stale slot (compare-and-remove: only if it still holds the weak
        // reference we observed) so dead entries do not accumulate.
        IDENT_CACHE.remove_if(&key, |_, slot| Weak::ptr_eq(slot, &cached));
    }

    // Slow path: validate and allocate outside any map lock. Concurrent
    // first-uses of the same content may each reach this point; the entry
    // below decides a single winner.
    if !matches_position(content, position) {
        return Err(invalid(content));
    }
    let mine: Arc<str> = Arc::from(content);

    match IDENT_CACHE.entry(key) {
        Entry::Vacant(slot) => {
            slot.insert(Arc::downgrade(&mine));
            Ok(Ident(mine))
        }
        Entry::Occupied(mut slot) => match slot.get().upgrade() {
            // Lost the install race: discard our allocation and share the
            // winner's, so equal content keeps meaning equal allocation.
            Some(winner) => {
                if !matches_position(&winner, position) {
                    return Err(invalid(content));
                }
                Ok(Ident(winner))
            }
            // The winner already decayed. The entry guard is exclusive, so
            // swapping our value in resolves the race without looping; a
            // decayed reference is never returned.
            None => {
                slot.insert(Arc::downgrade(&mine));
                Ok(Ident(mine))
            }
        },
    }
}

fn matches_position(content: &str, position: Position) -> bool {
    match position {
        // Values only exclude what the exposition format would have to
        // escape; digit-leading and punctuation-bearing values are fine.
        Position::Value => !content.bytes().any(|b| matches!(b, b'"' | b'\\' | b'\n')),
        Position::Family | Position::Label => {
            content.bytes().enumerate().all(|(i, b)| match b {
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => true,
                b'0'..=b'9' => i > 0,
                b':' => position == Position::Family,
                _ => false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn equal_content_shares_the_allocation() {
        let a = Ident::new("shared_ident_content").unwrap();
        let b = Ident::new("shared_ident_content").unwrap();
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert_eq!(a, b);
    }

    #[test]
    fn positions_share_the_cache() {
        let fam = Ident::family("plain_name").unwrap();
        let label = Ident::new("plain_name").unwrap();
        let value = Ident::value("plain_name").unwrap();
        assert!(Arc::ptr_eq(&fam.0, &label.0));
        assert!(Arc::ptr_eq(&fam.0, &value.0));
    }

    #[test]
    fn grammar_rejections() {
        for bad in ["", "9leading_digit", "has space", "dash-ed", "caf\u{e9}"] {
            assert!(matches!(
                Ident::new(bad),
                Err(MetricError::InvalidIdentifier { .. })
            ));
            assert!(matches!(
                Ident::family(bad),
                Err(MetricError::InvalidIdentifier { .. })
            ));
        }
    }

    #[test]
    fn values_accept_digit_leading_content() {
        for good in ["1", "200", "1.5", "us-east-1", "/api/v1", "caf\u{e9}"] {
            assert!(Ident::value(good).is_ok(), "{good:?} should be a valid value");
        }
    }

    #[test]
    fn values_reject_content_that_would_need_escaping() {
        for bad in ["", "quo\"te", "back\\slash", "new\nline"] {
            assert!(matches!(
                Ident::value(bad),
                Err(MetricError::InvalidIdentifier { .. })
            ));
        }
    }

    #[test]
    fn lax_value_does_not_become_a_label() {
        // Interned first under the value grammar, then requested for a
        // stricter position: the cached entry must not bypass the check.
        let v = Ident::value("1_value_then_label").unwrap();
        assert!(matches!(
            Ident::new("1_value_then_label"),
            Err(MetricError::InvalidIdentifier { .. })
        ));
        drop(v);
    }

    #[test]
    fn namespace_separator_is_family_only() {
        assert!(Ident::family("ns:metric_name").is_ok());
        assert!(matches!(
            Ident::new("ns:metric_name"),
            Err(MetricError::InvalidIdentifier { .. })
        ));
        // Also when the family was interned first and sits in the cache.
        assert!(matches!(
            Ident::new("ns:metric_name"),
            Err(MetricError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn accepts_underscores_and_digits_after_first() {
        for good in ["_private", "x", "a1_b2", "UPPER_case9"] {
            assert!(Ident::new(good).is_ok(), "{good:?} should be valid");
        }
    }

    #[test]
    fn reclaimed_ident_can_be_reinterned() {
        let content = "short_lived_ident";
        let first = Ident::new(content).unwrap();
        let watch = Arc::downgrade(&first.0);
        drop(first);
        assert!(watch.upgrade().is_none(), "cache must not keep idents alive");

        // The stale cache slot must not prevent or corrupt re-interning.
        let again = Ident::new(content).unwrap();
        assert_eq!(again.as_str(), content);
    }

    #[test]
    fn tags_from_flat_pairs() {
        let tags = Tag::from_flat(&["a", "1", "b", "2"]).unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].label().as_str(), "a");
        assert_eq!(tags[0].value().as_str(), "1");
        assert_eq!(tags[1].to_string(), "b=\"2\"");
    }

    #[test]
    fn odd_tag_list_is_malformed() {
        assert!(matches!(
            Tag::from_flat(&["only_a_label"]),
            Err(MetricError::MalformedTagList { len: 1 })
        ));
    }

    #[test]
    fn concurrent_first_use_yields_one_allocation() {
        let idents: Vec<Ident> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..32)
                .map(|_| s.spawn(|| Ident::new("raced_ident_content").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let first = &idents[0];
        for other in &idents[1..] {
            assert!(Arc::ptr_eq(&first.0, &other.0));
        }
    }
}
