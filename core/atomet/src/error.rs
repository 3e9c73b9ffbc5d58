//! Errors returned by validation and registration operations.

use thiserror::Error;

/// Error which can occur when validating identifiers or registering metrics.
///
/// Every variant signals a mistake at the calling site, not a transient
/// condition: retrying the same call with the same arguments fails again.
/// The idempotent `get_or_create_*` and `with_label_values` paths never
/// report [`DuplicateRegistration`](MetricError::DuplicateRegistration);
/// internal races (identifier cache installs, concurrent registrations of
/// the same identity) are resolved internally and never surface as errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricError {
    /// The identifier is empty or violates the grammar of its position.
    ///
    /// Metric families and tag labels contain ASCII alphanumerics and
    /// underscores and do not start with a digit; families may also
    /// contain `:` as a namespace separator. Tag values are laxer: any
    /// non-empty string without `"`, `\` or newline.
    #[error("invalid identifier: {name:?}")]
    InvalidIdentifier {
        /// The rejected content.
        name: String,
    },

    /// A flat tag list must alternate label and value strings.
    #[error("malformed tag list: {len} strings do not form label/value pairs")]
    MalformedTagList {
        /// Length of the rejected list.
        len: usize,
    },

    /// The number of values passed to `with_label_values` does not match
    /// the number of labels the vec was created with.
    #[error("label/value count mismatch: vec has {expected} labels, got {actual} values")]
    LabelCountMismatch {
        /// Number of labels of the vec.
        expected: usize,
        /// Number of values supplied by the caller.
        actual: usize,
    },

    /// A metric with the same family and tags is already registered in
    /// this set.
    ///
    /// Only the strict `new_*` constructors report this; it means two call
    /// sites tried to own the same identity.
    #[error("duplicate registration of metric {family:?}")]
    DuplicateRegistration {
        /// Family name of the conflicting metric.
        family: String,
    },
}
