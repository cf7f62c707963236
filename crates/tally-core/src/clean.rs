//! Allowed-character policy for metric names and tags.
//!
//! A name may contain letters (Unicode general category `L`), ASCII
//! digits, and the punctuation `-`, `_`, `.` and `/`. Marks, letter-like
//! numerals and non-ASCII digits are outside the set. Names are never
//! rewritten on the way in: anything [`clean`] would have to alter is
//! rejected.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{NameRole, ValidationError};
use crate::tags::TagSet;

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}0-9_./-]+").expect("constant pattern"));

/// Strip every character outside the allowed set.
pub fn clean(s: &str) -> String {
    DISALLOWED.replace_all(s, "").into_owned()
}

/// Fail if `s` is empty or [`clean`] would change it.
pub fn check_clean(s: &str, role: NameRole) -> Result<(), ValidationError> {
    if s.is_empty() || DISALLOWED.is_match(s) {
        return Err(ValidationError {
            role,
            value: s.to_string(),
        });
    }
    Ok(())
}

/// Validate a metric name and every key and value of its tag set.
pub fn check_series(metric: &str, tags: &TagSet) -> Result<(), ValidationError> {
    check_clean(metric, NameRole::Metric)?;
    check_tags(tags)
}

/// Validate every key and value of a tag set.
pub fn check_tags(tags: &TagSet) -> Result<(), ValidationError> {
    for (k, v) in tags.iter() {
        check_clean(k, NameRole::TagKey)?;
        check_clean(v, NameRole::TagValue)?;
    }
    Ok(())
}
