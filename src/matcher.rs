//! Seam to the pattern-matching engine
//!
//! The matcher owns pattern compilation and matching. It tells us which
//! paths its patterns refer to, and it accepts the field records we produce.

use crate::error::Result;
use crate::flatten::Flattener;
use crate::index::PathIndex;
use crate::types::FieldRecord;
use std::sync::Arc;

/// A pattern-matching engine fed with flattened fields
pub trait Matcher {
    /// Identifier of a matched pattern
    type Id;

    /// Every path referenced by the registered patterns
    fn paths(&self) -> Vec<Vec<u8>>;

    /// Identifiers of the patterns satisfied by `fields`
    fn matches_for_fields(&self, fields: &[FieldRecord]) -> Vec<Self::Id>;
}

impl PathIndex {
    pub fn from_matcher<M: Matcher + ?Sized>(matcher: &M) -> Result<Self> {
        Self::from_paths(matcher.paths())
    }
}

impl Flattener {
    pub fn from_matcher<M: Matcher + ?Sized>(matcher: &M) -> Result<Self> {
        Ok(Flattener::new(Arc::new(PathIndex::from_matcher(matcher)?)))
    }
}

/// Flatten one document and hand its fields to `matcher`
pub fn matches_for_document<M: Matcher + ?Sized>(
    flattener: &mut Flattener,
    matcher: &M,
    document: &[u8],
) -> Result<Vec<M::Id>> {
    let fields = flattener.flatten(document)?;
    Ok(matcher.matches_for_fields(fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Matches when any field carries the expected raw value
    struct ValueMatcher {
        path: &'static str,
        value: &'static str,
    }

    impl Matcher for ValueMatcher {
        type Id = &'static str;

        fn paths(&self) -> Vec<Vec<u8>> {
            vec![self.path.as_bytes().to_vec()]
        }

        fn matches_for_fields(&self, fields: &[FieldRecord]) -> Vec<&'static str> {
            fields
                .iter()
                .filter(|f| f.path.as_bytes() == self.path.as_bytes() && f.value == self.value.as_bytes())
                .map(|_| self.value)
                .take(1)
                .collect()
        }
    }

    #[test]
    fn test_matches_for_document() {
        let matcher = ValueMatcher {
            path: "properties\nSTREET",
            value: "\"CRANLEIGH\"",
        };
        let mut fj = Flattener::from_matcher(&matcher).unwrap();

        let hit = matches_for_document(
            &mut fj,
            &matcher,
            br#"{"type":"Feature","properties":{"STREET":"CRANLEIGH"}}"#,
        )
        .unwrap();
        assert_eq!(hit, vec!["\"CRANLEIGH\""]);

        let miss = matches_for_document(&mut fj, &matcher, br#"{"properties":{"STREET":"BEACH"}}"#)
            .unwrap();
        assert!(miss.is_empty());
    }
}
