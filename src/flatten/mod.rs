//! Guided flattening - extract registered fields from raw JSON in one pass
//!
//! A [`Flattener`] walks a document top-down, consulting its [`PathIndex`]
//! at every object key to decide whether to descend, extract or skip.
//! Nothing outside the registered paths is parsed beyond finding where it
//! ends.
//!
//! ## Early termination
//!
//! Each object level counts down the children and leaves the index expects
//! there. Once both reach zero the remaining keys are not examined: at the
//! top level traversal stops outright, below it the rest of the object is
//! skipped structurally so the parent can carry on.

pub mod writer;

pub use writer::RecordWriter;

use crate::decoder::{Decoder, Elements, Kind};
use crate::error::{DecodeError, Result};
use crate::index::{NodeRef, PathIndex};
use crate::types::{ArrayPos, ArrayTrail, FieldRecord, FlattenConfig, Path};
use std::sync::Arc;
use tracing::{debug, trace};

/// What array elements are matched against
#[derive(Clone, Copy)]
enum Target<'i> {
    /// Scalars inside the array are values of this path
    Leaf(&'i Path),
    /// Objects inside the array are traversed against this node
    Node(NodeRef<'i>),
}

/// Extracts field records for the paths in a shared [`PathIndex`].
///
/// A flattener owns mutable scratch state and handles one document at a
/// time. For concurrent use give every worker its own clone: clones share
/// the index but start with empty scratch.
pub struct Flattener {
    index: Arc<PathIndex>,
    config: FlattenConfig,
    fields: Vec<FieldRecord>,
    trail: Vec<ArrayPos>,
    array_count: u32,
}

impl Clone for Flattener {
    fn clone(&self) -> Self {
        Flattener::with_config(Arc::clone(&self.index), self.config.clone())
    }
}

impl Flattener {
    pub fn new(index: Arc<PathIndex>) -> Self {
        Self::with_config(index, FlattenConfig::default())
    }

    pub fn with_config(index: Arc<PathIndex>, config: FlattenConfig) -> Self {
        Flattener {
            index,
            config,
            fields: Vec::new(),
            trail: Vec::new(),
            array_count: 0,
        }
    }

    pub fn index(&self) -> &Arc<PathIndex> {
        &self.index
    }

    /// Records produced by the last call to [`flatten`](Self::flatten).
    /// After a failed call these are the records found before the error.
    pub fn fields(&self) -> &[FieldRecord] {
        &self.fields
    }

    /// Move the last output out of the flattener
    pub fn take_fields(&mut self) -> Vec<FieldRecord> {
        std::mem::take(&mut self.fields)
    }

    /// Clear all per-document state. The index is untouched.
    pub fn reset(&mut self) {
        self.array_count = 0;
        self.fields.clear();
        self.trail.clear();
    }

    /// Flatten one document into field records, in document order.
    ///
    /// On error the records produced so far remain available through
    /// [`fields`](Self::fields).
    pub fn flatten(&mut self, document: &[u8]) -> Result<&[FieldRecord]> {
        self.reset();

        let index = Arc::clone(&self.index);
        let mut dec = Decoder::new(document);

        match self.traverse_root(&mut dec, index.root()) {
            Ok(()) => Ok(&self.fields),
            Err(err) => {
                debug!(error = %err, partial = self.fields.len(), "flatten aborted");
                Err(err.into())
            }
        }
    }

    fn traverse_root(
        &mut self,
        dec: &mut Decoder<'_>,
        root: NodeRef<'_>,
    ) -> std::result::Result<(), DecodeError> {
        if dec.peek()? != Kind::Object {
            return Err(DecodeError::NotAnObject {
                offset: dec.offset(),
            });
        }
        self.traverse_object(dec, root, 1)
    }

    /// Traverse one object against `node`. `depth` 1 is the document root.
    fn traverse_object(
        &mut self,
        dec: &mut Decoder<'_>,
        node: NodeRef<'_>,
        depth: usize,
    ) -> std::result::Result<(), DecodeError> {
        self.check_depth(dec, depth)?;

        let mut remaining_fields = node.leaf_count();
        let mut remaining_children = node.child_count();
        let mut members = dec.object()?;

        loop {
            if remaining_fields == 0 && remaining_children == 0 {
                trace!(depth, "all paths at this level resolved");
                if depth == 1 {
                    return Ok(());
                }
                return dec.finish_object(members);
            }

            let Some(key) = members.next_key(dec)? else {
                return Ok(());
            };

            if let Some(path) = node.lookup_leaf(&key) {
                if self.extract_field(dec, path, depth)? {
                    remaining_fields = remaining_fields.saturating_sub(1);
                }
                continue;
            }

            if let Some(child) = node.lookup_child(&key) {
                match dec.peek()? {
                    Kind::Object => {
                        trace!(key = %key, "descending into object");
                        self.traverse_object(dec, child, depth + 1)?;
                        remaining_children = remaining_children.saturating_sub(1);
                        continue;
                    }
                    Kind::Array => {
                        trace!(key = %key, "descending into array of objects");
                        self.traverse_array(dec, Target::Node(child), depth + 1)?;
                        remaining_children = remaining_children.saturating_sub(1);
                        continue;
                    }
                    _ => {}
                }
            }

            dec.skip()?;
        }
    }

    /// Extract the value under a leaf key. Returns `false` when the value
    /// is an object, which leaves the leaf unresolved.
    fn extract_field(
        &mut self,
        dec: &mut Decoder<'_>,
        path: &Path,
        depth: usize,
    ) -> std::result::Result<bool, DecodeError> {
        match dec.peek()? {
            Kind::Array => self.traverse_array(dec, Target::Leaf(path), depth + 1)?,
            // nothing registered below a leaf
            Kind::Object => {
                dec.skip()?;
                return Ok(false);
            }
            _ => {
                let raw = dec.raw_scalar()?;
                self.push_field(path, raw);
            }
        }
        Ok(true)
    }

    fn traverse_array(
        &mut self,
        dec: &mut Decoder<'_>,
        target: Target<'_>,
        depth: usize,
    ) -> std::result::Result<(), DecodeError> {
        self.check_depth(dec, depth)?;
        let mut elements = dec.array()?;

        self.enter_array();
        let result = self.traverse_elements(dec, &mut elements, target, depth);
        self.leave_array();

        result
    }

    fn traverse_elements(
        &mut self,
        dec: &mut Decoder<'_>,
        elements: &mut Elements,
        target: Target<'_>,
        depth: usize,
    ) -> std::result::Result<(), DecodeError> {
        while elements.next(dec)? {
            self.step_array_element();

            match (dec.peek()?, target) {
                (Kind::Array, _) => self.traverse_array(dec, target, depth + 1)?,
                (Kind::Object, Target::Node(node)) => self.traverse_object(dec, node, depth + 1)?,
                (Kind::Object, Target::Leaf(_)) | (_, Target::Node(_)) => dec.skip()?,
                (_, Target::Leaf(path)) => {
                    let raw = dec.raw_scalar()?;
                    self.push_field(path, raw);
                }
            }
        }

        Ok(())
    }

    fn check_depth(
        &self,
        dec: &Decoder<'_>,
        depth: usize,
    ) -> std::result::Result<(), DecodeError> {
        if depth > self.config.max_nesting {
            return Err(DecodeError::NestingTooDeep {
                offset: dec.offset(),
                limit: self.config.max_nesting,
            });
        }
        Ok(())
    }

    fn push_field(&mut self, path: &Path, raw: &[u8]) {
        self.fields.push(FieldRecord {
            path: path.clone(),
            value: raw.to_vec(),
            array_trail: ArrayTrail::from_slice(&self.trail),
        });
    }

    fn enter_array(&mut self) {
        self.array_count += 1;
        self.trail.push(ArrayPos::new(self.array_count, 0));
    }

    fn leave_array(&mut self) {
        self.trail.pop();
    }

    fn step_array_element(&mut self) {
        if let Some(last) = self.trail.last_mut() {
            last.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn flattener(paths: &[&str]) -> Flattener {
        Flattener::new(Arc::new(PathIndex::from_paths(paths).unwrap()))
    }

    type Row = (String, String, Vec<(u32, u32)>);

    fn row(path: &str, value: &str, trail: &[(u32, u32)]) -> Row {
        (path.to_string(), value.to_string(), trail.to_vec())
    }

    fn summary(fields: &[FieldRecord]) -> Vec<Row> {
        fields
            .iter()
            .map(|f| {
                (
                    f.path.to_string(),
                    f.value_str().into_owned(),
                    f.array_trail.iter().map(|p| (p.array, p.pos)).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_simple_object() {
        let mut fj = flattener(&["properties\nSTREET"]);
        let fields = fj
            .flatten(br#"{"properties":{"STREET":"CRANLEIGH","ZIP":"94103"}}"#)
            .unwrap();

        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].path.as_bytes(), b"properties\nSTREET");
        assert_eq!(fields[0].value, br#""CRANLEIGH""#);
        assert!(fields[0].array_trail.is_empty());
    }

    #[test]
    fn test_nested_coordinates() {
        let mut fj = flattener(&["geometry\ncoordinates"]);
        let fields = fj
            .flatten(br#"{"geometry":{"coordinates":[[1.0,2.0],[3.0,4.0]]}}"#)
            .unwrap();

        let path = "geometry\ncoordinates";
        assert_eq!(
            summary(fields),
            vec![
                row(path, "1.0", &[(1, 1), (2, 1)]),
                row(path, "2.0", &[(1, 1), (2, 2)]),
                row(path, "3.0", &[(1, 2), (3, 1)]),
                row(path, "4.0", &[(1, 2), (3, 2)]),
            ]
        );
    }

    #[test]
    fn test_mixed_nested_array_trail() {
        let mut fj = flattener(&["a"]);
        let fields = fj.flatten(br#"{"a":[1,[2,3],4]}"#).unwrap();

        assert_eq!(
            summary(fields),
            vec![
                row("a", "1", &[(1, 1)]),
                row("a", "2", &[(1, 2), (2, 1)]),
                row("a", "3", &[(1, 2), (2, 2)]),
                row("a", "4", &[(1, 3)]),
            ]
        );
    }

    #[test]
    fn test_sibling_arrays_get_fresh_ordinals() {
        let mut fj = flattener(&["a", "b"]);
        let fields = fj.flatten(br#"{"a":[1],"b":[2]}"#).unwrap();

        assert_eq!(fields[0].array_trail[0], ArrayPos::new(1, 1));
        assert_eq!(fields[1].array_trail[0], ArrayPos::new(2, 1));
    }

    #[test]
    fn test_array_of_objects() {
        let mut fj = flattener(&["posts\ntitle"]);
        let fields = fj
            .flatten(br#"{"posts":[{"id":1,"title":"first"},7,{"title":"second"}]}"#)
            .unwrap();

        assert_eq!(
            summary(fields),
            vec![
                row("posts\ntitle", "\"first\"", &[(1, 1)]),
                row("posts\ntitle", "\"second\"", &[(1, 3)]),
            ]
        );
    }

    #[test]
    fn test_object_at_leaf_is_skipped() {
        let mut fj = flattener(&["a", "b"]);
        let fields = fj.flatten(br#"{"a":{"x":1},"b":[{"y":2},3]}"#).unwrap();

        assert_eq!(summary(fields), vec![row("b", "3", &[(1, 2)])]);
    }

    #[test]
    fn test_object_at_leaf_does_not_resolve_it() {
        let mut fj = flattener(&["a"]);
        let fields = fj.flatten(br#"{"a":{"x":1},"a":2}"#).unwrap();

        assert_eq!(summary(fields), vec![row("a", "2", &[])]);
    }

    #[test]
    fn test_decoder_returned_to_pool_on_error() {
        use crate::decoder::pool;

        let mut fj = flattener(&["a
b"]);
        let before = pool::outstanding();

        assert!(fj.flatten(br#"{"a":{"b":[1,2"#).is_err());
        assert_eq!(pool::outstanding(), before);

        assert!(fj.flatten(br#"[1]"#).is_err());
        assert_eq!(pool::outstanding(), before);

        fj.flatten(br#"{"a":{"b":3}}"#).unwrap();
        assert_eq!(pool::outstanding(), before);
    }

    #[test]
    fn test_duplicate_paths_emit_once() {
        let mut once = flattener(&["a\nb\nc"]);
        let mut twice = flattener(&["a\nb\nc", "a\nb\nc", "a\nb"]);
        let doc = br#"{"a":{"b":{"c":[1,2]}}}"#;

        let expected = once.flatten(doc).unwrap().to_vec();
        assert_eq!(twice.flatten(doc).unwrap(), expected.as_slice());
        assert_eq!(expected.len(), 2);
    }

    #[test]
    fn test_no_registered_path_present() {
        let mut fj = flattener(&["x\ny"]);
        let fields = fj.flatten(br#"{"a":{"b":[1,2,{"c":null}]},"x":5}"#).unwrap();
        assert!(fields.is_empty());
    }

    #[test]
    fn test_root_stops_after_last_path() {
        // the tail is never read once every path has been resolved
        let mut fj = flattener(&["a"]);
        let fields = fj.flatten(br#"{"a":1, "b": @@@"#).unwrap();
        assert_eq!(summary(fields), vec![row("a", "1", &[])]);
    }

    #[test]
    fn test_nested_early_exit_resumes_parent() {
        let mut fj = flattener(&["p\na", "x"]);
        let fields = fj
            .flatten(br#"{"p":{"a":1,"zzz":[1,{"q":"}"}]},"x":"y"}"#)
            .unwrap();

        assert_eq!(
            summary(fields),
            vec![
                row("p\na", "1", &[]),
                row("x", "\"y\"", &[]),
            ]
        );
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let mut fj = flattener(&["p\na", "p\nb", "z"]);
        let first = fj
            .flatten(br#"{"p":{"a":1,"b":2,"c":3},"z":true,"q":[1]}"#)
            .unwrap()
            .to_vec();
        let last = fj
            .flatten(br#"{"q":[1],"z":true,"p":{"c":3,"b":2,"a":1}}"#)
            .unwrap()
            .to_vec();

        let mut first = summary(&first);
        let mut last = summary(&last);
        first.sort();
        last.sort();
        assert_eq!(first, last);
    }

    #[test]
    fn test_repeat_flatten_is_identical() {
        let mut fj = flattener(&["a", "b\nc"]);
        let doc = br#"{"a":[[1],[2]],"b":{"c":[3]}}"#;

        let once = fj.flatten(doc).unwrap().to_vec();
        let twice = fj.flatten(doc).unwrap().to_vec();
        assert_eq!(once, twice);
        assert_eq!(once[2].array_trail[0].array, 4);
    }

    #[test]
    fn test_partial_results_on_error() {
        let mut fj = flattener(&["a", "b"]);
        let err = fj.flatten(br#"{"a":"ok","b":[1, 2"#).unwrap_err();

        assert!(matches!(err, Error::Decode(DecodeError::UnexpectedEof { .. })));
        assert_eq!(
            summary(fj.fields()),
            vec![
                row("a", "\"ok\"", &[]),
                row("b", "1", &[(1, 1)]),
                row("b", "2", &[(1, 2)]),
            ]
        );

        // next document starts clean, trail included
        let fields = fj.flatten(br#"{"b":9}"#).unwrap();
        assert_eq!(summary(fields), vec![row("b", "9", &[])]);
    }

    #[test]
    fn test_top_level_must_be_object() {
        let mut fj = flattener(&["a"]);
        let err = fj.flatten(b"  [1, 2]").unwrap_err();
        assert_eq!(err, Error::Decode(DecodeError::NotAnObject { offset: 2 }));
    }

    #[test]
    fn test_nesting_limit() {
        let index = Arc::new(PathIndex::from_paths(["a"]).unwrap());
        let config = FlattenConfig {
            max_nesting: 3,
            ..FlattenConfig::default()
        };
        let mut fj = Flattener::with_config(index, config);

        assert!(fj.flatten(br#"{"a":[[1]]}"#).is_ok());
        let err = fj.flatten(br#"{"a":[[[1]]]}"#).unwrap_err();
        assert!(matches!(err, Error::Decode(DecodeError::NestingTooDeep { limit: 3, .. })));
    }

    #[test]
    fn test_clone_has_fresh_scratch() {
        let mut fj = flattener(&["a"]);
        fj.flatten(br#"{"a":1}"#).unwrap();

        let copy = fj.clone();
        assert!(copy.fields().is_empty());
        assert!(Arc::ptr_eq(copy.index(), fj.index()));
        assert_eq!(fj.fields().len(), 1);
    }

    #[test]
    fn test_reset_and_take() {
        let mut fj = flattener(&["a"]);
        fj.flatten(br#"{"a":1}"#).unwrap();

        let taken = fj.take_fields();
        assert_eq!(taken.len(), 1);
        assert!(fj.fields().is_empty());

        fj.flatten(br#"{"a":2}"#).unwrap();
        fj.reset();
        assert!(fj.fields().is_empty());
    }
}
