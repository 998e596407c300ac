//! Path index: a trie over path segments
//!
//! The index is built once from every registered path and is read-only
//! afterwards. At each trie node a segment name is either a child node to
//! descend into or a leaf to extract, never both.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`].

use crate::error::{Error, Result};
use crate::types::{FlattenConfig, Path, PATH_SEPARATOR};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Address of a node inside a [`PathIndex`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);
}

#[derive(Debug, Clone, Default)]
struct IndexNode {
    /// Segment name -> object-valued child
    children: HashMap<String, NodeId>,

    /// Segment name -> full registered path
    leaves: HashMap<String, Path>,
}

/// Compiled set of registered paths
#[derive(Debug, Clone)]
pub struct PathIndex {
    nodes: Vec<IndexNode>,
    separator: u8,
    path_count: usize,
}

impl Default for PathIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl PathIndex {
    pub fn new() -> Self {
        Self::with_separator(PATH_SEPARATOR)
    }

    pub fn with_separator(separator: u8) -> Self {
        PathIndex {
            nodes: vec![IndexNode::default()],
            separator,
            path_count: 0,
        }
    }

    pub fn with_config(config: &FlattenConfig) -> Self {
        Self::with_separator(config.separator)
    }

    /// Build an index from a collection of raw paths using the default separator
    pub fn from_paths<I, P>(paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        let mut index = Self::new();
        index.extend(paths)?;
        Ok(index)
    }

    /// Register every path, stopping at the first malformed one.
    /// Paths registered before the failure stay registered.
    pub fn extend<I, P>(&mut self, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        for path in paths {
            self.register(path)?;
        }

        debug!(
            paths = self.path_count,
            nodes = self.nodes.len(),
            "path index built"
        );
        Ok(())
    }

    /// Register one path.
    ///
    /// Returns `Ok(false)` when the path collides with an earlier
    /// registration: the first registration for a slot wins and later ones
    /// are ignored. Empty paths, empty segments and non-UTF-8 segments are
    /// rejected without touching the index.
    pub fn register(&mut self, path: impl AsRef<[u8]>) -> Result<bool> {
        let bytes = path.as_ref();
        if bytes.is_empty() {
            return Err(Error::malformed_path(bytes, "empty path"));
        }

        let segments = bytes
            .split(|b| *b == self.separator)
            .map(|segment| {
                if segment.is_empty() {
                    return Err(Error::malformed_path(bytes, "empty segment"));
                }
                std::str::from_utf8(segment)
                    .map_err(|_| Error::malformed_path(bytes, "segment is not valid UTF-8"))
            })
            .collect::<Result<Vec<&str>>>()?;

        let Some((last, parents)) = segments.split_last() else {
            return Err(Error::malformed_path(bytes, "empty path"));
        };

        if self.conflicts(parents, last) {
            debug!(path = %String::from_utf8_lossy(bytes), "path slot already taken, ignoring");
            return Ok(false);
        }

        let mut id = NodeId::ROOT;
        for segment in parents {
            id = self.get_or_create(id, segment);
        }

        self.nodes[id.0]
            .leaves
            .insert((*last).to_string(), Path::new(bytes));
        self.path_count += 1;

        Ok(true)
    }

    /// Whether registering `parents` + `last` would clash with an existing
    /// leaf or child. Only walks nodes that already exist; below the first
    /// missing node nothing can clash.
    fn conflicts(&self, parents: &[&str], last: &str) -> bool {
        let mut id = NodeId::ROOT;

        for segment in parents {
            let node = &self.nodes[id.0];
            if node.leaves.contains_key(*segment) {
                return true;
            }
            match node.children.get(*segment) {
                Some(child) => id = *child,
                None => return false,
            }
        }

        let node = &self.nodes[id.0];
        node.children.contains_key(last) || node.leaves.contains_key(last)
    }

    fn get_or_create(&mut self, parent: NodeId, segment: &str) -> NodeId {
        if let Some(child) = self.nodes[parent.0].children.get(segment) {
            return *child;
        }

        let child = NodeId(self.nodes.len());
        self.nodes.push(IndexNode::default());
        self.nodes[parent.0]
            .children
            .insert(segment.to_string(), child);
        child
    }

    pub fn root(&self) -> NodeRef<'_> {
        NodeRef {
            index: self,
            id: NodeId::ROOT,
        }
    }

    /// Look up a node by id. `None` when `id` does not belong to this index.
    pub fn node(&self, id: NodeId) -> Option<NodeRef<'_>> {
        (id.0 < self.nodes.len()).then_some(NodeRef { index: self, id })
    }

    pub fn separator(&self) -> u8 {
        self.separator
    }

    /// Number of paths that took effect
    pub fn path_count(&self) -> usize {
        self.path_count
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path_count == 0
    }
}

/// Borrowed view of one trie node
#[derive(Clone, Copy)]
pub struct NodeRef<'i> {
    index: &'i PathIndex,
    id: NodeId,
}

impl<'i> NodeRef<'i> {
    fn node(&self) -> &'i IndexNode {
        &self.index.nodes[self.id.0]
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The child node when `segment` names a registered sub-object
    pub fn lookup_child(&self, segment: &str) -> Option<NodeRef<'i>> {
        self.node().children.get(segment).map(|id| NodeRef {
            index: self.index,
            id: *id,
        })
    }

    /// The full registered path when `segment` is a leaf at this node
    pub fn lookup_leaf(&self, segment: &str) -> Option<&'i Path> {
        self.node().leaves.get(segment)
    }

    pub fn child_count(&self) -> usize {
        self.node().children.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.node().leaves.len()
    }

    /// Child names in sorted order
    pub fn names(&self) -> Vec<&'i str> {
        let mut names: Vec<&str> = self.node().children.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn leaves(&self) -> impl Iterator<Item = (&'i str, &'i Path)> {
        self.node()
            .leaves
            .iter()
            .map(|(name, path)| (name.as_str(), path))
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut leaves: Vec<&str> = self.leaves().map(|(name, _)| name).collect();
        leaves.sort_unstable();

        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("children", &self.names())
            .field("leaves", &leaves)
            .finish()
    }
}
