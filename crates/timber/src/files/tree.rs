//! Listing tree built from glob expansion.
//!
//! Every pattern of a caller's resolved access is expanded against the
//! filesystem and each match is inserted into one tree rooted at the
//! filesystem root. Nodes live in an arena and each node keeps a name to
//! child index map, so inserting a path is a walk from the root.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fs;

use protocol::{FileNode, NodeKind};
use tracing::{debug, warn};

use crate::access::pattern::{normalize, MATCH_OPTIONS};
use crate::access::{contains_traversal, ResolvedAccess};

const ROOT: usize = 0;

#[derive(Debug)]
struct ArenaNode {
    name: String,
    path: Option<String>,
    kind: NodeKind,
    size: u64,
    size_done: bool,
    /// Child indices, directories first then by name.
    children: Vec<usize>,
    index: HashMap<String, usize>,
}

impl ArenaNode {
    fn new(name: &str, kind: NodeKind) -> Self {
        Self {
            name: name.to_string(),
            path: None,
            kind,
            size: 0,
            size_done: false,
            children: Vec::new(),
            index: HashMap::new(),
        }
    }
}

/// Builds the ordered node tree for one listing request.
#[derive(Debug)]
pub struct TreeBuilder {
    nodes: Vec<ArenaNode>,
    processed: HashSet<String>,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            nodes: vec![ArenaNode::new("", NodeKind::Dir)],
            processed: HashSet::new(),
        }
    }

    /// Expand one pattern and insert every match.
    ///
    /// Returns the number of newly inserted paths. Malformed patterns and
    /// unreadable matches are logged and contribute nothing.
    pub fn add_pattern(&mut self, raw: &str) -> usize {
        let paths = match glob::glob_with(&normalize(raw), MATCH_OPTIONS) {
            Ok(paths) => paths,
            Err(e) => {
                warn!(pattern = %raw, error = %e, "invalid glob pattern, skipping");
                return 0;
            }
        };

        let mut added = 0;
        for entry in paths {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!(pattern = %raw, error = %e, "glob expansion error");
                    continue;
                }
            };

            let canonical = path.to_string_lossy().replace('\\', "/");
            if contains_traversal(&canonical) || self.processed.contains(&canonical) {
                continue;
            }

            let metadata = match fs::metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %canonical, error = %e, "failed to stat matched path");
                    continue;
                }
            };

            let kind = if metadata.is_dir() {
                NodeKind::Dir
            } else {
                NodeKind::File
            };
            self.insert(&canonical, kind, metadata.len());
            self.processed.insert(canonical);
            added += 1;
        }

        debug!(pattern = %raw, matches = added, "expanded pattern");
        added
    }

    /// Insert a matched path. Segments are separated by `/`.
    pub fn insert(&mut self, path: &str, kind: NodeKind, size: u64) {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((last, parents)) = segments.split_last() else {
            return;
        };

        let mut current = ROOT;
        for segment in parents {
            current = self.child_or_insert(current, segment, NodeKind::Dir);
        }

        let node_idx = self.child_or_insert(current, last, kind);
        let node = &mut self.nodes[node_idx];
        node.path = Some(path.to_string());
        if kind == NodeKind::File && node.kind == NodeKind::File {
            node.size = size;
        }
    }

    /// Number of distinct matched paths inserted so far.
    pub fn matched(&self) -> usize {
        self.processed.len()
    }

    /// Find a child by name, creating it in sorted position if missing.
    ///
    /// The kind of an existing node is never changed.
    fn child_or_insert(&mut self, parent: usize, name: &str, kind: NodeKind) -> usize {
        if let Some(&idx) = self.nodes[parent].index.get(name) {
            return idx;
        }

        let idx = self.nodes.len();
        self.nodes.push(ArenaNode::new(name, kind));

        let nodes = &self.nodes;
        let position = nodes[parent]
            .children
            .partition_point(|&c| compare(&nodes[c], kind, name) == Ordering::Less);

        let parent_node = &mut self.nodes[parent];
        parent_node.children.insert(position, idx);
        parent_node.index.insert(name.to_string(), idx);
        idx
    }

    /// Directory sizes are the sum of their children, computed once per node.
    fn aggregate_size(&mut self, idx: usize) -> u64 {
        if self.nodes[idx].size_done {
            return self.nodes[idx].size;
        }
        if self.nodes[idx].kind == NodeKind::Dir {
            let children = self.nodes[idx].children.clone();
            let total = children.into_iter().map(|c| self.aggregate_size(c)).sum();
            self.nodes[idx].size = total;
        }
        self.nodes[idx].size_done = true;
        self.nodes[idx].size
    }

    /// Compute sizes and return the ordered top-level nodes.
    pub fn finish(mut self) -> Vec<FileNode> {
        self.aggregate_size(ROOT);
        let top = self.nodes[ROOT].children.clone();
        top.into_iter().map(|idx| self.to_node(idx)).collect()
    }

    fn to_node(&self, idx: usize) -> FileNode {
        let node = &self.nodes[idx];
        FileNode {
            name: node.name.clone(),
            path: node.path.clone(),
            kind: node.kind,
            size: node.size,
            children: node.children.iter().map(|&c| self.to_node(c)).collect(),
        }
    }
}

/// Order of an existing node relative to a new `(kind, name)`.
fn compare(existing: &ArenaNode, kind: NodeKind, name: &str) -> Ordering {
    match (existing.kind, kind) {
        (NodeKind::Dir, NodeKind::File) => Ordering::Less,
        (NodeKind::File, NodeKind::Dir) => Ordering::Greater,
        _ => existing.name.as_str().cmp(name),
    }
}

/// Build the listing for a caller's resolved access.
pub fn list(access: &ResolvedAccess) -> Vec<FileNode> {
    let mut builder = TreeBuilder::new();
    for pattern in access.patterns() {
        builder.add_pattern(pattern);
    }
    debug!(
        patterns = access.patterns().len(),
        matched = builder.matched(),
        "built listing"
    );
    builder.finish()
}
