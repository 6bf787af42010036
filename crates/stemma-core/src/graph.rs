//! Inclusion graph wrapper using petgraph::StableDiGraph keyed by file path

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;

use crate::model::InclusionKind;

/// The document inclusion graph — a directed graph of file paths with the
/// root association for every known document. All mutation goes through the
/// methods here; callers never touch the underlying storage.
pub struct DependencyGraph {
    inner: StableDiGraph<PathBuf, InclusionKind>,
    index: HashMap<PathBuf, NodeIndex>,
    root_of: HashMap<PathBuf, PathBuf>,
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("document_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .finish()
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph {
            inner: StableDiGraph::new(),
            index: HashMap::new(),
            root_of: HashMap::new(),
        }
    }

    /// Add a document node if it is not already present. Returns its index.
    pub fn ensure_document(&mut self, path: &Path) -> NodeIndex {
        if let Some(&idx) = self.index.get(path) {
            return idx;
        }
        let idx = self.inner.add_node(path.to_path_buf());
        self.index.insert(path.to_path_buf(), idx);
        idx
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.index.contains_key(path)
    }

    /// Replace a parent's entire outgoing edge set. Duplicate children keep
    /// the first directive's kind; a re-scan is therefore idempotent.
    pub fn replace_children(&mut self, parent: &Path, children: &[(PathBuf, InclusionKind)]) {
        let parent_idx = self.ensure_document(parent);
        let stale: Vec<_> = self
            .inner
            .edges_directed(parent_idx, Direction::Outgoing)
            .map(|e| e.id())
            .collect();
        for edge in stale {
            self.inner.remove_edge(edge);
        }
        let mut seen = HashSet::new();
        for (child, kind) in children {
            if !seen.insert(child.clone()) {
                continue;
            }
            let child_idx = self.ensure_document(child);
            self.inner.add_edge(parent_idx, child_idx, *kind);
        }
    }

    /// Direct children of a document, in inclusion order.
    pub fn children(&self, parent: &Path) -> Vec<PathBuf> {
        let Some(&idx) = self.index.get(parent) else {
            return Vec::new();
        };
        let mut out: Vec<_> = self
            .inner
            .edges_directed(idx, Direction::Outgoing)
            .filter_map(|e| self.inner.node_weight(e.target()).cloned())
            .collect();
        // petgraph iterates outgoing edges newest-first
        out.reverse();
        out
    }

    /// Whether `descendant` is reachable from `ancestor` via inclusion
    /// edges. A document is its own descendant.
    pub fn is_descendant(&self, ancestor: &Path, descendant: &Path) -> bool {
        if ancestor == descendant {
            return true;
        }
        let Some(&start) = self.index.get(ancestor) else {
            return false;
        };
        let mut visited = HashSet::new();
        let mut to_visit = vec![start];
        while let Some(current) = to_visit.pop() {
            if !visited.insert(current) {
                continue;
            }
            for edge in self.inner.edges_directed(current, Direction::Outgoing) {
                if self.inner.node_weight(edge.target()).map(PathBuf::as_path)
                    == Some(descendant)
                {
                    return true;
                }
                to_visit.push(edge.target());
            }
        }
        false
    }

    /// Assign `root` to `start` and every document reachable from it,
    /// overwriting prior associations. The visited set keeps this correct
    /// under circular inclusion.
    pub fn assign_root(&mut self, root: &Path, start: &Path) {
        let Some(&start_idx) = self.index.get(start) else {
            return;
        };
        let mut visited = HashSet::new();
        let mut to_visit = vec![start_idx];
        while let Some(current) = to_visit.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(path) = self.inner.node_weight(current) {
                self.root_of.insert(path.clone(), root.to_path_buf());
            }
            let next: Vec<_> = self
                .inner
                .edges_directed(current, Direction::Outgoing)
                .map(|e| e.target())
                .collect();
            to_visit.extend(next);
        }
    }

    /// Recorded root association for a document.
    pub fn root_of(&self, path: &Path) -> Option<&Path> {
        self.root_of.get(path).map(PathBuf::as_path)
    }

    /// Drop a document and its incident edges. Its own root association
    /// goes with it; associations of other documents are untouched.
    pub fn remove_document(&mut self, path: &Path) -> bool {
        let Some(idx) = self.index.remove(path) else {
            return false;
        };
        self.inner.remove_node(idx);
        self.root_of.remove(path);
        true
    }

    /// Forget every association pointing at `root`. Used when the active
    /// root is deleted, so a stale cached association cannot short-circuit
    /// the re-identification that follows.
    pub fn clear_associations_with(&mut self, root: &Path) {
        self.root_of.retain(|_, r| r != root);
    }

    pub fn documents(&self) -> impl Iterator<Item = &Path> {
        self.index.keys().map(PathBuf::as_path)
    }

    pub fn document_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}
