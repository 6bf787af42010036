//! Dependency discovery and root identification
//!
//! [`DependencyManager`] owns the inclusion graph, the root association, and
//! the auxiliary resource mapping. Every mutation happens through the
//! operations here; re-scanning a document replaces its prior edge set in
//! full, which is what makes overlapping change notifications safe to apply
//! in any order.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::directives;
use crate::graph::DependencyGraph;
use crate::model::{ActiveDocument, InclusionKind, RootStrategy, ScanMode, ScanReport};
use crate::resolve::{self, normalize};
use crate::scope;

#[derive(Debug, Error)]
pub enum ScanError {
    /// The entry document of a pass could not be read. Failures on included
    /// documents are logged and skipped instead.
    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A successful root identification.
#[derive(Debug)]
pub struct RootResolution {
    pub root: PathBuf,
    pub strategy: RootStrategy,
    /// Discovery pass triggered by a root change, for the watch layer to
    /// apply. `None` when the root was already active.
    pub refreshed: Option<ScanReport>,
}

/// The document dependency graph manager.
pub struct DependencyManager {
    graph: DependencyGraph,
    /// root document -> auxiliary resource files discovered under it
    resources: HashMap<PathBuf, HashSet<PathBuf>>,
    active_root: Option<PathBuf>,
}

impl DependencyManager {
    pub fn new() -> Self {
        DependencyManager {
            graph: DependencyGraph::new(),
            resources: HashMap::new(),
            active_root: None,
        }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn active_root(&self) -> Option<&Path> {
        self.active_root.as_deref()
    }

    /// Resources recorded for one root.
    pub fn resources_for(&self, root: &Path) -> Vec<PathBuf> {
        let mut out: Vec<_> = self
            .resources
            .get(root)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    pub fn is_known_resource(&self, path: &Path) -> bool {
        self.resources.values().any(|set| set.contains(path))
    }

    /// Identify the root document governing `active`, trying strategies in
    /// fixed priority order. A root change triggers full discovery and root
    /// propagation; failure leaves all prior state unchanged.
    pub fn find_root(
        &mut self,
        active: &ActiveDocument,
        project_scope: Option<&Path>,
    ) -> Option<RootResolution> {
        let (root, strategy) = if let Some(root) = self.find_root_magic(active) {
            (root, RootStrategy::MagicComment)
        } else if let Some(root) = self.find_root_self(active) {
            (root, RootStrategy::SelfContained)
        } else if let Some(root) = self.find_root_cached(active) {
            (root, RootStrategy::Cached)
        } else if let Some(root) = self.find_root_dir(active, project_scope) {
            (root, RootStrategy::DirectoryScan)
        } else {
            return None;
        };

        if self.active_root.as_deref() == Some(root.as_path()) {
            debug!(root = %root.display(), %strategy, "root unchanged");
            return Some(RootResolution {
                root,
                strategy,
                refreshed: None,
            });
        }

        info!(
            root = %root.display(),
            %strategy,
            previous = ?self.active_root.as_deref().map(Path::display),
            "root changed, discovering dependencies"
        );
        self.active_root = Some(root.clone());
        let refreshed = match self.discover(&root, ScanMode::Full) {
            Ok(report) => {
                self.graph.assign_root(&root, &root);
                Some(report)
            }
            Err(e) => {
                warn!(error = %e, "dependency discovery failed for new root");
                None
            }
        };
        Some(RootResolution {
            root,
            strategy,
            refreshed,
        })
    }

    fn find_root_magic(&self, active: &ActiveDocument) -> Option<PathBuf> {
        let raw = directives::magic_root(&active.text)?;
        let base = active.path.parent()?;
        let root = resolve::resolve_document(base, raw);
        match &root {
            Some(path) => debug!(path = %path.display(), "root named by magic comment"),
            None => warn!(raw, "magic comment names a file that does not exist"),
        }
        root
    }

    fn find_root_self(&self, active: &ActiveDocument) -> Option<PathBuf> {
        directives::has_document_start(&active.text).then(|| normalize(&active.path))
    }

    fn find_root_cached(&self, active: &ActiveDocument) -> Option<PathBuf> {
        self.graph
            .root_of(&normalize(&active.path))
            .map(Path::to_path_buf)
    }

    fn find_root_dir(
        &mut self,
        active: &ActiveDocument,
        project_scope: Option<&Path>,
    ) -> Option<PathBuf> {
        let scope = project_scope?;
        let active_path = normalize(&active.path);
        for candidate in scope::find_candidate_documents(scope) {
            let text = match fs::read_to_string(&candidate) {
                Ok(text) => text,
                Err(e) => {
                    debug!(candidate = %candidate.display(), error = %e, "skipping unreadable candidate");
                    continue;
                }
            };
            if !directives::has_document_start(&text) {
                continue;
            }
            if candidate == active_path {
                return Some(candidate);
            }
            if let Err(e) = self.discover(&candidate, ScanMode::Fast) {
                debug!(candidate = %candidate.display(), error = %e, "candidate scan failed");
                continue;
            }
            if self.graph.is_descendant(&candidate, &active_path) {
                return Some(candidate);
            }
        }
        None
    }

    /// Recursively scan `root` and every transitively included document,
    /// rebuilding their edge sets. In full mode, auxiliary resources are
    /// recorded under `root` as well.
    pub fn discover(&mut self, root: &Path, mode: ScanMode) -> Result<ScanReport, ScanError> {
        let root = normalize(root);
        let text = fs::read_to_string(&root).map_err(|source| ScanError::Unreadable {
            path: root.clone(),
            source,
        })?;
        let root_dir = parent_dir(&root);
        let mut report = ScanReport::default();
        let mut visited = HashSet::new();
        visited.insert(root.clone());
        report.discovered.push(root.clone());
        self.scan_text(&root, &text, &root_dir, &root, mode, &mut visited, &mut report);
        Ok(report)
    }

    /// Re-scan a single changed document, merging newly discovered edges and
    /// resources into the existing graph. The rest of the graph is left
    /// alone; edges of the changed document are replaced in full.
    pub fn rescan(&mut self, path: &Path) -> Result<ScanReport, ScanError> {
        let path = normalize(path);
        let text = fs::read_to_string(&path).map_err(|source| ScanError::Unreadable {
            path: path.clone(),
            source,
        })?;
        let owner = self
            .active_root
            .clone()
            .unwrap_or_else(|| path.clone());
        let root_dir = parent_dir(&owner);
        let mut report = ScanReport::default();
        let mut visited = HashSet::new();
        visited.insert(path.clone());
        report.discovered.push(path.clone());
        self.scan_text(&path, &text, &root_dir, &owner, ScanMode::Full, &mut visited, &mut report);
        if let Some(root) = self.active_root.clone() {
            // keep associations current for documents this change pulled in
            self.graph.assign_root(&root, &path);
        }
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn scan_text(
        &mut self,
        doc: &Path,
        text: &str,
        root_dir: &Path,
        owner: &Path,
        mode: ScanMode,
        visited: &mut HashSet<PathBuf>,
        report: &mut ScanReport,
    ) {
        debug!(path = %doc.display(), "scanning");
        self.graph.ensure_document(doc);
        let scan_dir = parent_dir(doc);
        let mut children: Vec<(PathBuf, InclusionKind)> = Vec::new();
        for inclusion in directives::extract_inclusions(text) {
            match resolve::resolve_document(&scan_dir, &inclusion.argument) {
                Some(target) => children.push((target, inclusion.kind)),
                None => debug!(
                    argument = %inclusion.argument,
                    from = %doc.display(),
                    "inclusion does not resolve to a file, skipping"
                ),
            }
        }
        self.graph.replace_children(doc, &children);
        report.scanned.push(doc.to_path_buf());

        for (child, _) in &children {
            if !visited.insert(child.clone()) {
                continue;
            }
            report.discovered.push(child.clone());
            match fs::read_to_string(child) {
                Ok(child_text) => {
                    self.scan_text(child, &child_text, root_dir, owner, mode, visited, report);
                }
                Err(e) => {
                    warn!(path = %child.display(), error = %e, "cannot read included document, skipping");
                }
            }
        }

        if mode == ScanMode::Fast {
            return;
        }
        for raw in directives::extract_resources(text) {
            match resolve::resolve_resource(root_dir, &raw) {
                Some(resource) => {
                    let recorded = self
                        .resources
                        .entry(owner.to_path_buf())
                        .or_default()
                        .insert(resource.clone());
                    if recorded {
                        debug!(path = %resource.display(), "resource recorded");
                        report.resources.push(resource);
                    }
                }
                None => debug!(raw = %raw, from = %doc.display(), "resource does not resolve to a file, skipping"),
            }
        }
    }

    /// Drop a deleted document from the graph. Returns true when the deleted
    /// document was the active root, in which case the caller must re-run
    /// root identification.
    pub fn remove_document(&mut self, path: &Path) -> bool {
        let path = normalize(path);
        self.graph.remove_document(&path);
        if self.active_root.as_deref() == Some(path.as_path()) {
            info!(path = %path.display(), "active root deleted");
            self.graph.clear_associations_with(&path);
            self.active_root = None;
            true
        } else {
            false
        }
    }

    /// Drop a deleted resource from every root's mapping. Returns true when
    /// the path was recorded anywhere.
    pub fn forget_resource(&mut self, path: &Path) -> bool {
        let path = normalize(path);
        let mut removed = false;
        for set in self.resources.values_mut() {
            removed |= set.remove(&path);
        }
        removed
    }
}

impl Default for DependencyManager {
    fn default() -> Self {
        Self::new()
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
