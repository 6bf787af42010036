//! Core data structures for the document dependency graph

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Extensions treated as TeX source documents.
pub const TEX_EXTENSIONS: &[&str] = &["tex", "sty", "cls", "bbx", "cbx", "dtx"];

/// Which directive form pulled a child document into its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InclusionKind {
    /// `\input{...}` — inlined verbatim.
    Input,
    /// `\include{...}` — page-breaking, conditional inclusion.
    Include,
    /// `\subfile{...}` — standalone sub-document.
    Subfile,
}

/// The currently active document, passed in explicitly instead of read from
/// ambient editor state.
#[derive(Debug, Clone)]
pub struct ActiveDocument {
    pub path: PathBuf,
    pub text: String,
}

/// Discovery depth for a scan pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Edges, resources, and watch candidates.
    Full,
    /// Edges only, for reachability checks. Results are not authoritative
    /// for the resource mapping.
    Fast,
}

/// Which strategy identified the root document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootStrategy {
    /// `% root = ...` magic comment in the active document.
    MagicComment,
    /// The active document contains `\begin{document}` itself.
    SelfContained,
    /// Previously recorded root association.
    Cached,
    /// Scan of the project scope for a document-start candidate that
    /// reaches the active document.
    DirectoryScan,
}

impl std::fmt::Display for RootStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RootStrategy::MagicComment => "magic comment",
            RootStrategy::SelfContained => "self",
            RootStrategy::Cached => "cached",
            RootStrategy::DirectoryScan => "directory scan",
        };
        f.write_str(name)
    }
}

/// Outcome of one discovery pass. Consumed by the watch layer to extend
/// its registration set and by indexers via [`ScanEvent`] notifications.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    /// Documents whose content was scanned in this pass.
    pub scanned: Vec<PathBuf>,
    /// Every document that entered the graph in this pass, including edge
    /// targets that could not be read. Superset of `scanned`.
    pub discovered: Vec<PathBuf>,
    /// Auxiliary resource files recorded in this pass (full mode only).
    pub resources: Vec<PathBuf>,
}

impl ScanReport {
    pub fn is_empty(&self) -> bool {
        self.scanned.is_empty() && self.discovered.is_empty() && self.resources.is_empty()
    }
}

/// Notification broadcast after a reconciliation step, letting dependent
/// indexers (completion, citations) refresh their data for one path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    DocumentScanned { path: PathBuf },
    ResourceIndexed { path: PathBuf },
    ResourceForgotten { path: PathBuf },
}

/// Check if a path is a TeX source we should scan.
pub fn is_tex_source(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| TEX_EXTENSIONS.contains(&ext))
}

#[cfg(test)]
mod model_tests {
    use super::*;

    #[test]
    fn tex_source_detection() {
        assert!(is_tex_source(Path::new("main.tex")));
        assert!(is_tex_source(Path::new("style.sty")));
        assert!(is_tex_source(Path::new("class.cls")));
        assert!(!is_tex_source(Path::new("refs.bib")));
        assert!(!is_tex_source(Path::new("figure.pdf")));
        assert!(!is_tex_source(Path::new("Makefile")));
    }
}
