//! Project scope detection and candidate enumeration

use std::path::{Path, PathBuf};

use globset::Glob;
use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::resolve::normalize;

/// Files that mark the top of a TeX project.
const SCOPE_MARKERS: &[&str] = &[".latexmkrc", "latexmkrc", "Tectonic.toml", ".git"];

/// Walk up from `start` looking for a project marker. Falls back to `None`
/// when nothing above looks like a project top.
pub fn detect_project_scope(start: &Path) -> Option<PathBuf> {
    let mut dir = if start.is_dir() { start } else { start.parent()? };
    loop {
        if SCOPE_MARKERS.iter().any(|m| dir.join(m).exists()) {
            return Some(dir.to_path_buf());
        }
        dir = dir.parent()?;
    }
}

/// Enumerate every `.tex` document under `scope`, sorted for deterministic
/// candidate order. Enumeration failure degrades to an empty candidate
/// list; the directory-scan strategy treats that as "no candidates found".
pub fn find_candidate_documents(scope: &Path) -> Vec<PathBuf> {
    let matcher = match Glob::new("**/*.tex") {
        Ok(glob) => glob.compile_matcher(),
        Err(e) => {
            warn!(error = %e, "candidate glob failed to compile");
            return Vec::new();
        }
    };
    let mut candidates = Vec::new();
    for entry in WalkBuilder::new(scope).build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "skipping unreadable entry during candidate scan");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let relative = entry.path().strip_prefix(scope).unwrap_or(entry.path());
        if matcher.is_match(relative) {
            candidates.push(normalize(entry.path()));
        }
    }
    candidates.sort();
    candidates
}
