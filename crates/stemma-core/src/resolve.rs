//! Path resolution for directive arguments

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Default extension appended to extensionless inclusion arguments.
pub const DOCUMENT_EXTENSION: &str = "tex";

/// Default extension appended to extensionless resource arguments.
pub const RESOURCE_EXTENSION: &str = "bib";

/// Resolve an inclusion argument against the scanning document's directory.
/// Returns `None` when no file exists for any variant.
pub fn resolve_document(base: &Path, raw: &str) -> Option<PathBuf> {
    resolve_with_extension(base, raw, DOCUMENT_EXTENSION)
}

/// Resolve a resource argument against the root document's directory.
/// Absolute arguments are taken as written.
pub fn resolve_resource(base: &Path, raw: &str) -> Option<PathBuf> {
    resolve_with_extension(base, raw, RESOURCE_EXTENSION)
}

/// The shared fallback ladder: join against the base, append the default
/// extension if the argument has none, and if that path does not exist try
/// the argument with the default extension appended on top of its own
/// (`chapter.v2` -> `chapter.v2.tex`). Nothing on disk means no result.
fn resolve_with_extension(base: &Path, raw: &str, ext: &str) -> Option<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let joined = base.join(raw);
    let candidate = if joined.extension().is_none() {
        append_extension(&joined, ext)
    } else {
        joined
    };
    if candidate.is_file() {
        return Some(normalize(&candidate));
    }
    let variant = append_extension(&candidate, ext);
    if variant.is_file() {
        return Some(normalize(&variant));
    }
    None
}

fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut joined = OsString::from(path.as_os_str());
    joined.push(".");
    joined.push(ext);
    PathBuf::from(joined)
}

/// Lexically remove `.` and `..` components so the same file always carries
/// the same key in the graph. Does not touch the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if can_pop {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod resolve_tests {
    use super::*;

    #[test]
    fn normalize_removes_dot_components() {
        assert_eq!(
            normalize(Path::new("/a/b/./c/../d.tex")),
            PathBuf::from("/a/b/d.tex")
        );
        assert_eq!(normalize(Path::new("/a/../../b")), PathBuf::from("/../b"));
    }
}
