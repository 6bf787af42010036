//! Directive extraction — a plain regex pass over raw document text.
//!
//! The directive syntax set is small and fixed, so extraction stays a pure
//! function from text to matches; no parsing infrastructure is involved.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::InclusionKind;

/// `% root = <path>` on its own line; the `!TEX` marker between the comment
/// sign and `root` is accepted and optional.
static MAGIC_ROOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*%\s*(?:!\s*[Tt][Ee][Xx]\s+)?root\s*=\s*(\S+)\s*$")
        .expect("magic root pattern compiles")
});

static DOCUMENT_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\begin\{document\}").expect("document start pattern compiles"));

/// `\input{p}`, `\include{p}`, `\subfile{p}`, each with an optional
/// bracketed option group before the braced argument.
static INCLUSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\(input|include|subfile)(?:\[[^\[\]{}]*\])?\{([^}]*)\}")
        .expect("inclusion pattern compiles")
});

/// `\bibliography{a,b}` / `\addbibresource{p}` with comma-separated
/// arguments.
static RESOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\(?:bibliography|addbibresource)(?:\[[^\[\]{}]*\])?\{([^}]+)\}")
        .expect("resource pattern compiles")
});

/// An inclusion directive extracted from document text. The argument is the
/// raw, unresolved path as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inclusion {
    pub kind: InclusionKind,
    pub argument: String,
}

/// First magic root comment in the text, if any.
pub fn magic_root(text: &str) -> Option<&str> {
    MAGIC_ROOT
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Whether the text carries a top-level document start marker.
pub fn has_document_start(text: &str) -> bool {
    DOCUMENT_START.is_match(text)
}

/// All inclusion directives in document order. Malformed directives simply
/// do not match.
pub fn extract_inclusions(text: &str) -> Vec<Inclusion> {
    INCLUSION
        .captures_iter(text)
        .map(|c| {
            let kind = match &c[1] {
                "input" => InclusionKind::Input,
                "include" => InclusionKind::Include,
                _ => InclusionKind::Subfile,
            };
            Inclusion {
                kind,
                argument: c[2].to_string(),
            }
        })
        .collect()
}

/// All auxiliary resource names, comma lists flattened and trimmed.
pub fn extract_resources(text: &str) -> Vec<String> {
    RESOURCE
        .captures_iter(text)
        .flat_map(|c| {
            c[1].split(',')
                .map(|name| name.trim().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|name| !name.is_empty())
        .collect()
}
