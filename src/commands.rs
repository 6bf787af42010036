//! CLI command implementations

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use stemma_core::{
    ActiveDocument, DependencyManager, RootResolution, detect_project_scope, normalize,
};
use stemma_watcher::{DocumentSource, ReconcileService};
use tokio::sync::RwLock;

/// Reads the active document and project scope from disk, standing in for
/// the editor state a host would supply.
struct FileDocumentSource {
    path: PathBuf,
    scope: Option<PathBuf>,
}

impl DocumentSource for FileDocumentSource {
    fn active_document(&self) -> Option<ActiveDocument> {
        let text = fs::read_to_string(&self.path).ok()?;
        Some(ActiveDocument {
            path: self.path.clone(),
            text,
        })
    }

    fn project_scope(&self) -> Option<PathBuf> {
        self.scope.clone()
    }
}

pub fn scan(file: PathBuf, project: Option<PathBuf>) -> anyhow::Result<()> {
    let (manager, resolution) = resolve_root(&file, project)?;

    println!("root: {} (found by {})", resolution.root.display(), resolution.strategy);
    print_tree(&manager, &resolution.root, 0, &mut HashSet::new());

    let resources = manager.resources_for(&resolution.root);
    if !resources.is_empty() {
        println!("resources:");
        for resource in resources {
            println!("  {}", resource.display());
        }
    }
    Ok(())
}

pub async fn watch(file: PathBuf, project: Option<PathBuf>) -> anyhow::Result<()> {
    let scope = project_scope(&file, project);
    let (manager, resolution) = resolve_root(&file, scope.clone())?;
    tracing::info!(
        root = %resolution.root.display(),
        documents = manager.graph().document_count(),
        "watching"
    );

    let source = Arc::new(FileDocumentSource {
        path: normalize(&absolute(&file)),
        scope,
    });
    let service = ReconcileService::new(Arc::new(RwLock::new(manager)), source)?;
    let report = resolution.refreshed.unwrap_or_default();
    service.attach_root(&resolution.root, &report).await?;

    // runs until interrupted
    service.process_events().await
}

pub fn citations(file: PathBuf, project: Option<PathBuf>) -> anyhow::Result<()> {
    let (manager, resolution) = resolve_root(&file, project)?;

    let cache = stemma_core::CitationCache::new();
    for resource in manager.resources_for(&resolution.root) {
        cache.index_file(&resource);
    }
    for key in cache.all_keys() {
        println!("{key}");
    }
    Ok(())
}

/// Shared front half of every command: read the document, settle the scope,
/// and run root identification plus discovery.
fn resolve_root(
    file: &Path,
    project: Option<PathBuf>,
) -> anyhow::Result<(DependencyManager, RootResolution)> {
    let path = normalize(&absolute(file));
    let text = fs::read_to_string(&path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let scope = project_scope(&path, project);

    let mut manager = DependencyManager::new();
    let active = ActiveDocument {
        path: path.clone(),
        text,
    };
    let resolution = manager
        .find_root(&active, scope.as_deref())
        .context("no root document identified")?;
    Ok((manager, resolution))
}

fn project_scope(file: &Path, project: Option<PathBuf>) -> Option<PathBuf> {
    project
        .map(|dir| normalize(&absolute(&dir)))
        .or_else(|| detect_project_scope(&normalize(&absolute(file))))
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn print_tree(manager: &DependencyManager, doc: &Path, depth: usize, seen: &mut HashSet<PathBuf>) {
    let marker = if seen.contains(doc) { " (repeated)" } else { "" };
    println!("{:indent$}{}{}", "", doc.display(), marker, indent = depth * 2);
    if !seen.insert(doc.to_path_buf()) {
        return;
    }
    for child in manager.graph().children(doc) {
        print_tree(manager, &child, depth + 1, seen);
    }
}
