//! Integration tests for stemma
//!
//! These exercise root identification, discovery, and reconciliation
//! together over a real on-disk project.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stemma_core::{ActiveDocument, DependencyManager, RootStrategy, normalize};
use stemma_watcher::{DocumentSource, ReconcileService};
use tempfile::TempDir;
use tokio::sync::RwLock;

fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    normalize(&path)
}

fn active(path: &Path) -> ActiveDocument {
    ActiveDocument {
        path: path.to_path_buf(),
        text: fs::read_to_string(path).unwrap(),
    }
}

struct DiskSource {
    path: PathBuf,
    scope: PathBuf,
}

impl DocumentSource for DiskSource {
    fn active_document(&self) -> Option<ActiveDocument> {
        let text = fs::read_to_string(&self.path).ok()?;
        Some(ActiveDocument {
            path: self.path.clone(),
            text,
        })
    }

    fn project_scope(&self) -> Option<PathBuf> {
        Some(self.scope.clone())
    }
}

/// Lay out a small book project: a root, two chapters, a shared appendix,
/// and a bibliography.
fn book_project(dir: &Path) -> (PathBuf, Vec<PathBuf>, PathBuf) {
    let root = write(
        dir,
        "main.tex",
        "\\documentclass{book}\n\
         \\begin{document}\n\
         \\input{chapters/one}\n\
         \\include{chapters/two}\n\
         \\bibliography{refs}\n\
         \\end{document}\n",
    );
    let one = write(dir, "chapters/one.tex", "\\section{One}\n\\input{appendix}\n");
    let two = write(dir, "chapters/two.tex", "\\section{Two}\n\\input{appendix}\n");
    let appendix = write(dir, "chapters/appendix.tex", "\\section{Appendix}\n");
    let refs = write(
        dir,
        "refs.bib",
        "@article{knuth84,\n  title={Literate Programming}\n}\n\
         @book{lamport94,\n  title={LaTeX: A Document Preparation System}\n}\n",
    );
    (root, vec![one, two, appendix], refs)
}

#[test]
fn discovery_from_active_chapter_builds_the_whole_tree() {
    let dir = TempDir::new().unwrap();
    let (root, chapters, refs) = book_project(dir.path());

    // start from a chapter, not the root; only the directory scan can find it
    let mut manager = DependencyManager::new();
    let resolution = manager
        .find_root(&active(&chapters[0]), Some(dir.path()))
        .unwrap();
    assert_eq!(resolution.root, root);
    assert_eq!(resolution.strategy, RootStrategy::DirectoryScan);

    for doc in &chapters {
        assert!(manager.graph().contains(doc));
        assert_eq!(manager.graph().root_of(doc), Some(root.as_path()));
    }
    // diamond: appendix is a child of both chapters
    assert_eq!(manager.graph().children(&chapters[0]), vec![chapters[2].clone()]);
    assert_eq!(manager.graph().children(&chapters[1]), vec![chapters[2].clone()]);
    assert_eq!(manager.resources_for(&root), vec![refs]);
}

#[test]
fn magic_comment_overrides_every_other_strategy() {
    let dir = TempDir::new().unwrap();
    book_project(dir.path());
    // this fragment is itself a valid root, but the magic comment wins
    let fragment = write(
        dir.path(),
        "standalone.tex",
        "% !TEX root = main.tex\n\\begin{document}\\end{document}\n",
    );
    let main = normalize(&dir.path().join("main.tex"));

    let mut manager = DependencyManager::new();
    let resolution = manager
        .find_root(&active(&fragment), Some(dir.path()))
        .unwrap();
    assert_eq!(resolution.root, main);
    assert_eq!(resolution.strategy, RootStrategy::MagicComment);
}

#[tokio::test]
async fn reconciliation_tracks_edits_deletes_and_bibliography() {
    let dir = TempDir::new().unwrap();
    let (root, chapters, refs) = book_project(dir.path());

    let manager = Arc::new(RwLock::new(DependencyManager::new()));
    let source = Arc::new(DiskSource {
        path: chapters[0].clone(),
        scope: dir.path().to_path_buf(),
    });
    let service = ReconcileService::new(Arc::clone(&manager), source).unwrap();

    let resolution = manager
        .write()
        .await
        .find_root(&active(&chapters[0]), Some(dir.path()))
        .unwrap();
    let report = resolution.refreshed.unwrap();
    service.attach_root(&root, &report).await.unwrap();

    // the full discovered set is watched and the bibliography is indexed
    assert_eq!(
        service.citations().keys_for(&refs),
        vec!["knuth84", "lamport94"]
    );

    // an edit that grows the tree is merged on rescan
    let three = write(dir.path(), "chapters/three.tex", "\\section{Three}\n");
    fs::write(
        &root,
        "\\begin{document}\n\\input{chapters/one}\n\\input{chapters/three}\n\\end{document}\n",
    )
    .unwrap();
    let rescan = manager.write().await.rescan(&root).unwrap();
    service.apply_report(&rescan).await.unwrap();
    {
        let manager = manager.read().await;
        assert_eq!(
            manager.graph().children(&root),
            vec![chapters[0].clone(), three.clone()]
        );
        assert_eq!(manager.graph().root_of(&three), Some(root.as_path()));
    }
}

#[tokio::test]
async fn service_survives_missing_files_without_erroring() {
    let dir = TempDir::new().unwrap();
    let root = write(
        dir.path(),
        "main.tex",
        "\\begin{document}\n\\input{ghost}\n\\end{document}\n",
    );

    let manager = Arc::new(RwLock::new(DependencyManager::new()));
    let source = Arc::new(DiskSource {
        path: root.clone(),
        scope: dir.path().to_path_buf(),
    });
    let service = ReconcileService::new(Arc::clone(&manager), source).unwrap();

    let resolution = manager
        .write()
        .await
        .find_root(&active(&root), Some(dir.path()))
        .unwrap();
    let report = resolution.refreshed.unwrap();
    service.attach_root(&root, &report).await.unwrap();

    let manager = manager.read().await;
    assert!(manager.graph().children(&root).is_empty());
    assert_eq!(manager.graph().document_count(), 1);
}
