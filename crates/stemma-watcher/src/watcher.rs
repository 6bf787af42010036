//! Filesystem watcher and change reconciliation

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use stemma_core::{
    ActiveDocument, CitationCache, DependencyManager, ScanEvent, ScanReport, is_tex_source,
    normalize,
};
use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Events emitted by the file watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A watched file's content changed
    Modified(PathBuf),
    /// A watched file was deleted
    Removed(PathBuf),
}

/// Supplies the currently active document and project scope on demand.
/// Hosts implement this over their editor state; the CLI reads from disk.
pub trait DocumentSource: Send + Sync {
    /// Full text and path of the currently active document, if any.
    fn active_document(&self) -> Option<ActiveDocument>;
    /// Current project scope directory, if any.
    fn project_scope(&self) -> Option<PathBuf>;
}

/// Per-file watcher over the discovered document and resource set.
///
/// Registrations are non-recursive and track exactly the paths discovery
/// reported; `rebuild` discards the OS watcher wholesale when a root change
/// invalidates the registration set.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    event_tx: mpsc::UnboundedSender<WatchEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<WatchEvent>>,
    watched: HashSet<PathBuf>,
}

impl FileWatcher {
    pub fn new() -> Result<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let watcher = Self::spawn_watcher(event_tx.clone())?;
        Ok(Self {
            watcher,
            event_tx,
            event_rx: Some(event_rx),
            watched: HashSet::new(),
        })
    }

    fn spawn_watcher(event_tx: mpsc::UnboundedSender<WatchEvent>) -> Result<RecommendedWatcher> {
        let watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                match res {
                    Ok(event) => Self::translate(event, &event_tx),
                    Err(e) => error!(error = %e, "filesystem watch error"),
                }
            })?;
        Ok(watcher)
    }

    fn translate(event: notify::Event, event_tx: &mpsc::UnboundedSender<WatchEvent>) {
        match event.kind {
            notify::EventKind::Modify(_) => {
                for path in event.paths {
                    let _ = event_tx.send(WatchEvent::Modified(path));
                }
            }
            notify::EventKind::Remove(_) => {
                for path in event.paths {
                    let _ = event_tx.send(WatchEvent::Removed(path));
                }
            }
            _ => {}
        }
    }

    /// Register a path. Returns true when the path was newly registered.
    pub fn watch(&mut self, path: &Path) -> Result<bool> {
        if self.watched.contains(path) {
            return Ok(false);
        }
        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        self.watched.insert(path.to_path_buf());
        Ok(true)
    }

    /// Drop a registration. Unwatching a path the OS already forgot (a
    /// deleted file) is not an error.
    pub fn unwatch(&mut self, path: &Path) -> bool {
        if !self.watched.remove(path) {
            return false;
        }
        if let Err(e) = self.watcher.unwatch(path) {
            debug!(path = %path.display(), error = %e, "unwatch failed, registration dropped anyway");
        }
        true
    }

    /// Discard the OS watcher and every registration, keeping the event
    /// channel. Used when the active root moves outside the watched set.
    pub fn rebuild(&mut self) -> Result<()> {
        self.watcher = Self::spawn_watcher(self.event_tx.clone())?;
        self.watched.clear();
        Ok(())
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched.contains(path)
    }

    pub fn watched(&self) -> &HashSet<PathBuf> {
        &self.watched
    }

    /// Take the event receiver for the reconciliation loop. Yields `None`
    /// after the first call.
    pub fn take_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<WatchEvent>> {
        self.event_rx.take()
    }
}

/// Binds watch events to dependency manager operations: modified documents
/// are re-scanned and merged, deleted documents leave the graph, and a
/// deleted root triggers re-identification through the document source.
pub struct ReconcileService {
    manager: Arc<RwLock<DependencyManager>>,
    watcher: Arc<RwLock<FileWatcher>>,
    citations: Arc<CitationCache>,
    source: Arc<dyn DocumentSource>,
    event_tx: Option<broadcast::Sender<String>>,
}

impl ReconcileService {
    pub fn new(
        manager: Arc<RwLock<DependencyManager>>,
        source: Arc<dyn DocumentSource>,
    ) -> Result<Self> {
        Ok(Self {
            manager,
            watcher: Arc::new(RwLock::new(FileWatcher::new()?)),
            citations: Arc::new(CitationCache::new()),
            source,
            event_tx: None,
        })
    }

    /// Create a service that publishes [`ScanEvent`]s as JSON on the given
    /// broadcast channel after each reconciliation step.
    pub fn with_broadcast(
        manager: Arc<RwLock<DependencyManager>>,
        source: Arc<dyn DocumentSource>,
        event_tx: broadcast::Sender<String>,
    ) -> Result<Self> {
        Ok(Self {
            manager,
            watcher: Arc::new(RwLock::new(FileWatcher::new()?)),
            citations: Arc::new(CitationCache::new()),
            source,
            event_tx: Some(event_tx),
        })
    }

    pub fn manager(&self) -> Arc<RwLock<DependencyManager>> {
        Arc::clone(&self.manager)
    }

    pub fn citations(&self) -> Arc<CitationCache> {
        Arc::clone(&self.citations)
    }

    /// Point the watch registration at a (possibly new) root. If the root
    /// falls outside the current registration, the old watcher is discarded
    /// and a fresh one built; otherwise the registration is extended.
    pub async fn attach_root(&self, root: &Path, report: &ScanReport) -> Result<()> {
        let root = normalize(root);
        {
            let mut watcher = self.watcher.write().await;
            if !watcher.is_watching(&root) && !watcher.watched().is_empty() {
                info!(root = %root.display(), "root moved outside watch registration, rebuilding watcher");
                watcher.rebuild()?;
            }
            match watcher.watch(&root) {
                Ok(true) => debug!(path = %root.display(), "watching root"),
                Ok(false) => {}
                Err(e) => warn!(path = %root.display(), error = %e, "cannot watch root"),
            }
        }
        self.apply_report(report).await
    }

    /// Extend the watch registration to everything a scan pass discovered,
    /// index newly seen resources, and notify dependent indexers.
    pub async fn apply_report(&self, report: &ScanReport) -> Result<()> {
        let mut fresh_resources = Vec::new();
        {
            let mut watcher = self.watcher.write().await;
            for path in &report.discovered {
                match watcher.watch(path) {
                    Ok(true) => debug!(path = %path.display(), "watching document"),
                    Ok(false) => {}
                    Err(e) => warn!(path = %path.display(), error = %e, "cannot watch document"),
                }
            }
            for path in &report.resources {
                match watcher.watch(path) {
                    Ok(true) => fresh_resources.push(path.clone()),
                    Ok(false) => {}
                    Err(e) => warn!(path = %path.display(), error = %e, "cannot watch resource"),
                }
            }
        }
        for path in fresh_resources {
            self.citations.index_file(&path);
            self.emit(ScanEvent::ResourceIndexed { path });
        }
        for path in &report.scanned {
            self.emit(ScanEvent::DocumentScanned { path: path.clone() });
        }
        Ok(())
    }

    /// Drain watch events until the channel closes. Call once, after
    /// `attach_root`.
    pub async fn process_events(&self) -> Result<()> {
        let mut event_rx = {
            let mut watcher = self.watcher.write().await;
            watcher
                .take_receiver()
                .context("event receiver already taken")?
        };
        while let Some(event) = event_rx.recv().await {
            debug!(?event, "watch event");
            match event {
                WatchEvent::Modified(path) => self.handle_modified(&path).await?,
                WatchEvent::Removed(path) => self.handle_removed(&path).await?,
            }
        }
        Ok(())
    }

    async fn handle_modified(&self, path: &Path) -> Result<()> {
        let path = normalize(path);
        let is_resource = self.manager.read().await.is_known_resource(&path);
        if is_resource {
            info!(path = %path.display(), "resource changed, re-indexing");
            self.citations.index_file(&path);
            self.emit(ScanEvent::ResourceIndexed { path });
            return Ok(());
        }
        if !is_tex_source(&path) {
            debug!(path = %path.display(), "ignoring change to non-source file");
            return Ok(());
        }
        info!(path = %path.display(), "document changed, re-scanning");
        let rescan = self.manager.write().await.rescan(&path);
        match rescan {
            Ok(report) => self.apply_report(&report).await,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "re-scan failed");
                Ok(())
            }
        }
    }

    async fn handle_removed(&self, path: &Path) -> Result<()> {
        let path = normalize(path);
        self.watcher.write().await.unwatch(&path);
        let (was_resource, was_root) = {
            let mut manager = self.manager.write().await;
            if manager.is_known_resource(&path) {
                manager.forget_resource(&path);
                (true, false)
            } else {
                (false, manager.remove_document(&path))
            }
        };
        if was_resource {
            info!(path = %path.display(), "resource deleted, dropping cached citations");
            self.citations.forget(&path);
            self.emit(ScanEvent::ResourceForgotten { path });
        } else if was_root {
            self.reidentify_root().await?;
        }
        Ok(())
    }

    /// The active root was deleted; run root identification from scratch
    /// using whatever the document source currently reports.
    async fn reidentify_root(&self) -> Result<()> {
        let Some(active) = self.source.active_document() else {
            info!("no active document, root identification deferred");
            return Ok(());
        };
        let scope = self.source.project_scope();
        let resolution = {
            let mut manager = self.manager.write().await;
            manager.find_root(&active, scope.as_deref())
        };
        match resolution {
            Some(resolution) => {
                info!(
                    root = %resolution.root.display(),
                    strategy = %resolution.strategy,
                    "root re-identified"
                );
                let report = resolution.refreshed.unwrap_or_default();
                self.attach_root(&resolution.root, &report).await
            }
            None => {
                info!("no root identified after deletion, keeping previous graph");
                Ok(())
            }
        }
    }

    fn emit(&self, event: ScanEvent) {
        let Some(event_tx) = &self.event_tx else {
            return;
        };
        match serde_json::to_string(&event) {
            // no receivers is fine, nobody is listening yet
            Ok(json) => {
                let _ = event_tx.send(json);
            }
            Err(e) => error!(error = %e, "failed to serialize scan event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use stemma_core::ScanMode;
    use tempfile::TempDir;
    use tokio::time::{Duration, sleep};

    struct StaticSource {
        path: PathBuf,
        scope: Option<PathBuf>,
    }

    impl DocumentSource for StaticSource {
        fn active_document(&self) -> Option<ActiveDocument> {
            let text = fs::read_to_string(&self.path).ok()?;
            Some(ActiveDocument {
                path: normalize(&self.path),
                text,
            })
        }

        fn project_scope(&self) -> Option<PathBuf> {
            self.scope.clone()
        }
    }

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        normalize(&path)
    }

    fn service_for(dir: &Path, active: &Path) -> ReconcileService {
        let source = Arc::new(StaticSource {
            path: active.to_path_buf(),
            scope: Some(dir.to_path_buf()),
        });
        ReconcileService::new(Arc::new(RwLock::new(DependencyManager::new())), source).unwrap()
    }

    #[test]
    fn watch_registration_roundtrip() {
        let dir = TempDir::new().unwrap();
        let file = write(dir.path(), "main.tex", "x");
        let mut watcher = FileWatcher::new().unwrap();

        assert!(watcher.watch(&file).unwrap());
        assert!(watcher.is_watching(&file));
        // second registration is a no-op
        assert!(!watcher.watch(&file).unwrap());

        assert!(watcher.unwatch(&file));
        assert!(!watcher.is_watching(&file));
        assert!(!watcher.unwatch(&file));
    }

    #[test]
    fn rebuild_clears_registrations() {
        let dir = TempDir::new().unwrap();
        let file = write(dir.path(), "main.tex", "x");
        let mut watcher = FileWatcher::new().unwrap();
        watcher.watch(&file).unwrap();

        watcher.rebuild().unwrap();
        assert!(watcher.watched().is_empty());
        // the event channel survives a rebuild
        assert!(watcher.watch(&file).unwrap());
    }

    #[tokio::test]
    async fn modified_event_delivery() {
        let dir = TempDir::new().unwrap();
        let file = write(dir.path(), "main.tex", "before");
        let mut watcher = FileWatcher::new().unwrap();
        watcher.watch(&file).unwrap();

        fs::write(&file, "after").unwrap();
        sleep(Duration::from_millis(200)).await;

        let mut event_rx = watcher.take_receiver().unwrap();
        // platform watchers deliver with varying latency; only assert on
        // events that actually arrived
        if let Ok(event) = event_rx.try_recv() {
            match event {
                WatchEvent::Modified(path) | WatchEvent::Removed(path) => {
                    assert_eq!(normalize(&path), file);
                }
            }
        }
    }

    #[tokio::test]
    async fn attach_root_watches_discovered_set_and_indexes_resources() {
        let dir = TempDir::new().unwrap();
        let root = write(
            dir.path(),
            "main.tex",
            "\\begin{document}\\input{ch}\\bibliography{refs}\\end{document}",
        );
        let ch = write(dir.path(), "ch.tex", "body");
        let refs = write(dir.path(), "refs.bib", "@article{knuth84, title={L}}");

        let service = service_for(dir.path(), &root);
        let report = {
            let mut manager = service.manager.write().await;
            manager.discover(&root, ScanMode::Full).unwrap()
        };
        service.attach_root(&root, &report).await.unwrap();

        let watcher = service.watcher.read().await;
        assert!(watcher.is_watching(&root));
        assert!(watcher.is_watching(&ch));
        assert!(watcher.is_watching(&refs));
        assert_eq!(service.citations.keys_for(&refs), vec!["knuth84"]);
    }

    #[tokio::test]
    async fn modified_document_extends_watch_set() {
        let dir = TempDir::new().unwrap();
        let root = write(dir.path(), "main.tex", "\\begin{document}\\end{document}");
        let service = service_for(dir.path(), &root);
        let report = {
            let mut manager = service.manager.write().await;
            let resolution = manager
                .find_root(&service.source.active_document().unwrap(), None)
                .unwrap();
            resolution.refreshed.unwrap()
        };
        service.attach_root(&root, &report).await.unwrap();

        let fresh = write(dir.path(), "fresh.tex", "new");
        fs::write(&root, "\\begin{document}\\input{fresh}\\end{document}").unwrap();
        service.handle_modified(&root).await.unwrap();

        let watcher = service.watcher.read().await;
        assert!(watcher.is_watching(&fresh));
        assert_eq!(
            service.manager.read().await.graph().children(&root),
            vec![fresh]
        );
    }

    #[tokio::test]
    async fn deleted_resource_is_forgotten_not_errored() {
        let dir = TempDir::new().unwrap();
        let root = write(
            dir.path(),
            "main.tex",
            "\\begin{document}\\bibliography{refs}\\end{document}",
        );
        let refs = write(dir.path(), "refs.bib", "@misc{m, title={M}}");
        let service = service_for(dir.path(), &root);
        let report = {
            let mut manager = service.manager.write().await;
            let resolution = manager
                .find_root(&service.source.active_document().unwrap(), None)
                .unwrap();
            resolution.refreshed.unwrap()
        };
        service.attach_root(&root, &report).await.unwrap();
        assert!(!service.citations.is_empty());

        fs::remove_file(&refs).unwrap();
        service.handle_removed(&refs).await.unwrap();

        assert!(service.citations.is_empty());
        assert!(!service.manager.read().await.is_known_resource(&refs));
        assert!(!service.watcher.read().await.is_watching(&refs));
        // the root is still watched and associated
        assert_eq!(
            service.manager.read().await.active_root(),
            Some(root.as_path())
        );
    }

    #[tokio::test]
    async fn deleted_non_root_document_does_not_reidentify() {
        let dir = TempDir::new().unwrap();
        let root = write(
            dir.path(),
            "main.tex",
            "\\begin{document}\\input{ch}\\end{document}",
        );
        let ch = write(dir.path(), "ch.tex", "body");
        let service = service_for(dir.path(), &root);
        let report = {
            let mut manager = service.manager.write().await;
            let resolution = manager
                .find_root(&service.source.active_document().unwrap(), None)
                .unwrap();
            resolution.refreshed.unwrap()
        };
        service.attach_root(&root, &report).await.unwrap();

        fs::remove_file(&ch).unwrap();
        service.handle_removed(&ch).await.unwrap();

        let manager = service.manager.read().await;
        assert_eq!(manager.active_root(), Some(root.as_path()));
        assert!(!manager.graph().contains(&ch));
        assert!(!service.watcher.read().await.is_watching(&ch));
    }

    #[tokio::test]
    async fn deleted_root_triggers_reidentification_and_watcher_rebuild() {
        let dir = TempDir::new().unwrap();
        let first = write(
            dir.path(),
            "a_main.tex",
            "\\begin{document}\\input{ch}\\end{document}",
        );
        let second = write(
            dir.path(),
            "b_main.tex",
            "\\begin{document}\\input{ch}\\end{document}",
        );
        let ch = write(dir.path(), "ch.tex", "shared chapter");

        // active document is the chapter; candidate order picks a_main first
        let service = service_for(dir.path(), &ch);
        let report = {
            let mut manager = service.manager.write().await;
            let resolution = manager
                .find_root(
                    &service.source.active_document().unwrap(),
                    Some(dir.path()),
                )
                .unwrap();
            assert_eq!(resolution.root, first);
            resolution.refreshed.unwrap()
        };
        service.attach_root(&first, &report).await.unwrap();

        fs::remove_file(&first).unwrap();
        service.handle_removed(&first).await.unwrap();

        let manager = service.manager.read().await;
        assert_eq!(manager.active_root(), Some(second.as_path()));
        let watcher = service.watcher.read().await;
        assert!(watcher.is_watching(&second));
        assert!(watcher.is_watching(&ch));
        assert!(!watcher.is_watching(&first));
    }
}
