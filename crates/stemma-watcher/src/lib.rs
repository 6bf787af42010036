//! Stemma Watcher — filesystem watch layer and change reconciliation

pub mod watcher;

pub use watcher::{DocumentSource, FileWatcher, ReconcileService, WatchEvent};
