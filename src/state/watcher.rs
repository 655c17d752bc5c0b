// File watching for the active game's plugin directory
//
// notify delivers events on its own thread; they are forwarded over a channel
// to a tokio task that hands them to the persistor.

use super::Inner;
use crate::error::PersistorError;
use crate::models::GameContext;
use camino::Utf8Path;
use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Live watch on one directory. Dropping it stops the watch.
pub(super) struct FileWatch {
    _watcher: Mutex<RecommendedWatcher>,
    task: JoinHandle<()>,
}

impl FileWatch {
    pub(super) fn start(inner: &Arc<Inner>, dir: &Utf8Path) -> Result<Self, PersistorError> {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // Receiver gone means the watch is being torn down
            let _ = tx.send(res);
        })?;
        watcher.watch(dir.as_std_path(), RecursiveMode::NonRecursive)?;

        let weak = Arc::downgrade(inner);
        let task = tokio::spawn(async move {
            while let Some(res) = rx.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                match res {
                    Ok(event) => inner.on_watch_event(&event),
                    Err(err) => tracing::warn!("File watch error: {}", err),
                }
            }
        });

        tracing::debug!("Watching {} for plugin list changes", dir);

        Ok(Self {
            _watcher: Mutex::new(watcher),
            task,
        })
    }
}

impl Drop for FileWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Whether the event kind can mean the file contents changed.
///
/// Reads (including our own) produce access events that must not trigger reloads.
pub(super) fn is_content_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => true,
        _ => false,
    }
}

/// Whether any path in the event is a file the context manages.
pub(super) fn touches_managed_file(event: &Event, context: &GameContext) -> bool {
    event
        .paths
        .iter()
        .filter_map(|path| path.file_name())
        .filter_map(|name| name.to_str())
        .any(|name| context.manages_file(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NativePlugins, PluginFormat};
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind};

    #[test]
    fn test_content_change_kinds() {
        assert!(is_content_change(&EventKind::Create(CreateKind::File)));
        assert!(is_content_change(&EventKind::Modify(ModifyKind::Data(
            DataChange::Content
        ))));
        assert!(is_content_change(&EventKind::Access(AccessKind::Close(
            AccessMode::Write
        ))));
        assert!(!is_content_change(&EventKind::Access(AccessKind::Open(
            AccessMode::Any
        ))));
        assert!(!is_content_change(&EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::AccessTime
        ))));
    }

    #[test]
    fn test_touches_managed_file() {
        let context = GameContext::new("/game", PluginFormat::Fallout4, NativePlugins::default());

        let plugins = Event::new(EventKind::Any).add_path("/game/Plugins.txt".into());
        let loadorder = Event::new(EventKind::Any).add_path("/game/loadorder.txt".into());
        let other = Event::new(EventKind::Any).add_path("/game/plugins.txt.tmp".into());

        assert!(touches_managed_file(&plugins, &context));
        assert!(!touches_managed_file(&loadorder, &context));
        assert!(!touches_managed_file(&other, &context));
    }
}
