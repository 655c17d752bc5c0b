// State management module
//
// This module provides the PluginPersistor, which owns the in-memory plugin
// table of the active game and keeps it in sync with loadorder.txt and
// plugins.txt in both directions.

mod watcher;

use crate::backend::{LOAD_ORDER_KEY, PersistenceBackend};
use crate::error::{ErrorReporter, PersistorError, TracingReporter};
use crate::metrics::Metrics;
use crate::models::{GameContext, PersistorSettings, PluginFormat, PluginTable};
use crate::services::plugin_files::{self, TableBuilder};
use camino::Utf8PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use watcher::FileWatch;

/// Events emitted as the persistor moves through its lifecycle
///
/// Subscribers get the same information the reset callback conveys, plus
/// write/read outcomes, without polling.
#[derive(Clone, Debug, PartialEq)]
pub enum PersistorEvent {
    /// A game context was installed
    SyncStarted { plugin_dir: Utf8PathBuf },

    /// The game context was cleared
    SyncStopped,

    /// The table was replaced from disk or cleared by `disable`
    TableReset { plugins: usize },

    /// A queued write pass completed
    WritePassFinished { success: bool },

    /// Reading failed and the retry budget is spent
    ReadFailed,
}

/// Host hook invoked when the table changes for reasons other than its own writes
pub type ResetCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct SyncState {
    table: PluginTable,
    context: Option<Arc<GameContext>>,

    /// Bumped whenever the context is installed or cleared; stale reads compare against it
    generation: u64,

    /// Set once a load completed (or was given up on). Writes are skipped until then.
    loaded: bool,

    /// True while a write pass is touching the files
    serializing: bool,

    /// Set after a reported failure; the next failure stays quiet until a success clears it
    failed: bool,

    retries_left: u32,

    /// The table was cleared by a game switch and the host has not heard about it yet
    reset_pending: bool,

    watch: Option<FileWatch>,
    refresh_timer: Option<JoinHandle<()>>,
}

enum ReadOutcome {
    Table(PluginTable),

    /// plugins.txt had zero bytes, which usually means it is mid-write
    EmptyPluginsFile(PluginTable),
}

struct Inner {
    state: RwLock<SyncState>,

    /// FIFO queue for file access: one write (or read) pass at a time, in request order
    io_queue: Mutex<()>,

    settings: PersistorSettings,
    reporter: Arc<dyn ErrorReporter>,
    reset_callback: RwLock<Option<ResetCallback>>,
    events_tx: broadcast::Sender<PersistorEvent>,
    metrics: Metrics,
}

/// Plugin state store for the active game
///
/// Holds the authoritative plugin table and mirrors it to disk:
/// - Every mutation through [`PersistenceBackend`] queues a write pass
/// - Write passes run strictly one after another, in the order they were requested
/// - External edits to the managed files are picked up by a debounced file watch
/// - Transient read failures are retried a bounded number of times
///
/// # Usage
///
/// ```ignore
/// let persistor = PluginPersistor::new(settings);
/// persistor.set_reset_callback(|| tracing::info!("plugin table reloaded"));
/// persistor.load_files(games.context_for("SSE").unwrap()).await;
///
/// let json = persistor.get(LOAD_ORDER_KEY).await?;
/// persistor.set(LOAD_ORDER_KEY, &json).await?;
/// ```
///
/// Cloning is cheap and every clone drives the same store.
#[derive(Clone)]
pub struct PluginPersistor {
    inner: Arc<Inner>,
}

impl PluginPersistor {
    /// Create a persistor that reports failures through `tracing`
    pub fn new(settings: PersistorSettings) -> Self {
        Self::with_reporter(settings, Arc::new(TracingReporter))
    }

    /// Create a persistor with a custom error sink
    pub fn with_reporter(settings: PersistorSettings, reporter: Arc<dyn ErrorReporter>) -> Self {
        let (events_tx, _) = broadcast::channel(100);
        let state = SyncState {
            retries_left: settings.retry_count,
            ..SyncState::default()
        };

        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(state),
                io_queue: Mutex::new(()),
                settings,
                reporter,
                reset_callback: RwLock::new(None),
                events_tx,
                metrics: Metrics::new(),
            }),
        }
    }

    /// Start syncing the given game, replacing whatever game was active.
    ///
    /// The previous watch and pending refresh are cancelled and the table is
    /// cleared before the new files are read. Reads still in flight for the
    /// old game are discarded when they finish. Returns after the initial load
    /// attempt; the watch is installed afterwards.
    pub async fn load_files(&self, context: GameContext) {
        let context = Arc::new(context);

        let (generation, old_watch) = {
            let mut state = self.inner.state_mut();
            state.generation += 1;
            state.context = Some(Arc::clone(&context));
            state.loaded = false;
            state.failed = false;
            state.retries_left = self.inner.settings.retry_count;
            if let Some(timer) = state.refresh_timer.take() {
                timer.abort();
            }
            state.reset_pending |= !state.table.is_empty();
            state.table.clear();
            (state.generation, state.watch.take())
        };
        drop(old_watch);

        tracing::info!(
            "Syncing plugin list in {} ({:?} format, {} native plugins)",
            context.plugin_dir(),
            context.format(),
            context.native_plugins().len()
        );
        self.inner.emit(PersistorEvent::SyncStarted {
            plugin_dir: context.plugin_dir().to_path_buf(),
        });

        self.inner.deserialize(generation).await;

        if !self.inner.settings.watch_files {
            return;
        }

        if let Err(err) = self.inner.ensure_watch(&context, generation) {
            self.inner
                .report("Failed to watch plugin directory for changes", &err);
        }
    }

    /// Stop syncing: clear the game context and stop watching.
    ///
    /// Passes already queued still run but find no context and do nothing.
    pub fn stop_sync(&self) {
        let (watch, timer) = {
            let mut state = self.inner.state_mut();
            state.generation += 1;
            state.context = None;
            (state.watch.take(), state.refresh_timer.take())
        };
        if let Some(timer) = timer {
            timer.abort();
        }
        drop(watch);

        tracing::info!("Stopped plugin list sync");
        self.inner.emit(PersistorEvent::SyncStopped);
    }

    /// Empty the table for a game whose plugins cannot be managed
    ///
    /// Stops watching and cancels any pending retry or refresh. Reads already in
    /// flight are discarded when they finish.
    pub fn disable(&self) {
        let (timer, watch) = {
            let mut state = self.inner.state_mut();
            state.generation += 1;
            state.table.clear();
            state.loaded = true;
            state.retries_left = self.inner.settings.retry_count;
            (state.refresh_timer.take(), state.watch.take())
        };
        if let Some(timer) = timer {
            timer.abort();
        }
        drop(watch);

        tracing::info!("Plugin management disabled for the current game");
        self.inner.notify_reset();
    }

    /// Register the callback fired after the table is replaced out of band
    ///
    /// Replaces any previously registered callback.
    pub fn set_reset_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self
            .inner
            .reset_callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<PersistorEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Re-read the files of the active game now
    pub async fn reload(&self) {
        let generation = self.inner.state().generation;
        self.inner.deserialize(generation).await;
    }

    /// Copy of the current table
    pub fn snapshot(&self) -> PluginTable {
        self.inner.state().table.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.state().loaded
    }

    pub fn context(&self) -> Option<Arc<GameContext>> {
        self.inner.state().context.clone()
    }

    pub fn settings(&self) -> &PersistorSettings {
        &self.inner.settings
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }
}

impl PersistenceBackend for PluginPersistor {
    /// The whole table as JSON; there is only one record, so `key` is ignored
    async fn get(&self, _key: &str) -> Result<String, PersistorError> {
        let json = serde_json::to_string(&self.inner.state().table)?;
        Ok(json)
    }

    /// Replace the whole table and write it out.
    ///
    /// Invalid JSON is returned to the caller. Write failures go to the error sink.
    async fn set(&self, key: &str, value: &str) -> Result<(), PersistorError> {
        let table: PluginTable = serde_json::from_str(value)?;
        tracing::debug!("Replacing plugin table via '{}' ({} entries)", key, table.len());

        self.inner.state_mut().table = table;
        self.inner.serialize().await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PersistorError> {
        let removed = self.inner.state_mut().table.shift_remove(key).is_some();
        if removed {
            tracing::debug!("Removed {} from plugin table", key);
        }

        self.inner.serialize().await;
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>, PersistorError> {
        Ok(vec![LOAD_ORDER_KEY.to_string()])
    }
}

impl Inner {
    fn state(&self) -> RwLockReadGuard<'_, SyncState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, SyncState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: PersistorEvent) {
        // Ignore send errors - it's OK if no one is listening
        let _ = self.events_tx.send(event);
    }

    fn report(&self, message: &str, error: &PersistorError) {
        self.reporter.report(message, error);
    }

    fn context_if_current(&self, generation: u64) -> Option<Arc<GameContext>> {
        let state = self.state();
        if state.generation == generation {
            state.context.clone()
        } else {
            None
        }
    }

    fn notify_reset(&self) {
        let plugins = {
            let mut state = self.state_mut();
            state.reset_pending = false;
            state.table.len()
        };
        self.metrics.record_table_reset();

        let callback = self
            .reset_callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback();
        }

        self.emit(PersistorEvent::TableReset { plugins });
    }

    /// Queue one write pass and wait for it.
    ///
    /// The pass writes whatever the table holds when its turn comes.
    async fn serialize(self: &Arc<Self>) {
        if !self.state().loaded {
            tracing::debug!("Plugin list not loaded yet, skipping write");
            return;
        }

        let _queue = self.io_queue.lock().await;

        let snapshot = {
            let mut state = self.state_mut();
            match state.context.clone() {
                Some(context) if state.loaded => {
                    state.serializing = true;
                    Some((context, state.table.clone(), state.generation))
                }
                _ => None,
            }
        };
        let Some((context, table, generation)) = snapshot else {
            tracing::debug!("No loaded game context, skipping write");
            return;
        };

        let started = Instant::now();
        let result = self.write_files(&context, &table).await;

        let first_failure = {
            let mut state = self.state_mut();
            state.serializing = false;
            match result {
                Ok(()) => {
                    state.failed = false;
                    false
                }
                Err(_) => !std::mem::replace(&mut state.failed, true),
            }
        };

        let success = result.is_ok();
        self.metrics.record_write_pass(started.elapsed(), success);

        match &result {
            Ok(()) => {
                tracing::debug!("Wrote {} plugins to {}", table.len(), context.plugin_dir());
                // Picks up a watch that failed before the directory existed
                if self.settings.watch_files {
                    if let Err(err) = self.ensure_watch(&context, generation) {
                        tracing::debug!("Plugin directory still not watchable: {}", err);
                    }
                }
            }
            Err(err) if first_failure => self.report("Failed to save plugin list", err),
            Err(err) => tracing::debug!("Plugin list write failed again: {}", err),
        }

        self.emit(PersistorEvent::WritePassFinished { success });
    }

    /// Start watching `context` unless a watch is already running or the context moved on.
    fn ensure_watch(
        self: &Arc<Self>,
        context: &GameContext,
        generation: u64,
    ) -> Result<(), PersistorError> {
        {
            let state = self.state();
            if state.generation != generation || state.watch.is_some() {
                return Ok(());
            }
        }

        let watch = FileWatch::start(self, context.plugin_dir())?;

        let mut state = self.state_mut();
        if state.generation == generation && state.watch.is_none() {
            state.watch = Some(watch);
        }
        Ok(())
    }

    async fn write_files(
        &self,
        context: &GameContext,
        table: &PluginTable,
    ) -> Result<(), PersistorError> {
        let header = self.settings.header_line();
        let names = plugin_files::sorted_plugin_names(table, context.native_plugins());

        tokio::fs::create_dir_all(context.plugin_dir())
            .await
            .map_err(|e| PersistorError::write(context.plugin_dir().to_path_buf(), e))?;

        if context.format() == PluginFormat::Original {
            let path = context.loadorder_path();
            tokio::fs::write(&path, plugin_files::render_loadorder(&header, &names))
                .await
                .map_err(|e| PersistorError::write(path, e))?;
        }

        let lines = plugin_files::plugins_lines(context.format(), &names, table);
        let path = context.plugins_path();
        tokio::fs::write(&path, plugin_files::render_plugins(&header, &lines))
            .await
            .map_err(|e| PersistorError::write(path, e))?;

        Ok(())
    }

    /// Rebuild the table from disk for the context of `generation`.
    async fn deserialize(self: &Arc<Self>, generation: u64) {
        let Some(context) = self.context_if_current(generation) else {
            tracing::debug!("No active game context, skipping plugin list read");
            return;
        };

        let mut first_attempt = true;
        let outcome = loop {
            let result = {
                let _queue = self.io_queue.lock().await;
                self.read_files(&context).await
            };

            match result {
                Ok(ReadOutcome::EmptyPluginsFile(_)) if first_attempt => {
                    first_attempt = false;
                    tracing::debug!("{} is empty, reading once more", context.plugins_path());
                    tokio::time::sleep(self.settings.retry_delay()).await;
                }
                Ok(ReadOutcome::Table(table) | ReadOutcome::EmptyPluginsFile(table)) => {
                    break Ok(table);
                }
                Err(err) => break Err(err),
            }
        };

        if self.state().generation != generation {
            tracing::debug!("Game context changed during read, discarding result");
            return;
        }

        match outcome {
            Ok(table) => {
                let plugins = table.len();
                {
                    let mut state = self.state_mut();
                    state.table = table;
                    state.loaded = true;
                    state.failed = false;
                    state.retries_left = self.settings.retry_count;
                }
                tracing::info!("Loaded {} plugins from {}", plugins, context.plugin_dir());
                self.notify_reset();
            }
            Err(err) if err.is_not_found() => {
                let reset_pending = {
                    let mut state = self.state_mut();
                    state.loaded = true;
                    state.reset_pending
                };
                tracing::info!("No plugin list yet ({}), keeping current table", err);
                if reset_pending {
                    self.notify_reset();
                }
            }
            Err(err) => self.handle_read_failure(err, generation),
        }
    }

    fn handle_read_failure(self: &Arc<Self>, err: PersistorError, generation: u64) {
        self.metrics.record_read_failure();

        let (retry, reset_pending) = {
            let mut state = self.state_mut();
            if state.retries_left > 0 {
                state.retries_left -= 1;
                (true, false)
            } else {
                state.loaded = true;
                (false, state.reset_pending)
            }
        };

        if retry {
            let delay = self.settings.retry_delay();
            tracing::warn!("Failed to read plugin list, retrying in {:?}: {}", delay, err);
            self.metrics.record_read_retry();
            self.schedule_refresh(delay, generation);
            return;
        }

        if reset_pending {
            self.notify_reset();
        }

        let first_failure = !std::mem::replace(&mut self.state_mut().failed, true);
        if first_failure {
            self.report("Failed to read plugin list", &err);
        } else {
            tracing::debug!("Plugin list read failed again: {}", err);
        }
        self.emit(PersistorEvent::ReadFailed);
    }

    async fn read_files(&self, context: &GameContext) -> Result<ReadOutcome, PersistorError> {
        self.metrics.record_read_attempt();

        let natives = context.native_plugins();
        let mut builder = TableBuilder::new();

        if context.format() == PluginFormat::Original {
            let path = context.loadorder_path();
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| PersistorError::read(path, e))?;
            builder.add_loadorder(&plugin_files::decode_loadorder(&bytes), natives);
        }

        let path = context.plugins_path();
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| PersistorError::read(path, e))?;
        builder.add_plugins(
            &plugin_files::decode_latin1(&bytes),
            context.format(),
            natives,
        );

        let table = builder.finish();
        Ok(if bytes.is_empty() {
            ReadOutcome::EmptyPluginsFile(table)
        } else {
            ReadOutcome::Table(table)
        })
    }

    /// Run a deserialize after `delay`, replacing any pending one.
    ///
    /// The timer only spawns the read, so cancelling it never interrupts a read in progress.
    fn schedule_refresh(self: &Arc<Self>, delay: Duration, generation: u64) {
        let weak = Arc::downgrade(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                tokio::spawn(async move { inner.deserialize(generation).await });
            }
        });

        let previous = self.state_mut().refresh_timer.replace(timer);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn on_watch_event(self: &Arc<Self>, event: &notify::Event) {
        if !watcher::is_content_change(&event.kind) {
            return;
        }

        let (generation, serializing) = {
            let state = self.state();
            let Some(context) = state.context.as_ref() else {
                return;
            };
            if !watcher::touches_managed_file(event, context) {
                return;
            }
            (state.generation, state.serializing)
        };

        if serializing {
            self.metrics.record_suppressed_event();
            tracing::debug!("Ignoring change event from our own write: {:?}", event.paths);
            return;
        }

        tracing::debug!("Plugin list changed on disk: {:?}", event.paths);
        self.metrics.record_watch_refresh();
        self.schedule_refresh(self.settings.refresh_debounce(), generation);
    }
}
