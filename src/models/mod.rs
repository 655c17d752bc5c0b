//! Data models for pluginsync.
//!
//! - [`PluginTable`] / [`PluginEntry`]: The in-memory plugin state mirrored to disk
//! - [`GameContext`]: Plugin directory, file format, and native plugins of the active game
//! - [`GamesConfig`]: Per-game lookup loaded from `Games.yaml`
//! - [`PersistorSettings`]: Retry, debounce, and header settings loaded from `Settings.yaml`

pub mod config;
pub mod plugin;

pub use config::{GameDefinition, GamesConfig, PersistorSettings};
pub use plugin::{
    GameContext, LOADORDER_FILE, NativePlugins, PLUGINS_FILE, PluginEntry, PluginFormat,
    PluginTable,
};
