use crate::models::plugin::{GameContext, NativePlugins, PluginFormat};
use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Game registry from Games.yaml
///
/// Maps a game id (e.g. "SSE", "FO4") to where its plugin files live and how they are laid out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GamesConfig {
    #[serde(rename = "Games", default)]
    pub games: IndexMap<String, GameDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameDefinition {
    #[serde(rename = "Plugin Dir")]
    pub plugin_dir: Utf8PathBuf,

    #[serde(rename = "Format", default)]
    pub format: PluginFormat,

    #[serde(rename = "Native Plugins", default)]
    pub native_plugins: Vec<String>,
}

impl GameDefinition {
    pub fn to_context(&self) -> GameContext {
        GameContext::new(
            &self.plugin_dir,
            self.format,
            NativePlugins::new(&self.native_plugins),
        )
    }
}

impl GamesConfig {
    /// Look up a game by id (case-insensitive) and build its sync context
    pub fn context_for(&self, game_id: &str) -> Option<GameContext> {
        self.games
            .iter()
            .find(|(id, _)| id.eq_ignore_ascii_case(game_id))
            .map(|(_, definition)| definition.to_context())
    }
}

/// Persistor tuning from Settings.yaml, overridable through `PLUGINSYNC_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistorSettings {
    /// Failed reads allowed before giving up and reporting
    pub retry_count: u32,

    pub retry_delay_ms: u64,

    /// Coalescing window for watcher-driven reloads
    pub refresh_debounce_ms: u64,

    /// Product named in the generated-by header line
    pub header_product: String,

    pub watch_files: bool,

    pub debug_mode: bool,

    pub log_dir: String,
}

impl Default for PersistorSettings {
    fn default() -> Self {
        Self {
            retry_count: 3,
            retry_delay_ms: 100,
            refresh_debounce_ms: 500,
            header_product: crate::APP_NAME.to_string(),
            watch_files: true,
            debug_mode: false,
            log_dir: "logs".to_string(),
        }
    }
}

impl PersistorSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn refresh_debounce(&self) -> Duration {
        Duration::from_millis(self.refresh_debounce_ms)
    }

    /// First line of both managed files
    pub fn header_line(&self) -> String {
        format!("# Automatically generated by {}", self.header_product)
    }
}
