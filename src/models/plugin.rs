use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// File listing every managed plugin in load order (`original` format only).
pub const LOADORDER_FILE: &str = "loadorder.txt";

/// File listing enabled plugins (`original`) or all plugins with `*` markers (`fallout4`).
pub const PLUGINS_FILE: &str = "plugins.txt";

/// State of a single plugin in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginEntry {
    pub enabled: bool,

    /// Rank used to order the files. Only the relative order matters.
    pub load_order: i64,
}

impl PluginEntry {
    pub fn new(enabled: bool, load_order: i64) -> Self {
        Self {
            enabled,
            load_order,
        }
    }
}

/// Plugin name (case preserved) to state.
///
/// Insertion order is kept so the JSON form handed to the host is stable.
pub type PluginTable = IndexMap<String, PluginEntry>;

/// On-disk layout convention of the active game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PluginFormat {
    /// `loadorder.txt` holds the order, `plugins.txt` the enabled subset.
    #[default]
    Original,

    /// `plugins.txt` alone holds the order; enabled lines start with `*`.
    Fallout4,
}

impl PluginFormat {
    /// Files this format reads and writes, in write order.
    pub fn managed_files(self) -> &'static [&'static str] {
        match self {
            PluginFormat::Original => &[LOADORDER_FILE, PLUGINS_FILE],
            PluginFormat::Fallout4 => &[PLUGINS_FILE],
        }
    }
}

/// Plugins shipped with the base game. Compared case-insensitively and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativePlugins {
    names: HashSet<String>,
}

impl NativePlugins {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|name| name.as_ref().trim().to_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    pub fn contains(&self, plugin: &str) -> bool {
        self.names.contains(&plugin.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Everything the persistor needs to know about the active game.
///
/// Built once when a game becomes active and replaced whole, never patched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameContext {
    plugin_dir: Utf8PathBuf,
    format: PluginFormat,
    native_plugins: NativePlugins,
}

impl GameContext {
    pub fn new<P: AsRef<Utf8Path>>(
        plugin_dir: P,
        format: PluginFormat,
        native_plugins: NativePlugins,
    ) -> Self {
        Self {
            plugin_dir: plugin_dir.as_ref().to_path_buf(),
            format,
            native_plugins,
        }
    }

    pub fn plugin_dir(&self) -> &Utf8Path {
        &self.plugin_dir
    }

    pub fn format(&self) -> PluginFormat {
        self.format
    }

    pub fn native_plugins(&self) -> &NativePlugins {
        &self.native_plugins
    }

    pub fn loadorder_path(&self) -> Utf8PathBuf {
        self.plugin_dir.join(LOADORDER_FILE)
    }

    pub fn plugins_path(&self) -> Utf8PathBuf {
        self.plugin_dir.join(PLUGINS_FILE)
    }

    /// Whether `file_name` is one of the files this context reads or writes.
    pub fn manages_file(&self, file_name: &str) -> bool {
        self.format
            .managed_files()
            .iter()
            .any(|managed| managed.eq_ignore_ascii_case(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_plugins_case_insensitive() {
        let natives = NativePlugins::new(["Skyrim.esm", "Update.esm", ""]);

        assert_eq!(natives.len(), 2);
        assert!(natives.contains("skyrim.esm"));
        assert!(natives.contains("UPDATE.ESM"));
        assert!(!natives.contains("Dawnguard.esm"));
    }

    #[test]
    fn test_entry_json_field_names() {
        let json = serde_json::to_string(&PluginEntry::new(true, 4)).unwrap();
        assert_eq!(json, r#"{"enabled":true,"loadOrder":4}"#);
    }

    #[test]
    fn test_format_serde_names() {
        let format: PluginFormat = serde_json::from_str("\"fallout4\"").unwrap();
        assert_eq!(format, PluginFormat::Fallout4);
        assert_eq!(
            serde_json::to_string(&PluginFormat::Original).unwrap(),
            "\"original\""
        );
    }

    #[test]
    fn test_managed_files_per_format() {
        let original = GameContext::new("/game", PluginFormat::Original, NativePlugins::default());
        let fallout4 = GameContext::new("/game", PluginFormat::Fallout4, NativePlugins::default());

        assert!(original.manages_file("LoadOrder.txt"));
        assert!(original.manages_file("plugins.txt"));
        assert!(!fallout4.manages_file("loadorder.txt"));
        assert!(fallout4.manages_file("Plugins.txt"));
        assert!(!original.manages_file("plugins.txt.bak"));
    }
}
