use crate::models::{GameDefinition, GamesConfig, PersistorSettings, PluginFormat};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::fs;

/// Prefix for environment variables overriding [`PersistorSettings`] (e.g. `PLUGINSYNC_RETRY_COUNT`).
pub const ENV_PREFIX: &str = "PLUGINSYNC";

/// Configuration manager for loading and saving YAML configuration files.
///
/// Manages two configuration files:
/// - Games config (`Games.yaml`): Plugin directory, file format, and native plugins per game
/// - Settings (`Settings.yaml`): Retry, debounce, watch, and logging settings
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    games_config_path: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory containing configuration files (e.g., "pluginsync Data")
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            games_config_path: config_dir.join("Games.yaml"),
            settings_path: config_dir.join("Settings.yaml"),
            config_dir,
        })
    }

    /// Load the games configuration file.
    ///
    /// # Returns
    /// The loaded GamesConfig, or the built-in defaults if the file doesn't exist
    pub fn load_games_config(&self) -> Result<GamesConfig> {
        if !self.games_config_path.exists() {
            tracing::warn!(
                "Games config file not found at {}, using defaults",
                self.games_config_path
            );
            return Ok(Self::default_games_config());
        }

        let file_contents = fs::read_to_string(&self.games_config_path).with_context(|| {
            format!("Failed to read games config: {}", self.games_config_path)
        })?;

        let config: GamesConfig = serde_yaml_ng::from_str(&file_contents).with_context(|| {
            format!("Failed to parse games config: {}", self.games_config_path)
        })?;

        tracing::info!(
            "Loaded {} games from {}",
            config.games.len(),
            self.games_config_path
        );
        Ok(config)
    }

    /// Save the games configuration file.
    pub fn save_games_config(&self, config: &GamesConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize games config to YAML")?;

        fs::write(&self.games_config_path, yaml_string).with_context(|| {
            format!("Failed to write games config: {}", self.games_config_path)
        })?;

        tracing::info!("Saved games config to {}", self.games_config_path);
        Ok(())
    }

    /// Load persistor settings.
    ///
    /// Layers, lowest to highest priority:
    /// 1. Built-in defaults
    /// 2. `Settings.yaml` (optional)
    /// 3. `PLUGINSYNC_*` environment variables
    pub fn load_settings(&self) -> Result<PersistorSettings> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(self.settings_path.as_std_path())
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .with_context(|| format!("Failed to load settings: {}", self.settings_path))?
            .try_deserialize::<PersistorSettings>()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!(
            "Loaded settings: retries={}, retry_delay={}ms, debounce={}ms, watch={}",
            settings.retry_count,
            settings.retry_delay_ms,
            settings.refresh_debounce_ms,
            settings.watch_files
        );
        Ok(settings)
    }

    /// Save persistor settings.
    pub fn save_settings(&self, settings: &PersistorSettings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Built-in game registry used when `Games.yaml` doesn't exist.
    ///
    /// Plugin directories are placeholders; users point them at their own install.
    fn default_games_config() -> GamesConfig {
        let mut games = IndexMap::new();

        games.insert(
            "SSE".to_string(),
            GameDefinition {
                plugin_dir: Utf8PathBuf::from("Skyrim Special Edition"),
                format: PluginFormat::Fallout4,
                native_plugins: vec![
                    "Skyrim.esm".to_string(),
                    "Update.esm".to_string(),
                    "Dawnguard.esm".to_string(),
                    "HearthFires.esm".to_string(),
                    "Dragonborn.esm".to_string(),
                ],
            },
        );

        games.insert(
            "FO4".to_string(),
            GameDefinition {
                plugin_dir: Utf8PathBuf::from("Fallout4"),
                format: PluginFormat::Fallout4,
                native_plugins: vec![
                    "Fallout4.esm".to_string(),
                    "DLCRobot.esm".to_string(),
                    "DLCworkshop01.esm".to_string(),
                    "DLCCoast.esm".to_string(),
                    "DLCworkshop02.esm".to_string(),
                    "DLCworkshop03.esm".to_string(),
                    "DLCNukaWorld.esm".to_string(),
                ],
            },
        );

        games.insert(
            "FO3".to_string(),
            GameDefinition {
                plugin_dir: Utf8PathBuf::from("Fallout3"),
                format: PluginFormat::Original,
                native_plugins: vec!["Fallout3.esm".to_string()],
            },
        );

        games.insert(
            "FNV".to_string(),
            GameDefinition {
                plugin_dir: Utf8PathBuf::from("FalloutNV"),
                format: PluginFormat::Original,
                native_plugins: vec!["FalloutNV.esm".to_string()],
            },
        );

        GamesConfig { games }
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&config_path).unwrap();
        (manager, temp_dir)
    }

    #[test]
    fn test_default_games_config() {
        let config = ConfigManager::default_games_config();

        let fo4 = config.context_for("FO4").unwrap();
        assert_eq!(fo4.format(), PluginFormat::Fallout4);
        assert!(fo4.native_plugins().contains("dlccoast.esm"));

        let fnv = config.context_for("FNV").unwrap();
        assert_eq!(fnv.format(), PluginFormat::Original);
    }

    #[test]
    fn test_load_save_games_config() {
        let (manager, _temp_dir) = create_test_config_manager();

        let config = ConfigManager::default_games_config();
        manager.save_games_config(&config).unwrap();

        let loaded = manager.load_games_config().unwrap();
        assert_eq!(loaded.games.len(), config.games.len());
        assert_eq!(
            loaded.games["SSE"].native_plugins,
            config.games["SSE"].native_plugins
        );
    }

    #[test]
    fn test_load_save_settings() {
        let (manager, _temp_dir) = create_test_config_manager();

        let settings = PersistorSettings {
            retry_count: 5,
            refresh_debounce_ms: 250,
            ..PersistorSettings::default()
        };
        manager.save_settings(&settings).unwrap();

        let loaded = manager.load_settings().unwrap();
        assert_eq!(loaded.retry_count, 5);
        assert_eq!(loaded.refresh_debounce_ms, 250);
        assert_eq!(loaded.retry_delay_ms, 100);
    }
}
