//! pluginsync - keeps one game's plugin lists in sync until interrupted
//!
//! # Overview
//!
//! Usage: `pluginsync <GAME_ID> [CONFIG_DIR]`
//!
//! Initializes:
//! - Logging infrastructure (file rotation + console output)
//! - Tokio runtime (file I/O, debounce timers, watcher forwarding)
//! - Configuration ([`ConfigManager`]): game registry and persistor settings
//! - A [`PluginPersistor`] for the selected game
//!
//! # Execution Flow
//!
//! 1. Load settings and the game registry from `CONFIG_DIR` (default `pluginsync Data/`)
//! 2. Initialize logging → `<log_dir>/pluginsync.<date>`
//! 3. Look up the game context and start syncing it
//! 4. Wait for Ctrl-C, logging every reload of the plugin table
//! 5. Stop syncing and log a metrics summary

use anyhow::{Context, Result, bail};
use pluginsync::{APP_NAME, ConfigManager, PersistorEvent, PluginPersistor, VERSION};
use std::time::Duration;

const DEFAULT_CONFIG_DIR: &str = "pluginsync Data";

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(game_id) = args.next() else {
        bail!("Usage: {} <GAME_ID> [CONFIG_DIR]", APP_NAME);
    };
    let config_dir = args.next().unwrap_or_else(|| DEFAULT_CONFIG_DIR.to_string());

    let config_manager = ConfigManager::new(&config_dir)?;
    let settings = config_manager.load_settings()?;

    let _log_guard = pluginsync::logging::setup_logging_with_console(
        &settings.log_dir,
        APP_NAME,
        settings.debug_mode,
        true,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let games = config_manager.load_games_config()?;
    let context = games
        .context_for(&game_id)
        .with_context(|| format!("Unknown game '{}' in {}", game_id, config_dir))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("pluginsync-worker")
        .build()?;

    runtime.block_on(async {
        let persistor = PluginPersistor::new(settings);
        let mut events = persistor.subscribe();

        persistor.load_files(context).await;
        tracing::info!(
            "Plugin list loaded ({} plugins), watching for changes",
            persistor.snapshot().len()
        );

        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for Ctrl-C")?;
                    break;
                }
                event = events.recv() => match event {
                    Ok(PersistorEvent::TableReset { plugins }) => {
                        tracing::info!("Plugin table reloaded: {} plugins", plugins);
                    }
                    Ok(PersistorEvent::ReadFailed) => {
                        tracing::warn!("Plugin list could not be read, keeping last known state");
                    }
                    Ok(_) => {}
                    Err(err) => tracing::debug!("Event stream lagged: {}", err),
                },
            }
        }

        tracing::info!("Shutting down");
        persistor.stop_sync();
        persistor.metrics().log_summary();
        Ok::<_, anyhow::Error>(())
    })?;

    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Shutdown complete");
    Ok(())
}
