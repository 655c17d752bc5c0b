// pluginsync - Keeps Bethesda game plugin lists in sync with an in-memory plugin table
//
// This is the library crate containing the plugin persistor and its supporting types.
// The binary crate (main.rs) runs a persistor for one configured game.

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use backend::{LOAD_ORDER_KEY, PersistenceBackend};
pub use config::ConfigManager;
pub use error::{ErrorReporter, PersistorError, TracingReporter};
pub use models::{GameContext, NativePlugins, PersistorSettings, PluginEntry, PluginFormat, PluginTable};
pub use state::{PersistorEvent, PluginPersistor};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
