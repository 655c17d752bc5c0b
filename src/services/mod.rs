//! Services module - Pure logic for the plugin list files.
//!
//! Nothing in here touches the filesystem or holds state; the
//! [`PluginPersistor`](crate::state::PluginPersistor) reads and writes the
//! bytes and uses these functions to convert between them and a
//! [`PluginTable`](crate::models::PluginTable).
//!
//! # Components
//!
//! - [`plugin_files`]: Header and CRLF layout, Latin-1 codec, per-format
//!   projection of the table into `plugins.txt`, and [`TableBuilder`] for
//!   merging `loadorder.txt` and `plugins.txt` back into a table.
//!
//! # File Formats
//!
//! | Format | `loadorder.txt` | `plugins.txt` |
//! |---|---|---|
//! | `original` | every managed plugin, in order | enabled plugins only |
//! | `fallout4` | not used | every managed plugin, enabled ones prefixed `*` |

pub mod plugin_files;

pub use plugin_files::TableBuilder;
