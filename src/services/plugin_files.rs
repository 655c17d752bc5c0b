//! Encoding and decoding of `loadorder.txt` and `plugins.txt`.
//!
//! Everything here is pure: the persistor does the I/O and hands bytes in and out.
//!
//! File conventions:
//! - First line is a `#` header comment
//! - Lines are joined with CRLF, no trailing line break
//! - `loadorder.txt` is UTF-8, `plugins.txt` is Latin-1
//! - Comment lines and blank lines are ignored on read

use crate::models::{NativePlugins, PluginEntry, PluginFormat, PluginTable};
use std::collections::HashMap;

const LINE_SEPARATOR: &str = "\r\n";
const ENABLED_MARKER: char = '*';
const UTF8_BOM: char = '\u{feff}';

/// Names of all non-native plugins in the table, ascending by load order.
///
/// Ties keep table order.
pub fn sorted_plugin_names<'a>(table: &'a PluginTable, natives: &NativePlugins) -> Vec<&'a str> {
    let mut entries: Vec<(&str, &PluginEntry)> = table
        .iter()
        .filter(|(name, _)| !natives.contains(name))
        .map(|(name, entry)| (name.as_str(), entry))
        .collect();
    entries.sort_by_key(|(_, entry)| entry.load_order);
    entries.into_iter().map(|(name, _)| name).collect()
}

/// Body lines of `plugins.txt` for the given format.
pub fn plugins_lines(format: PluginFormat, names: &[&str], table: &PluginTable) -> Vec<String> {
    let enabled = |name: &str| table.get(name).is_some_and(|entry| entry.enabled);

    match format {
        PluginFormat::Original => names
            .iter()
            .copied()
            .filter(|name| enabled(*name))
            .map(str::to_string)
            .collect(),
        PluginFormat::Fallout4 => names
            .iter()
            .copied()
            .map(|name| {
                if enabled(name) {
                    format!("{}{}", ENABLED_MARKER, name)
                } else {
                    name.to_string()
                }
            })
            .collect(),
    }
}

/// Header plus body joined with CRLF.
pub fn render_text<S: AsRef<str>>(header: &str, lines: &[S]) -> String {
    let mut text = String::from(header);
    for line in lines {
        text.push_str(LINE_SEPARATOR);
        text.push_str(line.as_ref());
    }
    text
}

/// Full `loadorder.txt` contents (UTF-8).
pub fn render_loadorder(header: &str, names: &[&str]) -> Vec<u8> {
    render_text(header, names).into_bytes()
}

/// Full `plugins.txt` contents (Latin-1).
pub fn render_plugins(header: &str, lines: &[String]) -> Vec<u8> {
    encode_latin1(&render_text(header, lines))
}

/// Encode as ISO-8859-1. Characters outside the range become `?`.
pub fn encode_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// Decode ISO-8859-1: every byte maps to the code point of the same value.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Decode `loadorder.txt`, tolerating a BOM and invalid sequences.
pub fn decode_loadorder(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_prefix(UTF8_BOM).unwrap_or(text.as_ref()).to_string()
}

/// Non-comment, non-empty lines, trimmed.
pub fn content_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

/// Split a `plugins.txt` line into name and enabled flag.
///
/// Under `original` every listed plugin is enabled. Under `fallout4` only `*`-prefixed ones are.
pub fn parse_plugins_line(format: PluginFormat, line: &str) -> (&str, bool) {
    match format {
        PluginFormat::Original => (line, true),
        PluginFormat::Fallout4 => match line.strip_prefix(ENABLED_MARKER) {
            Some(name) => (name.trim_start(), true),
            None => (line, false),
        },
    }
}

/// Builds a [`PluginTable`] from file contents, phase by phase.
///
/// Names are matched case-insensitively so the two files may disagree on case.
#[derive(Debug, Default)]
pub struct TableBuilder {
    table: PluginTable,
    index: HashMap<String, String>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load-order phase: every listed plugin starts disabled.
    pub fn add_loadorder(&mut self, text: &str, natives: &NativePlugins) {
        for name in content_lines(text) {
            if natives.contains(name) || self.index.contains_key(&name.to_lowercase()) {
                continue;
            }
            self.push(name, false);
        }
    }

    /// Plugins phase: update known entries, append unknown ones.
    pub fn add_plugins(&mut self, text: &str, format: PluginFormat, natives: &NativePlugins) {
        for line in content_lines(text) {
            let (name, enabled) = parse_plugins_line(format, line);
            if name.is_empty() || natives.contains(name) {
                continue;
            }
            match self.index.get(&name.to_lowercase()) {
                Some(key) => {
                    if let Some(entry) = self.table.get_mut(key) {
                        entry.enabled = enabled;
                    }
                }
                None => self.push(name, enabled),
            }
        }
    }

    pub fn finish(self) -> PluginTable {
        self.table
    }

    fn push(&mut self, name: &str, enabled: bool) {
        let load_order = self.table.len() as i64;
        self.index.insert(name.to_lowercase(), name.to_string());
        self.table
            .insert(name.to_string(), PluginEntry::new(enabled, load_order));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const HEADER: &str = "# Automatically generated by pluginsync";

    fn table(entries: &[(&str, bool, i64)]) -> PluginTable {
        entries
            .iter()
            .map(|(name, enabled, order)| (name.to_string(), PluginEntry::new(*enabled, *order)))
            .collect()
    }

    #[test]
    fn test_original_format_example() {
        let table = table(&[("a.esp", true, 0), ("b.esp", false, 1)]);
        let natives = NativePlugins::default();

        let names = sorted_plugin_names(&table, &natives);
        let loadorder = render_loadorder(HEADER, &names);
        let plugins = render_plugins(HEADER, &plugins_lines(PluginFormat::Original, &names, &table));

        assert_eq!(
            String::from_utf8(loadorder).unwrap(),
            format!("{}\r\na.esp\r\nb.esp", HEADER)
        );
        assert_eq!(decode_latin1(&plugins), format!("{}\r\na.esp", HEADER));
    }

    #[test]
    fn test_fallout4_format_marks_enabled() {
        let table = table(&[("b.esp", false, 1), ("a.esp", true, 0), ("c.esl", true, 2)]);
        let names = sorted_plugin_names(&table, &NativePlugins::default());

        let lines = plugins_lines(PluginFormat::Fallout4, &names, &table);
        assert_eq!(lines, vec!["*a.esp", "b.esp", "*c.esl"]);
    }

    #[test]
    fn test_sorted_names_skip_natives_case_insensitively() {
        let table = table(&[
            ("Fallout4.ESM", true, 0),
            ("mod.esp", true, 5),
            ("early.esp", false, 2),
        ]);
        let natives = NativePlugins::new(["fallout4.esm"]);

        assert_eq!(sorted_plugin_names(&table, &natives), vec!["early.esp", "mod.esp"]);
    }

    #[test]
    fn test_latin1_round_trip_and_replacement() {
        let encoded = encode_latin1("Café.esp ✓");
        assert_eq!(encoded, b"Caf\xe9.esp ?".to_vec());
        assert_eq!(decode_latin1(&encoded), "Café.esp ?");
    }

    #[test]
    fn test_decode_loadorder_strips_bom() {
        let text = decode_loadorder("\u{feff}# header\r\na.esp".as_bytes());
        assert_eq!(content_lines(&text).collect::<Vec<_>>(), vec!["a.esp"]);
    }

    #[test]
    fn test_content_lines_skip_comments_and_blanks() {
        let text = "# header\r\n\r\na.esp\r\n  # indented comment\r\n  b.esp  \n";
        assert_eq!(content_lines(text).collect::<Vec<_>>(), vec!["a.esp", "b.esp"]);
    }

    #[test]
    fn test_parse_plugins_line() {
        assert_eq!(parse_plugins_line(PluginFormat::Original, "a.esp"), ("a.esp", true));
        assert_eq!(parse_plugins_line(PluginFormat::Original, "*a.esp"), ("*a.esp", true));
        assert_eq!(parse_plugins_line(PluginFormat::Fallout4, "*a.esp"), ("a.esp", true));
        assert_eq!(parse_plugins_line(PluginFormat::Fallout4, "a.esp"), ("a.esp", false));
    }

    #[test]
    fn test_builder_original_merges_phases() {
        let natives = NativePlugins::new(["Skyrim.esm"]);
        let mut builder = TableBuilder::new();
        builder.add_loadorder("# h\r\nSkyrim.esm\r\na.esp\r\nB.esp\r\nc.esp", &natives);
        builder.add_plugins("# h\r\nskyrim.esm\r\nb.esp\r\nnew.esp", PluginFormat::Original, &natives);
        let table = builder.finish();

        let expected: Vec<(&str, PluginEntry)> = vec![
            ("a.esp", PluginEntry::new(false, 0)),
            ("B.esp", PluginEntry::new(true, 1)),
            ("c.esp", PluginEntry::new(false, 2)),
            ("new.esp", PluginEntry::new(true, 3)),
        ];
        let actual: Vec<(&str, PluginEntry)> =
            table.iter().map(|(name, entry)| (name.as_str(), *entry)).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_builder_keeps_first_duplicate() {
        let mut builder = TableBuilder::new();
        builder.add_loadorder("a.esp\r\nA.ESP\r\nb.esp", &NativePlugins::default());
        let table = builder.finish();

        assert_eq!(table.len(), 2);
        assert_eq!(table["b.esp"].load_order, 1);
    }

    #[test]
    fn test_builder_fallout4() {
        let mut builder = TableBuilder::new();
        builder.add_plugins(
            "# h\r\n*Fallout4.esm\r\n*a.esp\r\nb.esp",
            PluginFormat::Fallout4,
            &NativePlugins::new(["Fallout4.esm"]),
        );
        let table = builder.finish();

        assert_eq!(table.len(), 2);
        assert_eq!(table["a.esp"], PluginEntry::new(true, 0));
        assert_eq!(table["b.esp"], PluginEntry::new(false, 1));
    }

    fn arb_table() -> impl Strategy<Value = PluginTable> {
        prop::collection::btree_map("[a-z][a-z0-9 _]{0,10}\\.es[mpl]", (any::<bool>(), -50i64..50), 0..20)
            .prop_map(|map| {
                map.into_iter()
                    .map(|(name, (enabled, order))| (name, PluginEntry::new(enabled, order)))
                    .collect()
            })
    }

    fn decode_files(format: PluginFormat, table: &PluginTable, natives: &NativePlugins) -> PluginTable {
        let names = sorted_plugin_names(table, natives);
        let plugins = render_plugins(HEADER, &plugins_lines(format, &names, table));

        let mut builder = TableBuilder::new();
        if format == PluginFormat::Original {
            let loadorder = render_loadorder(HEADER, &names);
            builder.add_loadorder(&decode_loadorder(&loadorder), natives);
        }
        builder.add_plugins(&decode_latin1(&plugins), format, natives);
        builder.finish()
    }

    proptest! {
        #[test]
        fn prop_round_trip_preserves_flags_and_order(
            table in arb_table(),
            fallout4 in any::<bool>(),
        ) {
            let format = if fallout4 { PluginFormat::Fallout4 } else { PluginFormat::Original };
            let natives = NativePlugins::default();

            let decoded = decode_files(format, &table, &natives);

            let expected_order = sorted_plugin_names(&table, &natives);
            let decoded_order = sorted_plugin_names(&decoded, &natives);
            prop_assert_eq!(&decoded_order, &expected_order);
            for (name, entry) in &decoded {
                prop_assert_eq!(entry.enabled, table[name].enabled);
            }
        }

        #[test]
        fn prop_natives_never_written(table in arb_table(), pick in any::<prop::sample::Index>()) {
            prop_assume!(!table.is_empty());
            let native = table.keys().nth(pick.index(table.len())).unwrap().to_uppercase();
            let natives = NativePlugins::new([native.as_str()]);

            let names = sorted_plugin_names(&table, &natives);
            let loadorder = String::from_utf8(render_loadorder(HEADER, &names)).unwrap();
            let plugins = decode_latin1(&render_plugins(
                HEADER,
                &plugins_lines(PluginFormat::Fallout4, &names, &table),
            ));

            for line in content_lines(&loadorder).chain(content_lines(&plugins)) {
                prop_assert!(!line.trim_start_matches('*').eq_ignore_ascii_case(&native));
            }
        }
    }
}
