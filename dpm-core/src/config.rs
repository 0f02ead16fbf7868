// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Configuration registry.

Loads a directory of `*.conf` files, each a simple INI: `[section]` headers,
`key = value` pairs, `#`/`;` comments. A `MAIN` section holds keys that
appear before the first header, and is the fallback a lookup on another
section falls back to when the key is absent there.

Grounded on the source's `ConfigManager`: same default-section name, same
fallback order, same `true/yes/1/on/enabled` boolean vocabulary. Unlike the
source, `.conf` files are loaded in sorted filename order, so that a
directory with more than one file produces deterministic overrides rather
than depending on `readdir` order.
*/

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

/// Name of the section used when none is given, and the fallback for a
/// section whose requested key is missing.
pub const DEFAULT_SECTION: &str = "MAIN";

/// A tree of sections -> key -> string value, loaded from a directory of
/// `*.conf` files.
#[derive(Clone, Debug, Default)]
pub struct ConfigRegistry {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl ConfigRegistry {
    /// An empty registry with only the default section present.
    pub fn new() -> Self {
        let mut sections = BTreeMap::new();
        sections.insert(DEFAULT_SECTION.to_string(), BTreeMap::new());
        Self { sections }
    }

    /// Load every `*.conf` file in `dir`, in sorted filename order, so later
    /// files override earlier ones for keys they both define.
    ///
    /// A missing or unreadable directory is not an error: it yields a
    /// registry with only the default section, matching the source's
    /// behavior of warning and continuing rather than aborting startup.
    pub fn load_dir(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let mut registry = Self::new();
        let dir = dir.as_ref();

        let mut entries: Vec<PathBuf> = match fs::read_dir(dir) {
            Ok(read_dir) => read_dir
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("conf"))
                .collect(),
            Err(_) => return Ok(registry),
        };
        entries.sort();

        for path in entries {
            let contents = fs::read_to_string(&path)?;
            registry.parse_into(&contents);
        }

        Ok(registry)
    }

    /// Parse one `.conf` file's text into this registry.
    fn parse_into(&mut self, contents: &str) {
        let mut current_section = DEFAULT_SECTION.to_string();
        self.sections.entry(current_section.clone()).or_default();

        for raw_line in contents.lines() {
            let line = raw_line.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let name = line[1..line.len() - 1].trim();
                current_section = if name.is_empty() {
                    DEFAULT_SECTION.to_string()
                } else {
                    name.to_string()
                };
                self.sections.entry(current_section.clone()).or_default();
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();
                if key.is_empty() {
                    continue;
                }
                self.sections
                    .entry(current_section.clone())
                    .or_default()
                    .insert(key.to_string(), value.to_string());
            }
        }
    }

    /// Insert a single key directly, bypassing file parsing. Used by the CLI
    /// harness to apply overrides and by tests.
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    fn find(&self, section: &str, key: &str) -> Option<&str> {
        if let Some(value) = self.sections.get(section).and_then(|s| s.get(key)) {
            return Some(value.as_str());
        }

        if section != DEFAULT_SECTION {
            if let Some(value) = self.sections.get(DEFAULT_SECTION).and_then(|s| s.get(key)) {
                return Some(value.as_str());
            }
        }

        None
    }

    /// Resolve a key, falling back from `section` to `MAIN`.
    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        self.find(section, key).map(|s| s.to_string())
    }

    /// Whether a key is resolvable in `section` or the default section.
    pub fn has_key(&self, section: &str, key: &str) -> bool {
        self.find(section, key).is_some()
    }

    pub fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.get(section, key).unwrap_or_else(|| default.to_string())
    }

    /// Parse strictly: the entire value must be consumed by the integer
    /// parse, or `default` is returned (matching `strtol` + endptr check).
    pub fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.find(section, key)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(default)
    }

    pub fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.find(section, key)
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(default)
    }

    /// `true/yes/1/on/enabled` and `false/no/0/off/disabled`, case
    /// insensitive; anything else falls back to `default`.
    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        match self.find(section, key) {
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" | "on" | "enabled" => true,
                "false" | "no" | "0" | "off" | "disabled" => false,
                _ => default,
            },
            None => default,
        }
    }
}
