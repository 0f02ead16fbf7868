// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Path expansion and module-path resolution.

The source mixes string concatenation and a shell `wordexp` call to expand
paths, which would let configuration perform arbitrary globbing. This
module replaces that with an explicit, narrow expansion restricted to a
leading `~` (the current user's home directory) and `$NAME` / `${NAME}`
environment variable references — nothing else is special.
*/

use std::path::{Path, PathBuf};

/// Default module directory used when neither a CLI override nor
/// `modules.modules_path` resolves to a readable directory.
pub const DEFAULT_MODULE_PATH: &str = "/usr/lib/dpm/modules/";

/// Expand a leading `~` and any `$NAME` / `${NAME}` references in `input`.
///
/// `~` only expands at the start of the string and only as a whole leading
/// component (`~` or `~/...`), matching shell behavior for the common case
/// without pulling in full `wordexp` semantics. A `$NAME` with no matching
/// environment variable is left untouched rather than producing an error,
/// since an unset variable in a path is not itself invalid.
pub fn expand(input: &str) -> PathBuf {
    let mut working = input.to_string();

    if working == "~" || working.starts_with("~/") {
        if let Some(home) = home_dir() {
            working = format!("{}{}", home.display(), &working[1..]);
        }
    }

    PathBuf::from(expand_env_vars(&working))
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Expand `$NAME` and `${NAME}` references using the process environment.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        if chars.peek() == Some(&'{') {
            chars.next();
            let mut name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                name.push(c);
            }
            if closed {
                if let Ok(value) = std::env::var(&name) {
                    out.push_str(&value);
                } else {
                    out.push_str(&format!("${{{}}}", name));
                }
            } else {
                out.push_str(&format!("${{{}", name));
            }
            continue;
        }

        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                chars.next();
            } else {
                break;
            }
        }

        if name.is_empty() {
            out.push('$');
        } else if let Ok(value) = std::env::var(&name) {
            out.push_str(&value);
        } else {
            out.push('$');
            out.push_str(&name);
        }
    }

    out
}

/// Resolve the module directory per the documented order: CLI override,
/// then `modules.modules_path` from configuration, then the
/// implementation-default. The first candidate that is a readable directory
/// wins.
pub fn resolve_module_path(cli_override: Option<&str>, config_value: Option<&str>) -> PathBuf {
    for candidate in [cli_override, config_value, Some(DEFAULT_MODULE_PATH)]
        .into_iter()
        .flatten()
    {
        let expanded = expand(candidate);
        if is_readable_dir(&expanded) {
            return expanded;
        }
    }

    expand(DEFAULT_MODULE_PATH)
}

fn is_readable_dir(path: &Path) -> bool {
    std::fs::read_dir(path).is_ok()
}
