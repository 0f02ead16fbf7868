// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Line formats of the digest chain: `CONTENTS_MANIFEST_DIGEST` and
//! `HOOKS_DIGEST`. `PACKAGE_DIGEST` is a single hex line and needs no
//! parser of its own.

use crate::error::{Error, Result};

/// Control designation of a regular file entry.
pub const DESIGNATION_CONTROLLED: char = 'C';

/// Control designation of a symlink entry: the digest field holds
/// `H(readlink(path))`, not a content digest.
pub const DESIGNATION_SYMLINK: char = 'L';

/// One parsed line of `CONTENTS_MANIFEST_DIGEST`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContentsEntry {
    pub designation: char,
    pub digest: String,
    pub mode: String,
    pub owner_group: String,
    pub path: String,
}

impl ContentsEntry {
    pub fn format_line(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.designation, self.digest, self.mode, self.owner_group, self.path
        )
    }

    pub fn parse_line(line: &str) -> Result<Self> {
        let mut parts = line.splitn(5, ' ');

        let designation = parts
            .next()
            .and_then(|s| s.chars().next())
            .ok_or_else(|| Error::ManifestMalformed(line.to_string()))?;
        let digest = parts
            .next()
            .ok_or_else(|| Error::ManifestMalformed(line.to_string()))?
            .to_string();
        let mode = parts
            .next()
            .ok_or_else(|| Error::ManifestMalformed(line.to_string()))?
            .to_string();
        let owner_group = parts
            .next()
            .ok_or_else(|| Error::ManifestMalformed(line.to_string()))?
            .to_string();
        let path = parts
            .next()
            .ok_or_else(|| Error::ManifestMalformed(line.to_string()))?
            .to_string();

        Ok(Self {
            designation,
            digest,
            mode,
            owner_group,
            path,
        })
    }
}

/// One parsed line of `HOOKS_DIGEST`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HookEntry {
    pub digest: String,
    pub filename: String,
}

impl HookEntry {
    pub fn format_line(&self) -> String {
        format!("{} {}", self.digest, self.filename)
    }

    pub fn parse_line(line: &str) -> Result<Self> {
        let mut parts = line.splitn(2, ' ');

        let digest = parts
            .next()
            .ok_or_else(|| Error::ManifestMalformed(line.to_string()))?
            .to_string();
        let filename = parts
            .next()
            .ok_or_else(|| Error::ManifestMalformed(line.to_string()))?
            .to_string();

        Ok(Self { digest, filename })
    }
}

/// Parse a digest-file's full text into lines, skipping blank trailing
/// lines a text editor may have appended but otherwise preserving order.
pub fn non_blank_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().filter(|l| !l.is_empty())
}
