// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The metadata engine (C5): the fixed metadata file set, and the three
//! digest-chain generators that derive `CONTENTS_MANIFEST_DIGEST`,
//! `HOOKS_DIGEST` and `PACKAGE_DIGEST` from current disk state.
//!
//! Grounded in `original_source/modules/build/src/metadata.cpp`'s
//! `metadata_generate_new` and `update_contents_manifest`.

use {
    crate::{
        error::Result,
        manifest::{ContentsEntry, HookEntry, DESIGNATION_CONTROLLED, DESIGNATION_SYMLINK},
        owner,
    },
    dpm_digest::{digest_bytes, digest_file, digest_string, Algorithm},
    std::{
        fs,
        os::unix::fs::MetadataExt,
        path::Path,
    },
};

/// The metadata files that hold free-form values rather than the digest
/// chain, in the order the skeleton is written.
pub const FREEFORM_METADATA_FILES: [&str; 9] = [
    "AUTHOR",
    "MAINTAINER",
    "DEPENDENCIES",
    "DESCRIPTION",
    "LICENSE",
    "PROVIDES",
    "REPLACES",
    "SOURCE",
    "CHANGELOG",
];

/// Write the fixed metadata file set, populating `NAME`, `VERSION` and
/// `ARCHITECTURE` with caller-supplied values and leaving the rest as empty
/// placeholders. Does not touch the digest chain.
pub fn write_skeleton(stage: &Path, name: &str, version: &str, architecture: &str) -> Result<()> {
    let metadata_dir = stage.join("metadata");

    fs::write(metadata_dir.join("NAME"), format!("{}\n", name))?;
    fs::write(metadata_dir.join("VERSION"), format!("{}\n", version))?;
    fs::write(metadata_dir.join("ARCHITECTURE"), format!("{}\n", architecture))?;

    for file in FREEFORM_METADATA_FILES {
        fs::write(metadata_dir.join(file), "")?;
    }

    Ok(())
}

/// Write `data` to `path` via a sibling temporary file and a rename, so a
/// reader never observes a partially written digest-chain file.
fn write_atomic(path: &Path, data: &str) -> Result<()> {
    let tmp = path.with_extension("dpm-tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Walk `contents/` in lexicographic order on the relative path and write
/// `metadata/CONTENTS_MANIFEST_DIGEST`.
///
/// Uses `symlink_metadata` rather than `metadata` so a symlink is recorded
/// as itself (designation `L`, digest of the link target string) instead of
/// being silently followed or skipped.
pub fn generate_contents_manifest(stage: &Path, algorithm: Algorithm) -> Result<()> {
    let contents_dir = stage.join("contents");
    let mut entries: Vec<_> = walkdir::WalkDir::new(&contents_dir)
        .min_depth(1)
        .into_iter()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| crate::error::Error::Undefined(e.to_string()))?;
    entries.sort_by(|a, b| a.path().cmp(b.path()));

    let mut lines = String::new();

    for entry in entries {
        let path = entry.path();
        let rel = path.strip_prefix(&contents_dir)?;
        let abs_path = format!("/{}", rel.to_string_lossy());
        let meta = fs::symlink_metadata(path)?;

        if meta.is_dir() {
            continue;
        }

        let line = if meta.file_type().is_symlink() {
            let target = fs::read_link(path)?;
            let digest = digest_string(&target.to_string_lossy(), algorithm);
            ContentsEntry {
                designation: DESIGNATION_SYMLINK,
                digest,
                mode: format!("{:04o}", meta.mode() & 0o7777),
                owner_group: owner::owner_group_string(meta.uid(), meta.gid()),
                path: abs_path,
            }
        } else if meta.is_file() {
            let digest = digest_file(path, algorithm)?;
            ContentsEntry {
                designation: DESIGNATION_CONTROLLED,
                digest,
                mode: format!("{:04o}", meta.mode() & 0o7777),
                owner_group: owner::owner_group_string(meta.uid(), meta.gid()),
                path: abs_path,
            }
        } else {
            continue;
        };

        lines.push_str(&line.format_line());
        lines.push('\n');
    }

    write_atomic(&stage.join("metadata").join("CONTENTS_MANIFEST_DIGEST"), &lines)
}

/// Walk `hooks/` in lexicographic filename order and write
/// `metadata/HOOKS_DIGEST`. Hook scripts are flat; no subdirectories are
/// expected or descended into.
pub fn generate_hooks_digest(stage: &Path, algorithm: Algorithm) -> Result<()> {
    let hooks_dir = stage.join("hooks");
    let mut names: Vec<_> = fs::read_dir(&hooks_dir)?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .into_iter()
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name())
        .collect();
    names.sort();

    let mut lines = String::new();

    for name in names {
        let path = hooks_dir.join(&name);
        let digest = digest_file(&path, algorithm)?;
        let entry = HookEntry {
            digest,
            filename: name.to_string_lossy().to_string(),
        };
        lines.push_str(&entry.format_line());
        lines.push('\n');
    }

    write_atomic(&stage.join("metadata").join("HOOKS_DIGEST"), &lines)
}

/// Read `CONTENTS_MANIFEST_DIGEST` and `HOOKS_DIGEST` as raw bytes, compute
/// `H(H(contents_file) || H(hooks_file))`, and write the hex result to
/// `metadata/PACKAGE_DIGEST`.
pub fn generate_package_digest(stage: &Path, algorithm: Algorithm) -> Result<()> {
    let metadata_dir = stage.join("metadata");
    let contents_bytes = fs::read(metadata_dir.join("CONTENTS_MANIFEST_DIGEST"))?;
    let hooks_bytes = fs::read(metadata_dir.join("HOOKS_DIGEST"))?;

    let contents_digest = digest_bytes(&contents_bytes, algorithm);
    let hooks_digest = digest_bytes(&hooks_bytes, algorithm);

    let combined = format!("{}{}", contents_digest, hooks_digest);
    let package_digest = digest_string(&combined, algorithm);

    write_atomic(
        &metadata_dir.join("PACKAGE_DIGEST"),
        &format!("{}\n", package_digest),
    )
}

/// The full metadata file set, in the order `write_skeleton` writes it:
/// the three caller-supplied fields followed by the free-form ones. Used
/// by callers that need to enumerate a stage's metadata (e.g. an `info`
/// verb) without duplicating the field list.
pub fn metadata_file_names() -> Vec<&'static str> {
    let mut names = vec!["NAME", "VERSION", "ARCHITECTURE"];
    names.extend(FREEFORM_METADATA_FILES);
    names
}

/// Regenerate the entire digest chain from current disk state, in the
/// fixed order contents-manifest, hooks-digest, package-digest.
pub fn refresh_digest_chain(stage: &Path, algorithm: Algorithm) -> Result<()> {
    generate_contents_manifest(stage, algorithm)?;
    generate_hooks_digest(stage, algorithm)?;
    generate_package_digest(stage, algorithm)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(path: &Path, contents: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::File::create(path).unwrap().write_all(contents).unwrap();
    }

    fn bare_stage(tmp: &Path) -> std::path::PathBuf {
        let stage = tmp.join("foo-1.0.dhl2.x86_64");
        for c in ["contents", "hooks", "metadata", "signatures"] {
            fs::create_dir_all(stage.join(c)).unwrap();
        }
        stage
    }

    #[test]
    fn contents_manifest_lists_regular_files_only() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = bare_stage(tmp.path());
        write_file(&stage.join("contents").join("a").join("b.txt"), b"hello\n");
        fs::create_dir_all(stage.join("contents").join("empty_dir")).unwrap();

        generate_contents_manifest(&stage, Algorithm::Sha256).unwrap();

        let text = fs::read_to_string(stage.join("metadata").join("CONTENTS_MANIFEST_DIGEST")).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 1);

        let entry = ContentsEntry::parse_line(lines[0]).unwrap();
        assert_eq!(entry.designation, DESIGNATION_CONTROLLED);
        assert_eq!(entry.path, "/a/b.txt");
        assert_eq!(entry.digest, digest_file(stage.join("contents/a/b.txt"), Algorithm::Sha256).unwrap());
    }

    #[test]
    fn contents_manifest_lists_symlinks_with_target_digest() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = bare_stage(tmp.path());
        write_file(&stage.join("contents").join("real.txt"), b"x");
        std::os::unix::fs::symlink("real.txt", stage.join("contents").join("link.txt")).unwrap();

        generate_contents_manifest(&stage, Algorithm::Sha256).unwrap();

        let text = fs::read_to_string(stage.join("metadata").join("CONTENTS_MANIFEST_DIGEST")).unwrap();
        let entries: Vec<_> = text.lines().map(|l| ContentsEntry::parse_line(l).unwrap()).collect();

        let link_entry = entries.iter().find(|e| e.path == "/link.txt").unwrap();
        assert_eq!(link_entry.designation, DESIGNATION_SYMLINK);
        assert_eq!(link_entry.digest, digest_string("real.txt", Algorithm::Sha256));
    }

    #[test]
    fn manifest_ordering_is_lexicographic() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = bare_stage(tmp.path());
        write_file(&stage.join("contents").join("z.txt"), b"z");
        write_file(&stage.join("contents").join("a.txt"), b"a");
        write_file(&stage.join("contents").join("m.txt"), b"m");

        generate_contents_manifest(&stage, Algorithm::Sha256).unwrap();
        let text = fs::read_to_string(stage.join("metadata").join("CONTENTS_MANIFEST_DIGEST")).unwrap();
        let paths: Vec<_> = text
            .lines()
            .map(|l| ContentsEntry::parse_line(l).unwrap().path)
            .collect();
        assert_eq!(paths, vec!["/a.txt", "/m.txt", "/z.txt"]);
    }

    #[test]
    fn package_digest_matches_composition_law() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = bare_stage(tmp.path());
        write_file(&stage.join("contents").join("a.txt"), b"a");
        write_file(&stage.join("hooks").join("PRE-INSTALL"), b"#!/bin/sh\n");

        refresh_digest_chain(&stage, Algorithm::Sha256).unwrap();

        let contents_bytes = fs::read(stage.join("metadata").join("CONTENTS_MANIFEST_DIGEST")).unwrap();
        let hooks_bytes = fs::read(stage.join("metadata").join("HOOKS_DIGEST")).unwrap();
        let expected = digest_string(
            &format!(
                "{}{}",
                digest_bytes(&contents_bytes, Algorithm::Sha256),
                digest_bytes(&hooks_bytes, Algorithm::Sha256)
            ),
            Algorithm::Sha256,
        );

        let actual = fs::read_to_string(stage.join("metadata").join("PACKAGE_DIGEST")).unwrap();
        assert_eq!(actual.trim(), expected);
    }

    #[test]
    fn zero_byte_file_gets_correct_digest() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = bare_stage(tmp.path());
        write_file(&stage.join("contents").join("empty.bin"), b"");

        generate_contents_manifest(&stage, Algorithm::Sha256).unwrap();
        let text = fs::read_to_string(stage.join("metadata").join("CONTENTS_MANIFEST_DIGEST")).unwrap();
        let entry = ContentsEntry::parse_line(text.lines().next().unwrap()).unwrap();
        assert_eq!(entry.digest, digest_bytes(b"", Algorithm::Sha256));
    }
}
