// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Stage layout: creation of a fresh, unsealed package directory.
//!
//! Grounded in `original_source/modules/build/src/metadata.cpp`'s
//! `metadata_generate_new`, restructured into a single `create_stage` entry
//! point that owns the filesystem side effects and hands the digest-chain
//! work off to [crate::metadata].

use {
    crate::{
        error::{Error, Result},
        hooks, metadata,
    },
    dpm_digest::Algorithm,
    std::{
        fs,
        path::{Path, PathBuf},
    },
};

/// The four standard children of a stage, in the fixed order component
/// compression happens in during sealing.
pub const COMPONENTS: [&str; 4] = ["contents", "hooks", "metadata", "signatures"];

/// Compute the stage directory name `NAME-VERSION.OS.ARCH`.
pub fn stage_name(name: &str, version: &str, os: &str, arch: &str) -> String {
    format!("{}-{}.{}.{}", name, version, os, arch)
}

/// Inputs to [create_stage].
pub struct StageParams<'a> {
    pub output_dir: &'a Path,
    pub contents_source: &'a Path,
    pub hooks_source: Option<&'a Path>,
    pub package_name: &'a str,
    pub package_version: &'a str,
    pub architecture: &'a str,
    pub os: &'a str,
    pub force: bool,
}

/// Create a stage directory per §4.4: compute its name, lay out the four
/// children, populate `contents/` and `hooks/`, then hand off to the
/// metadata engine for the skeleton and the initial digest chain.
pub fn create_stage(params: &StageParams, algorithm: Algorithm) -> Result<PathBuf> {
    if !params.contents_source.exists() {
        return Err(Error::ContentsMissing(params.contents_source.to_path_buf()));
    }
    if let Some(hooks_source) = params.hooks_source {
        if !hooks_source.exists() {
            return Err(Error::HooksMissing(hooks_source.to_path_buf()));
        }
    }

    let name = stage_name(
        params.package_name,
        params.package_version,
        params.os,
        params.architecture,
    );
    let stage = params.output_dir.join(&name);

    if stage.exists() {
        if !params.force {
            return Err(Error::OutputExists(stage));
        }
        fs::remove_dir_all(&stage)?;
    }

    for component in COMPONENTS {
        fs::create_dir_all(stage.join(component))?;
    }

    populate_contents(&stage, params.contents_source)?;
    populate_hooks(&stage, params.hooks_source)?;

    metadata::write_skeleton(
        &stage,
        params.package_name,
        params.package_version,
        params.architecture,
    )?;
    metadata::generate_contents_manifest(&stage, algorithm)?;
    metadata::generate_hooks_digest(&stage, algorithm)?;
    metadata::generate_package_digest(&stage, algorithm)?;

    Ok(stage)
}

fn populate_contents(stage: &Path, contents_source: &Path) -> Result<()> {
    let contents_dir = stage.join("contents");

    if contents_source.is_file() {
        let basename = contents_source
            .file_name()
            .ok_or_else(|| Error::CopyFailed(
                contents_source.to_path_buf(),
                contents_dir.clone(),
                "source has no basename".to_string(),
            ))?;
        copy_file_preserving_mode(contents_source, &contents_dir.join(basename))?;
        return Ok(());
    }

    copy_tree(contents_source, &contents_dir)
}

/// Populate `hooks/` via a [dpm_file_manifest::FileManifest]: hooks are
/// flat, every entry is a regular file, and every entry is executable by
/// construction, which is exactly the shape that crate models (path +
/// bytes-or-file-reference + executable bit) without dragging in the
/// symlink handling `contents/` needs.
fn populate_hooks(stage: &Path, hooks_source: Option<&Path>) -> Result<()> {
    let hooks_dir = stage.join("hooks");
    let mut manifest = dpm_file_manifest::FileManifest::default();

    match hooks_source {
        Some(source) => {
            for entry in fs::read_dir(source)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let path = entry.path();
                let mut file_entry = dpm_file_manifest::FileEntry::try_from(path.as_path())?;
                file_entry.executable = true;
                manifest.add_file_entry(entry.file_name(), file_entry)?;
            }
        }
        None => {
            for hook_name in hooks::HOOK_NAMES {
                manifest.add_file_entry(
                    hook_name,
                    dpm_file_manifest::FileEntry {
                        data: hooks::template_script().as_bytes().to_vec().into(),
                        executable: true,
                    },
                )?;
            }
        }
    }

    manifest.materialize_files(&hooks_dir)?;
    Ok(())
}

fn copy_file_preserving_mode(src: &Path, dest: &Path) -> Result<()> {
    fs::copy(src, dest).map_err(|e| {
        Error::CopyFailed(src.to_path_buf(), dest.to_path_buf(), e.to_string())
    })?;
    Ok(())
}

/// Recursively copy `src` into `dest`, preserving regular-file modes and
/// recreating symlinks as symlinks rather than following them.
fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    for entry in walkdir::WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(|e| {
            Error::CopyFailed(src.to_path_buf(), dest.to_path_buf(), e.to_string())
        })?;
        let rel = entry.path().strip_prefix(src)?;
        let target = dest.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link_target = fs::read_link(entry.path())?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&link_target, &target)?;
            #[cfg(windows)]
            {
                let _ = &link_target;
            }
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            copy_file_preserving_mode(entry.path(), &target)?;
        }
    }

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

    #[test]
    fn create_stage_lays_out_four_children() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        write_file(&src.join("a").join("b.txt"), b"hello\n");

        let out_dir = tmp.path().join("out");
        fs::create_dir_all(&out_dir).unwrap();

        let params = StageParams {
            output_dir: &out_dir,
            contents_source: &src,
            hooks_source: None,
            package_name: "foo",
            package_version: "1.0",
            architecture: "x86_64",
            os: "dhl2",
            force: false,
        };

        let stage = create_stage(&params, Algorithm::Sha256).unwrap();
        assert_eq!(stage, out_dir.join("foo-1.0.dhl2.x86_64"));
        assert!(stage.join("contents").join("a").join("b.txt").is_file());
        assert!(stage.join("hooks").is_dir());
        assert_eq!(
            fs::read_dir(stage.join("hooks")).unwrap().count(),
            hooks::HOOK_NAMES.len()
        );
        assert!(stage.join("metadata").join("PACKAGE_DIGEST").is_file());
        assert!(stage.join("signatures").is_dir());
    }

    #[test]
    fn create_stage_refuses_existing_without_force() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        write_file(&src.join("a.txt"), b"x");

        let out_dir = tmp.path().join("out");
        fs::create_dir_all(&out_dir).unwrap();

        let params = StageParams {
            output_dir: &out_dir,
            contents_source: &src,
            hooks_source: None,
            package_name: "foo",
            package_version: "1.0",
            architecture: "x86_64",
            os: "dhl2",
            force: false,
        };

        create_stage(&params, Algorithm::Sha256).unwrap();
        let err = create_stage(&params, Algorithm::Sha256).unwrap_err();
        assert!(matches!(err, Error::OutputExists(_)));
    }

    #[test]
    fn create_stage_with_single_file_contents_source() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("payload.bin");
        write_file(&src, &[1, 2, 3]);

        let out_dir = tmp.path().join("out");
        fs::create_dir_all(&out_dir).unwrap();

        let params = StageParams {
            output_dir: &out_dir,
            contents_source: &src,
            hooks_source: None,
            package_name: "foo",
            package_version: "1.0",
            architecture: "x86_64",
            os: "dhl2",
            force: false,
        };

        let stage = create_stage(&params, Algorithm::Sha256).unwrap();
        assert!(stage.join("contents").join("payload.bin").is_file());
    }
}
