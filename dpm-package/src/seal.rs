// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sealer / unsealer (C6): the two-phase directory-to-archive
//! transformation for components, then for the whole package, and its
//! inverse.
//!
//! Grounded in `original_source/modules/build/src/sealing.cpp`'s
//! `seal_stage_components`, `seal_final_package`, `unseal_package` and
//! `unseal_stage_components`.

use {
    crate::{error::{Error, Result}, metadata, stage::COMPONENTS},
    dpm_digest::Algorithm,
    std::{
        fs,
        path::{Path, PathBuf},
    },
};

/// Phase 1: refresh the digest chain, then replace `contents`, `hooks` and
/// `metadata` in place with their gzipped tars, in that fixed order (the
/// metadata archive must be produced last, since it embeds the digest
/// chain over the other two in their directory form). `signatures/` is
/// compressed only if non-empty.
pub fn seal_stage_components(stage: &Path, algorithm: Algorithm) -> Result<()> {
    // Once `contents` has been replaced by its gzipped tar, the other two
    // components have been too (they are always sealed together below), and
    // there is no directory left for the digest-chain walk to re-read. A
    // second call on an already-sealed stage skips straight to
    // `smart_compress`, which is itself a no-op per component in that case.
    if stage.join("contents").is_dir() {
        metadata::refresh_digest_chain(stage, algorithm)?;
    }

    for component in ["contents", "hooks", "metadata"] {
        dpm_archive::smart_compress(stage, component)?;
    }

    let signatures = stage.join("signatures");
    if signatures.is_dir() {
        let non_empty = fs::read_dir(&signatures)?.next().is_some();
        if non_empty {
            dpm_archive::smart_compress(stage, "signatures")?;
        }
    }

    Ok(())
}

/// Phase 2: run phase 1 (idempotent), then pack the whole stage directory
/// into a single gzipped tar next to it (or under `output_dir`).
pub fn seal_final(stage: &Path, output_dir: Option<&Path>, algorithm: Algorithm) -> Result<PathBuf> {
    seal_stage_components(stage, algorithm)?;

    let stage_basename = stage
        .file_name()
        .ok_or_else(|| Error::Undefined(format!("{} has no basename", stage.display())))?;
    let output_name = format!("{}.dpm", stage_basename.to_string_lossy());

    let output_path = match output_dir {
        Some(dir) => dir.join(&output_name),
        None => stage
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&output_name),
    };

    dpm_archive::compress_dir(stage, &output_path)?;

    Ok(output_path)
}

/// Unseal a `.dpm` into a fresh stage directory next to it (or under
/// `output_dir`). Refuses a non-`.dpm` extension. Per the force semantics
/// resolved for this implementation: since the target directory name is
/// always derived from the `.dpm`'s own basename, "the name matches the
/// stage name that would be produced" holds trivially here, so the
/// remaining, meaningful guard is emptiness — an existing, non-empty
/// target is refused unless `force` is given, rather than wiped
/// unconditionally the way the source does.
pub fn unseal_package(dpm_path: &Path, output_dir: Option<&Path>, force: bool) -> Result<PathBuf> {
    if dpm_path.extension().and_then(|e| e.to_str()) != Some("dpm") {
        return Err(Error::NotADpmFile(dpm_path.to_path_buf()));
    }

    let stage_basename = dpm_path
        .file_stem()
        .ok_or_else(|| Error::NotADpmFile(dpm_path.to_path_buf()))?;

    let parent = match output_dir {
        Some(dir) => dir,
        None => dpm_path.parent().unwrap_or_else(|| Path::new(".")),
    };
    let stage = parent.join(stage_basename);

    if stage.exists() {
        let is_empty = stage.is_dir() && fs::read_dir(&stage)?.next().is_none();

        if !is_empty && !force {
            return Err(Error::UnsealTargetExists(stage));
        }

        fs::remove_dir_all(&stage)?;
    }

    dpm_archive::extract_archive(dpm_path, parent)?;

    Ok(stage)
}

/// Require that all four components exist, then replace each sealed
/// (file) component with its extracted directory in place.
/// `smart_uncompress` itself guarantees that a crash mid-extraction leaves
/// the original archive file intact.
pub fn unseal_stage_components(stage: &Path) -> Result<()> {
    for component in COMPONENTS {
        let path = stage.join(component);
        if !path.exists() {
            return Err(Error::MissingComponent(match component {
                "contents" => "contents",
                "hooks" => "hooks",
                "metadata" => "metadata",
                "signatures" => "signatures",
                _ => unreachable!(),
            }));
        }
    }

    for component in COMPONENTS {
        dpm_archive::smart_uncompress(stage, component)?;
    }

    Ok(())
}

/// Re-sign an already-sealed package at `output_path`: rename any existing
/// file there to a `.old` sibling, run `build` to produce the replacement
/// at `output_path`, then remove the `.old` sibling on success. On failure
/// the `.old` sibling is left in place and the error is propagated; the
/// caller must recover manually, per the rename-based atomicity contract.
pub fn reseal_signed(
    stage: &Path,
    output_path: &Path,
    algorithm: Algorithm,
) -> Result<()> {
    let old_path = output_path.with_extension("old");
    let had_existing = output_path.exists();

    if had_existing {
        fs::rename(output_path, &old_path)?;
    }

    let result = (|| -> Result<()> {
        seal_stage_components(stage, algorithm)?;
        dpm_archive::compress_dir(stage, output_path)?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            if had_existing {
                fs::remove_file(&old_path)?;
            }
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{create_stage, StageParams};
    use std::io::Write;

    fn write_file(path: &Path, contents: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::File::create(path).unwrap().write_all(contents).unwrap();
    }

    fn make_stage(tmp: &Path) -> PathBuf {
        let src = tmp.join("src");
        write_file(&src.join("a.txt"), b"hello\n");

        let out_dir = tmp.join("out");
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

        create_stage(&params, Algorithm::Sha256).unwrap()
    }

    #[test]
    fn seal_stage_components_replaces_dirs_with_files() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = make_stage(tmp.path());

        seal_stage_components(&stage, Algorithm::Sha256).unwrap();

        assert!(stage.join("contents").is_file());
        assert!(stage.join("hooks").is_file());
        assert!(stage.join("metadata").is_file());
        assert!(stage.join("signatures").is_dir());
    }

    #[test]
    fn seal_stage_components_is_idempotent_bytewise() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = make_stage(tmp.path());

        seal_stage_components(&stage, Algorithm::Sha256).unwrap();
        let first = fs::read(stage.join("contents")).unwrap();

        seal_stage_components(&stage, Algorithm::Sha256).unwrap();
        let second = fs::read(stage.join("contents")).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn seal_final_then_unseal_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = make_stage(tmp.path());

        let dpm_path = seal_final(&stage, None, Algorithm::Sha256).unwrap();
        assert!(dpm_path.extension().unwrap() == "dpm");

        fs::remove_dir_all(&stage).unwrap();

        let dest_dir = tmp.path().join("unsealed");
        fs::create_dir_all(&dest_dir).unwrap();
        let unsealed = unseal_package(&dpm_path, Some(&dest_dir), false).unwrap();

        unseal_stage_components(&unsealed).unwrap();
        assert!(unsealed.join("contents").join("a.txt").is_file());
        assert_eq!(
            fs::read(unsealed.join("contents").join("a.txt")).unwrap(),
            b"hello\n"
        );
    }

    #[test]
    fn unseal_rejects_non_dpm_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let not_dpm = tmp.path().join("package.tar.gz");
        fs::write(&not_dpm, b"x").unwrap();

        let err = unseal_package(&not_dpm, None, false).unwrap_err();
        assert!(matches!(err, Error::NotADpmFile(_)));
    }

    #[test]
    fn unseal_refuses_nonempty_target_without_force() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = make_stage(tmp.path());
        let dpm_path = seal_final(&stage, None, Algorithm::Sha256).unwrap();

        let dest_dir = tmp.path().join("dest");
        fs::create_dir_all(&dest_dir).unwrap();
        let stage_basename = dpm_path.file_stem().unwrap();
        let colliding = dest_dir.join(stage_basename);
        write_file(&colliding.join("unrelated.txt"), b"surprise");

        let err = unseal_package(&dpm_path, Some(&dest_dir), false).unwrap_err();
        assert!(matches!(err, Error::UnsealTargetExists(_)));

        // With force, the non-empty target is allowed to be replaced.
        unseal_package(&dpm_path, Some(&dest_dir), true).unwrap();
        assert!(colliding.join("contents").join("a.txt").is_file());
    }
}
