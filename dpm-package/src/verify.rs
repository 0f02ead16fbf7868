// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Verifier (C7): disk-based verification of an unsealed stage, and
//! in-memory verification of a sealed `.dpm` that never extracts a byte to
//! disk before its digest has been checked.
//!
//! Grounded in `original_source/modules/verify/src/checksum_memory.cpp`.

use {
    crate::{
        error::{Error, Result},
        manifest::{non_blank_lines, ContentsEntry, HookEntry},
        seal::unseal_stage_components,
    },
    dpm_digest::{digest_bytes, digest_file, digest_string, Algorithm},
    std::path::Path,
};

/// Reread the two component-digest files on disk, recompute
/// `H(H(contents_file) || H(hooks_file))`, and compare with
/// `PACKAGE_DIGEST`.
pub fn verify_package_digest(stage: &Path, algorithm: Algorithm) -> Result<()> {
    let metadata_dir = stage.join("metadata");
    let contents_bytes = std::fs::read(metadata_dir.join("CONTENTS_MANIFEST_DIGEST"))?;
    let hooks_bytes = std::fs::read(metadata_dir.join("HOOKS_DIGEST"))?;
    let stored = std::fs::read_to_string(metadata_dir.join("PACKAGE_DIGEST"))?;
    let stored = stored.trim();

    let computed = digest_string(
        &format!(
            "{}{}",
            digest_bytes(&contents_bytes, algorithm),
            digest_bytes(&hooks_bytes, algorithm)
        ),
        algorithm,
    );

    if computed != stored {
        return Err(Error::DigestMismatch {
            path: "metadata/PACKAGE_DIGEST".to_string(),
            expected: stored.to_string(),
            actual: computed,
        });
    }

    Ok(())
}

/// Parse `CONTENTS_MANIFEST_DIGEST`; for each listed file, check existence,
/// recompute its digest and compare. Malformed lines are skipped with a
/// warning tally; a missing file is a hard error. Accumulates mismatches
/// and fails with the total count if any occurred.
pub fn verify_contents_manifest(stage: &Path, algorithm: Algorithm) -> Result<()> {
    let manifest_path = stage.join("metadata").join("CONTENTS_MANIFEST_DIGEST");
    let text = std::fs::read_to_string(&manifest_path)?;

    let mut mismatches = 0usize;

    for line in non_blank_lines(&text) {
        let entry = match ContentsEntry::parse_line(line) {
            Ok(entry) => entry,
            Err(_) => continue,
        };

        let rel = entry.path.trim_start_matches('/');
        let file_path = stage.join("contents").join(rel);

        if !file_path.exists() && !file_path.is_symlink() {
            return Err(Error::ManifestFileMissing(entry.path));
        }

        let actual = if file_path.is_symlink() {
            let target = std::fs::read_link(&file_path)?;
            digest_string(&target.to_string_lossy(), algorithm)
        } else {
            digest_file(&file_path, algorithm)?
        };

        if actual != entry.digest {
            mismatches += 1;
        }
    }

    if mismatches > 0 {
        return Err(Error::ContentsVerificationFailed(mismatches));
    }

    Ok(())
}

/// Same shape as [verify_contents_manifest], for `hooks/`.
pub fn verify_hooks_digest(stage: &Path, algorithm: Algorithm) -> Result<()> {
    let manifest_path = stage.join("metadata").join("HOOKS_DIGEST");
    let text = std::fs::read_to_string(&manifest_path)?;

    let mut mismatches = 0usize;

    for line in non_blank_lines(&text) {
        let entry = match HookEntry::parse_line(line) {
            Ok(entry) => entry,
            Err(_) => continue,
        };

        let file_path = stage.join("hooks").join(&entry.filename);
        if !file_path.exists() {
            return Err(Error::ManifestFileMissing(entry.filename));
        }

        let actual = digest_file(&file_path, algorithm)?;
        if actual != entry.digest {
            mismatches += 1;
        }
    }

    if mismatches > 0 {
        return Err(Error::HooksVerificationFailed(mismatches));
    }

    Ok(())
}

/// Full stage verification: unseal components first (so a sealed stage can
/// be verified directly), then run the three disk-based checks.
pub fn verify_stage(stage: &Path, algorithm: Algorithm) -> Result<()> {
    unseal_stage_components(stage)?;
    verify_package_digest(stage, algorithm)?;
    verify_contents_manifest(stage, algorithm)?;
    verify_hooks_digest(stage, algorithm)?;
    Ok(())
}

/// In-memory verification of a sealed `.dpm`: no file is ever extracted to
/// disk before its digest has been checked. Only the single `.dpm` file
/// handle is read from; everything else is a byte buffer derived from it.
pub fn verify_package_bytes(dpm_path: &Path, stage_name: &str, algorithm: Algorithm) -> Result<()> {
    let metadata_archive = dpm_archive::extract_member_from_file(
        dpm_path,
        format!("{}/metadata", stage_name),
    )?;
    let contents_archive = dpm_archive::extract_member_from_file(
        dpm_path,
        format!("{}/contents", stage_name),
    )?;
    let hooks_archive = dpm_archive::extract_member_from_file(
        dpm_path,
        format!("{}/hooks", stage_name),
    )?;
    let signatures_archive = dpm_archive::extract_member_from_file(
        dpm_path,
        format!("{}/signatures", stage_name),
    )
    .ok();

    let package_digest_bytes =
        dpm_archive::extract_member_from_bytes(&metadata_archive, "metadata/PACKAGE_DIGEST")?;
    let contents_manifest_bytes = dpm_archive::extract_member_from_bytes(
        &metadata_archive,
        "metadata/CONTENTS_MANIFEST_DIGEST",
    )?;
    let hooks_digest_bytes =
        dpm_archive::extract_member_from_bytes(&metadata_archive, "metadata/HOOKS_DIGEST")?;

    // §3 invariant 3, checked directly against the two digest-file buffers
    // rather than files on disk.
    let stored_package_digest = String::from_utf8_lossy(&package_digest_bytes)
        .trim()
        .to_string();
    let computed_package_digest = digest_string(
        &format!(
            "{}{}",
            digest_bytes(&contents_manifest_bytes, algorithm),
            digest_bytes(&hooks_digest_bytes, algorithm)
        ),
        algorithm,
    );

    if computed_package_digest != stored_package_digest {
        return Err(Error::DigestMismatch {
            path: "metadata/PACKAGE_DIGEST".to_string(),
            expected: stored_package_digest,
            actual: computed_package_digest,
        });
    }

    // Per-file contents verification, symmetric with the disk-based path.
    let contents_text = String::from_utf8_lossy(&contents_manifest_bytes).to_string();
    let mut contents_mismatches = 0usize;

    for line in non_blank_lines(&contents_text) {
        let entry = match ContentsEntry::parse_line(line) {
            Ok(entry) => entry,
            Err(_) => continue,
        };

        let rel = entry.path.trim_start_matches('/');
        let member = format!("contents/{}", rel);

        let actual = if entry.designation == crate::manifest::DESIGNATION_SYMLINK {
            let target = dpm_archive::extract_symlink_target_from_bytes(&contents_archive, &member)?;
            digest_string(&target.to_string_lossy(), algorithm)
        } else {
            let data = dpm_archive::extract_member_from_bytes(&contents_archive, &member)?;
            digest_bytes(&data, algorithm)
        };

        if actual != entry.digest {
            contents_mismatches += 1;
        }
    }

    if contents_mismatches > 0 {
        return Err(Error::ContentsVerificationFailed(contents_mismatches));
    }

    // Per-hook verification: extract each hook member and compare against
    // the matching line of HOOKS_DIGEST, symmetric with contents. This
    // resolves the asymmetry between a line-oriented HOOKS_DIGEST and a
    // whole-archive comparison that the originating implementation has.
    let hooks_text = String::from_utf8_lossy(&hooks_digest_bytes).to_string();
    let mut hooks_mismatches = 0usize;

    for line in non_blank_lines(&hooks_text) {
        let entry = match HookEntry::parse_line(line) {
            Ok(entry) => entry,
            Err(_) => continue,
        };

        let member = format!("hooks/{}", entry.filename);
        let data = dpm_archive::extract_member_from_bytes(&hooks_archive, &member)?;
        let actual = digest_bytes(&data, algorithm);

        if actual != entry.digest {
            hooks_mismatches += 1;
        }
    }

    if hooks_mismatches > 0 {
        return Err(Error::HooksVerificationFailed(hooks_mismatches));
    }

    if let Some(signatures_archive) = signatures_archive {
        let _ = signatures_archive;
        // Signature verification is driven by the caller with a loaded
        // keyring (dpm_signing::verify_detached_bytes against each
        // signature member); this function only asserts that a
        // signatures archive, when present, could be read as a member.
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        seal::seal_final,
        stage::{create_stage, StageParams},
    };
    use std::fs;

    fn write_file(path: &Path, contents: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    fn make_sealed(tmp: &Path) -> (std::path::PathBuf, String) {
        let src = tmp.join("src");
        write_file(&src.join("a").join("b.txt"), b"hello\n");
        write_file(&src.join("c.bin"), &[0u8, 1, 2, 3, 255]);

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

        let stage = create_stage(&params, Algorithm::Sha256).unwrap();
        let stage_name = stage.file_name().unwrap().to_string_lossy().to_string();
        let dpm_path = seal_final(&stage, None, Algorithm::Sha256).unwrap();

        (dpm_path, stage_name)
    }

    #[test]
    fn happy_build_has_correct_manifest_shape() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        write_file(&src.join("a").join("b.txt"), b"hello\n");
        write_file(&src.join("c.bin"), &[0u8, 1, 2, 3, 255]);

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
        let manifest = fs::read_to_string(stage.join("metadata").join("CONTENTS_MANIFEST_DIGEST")).unwrap();
        assert_eq!(manifest.lines().count(), 2);

        let hooks = fs::read_to_string(stage.join("metadata").join("HOOKS_DIGEST")).unwrap();
        assert_eq!(hooks.lines().count(), 12);

        verify_package_digest(&stage, Algorithm::Sha256).unwrap();
    }

    #[test]
    fn round_trip_verifies_successfully() {
        let tmp = tempfile::tempdir().unwrap();
        let (dpm_path, _name) = make_sealed(tmp.path());

        let dest_dir = tmp.path().join("unsealed");
        fs::create_dir_all(&dest_dir).unwrap();
        let stage = crate::seal::unseal_package(&dpm_path, Some(&dest_dir), false).unwrap();

        verify_stage(&stage, Algorithm::Sha256).unwrap();
    }

    #[test]
    fn tampered_contents_reports_one_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let (dpm_path, _name) = make_sealed(tmp.path());

        let dest_dir = tmp.path().join("unsealed");
        fs::create_dir_all(&dest_dir).unwrap();
        let stage = crate::seal::unseal_package(&dpm_path, Some(&dest_dir), false).unwrap();
        crate::seal::unseal_stage_components(&stage).unwrap();

        let target = stage.join("contents").join("a").join("b.txt");
        let mut bytes = fs::read(&target).unwrap();
        bytes[0] ^= 0xFF;
        fs::write(&target, bytes).unwrap();

        let err = verify_contents_manifest(&stage, Algorithm::Sha256).unwrap_err();
        assert!(matches!(err, Error::ContentsVerificationFailed(1)));
    }

    #[test]
    fn in_memory_verification_succeeds_without_unsealing() {
        let tmp = tempfile::tempdir().unwrap();
        let (dpm_path, stage_name) = make_sealed(tmp.path());

        verify_package_bytes(&dpm_path, &stage_name, Algorithm::Sha256).unwrap();
    }

    #[test]
    fn in_memory_verification_handles_contents_symlinks() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        write_file(&src.join("real.txt"), b"hello\n");
        std::os::unix::fs::symlink("real.txt", src.join("link.txt")).unwrap();

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
        let stage_name = stage.file_name().unwrap().to_string_lossy().to_string();
        let dpm_path = seal_final(&stage, None, Algorithm::Sha256).unwrap();

        verify_package_bytes(&dpm_path, &stage_name, Algorithm::Sha256).unwrap();
    }
}
