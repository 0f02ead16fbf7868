// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-only access to the metadata file set (§6) for the `info` verb.
//!
//! Unlike the sealer and verifier, `info` never needs to mutate a stage or
//! recompute a digest — it only needs the free-form and digest-chain
//! metadata files as strings, whether the `metadata` component happens to
//! be a directory (an unsealed stage) or a gzipped tar (a sealed one), and
//! whether the source is a stage directory on disk or a `.dpm` read
//! without ever unsealing it.

use {
    crate::{error::Result, metadata::metadata_file_names},
    std::{collections::BTreeMap, path::Path},
};

/// Read every metadata field from a stage directory, whether or not its
/// `metadata/` component has already been sealed into a gzipped tar.
/// Fields whose file is absent (e.g. `PACKAGE_DIGEST` before the first
/// seal) are omitted rather than erroring.
pub fn read_stage_metadata(stage: &Path) -> Result<BTreeMap<String, String>> {
    let metadata_path = stage.join("metadata");

    if metadata_path.is_dir() {
        return Ok(read_from_dir(&metadata_path));
    }

    // Sealed: `metadata` is a gzipped tar whose entries are `metadata/<FIELD>`.
    let archive_bytes = std::fs::read(&metadata_path)?;
    Ok(read_from_archive_bytes(&archive_bytes, "metadata"))
}

fn read_from_dir(metadata_dir: &Path) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();

    for name in field_names_including_digest_chain() {
        if let Ok(text) = std::fs::read_to_string(metadata_dir.join(name)) {
            fields.insert(name.to_string(), text.trim_end_matches('\n').to_string());
        }
    }

    fields
}

fn read_from_archive_bytes(archive_bytes: &[u8], prefix: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();

    for name in field_names_including_digest_chain() {
        let member = format!("{}/{}", prefix, name);
        if let Ok(bytes) = dpm_archive::extract_member_from_bytes(archive_bytes, &member) {
            let text = String::from_utf8_lossy(&bytes).trim_end_matches('\n').to_string();
            fields.insert(name.to_string(), text);
        }
    }

    fields
}

/// Read every metadata field directly from a sealed `.dpm`, extracting
/// only the `metadata` inner archive and never touching `contents`,
/// `hooks` or `signatures`, and never writing anything to disk.
pub fn read_package_metadata(dpm_path: &Path, stage_name: &str) -> Result<BTreeMap<String, String>> {
    let metadata_archive =
        dpm_archive::extract_member_from_file(dpm_path, format!("{}/metadata", stage_name))?;
    Ok(read_from_archive_bytes(&metadata_archive, "metadata"))
}

fn field_names_including_digest_chain() -> Vec<&'static str> {
    let mut names = metadata_file_names();
    names.extend(["CONTENTS_MANIFEST_DIGEST", "HOOKS_DIGEST", "PACKAGE_DIGEST"]);
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{create_stage, StageParams};
    use dpm_digest::Algorithm;
    use std::fs;

    fn write_file(path: &Path, contents: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    fn make_stage(tmp: &Path) -> std::path::PathBuf {
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
    fn reads_caller_supplied_fields_from_unsealed_stage() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = make_stage(tmp.path());

        let fields = read_stage_metadata(&stage).unwrap();
        assert_eq!(fields.get("NAME").unwrap(), "foo");
        assert_eq!(fields.get("VERSION").unwrap(), "1.0");
        assert_eq!(fields.get("ARCHITECTURE").unwrap(), "x86_64");
        assert!(fields.get("PACKAGE_DIGEST").is_none());
    }

    #[test]
    fn reads_fields_from_sealed_stage_components() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = make_stage(tmp.path());
        crate::seal::seal_stage_components(&stage, Algorithm::Sha256).unwrap();

        let fields = read_stage_metadata(&stage).unwrap();
        assert_eq!(fields.get("NAME").unwrap(), "foo");
        assert!(fields.get("PACKAGE_DIGEST").is_some());
    }

    #[test]
    fn reads_fields_from_sealed_package_without_unsealing() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = make_stage(tmp.path());
        let stage_name = stage.file_name().unwrap().to_string_lossy().to_string();
        let dpm_path = crate::seal::seal_final(&stage, None, Algorithm::Sha256).unwrap();

        let fields = read_package_metadata(&dpm_path, &stage_name).unwrap();
        assert_eq!(fields.get("NAME").unwrap(), "foo");
        assert_eq!(fields.get("VERSION").unwrap(), "1.0");
        assert!(fields.get("PACKAGE_DIGEST").is_some());
    }
}
