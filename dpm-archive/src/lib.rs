// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Gzipped-tar archive codec.

Produces and consumes gzipped tar archives for the package stage/seal
pipeline, including extracting a single named member from an archive
without ever writing the archive's other members to disk. The in-memory
extraction path (`extract_member_from_bytes`) is what makes verification
able to run against a `.dpm` using only the single file handle for that
`.dpm` — see `dpm-package::verify`.
*/

mod error;

pub use error::{ArchiveError, Result};

use {
    flate2::{read::GzDecoder, write::GzEncoder, Compression},
    std::{
        fs,
        io::{Cursor, Read},
        path::Path,
    },
};

/// Gzip's two-byte magic number.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Check whether a file begins with the gzip magic bytes.
///
/// Used by the sealer to decide whether a component has already been
/// sealed, so re-sealing is a no-op rather than double compression.
pub fn is_gzipped(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();

    let Ok(mut f) = fs::File::open(path) else {
        return false;
    };

    let mut magic = [0u8; 2];
    f.read_exact(&mut magic).is_ok() && magic == GZIP_MAGIC
}

/// Archive everything reachable under `src_dir` into a gzipped tar at
/// `out_path`.
///
/// The archive's sole top-level entry is the basename of `src_dir`; every
/// other entry's path is relative to that top. Regular files, directories
/// (including empty ones) and symlinks are all preserved, along with unix
/// permission bits.
pub fn compress_dir(src_dir: impl AsRef<Path>, out_path: impl AsRef<Path>) -> Result<()> {
    let src_dir = src_dir.as_ref();
    let out_path = out_path.as_ref();

    if src_dir == out_path {
        return Err(ArchiveError::SourceEqualsOutput(out_path.to_path_buf()));
    }

    match out_path.parent() {
        Some(parent) if parent.as_os_str().is_empty() || parent.is_dir() => {}
        _ => return Err(ArchiveError::OutputParentMissing(out_path.to_path_buf())),
    }

    let top_name = src_dir
        .file_name()
        .ok_or_else(|| ArchiveError::Corrupt(format!("{} has no basename", src_dir.display())))?;

    let file = fs::File::create(out_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(top_name, src_dir)?;
    builder.into_inner()?.finish()?;

    Ok(())
}

/// Strip exactly one leading path component from a tar entry's path, the
/// component that `compress_dir` added.
fn strip_top_component(path: &Path) -> std::path::PathBuf {
    let mut components = path.components();
    components.next();
    components.as_path().to_path_buf()
}

/// Extract a gzipped tar archive produced by `compress_dir` into `out_dir`,
/// stripping the leading path component so that `out_dir` takes the place
/// of the original `src_dir`.
pub fn extract_archive(archive_path: impl AsRef<Path>, out_dir: impl AsRef<Path>) -> Result<()> {
    let out_dir = out_dir.as_ref();
    let file = fs::File::open(archive_path.as_ref())?;
    let decoder = GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);

    fs::create_dir_all(out_dir)?;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();
        let rel = strip_top_component(&entry_path);

        if rel.as_os_str().is_empty() {
            continue;
        }

        let dest = out_dir.join(&rel);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        entry.unpack(&dest)?;
    }

    Ok(())
}

/// Extract the bytes of the first archive entry whose path equals
/// `member_path` exactly, without staging the archive on disk.
pub fn extract_member_from_file(
    archive_path: impl AsRef<Path>,
    member_path: impl AsRef<Path>,
) -> Result<Vec<u8>> {
    let file = fs::File::open(archive_path.as_ref())?;
    let decoder = GzDecoder::new(file);
    extract_member(decoder, member_path.as_ref())
}

/// Extract the bytes of the first archive entry whose path equals
/// `member_path` exactly, from an in-memory gzipped tar buffer.
///
/// This is the primitive that makes in-memory package verification
/// possible: a `.dpm` is opened once, its member archives are pulled out
/// with `extract_member_from_file`, and everything below that is read
/// from these byte buffers via this function rather than touching disk.
pub fn extract_member_from_bytes(
    archive_bytes: &[u8],
    member_path: impl AsRef<Path>,
) -> Result<Vec<u8>> {
    let decoder = GzDecoder::new(Cursor::new(archive_bytes));
    extract_member(decoder, member_path.as_ref())
}

fn extract_member<R: Read>(decoder: R, member_path: &Path) -> Result<Vec<u8>> {
    let mut archive = tar::Archive::new(decoder);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();

        if entry_path == member_path {
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            return Ok(data);
        }
    }

    Err(ArchiveError::MemberNotFound(
        member_path.display().to_string(),
    ))
}

/// Return the link target of the first archive entry whose path equals
/// `member_path` exactly, from an in-memory gzipped tar buffer.
///
/// A symlink entry carries its target in the tar header's link-name field,
/// not in the entry's data bytes (which are empty), so
/// `extract_member_from_bytes` cannot be used to recover it. Verification
/// of a `contents/` symlink (control designation `L`) needs this instead.
pub fn extract_symlink_target_from_bytes(
    archive_bytes: &[u8],
    member_path: impl AsRef<Path>,
) -> Result<std::path::PathBuf> {
    let member_path = member_path.as_ref();
    let decoder = GzDecoder::new(Cursor::new(archive_bytes));
    let mut archive = tar::Archive::new(decoder);

    for entry in archive.entries()? {
        let entry = entry?;
        let entry_path = entry.path()?.into_owned();

        if entry_path == member_path {
            let link = entry
                .link_name()?
                .ok_or_else(|| ArchiveError::Corrupt(format!("{} is not a symlink entry", member_path.display())))?;
            return Ok(link.into_owned());
        }
    }

    Err(ArchiveError::MemberNotFound(
        member_path.display().to_string(),
    ))
}

/// Path to the sibling scratch file/directory used while a component is
/// being compressed or uncompressed in place.
fn sibling_tmp(stage: &Path, component: &str) -> std::path::PathBuf {
    stage.join(format!(".{}.dpm-tmp", component))
}

/// Replace `stage/component` with its gzipped tar in place, unless it is
/// already a gzipped file (no-op) or neither a directory nor a gzipped file
/// (error). Returns whether compression actually happened.
pub fn smart_compress(stage: impl AsRef<Path>, component: &str) -> Result<bool> {
    let stage = stage.as_ref();
    let component_path = stage.join(component);

    if component_path.is_file() {
        return if is_gzipped(&component_path) {
            Ok(false)
        } else {
            Err(ArchiveError::NotCompressibleOrDirectory(component_path))
        };
    }

    if !component_path.is_dir() {
        return Err(ArchiveError::NotCompressibleOrDirectory(component_path));
    }

    let tmp = sibling_tmp(stage, component);
    if tmp.exists() {
        fs::remove_file(&tmp).or_else(|_| fs::remove_dir_all(&tmp))?;
    }

    let result = compress_dir(&component_path, &tmp);
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
        result?;
    }

    fs::remove_dir_all(&component_path)?;
    fs::rename(&tmp, &component_path)?;

    Ok(true)
}

/// Replace `stage/component` (a gzipped tar file) with its extracted
/// directory in place, unless it is already a directory (no-op). Returns
/// whether extraction actually happened.
///
/// Extraction happens into a sibling temporary directory first; only once
/// that succeeds is the original file removed and the temporary renamed
/// into place, so a crash mid-extraction leaves the original file intact.
pub fn smart_uncompress(stage: impl AsRef<Path>, component: &str) -> Result<bool> {
    let stage = stage.as_ref();
    let component_path = stage.join(component);

    if component_path.is_dir() {
        return Ok(false);
    }

    if !component_path.is_file() {
        return Err(ArchiveError::NotCompressibleOrDirectory(component_path));
    }

    let tmp = sibling_tmp(stage, component);
    if tmp.exists() {
        fs::remove_dir_all(&tmp)?;
    }

    if let Err(e) = extract_archive(&component_path, &tmp) {
        let _ = fs::remove_dir_all(&tmp);
        return Err(e);
    }

    fs::remove_file(&component_path)?;
    fs::rename(&tmp, &component_path)?;

    Ok(true)
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
    fn compress_and_extract_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("mystage");
        write_file(&src.join("a").join("b.txt"), b"hello\n");
        write_file(&src.join("c.bin"), &[0u8, 1, 2, 3, 255]);
        fs::create_dir_all(src.join("empty_dir")).unwrap();

        let archive_path = tmp.path().join("mystage.tar.gz");
        compress_dir(&src, &archive_path).unwrap();

        let out = tmp.path().join("extracted");
        extract_archive(&archive_path, &out).unwrap();

        assert_eq!(fs::read(out.join("a").join("b.txt")).unwrap(), b"hello\n");
        assert_eq!(
            fs::read(out.join("c.bin")).unwrap(),
            vec![0u8, 1, 2, 3, 255]
        );
        assert!(out.join("empty_dir").is_dir());
    }

    #[test]
    fn compress_dir_rejects_equal_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("x");
        fs::create_dir_all(&dir).unwrap();
        let err = compress_dir(&dir, &dir).unwrap_err();
        assert!(matches!(err, ArchiveError::SourceEqualsOutput(_)));
    }

    #[test]
    fn extract_member_from_file_finds_named_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("stage");
        write_file(&src.join("metadata").join("PACKAGE_DIGEST"), b"deadbeef\n");

        let archive_path = tmp.path().join("stage.tar.gz");
        compress_dir(&src, &archive_path).unwrap();

        let data =
            extract_member_from_file(&archive_path, "stage/metadata/PACKAGE_DIGEST").unwrap();
        assert_eq!(data, b"deadbeef\n");
    }

    #[test]
    fn extract_member_from_bytes_matches_file_variant() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("stage");
        write_file(&src.join("hooks").join("PRE-INSTALL"), b"#!/bin/sh\n");

        let archive_path = tmp.path().join("stage.tar.gz");
        compress_dir(&src, &archive_path).unwrap();
        let bytes = fs::read(&archive_path).unwrap();

        let from_bytes = extract_member_from_bytes(&bytes, "stage/hooks/PRE-INSTALL").unwrap();
        let from_file = extract_member_from_file(&archive_path, "stage/hooks/PRE-INSTALL").unwrap();
        assert_eq!(from_bytes, from_file);
    }

    #[test]
    fn extract_symlink_target_from_bytes_reads_link_name() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("stage");
        write_file(&src.join("contents").join("real.txt"), b"x");
        std::os::unix::fs::symlink("real.txt", src.join("contents").join("link.txt")).unwrap();

        let archive_path = tmp.path().join("stage.tar.gz");
        compress_dir(&src, &archive_path).unwrap();
        let bytes = fs::read(&archive_path).unwrap();

        let target =
            extract_symlink_target_from_bytes(&bytes, "stage/contents/link.txt").unwrap();
        assert_eq!(target, Path::new("real.txt"));
    }

    #[test]
    fn extract_member_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("stage");
        write_file(&src.join("a.txt"), b"x");

        let archive_path = tmp.path().join("stage.tar.gz");
        compress_dir(&src, &archive_path).unwrap();

        let err = extract_member_from_file(&archive_path, "stage/missing.txt").unwrap_err();
        assert!(matches!(err, ArchiveError::MemberNotFound(_)));
    }

    #[test]
    fn smart_compress_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = tmp.path().join("stage");
        write_file(&stage.join("metadata").join("NAME"), b"foo\n");

        assert!(smart_compress(&stage, "metadata").unwrap());
        assert!(stage.join("metadata").is_file());
        let first_bytes = fs::read(stage.join("metadata")).unwrap();

        assert!(!smart_compress(&stage, "metadata").unwrap());
        let second_bytes = fs::read(stage.join("metadata")).unwrap();
        assert_eq!(first_bytes, second_bytes);
    }

    #[test]
    fn smart_compress_rejects_non_directory_non_gzip() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = tmp.path().join("stage");
        write_file(&stage.join("metadata"), b"not an archive");

        let err = smart_compress(&stage, "metadata").unwrap_err();
        assert!(matches!(err, ArchiveError::NotCompressibleOrDirectory(_)));
    }

    #[test]
    fn smart_uncompress_round_trips_with_smart_compress() {
        let tmp = tempfile::tempdir().unwrap();
        let stage = tmp.path().join("stage");
        write_file(&stage.join("hooks").join("PRE-INSTALL"), b"#!/bin/sh\nexit 0\n");

        assert!(smart_compress(&stage, "hooks").unwrap());
        assert!(stage.join("hooks").is_file());

        assert!(smart_uncompress(&stage, "hooks").unwrap());
        assert!(stage.join("hooks").is_dir());
        assert_eq!(
            fs::read(stage.join("hooks").join("PRE-INSTALL")).unwrap(),
            b"#!/bin/sh\nexit 0\n"
        );

        assert!(!smart_uncompress(&stage, "hooks").unwrap());
    }

    #[test]
    fn is_gzipped_detects_magic_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let plain = tmp.path().join("plain.txt");
        write_file(&plain, b"not gzipped");
        assert!(!is_gzipped(&plain));

        let gz = tmp.path().join("real.tar.gz");
        let stage = tmp.path().join("s");
        write_file(&stage.join("f"), b"x");
        compress_dir(&stage, &gz).unwrap();
        assert!(is_gzipped(&gz));
    }
}
