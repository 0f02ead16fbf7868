// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Configurable cryptographic digest primitives.

A package is tamper-evident because every byte range that ends up in the
digest chain is hashed with one algorithm, named by configuration, and the
resulting hex digest is compared on the other end. This crate is the single
place that algorithm name resolves to an actual hasher.
*/

mod error;

pub use error::{DigestError, Result};

use {
    digest::Digest as _,
    std::{
        fs::File,
        io::{BufReader, Read},
        path::Path,
    },
};

/// Size of the chunks streamed through `digest_file`.
const CHUNK_SIZE: usize = 64 * 1024;

/// A digest algorithm known to this crate.
///
/// Mirrors the names accepted by `cryptography.checksum_algorithm` in the
/// configuration file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Algorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl Algorithm {
    /// Resolve a configured algorithm name.
    ///
    /// Matching is case-insensitive; `sha256` is the default elsewhere but
    /// this function does not apply a default itself.
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name.to_ascii_lowercase().as_str() {
            "md5" => Self::Md5,
            "sha1" => Self::Sha1,
            "sha224" => Self::Sha224,
            "sha256" => Self::Sha256,
            "sha384" => Self::Sha384,
            "sha512" => Self::Sha512,
            other => return Err(DigestError::AlgorithmNotSupported(other.to_string())),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }
}

impl Default for Algorithm {
    fn default() -> Self {
        Self::Sha256
    }
}

/// Hasher wrapper working around the different output-size types that the
/// `digest` crate's various algorithm implementations produce.
enum Hasher {
    Md5(md5::Md5),
    Sha1(sha1::Sha1),
    Sha224(sha2::Sha224),
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
}

impl Hasher {
    fn new(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Md5 => Self::Md5(md5::Md5::new()),
            Algorithm::Sha1 => Self::Sha1(sha1::Sha1::new()),
            Algorithm::Sha224 => Self::Sha224(sha2::Sha224::new()),
            Algorithm::Sha256 => Self::Sha256(sha2::Sha256::new()),
            Algorithm::Sha384 => Self::Sha384(sha2::Sha384::new()),
            Algorithm::Sha512 => Self::Sha512(sha2::Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => h.update(data),
            Self::Sha1(h) => h.update(data),
            Self::Sha224(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha384(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    fn finish_hex(self) -> String {
        match self {
            Self::Md5(h) => hex::encode(h.finalize()),
            Self::Sha1(h) => hex::encode(h.finalize()),
            Self::Sha224(h) => hex::encode(h.finalize()),
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Sha384(h) => hex::encode(h.finalize()),
            Self::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

/// Digest the bytes of a file, streaming in bounded chunks.
///
/// There is no file-size ceiling; memory use is bounded by `CHUNK_SIZE`
/// regardless of the file's length.
pub fn digest_file(path: impl AsRef<Path>, algorithm: Algorithm) -> Result<String> {
    let mut reader = BufReader::new(File::open(path.as_ref())?);
    let mut hasher = Hasher::new(algorithm);
    let mut buf = [0u8; CHUNK_SIZE];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finish_hex())
}

/// Digest an in-memory byte buffer.
pub fn digest_bytes(data: &[u8], algorithm: Algorithm) -> String {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finish_hex()
}

/// Digest a UTF-8 string's raw bytes.
pub fn digest_string(s: &str, algorithm: Algorithm) -> String {
    digest_bytes(s.as_bytes(), algorithm)
}
