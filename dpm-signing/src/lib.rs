// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Detached OpenPGP signature provider.

The package pipeline never signs or verifies a whole stage; it signs the three
sealed component archives (`contents`, `hooks`, `metadata`) individually, each
with an ASCII-armored detached OpenPGP signature written into `signatures/`.
This crate is the narrow interface the sealer and verifier drive: produce a
detached signature over a file given a key identifier, and check a detached
signature against a file given a keyring.

`key_id` is treated exactly as the source spec describes it: an opaque string
that may be an email, a fingerprint, or a fingerprint suffix (a GPG "short
id"). Resolution happens against a [Keyring] loaded from ASCII-armored key
files; there is no implicit well-known keyring.
*/

mod error;

pub use error::{Result, SigningError};

use {
    chrono::SubsecRound,
    pgp::{
        armor,
        crypto::HashAlgorithm,
        packet::{Packet, SignatureConfig, SignatureType, Subpacket},
        types::{KeyVersion, PublicKeyTrait, SecretKeyTrait},
        Deserializable, SignedPublicKey, SignedSecretKey, StandaloneSignature,
    },
    smallvec::SmallVec,
    std::{
        fs,
        io::Cursor,
        path::Path,
    },
};

/// Outcome of [verify_detached].
///
/// Mirrors the three-way result the source spec requires: a signature can be
/// cryptographically valid, demonstrably invalid, or impossible to check
/// because the signing key isn't one this process knows about.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VerifyOutcome {
    Valid,
    Invalid,
    UnknownKey,
}

impl VerifyOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// A set of OpenPGP keys loaded from ASCII-armored files, searchable by an
/// opaque `key_id` string.
///
/// A real deployment loads this from a directory of `.asc` files named after
/// the key owner; a label recorded at load time (by default the file stem)
/// participates in `key_id` resolution alongside the key's own fingerprint,
/// so `key_id` can be an email-like label, a full fingerprint, or a
/// fingerprint suffix.
#[derive(Default)]
pub struct Keyring {
    secret: Vec<(String, SignedSecretKey)>,
    public: Vec<(String, SignedPublicKey)>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret key (with its own label) parsed from ASCII-armored bytes.
    pub fn add_secret_key_armored(
        &mut self,
        label: impl Into<String>,
        armored: &[u8],
    ) -> Result<()> {
        let (key, _headers) = SignedSecretKey::from_armor_single(Cursor::new(armored))
            .map_err(|e| SigningError::KeyUnusable(e.to_string()))?;
        self.secret.push((label.into(), key));
        Ok(())
    }

    /// Register a public key (with its own label) parsed from ASCII-armored bytes.
    pub fn add_public_key_armored(
        &mut self,
        label: impl Into<String>,
        armored: &[u8],
    ) -> Result<()> {
        let (key, _headers) = SignedPublicKey::from_armor_single(Cursor::new(armored))
            .map_err(|e| SigningError::KeyNotFound(e.to_string()))?;
        self.public.push((label.into(), key));
        Ok(())
    }

    /// Load every `*.asc` file in `dir` as a secret key, labeling each by its
    /// file stem.
    pub fn load_secret_keys_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let mut ring = Self::new();
        for path in armored_files(dir.as_ref())? {
            let label = file_stem_label(&path);
            let data = fs::read(&path)?;
            ring.add_secret_key_armored(label, &data)?;
        }
        Ok(ring)
    }

    /// Load every `*.asc` file in `dir` as a public key, labeling each by its
    /// file stem.
    pub fn load_public_keys_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let mut ring = Self::new();
        for path in armored_files(dir.as_ref())? {
            let label = file_stem_label(&path);
            let data = fs::read(&path)?;
            ring.add_public_key_armored(label, &data)?;
        }
        Ok(ring)
    }

    /// Resolve a secret key by `key_id` for signing.
    pub fn find_secret(&self, key_id: &str) -> Result<&SignedSecretKey> {
        self.secret
            .iter()
            .find(|(label, key)| key_matches(label, &key.fingerprint(), key_id))
            .map(|(_, key)| key)
            .ok_or_else(|| SigningError::KeyNotFound(key_id.to_string()))
    }

    /// Resolve a public key by `key_id` for verification.
    pub fn find_public(&self, key_id: &str) -> Result<&SignedPublicKey> {
        self.public
            .iter()
            .find(|(label, key)| key_matches(label, &key.fingerprint(), key_id))
            .map(|(_, key)| key)
            .ok_or_else(|| SigningError::KeyNotFound(key_id.to_string()))
    }

    /// All public keys in the ring, for the case where verification does not
    /// pin a specific key and must try everything on hand.
    pub fn public_keys(&self) -> impl Iterator<Item = &SignedPublicKey> {
        self.public.iter().map(|(_, key)| key)
    }

    pub fn is_public_empty(&self) -> bool {
        self.public.is_empty()
    }
}

fn armored_files(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut out = vec![];
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("asc") {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

fn file_stem_label(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Whether `candidate` (an opaque `key_id` supplied by a caller) identifies
/// the key described by `label` / `fingerprint`.
///
/// Accepts the key's load-time label verbatim or as a case-insensitive
/// substring (so an email address works), the full lowercase-hex
/// fingerprint, or a fingerprint suffix (a GPG "short id").
fn key_matches(label: &str, fingerprint: &[u8], candidate: &str) -> bool {
    let candidate_lower = candidate.to_ascii_lowercase();
    let fingerprint_hex = hex::encode(fingerprint);

    label.eq_ignore_ascii_case(candidate)
        || label.to_ascii_lowercase().contains(&candidate_lower)
        || fingerprint_hex == candidate_lower
        || (candidate_lower.len() >= 8 && fingerprint_hex.ends_with(&candidate_lower))
}

/// Hash algorithm used for newly produced signatures.
///
/// The three component archives are always signed with SHA-256; this is not
/// configurable the way the package checksum algorithm is, since the source
/// spec ties `cryptography.checksum_algorithm` to the digest chain, not to
/// signature hashing.
const SIGNATURE_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::SHA2_256;

/// Produce an ASCII-armored detached OpenPGP signature over the raw bytes of
/// `payload_path`, using the secret key resolved from `keyring` by `key_id`.
///
/// `key_passphrase` is invoked at most once, only if the resolved key's
/// secret material is locked.
pub fn sign_detached(
    payload_path: impl AsRef<Path>,
    keyring: &Keyring,
    key_id: &str,
    key_passphrase: impl FnOnce() -> String,
) -> Result<Vec<u8>> {
    let key = keyring.find_secret(key_id)?;
    let payload = fs::read(payload_path.as_ref())?;

    let hashed_subpackets = vec![
        Subpacket::IssuerFingerprint(KeyVersion::V4, SmallVec::from_slice(&key.fingerprint())),
        Subpacket::SignatureCreationTime(chrono::Utc::now().trunc_subsecs(0)),
    ];
    let unhashed_subpackets = vec![Subpacket::Issuer(key.key_id())];

    let config = SignatureConfig::new_v4(
        Default::default(),
        SignatureType::Binary,
        key.algorithm(),
        SIGNATURE_HASH_ALGORITHM,
        hashed_subpackets,
        unhashed_subpackets,
    );

    let signature = config
        .sign(key, key_passphrase, Cursor::new(payload.as_slice()))
        .map_err(|e| SigningError::SignFailed(e.to_string()))?;

    let packet = Packet::Signature(signature);
    let mut writer = Cursor::new(Vec::<u8>::new());
    armor::write(&packet, armor::BlockType::Signature, &mut writer, None)
        .map_err(|e| SigningError::SignFailed(e.to_string()))?;

    Ok(writer.into_inner())
}

/// Check a detached OpenPGP signature over the raw bytes of `payload_path`.
///
/// If `expected_key_id` is given, only that key (resolved from `keyring`) is
/// tried; an unresolvable `expected_key_id` is reported as `UnknownKey`
/// rather than an error, since "the key this package claims to be signed by
/// is not one we trust" is exactly the case the caller needs to distinguish
/// from a cryptographic failure. If `expected_key_id` is omitted, every
/// public key in the ring is tried.
pub fn verify_detached(
    payload_path: impl AsRef<Path>,
    signature_path: impl AsRef<Path>,
    keyring: &Keyring,
    expected_key_id: Option<&str>,
) -> Result<VerifyOutcome> {
    let payload = fs::read(payload_path.as_ref())?;
    let signature_armor = fs::read(signature_path.as_ref())?;

    verify_detached_bytes(&payload, &signature_armor, keyring, expected_key_id)
}

/// As [verify_detached], but the payload and the armored signature are
/// already in memory.
///
/// This is the entry point in-memory package verification uses: neither the
/// payload (an extracted component archive) nor the signature (an extracted
/// `*.signature` member) ever touch disk.
pub fn verify_detached_bytes(
    payload: &[u8],
    signature_armor: &[u8],
    keyring: &Keyring,
    expected_key_id: Option<&str>,
) -> Result<VerifyOutcome> {
    let candidates: Vec<&SignedPublicKey> = match expected_key_id {
        Some(id) => match keyring.find_public(id) {
            Ok(key) => vec![key],
            Err(_) => return Ok(VerifyOutcome::UnknownKey),
        },
        None => keyring.public_keys().collect(),
    };

    if candidates.is_empty() {
        return Ok(VerifyOutcome::UnknownKey);
    }

    let (signatures, _headers) = StandaloneSignature::from_armor_many(Cursor::new(signature_armor))
        .map_err(|e| SigningError::VerifyIoFailure(e.to_string()))?;

    let mut saw_signature = false;
    for signature in signatures {
        let signature = signature.map_err(|e| SigningError::VerifyIoFailure(e.to_string()))?;
        saw_signature = true;

        for key in &candidates {
            if signature.verify(*key, payload).is_ok() {
                return Ok(VerifyOutcome::Valid);
            }
        }
    }

    if saw_signature {
        Ok(VerifyOutcome::Invalid)
    } else {
        Ok(VerifyOutcome::UnknownKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgp::{
        crypto::SymmetricKeyAlgorithm,
        types::CompressionAlgorithm,
        KeyType, SecretKeyParamsBuilder,
    };
    use smallvec::smallvec;
    use std::io::Write;

    fn generate_test_key(user_id: &str) -> (SignedSecretKey, SignedPublicKey) {
        let mut builder = SecretKeyParamsBuilder::default();
        builder
            .key_type(KeyType::Rsa(2048))
            .can_create_certificates(false)
            .can_sign(true)
            .primary_user_id(user_id.to_string())
            .preferred_symmetric_algorithms(smallvec![SymmetricKeyAlgorithm::AES256])
            .preferred_hash_algorithms(smallvec![HashAlgorithm::SHA2_256])
            .preferred_compression_algorithms(smallvec![CompressionAlgorithm::ZLIB]);

        let params = builder.build().expect("valid key params");
        let secret_key = params.generate().expect("key generation");
        let secret_key_signed = secret_key.sign(String::new).expect("self-sign secret key");
        let public_key = secret_key_signed.public_key();
        let public_key_signed = public_key
            .sign(&secret_key_signed, String::new)
            .expect("self-sign public key");

        (secret_key_signed, public_key_signed)
    }

    fn keyring_with(label: &str, secret: &SignedSecretKey, public: &SignedPublicKey) -> Keyring {
        let mut ring = Keyring::new();
        ring.add_secret_key_armored(label, secret.to_armored_string(None).unwrap().as_bytes())
            .unwrap();
        ring.add_public_key_armored(label, public.to_armored_string(None).unwrap().as_bytes())
            .unwrap();
        ring
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let (secret, public) = generate_test_key("Someone <someone@example.com>");
        let ring = keyring_with("someone@example.com", &secret, &public);

        let tmp = tempfile::tempdir().unwrap();
        let payload_path = tmp.path().join("contents.tar.gz");
        fs::File::create(&payload_path)
            .unwrap()
            .write_all(b"pretend this is an archive")
            .unwrap();

        let signature_bytes =
            sign_detached(&payload_path, &ring, "someone@example.com", String::new).unwrap();
        assert!(String::from_utf8_lossy(&signature_bytes)
            .starts_with("-----BEGIN PGP SIGNATURE-----"));

        let sig_path = tmp.path().join("contents.signature");
        fs::write(&sig_path, &signature_bytes).unwrap();

        let outcome =
            verify_detached(&payload_path, &sig_path, &ring, Some("someone@example.com")).unwrap();
        assert_eq!(outcome, VerifyOutcome::Valid);

        let outcome_any = verify_detached(&payload_path, &sig_path, &ring, None).unwrap();
        assert_eq!(outcome_any, VerifyOutcome::Valid);
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let (secret, public) = generate_test_key("Someone <someone@example.com>");
        let ring = keyring_with("someone@example.com", &secret, &public);

        let tmp = tempfile::tempdir().unwrap();
        let payload_path = tmp.path().join("contents.tar.gz");
        fs::write(&payload_path, b"original bytes").unwrap();

        let signature_bytes =
            sign_detached(&payload_path, &ring, "someone@example.com", String::new).unwrap();
        let sig_path = tmp.path().join("contents.signature");
        fs::write(&sig_path, &signature_bytes).unwrap();

        fs::write(&payload_path, b"tampered bytes!").unwrap();

        let outcome = verify_detached(&payload_path, &sig_path, &ring, None).unwrap();
        assert_eq!(outcome, VerifyOutcome::Invalid);
    }

    #[test]
    fn unknown_expected_key_id_is_unknown_key() {
        let (secret, public) = generate_test_key("Someone <someone@example.com>");
        let ring = keyring_with("someone@example.com", &secret, &public);

        let tmp = tempfile::tempdir().unwrap();
        let payload_path = tmp.path().join("contents.tar.gz");
        fs::write(&payload_path, b"data").unwrap();

        let signature_bytes =
            sign_detached(&payload_path, &ring, "someone@example.com", String::new).unwrap();
        let sig_path = tmp.path().join("contents.signature");
        fs::write(&sig_path, &signature_bytes).unwrap();

        let outcome =
            verify_detached(&payload_path, &sig_path, &ring, Some("nobody@example.com")).unwrap();
        assert_eq!(outcome, VerifyOutcome::UnknownKey);
    }

    #[test]
    fn empty_keyring_is_unknown_key() {
        let ring = Keyring::new();
        let tmp = tempfile::tempdir().unwrap();
        let payload_path = tmp.path().join("contents.tar.gz");
        fs::write(&payload_path, b"data").unwrap();

        // No signature file is needed; an empty ring short-circuits before
        // the signature is even parsed.
        let sig_path = tmp.path().join("contents.signature");
        fs::write(&sig_path, b"-----BEGIN PGP SIGNATURE-----\n\n-----END PGP SIGNATURE-----\n")
            .unwrap();

        let outcome = verify_detached(&payload_path, &sig_path, &ring, None).unwrap();
        assert_eq!(outcome, VerifyOutcome::UnknownKey);
    }

    #[test]
    fn missing_secret_key_is_key_not_found() {
        let ring = Keyring::new();
        let tmp = tempfile::tempdir().unwrap();
        let payload_path = tmp.path().join("contents.tar.gz");
        fs::write(&payload_path, b"data").unwrap();

        let err = sign_detached(&payload_path, &ring, "nobody@example.com", String::new)
            .unwrap_err();
        assert!(matches!(err, SigningError::KeyNotFound(_)));
    }

    #[test]
    fn key_matches_by_fingerprint_suffix() {
        let (_secret, public) = generate_test_key("Someone <someone@example.com>");
        let fingerprint_hex = hex::encode(public.fingerprint());
        let suffix = &fingerprint_hex[fingerprint_hex.len() - 16..];

        assert!(key_matches("someone@example.com", &public.fingerprint(), suffix));
        assert!(key_matches(
            "someone@example.com",
            &public.fingerprint(),
            "someone@example.com"
        ));
        assert!(!key_matches(
            "someone@example.com",
            &public.fingerprint(),
            "totally-unrelated"
        ));
    }
}
