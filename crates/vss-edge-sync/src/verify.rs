//! Artifact integrity: SHA-256 gate plus Ed25519 signature verification
//! against the pre-provisioned public key.
//!
//! The key file holds the 32-byte Ed25519 public key hex-encoded;
//! signatures arrive base64-encoded in the package manifest and cover the
//! raw archive bytes.

use std::path::Path;

use base64::Engine;
use ed25519_dalek::{Signature, VerifyingKey};
use tracing::debug;

use vss_edge_core::checksum::sha256_file;

use crate::error::SyncError;

pub struct PackageVerifier {
    key: VerifyingKey,
}

impl PackageVerifier {
    pub fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// Load the provisioned public key (64 hex characters).
    pub fn from_key_file(path: &Path) -> Result<Self, SyncError> {
        let raw = std::fs::read_to_string(path).map_err(|e| SyncError::InvalidKey {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        let bytes = hex::decode(raw.trim()).map_err(|e| SyncError::InvalidKey {
            message: format!("key is not valid hex: {e}"),
        })?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| SyncError::InvalidKey {
            message: "key must be exactly 32 bytes".to_string(),
        })?;
        let key = VerifyingKey::from_bytes(&bytes).map_err(|e| SyncError::InvalidKey {
            message: e.to_string(),
        })?;
        Ok(Self { key })
    }

    /// Verify a base64 Ed25519 signature over the given bytes.
    pub fn verify(&self, artifact: &str, data: &[u8], signature_b64: &str) -> Result<(), SyncError> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(signature_b64.trim())
            .map_err(|e| SyncError::SignatureInvalid {
                artifact: artifact.to_string(),
                message: format!("signature is not valid base64: {e}"),
            })?;
        let signature =
            Signature::from_slice(&raw).map_err(|e| SyncError::SignatureInvalid {
                artifact: artifact.to_string(),
                message: e.to_string(),
            })?;
        self.key
            .verify_strict(data, &signature)
            .map_err(|e| SyncError::SignatureInvalid {
                artifact: artifact.to_string(),
                message: e.to_string(),
            })?;
        debug!(%artifact, "signature verified");
        Ok(())
    }
}

/// Compare a file's SHA-256 against the manifest value.
pub fn verify_sha256(artifact: &str, path: &Path, expected: &str) -> Result<(), SyncError> {
    let actual = sha256_file(path)?;
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(SyncError::ChecksumMismatch {
            artifact: artifact.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    #[test]
    fn valid_signature_verifies() {
        let signing = SigningKey::generate(&mut OsRng);
        let data = b"package bytes";
        let signature = signing.sign(data);
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(signature.to_bytes());

        let verifier = PackageVerifier::new(signing.verifying_key());
        assert!(verifier.verify("pkg", data, &encoded).is_ok());
    }

    #[test]
    fn tampered_data_fails_verification() {
        let signing = SigningKey::generate(&mut OsRng);
        let signature = signing.sign(b"package bytes");
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(signature.to_bytes());

        let verifier = PackageVerifier::new(signing.verifying_key());
        let err = verifier
            .verify("pkg", b"tampered bytes", &encoded)
            .unwrap_err();
        assert!(matches!(err, SyncError::SignatureInvalid { .. }));
    }

    #[test]
    fn key_round_trips_through_hex_file() {
        let signing = SigningKey::generate(&mut OsRng);
        let dir = tempfile::TempDir::new().unwrap();
        let key_path = dir.path().join("package_signing.pub");
        std::fs::write(&key_path, hex::encode(signing.verifying_key().to_bytes())).unwrap();

        let verifier = PackageVerifier::from_key_file(&key_path).unwrap();
        let signature = signing.sign(b"data");
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(signature.to_bytes());
        assert!(verifier.verify("pkg", b"data", &encoded).is_ok());
    }

    #[test]
    fn bad_key_material_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let key_path = dir.path().join("bad.pub");
        std::fs::write(&key_path, "not-hex").unwrap();
        assert!(matches!(
            PackageVerifier::from_key_file(&key_path),
            Err(SyncError::InvalidKey { .. })
        ));
    }

    #[test]
    fn checksum_gate() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("artifact.tar.gz");
        std::fs::write(&file, b"bytes").unwrap();

        let good = vss_edge_core::checksum::sha256_bytes(b"bytes");
        assert!(verify_sha256("pkg", &file, &good).is_ok());
        assert!(matches!(
            verify_sha256("pkg", &file, "deadbeef"),
            Err(SyncError::ChecksumMismatch { .. })
        ));
    }
}
