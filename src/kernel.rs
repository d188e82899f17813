//! Signed-Object Kernel.
//!
//! One sign/verify interface shared by every entity in this crate. Each
//! entity type implements [`SignableView`], which statically projects the
//! value onto its immutable signed core (see `SPEC_FULL.md` §4.4/§9) —
//! callers never evaluate a runtime mutable-field string set; the
//! projection *is* the mask.

use crate::codec::canonicalize_value;
use crate::crypto;
use crate::error::{KernelError, Result};
use ed25519_compact::{KeyPair, Seed};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Implemented by every entity with a `signature` field. `signable_core`
/// must return only the fields that are part of the entity's immutable
/// signed core (see the entity table in `SPEC_FULL.md` §3) — mutable
/// fields such as `signature`, `revoked`, or `credentialStatus` must never
/// appear in the returned value.
pub trait SignableView {
    /// Project this entity onto its immutable signed core as JSON.
    fn signable_core(&self) -> Value;
}

/// Result of a kernel-level verification. Verification never raises; any
/// failure (decode error, mismatched key, bad signature) simply yields
/// `signature_valid: false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureCheck {
    pub signature_valid: bool,
}

/// The process-wide server signing key: the root of trust for every
/// signature this crate produces. Loaded once, read-only after that.
pub struct SigningKey {
    keypair: KeyPair,
    did: String,
}

/// On-disk shape of `.signing_key.json`.
#[derive(Debug, Serialize, Deserialize)]
struct SigningKeyFile {
    did_key: String,
    private_key_b64: String,
    algorithm: String,
}

impl SigningKey {
    /// Load the server signing key from `path`, or generate and persist a
    /// new one if the file is absent or unreadable. Corruption never
    /// silently reuses partial data — it always regenerates, with a logged
    /// warning.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();

        if let Some(existing) = Self::try_load(&path) {
            return Ok(existing);
        }

        let keypair = crypto::generate_keypair();
        let did = crypto::public_key_to_did_key(&keypair.pk);

        let file = SigningKeyFile {
            did_key: did.clone(),
            private_key_b64: base64_standard(keypair.sk.seed().as_ref()),
            algorithm: "Ed25519".to_string(),
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(&file)?)?;

        Ok(Self { keypair, did })
    }

    fn try_load(path: &Path) -> Option<Self> {
        let raw = std::fs::read_to_string(path).ok()?;
        let file: SigningKeyFile = match serde_json::from_str(&raw) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, "signing key file unparseable, regenerating");
                return None;
            }
        };
        let seed_bytes = match base64_decode(&file.private_key_b64) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "signing key file has invalid base64, regenerating");
                return None;
            }
        };
        let seed = match <[u8; 32]>::try_from(seed_bytes.as_slice()) {
            Ok(s) => s,
            Err(_) => {
                tracing::warn!("signing key seed has wrong length, regenerating");
                return None;
            }
        };
        let keypair = KeyPair::from_seed(Seed::new(seed));
        let did = crypto::public_key_to_did_key(&keypair.pk);
        if did != file.did_key {
            tracing::warn!("signing key file did_key does not match derived key, regenerating");
            return None;
        }
        Some(Self { keypair, did })
    }

    /// The server's `did:key` identifier; the issuer of every signature.
    pub fn did(&self) -> &str {
        &self.did
    }

    /// Sign an entity's signable core, returning a base64url signature.
    pub fn sign<E: SignableView>(&self, entity: &E) -> Result<String> {
        let bytes = canonicalize_value(&entity.signable_core())?;
        Ok(crypto::sign_b64url(&self.keypair.sk, &bytes))
    }

    /// Sign raw canonical bytes directly (used by the audit chain, which
    /// signs the full entry minus signature/chain_hash rather than a
    /// `SignableView`).
    pub fn sign_bytes(&self, bytes: &[u8]) -> String {
        crypto::sign_b64url(&self.keypair.sk, bytes)
    }

    /// The raw 32-byte Ed25519 seed, for handing to APIs (e.g. JWT EdDSA
    /// signing) that need key material directly rather than through
    /// [`sign`]/[`sign_bytes`].
    pub fn secret_seed(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(self.keypair.sk.seed().as_ref());
        out
    }
}

fn base64_standard(bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine};
    STANDARD.encode(bytes)
}

fn base64_decode(s: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    use base64::{engine::general_purpose::STANDARD, Engine};
    STANDARD.decode(s)
}

/// Verify an entity's signature against `issuer_did`. Never fails loudly:
/// any decode error, DID mismatch, or bad signature yields
/// `signature_valid: false`.
pub fn verify<E: SignableView>(entity: &E, issuer_did: &str, signature_b64: &str) -> SignatureCheck {
    let Ok(bytes) = canonicalize_value(&entity.signable_core()) else {
        return SignatureCheck {
            signature_valid: false,
        };
    };
    let Ok(pub_key) = crypto::did_key_to_public_key(issuer_did) else {
        return SignatureCheck {
            signature_valid: false,
        };
    };
    SignatureCheck {
        signature_valid: crypto::verify_b64url(&pub_key, &bytes, signature_b64),
    }
}

/// Verify a raw canonical-bytes signature (audit chain entries).
pub fn verify_bytes(bytes: &[u8], issuer_did: &str, signature_b64: &str) -> bool {
    let Ok(pub_key) = crypto::did_key_to_public_key(issuer_did) else {
        return false;
    };
    crypto::verify_b64url(&pub_key, bytes, signature_b64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixture {
        id: String,
        mutable_flag: bool,
    }

    impl SignableView for Fixture {
        fn signable_core(&self) -> Value {
            json!({ "id": self.id })
        }
    }

    #[test]
    fn sign_then_verify_succeeds() {
        let dir = std::env::temp_dir().join(format!("attestix-kernel-test-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        let key_path = dir.join(".signing_key.json");
        let key = SigningKey::load_or_create(&key_path).unwrap();

        let entity = Fixture {
            id: "attestix:abc123".into(),
            mutable_flag: false,
        };
        let sig = key.sign(&entity).unwrap();
        let check = verify(&entity, key.did(), &sig);
        assert!(check.signature_valid);

        // Flipping a mutable field must not invalidate the signature.
        let mutated = Fixture {
            id: entity.id.clone(),
            mutable_flag: true,
        };
        let check2 = verify(&mutated, key.did(), &sig);
        assert!(check2.signature_valid);
        let _ = mutated.mutable_flag;

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn verify_rejects_tampered_core() {
        let dir = std::env::temp_dir().join(format!("attestix-kernel-test2-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        let key_path = dir.join(".signing_key.json");
        let key = SigningKey::load_or_create(&key_path).unwrap();

        let entity = Fixture {
            id: "attestix:abc123".into(),
            mutable_flag: false,
        };
        let sig = key.sign(&entity).unwrap();

        let tampered = Fixture {
            id: "attestix:different".into(),
            mutable_flag: false,
        };
        let check = verify(&tampered, key.did(), &sig);
        assert!(!check.signature_valid);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_or_create_is_stable_across_reloads() {
        let dir = std::env::temp_dir().join(format!("attestix-kernel-test3-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        let key_path = dir.join(".signing_key.json");

        let key1 = SigningKey::load_or_create(&key_path).unwrap();
        let did1 = key1.did().to_string();
        drop(key1);

        let key2 = SigningKey::load_or_create(&key_path).unwrap();
        assert_eq!(did1, key2.did());

        std::fs::remove_dir_all(&dir).ok();
    }
}
