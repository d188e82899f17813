//! Ed25519 primitives and `did:key` encoding.
//!
//! The only signature algorithm this kernel speaks is Ed25519. Every
//! signed-core byte sequence comes from [`crate::codec::canonicalize`];
//! this module only turns those bytes into (and back out of) signatures
//! and DIDs.

use crate::error::{KernelError, Result};
use ed25519_compact::{KeyPair, PublicKey, SecretKey, Signature};

/// Multicodec prefix for an Ed25519 public key (varint-encoded `0xed01`).
const ED25519_MULTICODEC_PREFIX: [u8; 2] = [0xed, 0x01];

/// Generate a fresh Ed25519 keypair.
pub fn generate_keypair() -> KeyPair {
    KeyPair::generate()
}

/// Sign `message` with `secret_key`, returning the raw 64-byte signature.
pub fn sign(secret_key: &SecretKey, message: &[u8]) -> [u8; 64] {
    let sig = secret_key.sign(message, None);
    *sig.as_ref()
}

/// Verify a signature. Never panics or propagates a library fault — any
/// malformed signature or key is simply treated as invalid.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &[u8]) -> bool {
    let Ok(sig) = Signature::from_slice(signature) else {
        return false;
    };
    public_key.verify(message, &sig).is_ok()
}

/// Sign `message` and return a base64url (no padding) signature string.
pub fn sign_b64url(secret_key: &SecretKey, message: &[u8]) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    URL_SAFE_NO_PAD.encode(sign(secret_key, message))
}

/// Verify a base64url-encoded signature against `message`. Returns `false`
/// for any decode failure rather than propagating an error.
pub fn verify_b64url(public_key: &PublicKey, message: &[u8], signature_b64: &str) -> bool {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    let Ok(sig_bytes) = URL_SAFE_NO_PAD.decode(signature_b64) else {
        return false;
    };
    verify(public_key, message, &sig_bytes)
}

/// Encode an Ed25519 public key as a `did:key` identifier:
/// `"did:key:z" + base58btc(0xed 0x01 || pub32)`.
pub fn public_key_to_did_key(public_key: &PublicKey) -> String {
    let mut multicodec = Vec::with_capacity(2 + public_key.as_ref().len());
    multicodec.extend_from_slice(&ED25519_MULTICODEC_PREFIX);
    multicodec.extend_from_slice(public_key.as_ref());
    format!("did:key:z{}", bs58::encode(multicodec).into_string())
}

/// Decode a `did:key` identifier back into an Ed25519 public key. Rejects
/// anything lacking the `z` multibase prefix or a non-`0xed01` multicodec.
pub fn did_key_to_public_key(did: &str) -> Result<PublicKey> {
    let encoded = did
        .strip_prefix("did:key:z")
        .ok_or_else(|| KernelError::Cryptographic(format!("invalid did:key format: {did}")))?;

    let decoded = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| KernelError::Cryptographic(format!("invalid base58btc in did:key: {e}")))?;

    if decoded.len() < 2 || decoded[0..2] != ED25519_MULTICODEC_PREFIX {
        return Err(KernelError::Cryptographic(
            "not an Ed25519 did:key (wrong multicodec prefix)".into(),
        ));
    }

    PublicKey::from_slice(&decoded[2..])
        .map_err(|e| KernelError::Cryptographic(format!("invalid public key bytes: {e}")))
}

/// The `#<fragment>` suffix this kernel appends to a `did:key` to name the
/// single verification method it exposes.
pub fn did_key_fragment(did: &str) -> String {
    let key_part = did.strip_prefix("did:key:").unwrap_or(did);
    format!("#{key_part}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn did_key_roundtrip() {
        let kp = generate_keypair();
        let did = public_key_to_did_key(&kp.pk);
        let recovered = did_key_to_public_key(&did).unwrap();
        assert_eq!(kp.pk.as_ref(), recovered.as_ref());
    }

    #[test]
    fn did_key_rejects_bad_prefix() {
        assert!(did_key_to_public_key("did:web:example.com").is_err());
        assert!(did_key_to_public_key("not-a-did").is_err());
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let kp = generate_keypair();
        let msg = b"hello attestix";
        let sig = sign_b64url(&kp.sk, msg);
        assert!(verify_b64url(&kp.pk, msg, &sig));
        assert!(!verify_b64url(&kp.pk, b"tampered", &sig));
    }

    /// RFC 8032 §7.1 test vector 1: seed, public key, and signature over
    /// the empty message.
    #[test]
    fn rfc8032_vector_1() {
        let seed = hex::decode("9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f6")
            .unwrap();
        let expected_pub =
            hex::decode("d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a")
                .unwrap();
        let expected_sig = hex::decode(
            "e5564300c360ac729086e2cc806e828a84877f1eb8e5d974d873e06522490155fb8821590a33bacc61e39701cf9b46bd25bf5f0595bbe24655141438e7a100b",
        )
        .unwrap();

        let seed_arr: [u8; 32] = seed.try_into().unwrap();
        let seed = ed25519_compact::Seed::from_slice(&seed_arr).unwrap();
        let kp = KeyPair::from_seed(seed);
        assert_eq!(kp.pk.as_ref(), expected_pub.as_slice());

        let sig = sign(&kp.sk, b"");
        assert_eq!(sig.as_slice(), expected_sig.as_slice());
        assert!(verify(&kp.pk, b"", &sig));
    }
}
