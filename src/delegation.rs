//! UCAN-style delegation tokens.
//!
//! Capability delegation between agents is expressed as a JWT signed by the
//! server's Ed25519 key (`EdDSA`), carrying a UCAN-flavored claim set
//! (`att`, `prf`, `typ: "ucan/delegation"`). Revocation is tracked
//! out-of-band by `jti` in a small persisted collection; the JWT itself is
//! never stored, only its record.

use crate::error::{KernelError, Result};
use crate::kernel::SigningKey;
use crate::store::SafeStore;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;

const DEFAULT_EXPIRY_HOURS: i64 = 24;

/// The UCAN spec version this crate's delegation tokens declare in their
/// JWT header (`ucv`), alongside the standard `typ`/`alg` fields.
const UCAN_VERSION: &str = "0.9.0";

fn base64url_encode(bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Encode a UCAN delegation JWT by hand rather than through
/// `jsonwebtoken::encode`, since that crate's `Header` type has no room for
/// the custom `ucv` claim this wire format requires. Verification still
/// goes through `jsonwebtoken::decode`, which ignores header fields it
/// doesn't recognize.
fn encode_ucan_jwt(claims: &UcanClaims, signing_key: &SigningKey) -> Result<String> {
    let header = json!({"typ": "JWT", "alg": "EdDSA", "ucv": UCAN_VERSION});
    let header_b64 = base64url_encode(&serde_json::to_vec(&header)?);
    let payload_b64 = base64url_encode(&serde_json::to_vec(claims)?);
    let signing_input = format!("{header_b64}.{payload_b64}");
    let signature_b64 = signing_key.sign_bytes(signing_input.as_bytes());
    Ok(format!("{signing_input}.{signature_b64}"))
}

/// Fixed SubjectPublicKeyInfo prefix for an Ed25519 public key (RFC 8410
/// §4); the 32-byte public key is appended directly.
const SPKI_ED25519_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

fn decoding_key_from_public(pub_bytes: &[u8]) -> DecodingKey {
    let mut der = Vec::with_capacity(SPKI_ED25519_PREFIX.len() + pub_bytes.len());
    der.extend_from_slice(&SPKI_ED25519_PREFIX);
    der.extend_from_slice(pub_bytes);
    DecodingKey::from_ed_der(&der)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationRecord {
    pub jti: String,
    pub issuer: String,
    pub audience: String,
    pub capabilities: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct DelegationCollection {
    delegations: Vec<DelegationRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UcanClaims {
    iss: String,
    aud: String,
    sub: String,
    iat: i64,
    exp: i64,
    nbf: i64,
    jti: String,
    att: Vec<String>,
    delegator: String,
    prf: Vec<String>,
    attestix_version: String,
    typ: String,
}

/// Outcome of verifying a delegation token. Mirrors the shape the Agent
/// Card / MCP surface returns to a caller deciding whether to honor a
/// delegated capability.
#[derive(Debug, Clone, Serialize)]
pub struct DelegationVerification {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    pub capabilities: Vec<String>,
    pub proof_chain: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub expired: bool,
}

pub struct DelegationService<'a> {
    store: SafeStore,
    signing_key: &'a SigningKey,
    server_public_key: ed25519_compact::PublicKey,
}

impl<'a> DelegationService<'a> {
    pub fn new(data_dir: impl AsRef<Path>, signing_key: &'a SigningKey) -> Result<Self> {
        let server_public_key = crate::crypto::did_key_to_public_key(signing_key.did())?;
        Ok(Self {
            store: SafeStore::new(data_dir.as_ref().join("delegations.json")),
            signing_key,
            server_public_key,
        })
    }

    /// Mint a UCAN-style delegation JWT from `issuer_agent_id` to
    /// `audience_agent_id` granting `capabilities`.
    pub async fn create_delegation(
        &self,
        issuer_agent_id: &str,
        audience_agent_id: &str,
        capabilities: Vec<String>,
        expiry_hours: Option<i64>,
        parent_token: Option<String>,
    ) -> Result<(String, DelegationRecord)> {
        let now = Utc::now();
        let exp = now + chrono::Duration::hours(expiry_hours.unwrap_or(DEFAULT_EXPIRY_HOURS));
        let jti = base64url_encode(&rand::random::<[u8; 16]>());

        let claims = UcanClaims {
            iss: self.signing_key.did().to_string(),
            aud: audience_agent_id.to_string(),
            sub: audience_agent_id.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            nbf: now.timestamp(),
            jti: jti.clone(),
            att: capabilities.clone(),
            delegator: issuer_agent_id.to_string(),
            prf: parent_token.into_iter().collect(),
            attestix_version: crate::ATTESTIX_VERSION.to_string(),
            typ: "ucan/delegation".to_string(),
        };

        let token = encode_ucan_jwt(&claims, self.signing_key)?;

        let record = DelegationRecord {
            jti,
            issuer: issuer_agent_id.to_string(),
            audience: audience_agent_id.to_string(),
            capabilities,
            created_at: now,
            expires_at: exp,
            revoked: false,
            revocation_reason: None,
            revoked_at: None,
        };

        let mut data = self.store.load(DelegationCollection::default()).await?;
        data.delegations.push(record.clone());
        self.store.save(&data).await?;

        Ok((token, record))
    }

    /// Verify a delegation JWT's signature, expiry, and revocation status.
    pub async fn verify_delegation(&self, token: &str) -> Result<DelegationVerification> {
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.validate_aud = false;
        // Expiry is reported as a distinct `expired` flag below, not folded
        // into a generic decode failure, so jsonwebtoken must not reject an
        // expired token before we get a chance to classify it.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let decoding_key = decoding_key_from_public(self.server_public_key.as_ref());
        let decoded = match jsonwebtoken::decode::<UcanClaims>(token, &decoding_key, &validation) {
            Ok(d) => d,
            Err(e) => {
                return Ok(DelegationVerification {
                    valid: false,
                    reason: Some(format!("invalid token: {e}")),
                    jti: None,
                    delegator: None,
                    audience: None,
                    capabilities: vec![],
                    proof_chain: vec![],
                    issued_at: None,
                    expires_at: None,
                    expired: false,
                });
            }
        };
        let claims = decoded.claims;

        let data = self.store.load(DelegationCollection::default()).await?;
        if let Some(record) = data.delegations.iter().find(|d| d.jti == claims.jti) {
            if record.revoked {
                return Ok(DelegationVerification {
                    valid: false,
                    reason: Some("token has been revoked".to_string()),
                    jti: Some(claims.jti),
                    delegator: Some(claims.delegator),
                    audience: Some(claims.aud),
                    capabilities: claims.att,
                    proof_chain: claims.prf,
                    issued_at: DateTime::from_timestamp(claims.iat, 0),
                    expires_at: DateTime::from_timestamp(claims.exp, 0),
                    expired: false,
                });
            }
        }

        let expired = claims.exp < Utc::now().timestamp();
        Ok(DelegationVerification {
            valid: !expired,
            reason: expired.then(|| "token has expired".to_string()),
            jti: Some(claims.jti),
            delegator: Some(claims.delegator),
            audience: Some(claims.aud),
            capabilities: claims.att,
            proof_chain: claims.prf,
            issued_at: DateTime::from_timestamp(claims.iat, 0),
            expires_at: DateTime::from_timestamp(claims.exp, 0),
            expired,
        })
    }

    /// Revoke a delegation by `jti`.
    pub async fn revoke_delegation(&self, jti: &str, reason: &str) -> Result<DelegationRecord> {
        let mut data = self.store.load(DelegationCollection::default()).await?;
        let record = data
            .delegations
            .iter_mut()
            .find(|d| d.jti == jti)
            .ok_or_else(|| KernelError::NotFound(format!("delegation {jti} not found")))?;

        if record.revoked {
            return Err(KernelError::PolicyViolation(format!(
                "delegation {jti} is already revoked"
            )));
        }
        record.revoked = true;
        record.revocation_reason = Some(reason.to_string());
        record.revoked_at = Some(Utc::now());
        let result = record.clone();

        self.store.save(&data).await?;
        Ok(result)
    }

    /// List delegation records, optionally filtered by participant and role.
    pub async fn list_delegations(
        &self,
        agent_id: Option<&str>,
        role: DelegationRole,
        include_expired: bool,
    ) -> Result<Vec<DelegationRecord>> {
        let data = self.store.load(DelegationCollection::default()).await?;
        let now = Utc::now();

        Ok(data
            .delegations
            .into_iter()
            .filter(|d| {
                if let Some(agent_id) = agent_id {
                    match role {
                        DelegationRole::Issuer => d.issuer == agent_id,
                        DelegationRole::Audience => d.audience == agent_id,
                        DelegationRole::Any => d.issuer == agent_id || d.audience == agent_id,
                    }
                } else {
                    true
                }
            })
            .filter(|d| include_expired || d.expires_at > now)
            .filter(|d| !d.revoked)
            .collect())
    }
}

impl<'a> DelegationService<'a> {
    /// GDPR erasure: remove every delegation record where `agent_id` is
    /// either the issuer or the audience. Returns the number removed.
    pub async fn purge(&self, agent_id: &str) -> Result<usize> {
        let mut data = self.store.load(DelegationCollection::default()).await?;
        let before = data.delegations.len();
        data.delegations
            .retain(|d| d.issuer != agent_id && d.audience != agent_id);
        let removed = before - data.delegations.len();
        if removed > 0 {
            self.store.save(&data).await?;
        }
        Ok(removed)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum DelegationRole {
    Issuer,
    Audience,
    Any,
}

/// Whether `child_caps` is a subset of `parent_caps`. `verify_delegation`
/// never calls this itself — per UCAN semantics, checking that a delegation
/// chain only narrows capabilities is a caller obligation, not something
/// the kernel enforces on every verification.
pub fn attenuates(child_caps: &[String], parent_caps: &[String]) -> bool {
    child_caps.iter().all(|c| parent_caps.contains(c))
}

/// Decode a delegation JWT's claims without verifying anything, for display
/// purposes only (mirrors [`crate::token::extract_token_info`]'s
/// unverified-JWT path). Never use this result for an authorization
/// decision.
pub fn peek_unverified_claims(token: &str) -> Result<Value> {
    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    let dummy_key = DecodingKey::from_secret(b"");
    let decoded = jsonwebtoken::decode::<Value>(token, &dummy_key, &validation)
        .map_err(|e| KernelError::Validation(format!("malformed delegation token: {e}")))?;
    Ok(decoded.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile_for_tests::TempDir;

    mod tempfile_for_tests {
        use std::path::PathBuf;
        pub struct TempDir(PathBuf);
        impl TempDir {
            pub fn new(label: &str) -> Self {
                let mut dir = std::env::temp_dir();
                dir.push(format!("attestix-delegation-test-{label}-{:?}", std::thread::current().id()));
                std::fs::create_dir_all(&dir).unwrap();
                Self(dir)
            }
            pub fn path(&self) -> &std::path::Path {
                &self.0
            }
        }
        impl Drop for TempDir {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.0);
            }
        }
    }

    async fn service(dir: &std::path::Path) -> (SigningKey, ) {
        let key = SigningKey::load_or_create(dir.join(".signing_key.json")).unwrap();
        (key,)
    }

    #[tokio::test]
    async fn create_then_verify_delegation_roundtrips() {
        let dir = TempDir::new("create-verify");
        let (key,) = service(dir.path()).await;
        let svc = DelegationService::new(dir.path(), &key).unwrap();

        let (token, record) = svc
            .create_delegation("attestix:issuer01", "attestix:aud0001", vec!["read".into()], None, None)
            .await
            .unwrap();

        let verified = svc.verify_delegation(&token).await.unwrap();
        assert!(verified.valid);
        assert_eq!(verified.jti, Some(record.jti));
    }

    #[tokio::test]
    async fn revoked_delegation_fails_verification() {
        let dir = TempDir::new("revoke");
        let (key,) = service(dir.path()).await;
        let svc = DelegationService::new(dir.path(), &key).unwrap();

        let (token, record) = svc
            .create_delegation("attestix:issuer02", "attestix:aud0002", vec!["write".into()], None, None)
            .await
            .unwrap();
        svc.revoke_delegation(&record.jti, "compromised").await.unwrap();

        let verified = svc.verify_delegation(&token).await.unwrap();
        assert!(!verified.valid);
    }

    #[tokio::test]
    async fn list_delegations_filters_by_role() {
        let dir = TempDir::new("list");
        let (key,) = service(dir.path()).await;
        let svc = DelegationService::new(dir.path(), &key).unwrap();

        svc.create_delegation("attestix:alice0001", "attestix:bob00001", vec!["read".into()], None, None)
            .await
            .unwrap();

        let as_issuer = svc
            .list_delegations(Some("attestix:alice0001"), DelegationRole::Issuer, false)
            .await
            .unwrap();
        assert_eq!(as_issuer.len(), 1);

        let as_audience = svc
            .list_delegations(Some("attestix:alice0001"), DelegationRole::Audience, false)
            .await
            .unwrap();
        assert!(as_audience.is_empty());
    }

    #[test]
    fn attenuates_checks_subset() {
        let parent = vec!["read".to_string(), "write".to_string()];
        let narrower = vec!["read".to_string()];
        let wider = vec!["read".to_string(), "delete".to_string()];
        assert!(attenuates(&narrower, &parent));
        assert!(!attenuates(&wider, &parent));
    }

    #[tokio::test]
    async fn revoking_parent_does_not_invalidate_child_structurally() {
        let dir = TempDir::new("parent-revoke");
        let (key,) = service(dir.path()).await;
        let svc = DelegationService::new(dir.path(), &key).unwrap();

        let (parent_token, parent_record) = svc
            .create_delegation("attestix:root00001", "attestix:mid000001", vec!["read".into(), "write".into()], Some(1), None)
            .await
            .unwrap();
        let (child_token, _) = svc
            .create_delegation(
                "attestix:mid000001",
                "attestix:leaf00001",
                vec!["read".into()],
                Some(1),
                Some(parent_token.clone()),
            )
            .await
            .unwrap();

        svc.revoke_delegation(&parent_record.jti, "compromised root").await.unwrap();

        let parent_check = svc.verify_delegation(&parent_token).await.unwrap();
        assert!(!parent_check.valid);

        // The child's own jti was never revoked, so it still verifies
        // structurally; honoring the revoked parent proof is a caller
        // obligation this kernel documents but does not enforce.
        let child_check = svc.verify_delegation(&child_token).await.unwrap();
        assert!(child_check.valid);
    }

    #[tokio::test]
    async fn purge_removes_delegations_naming_agent_either_side() {
        let dir = TempDir::new("purge");
        let (key,) = service(dir.path()).await;
        let svc = DelegationService::new(dir.path(), &key).unwrap();

        svc.create_delegation("attestix:sweep0001", "attestix:other0001", vec!["read".into()], None, None)
            .await
            .unwrap();
        svc.create_delegation("attestix:other0002", "attestix:sweep0001", vec!["read".into()], None, None)
            .await
            .unwrap();

        let removed = svc.purge("attestix:sweep0001").await.unwrap();
        assert_eq!(removed, 2);
    }
}
