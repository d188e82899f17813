//! Identity Service: the Unified Agent Identity Token (UAIT) lifecycle.
//!
//! Create, read, list, verify, revoke, and translate agent identities. The
//! immutable signed core is projected via [`SignableView`]; `signature`,
//! `revoked`, `revocation_reason`, `revoked_at`, `reputation_score`, and
//! `eu_compliance` are mutable and excluded from it.

use crate::error::{KernelError, Result};
use crate::kernel::{self, SignableView, SigningKey};
use crate::store::SafeStore;
use crate::token::{self, TokenInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;

const DEFAULT_EXPIRY_DAYS: i64 = 365;
pub const UAIT_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issuer {
    pub name: String,
    pub did: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub version: String,
    pub agent_id: String,
    pub display_name: String,
    pub description: String,
    pub source_protocol: String,
    pub identity_token: String,
    pub token_info: Option<TokenInfo>,
    pub capabilities: Vec<String>,
    pub issuer: Issuer,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revocation_reason: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub reputation_score: Option<f64>,
    pub eu_compliance: Option<String>,
    pub signature: Option<String>,
}

impl SignableView for Identity {
    fn signable_core(&self) -> Value {
        json!({
            "version": self.version,
            "agent_id": self.agent_id,
            "display_name": self.display_name,
            "description": self.description,
            "source_protocol": self.source_protocol,
            "identity_token": self.identity_token,
            "token_info": self.token_info,
            "capabilities": self.capabilities,
            "issuer": self.issuer,
            "created_at": self.created_at,
            "expires_at": self.expires_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct IdentityCollection {
    agents: Vec<Identity>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentityChecks {
    pub exists: bool,
    pub not_revoked: Option<bool>,
    pub not_expired: Option<bool>,
    pub signature_valid: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub valid: bool,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub checks: IdentityChecks,
}

/// Supported [`IdentityService::translate_identity`] targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationTarget {
    A2aAgentCard,
    DidDocument,
    OauthClaims,
    Summary,
}

pub struct IdentityService<'a> {
    store: SafeStore,
    signing_key: &'a SigningKey,
}

impl<'a> IdentityService<'a> {
    pub fn new(data_dir: impl AsRef<Path>, signing_key: &'a SigningKey) -> Self {
        Self {
            store: SafeStore::new(data_dir.as_ref().join("identities.json")),
            signing_key,
        }
    }

    /// Create and sign a new UAIT.
    pub async fn create_identity(
        &self,
        display_name: &str,
        source_protocol: &str,
        identity_token: &str,
        capabilities: Vec<String>,
        description: &str,
        issuer_name: Option<&str>,
        expiry_days: Option<i64>,
    ) -> Result<Identity> {
        let agent_id = format!("attestix:{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        let now = Utc::now();
        let expires_at = now + chrono::Duration::days(expiry_days.unwrap_or(DEFAULT_EXPIRY_DAYS));

        let token_info = if identity_token.is_empty() {
            None
        } else {
            Some(token::extract_token_info(identity_token))
        };

        // Per the UAIT signed-core shape, a secret-shaped token is masked
        // before it ever enters the signed core — the raw secret is never
        // persisted, signed, or returned to a caller.
        let stored_token = match token::classify_token(identity_token) {
            token::TokenKind::ApiKey => token::mask(identity_token),
            _ => identity_token.to_string(),
        };

        let mut identity = Identity {
            version: UAIT_VERSION.to_string(),
            agent_id,
            display_name: display_name.to_string(),
            description: description.to_string(),
            source_protocol: source_protocol.to_string(),
            identity_token: stored_token,
            token_info,
            capabilities,
            issuer: Issuer {
                name: issuer_name.unwrap_or("self").to_string(),
                did: self.signing_key.did().to_string(),
            },
            created_at: now,
            expires_at,
            revoked: false,
            revocation_reason: None,
            revoked_at: None,
            reputation_score: None,
            eu_compliance: None,
            signature: None,
        };

        identity.signature = Some(self.signing_key.sign(&identity)?);

        let mut data = self.store.load(IdentityCollection::default()).await?;
        data.agents.push(identity.clone());
        self.store.save(&data).await?;

        Ok(identity)
    }

    pub async fn get_identity(&self, agent_id: &str) -> Result<Option<Identity>> {
        let data = self.store.load(IdentityCollection::default()).await?;
        Ok(data.agents.into_iter().find(|a| a.agent_id == agent_id))
    }

    pub async fn list_identities(
        &self,
        source_protocol: Option<&str>,
        include_revoked: bool,
        limit: usize,
    ) -> Result<Vec<Identity>> {
        let data = self.store.load(IdentityCollection::default()).await?;
        Ok(data
            .agents
            .into_iter()
            .filter(|a| include_revoked || !a.revoked)
            .filter(|a| source_protocol.map(|p| a.source_protocol == p).unwrap_or(true))
            .take(limit)
            .collect())
    }

    pub async fn revoke_identity(&self, agent_id: &str, reason: &str) -> Result<Identity> {
        let mut data = self.store.load(IdentityCollection::default()).await?;
        let agent = data
            .agents
            .iter_mut()
            .find(|a| a.agent_id == agent_id)
            .ok_or_else(|| KernelError::NotFound(format!("identity {agent_id} not found")))?;

        agent.revoked = true;
        agent.revocation_reason = Some(reason.to_string());
        agent.revoked_at = Some(Utc::now());
        let result = agent.clone();

        self.store.save(&data).await?;
        Ok(result)
    }

    /// Link an EU AI Act compliance profile to an identity without
    /// re-signing: `eu_compliance` is a mutable field.
    pub async fn update_compliance_ref(&self, agent_id: &str, profile_id: &str) -> Result<()> {
        let mut data = self.store.load(IdentityCollection::default()).await?;
        if let Some(agent) = data.agents.iter_mut().find(|a| a.agent_id == agent_id) {
            agent.eu_compliance = Some(profile_id.to_string());
            self.store.save(&data).await?;
        }
        Ok(())
    }

    /// Update the cached reputation score without re-signing: `reputation_score`
    /// is a mutable field.
    pub async fn update_reputation(&self, agent_id: &str, score: f64) -> Result<()> {
        let mut data = self.store.load(IdentityCollection::default()).await?;
        if let Some(agent) = data.agents.iter_mut().find(|a| a.agent_id == agent_id) {
            agent.reputation_score = Some((score * 10_000.0).round() / 10_000.0);
            self.store.save(&data).await?;
        }
        Ok(())
    }

    /// Verify existence, revocation, expiry, and signature validity.
    pub async fn verify_identity(&self, agent_id: &str) -> Result<VerificationResult> {
        let Some(agent) = self.get_identity(agent_id).await? else {
            return Ok(VerificationResult {
                valid: false,
                agent_id: agent_id.to_string(),
                display_name: None,
                checks: IdentityChecks {
                    exists: false,
                    not_revoked: None,
                    not_expired: None,
                    signature_valid: None,
                },
            });
        };

        let not_revoked = !agent.revoked;
        let not_expired = Utc::now() < agent.expires_at;
        let signature_valid = match &agent.signature {
            Some(sig) => kernel::verify(&agent, &agent.issuer.did, sig).signature_valid,
            None => false,
        };

        let valid = not_revoked && not_expired && signature_valid;

        Ok(VerificationResult {
            valid,
            agent_id: agent_id.to_string(),
            display_name: Some(agent.display_name.clone()),
            checks: IdentityChecks {
                exists: true,
                not_revoked: Some(not_revoked),
                not_expired: Some(not_expired),
                signature_valid: Some(signature_valid),
            },
        })
    }

    /// Convert a UAIT to another representation for interop with another
    /// agent ecosystem.
    pub async fn translate_identity(
        &self,
        agent_id: &str,
        target: TranslationTarget,
    ) -> Result<Value> {
        let agent = self
            .get_identity(agent_id)
            .await?
            .ok_or_else(|| KernelError::NotFound(format!("identity {agent_id} not found")))?;

        Ok(match target {
            TranslationTarget::A2aAgentCard => to_agent_card(&agent),
            TranslationTarget::DidDocument => to_did_document(&agent),
            TranslationTarget::OauthClaims => to_oauth_claims(&agent),
            TranslationTarget::Summary => to_summary(&agent),
        })
    }

    /// Build this agent's Agent Card directly — the shape a third party
    /// would fetch at `/.well-known/agent.json`. Additive to
    /// [`Self::translate_identity`]'s `A2aAgentCard` target, which renders
    /// the same document.
    pub async fn generate_agent_card(&self, agent_id: &str) -> Result<Value> {
        self.translate_identity(agent_id, TranslationTarget::A2aAgentCard).await
    }

    /// GDPR erasure: remove `agent_id` from the identities collection.
    /// Other per-agent collections (compliance, provenance/audit,
    /// credentials, reputation, delegations) are purged by the caller
    /// composing this with their own `purge`/removal methods, since this
    /// service holds no references to them — see the crate-level purge
    /// orchestration for the full sweep.
    pub async fn purge(&self, agent_id: &str) -> Result<bool> {
        let mut data = self.store.load(IdentityCollection::default()).await?;
        let before = data.agents.len();
        data.agents.retain(|a| a.agent_id != agent_id);
        let removed = data.agents.len() != before;
        if removed {
            self.store.save(&data).await?;
        }
        Ok(removed)
    }
}

fn to_agent_card(agent: &Identity) -> Value {
    use sha2::{Digest, Sha256};

    let skills: Vec<Value> = agent
        .capabilities
        .iter()
        .map(|cap| {
            let mut hasher = Sha256::new();
            hasher.update(cap.as_bytes());
            let digest = hex::encode(hasher.finalize());
            json!({
                "id": &digest[..8],
                "name": cap,
                "description": format!("Capability: {cap}"),
            })
        })
        .collect();

    json!({
        "name": agent.display_name,
        "description": agent.description,
        "url": format!("attestix://{}", agent.agent_id),
        "version": agent.version,
        "capabilities": { "streaming": false, "pushNotifications": false },
        "skills": skills,
        "provider": { "organization": agent.issuer.name },
        "authentication": { "schemes": ["attestix-uait"], "credentials": agent.agent_id },
        "_attestix_metadata": {
            "agent_id": agent.agent_id,
            "source_protocol": agent.source_protocol,
            "reputation_score": agent.reputation_score,
        },
    })
}

fn to_did_document(agent: &Identity) -> Value {
    let did = &agent.issuer.did;
    let pub_multibase = crate::crypto::did_key_to_public_key(did)
        .ok()
        .map(|pk| format!("z{}", bs58::encode(pk.as_ref()).into_string()));

    let mut vm = json!({
        "id": format!("{did}#key-1"),
        "type": "Ed25519VerificationKey2020",
        "controller": did,
    });
    if let Some(multibase) = pub_multibase {
        vm["publicKeyMultibase"] = Value::String(multibase);
    }

    json!({
        "@context": [
            "https://www.w3.org/ns/did/v1",
            "https://w3id.org/security/suites/ed25519-2020/v1",
        ],
        "id": did,
        "controller": did,
        "verificationMethod": [vm],
        "authentication": [format!("{did}#key-1")],
        "service": [{
            "id": format!("{did}#attestix"),
            "type": "AttestixIdentity",
            "serviceEndpoint": {
                "agent_id": agent.agent_id,
                "display_name": agent.display_name,
                "capabilities": agent.capabilities,
            },
        }],
    })
}

fn to_oauth_claims(agent: &Identity) -> Value {
    json!({
        "sub": agent.agent_id,
        "iss": agent.issuer.did,
        "name": agent.display_name,
        "scope": agent.capabilities.join(" "),
        "iat": agent.created_at,
        "exp": agent.expires_at,
        "attestix_version": agent.version,
        "source_protocol": agent.source_protocol,
    })
}

fn to_summary(agent: &Identity) -> Value {
    json!({
        "agent_id": agent.agent_id,
        "display_name": agent.display_name,
        "description": agent.description,
        "source_protocol": agent.source_protocol,
        "capabilities": agent.capabilities,
        "issuer": agent.issuer.name,
        "created_at": agent.created_at,
        "expires_at": agent.expires_at,
        "revoked": agent.revoked,
        "reputation_score": agent.reputation_score,
        "eu_compliance": agent.eu_compliance,
        "signature_present": agent.signature.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    mod tempfile_for_tests {
        use std::path::PathBuf;
        pub struct TempDir(PathBuf);
        impl TempDir {
            pub fn new(label: &str) -> Self {
                let mut dir = std::env::temp_dir();
                dir.push(format!("attestix-identity-test-{label}-{:?}", std::thread::current().id()));
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
    use tempfile_for_tests::TempDir;

    async fn signing_key(dir: &std::path::Path) -> SigningKey {
        SigningKey::load_or_create(dir.join(".signing_key.json")).unwrap()
    }

    #[tokio::test]
    async fn create_then_verify_identity_succeeds() {
        let dir = TempDir::new("create-verify");
        let key = signing_key(dir.path()).await;
        let svc = IdentityService::new(dir.path(), &key);

        let identity = svc
            .create_identity("Alice Agent", "mcp", "", vec!["read".into()], "", None, None)
            .await
            .unwrap();

        let result = svc.verify_identity(&identity.agent_id).await.unwrap();
        assert!(result.valid);
        assert!(result.checks.signature_valid.unwrap());
    }

    #[tokio::test]
    async fn mutating_reputation_does_not_break_signature() {
        let dir = TempDir::new("mutate-reputation");
        let key = signing_key(dir.path()).await;
        let svc = IdentityService::new(dir.path(), &key);

        let identity = svc
            .create_identity("Bob Agent", "mcp", "", vec![], "", None, None)
            .await
            .unwrap();
        svc.update_reputation(&identity.agent_id, 0.87).await.unwrap();

        let result = svc.verify_identity(&identity.agent_id).await.unwrap();
        assert!(result.valid);
    }

    #[tokio::test]
    async fn revoked_identity_fails_verification() {
        let dir = TempDir::new("revoke");
        let key = signing_key(dir.path()).await;
        let svc = IdentityService::new(dir.path(), &key);

        let identity = svc
            .create_identity("Carol Agent", "a2a", "", vec![], "", None, None)
            .await
            .unwrap();
        svc.revoke_identity(&identity.agent_id, "compromised key").await.unwrap();

        let result = svc.verify_identity(&identity.agent_id).await.unwrap();
        assert!(!result.valid);
        assert_eq!(result.checks.not_revoked, Some(false));
    }

    #[tokio::test]
    async fn unknown_identity_reports_not_exists() {
        let dir = TempDir::new("missing");
        let key = signing_key(dir.path()).await;
        let svc = IdentityService::new(dir.path(), &key);

        let result = svc.verify_identity("attestix:nonexistent").await.unwrap();
        assert!(!result.valid);
        assert!(!result.checks.exists);
    }

    #[tokio::test]
    async fn translate_to_summary_reports_signature_present() {
        let dir = TempDir::new("translate");
        let key = signing_key(dir.path()).await;
        let svc = IdentityService::new(dir.path(), &key);

        let identity = svc
            .create_identity("Dana Agent", "mcp", "", vec![], "", None, None)
            .await
            .unwrap();
        let summary = svc
            .translate_identity(&identity.agent_id, TranslationTarget::Summary)
            .await
            .unwrap();
        assert_eq!(summary["signature_present"], true);
    }

    #[tokio::test]
    async fn purge_removes_identity_and_is_idempotent() {
        let dir = TempDir::new("purge");
        let key = signing_key(dir.path()).await;
        let svc = IdentityService::new(dir.path(), &key);

        let identity = svc
            .create_identity("Erin Agent", "mcp", "", vec![], "", None, None)
            .await
            .unwrap();

        let removed = svc.purge(&identity.agent_id).await.unwrap();
        assert!(removed);
        assert!(svc.get_identity(&identity.agent_id).await.unwrap().is_none());

        let removed_again = svc.purge(&identity.agent_id).await.unwrap();
        assert!(!removed_again);
    }

    #[tokio::test]
    async fn generate_agent_card_matches_translate_identity() {
        let dir = TempDir::new("agent-card");
        let key = signing_key(dir.path()).await;
        let svc = IdentityService::new(dir.path(), &key);

        let identity = svc
            .create_identity("Fiona Agent", "a2a", "", vec!["read".into()], "", None, None)
            .await
            .unwrap();

        let card = svc.generate_agent_card(&identity.agent_id).await.unwrap();
        assert_eq!(card["name"], "Fiona Agent");
        assert_eq!(card["_attestix_metadata"]["agent_id"], identity.agent_id.clone());
    }
}
