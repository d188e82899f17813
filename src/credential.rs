//! Credential Service: W3C Verifiable Credentials and Presentations.
//!
//! Issuance produces an `Ed25519Signature2020` proof over everything except
//! `proof`/`credentialStatus` (the mutable core, per [`SignableView`]).
//! Presentations wrap a holder's credentials with a second, separate proof
//! (`proofPurpose: "authentication"`) binding a challenge/domain pair.

use crate::error::{KernelError, Result};
use crate::kernel::{self, SignableView, SigningKey};
use crate::store::SafeStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;

const VC_CONTEXT: &[&str] = &[
    "https://www.w3.org/2018/credentials/v1",
    "https://w3id.org/security/suites/ed25519-2020/v1",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub created: DateTime<Utc>,
    pub verification_method: String,
    pub proof_purpose: String,
    pub proof_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// VC issuer per the W3C VC Data Model: a stable `id` (always the server's
/// `did:key`, since this crate is the sole issuer) plus a human-readable
/// `name` supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcIssuer {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiableCredential {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    #[serde(rename = "type")]
    pub types: Vec<String>,
    pub issuer: VcIssuer,
    pub issuance_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
    pub credential_subject: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_status: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
}

impl SignableView for VerifiableCredential {
    fn signable_core(&self) -> Value {
        json!({
            "@context": self.context,
            "id": self.id,
            "type": self.types,
            "issuer": self.issuer,
            "issuanceDate": self.issuance_date,
            "expirationDate": self.expiration_date,
            "credentialSubject": self.credential_subject,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiablePresentation {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    #[serde(rename = "type")]
    pub types: Vec<String>,
    pub holder: String,
    pub verifiable_credential: Vec<VerifiableCredential>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
}

impl SignableView for VerifiablePresentation {
    fn signable_core(&self) -> Value {
        json!({
            "@context": self.context,
            "id": self.id,
            "type": self.types,
            "holder": self.holder,
            "verifiableCredential": self.verifiable_credential,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct CredentialCollection {
    credentials: Vec<VerifiableCredential>,
}

pub struct CredentialService<'a> {
    store: SafeStore,
    signing_key: &'a SigningKey,
}

impl<'a> CredentialService<'a> {
    pub fn new(data_dir: impl AsRef<Path>, signing_key: &'a SigningKey) -> Self {
        Self {
            store: SafeStore::new(data_dir.as_ref().join("credentials.json")),
            signing_key,
        }
    }

    /// Issue and sign a new Verifiable Credential.
    pub async fn issue_credential(
        &self,
        subject_id: &str,
        credential_type: &str,
        issuer_name: &str,
        claims: Value,
        expiry_days: Option<i64>,
    ) -> Result<VerifiableCredential> {
        let now = Utc::now();
        let expiration_date = expiry_days.map(|d| now + chrono::Duration::days(d));

        let mut subject = json!({ "id": subject_id });
        if let Value::Object(map) = &claims {
            if let Value::Object(subject_map) = &mut subject {
                for (k, v) in map {
                    subject_map.insert(k.clone(), v.clone());
                }
            }
        }

        let mut credential = VerifiableCredential {
            context: VC_CONTEXT.iter().map(|s| s.to_string()).collect(),
            id: format!("urn:uuid:{}", uuid::Uuid::new_v4()),
            types: vec!["VerifiableCredential".to_string(), credential_type.to_string()],
            issuer: VcIssuer {
                id: self.signing_key.did().to_string(),
                name: issuer_name.to_string(),
            },
            issuance_date: now,
            expiration_date,
            credential_subject: subject,
            credential_status: None,
            proof: None,
        };

        let proof_value = self.signing_key.sign(&credential)?;
        credential.proof = Some(Proof {
            proof_type: "Ed25519Signature2020".to_string(),
            created: now,
            verification_method: format!("{}#key-1", self.signing_key.did()),
            proof_purpose: "assertionMethod".to_string(),
            proof_value,
            challenge: None,
            domain: None,
        });

        let mut data = self.store.load(CredentialCollection::default()).await?;
        data.credentials.push(credential.clone());
        self.store.save(&data).await?;

        Ok(credential)
    }

    pub async fn get_credential(&self, credential_id: &str) -> Result<Option<VerifiableCredential>> {
        let data = self.store.load(CredentialCollection::default()).await?;
        Ok(data.credentials.into_iter().find(|c| c.id == credential_id))
    }

    pub async fn list_credentials(
        &self,
        subject_id: Option<&str>,
        credential_type: Option<&str>,
        valid_only: bool,
    ) -> Result<Vec<VerifiableCredential>> {
        let data = self.store.load(CredentialCollection::default()).await?;
        let now = Utc::now();

        Ok(data
            .credentials
            .into_iter()
            .filter(|c| {
                subject_id
                    .map(|sid| c.credential_subject.get("id").and_then(|v| v.as_str()) == Some(sid))
                    .unwrap_or(true)
            })
            .filter(|c| credential_type.map(|t| c.types.iter().any(|ty| ty == t)).unwrap_or(true))
            .filter(|c| {
                if !valid_only {
                    return true;
                }
                let not_revoked = c
                    .credential_status
                    .as_ref()
                    .and_then(|s| s.get("revoked"))
                    .and_then(|v| v.as_bool())
                    .map(|revoked| !revoked)
                    .unwrap_or(true);
                let not_expired = c.expiration_date.map(|exp| now < exp).unwrap_or(true);
                not_revoked && not_expired
            })
            .collect())
    }

    /// Mark a credential's `credentialStatus` as revoked without re-signing
    /// (the proof covers only the original, signed claims).
    pub async fn revoke_credential(&self, credential_id: &str, reason: &str) -> Result<()> {
        let mut data = self.store.load(CredentialCollection::default()).await?;
        let credential = data
            .credentials
            .iter_mut()
            .find(|c| c.id == credential_id)
            .ok_or_else(|| KernelError::NotFound(format!("credential {credential_id} not found")))?;

        credential.credential_status = Some(json!({
            "revoked": true,
            "reason": reason,
            "revoked_at": Utc::now(),
        }));
        self.store.save(&data).await?;
        Ok(())
    }

    /// Check existence, revocation, expiry, and signature on a locally
    /// issued credential.
    pub async fn verify_credential(&self, credential_id: &str) -> Result<bool> {
        let Some(credential) = self.get_credential(credential_id).await? else {
            return Ok(false);
        };
        Ok(self.credential_is_valid(&credential))
    }

    /// Verify an arbitrary credential handed to us by a third party, with
    /// no local lookup. `not_revoked` defaults to true since we have no
    /// local revocation record for it.
    pub fn verify_credential_external(&self, credential: &VerifiableCredential) -> bool {
        self.credential_is_valid(credential)
    }

    fn credential_is_valid(&self, credential: &VerifiableCredential) -> bool {
        let not_revoked = credential
            .credential_status
            .as_ref()
            .and_then(|s| s.get("revoked"))
            .and_then(|v| v.as_bool())
            .map(|revoked| !revoked)
            .unwrap_or(true);
        let not_expired = credential
            .expiration_date
            .map(|exp| Utc::now() < exp)
            .unwrap_or(true);
        let signature_valid = match &credential.proof {
            Some(proof) => kernel::verify(credential, &credential.issuer.id, &proof.proof_value).signature_valid,
            None => false,
        };
        not_revoked && not_expired && signature_valid
    }

    /// GDPR erasure: remove every credential whose `credentialSubject.id`
    /// is `subject_id`. Returns the number removed.
    pub async fn purge(&self, subject_id: &str) -> Result<usize> {
        let mut data = self.store.load(CredentialCollection::default()).await?;
        let before = data.credentials.len();
        data.credentials
            .retain(|c| c.credential_subject.get("id").and_then(|v| v.as_str()) != Some(subject_id));
        let removed = before - data.credentials.len();
        if removed > 0 {
            self.store.save(&data).await?;
        }
        Ok(removed)
    }

    /// Bundle `credential_ids` (all must belong to `holder_did`) into a
    /// signed Verifiable Presentation.
    pub async fn create_verifiable_presentation(
        &self,
        holder_did: &str,
        credential_ids: &[String],
        challenge: Option<&str>,
        domain: Option<&str>,
    ) -> Result<VerifiablePresentation> {
        let data = self.store.load(CredentialCollection::default()).await?;
        let mut credentials = Vec::with_capacity(credential_ids.len());
        for id in credential_ids {
            let credential = data
                .credentials
                .iter()
                .find(|c| &c.id == id)
                .ok_or_else(|| KernelError::NotFound(format!("credential {id} not found")))?;
            let subject_id = credential.credential_subject.get("id").and_then(|v| v.as_str());
            if subject_id != Some(holder_did) {
                return Err(KernelError::PolicyViolation(format!(
                    "credential {id} does not belong to holder {holder_did}"
                )));
            }
            credentials.push(credential.clone());
        }

        let now = Utc::now();
        let mut presentation = VerifiablePresentation {
            context: VC_CONTEXT.iter().map(|s| s.to_string()).collect(),
            id: format!("urn:uuid:{}", uuid::Uuid::new_v4()),
            types: vec!["VerifiablePresentation".to_string()],
            holder: holder_did.to_string(),
            verifiable_credential: credentials,
            proof: None,
        };

        let proof_value = self.signing_key.sign(&presentation)?;
        presentation.proof = Some(Proof {
            proof_type: "Ed25519Signature2020".to_string(),
            created: now,
            verification_method: format!("{}#key-1", self.signing_key.did()),
            proof_purpose: "authentication".to_string(),
            proof_value,
            challenge: challenge.map(|s| s.to_string()),
            domain: domain.map(|s| s.to_string()),
        });

        Ok(presentation)
    }

    /// Verify presentation structure, its authentication proof, every
    /// bundled credential, holder/subject binding, and presence of
    /// challenge/domain.
    pub fn verify_presentation(&self, presentation: &VerifiablePresentation) -> PresentationVerification {
        let structure_valid = !presentation.verifiable_credential.is_empty();

        let vp_signature_valid = match &presentation.proof {
            Some(proof) => {
                let issuer_did = proof
                    .verification_method
                    .split_once('#')
                    .map(|(did, _fragment)| did)
                    .unwrap_or(&proof.verification_method);
                kernel::verify(presentation, issuer_did, &proof.proof_value).signature_valid
            }
            None => false,
        };

        let credentials_valid = presentation
            .verifiable_credential
            .iter()
            .all(|c| self.credential_is_valid(c));

        let holder_matches_subjects = presentation.verifiable_credential.iter().all(|c| {
            c.credential_subject.get("id").and_then(|v| v.as_str()) == Some(presentation.holder.as_str())
        });

        let challenge_present = presentation
            .proof
            .as_ref()
            .map(|p| p.challenge.is_some())
            .unwrap_or(false);
        let domain_present = presentation.proof.as_ref().map(|p| p.domain.is_some()).unwrap_or(false);

        PresentationVerification {
            valid: structure_valid
                && vp_signature_valid
                && credentials_valid
                && holder_matches_subjects,
            structure_valid,
            vp_signature_valid,
            credentials_valid,
            holder_matches_subjects,
            challenge_present,
            domain_present,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PresentationVerification {
    pub valid: bool,
    pub structure_valid: bool,
    pub vp_signature_valid: bool,
    pub credentials_valid: bool,
    pub holder_matches_subjects: bool,
    pub challenge_present: bool,
    pub domain_present: bool,
}
