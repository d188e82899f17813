//! Anchoring: content-addressing artifacts and committing their digests
//! (or a Merkle root over a batch of them) to an external ledger.
//!
//! The ledger itself is an external collaborator, modeled here only as a
//! trait (`LedgerClient`) plus a `NullLedger` test double — a real EAS/web3
//! client is a downstream integration, out of scope for this crate.

use crate::codec::canonicalize_value;
use crate::error::{KernelError, Result};
use crate::provenance::AuditEntry;
use crate::store::SafeStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Identity,
    Credential,
    Declaration,
    AuditBatch,
}

/// SHA-256 over the canonical serialization of `value`.
pub fn hash_artifact<T: Serialize>(value: &T) -> Result<String> {
    let bytes = canonicalize_value(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Build a Merkle root over `entries` using RFC 6962-style domain
/// separation: leaves are `SHA-256(0x00 || canonical bytes)`, internal
/// nodes are `SHA-256(0x01 || left || right)`, and an odd node at any
/// level is promoted unchanged rather than duplicated.
pub fn merkle_root<T: Serialize>(entries: &[T]) -> Result<[u8; 32]> {
    if entries.is_empty() {
        return Err(KernelError::Validation("cannot build a Merkle tree over zero entries".into()));
    }

    let mut level: Vec<[u8; 32]> = Vec::with_capacity(entries.len());
    for entry in entries {
        let bytes = canonicalize_value(entry)?;
        let mut hasher = Sha256::new();
        hasher.update([0x00]);
        hasher.update(&bytes);
        level.push(hasher.finalize().into());
    }

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut i = 0;
        while i < level.len() {
            if i + 1 < level.len() {
                let mut hasher = Sha256::new();
                hasher.update([0x01]);
                hasher.update(level[i]);
                hasher.update(level[i + 1]);
                next.push(hasher.finalize().into());
            } else {
                next.push(level[i]);
            }
            i += 2;
        }
        level = next;
    }

    Ok(level[0])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub anchor_id: String,
    pub artifact_type: ArtifactType,
    pub artifact_id: String,
    pub artifact_hash: String,
    pub network: String,
    pub tx_hash: Option<String>,
    pub attestation_uid: Option<String>,
    pub attester: Option<String>,
    pub block_number: Option<u64>,
    pub anchored_at: DateTime<Utc>,
    pub issuer_did: String,
    pub explorer_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct AnchorCollection {
    anchors: Vec<AnchorRecord>,
}

/// One on-chain attestation as returned by a `LedgerClient`.
#[derive(Debug, Clone)]
pub struct AttestationReceipt {
    pub tx_hash: String,
    pub attestation_uid: String,
    pub block_number: u64,
}

#[derive(Debug, Clone)]
pub struct AttestationView {
    pub valid: bool,
    pub attester: String,
    pub revoked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostEstimate {
    pub network: String,
    pub estimated_gas: u64,
    pub estimated_fee_native: f64,
}

/// Facade for an EAS-style (Ethereum Attestation Service) external ledger.
/// A real implementation submits an on-chain, revocable, self-recipient
/// attestation with `expirationTime=0` over the schema
/// `bytes32 artifactHash, string artifactType, string artifactId, string issuerDid`.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    fn is_configured(&self) -> bool;
    async fn register_schema(&self, network: &str) -> Result<String>;
    async fn attest(
        &self,
        network: &str,
        schema_uid: &str,
        artifact_hash: &str,
        artifact_type: &str,
        artifact_id: &str,
        issuer_did: &str,
    ) -> Result<AttestationReceipt>;
    async fn read_attestation(&self, network: &str, uid: &str) -> Result<AttestationView>;
    async fn estimate_cost(&self, network: &str, artifact_type: &str) -> Result<CostEstimate>;
}

/// Always-unconfigured ledger, suitable for tests and for hosts that have
/// not wired a real chain client.
#[derive(Debug, Default)]
pub struct NullLedger;

#[async_trait]
impl LedgerClient for NullLedger {
    fn is_configured(&self) -> bool {
        false
    }

    async fn register_schema(&self, _network: &str) -> Result<String> {
        Err(KernelError::LedgerUnconfigured(
            "no ledger credential configured; set ledger_credential to enable anchoring".into(),
        ))
    }

    async fn attest(
        &self,
        _network: &str,
        _schema_uid: &str,
        _artifact_hash: &str,
        _artifact_type: &str,
        _artifact_id: &str,
        _issuer_did: &str,
    ) -> Result<AttestationReceipt> {
        Err(KernelError::LedgerUnconfigured(
            "no ledger credential configured; set ledger_credential to enable anchoring".into(),
        ))
    }

    async fn read_attestation(&self, _network: &str, _uid: &str) -> Result<AttestationView> {
        Err(KernelError::LedgerUnconfigured(
            "no ledger credential configured; set ledger_credential to enable anchoring".into(),
        ))
    }

    async fn estimate_cost(&self, _network: &str, _artifact_type: &str) -> Result<CostEstimate> {
        Err(KernelError::LedgerUnconfigured(
            "no ledger credential configured; set ledger_credential to enable anchoring".into(),
        ))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnchorVerification {
    pub status: String,
    pub record: AnchorRecord,
    pub on_chain_valid: Option<bool>,
    pub attester: Option<String>,
}

pub struct AnchorService<'a> {
    store: SafeStore,
    issuer_did: String,
    ledger: &'a dyn LedgerClient,
    network: String,
}

impl<'a> AnchorService<'a> {
    pub fn new(data_dir: impl AsRef<Path>, issuer_did: &str, ledger: &'a dyn LedgerClient, network: &str) -> Self {
        Self {
            store: SafeStore::new(data_dir.as_ref().join("anchors.json")),
            issuer_did: issuer_did.to_string(),
            ledger,
            network: network.to_string(),
        }
    }

    /// Hash `artifact`, submit it to the ledger, and record the resulting
    /// anchor. Fails with `LedgerUnconfigured` up front if no ledger
    /// credential is present — callers never pay for a schema lookup that
    /// cannot be followed by an attestation.
    pub async fn anchor_artifact<T: Serialize>(
        &self,
        artifact: &T,
        artifact_type: ArtifactType,
        artifact_id: &str,
    ) -> Result<AnchorRecord> {
        if !self.ledger.is_configured() {
            return Err(KernelError::LedgerUnconfigured(
                "no ledger credential configured; set ledger_credential to enable anchoring".into(),
            ));
        }

        let artifact_hash = hash_artifact(artifact)?;
        let type_name = artifact_type_name(artifact_type);
        let schema_uid = self.ledger.register_schema(&self.network).await?;
        let receipt = self
            .ledger
            .attest(&self.network, &schema_uid, &artifact_hash, type_name, artifact_id, &self.issuer_did)
            .await?;

        let explorer_url = explorer_url(&self.network, &receipt.tx_hash);
        let record = AnchorRecord {
            anchor_id: format!("anchor:{}", &uuid::Uuid::new_v4().simple().to_string()[..12]),
            artifact_type,
            artifact_id: artifact_id.to_string(),
            artifact_hash,
            network: self.network.clone(),
            tx_hash: Some(receipt.tx_hash),
            attestation_uid: Some(receipt.attestation_uid),
            attester: Some(self.issuer_did.clone()),
            block_number: Some(receipt.block_number),
            anchored_at: Utc::now(),
            issuer_did: self.issuer_did.clone(),
            explorer_url,
        };

        let mut data = self.store.load(AnchorCollection::default()).await?;
        data.anchors.push(record.clone());
        self.store.save(&data).await?;

        Ok(record)
    }

    /// Build a Merkle root over `entries` (already filtered by caller to the
    /// desired agent/time window) and anchor the 32-byte root as an
    /// `audit_batch` artifact.
    pub async fn anchor_audit_batch(&self, entries: &[AuditEntry], batch_id: &str) -> Result<AnchorRecord> {
        if !self.ledger.is_configured() {
            return Err(KernelError::LedgerUnconfigured(
                "no ledger credential configured; set ledger_credential to enable anchoring".into(),
            ));
        }

        let root = merkle_root(entries)?;
        let root_hex = hex::encode(root);

        let schema_uid = self.ledger.register_schema(&self.network).await?;
        let receipt = self
            .ledger
            .attest(&self.network, &schema_uid, &root_hex, "audit_batch", batch_id, &self.issuer_did)
            .await?;

        let explorer_url = explorer_url(&self.network, &receipt.tx_hash);
        let record = AnchorRecord {
            anchor_id: format!("anchor:{}", &uuid::Uuid::new_v4().simple().to_string()[..12]),
            artifact_type: ArtifactType::AuditBatch,
            artifact_id: batch_id.to_string(),
            artifact_hash: root_hex,
            network: self.network.clone(),
            tx_hash: Some(receipt.tx_hash),
            attestation_uid: Some(receipt.attestation_uid),
            attester: Some(self.issuer_did.clone()),
            block_number: Some(receipt.block_number),
            anchored_at: Utc::now(),
            issuer_did: self.issuer_did.clone(),
            explorer_url,
        };

        let mut data = self.store.load(AnchorCollection::default()).await?;
        data.anchors.push(record.clone());
        self.store.save(&data).await?;

        Ok(record)
    }

    /// Check an anchor's on-chain status. If no ledger is configured,
    /// returns `status: "local_only"` with the stored record only.
    pub async fn verify_anchor(&self, artifact_hash: &str) -> Result<AnchorVerification> {
        let data = self.store.load(AnchorCollection::default()).await?;
        let record = data
            .anchors
            .iter()
            .find(|a| a.artifact_hash == artifact_hash)
            .cloned()
            .ok_or_else(|| KernelError::NotFound(format!("no anchor found for hash {artifact_hash}")))?;

        if !self.ledger.is_configured() {
            return Ok(AnchorVerification {
                status: "local_only".to_string(),
                record,
                on_chain_valid: None,
                attester: None,
            });
        }

        let Some(uid) = &record.attestation_uid else {
            return Ok(AnchorVerification {
                status: "local_only".to_string(),
                record,
                on_chain_valid: None,
                attester: None,
            });
        };

        let view = self.ledger.read_attestation(&self.network, uid).await?;
        Ok(AnchorVerification {
            status: "on_chain".to_string(),
            record,
            on_chain_valid: Some(view.valid && !view.revoked),
            attester: Some(view.attester),
        })
    }

    /// Rough, advisory gas/fee estimate; never blocks anchoring.
    pub async fn estimate_anchor_cost(&self, artifact_type: ArtifactType) -> Result<CostEstimate> {
        self.ledger
            .estimate_cost(&self.network, artifact_type_name(artifact_type))
            .await
    }

    pub async fn list_anchors(&self, artifact_type: Option<ArtifactType>, limit: usize) -> Result<Vec<AnchorRecord>> {
        let data = self.store.load(AnchorCollection::default()).await?;
        let mut anchors: Vec<AnchorRecord> = data
            .anchors
            .into_iter()
            .filter(|a| artifact_type.map(|t| a.artifact_type == t).unwrap_or(true))
            .collect();
        anchors.sort_by(|a, b| b.anchored_at.cmp(&a.anchored_at));
        anchors.truncate(limit);
        Ok(anchors)
    }
}

fn artifact_type_name(t: ArtifactType) -> &'static str {
    match t {
        ArtifactType::Identity => "identity",
        ArtifactType::Credential => "credential",
        ArtifactType::Declaration => "declaration",
        ArtifactType::AuditBatch => "audit_batch",
    }
}

fn explorer_url(network: &str, tx_hash: &str) -> Option<String> {
    let base = match network {
        "mainnet" => "https://etherscan.io/tx/",
        "sepolia" => "https://sepolia.etherscan.io/tx/",
        _ => return None,
    };
    Some(format!("{base}{tx_hash}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeLedger {
        configured: bool,
        calls: Mutex<u64>,
    }

    #[async_trait]
    impl LedgerClient for FakeLedger {
        fn is_configured(&self) -> bool {
            self.configured
        }
        async fn register_schema(&self, _network: &str) -> Result<String> {
            Ok("schema-fake".to_string())
        }
        async fn attest(
            &self,
            _network: &str,
            _schema_uid: &str,
            _artifact_hash: &str,
            _artifact_type: &str,
            _artifact_id: &str,
            _issuer_did: &str,
        ) -> Result<AttestationReceipt> {
            *self.calls.lock().unwrap() += 1;
            Ok(AttestationReceipt {
                tx_hash: "0xabc".to_string(),
                attestation_uid: "uid-1".to_string(),
                block_number: 42,
            })
        }
        async fn read_attestation(&self, _network: &str, _uid: &str) -> Result<AttestationView> {
            Ok(AttestationView {
                valid: true,
                attester: "did:key:zfake".to_string(),
                revoked: false,
            })
        }
        async fn estimate_cost(&self, network: &str, _artifact_type: &str) -> Result<CostEstimate> {
            Ok(CostEstimate {
                network: network.to_string(),
                estimated_gas: 100_000,
                estimated_fee_native: 0.001,
            })
        }
    }

    mod tempfile_for_tests {
        use std::path::PathBuf;
        pub struct TempDir(PathBuf);
        impl TempDir {
            pub fn new(label: &str) -> Self {
                let mut dir = std::env::temp_dir();
                dir.push(format!("attestix-anchoring-test-{label}-{:?}", std::thread::current().id()));
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

    #[test]
    fn merkle_root_is_deterministic_and_sensitive_to_changes() {
        let entries: Vec<Value> = (0..10).map(|i| json!({"i": i})).collect();
        let root1 = merkle_root(&entries).unwrap();
        let root2 = merkle_root(&entries).unwrap();
        assert_eq!(root1, root2);

        let mut tampered = entries.clone();
        tampered[5] = json!({"i": "x"});
        let root3 = merkle_root(&tampered).unwrap();
        assert_ne!(root1, root3);
    }

    #[test]
    fn merkle_root_rejects_empty_input() {
        let entries: Vec<Value> = vec![];
        assert!(merkle_root(&entries).is_err());
    }

    #[test]
    fn odd_number_of_leaves_promotes_last_node() {
        let entries: Vec<Value> = (0..3).map(|i| json!({"i": i})).collect();
        assert!(merkle_root(&entries).is_ok());
    }

    #[tokio::test]
    async fn unconfigured_ledger_refuses_to_anchor() {
        let dir = TempDir::new("unconfigured");
        let ledger = NullLedger;
        let svc = AnchorService::new(dir.path(), "did:key:zserver", &ledger, "sepolia");

        let err = svc
            .anchor_artifact(&json!({"hello": "world"}), ArtifactType::Identity, "attestix:agent01")
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::LedgerUnconfigured(_)));
    }

    #[tokio::test]
    async fn configured_ledger_anchors_and_records() {
        let dir = TempDir::new("configured");
        let ledger = FakeLedger {
            configured: true,
            calls: Mutex::new(0),
        };
        let svc = AnchorService::new(dir.path(), "did:key:zserver", &ledger, "sepolia");

        let record = svc
            .anchor_artifact(&json!({"hello": "world"}), ArtifactType::Identity, "attestix:agent01")
            .await
            .unwrap();
        assert_eq!(record.tx_hash.as_deref(), Some("0xabc"));

        let verification = svc.verify_anchor(&record.artifact_hash).await.unwrap();
        assert_eq!(verification.status, "on_chain");
        assert_eq!(verification.on_chain_valid, Some(true));
    }

    #[tokio::test]
    async fn local_only_status_when_ledger_unconfigured_but_anchor_recorded() {
        let dir = TempDir::new("local-only");
        let configured_ledger = FakeLedger {
            configured: true,
            calls: Mutex::new(0),
        };
        let svc = AnchorService::new(dir.path(), "did:key:zserver", &configured_ledger, "sepolia");
        let record = svc
            .anchor_artifact(&json!({"a": 1}), ArtifactType::Credential, "urn:uuid:abc")
            .await
            .unwrap();

        let null_ledger = NullLedger;
        let svc2 = AnchorService::new(dir.path(), "did:key:zserver", &null_ledger, "sepolia");
        let verification = svc2.verify_anchor(&record.artifact_hash).await.unwrap();
        assert_eq!(verification.status, "local_only");
    }
}
