//! Provenance records and the per-agent tamper-evident audit chain.
//!
//! Training-data and model-lineage entries are independent signed records.
//! Audit entries additionally chain: each new entry's `prev_hash` is the
//! `chain_hash` of the previous entry for the same agent, so a broken link
//! anywhere in an agent's history is detectable by recomputation.

use crate::codec::canonicalize_value;
use crate::error::{KernelError, Result};
use crate::kernel::{self, SignableView, SigningKey};
use crate::store::SafeStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::path::Path;

const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingDataEntry {
    pub entry_id: String,
    pub agent_id: String,
    pub dataset_name: String,
    pub source_url: String,
    pub license: String,
    pub data_categories: Vec<String>,
    pub contains_personal_data: bool,
    pub data_governance_measures: String,
    pub recorded_at: DateTime<Utc>,
    pub recorded_by: String,
    pub signature: Option<String>,
}

impl SignableView for TrainingDataEntry {
    fn signable_core(&self) -> Value {
        json!({
            "entry_id": self.entry_id,
            "entry_type": "training_data",
            "agent_id": self.agent_id,
            "dataset_name": self.dataset_name,
            "source_url": self.source_url,
            "license": self.license,
            "data_categories": self.data_categories,
            "contains_personal_data": self.contains_personal_data,
            "data_governance_measures": self.data_governance_measures,
            "recorded_at": self.recorded_at,
            "recorded_by": self.recorded_by,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelLineageEntry {
    pub entry_id: String,
    pub agent_id: String,
    pub base_model: String,
    pub base_model_provider: String,
    pub fine_tuning_method: String,
    pub evaluation_metrics: Value,
    pub recorded_at: DateTime<Utc>,
    pub recorded_by: String,
    pub signature: Option<String>,
}

impl SignableView for ModelLineageEntry {
    fn signable_core(&self) -> Value {
        json!({
            "entry_id": self.entry_id,
            "entry_type": "model_lineage",
            "agent_id": self.agent_id,
            "base_model": self.base_model,
            "base_model_provider": self.base_model_provider,
            "fine_tuning_method": self.fine_tuning_method,
            "evaluation_metrics": self.evaluation_metrics,
            "recorded_at": self.recorded_at,
            "recorded_by": self.recorded_by,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub log_id: String,
    pub agent_id: String,
    pub action_type: String,
    pub input_summary: String,
    pub output_summary: String,
    pub decision_rationale: String,
    pub human_override: bool,
    pub timestamp: DateTime<Utc>,
    pub logged_by: String,
    pub prev_hash: String,
    pub chain_hash: String,
    pub signature: Option<String>,
}

impl AuditEntry {
    fn chain_core(&self) -> Value {
        json!({
            "log_id": self.log_id,
            "agent_id": self.agent_id,
            "action_type": self.action_type,
            "input_summary": self.input_summary,
            "output_summary": self.output_summary,
            "decision_rationale": self.decision_rationale,
            "human_override": self.human_override,
            "timestamp": self.timestamp,
            "logged_by": self.logged_by,
            "prev_hash": self.prev_hash,
        })
    }
}

impl SignableView for AuditEntry {
    fn signable_core(&self) -> Value {
        let mut core = self.chain_core();
        core["chain_hash"] = json!(self.chain_hash);
        core
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ProvenanceCollection {
    entries: Vec<ProvenanceEntry>,
    audit_log: Vec<AuditEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "entry_type", rename_all = "snake_case")]
enum ProvenanceEntry {
    TrainingData(TrainingDataEntry),
    ModelLineage(ModelLineageEntry),
}

impl ProvenanceEntry {
    fn agent_id(&self) -> &str {
        match self {
            ProvenanceEntry::TrainingData(e) => &e.agent_id,
            ProvenanceEntry::ModelLineage(e) => &e.agent_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvenanceSummary {
    pub agent_id: String,
    pub training_data: Vec<TrainingDataEntry>,
    pub model_lineage: Vec<ModelLineageEntry>,
    pub audit_log_count: usize,
    pub recent_audit_entries: Vec<AuditEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainVerification {
    pub intact: bool,
    pub broken_at: Option<usize>,
}

pub struct ProvenanceService<'a> {
    store: SafeStore,
    signing_key: &'a SigningKey,
}

impl<'a> ProvenanceService<'a> {
    pub fn new(data_dir: impl AsRef<Path>, signing_key: &'a SigningKey) -> Self {
        Self {
            store: SafeStore::new(data_dir.as_ref().join("provenance.json")),
            signing_key,
        }
    }

    /// Record an Article 10 training-data provenance entry.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_training_data(
        &self,
        agent_id: &str,
        dataset_name: &str,
        source_url: &str,
        license: &str,
        data_categories: Vec<String>,
        contains_personal_data: bool,
        data_governance_measures: &str,
    ) -> Result<TrainingDataEntry> {
        if dataset_name.trim().is_empty() {
            return Err(KernelError::Validation("dataset_name must not be empty".into()));
        }

        let entry_id = format!("prov:{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        let mut entry = TrainingDataEntry {
            entry_id,
            agent_id: agent_id.to_string(),
            dataset_name: dataset_name.to_string(),
            source_url: source_url.to_string(),
            license: license.to_string(),
            data_categories,
            contains_personal_data,
            data_governance_measures: data_governance_measures.to_string(),
            recorded_at: Utc::now(),
            recorded_by: self.signing_key.did().to_string(),
            signature: None,
        };
        entry.signature = Some(self.signing_key.sign(&entry)?);

        let mut data = self.store.load(ProvenanceCollection::default()).await?;
        data.entries.push(ProvenanceEntry::TrainingData(entry.clone()));
        self.store.save(&data).await?;

        Ok(entry)
    }

    /// Record an Article 11 model-lineage provenance entry.
    pub async fn record_model_lineage(
        &self,
        agent_id: &str,
        base_model: &str,
        base_model_provider: &str,
        fine_tuning_method: &str,
        evaluation_metrics: Value,
    ) -> Result<ModelLineageEntry> {
        let entry_id = format!("prov:{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        let mut entry = ModelLineageEntry {
            entry_id,
            agent_id: agent_id.to_string(),
            base_model: base_model.to_string(),
            base_model_provider: base_model_provider.to_string(),
            fine_tuning_method: fine_tuning_method.to_string(),
            evaluation_metrics,
            recorded_at: Utc::now(),
            recorded_by: self.signing_key.did().to_string(),
            signature: None,
        };
        entry.signature = Some(self.signing_key.sign(&entry)?);

        let mut data = self.store.load(ProvenanceCollection::default()).await?;
        data.entries.push(ProvenanceEntry::ModelLineage(entry.clone()));
        self.store.save(&data).await?;

        Ok(entry)
    }

    /// Append a hash-chained audit entry for `agent_id`, linking it to the
    /// agent's previous entry (or the zero hash if this is the first).
    #[allow(clippy::too_many_arguments)]
    pub async fn record_audit_entry(
        &self,
        agent_id: &str,
        action_type: &str,
        input_summary: &str,
        output_summary: &str,
        decision_rationale: &str,
        human_override: bool,
    ) -> Result<AuditEntry> {
        let mut data = self.store.load(ProvenanceCollection::default()).await?;

        let prev_hash = data
            .audit_log
            .iter()
            .rev()
            .find(|e| e.agent_id == agent_id)
            .map(|e| e.chain_hash.clone())
            .unwrap_or_else(|| ZERO_HASH.to_string());

        let log_id = format!("audit:{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        let mut entry = AuditEntry {
            log_id,
            agent_id: agent_id.to_string(),
            action_type: action_type.to_string(),
            input_summary: input_summary.to_string(),
            output_summary: output_summary.to_string(),
            decision_rationale: decision_rationale.to_string(),
            human_override,
            timestamp: Utc::now(),
            logged_by: self.signing_key.did().to_string(),
            prev_hash,
            chain_hash: String::new(),
            signature: None,
        };

        let chain_bytes = canonicalize_value(&entry.chain_core())?;
        let mut hasher = Sha256::new();
        hasher.update(&chain_bytes);
        entry.chain_hash = hex::encode(hasher.finalize());

        entry.signature = Some(self.signing_key.sign(&entry)?);

        data.audit_log.push(entry.clone());
        self.store.save(&data).await?;

        Ok(entry)
    }

    /// Training-data entries, lineage entries, audit-log count, and the
    /// most recent 5 audit entries for `agent_id`.
    pub async fn get_provenance(&self, agent_id: &str) -> Result<ProvenanceSummary> {
        let data = self.store.load(ProvenanceCollection::default()).await?;

        let mut training_data = Vec::new();
        let mut model_lineage = Vec::new();
        for entry in &data.entries {
            if entry.agent_id() != agent_id {
                continue;
            }
            match entry {
                ProvenanceEntry::TrainingData(e) => training_data.push(e.clone()),
                ProvenanceEntry::ModelLineage(e) => model_lineage.push(e.clone()),
            }
        }

        let agent_audit: Vec<AuditEntry> = data
            .audit_log
            .iter()
            .filter(|e| e.agent_id == agent_id)
            .cloned()
            .collect();
        let audit_log_count = agent_audit.len();
        let recent_audit_entries = agent_audit
            .into_iter()
            .rev()
            .take(5)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        Ok(ProvenanceSummary {
            agent_id: agent_id.to_string(),
            training_data,
            model_lineage,
            audit_log_count,
            recent_audit_entries,
        })
    }

    /// Filtered audit trail for `agent_id`.
    pub async fn get_audit_trail(
        &self,
        agent_id: &str,
        action_type: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>> {
        let data = self.store.load(ProvenanceCollection::default()).await?;
        Ok(data
            .audit_log
            .into_iter()
            .filter(|e| e.agent_id == agent_id)
            .filter(|e| action_type.map(|t| e.action_type == t).unwrap_or(true))
            .filter(|e| start.map(|s| e.timestamp >= s).unwrap_or(true))
            .filter(|e| end.map(|e2| e.timestamp <= e2).unwrap_or(true))
            .take(limit)
            .collect())
    }

    /// Recompute and check every `prev_hash`/`chain_hash` link in
    /// `agent_id`'s audit chain.
    pub async fn verify_chain(&self, agent_id: &str) -> Result<ChainVerification> {
        let data = self.store.load(ProvenanceCollection::default()).await?;
        let chain: Vec<&AuditEntry> = data.audit_log.iter().filter(|e| e.agent_id == agent_id).collect();

        let mut expected_prev = ZERO_HASH.to_string();
        for (i, entry) in chain.iter().enumerate() {
            if entry.prev_hash != expected_prev {
                return Ok(ChainVerification {
                    intact: false,
                    broken_at: Some(i),
                });
            }
            let recomputed = recompute_chain_hash(entry)?;
            if recomputed != entry.chain_hash {
                return Ok(ChainVerification {
                    intact: false,
                    broken_at: Some(i),
                });
            }
            expected_prev = entry.chain_hash.clone();
        }

        Ok(ChainVerification {
            intact: true,
            broken_at: None,
        })
    }

    /// Remove every provenance/audit record for `agent_id`. Returns the
    /// number of entries removed from each of the two sub-collections.
    pub async fn purge(&self, agent_id: &str) -> Result<(usize, usize)> {
        let mut data = self.store.load(ProvenanceCollection::default()).await?;
        let before_entries = data.entries.len();
        let before_audit = data.audit_log.len();

        data.entries.retain(|e| e.agent_id() != agent_id);
        data.audit_log.retain(|e| e.agent_id != agent_id);

        let removed_entries = before_entries - data.entries.len();
        let removed_audit = before_audit - data.audit_log.len();

        self.store.save(&data).await?;
        Ok((removed_entries, removed_audit))
    }

    pub fn verify_audit_signature(&self, entry: &AuditEntry) -> bool {
        match &entry.signature {
            Some(sig) => kernel::verify(entry, &self.signing_key.did().to_string(), sig).signature_valid,
            None => false,
        }
    }
}

fn recompute_chain_hash(entry: &AuditEntry) -> Result<String> {
    let bytes = canonicalize_value(&entry.chain_core())?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
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
                dir.push(format!("attestix-provenance-test-{label}-{:?}", std::thread::current().id()));
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

    #[tokio::test]
    async fn audit_chain_links_three_entries() {
        let dir = TempDir::new("chain-three");
        let key = SigningKey::load_or_create(dir.path().join(".signing_key.json")).unwrap();
        let svc = ProvenanceService::new(dir.path(), &key);

        let e0 = svc
            .record_audit_entry("attestix:agent01", "inference", "in", "out", "because", false)
            .await
            .unwrap();
        let e1 = svc
            .record_audit_entry("attestix:agent01", "inference", "in2", "out2", "because2", false)
            .await
            .unwrap();
        let e2 = svc
            .record_audit_entry("attestix:agent01", "inference", "in3", "out3", "because3", true)
            .await
            .unwrap();

        assert_eq!(e0.prev_hash, ZERO_HASH);
        assert_eq!(e1.prev_hash, e0.chain_hash);
        assert_eq!(e2.prev_hash, e1.chain_hash);

        let verification = svc.verify_chain("attestix:agent01").await.unwrap();
        assert!(verification.intact);
        assert!(verification.broken_at.is_none());
    }

    #[tokio::test]
    async fn tampering_with_a_chain_entry_is_detected() {
        let dir = TempDir::new("chain-tamper");
        let key = SigningKey::load_or_create(dir.path().join(".signing_key.json")).unwrap();
        let svc = ProvenanceService::new(dir.path(), &key);

        svc.record_audit_entry("attestix:agent02", "inference", "in", "out", "because", false)
            .await
            .unwrap();
        svc.record_audit_entry("attestix:agent02", "inference", "in2", "out2", "because2", false)
            .await
            .unwrap();

        // Directly corrupt the second entry's prev_hash on disk.
        let path = dir.path().join("provenance.json");
        let raw = std::fs::read_to_string(&path).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        value["audit_log"][1]["prev_hash"] = json!("deadbeef");
        std::fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();

        let verification = svc.verify_chain("attestix:agent02").await.unwrap();
        assert!(!verification.intact);
        assert_eq!(verification.broken_at, Some(1));
    }

    #[tokio::test]
    async fn purge_removes_all_records_for_agent() {
        let dir = TempDir::new("purge");
        let key = SigningKey::load_or_create(dir.path().join(".signing_key.json")).unwrap();
        let svc = ProvenanceService::new(dir.path(), &key);

        svc.record_training_data(
            "attestix:agent03",
            "dataset",
            "https://example.com/data",
            "CC-BY-4.0",
            vec!["text".into()],
            false,
            "anonymized",
        )
        .await
        .unwrap();
        svc.record_audit_entry("attestix:agent03", "inference", "in", "out", "because", false)
            .await
            .unwrap();

        let (removed_entries, removed_audit) = svc.purge("attestix:agent03").await.unwrap();
        assert_eq!(removed_entries, 1);
        assert_eq!(removed_audit, 1);

        let summary = svc.get_provenance("attestix:agent03").await.unwrap();
        assert!(summary.training_data.is_empty());
        assert_eq!(summary.audit_log_count, 0);
    }

    #[tokio::test]
    async fn independent_agents_chain_independently() {
        let dir = TempDir::new("independent");
        let key = SigningKey::load_or_create(dir.path().join(".signing_key.json")).unwrap();
        let svc = ProvenanceService::new(dir.path(), &key);

        let a = svc
            .record_audit_entry("attestix:agentA01", "inference", "a", "a", "a", false)
            .await
            .unwrap();
        let b = svc
            .record_audit_entry("attestix:agentB01", "inference", "b", "b", "b", false)
            .await
            .unwrap();

        assert_eq!(a.prev_hash, ZERO_HASH);
        assert_eq!(b.prev_hash, ZERO_HASH);
    }
}
