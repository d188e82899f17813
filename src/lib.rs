//! # attestix-kernel
//!
//! A signed-object kernel for AI agent trust: identity, delegation,
//! verifiable credentials, EU AI Act compliance, reputation, and a
//! tamper-evident audit trail, all built on one cryptographic primitive —
//! an Ed25519 `did:key` server identity and a canonical-JSON signing
//! scheme shared by every signed entity in the crate.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      dispatch(name, args)                │
//! │  single entry point: tool name -> JSON args -> JSON result│
//! └─────────────────────────────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────────────────────┐
//!         ▼             ▼                             ▼
//! ┌───────────────┐ ┌───────────────┐         ┌───────────────┐
//! │   Identity    │ │  Credential   │   ...   │   Anchoring   │
//! │   Delegation  │ │  Compliance   │         │   Provenance  │
//! │   Reputation  │ │               │         │               │
//! └───────┬───────┘ └───────┬───────┘         └───────┬───────┘
//!         │                 │                         │
//!         └─────────────────┴─────────┬───────────────┘
//!                                     ▼
//!                          SafeStore (one JSON file per collection)
//! ```
//!
//! Every service is a thin, cheaply-constructed wrapper around a
//! [`store::SafeStore`] handle and a borrowed reference to the kernel's
//! signing key; [`Kernel`] owns the expensive, load-once state (config,
//! key, ledger client) and reconstructs each service on demand per call.

#![warn(missing_docs)]

pub mod anchoring;
pub mod codec;
pub mod compliance;
pub mod config;
pub mod credential;
pub mod crypto;
pub mod delegation;
pub mod did_resolver;
pub mod error;
pub mod identity;
pub mod kernel;
pub mod provenance;
pub mod reputation;
pub mod ssrf;
pub mod store;
pub mod token;

use crate::anchoring::{AnchorService, ArtifactType, LedgerClient, NullLedger};
use crate::compliance::{AssessmentResult, AssessmentType, ComplianceService, RiskCategory};
use crate::config::Config;
use crate::credential::{CredentialService, VerifiablePresentation};
use crate::delegation::{DelegationRole, DelegationService};
use crate::error::{KernelError, Result};
use crate::identity::{IdentityService, TranslationTarget};
use crate::kernel::SigningKey;
use crate::provenance::ProvenanceService;
use crate::reputation::{Outcome, ReputationService};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Crate/protocol version embedded in UCAN delegation claims, so a
/// verifier can tell which kernel revision minted a given token without
/// cross-referencing a changelog.
pub const ATTESTIX_VERSION: &str = "0.1.0";

/// Outcome of a crate-level GDPR erasure sweep across every collection
/// that may reference `agent_id`. See [`Kernel::purge_agent`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct PurgeSummary {
    /// Whether the identity record itself was found and removed.
    pub identity_removed: bool,
    /// Verifiable credentials removed (matched by `credentialSubject.id`).
    pub credentials_removed: usize,
    /// Delegation records removed (agent as issuer or audience).
    pub delegations_removed: usize,
    /// Compliance profiles/assessments/declarations removed.
    pub compliance_removed: usize,
    /// `(provenance_entries, audit_log_entries)` removed.
    pub provenance_removed: (usize, usize),
    /// Reputation interactions removed (agent as either party).
    pub reputation_removed: usize,
}

/// Application-level state: configuration, the process-wide signing key,
/// and the ledger facade, all loaded once and shared read-only across
/// every `dispatch` call. Services are not stored here — they are cheap,
/// borrowing wrappers reconstructed per call (see the module doc comment).
pub struct Kernel {
    config: Config,
    signing_key: SigningKey,
    ledger: NullLedger,
}

impl Kernel {
    /// Build a kernel from an already-resolved [`Config`], loading (or
    /// generating) the server signing key from `config.data_dir`.
    ///
    /// The ledger facade is always [`NullLedger`]: this crate's dependency
    /// stack carries no on-chain SDK (see `DESIGN.md`), so blockchain
    /// operations degrade to `LedgerUnconfigured` until an embedder wires a
    /// real [`LedgerClient`] — which is straightforward, since every
    /// service here borrows the client through the trait object rather
    /// than a concrete type.
    pub fn new(config: Config) -> Result<Self> {
        let key_path = config.data_dir.join(".signing_key.json");
        let signing_key = SigningKey::load_or_create(key_path)?;
        Ok(Self {
            config,
            signing_key,
            ledger: NullLedger,
        })
    }

    /// Load configuration the standard way (optional `attestix.toml`, then
    /// environment overrides) and build a kernel from it.
    pub fn bootstrap(config_path: Option<&std::path::Path>) -> Result<Self> {
        let config = Config::load(config_path).map_err(|e| KernelError::Internal(e.to_string()))?;
        Self::new(config)
    }

    /// The resolved runtime configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The server's `did:key` identifier.
    pub fn server_did(&self) -> &str {
        self.signing_key.did()
    }

    fn identities(&self) -> IdentityService<'_> {
        IdentityService::new(&self.config.data_dir, &self.signing_key)
    }

    fn credentials(&self) -> CredentialService<'_> {
        CredentialService::new(&self.config.data_dir, &self.signing_key)
    }

    fn delegations(&self) -> Result<DelegationService<'_>> {
        DelegationService::new(&self.config.data_dir, &self.signing_key)
    }

    fn compliance(&self) -> ComplianceService<'_> {
        ComplianceService::new(&self.config.data_dir, &self.signing_key)
    }

    fn reputation(&self) -> ReputationService {
        ReputationService::new(&self.config.data_dir)
    }

    fn provenance(&self) -> ProvenanceService<'_> {
        ProvenanceService::new(&self.config.data_dir, &self.signing_key)
    }

    fn anchors(&self) -> AnchorService<'_> {
        let network = self.config.ledger_network.as_deref().unwrap_or("sepolia");
        AnchorService::new(&self.config.data_dir, self.signing_key.did(), &self.ledger as &dyn LedgerClient, network)
    }

    /// GDPR erasure: remove every record referencing `agent_id` across all
    /// per-agent collections. This is the crate-level sweep that
    /// [`identity::IdentityService::purge`] defers to its caller, composed
    /// here since `Kernel` is the one place that holds every service.
    pub async fn purge_agent(&self, agent_id: &str) -> Result<PurgeSummary> {
        let identity_removed = self.identities().purge(agent_id).await?;
        let credentials_removed = self.credentials().purge(agent_id).await?;
        let delegations_removed = self.delegations()?.purge(agent_id).await?;
        let compliance_removed = self.compliance().purge(agent_id).await?;
        let provenance_removed = self.provenance().purge(agent_id).await?;
        let reputation_removed = self.reputation().purge(agent_id).await?;

        Ok(PurgeSummary {
            identity_removed,
            credentials_removed,
            delegations_removed,
            compliance_removed,
            provenance_removed,
            reputation_removed,
        })
    }

    /// Single entry point for an embedding transport (stdio, HTTP, MCP):
    /// dispatch a named operation against a JSON object of arguments and
    /// get back a JSON value. Handler names are grouped by service with a
    /// `service.operation` convention.
    ///
    /// Per §7/§10.1, this is the application-level boundary: library
    /// methods return the typed [`error::KernelError`], which `?` converts
    /// into `anyhow::Error` here. A transport wrapping this call is
    /// expected to flatten an `Err` into `{"error": message}`.
    #[tracing::instrument(skip(self, args), fields(op = name))]
    pub async fn dispatch(&self, name: &str, args: Value) -> anyhow::Result<Value> {
        match name {
            // --- identity ---------------------------------------------------
            "identity.create" => {
                let capabilities = str_vec_field(&args, "capabilities").unwrap_or_default();
                let identity = self
                    .identities()
                    .create_identity(
                        str_field(&args, "display_name")?,
                        str_field(&args, "source_protocol")?,
                        opt_str_field(&args, "identity_token").unwrap_or(""),
                        capabilities,
                        opt_str_field(&args, "description").unwrap_or(""),
                        opt_str_field(&args, "issuer_name"),
                        opt_i64_field(&args, "expiry_days"),
                    )
                    .await?;
                Ok(serde_json::to_value(identity)?)
            }
            "identity.get" => {
                let identity = self.identities().get_identity(str_field(&args, "agent_id")?).await?;
                Ok(serde_json::to_value(identity)?)
            }
            "identity.list" => {
                let identities = self
                    .identities()
                    .list_identities(
                        opt_str_field(&args, "source_protocol"),
                        bool_field(&args, "include_revoked", false),
                        usize_field(&args, "limit", 100),
                    )
                    .await?;
                Ok(serde_json::to_value(identities)?)
            }
            "identity.revoke" => {
                let identity = self
                    .identities()
                    .revoke_identity(str_field(&args, "agent_id")?, opt_str_field(&args, "reason").unwrap_or(""))
                    .await?;
                Ok(serde_json::to_value(identity)?)
            }
            "identity.verify" => {
                let result = self.identities().verify_identity(str_field(&args, "agent_id")?).await?;
                Ok(serde_json::to_value(result)?)
            }
            "identity.update_reputation" => {
                let score = args
                    .get("score")
                    .and_then(|v| v.as_f64())
                    .ok_or_else(|| anyhow::anyhow!("missing required argument `score`"))?;
                self.identities()
                    .update_reputation(str_field(&args, "agent_id")?, score)
                    .await?;
                Ok(json!({ "ok": true }))
            }
            "identity.translate" => {
                let target = parse_translation_target(str_field(&args, "target")?)?;
                let rendered = self
                    .identities()
                    .translate_identity(str_field(&args, "agent_id")?, target)
                    .await?;
                Ok(rendered)
            }
            "identity.purge" => {
                let removed = self.identities().purge(str_field(&args, "agent_id")?).await?;
                Ok(json!({ "removed": removed }))
            }

            // --- agent-card ---------------------------------------------------
            "agent_card.generate" => {
                let card = self.identities().generate_agent_card(str_field(&args, "agent_id")?).await?;
                Ok(card)
            }
            "agent_card.discover" => {
                let timeout = Duration::from_millis(self.config.http_timeout_agent_card_ms);
                let card = did_resolver::discover_agent_card(str_field(&args, "base_url")?, timeout).await?;
                Ok(card)
            }
            "agent_card.translate" => {
                // Same renderer as `identity.translate`, named for callers
                // that think of every representation as an "agent card" shape.
                let target = parse_translation_target(str_field(&args, "target")?)?;
                let rendered = self
                    .identities()
                    .translate_identity(str_field(&args, "agent_id")?, target)
                    .await?;
                Ok(rendered)
            }

            // --- did ---------------------------------------------------
            "did.resolve" => {
                let timeout = Duration::from_millis(self.config.http_timeout_universal_resolver_ms);
                let doc = did_resolver::resolve_did(str_field(&args, "did")?, &self.config.universal_resolver_url, timeout).await?;
                Ok(doc)
            }
            "did.create_key" => {
                let ephemeral = did_resolver::create_did_key();
                Ok(ephemeral_did_to_json(&ephemeral))
            }
            "did.create_web" => {
                let (ephemeral, publish_url) = did_resolver::create_did_web(str_field(&args, "domain")?, opt_str_field(&args, "path"));
                let mut rendered = ephemeral_did_to_json(&ephemeral);
                rendered["publish_url"] = Value::String(publish_url);
                Ok(rendered)
            }

            // --- delegation ---------------------------------------------------
            "delegation.create" => {
                let capabilities = str_vec_field(&args, "capabilities").unwrap_or_default();
                let (token, record) = self
                    .delegations()?
                    .create_delegation(
                        str_field(&args, "issuer_agent_id")?,
                        str_field(&args, "audience_agent_id")?,
                        capabilities,
                        opt_i64_field(&args, "expiry_hours"),
                        opt_str_field(&args, "parent_token").map(str::to_string),
                    )
                    .await?;
                Ok(json!({ "token": token, "record": record }))
            }
            "delegation.verify" => {
                let verification = self.delegations()?.verify_delegation(str_field(&args, "token")?).await?;
                Ok(serde_json::to_value(verification)?)
            }
            "delegation.revoke" => {
                let record = self
                    .delegations()?
                    .revoke_delegation(str_field(&args, "jti")?, opt_str_field(&args, "reason").unwrap_or(""))
                    .await?;
                Ok(serde_json::to_value(record)?)
            }
            "delegation.list" => {
                let role = parse_delegation_role(opt_str_field(&args, "role").unwrap_or("any"))?;
                let records = self
                    .delegations()?
                    .list_delegations(opt_str_field(&args, "agent_id"), role, bool_field(&args, "include_expired", false))
                    .await?;
                Ok(serde_json::to_value(records)?)
            }
            "delegation.peek" => {
                let claims = delegation::peek_unverified_claims(str_field(&args, "token")?)?;
                Ok(claims)
            }
            "delegation.purge" => {
                let removed = self.delegations()?.purge(str_field(&args, "agent_id")?).await?;
                Ok(json!({ "removed": removed }))
            }

            // --- reputation ---------------------------------------------------
            "reputation.record" => {
                let outcome = parse_outcome(str_field(&args, "outcome")?)?;
                let (interaction, score) = self
                    .reputation()
                    .record_interaction(
                        str_field(&args, "agent_id")?,
                        str_field(&args, "counterparty_id")?,
                        outcome,
                        opt_str_field(&args, "category").unwrap_or("general"),
                        opt_str_field(&args, "details").unwrap_or(""),
                    )
                    .await?;
                Ok(json!({ "interaction": interaction, "score": score }))
            }
            "reputation.get" => {
                let summary = self.reputation().get_reputation(str_field(&args, "agent_id")?).await?;
                Ok(serde_json::to_value(summary)?)
            }
            "reputation.query" => {
                let results = self
                    .reputation()
                    .query_reputation(
                        args.get("min_score").and_then(|v| v.as_f64()).unwrap_or(0.0),
                        args.get("max_score").and_then(|v| v.as_f64()).unwrap_or(1.0),
                        usize_field(&args, "min_interactions", 0),
                        opt_str_field(&args, "category"),
                        usize_field(&args, "limit", 50),
                    )
                    .await?;
                Ok(serde_json::to_value(results)?)
            }

            // --- compliance ---------------------------------------------------
            "compliance.create_profile" => {
                let risk_category: RiskCategory = serde_json::from_value(field(&args, "risk_category")?.clone())?;
                let identities = self.identities();
                let profile = self
                    .compliance()
                    .create_profile(
                        &identities,
                        str_field(&args, "agent_id")?,
                        risk_category,
                        str_field(&args, "provider")?,
                        str_field(&args, "ai_system")?,
                        opt_str_field(&args, "intended_purpose").unwrap_or(""),
                        opt_str_field(&args, "transparency").unwrap_or(""),
                        opt_str_field(&args, "human_oversight").unwrap_or(""),
                    )
                    .await?;
                Ok(serde_json::to_value(profile)?)
            }
            "compliance.get_profile" => {
                let profile = self.compliance().get_profile(str_field(&args, "agent_id")?).await?;
                Ok(serde_json::to_value(profile)?)
            }
            "compliance.list_profiles" => {
                let risk_category: Option<RiskCategory> = args
                    .get("risk_category")
                    .map(|v| serde_json::from_value(v.clone()))
                    .transpose()?;
                let profiles = self
                    .compliance()
                    .list_profiles(risk_category, bool_field(&args, "compliant_only", false), usize_field(&args, "limit", 100))
                    .await?;
                Ok(serde_json::to_value(profiles)?)
            }
            "compliance.record_assessment" => {
                let assessment_type: AssessmentType = serde_json::from_value(field(&args, "assessment_type")?.clone())?;
                let result: AssessmentResult = serde_json::from_value(field(&args, "result")?.clone())?;
                let assessment = self
                    .compliance()
                    .record_assessment(
                        str_field(&args, "agent_id")?,
                        assessment_type,
                        str_field(&args, "assessor_name")?,
                        result,
                        opt_str_field(&args, "findings").unwrap_or(""),
                        bool_field(&args, "ce_marking_eligible", false),
                    )
                    .await?;
                Ok(serde_json::to_value(assessment)?)
            }
            "compliance.generate_declaration" => {
                let credentials = self.credentials();
                let (declaration, vc) = self
                    .compliance()
                    .generate_declaration(&credentials, str_field(&args, "agent_id")?)
                    .await?;
                Ok(json!({ "declaration": declaration, "credential": vc }))
            }
            "compliance.get_status" => {
                let audit_entry_count = self
                    .provenance()
                    .get_provenance(str_field(&args, "agent_id")?)
                    .await?
                    .audit_log_count;
                let status = self
                    .compliance()
                    .get_status(str_field(&args, "agent_id")?, audit_entry_count)
                    .await?;
                Ok(serde_json::to_value(status)?)
            }
            "compliance.purge" => {
                let removed = self.compliance().purge(str_field(&args, "agent_id")?).await?;
                Ok(json!({ "removed": removed }))
            }

            // --- credential ---------------------------------------------------
            "credential.issue" => {
                let claims = args.get("claims").cloned().unwrap_or_else(|| json!({}));
                let issuer_name = opt_str_field(&args, "issuer_name").unwrap_or(self.signing_key.did()).to_string();
                let credential = self
                    .credentials()
                    .issue_credential(
                        str_field(&args, "subject_id")?,
                        str_field(&args, "credential_type")?,
                        &issuer_name,
                        claims,
                        opt_i64_field(&args, "expiry_days"),
                    )
                    .await?;
                Ok(serde_json::to_value(credential)?)
            }
            "credential.get" => {
                let credential = self.credentials().get_credential(str_field(&args, "credential_id")?).await?;
                Ok(serde_json::to_value(credential)?)
            }
            "credential.list" => {
                let credentials = self
                    .credentials()
                    .list_credentials(
                        opt_str_field(&args, "subject_id"),
                        opt_str_field(&args, "credential_type"),
                        bool_field(&args, "valid_only", false),
                    )
                    .await?;
                Ok(serde_json::to_value(credentials)?)
            }
            "credential.revoke" => {
                self.credentials()
                    .revoke_credential(str_field(&args, "credential_id")?, opt_str_field(&args, "reason").unwrap_or(""))
                    .await?;
                Ok(json!({ "ok": true }))
            }
            "credential.verify" => {
                let valid = self.credentials().verify_credential(str_field(&args, "credential_id")?).await?;
                Ok(json!({ "valid": valid }))
            }
            "credential.verify_external" => {
                let credential = serde_json::from_value(field(&args, "credential")?.clone())?;
                let valid = self.credentials().verify_credential_external(&credential);
                Ok(json!({ "valid": valid }))
            }
            "credential.create_presentation" => {
                let credential_ids = str_vec_field(&args, "credential_ids")?;
                let presentation = self
                    .credentials()
                    .create_verifiable_presentation(
                        str_field(&args, "holder_did")?,
                        &credential_ids,
                        opt_str_field(&args, "challenge"),
                        opt_str_field(&args, "domain"),
                    )
                    .await?;
                Ok(serde_json::to_value(presentation)?)
            }
            "credential.verify_presentation" => {
                let presentation: VerifiablePresentation = serde_json::from_value(field(&args, "presentation")?.clone())?;
                let verification = self.credentials().verify_presentation(&presentation);
                Ok(serde_json::to_value(verification)?)
            }
            "credential.purge" => {
                let removed = self.credentials().purge(str_field(&args, "subject_id")?).await?;
                Ok(json!({ "removed": removed }))
            }

            // --- provenance ---------------------------------------------------
            "provenance.record_training_data" => {
                let categories = str_vec_field(&args, "data_categories").unwrap_or_default();
                let entry = self
                    .provenance()
                    .record_training_data(
                        str_field(&args, "agent_id")?,
                        str_field(&args, "dataset_name")?,
                        opt_str_field(&args, "source_url").unwrap_or(""),
                        opt_str_field(&args, "license").unwrap_or(""),
                        categories,
                        bool_field(&args, "contains_personal_data", false),
                        opt_str_field(&args, "data_governance_measures").unwrap_or(""),
                    )
                    .await?;
                Ok(serde_json::to_value(entry)?)
            }
            "provenance.record_model_lineage" => {
                let metrics = args.get("evaluation_metrics").cloned().unwrap_or_else(|| json!({}));
                let entry = self
                    .provenance()
                    .record_model_lineage(
                        str_field(&args, "agent_id")?,
                        str_field(&args, "base_model")?,
                        opt_str_field(&args, "base_model_provider").unwrap_or(""),
                        opt_str_field(&args, "fine_tuning_method").unwrap_or(""),
                        metrics,
                    )
                    .await?;
                Ok(serde_json::to_value(entry)?)
            }
            "provenance.record_audit_entry" => {
                let entry = self
                    .provenance()
                    .record_audit_entry(
                        str_field(&args, "agent_id")?,
                        str_field(&args, "action_type")?,
                        opt_str_field(&args, "input_summary").unwrap_or(""),
                        opt_str_field(&args, "output_summary").unwrap_or(""),
                        opt_str_field(&args, "decision_rationale").unwrap_or(""),
                        bool_field(&args, "human_override", false),
                    )
                    .await?;
                Ok(serde_json::to_value(entry)?)
            }
            "provenance.get" => {
                let summary = self.provenance().get_provenance(str_field(&args, "agent_id")?).await?;
                Ok(serde_json::to_value(summary)?)
            }
            "provenance.get_audit_trail" => {
                let entries = self
                    .provenance()
                    .get_audit_trail(
                        str_field(&args, "agent_id")?,
                        opt_str_field(&args, "action_type"),
                        None,
                        None,
                        usize_field(&args, "limit", 100),
                    )
                    .await?;
                Ok(serde_json::to_value(entries)?)
            }
            "provenance.verify_chain" => {
                let verification = self.provenance().verify_chain(str_field(&args, "agent_id")?).await?;
                Ok(serde_json::to_value(verification)?)
            }
            "provenance.purge" => {
                let (entries, audit) = self.provenance().purge(str_field(&args, "agent_id")?).await?;
                Ok(json!({ "entries_removed": entries, "audit_removed": audit }))
            }

            // --- blockchain (anchoring) -----------------------------------
            "blockchain.anchor_artifact" => {
                let artifact_type: ArtifactType = serde_json::from_value(field(&args, "artifact_type")?.clone())?;
                let artifact = args.get("artifact").cloned().unwrap_or_else(|| json!({}));
                let record = self
                    .anchors()
                    .anchor_artifact(&artifact, artifact_type, str_field(&args, "artifact_id")?)
                    .await?;
                Ok(serde_json::to_value(record)?)
            }
            "blockchain.anchor_audit_batch" => {
                let entries = self
                    .provenance()
                    .get_audit_trail(str_field(&args, "agent_id")?, None, None, None, usize_field(&args, "limit", 1000))
                    .await?;
                let record = self.anchors().anchor_audit_batch(&entries, str_field(&args, "batch_id")?).await?;
                Ok(serde_json::to_value(record)?)
            }
            "blockchain.verify_anchor" => {
                let verification = self.anchors().verify_anchor(str_field(&args, "artifact_hash")?).await?;
                Ok(serde_json::to_value(verification)?)
            }
            "blockchain.estimate_cost" => {
                let artifact_type: ArtifactType = serde_json::from_value(field(&args, "artifact_type")?.clone())?;
                let estimate = self.anchors().estimate_anchor_cost(artifact_type).await?;
                Ok(serde_json::to_value(estimate)?)
            }
            "blockchain.list_anchors" => {
                let artifact_type: Option<ArtifactType> = args
                    .get("artifact_type")
                    .map(|v| serde_json::from_value(v.clone()))
                    .transpose()?;
                let anchors = self.anchors().list_anchors(artifact_type, usize_field(&args, "limit", 50)).await?;
                Ok(serde_json::to_value(anchors)?)
            }
            "blockchain.is_configured" => Ok(json!({ "configured": self.ledger.is_configured() })),

            // --- token classification -----------------------------------
            "token.classify" => {
                let info = token::extract_token_info(str_field(&args, "token")?);
                Ok(serde_json::to_value(info)?)
            }

            // --- gdpr -----------------------------------------------------
            "gdpr.purge_agent" => {
                let summary = self.purge_agent(str_field(&args, "agent_id")?).await?;
                Ok(serde_json::to_value(summary)?)
            }

            "kernel.version" => Ok(json!({ "version": ATTESTIX_VERSION, "server_did": self.server_did() })),

            other => Err(anyhow::anyhow!("unknown operation `{other}`")),
        }
    }
}

fn ephemeral_did_to_json(ephemeral: &did_resolver::EphemeralDid) -> Value {
    use base64::{engine::general_purpose::STANDARD, Engine};
    json!({
        "did": ephemeral.did,
        "did_document": ephemeral.did_document,
        "public_key_multibase": ephemeral.public_key_multibase,
        "secret_key_b64": STANDARD.encode(ephemeral.secret_key.as_ref()),
    })
}

fn parse_translation_target(raw: &str) -> anyhow::Result<TranslationTarget> {
    match raw {
        "a2a_agent_card" | "agent_card" => Ok(TranslationTarget::A2aAgentCard),
        "did_document" => Ok(TranslationTarget::DidDocument),
        "oauth_claims" => Ok(TranslationTarget::OauthClaims),
        "summary" => Ok(TranslationTarget::Summary),
        other => Err(anyhow::anyhow!("unknown translation target `{other}`")),
    }
}

fn parse_delegation_role(raw: &str) -> anyhow::Result<DelegationRole> {
    match raw {
        "issuer" => Ok(DelegationRole::Issuer),
        "audience" => Ok(DelegationRole::Audience),
        "any" => Ok(DelegationRole::Any),
        other => Err(anyhow::anyhow!("unknown delegation role `{other}`")),
    }
}

fn parse_outcome(raw: &str) -> anyhow::Result<Outcome> {
    match raw {
        "success" => Ok(Outcome::Success),
        "partial" => Ok(Outcome::Partial),
        "failure" => Ok(Outcome::Failure),
        "timeout" => Ok(Outcome::Timeout),
        other => Err(anyhow::anyhow!("unknown outcome `{other}`")),
    }
}

fn field<'a>(args: &'a Value, key: &str) -> anyhow::Result<&'a Value> {
    args.get(key).ok_or_else(|| anyhow::anyhow!("missing required argument `{key}`"))
}

fn str_field<'a>(args: &'a Value, key: &str) -> anyhow::Result<&'a str> {
    field(args, key)?
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("argument `{key}` must be a string"))
}

fn opt_str_field<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

fn opt_i64_field(args: &Value, key: &str) -> Option<i64> {
    args.get(key).and_then(|v| v.as_i64())
}

fn bool_field(args: &Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

fn usize_field(args: &Value, key: &str, default: usize) -> usize {
    args.get(key).and_then(|v| v.as_u64()).map(|v| v as usize).unwrap_or(default)
}

fn str_vec_field(args: &Value, key: &str) -> anyhow::Result<Vec<String>> {
    let Some(v) = args.get(key) else {
        return Ok(Vec::new());
    };
    v.as_array()
        .ok_or_else(|| anyhow::anyhow!("argument `{key}` must be an array"))?
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("argument `{key}` items must be strings"))
        })
        .collect()
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
                dir.push(format!("attestix-lib-test-{label}-{:?}", std::thread::current().id()));
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

    fn test_kernel(dir: &TempDir) -> Kernel {
        let mut config = Config::default();
        config.data_dir = dir.path().to_path_buf();
        Kernel::new(config).unwrap()
    }

    #[tokio::test]
    async fn dispatch_round_trips_identity_lifecycle() {
        let dir = TempDir::new("identity-lifecycle");
        let kernel = test_kernel(&dir);

        let created = kernel
            .dispatch(
                "identity.create",
                json!({
                    "display_name": "Bot",
                    "source_protocol": "mcp",
                    "capabilities": ["read", "write"],
                }),
            )
            .await
            .unwrap();
        let agent_id = created["agent_id"].as_str().unwrap().to_string();
        assert!(agent_id.starts_with("attestix:"));

        let verified = kernel
            .dispatch("identity.verify", json!({ "agent_id": agent_id }))
            .await
            .unwrap();
        assert_eq!(verified["valid"], json!(true));

        let revoked = kernel
            .dispatch("identity.revoke", json!({ "agent_id": agent_id, "reason": "test" }))
            .await
            .unwrap();
        assert_eq!(revoked["revoked"], json!(true));

        let verified_after_revoke = kernel
            .dispatch("identity.verify", json!({ "agent_id": agent_id }))
            .await
            .unwrap();
        assert_eq!(verified_after_revoke["valid"], json!(false));
        assert_eq!(verified_after_revoke["checks"]["signature_valid"], json!(true));
    }

    #[tokio::test]
    async fn dispatch_rejects_unknown_operation() {
        let dir = TempDir::new("unknown-op");
        let kernel = test_kernel(&dir);
        let err = kernel.dispatch("nonexistent.op", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("unknown operation"));
    }

    #[tokio::test]
    async fn dispatch_surfaces_missing_argument_as_error() {
        let dir = TempDir::new("missing-arg");
        let kernel = test_kernel(&dir);
        let err = kernel.dispatch("identity.get", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("agent_id"));
    }

    #[tokio::test]
    async fn purge_agent_sweeps_every_collection() {
        let dir = TempDir::new("purge-sweep");
        let kernel = test_kernel(&dir);

        let created = kernel
            .dispatch("identity.create", json!({ "display_name": "Bot", "source_protocol": "mcp" }))
            .await
            .unwrap();
        let agent_id = created["agent_id"].as_str().unwrap().to_string();

        kernel
            .dispatch(
                "reputation.record",
                json!({ "agent_id": agent_id, "counterparty_id": "attestix:peer", "outcome": "success" }),
            )
            .await
            .unwrap();

        let summary = kernel.purge_agent(&agent_id).await.unwrap();
        assert!(summary.identity_removed);
        assert_eq!(summary.reputation_removed, 1);

        let fetched = kernel.dispatch("identity.get", json!({ "agent_id": agent_id })).await.unwrap();
        assert!(fetched.is_null());
    }

    #[tokio::test]
    async fn dispatch_enforces_high_risk_self_assessment_rejection() {
        let dir = TempDir::new("high-risk-gate");
        let kernel = test_kernel(&dir);

        let created = kernel
            .dispatch("identity.create", json!({ "display_name": "HighRiskBot", "source_protocol": "mcp" }))
            .await
            .unwrap();
        let agent_id = created["agent_id"].as_str().unwrap().to_string();

        kernel
            .dispatch(
                "compliance.create_profile",
                json!({
                    "agent_id": agent_id,
                    "risk_category": "high",
                    "provider": "Acme",
                    "ai_system": "Scoring Engine",
                }),
            )
            .await
            .unwrap();

        let err = kernel
            .dispatch(
                "compliance.record_assessment",
                json!({
                    "agent_id": agent_id,
                    "assessment_type": "self_assessment",
                    "assessor_name": "Acme QA",
                    "result": "pass",
                }),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("third_party"));
    }
}
