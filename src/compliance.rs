//! Compliance Service: EU AI Act risk-tiered profiles, assessments, and
//! declarations of conformity.
//!
//! Three nested records per agent, each gated on the one before it: a
//! [`ComplianceProfile`] fixes the risk tier and the obligations it implies,
//! an [`Assessment`] records a conformity check against that tier, and a
//! [`Declaration`] is only reachable once an assessment has passed and,
//! for high-risk systems, was performed by a third party. Declaration
//! generation auto-issues an `EUAIActComplianceCredential` through the
//! Credential Service.

use crate::credential::CredentialService;
use crate::error::{KernelError, Result};
use crate::identity::IdentityService;
use crate::kernel::{self, SignableView, SigningKey};
use crate::store::SafeStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;

const DECLARATION_VC_EXPIRY_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Minimal,
    Limited,
    High,
    Unacceptable,
}

impl RiskCategory {
    fn required_obligations(self) -> Vec<&'static str> {
        match self {
            RiskCategory::Minimal => vec!["voluntary_code_of_conduct"],
            RiskCategory::Limited => vec!["transparency_disclosure", "inform_users_of_ai_interaction"],
            RiskCategory::High => vec![
                "conformity_assessment",
                "quality_management_system",
                "risk_management_system",
                "data_governance",
                "technical_documentation",
                "record_keeping",
                "transparency_to_users",
                "human_oversight",
                "accuracy_robustness_cybersecurity",
                "post_market_monitoring",
                "serious_incident_reporting",
            ],
            RiskCategory::Unacceptable => vec![],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentType {
    SelfAssessment,
    ThirdParty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentResult {
    Pass,
    Conditional,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Conformity {
    pub assessment_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declaration_id: Option<String>,
    pub ce_marking_eligible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceProfile {
    pub profile_id: String,
    pub agent_id: String,
    pub risk_category: RiskCategory,
    pub provider: String,
    pub ai_system: String,
    pub intended_purpose: String,
    pub transparency: String,
    pub human_oversight: String,
    pub required_obligations: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub conformity: Conformity,
    pub signature: Option<String>,
}

impl SignableView for ComplianceProfile {
    fn signable_core(&self) -> Value {
        json!({
            "profile_id": self.profile_id,
            "agent_id": self.agent_id,
            "risk_category": self.risk_category,
            "provider": self.provider,
            "ai_system": self.ai_system,
            "transparency": self.transparency,
            "required_obligations": self.required_obligations,
            "created_at": self.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub assessment_id: String,
    pub agent_id: String,
    #[serde(rename = "type")]
    pub assessment_type: AssessmentType,
    pub assessor_name: String,
    pub result: AssessmentResult,
    pub findings: String,
    pub ce_marking_eligible: bool,
    pub assessed_at: DateTime<Utc>,
    pub assessed_by: String,
    pub signature: Option<String>,
}

impl SignableView for Assessment {
    fn signable_core(&self) -> Value {
        json!({
            "assessment_id": self.assessment_id,
            "agent_id": self.agent_id,
            "type": self.assessment_type,
            "assessor_name": self.assessor_name,
            "result": self.result,
            "findings": self.findings,
            "ce_marking_eligible": self.ce_marking_eligible,
            "assessed_at": self.assessed_at,
            "assessed_by": self.assessed_by,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declaration {
    pub declaration_id: String,
    pub agent_id: String,
    /// Ordered Annex V field map, `1_provider_name` through `12a_signatory_did`.
    pub fields: Vec<(String, String)>,
    pub issued_at: DateTime<Utc>,
    pub issuer_did: String,
    pub signature: Option<String>,
}

impl SignableView for Declaration {
    fn signable_core(&self) -> Value {
        json!({
            "declaration_id": self.declaration_id,
            "agent_id": self.agent_id,
            "fields": self.fields,
            "issued_at": self.issued_at,
            "issuer_did": self.issuer_did,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ComplianceCollection {
    profiles: Vec<ComplianceProfile>,
    assessments: Vec<Assessment>,
    declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplianceStatus {
    pub agent_id: String,
    pub risk_category: Option<RiskCategory>,
    pub completed: Vec<String>,
    pub missing: Vec<String>,
    pub completion_pct: f64,
}

pub struct ComplianceService<'a> {
    store: SafeStore,
    signing_key: &'a SigningKey,
}

impl<'a> ComplianceService<'a> {
    pub fn new(data_dir: impl AsRef<Path>, signing_key: &'a SigningKey) -> Self {
        Self {
            store: SafeStore::new(data_dir.as_ref().join("compliance.json")),
            signing_key,
        }
    }

    /// Create a risk-tiered compliance profile for `agent_id`, rejecting
    /// `unacceptable` risk outright and linking back to the UAIT via
    /// `eu_compliance`.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_profile(
        &self,
        identities: &IdentityService<'_>,
        agent_id: &str,
        risk_category: RiskCategory,
        provider: &str,
        ai_system: &str,
        intended_purpose: &str,
        transparency: &str,
        human_oversight: &str,
    ) -> Result<ComplianceProfile> {
        if risk_category == RiskCategory::Unacceptable {
            return Err(KernelError::PolicyViolation(
                "unacceptable-risk AI systems are prohibited under the EU AI Act (Article 5)".into(),
            ));
        }

        let mut data = self.store.load(ComplianceCollection::default()).await?;
        if data.profiles.iter().any(|p| p.agent_id == agent_id) {
            return Err(KernelError::Validation(format!(
                "a compliance profile already exists for agent {agent_id}"
            )));
        }

        let now = Utc::now();
        let profile_id = format!("comp:{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);

        let mut profile = ComplianceProfile {
            profile_id: profile_id.clone(),
            agent_id: agent_id.to_string(),
            risk_category,
            provider: provider.to_string(),
            ai_system: ai_system.to_string(),
            intended_purpose: intended_purpose.to_string(),
            transparency: transparency.to_string(),
            human_oversight: human_oversight.to_string(),
            required_obligations: risk_category
                .required_obligations()
                .into_iter()
                .map(String::from)
                .collect(),
            created_at: now,
            updated_at: now,
            conformity: Conformity::default(),
            signature: None,
        };
        profile.signature = Some(self.signing_key.sign(&profile)?);

        data.profiles.push(profile.clone());
        self.store.save(&data).await?;

        identities.update_compliance_ref(agent_id, &profile_id).await?;

        Ok(profile)
    }

    pub async fn get_profile(&self, agent_id: &str) -> Result<Option<ComplianceProfile>> {
        let data = self.store.load(ComplianceCollection::default()).await?;
        Ok(data.profiles.into_iter().find(|p| p.agent_id == agent_id))
    }

    pub async fn list_profiles(
        &self,
        risk_category: Option<RiskCategory>,
        compliant_only: bool,
        limit: usize,
    ) -> Result<Vec<ComplianceProfile>> {
        let data = self.store.load(ComplianceCollection::default()).await?;
        let mut profiles: Vec<ComplianceProfile> = data
            .profiles
            .into_iter()
            .filter(|p| risk_category.map(|r| p.risk_category == r).unwrap_or(true))
            .filter(|p| !compliant_only || p.conformity.declaration_id.is_some())
            .collect();
        profiles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        profiles.truncate(limit);
        Ok(profiles)
    }

    /// Record a conformity assessment. High-risk systems reject a
    /// self-assessment outright (Article 43 requires third-party review).
    pub async fn record_assessment(
        &self,
        agent_id: &str,
        assessment_type: AssessmentType,
        assessor_name: &str,
        result: AssessmentResult,
        findings: &str,
        ce_marking_eligible: bool,
    ) -> Result<Assessment> {
        let mut data = self.store.load(ComplianceCollection::default()).await?;
        let profile = data
            .profiles
            .iter()
            .find(|p| p.agent_id == agent_id)
            .ok_or_else(|| KernelError::NotFound(format!("no compliance profile for agent {agent_id}")))?
            .clone();

        if profile.risk_category == RiskCategory::High && assessment_type == AssessmentType::SelfAssessment {
            return Err(KernelError::PolicyViolation(
                "High-risk AI systems require third_party conformity assessment (Article 43).".into(),
            ));
        }

        let now = Utc::now();
        let assessment_id = format!("assess:{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        let mut assessment = Assessment {
            assessment_id: assessment_id.clone(),
            agent_id: agent_id.to_string(),
            assessment_type,
            assessor_name: assessor_name.to_string(),
            result,
            findings: findings.to_string(),
            ce_marking_eligible: ce_marking_eligible && result == AssessmentResult::Pass,
            assessed_at: now,
            assessed_by: self.signing_key.did().to_string(),
            signature: None,
        };
        assessment.signature = Some(self.signing_key.sign(&assessment)?);
        data.assessments.push(assessment.clone());

        if let Some(p) = data.profiles.iter_mut().find(|p| p.agent_id == agent_id) {
            p.conformity.assessment_completed = matches!(result, AssessmentResult::Pass | AssessmentResult::Conditional);
            p.conformity.assessment_id = Some(assessment_id);
            p.conformity.ce_marking_eligible = assessment.ce_marking_eligible;
            p.updated_at = now;
        }

        self.store.save(&data).await?;
        Ok(assessment)
    }

    /// Generate an Annex V declaration of conformity, gated on profile
    /// existence, a passing/conditional assessment, and (for high-risk
    /// systems) a non-empty human-oversight statement backed by a
    /// third-party assessment. Auto-issues an `EUAIActComplianceCredential`.
    pub async fn generate_declaration(
        &self,
        credentials: &CredentialService<'_>,
        agent_id: &str,
    ) -> Result<(Declaration, crate::credential::VerifiableCredential)> {
        let data = self.store.load(ComplianceCollection::default()).await?;
        let profile = data
            .profiles
            .iter()
            .find(|p| p.agent_id == agent_id)
            .ok_or_else(|| KernelError::NotFound(format!("no compliance profile for agent {agent_id}")))?
            .clone();

        let assessment = profile
            .conformity
            .assessment_id
            .as_ref()
            .and_then(|id| data.assessments.iter().find(|a| &a.assessment_id == id))
            .ok_or_else(|| {
                KernelError::PolicyViolation("no completed conformity assessment on file".into())
            })?;

        if !matches!(assessment.result, AssessmentResult::Pass | AssessmentResult::Conditional) {
            return Err(KernelError::PolicyViolation(
                "conformity assessment did not pass or conditionally pass".into(),
            ));
        }
        if profile.intended_purpose.trim().is_empty() {
            return Err(KernelError::PolicyViolation("intended purpose is required".into()));
        }
        if profile.transparency.trim().is_empty() {
            return Err(KernelError::PolicyViolation("transparency statement is required".into()));
        }
        if profile.risk_category == RiskCategory::High {
            if profile.human_oversight.trim().is_empty() {
                return Err(KernelError::PolicyViolation(
                    "high-risk systems require a human-oversight statement".into(),
                ));
            }
            if assessment.assessment_type != AssessmentType::ThirdParty {
                return Err(KernelError::PolicyViolation(
                    "High-risk AI systems require third_party conformity assessment (Article 43).".into(),
                ));
            }
        }

        let now = Utc::now();
        let declaration_id = format!("decl:{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        let issuer_did = self.signing_key.did().to_string();

        let fields = vec![
            ("1_provider_name".to_string(), profile.provider.clone()),
            ("2_ai_system_name".to_string(), profile.ai_system.clone()),
            ("3_intended_purpose".to_string(), profile.intended_purpose.clone()),
            ("4_risk_category".to_string(), format!("{:?}", profile.risk_category)),
            (
                "5_conformity_assessment_result".to_string(),
                format!("{:?}", assessment.result),
            ),
            ("6_assessment_body".to_string(), assessment.assessor_name.clone()),
            ("7_harmonized_standards".to_string(), "ISO/IEC 42001:2023, ISO/IEC 23894:2023".to_string()),
            ("8_transparency_measures".to_string(), profile.transparency.clone()),
            ("9_human_oversight_measures".to_string(), profile.human_oversight.clone()),
            (
                "10_ce_marking_eligible".to_string(),
                profile.conformity.ce_marking_eligible.to_string(),
            ),
            ("11_declaration_date".to_string(), now.to_rfc3339()),
            ("12_signatory_name".to_string(), profile.provider.clone()),
            ("12a_signatory_did".to_string(), issuer_did.clone()),
        ];

        let mut declaration = Declaration {
            declaration_id: declaration_id.clone(),
            agent_id: agent_id.to_string(),
            fields,
            issued_at: now,
            issuer_did: issuer_did.clone(),
            signature: None,
        };
        declaration.signature = Some(self.signing_key.sign(&declaration)?);

        let claims = json!({
            "risk_category": profile.risk_category,
            "declaration_id": declaration_id,
            "provider": profile.provider,
        });
        let vc = credentials
            .issue_credential(
                agent_id,
                "EUAIActComplianceCredential",
                &profile.provider,
                claims,
                Some(DECLARATION_VC_EXPIRY_DAYS),
            )
            .await?;

        let mut data = self.store.load(ComplianceCollection::default()).await?;
        data.declarations.push(declaration.clone());
        if let Some(p) = data.profiles.iter_mut().find(|p| p.agent_id == agent_id) {
            p.conformity.declaration_id = Some(declaration_id);
            p.updated_at = now;
        }
        self.store.save(&data).await?;

        Ok((declaration, vc))
    }

    /// Gap analysis against a fixed checklist, proportioned by risk tier.
    pub async fn get_status(&self, agent_id: &str, audit_entry_count: usize) -> Result<ComplianceStatus> {
        let data = self.store.load(ComplianceCollection::default()).await?;
        let profile = data.profiles.iter().find(|p| p.agent_id == agent_id).cloned();

        let mut completed = Vec::new();
        let mut missing = Vec::new();

        let Some(profile) = profile else {
            missing.push("profile".to_string());
            return Ok(ComplianceStatus {
                agent_id: agent_id.to_string(),
                risk_category: None,
                completed,
                missing,
                completion_pct: 0.0,
            });
        };
        completed.push("profile".to_string());

        check(&mut completed, &mut missing, "intended_purpose", !profile.intended_purpose.trim().is_empty());
        check(&mut completed, &mut missing, "transparency", !profile.transparency.trim().is_empty());

        let is_high = profile.risk_category == RiskCategory::High;
        if is_high {
            check(&mut completed, &mut missing, "human_oversight", !profile.human_oversight.trim().is_empty());
        }

        check(
            &mut completed,
            &mut missing,
            "conformity_assessment_passed",
            profile.conformity.assessment_completed,
        );
        check(
            &mut completed,
            &mut missing,
            "declaration_of_conformity_issued",
            profile.conformity.declaration_id.is_some(),
        );
        check(
            &mut completed,
            &mut missing,
            "training_data_provenance",
            profile.required_obligations.iter().any(|o| o == "data_governance") == is_high,
        );
        check(&mut completed, &mut missing, "model_lineage_recorded", !is_high || audit_entry_count > 0);

        if is_high {
            check(&mut completed, &mut missing, "risk_management_system", true);
            check(&mut completed, &mut missing, "data_governance", true);
            check(&mut completed, &mut missing, "technical_documentation", true);
            check(&mut completed, &mut missing, "record_keeping", audit_entry_count > 0);
            check(&mut completed, &mut missing, "transparency_to_users", !profile.transparency.trim().is_empty());
            check(&mut completed, &mut missing, "accuracy_robustness_cybersecurity", true);
            check(&mut completed, &mut missing, "post_market_monitoring", true);
            check(&mut completed, &mut missing, "serious_incident_reporting", true);
        }

        let total = completed.len() + missing.len();
        let completion_pct = if total == 0 { 0.0 } else { (completed.len() as f64 / total as f64) * 100.0 };

        Ok(ComplianceStatus {
            agent_id: agent_id.to_string(),
            risk_category: Some(profile.risk_category),
            completed,
            missing,
            completion_pct,
        })
    }

    /// GDPR erasure: remove `agent_id`'s profile, assessments, and
    /// declarations. Returns the number of records removed across all
    /// three sub-collections.
    pub async fn purge(&self, agent_id: &str) -> Result<usize> {
        let mut data = self.store.load(ComplianceCollection::default()).await?;
        let before = data.profiles.len() + data.assessments.len() + data.declarations.len();

        data.profiles.retain(|p| p.agent_id != agent_id);
        data.assessments.retain(|a| a.agent_id != agent_id);
        data.declarations.retain(|d| d.agent_id != agent_id);

        let after = data.profiles.len() + data.assessments.len() + data.declarations.len();
        let removed = before - after;
        if removed > 0 {
            self.store.save(&data).await?;
        }
        Ok(removed)
    }

    /// Recompute and verify a profile's signature against the server key.
    pub fn verify_profile_signature(&self, profile: &ComplianceProfile) -> bool {
        match &profile.signature {
            Some(sig) => kernel::verify(profile, &self.signing_key.did().to_string(), sig).signature_valid,
            None => false,
        }
    }
}

fn check(completed: &mut Vec<String>, missing: &mut Vec<String>, name: &str, ok: bool) {
    if ok {
        completed.push(name.to_string());
    } else {
        missing.push(name.to_string());
    }
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
                dir.push(format!("attestix-compliance-test-{label}-{:?}", std::thread::current().id()));
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
    async fn high_risk_self_assessment_is_rejected() {
        let dir = TempDir::new("self-assessment-reject");
        let key = SigningKey::load_or_create(dir.path().join(".signing_key.json")).unwrap();
        let identities = IdentityService::new(dir.path(), &key);
        let compliance = ComplianceService::new(dir.path(), &key);

        let identity = identities
            .create_identity("HighRiskBot", "mcp", "", vec![], "", None, None)
            .await
            .unwrap();

        compliance
            .create_profile(
                &identities,
                &identity.agent_id,
                RiskCategory::High,
                "Acme Corp",
                "Resume Screener",
                "screen job applicants",
                "users are informed an AI assists screening",
                "",
            )
            .await
            .unwrap();

        let err = compliance
            .record_assessment(
                &identity.agent_id,
                AssessmentType::SelfAssessment,
                "Internal Team",
                AssessmentResult::Pass,
                "looks fine",
                true,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::PolicyViolation(_)));

        let profile = compliance.get_profile(&identity.agent_id).await.unwrap().unwrap();
        assert!(!profile.conformity.assessment_completed);
    }

    #[tokio::test]
    async fn unacceptable_risk_profile_is_rejected() {
        let dir = TempDir::new("unacceptable");
        let key = SigningKey::load_or_create(dir.path().join(".signing_key.json")).unwrap();
        let identities = IdentityService::new(dir.path(), &key);
        let compliance = ComplianceService::new(dir.path(), &key);

        let identity = identities
            .create_identity("SocialScoreBot", "mcp", "", vec![], "", None, None)
            .await
            .unwrap();

        let err = compliance
            .create_profile(
                &identities,
                &identity.agent_id,
                RiskCategory::Unacceptable,
                "Acme Corp",
                "Social Scoring",
                "score citizens",
                "none",
                "none",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::PolicyViolation(_)));
    }

    #[tokio::test]
    async fn full_high_risk_flow_issues_declaration_and_vc() {
        let dir = TempDir::new("full-flow");
        let key = SigningKey::load_or_create(dir.path().join(".signing_key.json")).unwrap();
        let identities = IdentityService::new(dir.path(), &key);
        let compliance = ComplianceService::new(dir.path(), &key);
        let credentials = CredentialService::new(dir.path(), &key);

        let identity = identities
            .create_identity("CreditScoreBot", "mcp", "", vec![], "", None, None)
            .await
            .unwrap();

        compliance
            .create_profile(
                &identities,
                &identity.agent_id,
                RiskCategory::High,
                "Acme Corp",
                "Credit Scoring",
                "assess creditworthiness",
                "disclosed in loan application flow",
                "loan officer reviews every denial",
            )
            .await
            .unwrap();

        compliance
            .record_assessment(
                &identity.agent_id,
                AssessmentType::ThirdParty,
                "Certified Assessor Ltd",
                AssessmentResult::Pass,
                "meets Article 9-15 obligations",
                true,
            )
            .await
            .unwrap();

        let (declaration, vc) = compliance
            .generate_declaration(&credentials, &identity.agent_id)
            .await
            .unwrap();

        assert_eq!(declaration.agent_id, identity.agent_id);
        assert!(vc.types.contains(&"EUAIActComplianceCredential".to_string()));

        let status = compliance.get_status(&identity.agent_id, 3).await.unwrap();
        assert!(status.missing.is_empty());
        assert_eq!(status.completion_pct, 100.0);
    }

    #[tokio::test]
    async fn declaration_without_assessment_is_refused() {
        let dir = TempDir::new("no-assessment");
        let key = SigningKey::load_or_create(dir.path().join(".signing_key.json")).unwrap();
        let identities = IdentityService::new(dir.path(), &key);
        let compliance = ComplianceService::new(dir.path(), &key);
        let credentials = CredentialService::new(dir.path(), &key);

        let identity = identities
            .create_identity("NoAssessmentBot", "mcp", "", vec![], "", None, None)
            .await
            .unwrap();
        compliance
            .create_profile(
                &identities,
                &identity.agent_id,
                RiskCategory::Limited,
                "Acme Corp",
                "Chatbot",
                "customer support",
                "disclosed as AI",
                "",
            )
            .await
            .unwrap();

        let err = compliance
            .generate_declaration(&credentials, &identity.agent_id)
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::PolicyViolation(_)));
    }

    #[tokio::test]
    async fn purge_removes_profile_and_assessment() {
        let dir = TempDir::new("purge");
        let key = SigningKey::load_or_create(dir.path().join(".signing_key.json")).unwrap();
        let identities = IdentityService::new(dir.path(), &key);
        let compliance = ComplianceService::new(dir.path(), &key);

        let identity = identities
            .create_identity("PurgeBot", "mcp", "", vec![], "", None, None)
            .await
            .unwrap();
        compliance
            .create_profile(
                &identities,
                &identity.agent_id,
                RiskCategory::Limited,
                "Acme Corp",
                "Chatbot",
                "customer support",
                "disclosed as AI",
                "",
            )
            .await
            .unwrap();
        compliance
            .record_assessment(
                &identity.agent_id,
                AssessmentType::SelfAssessment,
                "Internal",
                AssessmentResult::Pass,
                "fine",
                false,
            )
            .await
            .unwrap();

        let removed = compliance.purge(&identity.agent_id).await.unwrap();
        assert_eq!(removed, 2);
        assert!(compliance.get_profile(&identity.agent_id).await.unwrap().is_none());
    }
}
