//! Recency-weighted trust scoring.
//!
//! Every recorded interaction decays exponentially with a 30-day half-life;
//! an agent's trust score is the decay-weighted average outcome rather than
//! a simple running mean, so recent behavior dominates stale history
//! without ever discarding it outright.
//!
//! This service has no sybil resistance: any agent can record interactions
//! about any other agent, and nothing here correlates counterparties or
//! weights by their own trust. That's a known, accepted limitation rather
//! than an oversight — a reputation layer with sybil resistance is a
//! separate, considerably larger mechanism than scope here affords.

use crate::error::Result;
use crate::store::SafeStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

const HALF_LIFE_SECONDS: f64 = 30.0 * 86400.0;

fn decay_lambda() -> f64 {
    std::f64::consts::LN_2 / HALF_LIFE_SECONDS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Partial,
    Failure,
    Timeout,
}

impl Outcome {
    fn weight(self) -> f64 {
        match self {
            Outcome::Success => 1.0,
            Outcome::Partial => 0.5,
            Outcome::Failure => 0.0,
            Outcome::Timeout => 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub agent_id: String,
    pub counterparty_id: String,
    pub outcome: Outcome,
    pub category: String,
    pub details: String,
    pub timestamp: DateTime<Utc>,
    pub epoch: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrustScore {
    pub trust_score: f64,
    pub last_updated: DateTime<Utc>,
    pub total_interactions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ReputationCollection {
    interactions: Vec<Interaction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReputationSummary {
    pub agent_id: String,
    pub trust_score: Option<f64>,
    pub total_interactions: usize,
    pub category_breakdown: HashMap<String, CategoryCounts>,
    pub last_interaction: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryCounts {
    pub success: usize,
    pub partial: usize,
    pub failure: usize,
    pub timeout: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReputationQueryResult {
    pub agent_id: String,
    pub trust_score: f64,
    pub interaction_count: usize,
}

pub struct ReputationService {
    store: SafeStore,
}

impl ReputationService {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            store: SafeStore::new(data_dir.as_ref().join("reputation.json")),
        }
    }

    /// Record an interaction outcome and return the agent's freshly
    /// recomputed trust score.
    pub async fn record_interaction(
        &self,
        agent_id: &str,
        counterparty_id: &str,
        outcome: Outcome,
        category: &str,
        details: &str,
    ) -> Result<(Interaction, TrustScore)> {
        let now = Utc::now();
        let interaction = Interaction {
            agent_id: agent_id.to_string(),
            counterparty_id: counterparty_id.to_string(),
            outcome,
            category: category.to_string(),
            details: details.to_string(),
            timestamp: now,
            epoch: now.timestamp(),
        };

        let mut data = self.store.load(ReputationCollection::default()).await?;
        data.interactions.push(interaction.clone());

        let score = compute_score(&data.interactions, agent_id);
        let total = data.interactions.iter().filter(|i| i.agent_id == agent_id).count();

        self.store.save(&data).await?;

        Ok((
            interaction,
            TrustScore {
                trust_score: round4(score),
                last_updated: now,
                total_interactions: total,
            },
        ))
    }

    /// Fetch the current trust score and a category breakdown for `agent_id`.
    pub async fn get_reputation(&self, agent_id: &str) -> Result<ReputationSummary> {
        let data = self.store.load(ReputationCollection::default()).await?;
        let agent_interactions: Vec<&Interaction> =
            data.interactions.iter().filter(|i| i.agent_id == agent_id).collect();

        if agent_interactions.is_empty() {
            return Ok(ReputationSummary {
                agent_id: agent_id.to_string(),
                trust_score: None,
                total_interactions: 0,
                category_breakdown: HashMap::new(),
                last_interaction: None,
            });
        }

        let score = compute_score(&data.interactions, agent_id);
        let mut breakdown: HashMap<String, CategoryCounts> = HashMap::new();
        for i in &agent_interactions {
            let entry = breakdown.entry(i.category.clone()).or_default();
            match i.outcome {
                Outcome::Success => entry.success += 1,
                Outcome::Partial => entry.partial += 1,
                Outcome::Failure => entry.failure += 1,
                Outcome::Timeout => entry.timeout += 1,
            }
            entry.total += 1;
        }

        Ok(ReputationSummary {
            agent_id: agent_id.to_string(),
            trust_score: Some(round4(score)),
            total_interactions: agent_interactions.len(),
            category_breakdown: breakdown,
            last_interaction: agent_interactions.last().map(|i| i.timestamp),
        })
    }

    /// Search all known agents by score/interaction-count/category
    /// criteria, sorted by descending trust score.
    pub async fn query_reputation(
        &self,
        min_score: f64,
        max_score: f64,
        min_interactions: usize,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ReputationQueryResult>> {
        let data = self.store.load(ReputationCollection::default()).await?;

        let mut agent_ids: Vec<String> = data
            .interactions
            .iter()
            .map(|i| i.agent_id.clone())
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();
        agent_ids.sort();

        let mut results = Vec::new();
        for agent_id in agent_ids {
            let filtered: Vec<&Interaction> = data
                .interactions
                .iter()
                .filter(|i| i.agent_id == agent_id)
                .filter(|i| category.map(|c| i.category == c).unwrap_or(true))
                .collect();

            if filtered.len() < min_interactions {
                continue;
            }

            let score = if category.is_some() {
                compute_score(
                    &filtered.iter().map(|i| (*i).clone()).collect::<Vec<_>>(),
                    &agent_id,
                )
            } else {
                compute_score(&data.interactions, &agent_id)
            };

            if score >= min_score && score <= max_score {
                results.push(ReputationQueryResult {
                    agent_id,
                    trust_score: round4(score),
                    interaction_count: filtered.len(),
                });
            }
            if results.len() >= limit {
                break;
            }
        }

        results.sort_by(|a, b| b.trust_score.partial_cmp(&a.trust_score).unwrap());
        Ok(results)
    }
}

impl ReputationService {
    /// GDPR erasure: remove every interaction recorded for or by `agent_id`.
    /// Returns the number removed.
    pub async fn purge(&self, agent_id: &str) -> Result<usize> {
        let mut data = self.store.load(ReputationCollection::default()).await?;
        let before = data.interactions.len();
        data.interactions
            .retain(|i| i.agent_id != agent_id && i.counterparty_id != agent_id);
        let removed = before - data.interactions.len();
        if removed > 0 {
            self.store.save(&data).await?;
        }
        Ok(removed)
    }
}

fn compute_score(all_interactions: &[Interaction], agent_id: &str) -> f64 {
    let now = Utc::now().timestamp() as f64;
    let lambda = decay_lambda();

    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;

    for interaction in all_interactions.iter().filter(|i| i.agent_id == agent_id) {
        let age = (now - interaction.epoch as f64).max(0.0);
        let decay = (-lambda * age).exp();
        weighted_sum += interaction.outcome.weight() * decay;
        weight_total += decay;
    }

    if weight_total == 0.0 {
        0.0
    } else {
        weighted_sum / weight_total
    }
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
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
                dir.push(format!("attestix-reputation-test-{label}-{:?}", std::thread::current().id()));
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
    async fn recent_success_dominates_old_failures() {
        let dir = TempDir::new("decay");
        let svc = ReputationService::new(dir.path());

        for _ in 0..5 {
            svc.record_interaction("attestix:agent0001", "attestix:peer0001", Outcome::Failure, "task", "")
                .await
                .unwrap();
        }
        let (_, score) = svc
            .record_interaction("attestix:agent0001", "attestix:peer0001", Outcome::Success, "task", "")
            .await
            .unwrap();

        // All interactions happen at (near) the same instant in this test, so
        // decay weights are effectively equal; the score should sit roughly
        // at the outcome average rather than collapse to either extreme.
        assert!(score.trust_score > 0.0 && score.trust_score < 1.0);
    }

    #[tokio::test]
    async fn unknown_agent_has_no_score() {
        let dir = TempDir::new("unknown");
        let svc = ReputationService::new(dir.path());
        let summary = svc.get_reputation("attestix:nobody01").await.unwrap();
        assert!(summary.trust_score.is_none());
        assert_eq!(summary.total_interactions, 0);
    }

    #[tokio::test]
    async fn query_filters_by_min_interactions() {
        let dir = TempDir::new("query");
        let svc = ReputationService::new(dir.path());
        svc.record_interaction("attestix:agent0002", "attestix:peer0002", Outcome::Success, "general", "")
            .await
            .unwrap();

        let results = svc.query_reputation(0.0, 1.0, 5, None, 50).await.unwrap();
        assert!(results.is_empty());

        let results = svc.query_reputation(0.0, 1.0, 1, None, 50).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn purge_removes_agents_interactions() {
        let dir = TempDir::new("purge");
        let svc = ReputationService::new(dir.path());
        svc.record_interaction("attestix:agent0003", "attestix:peer0003", Outcome::Success, "task", "")
            .await
            .unwrap();

        let removed = svc.purge("attestix:agent0003").await.unwrap();
        assert_eq!(removed, 1);

        let summary = svc.get_reputation("attestix:agent0003").await.unwrap();
        assert_eq!(summary.total_interactions, 0);
    }
}
