//! Run report: counts plus every isolated failure

use serde::{Deserialize, Serialize};

/// Pipeline stage a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Upsert,
    Reconcile,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Upsert => write!(f, "upsert"),
            Stage::Reconcile => write!(f, "reconcile"),
        }
    }
}

/// One failed identifier (upsert), template (reconcile) or token (reconcile)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub stage: Stage,
    /// Remote template id for upsert failures, local template key for reconcile
    pub key: String,
    /// Set when a single token's mapping could not be created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub message: String,
}

/// Summary of a sync run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: String,
    /// Distinct remote template ids found by discovery
    pub templates_discovered: usize,
    pub templates_created: usize,
    /// Templates that already had a local record
    pub templates_existing: usize,
    pub mappings_created: usize,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Templates that made it through upsert
    pub fn templates_succeeded(&self) -> usize {
        self.templates_created + self.templates_existing
    }

    pub fn failures_in(&self, stage: Stage) -> impl Iterator<Item = &SyncFailure> {
        self.failures.iter().filter(move |f| f.stage == stage)
    }

    /// Remote ids whose upsert failed
    pub fn failed_template_ids(&self) -> Vec<&str> {
        self.failures_in(Stage::Upsert).map(|f| f.key.as_str()).collect()
    }
}
