//! The sync pipeline
//!
//! Discovery → Upsert → Reconcile. Upsert fans out over distinct remote ids;
//! its results are grouped by local key, and Reconcile fans out over those
//! groups, so any one id or key is handled by exactly one worker per run.

pub mod discovery;
pub mod reconcile;
pub mod report;
pub mod upsert;

#[cfg(test)]
pub(crate) mod testing;

pub use discovery::discover;
pub use reconcile::{reconcile, unmapped_tokens, ReconcileOutcome};
pub use report::{Stage, SyncFailure, SyncReport};
pub use upsert::{upsert, TemplateUpsert};

use crate::config::{Config, ConfigError};
use crate::error::Result;
use crate::remote::{TemplateDetail, TemplateSource};
use crate::store::RecordStore;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

/// Knobs for one run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub run_id: String,
    pub page_size: u32,
    pub max_pages: Option<u32>,
    pub workers: usize,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            page_size: config.remote.page_size,
            max_pages: config.remote.max_pages,
            workers: config.sync.workers,
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Run the whole pipeline.
///
/// Returns `Err` only when discovery fails (or the worker pool can't start).
/// Per-template and per-token failures end up in the report.
pub fn run_sync<S, R>(source: &S, store: &R, options: &SyncOptions) -> Result<SyncReport>
where
    S: TemplateSource + Sync + ?Sized,
    R: RecordStore + Sync + ?Sized,
{
    let mut report = SyncReport {
        run_id: options.run_id.clone(),
        ..Default::default()
    };

    info!(run_id = %options.run_id, "discovering templates");
    let discovered = discover(source, options.page_size, options.max_pages)?;
    let ids = distinct(discovered);
    report.templates_discovered = ids.len();
    info!(count = ids.len(), "discovery finished");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers.max(1))
        .build()
        .map_err(|e| ConfigError::Invalid {
            field: "sync.workers",
            reason: e.to_string(),
        })?;

    // Scatter: one upsert per remote id
    let upserts: Vec<(String, Result<TemplateUpsert>)> = pool.install(|| {
        ids.par_iter()
            .map(|id| (id.clone(), upsert(source, store, id)))
            .collect()
    });

    // Group: every detail that resolved to the same local record
    let mut groups: BTreeMap<i32, Vec<TemplateDetail>> = BTreeMap::new();
    for (id, result) in upserts {
        match result {
            Ok(done) => {
                if done.created {
                    report.templates_created += 1;
                } else {
                    report.templates_existing += 1;
                }
                groups.entry(done.local_key).or_default().push(done.detail);
            }
            Err(e) => {
                warn!(remote_id = %id, error = %e, "template upsert failed");
                report.failures.push(SyncFailure {
                    stage: Stage::Upsert,
                    key: id,
                    token: None,
                    message: e.to_string(),
                });
            }
        }
    }
    info!(
        created = report.templates_created,
        existing = report.templates_existing,
        failed = report.failures.len(),
        "upsert finished"
    );

    // Gather: one reconciliation per local key over the merged token set
    let units: Vec<(i32, Vec<String>)> = groups
        .into_iter()
        .map(|(key, details)| (key, merged_tokens(&details)))
        .collect();

    let reconciled: Vec<(i32, Result<ReconcileOutcome>)> = pool.install(|| {
        units
            .par_iter()
            .map(|(key, tokens)| (*key, reconcile(store, *key, tokens)))
            .collect()
    });

    for (key, result) in reconciled {
        match result {
            Ok(outcome) => {
                report.mappings_created += outcome.created.len();
                for (token, message) in outcome.failed {
                    report.failures.push(SyncFailure {
                        stage: Stage::Reconcile,
                        key: key.to_string(),
                        token: Some(token),
                        message,
                    });
                }
            }
            Err(e) => {
                warn!(local_key = key, error = %e, "reconcile failed");
                report.failures.push(SyncFailure {
                    stage: Stage::Reconcile,
                    key: key.to_string(),
                    token: None,
                    message: e.to_string(),
                });
            }
        }
    }

    info!(
        mappings_created = report.mappings_created,
        failures = report.failures.len(),
        "sync finished"
    );
    Ok(report)
}

/// Drop repeated ids, keeping first-seen order
fn distinct(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// Union of the token names of several details, in first-seen order
fn merged_tokens(details: &[TemplateDetail]) -> Vec<String> {
    let mut seen = HashSet::new();
    details
        .iter()
        .flat_map(|d| d.token_names())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
