//! Parallel fan-out of independent forge runs.
//!
//! Every job runs on the blocking pool with its own `StdRng` seeded
//! `base_seed + index`; inputs are shared read-only.

use std::collections::BTreeSet;
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::task::JoinSet;

use crate::config::ForgeSettings;
use crate::dataset::AggregateRow;
use crate::distribution::DistributionModel;
use crate::error::ForgeError;
use crate::forge::{ForgeOutput, forge};
use crate::rules::RuleTable;

/// One forge configuration of a batch.
#[derive(Debug, Clone)]
pub struct ForgeJob {
    /// Free-form name, e.g. the sweep variant it came from.
    pub label: String,
    pub model: Arc<DistributionModel>,
    pub rules: Arc<RuleTable>,
    pub rows: Arc<Vec<AggregateRow>>,
}

/// Outcome of one job.
#[derive(Debug)]
pub struct JobResult {
    pub index: usize,
    pub label: String,
    pub seed: u64,
    pub result: Result<ForgeOutput, ForgeError>,
}

/// Run all jobs concurrently and return their results ordered by job index.
///
/// A job that panics is reported as [`ForgeError::WorkerFailed`]; the
/// others are unaffected.
pub async fn forge_batch(jobs: Vec<ForgeJob>, settings: &ForgeSettings) -> Vec<JobResult> {
    let base_seed = settings.seed.unwrap_or_else(rand::random);
    let total = jobs.len();
    let mut set = JoinSet::new();
    let mut labels = Vec::with_capacity(total);

    for (index, job) in jobs.into_iter().enumerate() {
        let seed = base_seed.wrapping_add(index as u64);
        let settings = settings.clone().with_seed(seed);
        labels.push(job.label.clone());

        set.spawn(async move {
            let label = job.label.clone();
            let result = tokio::task::spawn_blocking(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                forge(&job.rows, &job.model, &job.rules, &settings, &mut rng).map_err(ForgeError::from)
            })
            .await
            .map_err(|e| ForgeError::WorkerFailed {
                index,
                reason: format!("worker panicked: {}", e),
            })
            .and_then(|r| r);

            JobResult {
                index,
                label,
                seed,
                result,
            }
        });
    }

    let mut results = Vec::with_capacity(total);
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(done) => {
                match &done.result {
                    Ok(out) => tracing::info!(
                        job = done.index,
                        label = %done.label,
                        guests = out.guests.len(),
                        "Batch job finished"
                    ),
                    Err(e) => tracing::error!(job = done.index, label = %done.label, "Batch job failed: {}", e),
                }
                results.push(done);
            }
            Err(e) => tracing::error!("Batch task did not complete: {}", e),
        }
    }

    // Jobs whose driver task itself was lost still get a result slot.
    let finished: BTreeSet<usize> = results.iter().map(|r| r.index).collect();
    for (index, label) in labels.into_iter().enumerate() {
        if !finished.contains(&index) {
            results.push(JobResult {
                index,
                label,
                seed: base_seed.wrapping_add(index as u64),
                result: Err(ForgeError::WorkerFailed {
                    index,
                    reason: "task cancelled".to_string(),
                }),
            });
        }
    }

    results.sort_by_key(|r| r.index);
    results
}
