use crate::compare::{compare_states, DiscrepancyReport};
use crate::pipeline::SyncPipeline;
use crate::target::{Checkpoint, TargetSystem};
use serde::Serialize;
use std::sync::Arc;
use tokenflow_common::{ImportStats, Result, TokenFile, TokenflowError};
use tokenflow_core::TokenflowConfig;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineChoice {
    Legacy,
    New,
}

/// Decides which pipeline's output stays in use after a dual run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutoverPolicy {
    pub threshold: f64,
    pub use_new_model: bool,
}

impl Default for CutoverPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            use_new_model: false,
        }
    }
}

impl CutoverPolicy {
    pub fn from_config(config: &TokenflowConfig) -> Self {
        Self {
            threshold: config.discrepancy_threshold,
            use_new_model: config.use_new_model,
        }
    }

    pub fn is_flagged(&self, rate: f64) -> bool {
        rate > self.threshold
    }

    /// New pipeline only with operator opt-in and a rate strictly below the threshold
    pub fn choose(&self, rate: f64) -> PipelineChoice {
        if self.use_new_model && rate < self.threshold {
            PipelineChoice::New
        } else {
            PipelineChoice::Legacy
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub report: DiscrepancyReport,
    pub discrepancy_rate: f64,
    pub flagged: bool,
    pub choice: PipelineChoice,
    pub legacy_stats: ImportStats,
    pub candidate_stats: ImportStats,
}

/// Runs a legacy and a candidate pipeline against the same input and target, one after the
/// other, and leaves the target as it found it.
pub struct DualRunValidator {
    legacy: Arc<dyn SyncPipeline>,
    candidate: Arc<dyn SyncPipeline>,
    policy: CutoverPolicy,
}

impl DualRunValidator {
    pub fn new(legacy: Arc<dyn SyncPipeline>, candidate: Arc<dyn SyncPipeline>) -> Self {
        Self {
            legacy,
            candidate,
            policy: CutoverPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CutoverPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &CutoverPolicy {
        &self.policy
    }

    pub async fn validate(&self, files: &[TokenFile], target: &dyn TargetSystem) -> Result<ValidationOutcome> {
        let checkpoint = target
            .checkpoint()
            .await
            .map_err(|e| target_error(target, "checkpoint", e))?;
        info!(
            "Dual run of {} vs {} against {} ({} records checkpointed)",
            self.legacy.name(),
            self.candidate.name(),
            target.name(),
            checkpoint.records().len()
        );

        let outcome = self.run_both(files, target, &checkpoint).await;
        let restored = target.restore(&checkpoint).await;

        match (outcome, restored) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(e)) => Err(target_error(target, "final restore", e)),
            (Err(err), restored) => {
                if let Err(e) = restored {
                    error!("Restore after failed dual run also failed: {:#}", e);
                }
                Err(err)
            }
        }
    }

    async fn run_both(
        &self,
        files: &[TokenFile],
        target: &dyn TargetSystem,
        checkpoint: &Checkpoint,
    ) -> Result<ValidationOutcome> {
        let legacy_stats = run_pipeline(self.legacy.as_ref(), files, target).await?;
        let state_a = target
            .snapshot()
            .await
            .map_err(|e| target_error(target, "snapshot", e))?;

        target
            .restore(checkpoint)
            .await
            .map_err(|e| target_error(target, "restore", e))?;

        let candidate_stats = run_pipeline(self.candidate.as_ref(), files, target).await?;
        let state_b = target
            .snapshot()
            .await
            .map_err(|e| target_error(target, "snapshot", e))?;

        let report = compare_states(&state_a, &state_b);
        let rate = report.discrepancy_rate();
        let flagged = self.policy.is_flagged(rate);
        let choice = self.policy.choose(rate);

        if flagged {
            warn!(
                "{} diverges from {}: {} differences, rate {:.4} over threshold {}",
                self.candidate.name(),
                self.legacy.name(),
                report.total_differences(),
                rate,
                self.policy.threshold
            );
        } else {
            info!(
                "{} differences (rate {:.4}), keeping {:?} pipeline",
                report.total_differences(),
                rate,
                choice
            );
        }

        Ok(ValidationOutcome {
            report,
            discrepancy_rate: rate,
            flagged,
            choice,
            legacy_stats,
            candidate_stats,
        })
    }
}

async fn run_pipeline(
    pipeline: &dyn SyncPipeline,
    files: &[TokenFile],
    target: &dyn TargetSystem,
) -> Result<ImportStats> {
    pipeline
        .apply(files, target)
        .await
        .map_err(|e| TokenflowError::Pipeline {
            pipeline: pipeline.name().to_string(),
            reason: format!("{:#}", e),
        })
}

fn target_error(target: &dyn TargetSystem, step: &str, error: anyhow::Error) -> TokenflowError {
    TokenflowError::Pipeline {
        pipeline: target.name().to_string(),
        reason: format!("{} failed: {:#}", step, error),
    }
}
