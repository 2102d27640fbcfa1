//! # Step Controller Module
//!
//! Macchina a stati dell'applicazione: `upload → edit → result`.
//!
//! ## Transizioni:
//! - `upload → edit`: admission riuscita di almeno un file valido
//! - `edit → result`: solo dopo che `run_batch` ha chiuso *tutti* i job
//! - `* → upload`: reset esplicito (svuota il registry)
//! - Una nuova admission in `edit`/`result` equivale a reset + admission;
//!   se nessun file è valido lo step e il batch restano invariati
//!
//! Il controller è un contesto costruito e passato esplicitamente: più
//! istanze indipendenti possono convivere (es. nei test).

use crate::{
    admission::{self, AdmissionPlan, AdmissionPolicy, AdmissionReport},
    aggregator::ResultAggregator,
    error::{ConvertError, Result},
    identity::Identity,
    job::SourceFile,
    options::ConversionOptions,
    orchestrator::{BatchOrchestrator, BatchOutcome},
    registry::JobRegistry,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppStep {
    Upload,
    Edit,
    Result,
}

impl fmt::Display for AppStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AppStep::Upload => "upload",
            AppStep::Edit => "edit",
            AppStep::Result => "result",
        };
        f.write_str(name)
    }
}

/// Owns the session: current step, registry and orchestrator
pub struct StepController {
    step: AppStep,
    orchestrator: BatchOrchestrator,
    policy: AdmissionPolicy,
    identity: Arc<dyn Identity>,
    last_admission: Option<AdmissionReport>,
    last_outcome: Option<BatchOutcome>,
}

impl StepController {
    pub fn new(
        orchestrator: BatchOrchestrator,
        policy: AdmissionPolicy,
        identity: Arc<dyn Identity>,
    ) -> Self {
        Self {
            step: AppStep::Upload,
            orchestrator,
            policy,
            identity,
            last_admission: None,
            last_outcome: None,
        }
    }

    pub fn step(&self) -> AppStep {
        self.step
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        self.orchestrator.registry()
    }

    pub fn last_admission(&self) -> Option<&AdmissionReport> {
        self.last_admission.as_ref()
    }

    pub fn last_outcome(&self) -> Option<&BatchOutcome> {
        self.last_outcome.as_ref()
    }

    /// Admit a new batch, replacing any previous one, and move to `edit`
    pub fn admit(&mut self, files: Vec<SourceFile>) -> Result<AdmissionReport> {
        if files.is_empty() {
            return Err(ConvertError::EmptyBatch);
        }

        let identity = self.identity.current_identity();
        let plan = self.policy.plan(files, &identity);
        self.admit_planned(plan)
    }

    /// Admit a batch that was already screened against the quota, e.g. by
    /// `FileManager::load_within_quota`
    pub fn admit_planned(&mut self, plan: AdmissionPlan) -> Result<AdmissionReport> {
        if plan.accepted.is_empty() {
            if plan.rejected.is_empty() {
                return Err(ConvertError::EmptyBatch);
            }
            return Err(admission::rejection_error(&plan.rejected, plan.quota));
        }

        let replacement = self.registry().replace_all(plan.accepted)?;
        let mut rejected = plan.rejected;
        rejected.extend(replacement.rejected);

        let report = AdmissionReport {
            quota: plan.quota,
            accepted: replacement.accepted,
            rejected,
        };

        if self.step != AppStep::Edit {
            info!("Step {} -> {}", self.step, AppStep::Edit);
        }
        self.step = AppStep::Edit;
        self.last_outcome = None;
        self.last_admission = Some(report.clone());

        Ok(report)
    }

    /// Run the batch and move to `result` once every job has settled
    pub async fn convert(&mut self, options: &ConversionOptions) -> Result<BatchOutcome> {
        if self.step != AppStep::Edit {
            return Err(ConvertError::InvalidTransition {
                step: self.step,
                action: "convert",
            });
        }

        let outcome = self.orchestrator.run_batch(options).await?;

        info!("Step {} -> {}", self.step, AppStep::Result);
        self.step = AppStep::Result;
        self.last_outcome = Some(outcome.clone());

        Ok(outcome)
    }

    /// Clear the batch and every derived view, back to `upload`
    pub fn reset(&mut self) {
        self.registry().clear();
        self.last_admission = None;
        self.last_outcome = None;

        if self.step != AppStep::Upload {
            info!("Step {} -> {}", self.step, AppStep::Upload);
        }
        self.step = AppStep::Upload;
    }

    /// Summaries and export; only available in `result`
    pub fn results(&self) -> Result<ResultAggregator> {
        if self.step != AppStep::Result {
            return Err(ConvertError::InvalidTransition {
                step: self.step,
                action: "read results",
            });
        }
        Ok(ResultAggregator::new(self.registry().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Codec, ProgressReporter};
    use crate::error::CodecError;
    use crate::identity::StaticIdentity;
    use async_trait::async_trait;
    use std::time::Duration;

    struct HalvingCodec;

    #[async_trait]
    impl Codec for HalvingCodec {
        async fn convert(
            &self,
            source: &SourceFile,
            _options: &ConversionOptions,
            progress: ProgressReporter,
        ) -> std::result::Result<Vec<u8>, CodecError> {
            progress.report(50.0);
            tokio::time::sleep(Duration::from_millis(5)).await;
            if source.name.starts_with("broken") {
                return Err(CodecError::Encode("unreadable".to_string()));
            }
            Ok(vec![0u8; source.bytes.len() / 2])
        }
    }

    fn controller() -> StepController {
        let registry = Arc::new(JobRegistry::new());
        let orchestrator = BatchOrchestrator::new(registry, Arc::new(HalvingCodec));
        StepController::new(
            orchestrator,
            AdmissionPolicy::default(),
            Arc::new(StaticIdentity::anonymous()),
        )
    }

    fn file(name: &str, mime: &str) -> SourceFile {
        SourceFile::new(name, mime, 0, vec![7u8; 64])
    }

    #[tokio::test]
    async fn test_full_cycle() {
        let mut controller = controller();
        assert_eq!(controller.step(), AppStep::Upload);

        controller.admit(vec![file("a.jpg", "image/jpeg")]).unwrap();
        assert_eq!(controller.step(), AppStep::Edit);
        assert_eq!(controller.registry().snapshot()[0].progress(), 0);

        let outcome = controller.convert(&ConversionOptions::default()).await.unwrap();
        assert_eq!(outcome.succeeded.len(), 1);
        assert_eq!(controller.step(), AppStep::Result);
        assert!(controller.registry().all_settled());

        controller.reset();
        assert_eq!(controller.step(), AppStep::Upload);
        assert!(controller.registry().is_empty());
        assert!(controller.last_outcome().is_none());
    }

    #[tokio::test]
    async fn test_result_is_reached_even_when_everything_fails() {
        let mut controller = controller();
        controller
            .admit(vec![file("broken1.jpg", "image/jpeg"), file("broken2.png", "image/png")])
            .unwrap();

        let outcome = controller.convert(&ConversionOptions::default()).await.unwrap();
        assert_eq!(outcome.failed.len(), 2);
        assert_eq!(controller.step(), AppStep::Result);
    }

    #[tokio::test]
    async fn test_convert_outside_edit_is_rejected() {
        let mut controller = controller();
        let err = controller.convert(&ConversionOptions::default()).await.unwrap_err();
        assert!(matches!(
            err,
            ConvertError::InvalidTransition { step: AppStep::Upload, .. }
        ));
        assert!(controller.results().is_err());
    }

    #[tokio::test]
    async fn test_rejected_readmission_keeps_step_and_batch() {
        let mut controller = controller();
        controller.admit(vec![file("a.jpg", "image/jpeg")]).unwrap();
        controller.convert(&ConversionOptions::default()).await.unwrap();

        let err = controller.admit(vec![file("notes.txt", "text/plain")]).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidInput { .. }));
        assert_eq!(controller.step(), AppStep::Result);
        assert_eq!(controller.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_readmission_from_result_returns_to_edit() {
        let mut controller = controller();
        controller.admit(vec![file("a.jpg", "image/jpeg")]).unwrap();
        controller.convert(&ConversionOptions::default()).await.unwrap();

        let report = controller
            .admit(vec![file("b.png", "image/png"), file("c.gif", "image/gif")])
            .unwrap();
        assert_eq!(report.accepted.len(), 2);
        assert_eq!(controller.step(), AppStep::Edit);
        assert!(controller.last_outcome().is_none());
        assert!(controller.registry().snapshot().iter().all(|job| job.progress() == 0));
    }

    #[test]
    fn test_quota_report() {
        let mut controller = controller();
        let files = (0..7).map(|i| file(&format!("{}.jpg", i), "image/jpeg")).collect();
        let report = controller.admit(files).unwrap();

        assert_eq!(report.accepted.len(), 5);
        assert_eq!(report.dropped_over_quota(), 2);
        assert_eq!(controller.registry().len(), 5);
    }

    #[test]
    fn test_authenticated_quota() {
        let registry = Arc::new(JobRegistry::new());
        let mut controller = StepController::new(
            BatchOrchestrator::new(registry, Arc::new(HalvingCodec)),
            AdmissionPolicy::default(),
            Arc::new(StaticIdentity::authenticated("ana")),
        );
        let files = (0..12).map(|i| file(&format!("{}.png", i), "image/png")).collect();
        let report = controller.admit(files).unwrap();

        assert_eq!(report.quota, 30);
        assert_eq!(report.accepted.len(), 12);
        assert_eq!(report.dropped_over_quota(), 0);
    }

    #[test]
    fn test_admit_planned_keeps_screened_rejections() {
        let mut controller = controller();
        let policy = AdmissionPolicy::default();
        let files = (0..6).map(|i| file(&format!("{}.gif", i), "image/gif")).collect();
        let plan = policy.plan(files, &crate::identity::IdentityInfo::default());

        let report = controller.admit_planned(plan).unwrap();
        assert_eq!(controller.step(), AppStep::Edit);
        assert_eq!(report.accepted.len(), 5);
        assert_eq!(report.dropped_over_quota(), 1);

        let empty = AdmissionPlan {
            quota: 5,
            accepted: Vec::new(),
            rejected: Vec::new(),
        };
        assert!(matches!(
            controller.admit_planned(empty),
            Err(ConvertError::EmptyBatch)
        ));
        assert_eq!(controller.registry().len(), 5);
    }
}
