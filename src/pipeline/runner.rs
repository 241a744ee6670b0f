// Pipeline runner
//
// preprocess → inference → postprocess, each on the blocking pool. The
// inference stage only runs while holding an admission permit.

use super::admission::AdmissionGate;
use super::sample::Sample;
use super::stage::{Stage, StageError};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinError;

/// Which of the three stages failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Preprocess,
    Inference,
    Postprocess,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageKind::Preprocess => "preprocess",
            StageKind::Inference => "inference",
            StageKind::Postprocess => "postprocess",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{stage} stage failed: {cause}")]
pub struct PipelineError {
    pub stage: StageKind,
    pub cause: String,
}

impl PipelineError {
    fn new(stage: StageKind, cause: impl Into<String>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }

    fn from_join(stage: StageKind, err: JoinError) -> Self {
        if err.is_panic() {
            Self::new(stage, "stage panicked")
        } else {
            Self::new(stage, "stage was cancelled")
        }
    }
}

/// The user application: three stages run in order.
///
/// Cheap to clone; stages are shared.
#[derive(Clone)]
pub struct Pipeline {
    preprocess: Arc<dyn Stage>,
    inference: Arc<dyn Stage>,
    postprocess: Arc<dyn Stage>,
}

impl Pipeline {
    pub fn new(
        preprocess: impl Stage + 'static,
        inference: impl Stage + 'static,
        postprocess: impl Stage + 'static,
    ) -> Self {
        Self {
            preprocess: Arc::new(preprocess),
            inference: Arc::new(inference),
            postprocess: Arc::new(postprocess),
        }
    }

    /// Run all three stages. Never retries: stages may consume their input.
    pub async fn run(&self, input: Sample, gate: &AdmissionGate) -> Result<Sample, PipelineError> {
        let prepared = run_stage(StageKind::Preprocess, &self.preprocess, input).await?;

        let permit = gate
            .acquire()
            .await
            .map_err(|e| PipelineError::new(StageKind::Inference, e.to_string()))?;
        tracing::debug!("Inference slot acquired");
        let inference = Arc::clone(&self.inference);
        // The permit moves into the blocking task so the slot is held for
        // exactly as long as the inference call runs, even if this future
        // is dropped.
        let inferred = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            inference.apply(prepared)
        })
        .await
        .map_err(|e| PipelineError::from_join(StageKind::Inference, e))?
        .map_err(|e| stage_failed(StageKind::Inference, e))?;
        tracing::debug!("Inference slot released");

        run_stage(StageKind::Postprocess, &self.postprocess, inferred).await
    }
}

async fn run_stage(
    kind: StageKind,
    stage: &Arc<dyn Stage>,
    sample: Sample,
) -> Result<Sample, PipelineError> {
    let stage = Arc::clone(stage);
    tokio::task::spawn_blocking(move || stage.apply(sample))
        .await
        .map_err(|e| PipelineError::from_join(kind, e))?
        .map_err(|e| stage_failed(kind, e))
}

fn stage_failed(kind: StageKind, err: StageError) -> PipelineError {
    tracing::warn!(stage = %kind, error = %err, "Pipeline stage failed");
    PipelineError::new(kind, err.message())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{FieldValue, Passthrough};

    fn bump(amount: f64) -> impl Stage {
        move |mut sample: Sample| -> Result<Sample, StageError> {
            let current = sample
                .get("field")
                .and_then(FieldValue::as_number)
                .ok_or_else(|| StageError::missing("field"))?;
            sample.insert("field", FieldValue::Number(current + amount));
            Ok(sample)
        }
    }

    fn zero() -> impl Stage {
        |sample: Sample| -> Result<Sample, StageError> {
            Ok(sample.with("field", FieldValue::Number(0.0)))
        }
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let pipeline = Pipeline::new(zero(), bump(10.0), bump(1.0));
        let out = pipeline
            .run(Sample::new(), &AdmissionGate::exclusive())
            .await
            .unwrap();
        assert_eq!(out.get("field"), Some(&FieldValue::Number(11.0)));
    }

    #[tokio::test]
    async fn test_failure_names_the_stage() {
        // preprocess leaves "field" absent, so inference fails
        let pipeline = Pipeline::new(Passthrough, bump(1.0), Passthrough);
        let err = pipeline
            .run(Sample::new(), &AdmissionGate::exclusive())
            .await
            .unwrap_err();
        assert_eq!(err.stage, StageKind::Inference);
        assert!(err.cause.contains("field"));
        assert_eq!(err.to_string(), "inference stage failed: field 'field' is missing");
    }

    #[tokio::test]
    async fn test_gate_released_after_inference_error() {
        let gate = AdmissionGate::exclusive();
        let failing = |_s: Sample| -> Result<Sample, StageError> { Err(StageError::new("oom")) };
        let pipeline = Pipeline::new(Passthrough, failing, Passthrough);
        assert!(pipeline.run(Sample::new(), &gate).await.is_err());
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn test_gate_released_after_inference_panic() {
        let gate = AdmissionGate::exclusive();
        let panicking = |_s: Sample| -> Result<Sample, StageError> { panic!("device lost") };
        let pipeline = Pipeline::new(Passthrough, panicking, Passthrough);
        let err = pipeline.run(Sample::new(), &gate).await.unwrap_err();
        assert_eq!(err.stage, StageKind::Inference);
        assert_eq!(err.cause, "stage panicked");
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn test_postprocess_failure_reported() {
        let failing = |_s: Sample| -> Result<Sample, StageError> { Err(StageError::new("write")) };
        let pipeline = Pipeline::new(Passthrough, Passthrough, failing);
        let err = pipeline
            .run(Sample::new(), &AdmissionGate::exclusive())
            .await
            .unwrap_err();
        assert_eq!(err.stage, StageKind::Postprocess);
    }
}
