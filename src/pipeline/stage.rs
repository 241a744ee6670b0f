// Pipeline stages
//
// A stage is any synchronous transformation of a Sample. Closures are
// stages; `Chain` runs an ordered list of stages as one.

use super::sample::Sample;

/// Failure raised by a user stage.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct StageError {
    message: String,
}

impl StageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Error for a field the stage needs but did not receive.
    pub fn missing(field: &str) -> Self {
        Self::new(format!("field '{}' is missing", field))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<anyhow::Error> for StageError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{:#}", err))
    }
}

impl From<std::io::Error> for StageError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// One step of a pipeline.
///
/// Stages run on the blocking thread pool, so they may do heavy CPU or
/// device work and may block.
pub trait Stage: Send + Sync {
    fn apply(&self, sample: Sample) -> Result<Sample, StageError>;
}

impl<F> Stage for F
where
    F: Fn(Sample) -> Result<Sample, StageError> + Send + Sync,
{
    fn apply(&self, sample: Sample) -> Result<Sample, StageError> {
        self(sample)
    }
}

/// Identity stage.
pub struct Passthrough;

impl Stage for Passthrough {
    fn apply(&self, sample: Sample) -> Result<Sample, StageError> {
        Ok(sample)
    }
}

/// Ordered composition of stages; stops at the first failure.
#[derive(Default)]
pub struct Chain {
    stages: Vec<Box<dyn Stage>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Stage for Chain {
    fn apply(&self, sample: Sample) -> Result<Sample, StageError> {
        self.stages
            .iter()
            .try_fold(sample, |sample, stage| stage.apply(sample))
    }
}
