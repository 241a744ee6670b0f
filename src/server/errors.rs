// Request-level errors
//
// Each variant corresponds to the step of the request flow that failed.
// Clients only ever see `user_message()`; details go to the log.

use crate::interface::{ParseError, RenderError};
use crate::pipeline::PipelineError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("request parsing failed: {0}")]
    Parse(#[from] ParseError),
    #[error("processing failed: {0}")]
    Processing(#[from] PipelineError),
    #[error("response creation failed: {0}")]
    ResponseBuild(#[from] RenderError),
    #[error("could not create scratch directory: {0}")]
    Scratch(#[source] std::io::Error),
    #[error("worker task died: {0}")]
    Worker(String),
}

impl ServiceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ServiceError::Parse(_) => "Server-side ERROR during request parsing",
            ServiceError::Processing(_) | ServiceError::Scratch(_) | ServiceError::Worker(_) => {
                "Server-side ERROR during processing"
            }
            ServiceError::ResponseBuild(_) => "Server-side ERROR during response message creation",
        }
    }
}
