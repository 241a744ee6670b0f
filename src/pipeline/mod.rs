// Pipeline module
//
// User applications as three composable stages, run under admission
// control so the exclusive device is used by one inference at a time.

mod admission;
pub mod demo;
mod runner;
mod sample;
mod stage;

pub use admission::{AdmissionGate, AdmissionPermit, GateClosed};
pub use runner::{Pipeline, PipelineError, StageKind};
pub use sample::{format_points, FieldValue, Sample};
pub use stage::{Chain, Passthrough, Stage, StageError};
