// Perch - serve data-processing pipelines over HTTP
// Library exports

pub mod config;
pub mod directory;
pub mod interface;
pub mod jobs;
pub mod logging;
pub mod pipeline;
pub mod server;
pub mod service;

pub use directory::Directory;
pub use pipeline::{AdmissionGate, Pipeline, Stage};
pub use server::RequestService;
