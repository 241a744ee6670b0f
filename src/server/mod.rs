// Request service
//
// A node's network-facing job server: publishes its input interface,
// runs the pipeline for each `/predict`, and in delayed mode hands out
// tokens that are redeemed through `/responses`.

mod errors;
mod handlers;
pub mod middleware;
mod worker;

pub use errors::ServiceError;
pub use handlers::create_router;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::interface::{
    parse_request, render_response, InputInterface, OutputInterface, RequestForm, ResponseItem,
};
use crate::jobs::{JobStore, JobStoreError, JobToken};
use crate::pipeline::{AdmissionGate, Pipeline};
use crate::service::Announcer;

/// How `/predict` answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Run the job and answer with its result
    Immediate,
    /// Answer with a token right away; the result is fetched via `/responses`
    Delayed {
        /// Run at most one job pipeline at a time
        exclusive: bool,
    },
}

/// Main request service structure
pub struct RequestService {
    pipeline: Pipeline,
    input: InputInterface,
    output: OutputInterface,
    /// Serializes inference across all requests of this process
    inference_gate: AdmissionGate,
    /// Serializes whole delayed jobs when the mode is exclusive
    job_slot: AdmissionGate,
    mode: ResponseMode,
    jobs: JobStore,
    scratch_root: PathBuf,
    /// Directory URL this node announces to (reported by `/announcePoint`)
    announce_point: Option<String>,
}

impl RequestService {
    /// Immediate-mode service with a single inference slot.
    pub fn new(pipeline: Pipeline, input: InputInterface, output: OutputInterface) -> Self {
        Self {
            pipeline,
            input,
            output,
            inference_gate: AdmissionGate::exclusive(),
            job_slot: AdmissionGate::exclusive(),
            mode: ResponseMode::Immediate,
            jobs: JobStore::new(),
            scratch_root: std::env::temp_dir(),
            announce_point: None,
        }
    }

    /// Service configured from the `[node]` settings.
    pub fn from_config(
        config: &ServiceConfig,
        pipeline: Pipeline,
        input: InputInterface,
        output: OutputInterface,
    ) -> Self {
        let mode = if config.delayed {
            ResponseMode::Delayed {
                exclusive: config.exclusive_jobs,
            }
        } else {
            ResponseMode::Immediate
        };

        let mut service = Self::new(pipeline, input, output)
            .with_mode(mode)
            .with_inference_gate(AdmissionGate::new(config.inference_slots));
        if let Some(dir) = &config.scratch_dir {
            service = service.with_scratch_root(dir.clone());
        }
        if config.announce {
            if let Some(url) = &config.directory_url {
                service = service.with_announce_point(url.clone());
            }
        }
        service
    }

    pub fn with_mode(mut self, mode: ResponseMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_inference_gate(mut self, gate: AdmissionGate) -> Self {
        self.inference_gate = gate;
        self
    }

    pub fn with_scratch_root(mut self, root: PathBuf) -> Self {
        self.scratch_root = root;
        self
    }

    pub fn with_announce_point(mut self, url: String) -> Self {
        self.announce_point = Some(url);
        self
    }

    pub fn input_interface(&self) -> &InputInterface {
        &self.input
    }

    pub fn output_interface(&self) -> &OutputInterface {
        &self.output
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    pub fn inference_gate(&self) -> &AdmissionGate {
        &self.inference_gate
    }

    pub(crate) fn job_slot(&self) -> &AdmissionGate {
        &self.job_slot
    }

    pub fn announce_point(&self) -> Option<&str> {
        self.announce_point.as_deref()
    }

    /// Stop admitting work. Jobs still waiting for a slot fail instead of
    /// starting after the server has stopped listening.
    pub fn shutdown(&self) {
        self.inference_gate.close();
        self.job_slot.close();
    }

    /// Handle one `/predict` submission. Never fails: errors become a
    /// single error item.
    pub async fn predict(self: &Arc<Self>, form: RequestForm) -> Vec<ResponseItem> {
        match self.mode {
            ResponseMode::Delayed { exclusive } => {
                let token = worker::spawn_delayed_job(Arc::clone(self), form, exclusive);
                vec![ResponseItem::delayed(token.to_string())]
            }
            ResponseMode::Immediate => {
                // Runs detached from the connection: a client hanging up must
                // not abort the pipeline halfway or skip scratch cleanup.
                let service = Arc::clone(self);
                let outcome = tokio::spawn(async move { service.process(form).await })
                    .await
                    .map_err(|e| ServiceError::Worker(e.to_string()))
                    .and_then(|result| result);
                match outcome {
                    Ok(items) => items,
                    Err(err) => {
                        tracing::error!(error = %err, "Request failed");
                        vec![ResponseItem::error(err.user_message())]
                    }
                }
            }
        }
    }

    /// Parse, run and render one request inside its own scratch directory.
    ///
    /// The scratch directory is removed on every return path.
    pub async fn process(&self, form: RequestForm) -> Result<Vec<ResponseItem>, ServiceError> {
        let scratch = tempfile::Builder::new()
            .prefix("perch-")
            .tempdir_in(&self.scratch_root)
            .map_err(ServiceError::Scratch)?;
        tracing::debug!(scratch = %scratch.path().display(), "Request scratch directory created");

        let sample = parse_request(&self.input, &form, scratch.path())?;
        let result = self.pipeline.run(sample, &self.inference_gate).await?;
        let items = render_response(&self.output, &result)?;

        if let Err(e) = scratch.close() {
            tracing::warn!("Failed to remove scratch directory: {}", e);
        }
        Ok(items)
    }

    /// Handle one `/responses` poll.
    pub fn poll(&self, request_id: &str) -> Vec<ResponseItem> {
        let cannot_retrieve = || {
            vec![ResponseItem::text(format!(
                "The results of request {} cannot be retrieved",
                request_id
            ))]
        };

        let Ok(token) = request_id.parse::<JobToken>() else {
            return cannot_retrieve();
        };

        match self.jobs.get_and_clear(&token) {
            Ok(record) => {
                tracing::info!(request_id = %token, "Delivering delayed result");
                record.into_items()
            }
            Err(JobStoreError::Pending) => vec![ResponseItem::delayed(token.to_string())],
            Err(JobStoreError::NotFound) => cannot_retrieve(),
        }
    }

    /// Start the HTTP server (and the announcer when enabled).
    pub async fn serve(self, config: &ServiceConfig) -> Result<()> {
        let addr: SocketAddr = config
            .bind_address()
            .parse()
            .with_context(|| format!("Invalid bind address: {}", config.bind_address()))?;

        if let Some(dir) = &config.scratch_dir {
            std::fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create scratch directory: {}", dir.display())
            })?;
        }

        let announcer = if config.announce {
            let announcer = Announcer::new(Arc::new(config.clone()))?;
            Some(announcer.start(config.announce_interval()))
        } else {
            None
        };

        let service = Arc::new(self);
        let app = create_router(Arc::clone(&service))
            .layer(axum::extract::DefaultBodyLimit::max(
                config.max_body_mb * 1024 * 1024,
            ))
            .layer(TraceLayer::new_for_http());

        tracing::info!("Starting request service on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        axum::serve(listener, app)
            .with_graceful_shutdown(middleware::shutdown_signal())
            .await?;

        service.shutdown();
        if let Some(handle) = announcer {
            handle.stop();
        }
        Ok(())
    }
}
