// Delayed-job bookkeeping

mod store;

pub use store::{JobRecord, JobStatus, JobStore, JobStoreError, JobToken};
