//! Job queue persistence
//!
//! This module provides:
//! - [`JobQueue`] trait for enqueueing and claiming jobs
//! - [`InMemoryJobQueue`] for tests and single-process runs
//! - [`PostgresJobQueue`] for production

mod memory;
mod postgres;
mod store;

pub use memory::InMemoryJobQueue;
pub use postgres::PostgresJobQueue;
pub use store::{
    ClaimedJob, JobDefinition, JobError, JobFailureOutcome, JobQueue, JobStatus, QueueError,
};
