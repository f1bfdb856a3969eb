//! # Durable Job Queue
//!
//! The queue backend for distributed campaign dispatch.
//!
//! ## Features
//!
//! - **Durable jobs**: PostgreSQL-backed queue with `FOR UPDATE SKIP LOCKED` claiming
//! - **Automatic retries**: Per-job retry policies with exponential backoff or a fixed schedule
//! - **Worker pools**: Bounded-concurrency execution with graceful shutdown
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         JobQueue                            │
//! │     (PostgreSQL: durable_job_queue; or in-memory)           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        WorkerPool                           │
//! │     (claims jobs, runs handlers, reports outcomes)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod queue;
pub mod reliability;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::queue::{
        ClaimedJob, InMemoryJobQueue, JobDefinition, JobError, JobFailureOutcome, JobQueue,
        PostgresJobQueue, QueueError,
    };
    pub use crate::reliability::RetryPolicy;
    pub use crate::worker::{WorkerPool, WorkerPoolConfig, WorkerPoolError};
}

// Re-export key types at crate root
pub use queue::{
    ClaimedJob, InMemoryJobQueue, JobDefinition, JobError, JobFailureOutcome, JobQueue, JobStatus,
    PostgresJobQueue, QueueError,
};
pub use reliability::RetryPolicy;
pub use worker::{JobHandler, JobResult, WorkerPool, WorkerPoolConfig, WorkerPoolError, WorkerPoolStatus};
