//! Worker pool for job execution
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  WorkerPool                  │
//! │  ┌────────────┐          ┌────────────────┐  │
//! │  │ Poll loop  │          │ Stale reclaim  │  │
//! │  └─────┬──────┘          └────────────────┘  │
//! │        ▼                                     │
//! │  Handler per job type (Semaphore-limited)    │
//! └──────────────────────────────────────────────┘
//! ```

mod pool;

pub use pool::{JobHandler, JobResult, WorkerPool, WorkerPoolConfig, WorkerPoolError, WorkerPoolStatus};
