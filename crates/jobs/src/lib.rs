//! The Job Processor (§4.F): priority-laned background work queues for
//! error grouping and stats recalculation, drained on a fixed tick with
//! retry/backoff and graceful shutdown.

mod queue;
mod runner;
mod types;

pub use runner::{JobProcessor, ProcessorConfig};
pub use types::{backoff_delay, Job, JobId, JobKind, JobSnapshot, JobStatus, Priority};
