//! GeoLabel Jobs - Background job queues, workers and the enqueue boundary
//!
//! Each [`JobKind`](geolabel_core::models::JobKind) gets one FIFO queue and
//! one long-lived worker task. Callers go through [`JobService`], which
//! validates requests, persists them as pending jobs and hands them to the
//! right queue.

pub mod executor;
pub mod progress;
pub mod queue;
pub mod runtime;
pub mod service;
pub mod worker;

pub use executor::JobExecutor;
pub use progress::ChannelProgress;
pub use queue::JobQueue;
pub use runtime::JobRuntime;
pub use service::{JobService, RecoveryReport, ServiceSettings};
pub use worker::{Worker, WorkerHandle, WorkerSettings};
