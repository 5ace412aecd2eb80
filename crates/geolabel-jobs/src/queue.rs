use std::sync::{Arc, Mutex};

use geolabel_core::error::{GeolabelError, Result};
use geolabel_core::models::{JobId, JobKind};
use tokio::sync::mpsc;

/// Producer side of one job kind's FIFO queue.
///
/// Also exposes which job the kind's worker is executing right now. The
/// marker is written only by the worker.
#[derive(Debug, Clone)]
pub struct JobQueue {
    kind: JobKind,
    tx: mpsc::UnboundedSender<JobId>,
    current: Arc<Mutex<Option<JobId>>>,
}

/// Consumer side of a [`JobQueue`], owned by the worker
#[derive(Debug)]
pub struct QueueReceiver {
    pub(crate) kind: JobKind,
    pub(crate) rx: mpsc::UnboundedReceiver<JobId>,
    pub(crate) current: Arc<Mutex<Option<JobId>>>,
}

impl JobQueue {
    pub fn new(kind: JobKind) -> (Self, QueueReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let current = Arc::new(Mutex::new(None));
        let queue = Self { kind, tx, current: current.clone() };
        (queue, QueueReceiver { kind, rx, current })
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn push(&self, id: JobId) -> Result<()> {
        self.tx.send(id).map_err(|_| GeolabelError::QueueClosed { kind: self.kind })
    }

    /// The job the worker is currently executing
    pub fn current(&self) -> Option<JobId> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl QueueReceiver {
    pub(crate) fn set_current(&self, id: Option<JobId>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = id;
    }
}
