use std::sync::Arc;

use geolabel_core::config::LayeredConfig;
use geolabel_core::models::JobKind;
use geolabel_store::JobStore;

use crate::executor::JobExecutor;
use crate::queue::JobQueue;
use crate::service::{JobService, ServiceSettings};
use crate::worker::{Worker, WorkerHandle, WorkerSettings};

/// One queue and worker per job kind, wired to a shared store and executor
pub struct JobRuntime {
    service: JobService,
    workers: Vec<WorkerHandle>,
}

impl JobRuntime {
    pub fn start(
        store: Arc<dyn JobStore>,
        executor: Arc<dyn JobExecutor>,
        service_settings: ServiceSettings,
        worker_settings: WorkerSettings,
    ) -> Self {
        let mut queues = Vec::with_capacity(JobKind::ALL.len());
        let mut workers = Vec::with_capacity(JobKind::ALL.len());

        for kind in JobKind::ALL {
            let (queue, receiver) = JobQueue::new(kind);
            let worker = Worker::new(receiver, store.clone(), executor.clone(), worker_settings);
            workers.push(worker.spawn());
            queues.push(queue);
        }

        Self {
            service: JobService::new(store, queues, service_settings),
            workers,
        }
    }

    pub fn from_config(
        config: &LayeredConfig,
        store: Arc<dyn JobStore>,
        executor: Arc<dyn JobExecutor>,
    ) -> Self {
        Self::start(
            store,
            executor,
            ServiceSettings::from_config(config),
            WorkerSettings::from_config(config),
        )
    }

    pub fn service(&self) -> &JobService {
        &self.service
    }

    /// Stop every worker, letting running jobs finish.
    pub async fn shutdown(self) {
        for worker in self.workers {
            worker.shutdown().await;
        }
    }
}
