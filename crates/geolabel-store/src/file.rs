//! Durable job store backed by a single JSON document.
//!
//! Every operation reloads the document, applies the change and writes it
//! back through a temporary file that is renamed over the original, so the
//! file on disk is always a complete snapshot. Each load-modify-save holds an
//! exclusive advisory lock on a sibling `.lock` file, so several processes
//! (a service running workers and a CLI cancelling jobs) can share one store.

use async_trait::async_trait;
use geolabel_core::error::{GeolabelError, Result};
use geolabel_core::models::{
    Job, JobFilter, JobId, JobKind, JobPayload, JobResult, ProgressUpdate, ProjectId,
};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::ports::JobStore;
use crate::table::JobTable;

#[derive(Debug, Clone)]
pub struct FileJobStore {
    path: PathBuf,
    // keeps this process's operations off the blocking pool while another
    // one holds the file lock
    lock: Arc<Mutex<()>>,
}

impl FileJobStore {
    /// Open (or create) the store at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let store = Self { path, lock: Arc::new(Mutex::new(())) };
        let jobs = store.read(|table| table.list(&JobFilter::default()).len()).await?;
        tracing::debug!(path = %store.path.display(), jobs, "Opened job store");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&JobTable) -> T + Send + 'static,
    {
        self.locked(false, move |table| Ok(f(table))).await
    }

    /// Apply `f` and persist the table if it succeeded.
    async fn modify<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut JobTable) -> Result<T> + Send + 'static,
    {
        self.locked(true, f).await
    }

    async fn locked<T, F>(&self, write: bool, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut JobTable) -> Result<T> + Send + 'static,
    {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || with_file_lock(&path, write, f))
            .await
            .map_err(|e| GeolabelError::Store(format!("Job store task failed: {}", e)))?
    }
}

/// The data file is replaced on every save, so the lock lives on a separate
/// file that is never renamed.
fn lock_path(path: &Path) -> PathBuf {
    path.with_extension("json.lock")
}

fn with_file_lock<T>(
    path: &Path,
    write: bool,
    f: impl FnOnce(&mut JobTable) -> Result<T>,
) -> Result<T> {
    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(lock_path(path))?;
    let mut lock = fd_lock::RwLock::new(lock_file);

    if write {
        let _held = lock.write()?;
        let mut table = load(path)?;
        let value = f(&mut table)?;
        save(path, &table)?;
        Ok(value)
    } else {
        let _held = lock.read()?;
        let mut table = load(path)?;
        f(&mut table)
    }
}

fn load(path: &Path) -> Result<JobTable> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
            GeolabelError::Store(format!("Corrupt job store {}: {}", path.display(), e))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(JobTable::default()),
        Err(e) => Err(e.into()),
    }
}

fn save(path: &Path, table: &JobTable) -> Result<()> {
    let json = serde_json::to_vec_pretty(table)?;
    let tmp = path.with_extension("json.tmp");
    let mut file = File::create(&tmp)?;
    std::io::Write::write_all(&mut file, &json)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn create_job(&self, payload: JobPayload) -> Result<Job> {
        self.modify(move |table| table.create(payload)).await
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        self.read(move |table| table.get(id).cloned()).await
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let filter = filter.clone();
        self.read(move |table| table.list(&filter)).await
    }

    async fn find_active(&self, kind: JobKind, project_id: ProjectId) -> Result<Option<Job>> {
        self.read(move |table| table.find_active(kind, project_id).cloned()).await
    }

    async fn mark_running(&self, id: JobId) -> Result<Job> {
        self.modify(move |table| table.mark_running(id)).await
    }

    async fn update_progress(&self, id: JobId, update: &ProgressUpdate) -> Result<bool> {
        let update = update.clone();
        self.modify(move |table| table.update_progress(id, &update)).await
    }

    async fn complete(&self, id: JobId, result: JobResult) -> Result<Job> {
        self.modify(move |table| table.complete(id, result)).await
    }

    async fn fail(&self, id: JobId, message: &str) -> Result<Job> {
        let message = message.to_string();
        self.modify(move |table| table.fail(id, &message)).await
    }

    async fn cancel_pending(&self, id: JobId) -> Result<Job> {
        self.modify(move |table| table.cancel_pending(id)).await
    }
}
