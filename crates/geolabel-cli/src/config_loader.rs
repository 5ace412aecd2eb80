//! Configuration and store loading for CLI commands

use anyhow::{Context, Result};
use geolabel_core::config::LayeredConfig;
use geolabel_jobs::{JobQueue, JobService, ServiceSettings};
use geolabel_store::FileJobStore;
use std::sync::Arc;

use crate::cli::Cli;

pub const JOB_STORE_FILE: &str = "jobs.json";

/// Defaults, config file, environment, then command-line overrides
pub fn load_config(cli: &Cli) -> Result<LayeredConfig> {
    let mut config = LayeredConfig::load(Some(&cli.config))
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    config.update_from_cli(cli.overrides.clone().into());
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Job service over the data directory's job store.
///
/// The CLI does not run workers, so the service has no queues: it can
/// inspect and cancel jobs but not enqueue them.
pub async fn open_job_service(config: &LayeredConfig) -> Result<JobService> {
    let path = config.data_dir.value.join(JOB_STORE_FILE);
    let store = FileJobStore::open(&path)
        .await
        .with_context(|| format!("Failed to open job store at {}", path.display()))?;
    let settings = ServiceSettings::from_config(config);
    Ok(JobService::new(Arc::new(store), Vec::<JobQueue>::new(), settings))
}
