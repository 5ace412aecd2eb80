//! Jobs command implementations

use crate::cli::{JobsCommand, ListArgs, WatchArgs};
use crate::config_loader::open_job_service;
use crate::output::OutputWriter;
use crate::output_types::{describe_result, format_time, CancelOutput, JobRow};
use crate::progress::{create_job_bar, finish_error, finish_success};
use anyhow::{bail, Result};
use geolabel_core::config::LayeredConfig;
use geolabel_core::models::{Job, JobFilter, JobId, JobStatus, ProjectId};
use geolabel_jobs::JobService;
use std::time::Duration;

pub async fn execute(
    command: JobsCommand,
    config: &LayeredConfig,
    output: &OutputWriter,
) -> Result<()> {
    let service = open_job_service(config).await?;

    match command {
        JobsCommand::List(args) => list(&service, args, output).await,
        JobsCommand::Show { id } => show(&service, JobId(id), output).await,
        JobsCommand::Cancel { id } => cancel(&service, JobId(id), output).await,
        JobsCommand::Watch(args) => watch(&service, args, output).await,
    }
}

fn filter_from(args: &ListArgs) -> JobFilter {
    let mut filter = JobFilter::default();
    if let Some(kind) = args.kind {
        filter = filter.kind(kind);
    }
    if let Some(project) = args.project {
        filter = filter.project(ProjectId(project));
    }
    if let Some(status) = args.status {
        filter = filter.status(status);
    }
    filter
}

async fn list(service: &JobService, args: ListArgs, output: &OutputWriter) -> Result<()> {
    let jobs = service.list(&filter_from(&args)).await?;
    if !output.is_json() {
        if jobs.is_empty() {
            output.info("No jobs match the filter");
            return Ok(());
        }
        output.section(format!("Jobs ({})", jobs.len()));
    }
    let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
    output.table(rows)
}

async fn show(service: &JobService, id: JobId, output: &OutputWriter) -> Result<()> {
    let job = service.get(id).await?;

    if output.is_json() {
        return output.result(job);
    }

    output.section(format!("Job {}", job.id));
    output.kv("Kind", job.kind);
    output.kv("Project", job.project_id);
    output.kv("Status", job.status);
    if let Some(stage) = &job.stage {
        output.kv("Stage", stage);
    }
    output.kv("Progress", format!("{:.0}%", job.progress));
    if let Some(message) = &job.progress_message {
        output.kv("Message", message);
    }
    output.kv("Created", job.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    output.kv("Started", format_time(&job.started_at));
    output.kv("Finished", format_time(&job.completed_at));

    if let Some(error) = &job.error_message {
        output.error(error);
    }
    if let Some(result) = &job.result {
        output.section("Result");
        output.kv("Summary", describe_result(result));
        output.kv("Artifact", result.primary_path().display());
    }
    Ok(())
}

async fn cancel(service: &JobService, id: JobId, output: &OutputWriter) -> Result<()> {
    let job = service.cancel(id).await?;

    if output.is_json() {
        return output.result(CancelOutput { id: job.id.0, status: job.status });
    }
    output.success(format!("Cancelled {} job {}", job.kind, job.id));
    Ok(())
}

/// Poll the store until the job reaches a terminal state.
async fn watch(service: &JobService, args: WatchArgs, output: &OutputWriter) -> Result<()> {
    let id = JobId(args.id);
    let interval = Duration::from_millis(args.interval_ms.max(50));

    if output.is_json() {
        let job = wait_for_terminal(service, id, interval, |_| {}).await?;
        return output.result(job);
    }

    let bar = create_job_bar(&format!("Job {}", id));
    let job = wait_for_terminal(service, id, interval, |job| {
        bar.set_position(job.progress.clamp(0.0, 100.0) as u64);
        let stage = job.stage.clone().unwrap_or_else(|| job.status.to_string());
        let message = job.progress_message.as_deref().unwrap_or("");
        bar.set_message(format!("[{}] {}", stage, message));
    })
    .await;

    let job = match job {
        Ok(job) => job,
        Err(e) => {
            finish_error(&bar, "Lost track of job");
            return Err(e);
        }
    };

    match job.status {
        JobStatus::Completed => {
            finish_success(&bar, &format!("Job {} completed", job.id));
            if let Some(result) = &job.result {
                output.kv("Artifact", result.primary_path().display());
            }
            Ok(())
        }
        JobStatus::Cancelled => {
            finish_error(&bar, &format!("Job {} was cancelled", job.id));
            Ok(())
        }
        _ => {
            finish_error(&bar, &format!("Job {} failed", job.id));
            bail!(job.error_message.unwrap_or_else(|| "job failed".to_string()))
        }
    }
}

async fn wait_for_terminal(
    service: &JobService,
    id: JobId,
    interval: Duration,
    mut on_update: impl FnMut(&Job),
) -> Result<Job> {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let job = service.get(id).await?;
        on_update(&job);
        if job.is_terminal() {
            return Ok(job);
        }
    }
}
