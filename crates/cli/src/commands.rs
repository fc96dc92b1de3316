use crate::services::{DryRunUpsertService, LogNotificationSink};
use clap::Args;
use engine_core::cache::ReferenceCaches;
use engine_core::summary::RunReport;
use engine_processing::policy::EmailPolicy;
use engine_processing::processor::{DisableRequest, Processor};
use engine_processing::strategy::{
    MigrationConfig, MigrationStrategy, RunStrategy, StandardStrategy,
};
use engine_runtime::executor::Executor;
use model::record::{EmployeeRecord, FieldChange};
use planner::profile::{ExecutionProfile, RunMode};
use planner::resolver::CreationOrderResolver;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("run mode '{0}' is not valid for this command")]
    WrongMode(RunMode),

    #[error(transparent)]
    Executor(#[from] engine_runtime::error::ExecutorError),
}

#[derive(Args)]
pub struct RunArgs {
    /// Run mode: standard, migration or migration-inactive
    #[arg(long, default_value = "standard")]
    pub mode: RunMode,
    /// Target-side reference snapshot (JSON), empty caches when omitted
    #[arg(long)]
    pub caches: Option<PathBuf>,
    /// New-employee records to process (JSON array)
    #[arg(long)]
    pub records: PathBuf,
    /// Where to write the run report (JSON)
    #[arg(long)]
    pub report: Option<PathBuf>,
    /// Corporate email domain for pseudonymous addresses
    #[arg(long, default_value = "corp.example.com")]
    pub email_domain: String,
    /// Job code of the migration placeholder position
    #[arg(long, default_value = "MIGRATION")]
    pub placeholder_jobcode: String,
}

#[derive(Args)]
pub struct UpdateArgs {
    /// Target-side reference snapshot (JSON), empty caches when omitted
    #[arg(long)]
    pub caches: Option<PathBuf>,
    /// Changed fields to apply (JSON array)
    #[arg(long)]
    pub changes: PathBuf,
    /// Where to write the run report (JSON)
    #[arg(long)]
    pub report: Option<PathBuf>,
    /// Corporate email domain for pseudonymous addresses
    #[arg(long, default_value = "corp.example.com")]
    pub email_domain: String,
}

#[derive(Args)]
pub struct DisableArgs {
    /// Target-side reference snapshot (JSON), empty caches when omitted
    #[arg(long)]
    pub caches: Option<PathBuf>,
    /// Users to deactivate (JSON array of userid/end_date pairs)
    #[arg(long)]
    pub requests: PathBuf,
    /// Where to write the run report (JSON)
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Run mode: standard, migration, migration-inactive or disable
    #[arg(long, default_value = "standard")]
    pub mode: RunMode,
    /// New-employee records (JSON array); prints their creation batches
    #[arg(long)]
    pub records: Option<PathBuf>,
    /// Target-side reference snapshot (JSON), empty caches when omitted
    #[arg(long)]
    pub caches: Option<PathBuf>,
}

pub async fn run(args: RunArgs) -> Result<(), CliError> {
    let strategy: Box<dyn RunStrategy> = match args.mode {
        RunMode::Standard => Box::new(StandardStrategy),
        RunMode::Migration => Box::new(MigrationStrategy::new(migration_config(&args))),
        RunMode::MigrationInactive => {
            Box::new(MigrationStrategy::inactive(migration_config(&args)))
        }
        RunMode::Disable => return Err(CliError::WrongMode(args.mode)),
    };
    let caches = load_caches(args.caches.as_deref())?;
    let records: Vec<EmployeeRecord> = load(&args.records)?;
    info!("Loaded {} record(s) from {}", records.len(), args.records.display());

    let processor = Processor::new(
        ExecutionProfile::for_mode(args.mode),
        strategy,
        EmailPolicy::new(args.email_domain.as_str()),
        caches,
        Arc::new(DryRunUpsertService::new()),
    );
    let report = executor(processor).run_creation(records).await?;
    write_report(args.report.as_deref(), &report)
}

pub async fn update(args: UpdateArgs) -> Result<(), CliError> {
    let caches = load_caches(args.caches.as_deref())?;
    let changes: Vec<FieldChange> = load(&args.changes)?;
    info!("Loaded {} change(s) from {}", changes.len(), args.changes.display());

    let processor = Processor::new(
        ExecutionProfile::for_mode(RunMode::Standard),
        Box::new(StandardStrategy),
        EmailPolicy::new(args.email_domain.as_str()),
        caches,
        Arc::new(DryRunUpsertService::new()),
    );
    let report = executor(processor).run_updates(changes).await?;
    write_report(args.report.as_deref(), &report)
}

pub async fn disable(args: DisableArgs) -> Result<(), CliError> {
    let caches = load_caches(args.caches.as_deref())?;
    let requests: Vec<DisableRequest> = load(&args.requests)?;
    info!("Loaded {} request(s) from {}", requests.len(), args.requests.display());

    let processor = Processor::new(
        ExecutionProfile::for_mode(RunMode::Disable),
        Box::new(StandardStrategy),
        EmailPolicy::new("corp.example.com"),
        caches,
        Arc::new(DryRunUpsertService::new()),
    );
    let report = executor(processor).run_disable(requests).await?;
    write_report(args.report.as_deref(), &report)
}

pub fn plan(args: PlanArgs) -> Result<(), CliError> {
    let profile = ExecutionProfile::for_mode(args.mode);
    println!("Submission plan for {} runs:", profile.mode());
    for entity in profile.plan() {
        let deps = profile.dependencies_of(*entity);
        if deps.is_empty() {
            println!("  {entity}");
        } else {
            let list: Vec<String> = deps.iter().map(|d| d.to_string()).collect();
            println!("  {entity} (after {})", list.join(", "));
        }
    }

    let Some(records_path) = args.records.as_deref() else {
        return Ok(());
    };
    let records: Vec<EmployeeRecord> = load(records_path)?;
    let caches = load_caches(args.caches.as_deref())?;
    let existing_ids: BTreeSet<String> = caches
        .employees
        .iter()
        .map(|row| row.userid.trim().to_lowercase())
        .collect();
    let resolver = CreationOrderResolver::new(records, existing_ids);
    let summary = resolver.dependency_summary();

    println!();
    println!(
        "{} new employee(s): {} without dependencies, {} with, {} in hard cycles",
        summary.total_new_employees,
        summary.employees_with_no_dependencies,
        summary.employees_with_dependencies,
        summary.employees_in_hard_cycles
    );
    for group in &summary.hard_cycle_groups {
        println!("  hard cycle: {}", group.join(", "));
    }
    for missing in &summary.missing_hard_dependencies {
        println!(
            "  {}: {} '{}' is in neither the feed nor the target",
            missing.userid, missing.field, missing.missing
        );
    }
    if !summary.hr_retry_candidates.is_empty() {
        println!("  hr retry after run: {}", summary.hr_retry_candidates.join(", "));
    }

    for (idx, batch) in resolver.resolve().iter().enumerate() {
        let ids: Vec<&str> = batch.records.iter().map(|r| r.userid.as_str()).collect();
        println!("Batch {}: {}", idx + 1, ids.join(", "));
    }
    Ok(())
}

fn migration_config(args: &RunArgs) -> MigrationConfig {
    MigrationConfig {
        placeholder_jobcode: args.placeholder_jobcode.clone(),
        fallback_org: None,
    }
}

fn executor(processor: Processor) -> Executor {
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    Executor::new(processor)
        .with_notification_sink(Arc::new(LogNotificationSink))
        .with_shutdown(shutdown)
}

fn load_caches(path: Option<&Path>) -> Result<ReferenceCaches, CliError> {
    match path {
        Some(path) => load(path),
        None => Ok(ReferenceCaches::default()),
    }
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let body = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&body).map_err(|source| CliError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn write_report(path: Option<&Path>, report: &RunReport) -> Result<(), CliError> {
    let Some(path) = path else {
        return Ok(());
    };
    let body = serde_json::to_string_pretty(report).map_err(|source| CliError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, body).map_err(|source| CliError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Report written to {}", path.display());
    Ok(())
}
