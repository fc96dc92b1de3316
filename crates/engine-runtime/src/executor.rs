use crate::error::ExecutorError;
use engine_core::services::{HistorySink, NotificationSink, SnapshotProvider};
use engine_core::summary::RunReport;
use engine_processing::processor::{DisableRequest, Processor};
use model::record::{EmployeeRecord, FieldChange};
use planner::resolver::CreationOrderResolver;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Drives one engine run end to end: batch resolution, processing, snapshot
/// refreshes between batches, and result dispatch to the configured sinks.
///
/// Sink and refresh failures never fail the run; the run report is the
/// authoritative result and is always returned.
pub struct Executor {
    processor: Processor,
    snapshots: Option<Arc<dyn SnapshotProvider>>,
    history: Option<Arc<dyn HistorySink>>,
    notifications: Option<Arc<dyn NotificationSink>>,
    shutdown: CancellationToken,
}

impl Executor {
    pub fn new(processor: Processor) -> Executor {
        Executor {
            processor,
            snapshots: None,
            history: None,
            notifications: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_snapshot_provider(mut self, provider: Arc<dyn SnapshotProvider>) -> Executor {
        self.snapshots = Some(provider);
        self
    }

    pub fn with_history_sink(mut self, sink: Arc<dyn HistorySink>) -> Executor {
        self.history = Some(sink);
        self
    }

    pub fn with_notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Executor {
        self.notifications = Some(sink);
        self
    }

    pub fn with_shutdown(mut self, token: CancellationToken) -> Executor {
        self.shutdown = token;
        self
    }

    /// Runs the creation pipeline over new employees. Records are ordered
    /// into manager-dependency batches first; between batches the target
    /// snapshots are refreshed so later batches see what earlier ones
    /// created.
    pub async fn run_creation(
        mut self,
        records: Vec<EmployeeRecord>,
    ) -> Result<RunReport, ExecutorError> {
        let run_id = Uuid::new_v4();
        let mode = self.processor.profile().mode();
        info!(%run_id, %mode, "Starting creation run for {} record(s)", records.len());
        if self.shutdown.is_cancelled() {
            return Err(ExecutorError::ShutdownRequested);
        }

        let existing_ids: BTreeSet<String> = self
            .processor
            .caches()
            .employees
            .iter()
            .map(|row| row.userid.trim().to_lowercase())
            .collect();
        let resolver = CreationOrderResolver::new(records, existing_ids);
        let summary = resolver.dependency_summary();
        let batches = resolver.resolve();
        info!(
            "Resolved {} new employee(s) into {} batch(es): {} without dependencies, {} with, {} in hard cycles",
            summary.total_new_employees,
            batches.len(),
            summary.employees_with_no_dependencies,
            summary.employees_with_dependencies,
            summary.employees_in_hard_cycles,
        );
        for missing in &summary.missing_hard_dependencies {
            warn!(
                "User {} references {} '{}' which is neither new nor existing",
                missing.userid, missing.field, missing.missing
            );
        }

        let total = batches.len();
        for (idx, batch) in batches.iter().enumerate() {
            if self.shutdown.is_cancelled() {
                warn!(
                    "Shutdown requested, stopping after {} of {} batch(es)",
                    idx, total
                );
                break;
            }
            if idx > 0 {
                self.refresh_snapshots().await;
            }
            info!(
                "Processing batch {}/{} with {} record(s)",
                idx + 1,
                total,
                batch.records.len()
            );
            self.processor.process_batch(batch).await;
        }

        Ok(self.finish(run_id).await)
    }

    /// Runs the update pipeline over a change feed.
    pub async fn run_updates(
        mut self,
        changes: Vec<FieldChange>,
    ) -> Result<RunReport, ExecutorError> {
        let run_id = Uuid::new_v4();
        let mode = self.processor.profile().mode();
        info!(%run_id, %mode, "Starting update run for {} change(s)", changes.len());
        if self.shutdown.is_cancelled() {
            return Err(ExecutorError::ShutdownRequested);
        }
        self.processor.process_updates(&changes).await;
        Ok(self.finish(run_id).await)
    }

    /// Deactivates leavers.
    pub async fn run_disable(
        mut self,
        requests: Vec<DisableRequest>,
    ) -> Result<RunReport, ExecutorError> {
        let run_id = Uuid::new_v4();
        let mode = self.processor.profile().mode();
        info!(%run_id, %mode, "Starting disable run for {} user(s)", requests.len());
        if self.shutdown.is_cancelled() {
            return Err(ExecutorError::ShutdownRequested);
        }
        self.processor.process_disable(&requests).await;
        Ok(self.finish(run_id).await)
    }

    async fn refresh_snapshots(&mut self) {
        let Some(provider) = self.snapshots.clone() else {
            return;
        };
        match provider.refresh().await {
            Ok(refresh) => {
                info!(
                    "Refreshed snapshots: {} position(s), {} employment row(s)",
                    refresh.positions.len(),
                    refresh.employees.len()
                );
                self.processor.apply_refresh(refresh);
            }
            // Stale caches are survivable; the next batch works with what
            // it has.
            Err(err) => warn!("Snapshot refresh failed: {}", err),
        }
    }

    async fn finish(self, run_id: Uuid) -> RunReport {
        let mode = self.processor.profile().mode();
        let report = RunReport::from_results(run_id, mode, self.processor.results());
        info!(
            %run_id,
            "Run finished: {} success, {} warning, {} failed",
            report.success_count,
            report.warning_count,
            report.failed_count
        );
        if let Some(history) = &self.history {
            if let Err(err) = history.record_run(&report).await {
                warn!("History sink failed: {}", err);
            }
        }
        if let Some(notifications) = &self.notifications {
            if let Err(err) = notifications.notify(&report).await {
                warn!("Notification sink failed: {}", err);
            }
        }
        report
    }
}
