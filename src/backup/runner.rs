//! One backup run, start to end.

use crate::backup::backup_config::BackupConfig;
use crate::backup::notifications::{LogNotifier, Notifier, Priority};
use crate::backup::planner::BackupPlanner;
use crate::backup::pool::{PoolReport, WorkerPool};
use crate::backup::remote::ftp::FtpRemote;
use crate::backup::remote::{RemoteConfig, RemoteFs, RemoteSync, SyncReport};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::retention::{RetentionSweeper, SweepOutcome};
use crate::backup::settings::Settings;
use chrono::NaiveDate;
use std::path::Path;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    pub jobs: PoolReport,
    pub sweep: Option<SweepOutcome>,
    pub sync: Option<SyncReport>,
}

pub struct Runner {
    config: BackupConfig,
    notifier: Arc<dyn Notifier>,
}

impl Runner {
    /// Notifies through the configured service, or only logs when there is
    /// none.
    pub fn new(config: BackupConfig) -> Self {
        let notifier: Arc<dyn Notifier> = match &config.notification {
            Some(notification) => Arc::new(notification.clone()),
            None => Arc::new(LogNotifier),
        };
        Self::with_notifier(config, notifier)
    }

    pub fn with_notifier(config: BackupConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self { config, notifier }
    }

    /// Returns `Err` only for failures that stop the run before any job is
    /// queued. Everything after that is logged, notified and carried on from.
    pub fn run(&self, today: NaiveDate) -> Result<RunReport> {
        let settings = Settings::new(&self.config, today)?;
        let sweeper = RetentionSweeper::new(&settings)?;
        settings.create_dated_dir()?;
        tracing::info!("Backing up to {:?}", settings.dated_dir());
        tracing::info!("Using archiver {}", settings.archiver());

        let pool = WorkerPool::new(settings.workers(), self.notifier.clone())?;
        let planner = BackupPlanner::new(&settings);
        let (mut jobs, planning_error) = planner.plan_folder_jobs(&self.config.folder_targets());
        if let Some(e) = planning_error {
            self.report_failure("Backup planning failed", e);
        }
        for database in &self.config.databases {
            jobs.extend(planner.plan_database_jobs(database));
        }

        tracing::info!("Queueing {} backup job(s) on {} worker(s)", jobs.len(), pool.size());
        for job in jobs {
            let name = job.name().clone();
            if let Err(e) = pool.submit(job) {
                tracing::error!("Cannot queue {}: {e}", name);
            }
        }
        let jobs = pool.shutdown();
        tracing::info!(
            "Backup jobs done: {} succeeded, {} failed",
            jobs.succeeded,
            jobs.failed
        );

        let sweep = match sweeper.sweep() {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                self.report_failure("Retention sweep failed", e);
                None
            }
        };

        let sync = self
            .config
            .remote
            .as_ref()
            .and_then(|remote| self.sync_to_ftp(remote, settings.out_root()));

        self.notify(
            &format!(
                "Backup run complete: {} succeeded, {} failed",
                jobs.succeeded, jobs.failed
            ),
            Priority::Normal,
        );
        tracing::info!("Run complete");

        Ok(RunReport { jobs, sweep, sync })
    }

    fn sync_to_ftp(&self, config: &RemoteConfig, local_root: &Path) -> Option<SyncReport> {
        match FtpRemote::connect(config) {
            Ok(remote) => Some(self.sync_remote(remote, local_root)),
            Err(e) => {
                self.report_failure("Remote sync skipped", e);
                None
            }
        }
    }

    pub(crate) fn sync_remote<R: RemoteFs>(&self, remote: R, local_root: &Path) -> SyncReport {
        let mut sync = RemoteSync::new(remote);
        let (report, error) = sync.sync(local_root);
        if let Some(e) = error {
            self.report_failure("Remote sync incomplete", e);
        }
        if let Err(e) = sync.into_inner().quit() {
            tracing::warn!("Remote session did not close cleanly: {e}");
        }
        tracing::info!(
            "Remote sync: {} file(s) uploaded, {} file(s) and {} folder(s) deleted",
            report.uploaded_files,
            report.deleted_files,
            report.removed_dirs
        );
        report
    }

    fn report_failure(&self, context: &str, error: Error) {
        tracing::error!("{context}: {error}");
        self.notify(&format!("{context}: {error}"), Priority::Urgent);
    }

    fn notify(&self, message: &str, priority: Priority) {
        if let Err(e) = self.notifier.notify(message, priority) {
            tracing::warn!("Notification was not delivered: {e}");
        }
    }
}
