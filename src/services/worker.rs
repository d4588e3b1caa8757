use crate::services::jobs::JobRegistry;
use crate::services::storage::LocalStorage;
use chrono::Utc;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Periodically deletes uploads, artifacts and job records past their retention age.
pub struct RetentionWorker {
    storage: Arc<LocalStorage>,
    jobs: JobRegistry,
    max_age: Duration,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl RetentionWorker {
    pub fn new(
        storage: Arc<LocalStorage>,
        jobs: JobRegistry,
        max_age: Duration,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            storage,
            jobs,
            max_age,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            "🚀 Retention worker started (max age {:?}, every {:?})",
            self.max_age,
            self.interval
        );

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Retention worker shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.sweep().await;
                }
            }
        }
    }

    pub async fn sweep(&self) {
        tracing::info!("🧹 Running retention sweep...");

        let cutoff = SystemTime::now()
            .checked_sub(self.max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        match self.storage.sweep_older_than(cutoff).await {
            Ok(report) => tracing::info!(
                "Removed {} files and {} job directories",
                report.files_removed,
                report.dirs_removed
            ),
            Err(e) => tracing::error!("Retention sweep failed: {:?}", e),
        }

        let record_cutoff = chrono::Duration::from_std(self.max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));
        if let Some(record_cutoff) = record_cutoff {
            let purged = self.jobs.purge_finished_before(record_cutoff);
            if purged > 0 {
                tracing::info!("Purged {} finished job records", purged);
            }
        }

        tracing::info!("✅ Retention sweep completed");
    }
}
