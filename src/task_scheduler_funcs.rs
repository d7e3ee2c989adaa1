use chrono::{Duration, Utc};
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::constants::{db_file, ARCHIVE_AFTER_DAYS, ARCHIVE_CRON};
use crate::db_operations::archive_old_meals;

/// Start the scheduler and keep the returned handle alive for the lifetime
/// of the process.
pub async fn run_task_scheduler() -> JobScheduler {
    let sched = JobScheduler::new().await.unwrap();

    start_archival_job(&sched).await;

    // start scheduler (non blocking)
    sched.start().await.unwrap();
    log::info!(target: "mensa_feedback_rs::TaskSched", "Ready.");

    sched
}

pub async fn start_archival_job(sched: &JobScheduler) {
    let archival_job = Job::new_async(ARCHIVE_CRON, move |_uuid, mut _l| {
        Box::pin(async move {
            run_archival_sweep().await;
        })
    })
    .unwrap();
    sched.add(archival_job).await.unwrap();
}

/// One sweep: mark every unarchived meal older than the retention window as
/// archived. Failures are logged and left for the next scheduled run.
pub async fn run_archival_sweep() {
    log::info!(target: "mensa_feedback_rs::TaskSched", "Starting archival sweep...");
    let cutoff = Utc::now() - Duration::days(ARCHIVE_AFTER_DAYS);

    match archive_old_meals(db_file(), cutoff) {
        Ok(0) => log::info!(target: "mensa_feedback_rs::TaskSched", "No meals due for archival"),
        Ok(archived) => {
            log::info!(target: "mensa_feedback_rs::TaskSched", "Archived {} meals", archived)
        }
        Err(e) => {
            log::error!(target: "mensa_feedback_rs::TaskSched", "Archival sweep failed: {}", e)
        }
    }
}
