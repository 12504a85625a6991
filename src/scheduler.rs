use std::{future::Future, sync::Arc};

use anyhow::{Error, Result};
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::{logging, refresh::Refresher};

/// 依 cron 排程執行每日更新
///
/// Cron fields are `sec min hour day-of-month month day-of-week` in UTC.
/// Firing more than once a day is harmless: the freshness gate skips every
/// run after the first successful one.
pub async fn start(
    sched: &JobScheduler,
    cron_expr: &str,
    refresher: Arc<Refresher>,
) -> Result<()> {
    let job = create_job(cron_expr, move || {
        let refresher = refresher.clone();
        async move {
            let outcome = refresher.run().await?;
            logging::info_file_async(outcome.to_string());
            Ok::<(), Error>(())
        }
    })?;

    sched.add(job).await?;
    sched.start().await?;

    logging::info_file_async(format!("Refresh scheduled on '{}' (UTC)", cron_expr));
    Ok(())
}

fn create_job<F, Fut>(cron_expr: &str, task: F) -> Result<Job>
where
    F: Fn() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    let expr = cron_expr.to_string();

    Ok(Job::new_async(cron_expr, move |_uuid, _l| {
        let task = task.clone();
        let expr = expr.clone();
        Box::pin(async move {
            if let Err(why) = task().await {
                logging::error_file_async(format!(
                    "Failed to execute task({}) because {:?}",
                    expr, why
                ));
            }
        })
    })?)
}
