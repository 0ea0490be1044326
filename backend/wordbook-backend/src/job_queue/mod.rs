//! Periodic maintenance jobs, scheduled through the `job_queue` table.
//!
//! Every job owns one row with the time it is next due. A run claims the row by setting
//! `in_progress`, and releases it with a due time one interval after the run finished.

use std::sync::{atomic, Arc};

use chrono::{DateTime, Duration, Utc};
use strum::{EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use tokio::{task::JoinHandle, time};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    configuration::Configuration,
    database::WordbookAsyncDatabaseConnectionPool,
    error::{WordbookError, WordbookResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr, EnumIter)]
pub enum Job {
    DeleteExpiredSessions,
}

impl Job {
    /// The name stored in the `job_queue` table.
    fn name(self) -> &'static str {
        self.into()
    }

    fn interval(self, configuration: &Configuration) -> Duration {
        match self {
            Job::DeleteExpiredSessions => configuration.expired_sessions_deletion_interval,
        }
    }

    async fn execute(
        self,
        database_connection_pool: &WordbookAsyncDatabaseConnectionPool,
        configuration: &Configuration,
    ) -> WordbookResult<()> {
        match self {
            Job::DeleteExpiredSessions => {
                delete_expired_sessions(database_connection_pool, configuration).await
            }
        }
    }
}

/// Register the jobs and run them whenever they are due, until the shutdown flag is set.
#[instrument(err, skip_all)]
pub async fn spawn_job_queue_runner(
    database_connection_pool: &WordbookAsyncDatabaseConnectionPool,
    shutdown_flag: Arc<atomic::AtomicBool>,
    configuration: &Configuration,
) -> WordbookResult<JoinHandle<WordbookResult<()>>> {
    register_jobs(database_connection_pool, configuration).await?;

    let database_connection_pool = database_connection_pool.clone();
    let configuration = configuration.clone();

    info!("Spawning job queue runner");
    Ok(tokio::spawn(async move {
        // The shutdown flag is checked once per tick.
        let mut ticks = time::interval(time::Duration::from_secs(1));
        ticks.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        while !shutdown_flag.load(atomic::Ordering::Relaxed) {
            ticks.tick().await;
            for job in Job::iter() {
                run_job_if_due(job, &database_connection_pool, &configuration).await?;
            }
        }

        info!("Job queue runner stopped");
        Ok(())
    }))
}

/// Make sure every job has a row, drop rows of jobs that no longer exist,
/// and release jobs that were interrupted by a previous stop.
#[instrument(err, skip_all)]
async fn register_jobs(
    database_connection_pool: &WordbookAsyncDatabaseConnectionPool,
    configuration: &Configuration,
) -> WordbookResult<()> {
    let job_names: Vec<&'static str> = Job::iter().map(Job::name).collect();

    database_connection_pool
        .execute_transaction_with_retries::<_, WordbookError>(
            move |database_connection| {
                Box::pin(async move {
                    use crate::database::schema::job_queue::dsl::*;
                    use diesel::{dsl::now, ExpressionMethods, QueryDsl};
                    use diesel_async::RunQueryDsl;

                    let rows: Vec<_> = job_names
                        .iter()
                        .map(|job_name| {
                            (
                                name.eq(*job_name),
                                scheduled_execution_time.eq(now),
                                in_progress.eq(false),
                            )
                        })
                        .collect();
                    diesel::insert_into(job_queue)
                        .values(rows)
                        .on_conflict_do_nothing()
                        .execute(database_connection)
                        .await?;

                    let removed_job_names: Vec<String> =
                        diesel::delete(job_queue.filter(name.ne_all(job_names)))
                            .returning(name)
                            .get_results(database_connection)
                            .await?;
                    for removed_job_name in removed_job_names {
                        warn!("Removed unknown job {removed_job_name:?}");
                    }

                    diesel::update(job_queue)
                        .set(in_progress.eq(false))
                        .execute(database_connection)
                        .await?;

                    Ok(())
                })
            },
            configuration.maximum_transaction_retry_count,
        )
        .await
        .map_err(|error| WordbookError::AccessJobQueue {
            source: Box::new(error),
        })
}

/// Claim the job if it is due, run it and schedule the next run.
/// A failed run is logged and rescheduled like a successful one.
#[instrument(err, skip(database_connection_pool, configuration))]
async fn run_job_if_due(
    job: Job,
    database_connection_pool: &WordbookAsyncDatabaseConnectionPool,
    configuration: &Configuration,
) -> WordbookResult<()> {
    let Some(scheduled_time) = claim_job(job, database_connection_pool, configuration).await?
    else {
        return Ok(());
    };

    let start_time = Utc::now();
    if start_delay_is_excessive(scheduled_time, start_time, configuration) {
        warn!(
            "Job {job:?} started {} after it was due",
            start_time - scheduled_time
        );
    }

    if let Err(error) = job.execute(database_connection_pool, configuration).await {
        error!("Job {job:?} failed: {error}");
    }

    let finish_time = Utc::now();
    debug!("Job {job:?} ran for {}", finish_time - start_time);
    release_job(
        job,
        next_execution_time(job, finish_time, configuration),
        database_connection_pool,
        configuration,
    )
    .await
}

/// Mark the job as in progress if it is due and not already running.
/// Returns the time it was due.
async fn claim_job(
    job: Job,
    database_connection_pool: &WordbookAsyncDatabaseConnectionPool,
    configuration: &Configuration,
) -> WordbookResult<Option<DateTime<Utc>>> {
    let job_name = job.name();

    database_connection_pool
        .execute_transaction_with_retries::<_, WordbookError>(
            move |database_connection| {
                Box::pin(async move {
                    use crate::database::schema::job_queue::dsl::*;
                    use diesel::{dsl::now, ExpressionMethods, OptionalExtension, QueryDsl};
                    use diesel_async::RunQueryDsl;

                    Ok(diesel::update(
                        job_queue
                            .filter(name.eq(job_name))
                            .filter(in_progress.eq(false))
                            .filter(scheduled_execution_time.le(now)),
                    )
                    .set(in_progress.eq(true))
                    .returning(scheduled_execution_time)
                    .get_result::<DateTime<Utc>>(database_connection)
                    .await
                    .optional()?)
                })
            },
            configuration.maximum_transaction_retry_count,
        )
        .await
        .map_err(|error| WordbookError::AccessJobQueue {
            source: Box::new(error),
        })
}

async fn release_job(
    job: Job,
    next_execution: DateTime<Utc>,
    database_connection_pool: &WordbookAsyncDatabaseConnectionPool,
    configuration: &Configuration,
) -> WordbookResult<()> {
    let job_name = job.name();

    database_connection_pool
        .execute_transaction_with_retries::<_, WordbookError>(
            move |database_connection| {
                Box::pin(async move {
                    use crate::database::schema::job_queue::dsl::*;
                    use diesel::{ExpressionMethods, QueryDsl};
                    use diesel_async::RunQueryDsl;

                    diesel::update(job_queue.filter(name.eq(job_name)))
                        .set((
                            in_progress.eq(false),
                            scheduled_execution_time.eq(next_execution),
                        ))
                        .execute(database_connection)
                        .await?;
                    Ok(())
                })
            },
            configuration.maximum_transaction_retry_count,
        )
        .await
        .map_err(|error| WordbookError::AccessJobQueue {
            source: Box::new(error),
        })
}

fn next_execution_time(
    job: Job,
    finish_time: DateTime<Utc>,
    configuration: &Configuration,
) -> DateTime<Utc> {
    finish_time + job.interval(configuration)
}

/// Due jobs are picked up within one poll interval, plus some slack for slow transactions.
fn start_delay_is_excessive(
    scheduled_time: DateTime<Utc>,
    start_time: DateTime<Utc>,
    configuration: &Configuration,
) -> bool {
    start_time - scheduled_time > configuration.job_queue_poll_interval + Duration::seconds(10)
}

/// Delete all sessions whose expiry has passed.
///
/// Runs read committed, since it may touch many rows.
/// A session that is written concurrently but already expired is deleted as well.
#[instrument(err, skip_all)]
async fn delete_expired_sessions(
    database_connection_pool: &WordbookAsyncDatabaseConnectionPool,
    configuration: &Configuration,
) -> WordbookResult<()> {
    let deleted_session_count = database_connection_pool
        .execute_read_committed_transaction::<_, WordbookError>(
            |database_connection| {
                Box::pin(async move {
                    use crate::database::schema::sessions::dsl::*;
                    use diesel::{dsl::now, ExpressionMethods, QueryDsl};
                    use diesel_async::RunQueryDsl;

                    Ok(diesel::delete(sessions.filter(expiry.lt(now)))
                        .execute(database_connection)
                        .await?)
                })
            },
            configuration.maximum_transaction_retry_count,
        )
        .await?;

    info!("Deleted {deleted_session_count} expired sessions");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{Duration, TimeZone, Utc};
    use strum::IntoEnumIterator;

    use super::{next_execution_time, start_delay_is_excessive, Job};
    use crate::configuration::Configuration;

    #[test]
    fn test_job_names_are_parsed_back() {
        for job in Job::iter() {
            assert_eq!(Job::from_str(job.name()), Ok(job));
        }
        assert_eq!(Job::DeleteExpiredSessions.name(), "DeleteExpiredSessions");
        assert!(Job::from_str("ImportDictionary").is_err());
    }

    #[test]
    fn test_next_run_is_one_interval_after_the_finish() {
        let configuration = Configuration::test_configuration();
        let finish_time = Utc.with_ymd_and_hms(2023, 11, 18, 12, 0, 3).unwrap();
        assert_eq!(
            next_execution_time(Job::DeleteExpiredSessions, finish_time, &configuration),
            finish_time + Duration::hours(24)
        );
    }

    #[test]
    fn test_start_delay_is_compared_with_the_poll_interval() {
        let configuration = Configuration::test_configuration();
        let scheduled_time = Utc.with_ymd_and_hms(2023, 11, 18, 12, 0, 0).unwrap();
        let limit = configuration.job_queue_poll_interval + Duration::seconds(10);

        assert!(!start_delay_is_excessive(
            scheduled_time,
            scheduled_time + limit,
            &configuration
        ));
        assert!(start_delay_is_excessive(
            scheduled_time,
            scheduled_time + limit + Duration::seconds(1),
            &configuration
        ));
    }
}
