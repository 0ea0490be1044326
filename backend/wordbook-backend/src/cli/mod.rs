use std::sync::{atomic, Arc};

use clap::Parser;
use diesel_async::RunQueryDsl;
use secure_string::SecureString;
use tokio::io::{stdin, AsyncReadExt};
use tracing::{debug, info, instrument, warn};

use crate::{
    configuration::Configuration,
    database::{
        create_async_database_connection_pool,
        migrations::{has_missing_migrations, run_migrations},
    },
    error::{WordbookError, WordbookResult},
    integration_tests::run_internal_integration_tests,
    job_queue::spawn_job_queue_runner,
    web::{run_web_api, user::password_hash::PasswordHash},
};

/// CLI of the wordbook backend.
/// The application is configured through environment variables,
/// the CLI only selects administrative tasks.
#[derive(Parser, Debug, Default)]
enum Cli {
    /// Run the web API (default).
    #[default]
    Web,

    /// Apply pending database migrations.
    ApplyMigrations,

    /// Expire all sessions of all users.
    /// Users that are logged in need to log in again.
    ExpireAllSessions,

    /// Set the password of a user.
    /// If no password is given, then it is read from stdin.
    SetPassword {
        /// The name of the user.
        #[arg(short, long)]
        username: String,
        /// The new password.
        /// If not given, then it is read from stdin.
        #[arg(short, long)]
        password: Option<SecureString>,
    },

    /// Run integration tests that require a database, but use APIs that are not exposed through the web interface.
    RunInternalIntegrationTests,
}

#[instrument(skip(configuration))]
pub async fn run_cli_command(configuration: &Configuration) -> WordbookResult<()> {
    // Without arguments, clap would complain about the missing subcommand.
    let cli_command = if std::env::args_os().len() > 1 {
        Cli::parse()
    } else {
        Cli::default()
    };
    debug!("Cli arguments: {cli_command:#?}");

    match cli_command {
        Cli::Web => run_wordbook_backend(configuration).await?,
        Cli::ApplyMigrations => apply_pending_database_migrations(configuration).await?,
        Cli::ExpireAllSessions => expire_all_sessions(configuration).await?,
        Cli::SetPassword { username, password } => {
            set_password(username, password, configuration).await?
        }
        Cli::RunInternalIntegrationTests => run_internal_integration_tests(configuration).await?,
    }

    Ok(())
}

#[instrument(err, skip(configuration))]
async fn run_wordbook_backend(configuration: &Configuration) -> WordbookResult<()> {
    debug!("Running wordbook backend with configuration: {configuration:#?}");

    if has_missing_migrations(configuration)? {
        return Err(WordbookError::DatabaseMigration {
            source: "the database has missing migrations, run the apply-migrations command first"
                .into(),
        });
    }

    let database_connection_pool = create_async_database_connection_pool(configuration).await?;

    let do_shutdown = Arc::new(atomic::AtomicBool::new(false));

    let job_queue_join_handle = spawn_job_queue_runner(
        &database_connection_pool,
        do_shutdown.clone(),
        configuration,
    )
    .await?;

    run_web_api(database_connection_pool, configuration).await?;

    info!("Shutting down...");
    do_shutdown.store(true, atomic::Ordering::Relaxed);

    info!(
        "Waiting up to {}s for asynchronous tasks to finish...",
        configuration.shutdown_timeout.num_seconds()
    );
    let shutdown_timeout = configuration.shutdown_timeout.to_std().unwrap_or_default();
    match tokio::time::timeout(shutdown_timeout, job_queue_join_handle).await {
        Ok(join_result) => join_result.map_err(|error| WordbookError::TokioTaskJoin {
            source: Box::new(error),
        })??,
        Err(_) => warn!("Job queue did not shut down in time"),
    }

    Ok(())
}

#[instrument(err, skip(configuration))]
async fn apply_pending_database_migrations(configuration: &Configuration) -> WordbookResult<()> {
    if has_missing_migrations(configuration)? {
        info!("Executing missing database migrations");
        run_migrations(configuration)?;
        info!("Success!");
    } else {
        info!("No missing migrations");
    }

    Ok(())
}

#[instrument(err, skip(configuration))]
async fn expire_all_sessions(configuration: &Configuration) -> WordbookResult<()> {
    let database_connection_pool = create_async_database_connection_pool(configuration).await?;

    let expired_sessions = database_connection_pool
        .execute_read_committed_transaction::<_, WordbookError>(
            |database_connection| {
                Box::pin(async {
                    use crate::database::schema::sessions::dsl::*;

                    let expired_sessions: usize =
                        diesel::delete(sessions).execute(database_connection).await?;
                    Ok(expired_sessions)
                })
            },
            configuration.maximum_transaction_retry_count,
        )
        .await
        .map_err(|error| WordbookError::ExpireAllSessions {
            source: Box::new(error),
        })?;

    info!("Expired {expired_sessions} sessions");
    Ok(())
}

#[instrument(err, skip(password, configuration))]
async fn set_password(
    username: String,
    password: Option<SecureString>,
    configuration: &Configuration,
) -> WordbookResult<()> {
    let password = if let Some(password) = password {
        password
    } else {
        let mut password = String::new();
        stdin().read_to_string(&mut password).await.map_err(|error| {
            WordbookError::ReadPasswordFromStdin {
                source: Box::new(error),
            }
        })?;
        SecureString::from(password.trim_end_matches(['\r', '\n']).to_string())
    };
    configuration
        .verify_password_length(&password)
        .map_err(|error| WordbookError::SetPassword {
            username: username.clone(),
            source: Box::new(error),
        })?;

    let password_hash = String::from(PasswordHash::new(&password, configuration)?);

    let database_connection_pool = create_async_database_connection_pool(configuration).await?;

    let name = username.as_str();
    let password_hash = password_hash.as_str();
    let updated_rows = database_connection_pool
        .execute_transaction_with_retries::<_, WordbookError>(
            move |database_connection| {
                Box::pin(async move {
                    use crate::database::schema::users;
                    use diesel::{ExpressionMethods, QueryDsl};

                    let updated_rows: usize = diesel::update(users::table)
                        .filter(users::name.eq(name))
                        .set(users::password_hash.eq(Some(password_hash)))
                        .execute(database_connection)
                        .await?;
                    Ok(updated_rows)
                })
            },
            configuration.maximum_transaction_retry_count,
        )
        .await?;

    if updated_rows == 0 {
        return Err(WordbookError::SetPassword {
            username,
            source: "no user with this name exists".into(),
        });
    }

    info!("Updated password of user {username:?}");
    Ok(())
}
