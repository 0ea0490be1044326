use std::{env::VarError, error::Error, net::SocketAddr, str::FromStr};

use crate::error::{UserError, WordbookError, WordbookResult};
use chrono::Duration;
use secure_string::SecureString;

/// The configuration of the application.
#[derive(Debug, Clone)]
pub struct Configuration {
    /// The url to access postgres.
    pub postgres_url: SecureString,

    /// The url to send opentelemetry to.
    pub opentelemetry_url: Option<String>,

    /// The amount of time to wait for processes to shutdown gracefully.
    pub shutdown_timeout: Duration,

    /// The interval at which the job queue will be polled.
    pub job_queue_poll_interval: Duration,

    /// The maximum number of retries for a failed transaction.
    pub maximum_transaction_retry_count: u64,

    /// The maximum number of retries when a newly generated session id collides with an existing one.
    pub maximum_session_id_generation_retry_count: u32,

    /// The address to listen for API requests.
    pub api_listen_address: SocketAddr,

    /// How long a session stays valid after it was last used.
    pub session_expiry: Duration,

    /// The interval at which expired sessions are removed from the database.
    pub expired_sessions_deletion_interval: Duration,

    pub minimum_username_length: usize,
    pub maximum_username_length: usize,
    pub minimum_password_length: usize,
    pub maximum_password_length: usize,

    /// A secret that is mixed into every password hash.
    pub password_pepper: SecureString,

    pub password_argon2id_iterations: u32,
    pub password_argon2id_memory_kib: u32,
    pub password_argon2id_parallelism: u32,
}

impl Configuration {
    /// Read the configuration values from environment variables.
    pub fn from_environment() -> WordbookResult<Self> {
        let result = Self {
            postgres_url: read_env_var_with_default(
                "POSTGRES_WORDBOOK_URL",
                "postgres://wordbook@localhost/wordbook",
            )?
            .into(),
            opentelemetry_url: read_optional_env_var("OPENTELEMETRY_URL")?,
            shutdown_timeout: read_env_var_with_default_as_duration(
                "WORDBOOK_SHUTDOWN_TIMEOUT",
                30,
                Duration::try_seconds,
            )?,
            job_queue_poll_interval: read_env_var_with_default_as_duration(
                "JOB_QUEUE_POLL_INTERVAL_SECONDS",
                60,
                Duration::try_seconds,
            )?,
            maximum_transaction_retry_count: read_env_var_with_default_as_type(
                "MAXIMUM_TRANSACTION_RETRY_COUNT",
                10u64,
            )?,
            maximum_session_id_generation_retry_count: read_env_var_with_default_as_type(
                "MAXIMUM_SESSION_ID_GENERATION_RETRY_COUNT",
                10u32,
            )?,
            api_listen_address: read_env_var_with_default_as_type(
                "API_LISTEN_ADDRESS",
                SocketAddr::from(([0, 0, 0, 0], 8093)),
            )?,
            session_expiry: read_env_var_with_default_as_duration(
                "SESSION_EXPIRY_HOURS",
                720,
                Duration::try_hours,
            )?,
            expired_sessions_deletion_interval: read_env_var_with_default_as_duration(
                "EXPIRED_SESSIONS_DELETION_INTERVAL_HOURS",
                24,
                Duration::try_hours,
            )?,
            minimum_username_length: read_env_var_with_default_as_type(
                "MINIMUM_USERNAME_LENGTH",
                1usize,
            )?,
            maximum_username_length: read_env_var_with_default_as_type(
                "MAXIMUM_USERNAME_LENGTH",
                50usize,
            )?,
            minimum_password_length: read_env_var_with_default_as_type(
                "MINIMUM_PASSWORD_LENGTH",
                8usize,
            )?,
            maximum_password_length: read_env_var_with_default_as_type(
                "MAXIMUM_PASSWORD_LENGTH",
                400usize,
            )?,
            password_pepper: read_env_var_with_default(
                "PASSWORD_PEPPER",
                "wordbook-development-pepper",
            )?
            .into(),
            password_argon2id_iterations: read_env_var_with_default_as_type(
                "PASSWORD_ARGON2ID_ITERATIONS",
                2u32,
            )?,
            password_argon2id_memory_kib: read_env_var_with_default_as_type(
                "PASSWORD_ARGON2ID_MEMORY",
                19456u32,
            )?,
            password_argon2id_parallelism: read_env_var_with_default_as_type(
                "PASSWORD_ARGON2ID_PARALLELISM",
                1u32,
            )?,
        };

        result.verify()?;
        Ok(result)
    }

    fn verify(&self) -> WordbookResult<()> {
        if self.minimum_username_length > self.maximum_username_length {
            return Err(WordbookError::InvalidConfiguration {
                description: "minimum username length is larger than maximum username length"
                    .to_string(),
            });
        }

        if self.minimum_password_length > self.maximum_password_length {
            return Err(WordbookError::InvalidConfiguration {
                description: "minimum password length is larger than maximum password length"
                    .to_string(),
            });
        }

        if self.session_expiry <= Duration::zero() {
            return Err(WordbookError::InvalidConfiguration {
                description: "session expiry must be positive".to_string(),
            });
        }

        self.build_argon2_parameters()?;
        Ok(())
    }

    /// Check that the username has an allowed amount of unicode characters.
    pub fn verify_username_length(&self, username: &str) -> Result<(), UserError> {
        let actual = username.chars().count();
        if actual < self.minimum_username_length || actual > self.maximum_username_length {
            Err(UserError::UsernameLength {
                actual,
                minimum: self.minimum_username_length,
                maximum: self.maximum_username_length,
            })
        } else {
            Ok(())
        }
    }

    /// Check that the password has an allowed amount of unicode characters.
    pub fn verify_password_length(&self, password: &SecureString) -> Result<(), UserError> {
        let actual = password.unsecure().chars().count();
        if actual < self.minimum_password_length || actual > self.maximum_password_length {
            Err(UserError::PasswordLength {
                actual,
                minimum: self.minimum_password_length,
                maximum: self.maximum_password_length,
            })
        } else {
            Ok(())
        }
    }

    pub fn build_argon2_parameters(&self) -> WordbookResult<argon2::Params> {
        argon2::Params::new(
            self.password_argon2id_memory_kib,
            self.password_argon2id_iterations,
            self.password_argon2id_parallelism,
            None,
        )
        .map_err(|error| WordbookError::PasswordArgon2IdParameters {
            source: Box::new(error),
        })
    }

    /// A configuration with the default value of every setting, for tests.
    #[cfg(test)]
    pub fn test_configuration() -> Self {
        Self {
            postgres_url: "postgres://wordbook@localhost/wordbook".into(),
            opentelemetry_url: None,
            shutdown_timeout: Duration::seconds(30),
            job_queue_poll_interval: Duration::seconds(60),
            maximum_transaction_retry_count: 10,
            maximum_session_id_generation_retry_count: 10,
            api_listen_address: SocketAddr::from(([127, 0, 0, 1], 8093)),
            session_expiry: Duration::hours(720),
            expired_sessions_deletion_interval: Duration::hours(24),
            minimum_username_length: 1,
            maximum_username_length: 50,
            minimum_password_length: 8,
            maximum_password_length: 400,
            password_pepper: "test-pepper".into(),
            // cheap parameters to keep the tests fast
            password_argon2id_iterations: 1,
            password_argon2id_memory_kib: 1024,
            password_argon2id_parallelism: 1,
        }
    }
}

impl AsRef<Configuration> for Configuration {
    fn as_ref(&self) -> &Configuration {
        self
    }
}

fn read_optional_env_var(key: &str) -> WordbookResult<Option<String>> {
    match std::env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(value)) => Err(WordbookError::MalformedEnvironmentVariable {
            key: key.to_string(),
            value: value.clone(),
            source: Box::new(VarError::NotUnicode(value)),
        }),
    }
}

fn read_env_var_with_default(key: &str, default: impl Into<String>) -> WordbookResult<String> {
    Ok(read_optional_env_var(key)?.unwrap_or_else(|| default.into()))
}

fn read_env_var_with_default_as_type<T: FromStr>(
    key: &str,
    default: impl Into<T>,
) -> WordbookResult<T>
where
    <T as FromStr>::Err: 'static + Error + Send + Sync,
{
    match read_optional_env_var(key)? {
        Some(value) => parse_env_var_value(key, value),
        None => Ok(default.into()),
    }
}

/// Read a number of time units, for example hours, and convert it with `unit`.
fn read_env_var_with_default_as_duration(
    key: &str,
    default: i64,
    unit: fn(i64) -> Option<Duration>,
) -> WordbookResult<Duration> {
    let amount = read_env_var_with_default_as_type(key, default)?;
    duration_from_amount(key, amount, unit)
}

#[derive(Debug, thiserror::Error)]
#[error("the duration is negative or too large")]
struct DurationOutOfRange;

fn duration_from_amount(
    key: &str,
    amount: i64,
    unit: fn(i64) -> Option<Duration>,
) -> WordbookResult<Duration> {
    unit(amount)
        .filter(|_| amount >= 0)
        .ok_or_else(|| WordbookError::MalformedEnvironmentVariable {
            key: key.to_string(),
            value: amount.to_string().into(),
            source: Box::new(DurationOutOfRange),
        })
}

fn parse_env_var_value<T: FromStr>(key: &str, value: String) -> WordbookResult<T>
where
    <T as FromStr>::Err: 'static + Error + Send + Sync,
{
    value
        .parse()
        .map_err(|error| WordbookError::MalformedEnvironmentVariable {
            key: key.to_string(),
            value: value.into(),
            source: Box::new(error),
        })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::{duration_from_amount, parse_env_var_value, Configuration};
    use crate::error::{UserError, WordbookError};

    #[test]
    fn test_parse_env_var_value() {
        let port: u16 = parse_env_var_value("PORT", "8093".to_string()).unwrap();
        assert_eq!(port, 8093);

        let error = parse_env_var_value::<u16>("PORT", "eighty".to_string()).unwrap_err();
        assert!(matches!(
            error,
            WordbookError::MalformedEnvironmentVariable { key, .. } if key == "PORT"
        ));
    }

    #[test]
    fn test_durations_out_of_range_are_rejected() {
        assert_eq!(
            duration_from_amount("SESSION_EXPIRY_HOURS", 720, Duration::try_hours).unwrap(),
            Duration::days(30)
        );
        assert!(matches!(
            duration_from_amount("SESSION_EXPIRY_HOURS", i64::MAX / 1000, Duration::try_hours),
            Err(WordbookError::MalformedEnvironmentVariable { key, .. })
                if key == "SESSION_EXPIRY_HOURS"
        ));
        assert!(matches!(
            duration_from_amount("WORDBOOK_SHUTDOWN_TIMEOUT", i64::MAX, Duration::try_seconds),
            Err(WordbookError::MalformedEnvironmentVariable { .. })
        ));
        assert!(matches!(
            duration_from_amount("JOB_QUEUE_POLL_INTERVAL_SECONDS", -1, Duration::try_seconds),
            Err(WordbookError::MalformedEnvironmentVariable { .. })
        ));
    }

    #[test]
    fn test_default_configuration_is_valid() {
        Configuration::test_configuration().verify().unwrap();
    }

    #[test]
    fn test_inverted_length_bounds_are_rejected() {
        let mut configuration = Configuration::test_configuration();
        configuration.minimum_password_length = 100;
        configuration.maximum_password_length = 10;
        assert!(matches!(
            configuration.verify(),
            Err(WordbookError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_username_length_counts_characters() {
        let mut configuration = Configuration::test_configuration();
        configuration.maximum_username_length = 3;
        assert!(configuration.verify_username_length("単語帳").is_ok());
        assert_eq!(
            configuration.verify_username_length("単語帳s"),
            Err(UserError::UsernameLength {
                actual: 4,
                minimum: 1,
                maximum: 3
            })
        );
        assert!(configuration.verify_username_length("").is_err());
    }

    #[test]
    fn test_password_length() {
        let configuration = Configuration::test_configuration();
        assert!(configuration
            .verify_password_length(&"short".into())
            .is_err());
        assert!(configuration
            .verify_password_length(&"long enough".into())
            .is_ok());
    }
}
