use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::workflows::enrollment::{ClassificationPolicy, PolicyError, TransitionStatus};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub database: DatabaseConfig,
    pub locale: String,
    pub grading: ClassificationPolicy,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let locale = env::var("APP_LOCALE").unwrap_or_else(|_| "pt-PT".to_string());

        let database = DatabaseConfig {
            path: env::var("APP_DATABASE_PATH")
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            database,
            locale,
            grading: load_grading_policy()?,
        })
    }
}

fn load_grading_policy() -> Result<ClassificationPolicy, ConfigError> {
    let defaults = ClassificationPolicy::default();

    let pass_mark = optional_number("ENROLLMENT_PASS_MARK")?.unwrap_or(defaults.pass_mark);
    let conditional_mark = optional_number("ENROLLMENT_CONDITIONAL_MARK")?;
    let scale_max = optional_number("ENROLLMENT_GRADE_SCALE_MAX")?.unwrap_or(defaults.scale_max);

    let exam_statuses = match env::var("ENROLLMENT_EXAM_STATUSES") {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| {
                TransitionStatus::parse(value)
                    .ok_or_else(|| ConfigError::InvalidExamStatus(value.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Err(_) => defaults.exam_statuses,
    };

    let policy = ClassificationPolicy {
        pass_mark,
        conditional_mark,
        scale_max,
        exam_statuses,
    };
    policy.validate().map_err(ConfigError::InvalidPolicy)?;
    Ok(policy)
}

fn optional_number(key: &'static str) -> Result<Option<f64>, ConfigError> {
    match env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(None),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// SQLite location; `None` keeps the store in memory.
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    pub path: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
    InvalidExamStatus(String),
    InvalidPolicy(PolicyError),
    MissingDatabasePath,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => write!(f, "{key} must be a decimal number"),
            ConfigError::InvalidExamStatus(value) => write!(
                f,
                "ENROLLMENT_EXAM_STATUSES contains unknown status '{value}'"
            ),
            ConfigError::InvalidPolicy(err) => write!(f, "invalid grading policy: {err}"),
            ConfigError::MissingDatabasePath => {
                write!(f, "no database given; pass --database or set APP_DATABASE_PATH")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPolicy(err) => Some(err),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidExamStatus(_)
            | ConfigError::MissingDatabasePath => None,
        }
    }
}
