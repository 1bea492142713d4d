use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

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
    pub salesforce: SalesforceConfig,
    pub reconciliation: ReconciliationConfig,
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

        let salesforce = SalesforceConfig {
            instance_url: env::var("SF_INSTANCE_URL").ok().filter(|v| !v.trim().is_empty()),
            access_token: env::var("SF_ACCESS_TOKEN").ok().filter(|v| !v.trim().is_empty()),
            api_version: env::var("SF_API_VERSION").unwrap_or_else(|_| "59.0".to_string()),
        };

        let query_batch_size = parse_var("ASR_QUERY_BATCH_SIZE", 20usize)?;
        if query_batch_size == 0 {
            return Err(ConfigError::InvalidNumber {
                name: "ASR_QUERY_BATCH_SIZE",
            });
        }

        let reconciliation = ReconciliationConfig {
            query_batch_size,
            causation_tolerance_minutes: parse_var("ASR_CAUSATION_TOLERANCE_MINUTES", 0u32)?,
            restore_settle: Duration::from_millis(parse_var("ASR_RESTORE_SETTLE_MS", 1000u64)?),
            reject_settle: Duration::from_millis(parse_var("ASR_REJECT_SETTLE_MS", 500u64)?),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            salesforce,
            reconciliation,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { name }),
        _ => Ok(default),
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Connection details for the CRM REST API. Both values are only required by the
/// commands that talk to the CRM.
#[derive(Debug, Clone)]
pub struct SalesforceConfig {
    pub instance_url: Option<String>,
    pub access_token: Option<String>,
    pub api_version: String,
}

impl SalesforceConfig {
    pub fn credentials(&self) -> Result<(&str, &str), ConfigError> {
        let instance_url = self
            .instance_url
            .as_deref()
            .ok_or(ConfigError::Missing("SF_INSTANCE_URL"))?;
        let access_token = self
            .access_token
            .as_deref()
            .ok_or(ConfigError::Missing("SF_ACCESS_TOKEN"))?;
        Ok((instance_url, access_token))
    }
}

/// Knobs for the finder, calculator and executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationConfig {
    pub query_batch_size: usize,
    /// Largest rounded minute gap between the step result failing and the application
    /// being rejected that still counts as the same batch.
    pub causation_tolerance_minutes: u32,
    pub restore_settle: Duration,
    pub reject_settle: Duration,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            query_batch_size: 20,
            causation_tolerance_minutes: 0,
            restore_settle: Duration::from_millis(1000),
            reject_settle: Duration::from_millis(500),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { name: &'static str },
    Missing(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { name } => {
                write!(f, "{name} must be a positive whole number")
            }
            ConfigError::Missing(name) => write!(f, "{name} must be set"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::Missing(_) => None,
        }
    }
}
