use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::step_results::{ExecutorError, FileError, GatewayError, PlannerError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Files(FileError),
    Crm(GatewayError),
    Planning(PlannerError),
    Execution(ExecutorError),
    Task(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Files(err) => write!(f, "file error: {}", err),
            AppError::Crm(err) => write!(f, "crm error: {}", err),
            AppError::Planning(err) => write!(f, "planning failed: {}", err),
            AppError::Execution(err) => write!(f, "applying actions failed: {}", err),
            AppError::Task(detail) => write!(f, "background task failed: {}", detail),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Files(err) => Some(err),
            AppError::Crm(err) => Some(err),
            AppError::Planning(err) => Some(err),
            AppError::Execution(err) => Some(err),
            AppError::Task(_) => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Files(_) => StatusCode::BAD_REQUEST,
            AppError::Crm(_) | AppError::Planning(_) | AppError::Execution(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<FileError> for AppError {
    fn from(value: FileError) -> Self {
        Self::Files(value)
    }
}

impl From<GatewayError> for AppError {
    fn from(value: GatewayError) -> Self {
        Self::Crm(value)
    }
}

impl From<PlannerError> for AppError {
    fn from(value: PlannerError) -> Self {
        Self::Planning(value)
    }
}

impl From<ExecutorError> for AppError {
    fn from(value: ExecutorError) -> Self {
        Self::Execution(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crm_failures_map_to_bad_gateway() {
        let error = AppError::from(GatewayError::Transport("timed out".to_string()));
        assert!(error.to_string().contains("timed out"));
        assert_eq!(error.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn missing_config_maps_to_internal_error() {
        let error = AppError::from(ConfigError::Missing("SF_ACCESS_TOKEN"));
        assert_eq!(
            error.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
