use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::AffectedApplications;
use super::effect::EffectCalculator;

/// Body accepted by the effect endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct EffectRequest {
    pub record: AffectedApplications,
    /// Falls back to the step result's stored score.
    #[serde(default)]
    pub new_score: Option<f64>,
}

/// Router exposing the calculator over HTTP. It needs no CRM access.
pub fn effect_router(calculator: Arc<EffectCalculator>) -> Router {
    Router::new()
        .route("/api/v1/step-results/effects", post(effect_handler))
        .with_state(calculator)
}

pub(crate) async fn effect_handler(
    State(calculator): State<Arc<EffectCalculator>>,
    axum::Json(request): axum::Json<EffectRequest>,
) -> Response {
    let Some(new_score) = request.new_score.or(request.record.step_result.score) else {
        let payload = json!({
            "error": "new_score is required when the step result has no stored score",
        });
        return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
    };

    let effect = calculator.calculate(&request.record, new_score);
    (StatusCode::OK, axum::Json(effect)).into_response()
}
