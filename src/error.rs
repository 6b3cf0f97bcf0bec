use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::tts::EngineError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Model not loaded: {0}")]
    ModelNotLoaded(String),

    #[error("TTS generation failed: {0}")]
    TtsError(String),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        AppError::TtsError(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::ModelNotLoaded(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "MODEL_NOT_LOADED",
                msg.clone(),
            ),
            AppError::TtsError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "TTS_ERROR",
                format!("TTS generation failed: {}", msg),
            ),
        };

        tracing::error!("Request failed: {} - {}", code, message);

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}
