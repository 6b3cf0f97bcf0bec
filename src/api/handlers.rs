use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::{HealthResponse, LanguagesResponse, TtsRequest, VoicesResponse};
use crate::api::routes::AppState;
use crate::error::AppError;
use crate::tts;

pub async fn text_to_speech(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TtsRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    // Model availability wins over body problems
    let engine = state.tts.engine()?;

    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    // Inference is CPU bound; keep it off the async workers
    let wav = tokio::task::spawn_blocking(move || {
        tts::speak(
            engine.as_ref(),
            &request.text,
            &request.voice,
            request.speed,
            &request.lang,
        )
    })
    .await
    .map_err(|e| AppError::TtsError(e.to_string()))??;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "audio/wav"),
            (header::CACHE_CONTROL, "public, max-age=86400"),
        ],
        wav,
    )
        .into_response())
}

pub async fn list_voices(
    State(state): State<Arc<AppState>>,
) -> Result<Json<VoicesResponse>, AppError> {
    let voices = state.tts.list_voices()?;
    Ok(Json(VoicesResponse { voices }))
}

pub async fn list_languages(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LanguagesResponse>, AppError> {
    let languages = state.tts.list_languages()?;
    Ok(Json(LanguagesResponse { languages }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model_loaded: state.tts.is_loaded(),
    })
}
