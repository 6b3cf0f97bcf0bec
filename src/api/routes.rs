use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use crate::tts::TtsService;

pub struct AppState {
    pub tts: TtsService,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    // Wildcards cannot be combined with credentials, so mirror the request
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    Router::new()
        .route("/voices", get(handlers::list_voices))
        .route("/languages", get(handlers::list_languages))
        .route("/tts", post(handlers::text_to_speech))
        .route("/health", get(handlers::health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::testing::StubEngine;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        response::Response,
    };
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    fn loaded() -> Router {
        engine_app(StubEngine::default())
    }

    fn engine_app(engine: StubEngine) -> Router {
        create_router(Arc::new(AppState {
            tts: TtsService::with_engine(Arc::new(engine)),
        }))
    }

    fn unloaded() -> Router {
        create_router(Arc::new(AppState {
            tts: TtsService::unloaded(),
        }))
    }

    async fn get_path(app: Router, path: &str) -> Response {
        app.oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn post_tts(app: Router, body: &str) -> Response {
        app.oneshot(
            Request::post("/tts")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn health_reports_unloaded_model() {
        let response = get_path(unloaded(), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["model_loaded"], false);
    }

    #[tokio::test]
    async fn health_reports_loaded_model() {
        let json = body_json(get_path(loaded(), "/health").await).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["model_loaded"], true);
    }

    #[tokio::test]
    async fn catalogs_unavailable_without_model() {
        for path in ["/voices", "/languages"] {
            let response = get_path(unloaded(), path).await;
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
            let json = body_json(response).await;
            assert_eq!(json["code"], "MODEL_NOT_LOADED");
        }
    }

    #[tokio::test]
    async fn voices_are_sorted() {
        let response = get_path(loaded(), "/voices").await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(
            json,
            serde_json::json!({"voices": ["af_heart", "am_adam", "bf_emma"]})
        );
    }

    #[tokio::test]
    async fn languages_are_sorted() {
        let response = get_path(loaded(), "/languages").await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(
            json,
            serde_json::json!({"languages": ["cmn", "en-gb", "en-us"]})
        );
    }

    #[tokio::test]
    async fn tts_returns_wav() {
        let response = post_tts(
            loaded(),
            r#"{"text": "Hello world", "voice": "af_heart", "speed": 1.0, "lang": "en-us"}"#,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "public, max-age=86400"
        );
        let body = body_bytes(response).await;
        assert!(!body.is_empty());
        assert_eq!(&body[..4], b"RIFF");
    }

    #[tokio::test]
    async fn tts_wav_carries_engine_sample_rate() {
        let app = engine_app(StubEngine {
            sample_rate: 16000,
            ..StubEngine::default()
        });
        let body = body_bytes(post_tts(app, r#"{"text": "Hello"}"#).await).await;
        let rate = u32::from_le_bytes([body[24], body[25], body[26], body[27]]);
        assert_eq!(rate, 16000);
    }

    #[tokio::test]
    async fn tts_unavailable_without_model_regardless_of_body() {
        for body in [r#"{"text": "Hello"}"#, "not json", "{}"] {
            let response = post_tts(unloaded(), body).await;
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
    }

    #[tokio::test]
    async fn tts_engine_failure_is_500_with_message() {
        let app = engine_app(StubEngine {
            fail_with: Some("onnx session exploded".into()),
            ..StubEngine::default()
        });
        let response = post_tts(app, r#"{"text": "Hello"}"#).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["code"], "TTS_ERROR");
        let message = json["error"].as_str().unwrap();
        assert!(message.contains("onnx session exploded"));
        assert!(message.starts_with("TTS generation failed"));
    }

    #[tokio::test]
    async fn tts_unknown_voice_is_500() {
        let response = post_tts(loaded(), r#"{"text": "Hello", "voice": "zz_nobody"}"#).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("zz_nobody"));
    }

    #[tokio::test]
    async fn tts_missing_text_is_rejected_by_extractor() {
        let response = post_tts(loaded(), r#"{"voice": "af_heart"}"#).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn cors_allows_any_origin_with_credentials() {
        let response = loaded()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/tts")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "POST");
    }
}
