use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use engine_logging::{engine_info, engine_warn};
use futures_util::{Stream, StreamExt};
use media_core::{
    DownloadRequestBody, MediaCandidate, MediaKind, RetrievalRequest, SniffEvent, Strategy,
};
use media_engine::{Orchestrator, ProgressBroadcaster, RetrievalOutcome};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

pub const NO_CANDIDATES_MESSAGE: &str = "no media URL found";
pub const UNSUPPORTED_MESSAGE: &str = "unsupported media format";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub broadcaster: ProgressBroadcaster,
}

/// Body of every `/api/download` reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Strategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pick: Option<MediaCandidate>,
}

impl DownloadResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

pub fn router(state: AppState) -> Router {
    // The browser extension calls from its own origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/download", post(download))
        .route("/api/progress", get(progress))
        .route("/api/sniff", post(sniff))
        .layer(cors)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn download(
    State(state): State<AppState>,
    body: Result<Json<DownloadRequestBody>, JsonRejection>,
) -> (StatusCode, Json<DownloadResponse>) {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            engine_warn!("unreadable download request: {}", rejection.body_text());
            return (
                StatusCode::BAD_REQUEST,
                Json(DownloadResponse::failure(rejection.body_text())),
            );
        }
    };
    let request = match RetrievalRequest::try_from(body) {
        Ok(request) => request,
        Err(err) => {
            engine_warn!("rejected download request: {}", err);
            return (
                StatusCode::BAD_REQUEST,
                Json(DownloadResponse::failure(err.to_string())),
            );
        }
    };

    let outcome = state.orchestrator.retrieve(&request).await;
    let (status, response) = respond(outcome);
    engine_info!("download request finished status={} ok={}", status, response.ok);
    (status, Json(response))
}

/// Map a retrieval outcome to its HTTP status and reply body.
pub fn respond(outcome: RetrievalOutcome) -> (StatusCode, DownloadResponse) {
    match outcome {
        RetrievalOutcome::Transferred(report) => (
            StatusCode::OK,
            DownloadResponse {
                ok: true,
                mode: Some(report.strategy),
                file: Some(report.file.display().to_string()),
                log: Some(report.log.join("\n")),
                referer: report.referer,
                ..DownloadResponse::default()
            },
        ),
        RetrievalOutcome::TransferFailed(failure) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            DownloadResponse {
                ok: false,
                mode: Some(failure.strategy),
                message: Some(failure.message()),
                log: Some(failure.log.join("\n")),
                referer: failure.referer,
                ..DownloadResponse::default()
            },
        ),
        RetrievalOutcome::NoCandidates => {
            (StatusCode::OK, DownloadResponse::failure(NO_CANDIDATES_MESSAGE))
        }
        RetrievalOutcome::Unsupported(candidate) => (
            StatusCode::OK,
            DownloadResponse {
                pick: Some(candidate),
                ..DownloadResponse::failure(UNSUPPORTED_MESSAGE)
            },
        ),
        RetrievalOutcome::ExtractionFailed(err) => (
            StatusCode::BAD_GATEWAY,
            DownloadResponse::failure(format!("failed to fetch page: {err}")),
        ),
    }
}

/// Verdict on one request the host's browser view observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SniffReply {
    pub media: bool,
    pub kind: MediaKind,
}

/// Lets the host shell filter its captured network traffic with the same
/// rules the engine classifies by.
async fn sniff(Json(event): Json<SniffEvent>) -> Json<SniffReply> {
    Json(SniffReply {
        media: event.is_media_request(),
        kind: event.kind(),
    })
}

/// Server-sent progress feed. The subscription lives as long as the
/// response body, so a disconnect unsubscribes.
async fn progress(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let subscription = state.broadcaster.subscribe();
    engine_info!("progress subscriber {} connected", subscription.id());
    let events = subscription
        .into_stream()
        .map(|event| Event::default().json_data(event));
    Sse::new(events).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use futures_util::StreamExt;
    use media_core::{MediaCandidate, MediaKind, Strategy};
    use media_engine::{
        EngineConfig, FailureKind, FetchError, Orchestrator, ProgressBroadcaster, ProgressEvent,
        RetrievalOutcome, TransferError, TransferFailure,
    };
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::{respond, router, AppState, DownloadResponse, SniffReply};

    fn app(dir: &TempDir) -> (axum::Router, ProgressBroadcaster) {
        let broadcaster = ProgressBroadcaster::new();
        let orchestrator = Orchestrator::new(
            EngineConfig::default_with_output(dir.path()),
            broadcaster.clone(),
        );
        let state = AppState {
            orchestrator: Arc::new(orchestrator),
            broadcaster: broadcaster.clone(),
        };
        (router(state), broadcaster)
    }

    fn post_download(json: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/download")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    async fn read_reply(response: axum::response::Response) -> DownloadResponse {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_answers_ok_with_cors() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, "chrome-extension://abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn missing_url_is_a_bad_request() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir);
        let response = app
            .oneshot(post_download(r#"{"mode":"auto","url":"   "}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let reply = read_reply(response).await;
        assert_eq!(reply, DownloadResponse::failure("url is required"));
    }

    #[tokio::test]
    async fn unknown_mode_is_a_bad_request() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir);
        let response = app
            .oneshot(post_download(
                r#"{"url":"https://site.example/a.mp4","mode":"torrent"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!read_reply(response).await.ok);
    }

    #[tokio::test]
    async fn unreadable_bodies_get_structured_bad_requests() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir);

        for json in ["this is not json", r#"{"url":5}"#] {
            let response = app.clone().oneshot(post_download(json)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{json}");
            assert_eq!(
                response.headers()[header::CONTENT_TYPE],
                "application/json"
            );
            let reply = read_reply(response).await;
            assert!(!reply.ok);
            assert!(reply.message.is_some_and(|m| !m.is_empty()));
        }

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/download")
                    .body(Body::from(r#"{"url":"https://site.example/a.mp4"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!read_reply(response).await.ok);
    }

    #[tokio::test]
    async fn sniffed_requests_are_classified() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sniff")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"url":"https://cdn.example/live/index.m3u8?x=1","resourceType":"xhr","method":"GET"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let reply: SniffReply = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            reply,
            SniffReply {
                media: true,
                kind: MediaKind::Manifest,
            }
        );
    }

    #[tokio::test]
    async fn markup_without_media_reports_nothing_found() {
        let dir = TempDir::new().unwrap();
        let (app, _) = app(&dir);
        let response = app
            .oneshot(post_download(
                r#"{"url":"<html><body><p>no video here</p></body></html>"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            read_reply(response).await,
            DownloadResponse::failure("no media URL found")
        );
    }

    #[tokio::test]
    async fn progress_stream_carries_events_until_dropped() {
        let dir = TempDir::new().unwrap();
        let (app, broadcaster) = app(&dir);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/progress")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        assert_eq!(broadcaster.subscriber_count(), 1);

        broadcaster.publish(ProgressEvent::percent(12.6, None));
        let mut body = response.into_body().into_data_stream();
        let chunk = body.next().await.unwrap().unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        assert_eq!(text, "data: {\"pct\":12.6,\"size\":null}\n\n");

        drop(body);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[test]
    fn outcomes_map_to_statuses() {
        let failed = TransferFailure {
            strategy: Strategy::Delegated,
            error: TransferError::DownloaderFailed { code: Some(1) },
            referer: Some("https://site.example/watch".into()),
            log: vec!["yt-dlp download".into(), "yt-dlp failed (code: 1)".into()],
        };
        let (status, reply) = respond(RetrievalOutcome::TransferFailed(failed));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(reply.mode, Some(Strategy::Delegated));
        assert_eq!(reply.message.as_deref(), Some("yt-dlp download failed"));
        assert_eq!(
            reply.log.as_deref(),
            Some("yt-dlp download\nyt-dlp failed (code: 1)")
        );

        let (status, reply) = respond(RetrievalOutcome::ExtractionFailed(FetchError {
            kind: FailureKind::HttpStatus(404),
            message: "404 Not Found".into(),
        }));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(!reply.ok);

        let candidate = MediaCandidate::new(
            "https://player.example/embed/1",
            MediaKind::Unknown,
            "https://site.example/",
        );
        let (status, reply) = respond(RetrievalOutcome::Unsupported(candidate.clone()));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply.message.as_deref(), Some("unsupported media format"));
        assert_eq!(reply.pick, Some(candidate));
    }

    #[test]
    fn replies_omit_absent_fields() {
        let json = serde_json::to_string(&DownloadResponse::failure("no media URL found")).unwrap();
        assert_eq!(json, r#"{"ok":false,"message":"no media URL found"}"#);
    }
}
