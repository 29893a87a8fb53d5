use std::sync::{Arc, Mutex};

use media_core::{MediaKind, Mode, RetrievalRequest, Strategy};
use media_engine::{
    EngineConfig, FetchSettings, LineSink, OutputLine, Orchestrator, ProcessExit,
    ProcessInvocation, ProcessRunner, ProgressBroadcaster, ReqwestPageFetcher, RetrievalOutcome,
    TransferError,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Succeeds without running anything; remembers each invocation.
#[derive(Default)]
struct RecordingRunner {
    seen: Mutex<Vec<ProcessInvocation>>,
}

#[async_trait::async_trait]
impl ProcessRunner for RecordingRunner {
    async fn run(
        &self,
        invocation: &ProcessInvocation,
        sink: &dyn LineSink,
    ) -> Result<ProcessExit, TransferError> {
        self.seen.lock().unwrap().push(invocation.clone());
        sink.line(OutputLine::Stdout("[download] 100.0% of 1.00MiB".into()));
        Ok(ProcessExit { code: Some(0) })
    }
}

struct Harness {
    orchestrator: Orchestrator,
    runner: Arc<RecordingRunner>,
    dir: TempDir,
}

fn harness() -> Harness {
    engine_logging::initialize_for_tests();
    let dir = TempDir::new().unwrap();
    let config = EngineConfig::default_with_output(dir.path().join("downloads"));
    let runner = Arc::new(RecordingRunner::default());
    let orchestrator = Orchestrator::with_components(
        config,
        Arc::new(ReqwestPageFetcher::new(FetchSettings::default())),
        runner.clone(),
        ProgressBroadcaster::new(),
    );
    Harness {
        orchestrator,
        runner,
        dir,
    }
}

async fn serve(server: &MockServer, at: &str, status: u16, body: &str, content_type: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(status).set_body_raw(body.to_string(), content_type))
        .mount(server)
        .await;
}

#[tokio::test]
async fn page_without_media_yields_no_candidates() {
    let h = harness();
    let server = MockServer::start().await;
    serve(&server, "/article", 200, "<html><p>text only</p></html>", "text/html").await;

    let outcome = h
        .orchestrator
        .retrieve(&RetrievalRequest::new(format!("{}/article", server.uri()), Mode::Auto))
        .await;

    assert_eq!(outcome, RetrievalOutcome::NoCandidates);
    assert!(h.runner.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn manifest_in_page_script_is_delegated_with_page_referer() {
    let h = harness();
    let server = MockServer::start().await;
    serve(
        &server,
        "/watch/42",
        200,
        r#"<script>window.cfg = {"hls":"https:\/\/cdn.example\/live\/master.m3u8?token=abc"};</script>"#,
        "text/html",
    )
    .await;
    let page = format!("{}/watch/42", server.uri());

    let outcome = h
        .orchestrator
        .retrieve(&RetrievalRequest::new(page.clone(), Mode::Auto).with_file_name("show"))
        .await;

    let RetrievalOutcome::Transferred(report) = outcome else {
        panic!("expected a transfer, got {outcome:?}");
    };
    assert_eq!(report.strategy, Strategy::Delegated);
    assert_eq!(report.referer.as_deref(), Some(page.as_str()));
    assert_eq!(report.file, h.dir.path().join("downloads").join("show.mp4"));

    let seen = h.runner.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0].args.last().map(String::as_str),
        Some("https://cdn.example/live/master.m3u8?token=abc")
    );
    assert!(seen[0].args.contains(&format!("Referer:{page}")));
}

#[tokio::test]
async fn direct_file_url_is_downloaded_into_the_output_dir() {
    let h = harness();
    let server = MockServer::start().await;
    serve(&server, "/media/trailer.webm", 200, "webm-bytes", "video/webm").await;

    let outcome = h
        .orchestrator
        .retrieve(&RetrievalRequest::new(
            format!("{}/media/trailer.webm?sig=1", server.uri()),
            Mode::Auto,
        ))
        .await;

    let RetrievalOutcome::Transferred(report) = outcome else {
        panic!("expected a transfer, got {outcome:?}");
    };
    assert_eq!(report.strategy, Strategy::Direct);
    let expected = h.dir.path().join("downloads").join("trailer.webm");
    assert_eq!(report.file, expected);
    assert_eq!(std::fs::read_to_string(expected).unwrap(), "webm-bytes");
}

#[tokio::test]
async fn pasted_markup_is_downloaded_directly() {
    let h = harness();
    let server = MockServer::start().await;
    serve(&server, "/v/clip.mp4", 200, "mp4-bytes", "video/mp4").await;
    let markup = format!(r#"<video src="{}/v/clip.mp4"></video>"#, server.uri());

    let outcome = h
        .orchestrator
        .retrieve(&RetrievalRequest::new(markup, Mode::Auto))
        .await;

    let RetrievalOutcome::Transferred(report) = outcome else {
        panic!("expected a transfer, got {outcome:?}");
    };
    assert_eq!(report.strategy, Strategy::Direct);
    assert_eq!(report.file, h.dir.path().join("downloads").join("video.mp4"));
}

#[tokio::test]
async fn unreachable_page_reports_nothing_found_in_auto_mode() {
    let h = harness();
    let server = MockServer::start().await;
    serve(&server, "/gone", 404, "", "text/html").await;

    let outcome = h
        .orchestrator
        .retrieve(&RetrievalRequest::new(format!("{}/gone", server.uri()), Mode::Auto))
        .await;

    assert_eq!(outcome, RetrievalOutcome::NoCandidates);
    assert!(h.runner.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn refused_connection_reports_nothing_found() {
    let h = harness();

    let outcome = h
        .orchestrator
        .retrieve(&RetrievalRequest::new("http://127.0.0.1:1/watch", Mode::Auto))
        .await;

    assert_eq!(outcome, RetrievalOutcome::NoCandidates);
}

#[tokio::test]
async fn forced_direct_mode_falls_back_to_nothing_found() {
    let h = harness();
    let server = MockServer::start().await;
    serve(&server, "/gone", 404, "", "text/html").await;

    let outcome = h
        .orchestrator
        .retrieve(&RetrievalRequest::new(format!("{}/gone", server.uri()), Mode::Direct))
        .await;

    assert_eq!(outcome, RetrievalOutcome::NoCandidates);
}

#[tokio::test]
async fn forced_ytdlp_mode_hands_page_urls_to_the_downloader() {
    let h = harness();

    let outcome = h
        .orchestrator
        .retrieve(&RetrievalRequest::new(
            "https://video.example/watch?v=abc",
            Mode::Ytdlp,
        ))
        .await;

    assert!(outcome.is_success(), "{outcome:?}");
    let seen = h.runner.seen.lock().unwrap();
    assert!(seen[0]
        .args
        .contains(&"Referer:https://video.example/watch?v=abc".to_string()));
}

#[tokio::test]
async fn embedded_player_is_unsupported() {
    let h = harness();
    let server = MockServer::start().await;
    serve(
        &server,
        "/post",
        200,
        r#"<meta name="twitter:player" content="https://player.example/embed/7">"#,
        "text/html",
    )
    .await;

    let outcome = h
        .orchestrator
        .retrieve(&RetrievalRequest::new(format!("{}/post", server.uri()), Mode::Auto))
        .await;

    let RetrievalOutcome::Unsupported(candidate) = outcome else {
        panic!("expected unsupported, got {outcome:?}");
    };
    assert_eq!(candidate.url, "https://player.example/embed/7");
    assert_eq!(candidate.kind, MediaKind::Unknown);
    assert!(h.runner.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unusable_download_dir_fails_the_transfer() {
    engine_logging::initialize_for_tests();
    let dir = TempDir::new().unwrap();
    let blocked = dir.path().join("downloads");
    std::fs::write(&blocked, b"not a directory").unwrap();
    let runner = Arc::new(RecordingRunner::default());
    let orchestrator = Orchestrator::with_components(
        EngineConfig::default_with_output(&blocked),
        Arc::new(ReqwestPageFetcher::new(FetchSettings::default())),
        runner.clone(),
        ProgressBroadcaster::new(),
    );

    let outcome = orchestrator
        .retrieve(&RetrievalRequest::new(
            "https://cdn.example/live/index.m3u8",
            Mode::Auto,
        ))
        .await;

    let RetrievalOutcome::TransferFailed(failure) = outcome else {
        panic!("expected a failed transfer, got {outcome:?}");
    };
    assert_eq!(failure.strategy, Strategy::Delegated);
    assert!(matches!(failure.error, TransferError::Io(_)));
    assert!(runner.seen.lock().unwrap().is_empty());
}
