use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use evrys_types::Event;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::*;

fn line(id: &str) -> String {
    format!(r#"{{"specversion":"1.0","id":"{id}","source":"tests","type":"com.example.test"}}"#)
}

fn lines(n: usize) -> Vec<String> {
    (0..n).map(|i| line(&format!("e{i}"))).collect()
}

async fn decoder_for(values: Vec<String>) -> JsonLinesDecoder<Input> {
    let input = Source::Literal(values).open().await.expect("literal should open");
    Format::Json.decoder(input).expect("json decoder")
}

/// Records the id of every appended event, optionally sleeping first.
#[derive(Default)]
struct RecordingSink {
    seen: Mutex<Vec<String>>,
    delay: Option<fn(&Event) -> Duration>,
}

impl RecordingSink {
    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn append(&self, event: &Event) -> Result<(), PublishError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay(event)).await;
        }
        self.seen.lock().unwrap().push(event.id.clone());
        Ok(())
    }
}

/// Cancels the run from inside its first append.
struct CancellingSink {
    token: CancellationToken,
    calls: Mutex<usize>,
}

#[async_trait]
impl EventSink for CancellingSink {
    async fn append(&self, _event: &Event) -> Result<(), PublishError> {
        *self.calls.lock().unwrap() += 1;
        self.token.cancel();
        Ok(())
    }
}

/// Takes a fixed time per append and counts entries and exits.
struct SlowSink {
    delay: Duration,
    started: AtomicUsize,
    finished: AtomicUsize,
}

#[async_trait]
impl EventSink for SlowSink {
    async fn append(&self, _event: &Event) -> Result<(), PublishError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails every append of the event with id `bad`.
struct PickySink;

#[async_trait]
impl EventSink for PickySink {
    async fn append(&self, event: &Event) -> Result<(), PublishError> {
        if event.id == "bad" {
            return Err(PublishError::ServiceUnavailable("store offline".into()));
        }
        Ok(())
    }
}

// ── endpoint ─────────────────────────────────────────────────────────

#[test]
fn blank_endpoint_is_missing() {
    for raw in ["", "   "] {
        assert!(matches!(
            Endpoint::parse(raw),
            Err(PublishError::MissingEndpoint)
        ));
    }
}

#[test]
fn bare_host_port_defaults_to_http() {
    let endpoint = Endpoint::parse("localhost:8090").expect("should parse");
    assert_eq!(endpoint.to_string(), "http://localhost:8090/");
}

#[test]
fn non_http_endpoint_is_rejected() {
    assert!(matches!(
        Endpoint::parse("ftp://example.com"),
        Err(PublishError::InvalidEndpoint { .. })
    ));
}

// ── format ───────────────────────────────────────────────────────────

#[test]
fn format_names() {
    assert_eq!("json".parse::<Format>().unwrap(), Format::Json);
    assert_eq!("binary".parse::<Format>().unwrap(), Format::Binary);
    match "xml".parse::<Format>() {
        Err(PublishError::UnsupportedFormat(name)) => assert_eq!(name, "xml"),
        other => panic!("expected unsupported format, got {other:?}"),
    }
}

#[tokio::test]
async fn binary_format_has_no_decoder() {
    let input = Source::Literal(vec![]).open().await.unwrap();
    assert!(matches!(
        Format::Binary.decoder(input),
        Err(PublishError::UnsupportedFormat(_))
    ));
}

// ── decoding ─────────────────────────────────────────────────────────

#[tokio::test]
async fn json_lines_skip_blank_lines() {
    let mut decoder = decoder_for(vec![line("a"), String::new(), "  ".into(), line("b")]).await;

    let a = decoder.next_event().await.unwrap().expect("first event");
    let b = decoder.next_event().await.unwrap().expect("second event");
    assert_eq!((a.id.as_str(), b.id.as_str()), ("a", "b"));
    assert!(decoder.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn json_lines_report_failing_line() {
    let mut decoder = decoder_for(vec![line("a"), String::new(), "{oops".into()]).await;

    decoder.next_event().await.unwrap();
    match decoder.next_event().await {
        Err(PublishError::Decode { line, .. }) => assert_eq!(line, 3),
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[tokio::test]
async fn json_lines_reject_wrong_spec_version() {
    let mut decoder =
        decoder_for(vec![r#"{"specversion":"0.3","id":"a","source":"s","type":"t"}"#.into()]).await;
    match decoder.next_event().await {
        Err(PublishError::Decode { line, reason }) => {
            assert_eq!(line, 1);
            assert!(reason.contains("0.3"), "{reason}");
        }
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_file_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let source = Source::File(dir.path().join("absent.ndjson"));
    assert!(matches!(
        source.open().await,
        Err(PublishError::Open { .. })
    ));
}

#[test]
fn dash_means_stdin() {
    assert_eq!(Source::from_arg("-"), Source::Stdin);
    assert_eq!(
        Source::from_arg("events.ndjson"),
        Source::File("events.ndjson".into())
    );
}

// ── pipeline ─────────────────────────────────────────────────────────

#[tokio::test]
async fn publishes_every_decoded_event() {
    let sink = Arc::new(RecordingSink::default());
    let report = Pipeline::new(Span::none())
        .run(decoder_for(lines(25)).await, sink.clone(), CancellationToken::new())
        .await
        .expect("run should succeed");

    assert_eq!(
        report,
        PipelineReport {
            decoded: 25,
            published: 25,
            cancelled: false
        }
    );
    let mut seen = sink.seen();
    seen.sort_by_key(|id| id[1..].parse::<usize>().unwrap());
    let expected: Vec<String> = (0..25).map(|i| format!("e{i}")).collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn empty_input_is_a_clean_run() {
    let sink = Arc::new(RecordingSink::default());
    let report = Pipeline::new(Span::none())
        .run(decoder_for(vec![]).await, sink.clone(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report, PipelineReport::default());
}

#[tokio::test]
async fn cancellation_after_first_dispatch_stops_new_work() {
    let token = CancellationToken::new();
    let sink = Arc::new(CancellingSink {
        token: token.clone(),
        calls: Mutex::new(0),
    });

    let report = Pipeline::new(Span::none())
        .with_concurrency(1)
        .run(decoder_for(lines(50)).await, sink.clone(), token)
        .await
        .expect("cancellation is not an error");

    assert!(report.cancelled);
    assert_eq!(report.published, 1);
    assert_eq!(*sink.calls.lock().unwrap(), 1);
    assert!(report.decoded < 50);
}

#[tokio::test]
async fn pre_cancelled_run_dispatches_nothing() {
    let token = CancellationToken::new();
    token.cancel();
    let sink = Arc::new(RecordingSink::default());

    let report = Pipeline::new(Span::none())
        .run(decoder_for(lines(5)).await, sink.clone(), token)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.published, 0);
    assert!(sink.seen().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancellation_lets_in_flight_appends_finish() {
    let sink = Arc::new(SlowSink {
        delay: Duration::from_millis(200),
        started: AtomicUsize::new(0),
        finished: AtomicUsize::new(0),
    });
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let report = Pipeline::new(Span::none())
        .with_concurrency(4)
        .run(decoder_for(lines(20)).await, sink.clone(), token)
        .await
        .expect("cancellation is not an error");

    assert!(report.cancelled);
    assert_eq!(sink.started.load(Ordering::SeqCst), 4);
    assert_eq!(sink.finished.load(Ordering::SeqCst), 4);
    assert_eq!(report.published, 4);
}

fn reverse_delay(event: &Event) -> Duration {
    let index: u64 = event.id[1..].parse().unwrap();
    Duration::from_millis((4 - index) * 10)
}

#[tokio::test(start_paused = true)]
async fn delivery_order_is_not_decode_order() {
    // Earlier events take longer, so completions arrive reversed.
    let sink = Arc::new(RecordingSink {
        seen: Mutex::default(),
        delay: Some(reverse_delay as fn(&Event) -> Duration),
    });

    let report = Pipeline::new(Span::none())
        .with_concurrency(4)
        .run(decoder_for(lines(4)).await, sink.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.published, 4);
    assert_eq!(sink.seen(), ["e3", "e2", "e1", "e0"]);
}

#[tokio::test]
async fn decode_failure_stops_the_run() {
    let sink = Arc::new(RecordingSink::default());
    let values = vec![line("a"), "not json".into(), line("c")];

    let result = Pipeline::new(Span::none())
        .run(decoder_for(values).await, sink.clone(), CancellationToken::new())
        .await;

    match result {
        Err(PublishError::Decode { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected decode error, got {other:?}"),
    }
    assert!(!sink.seen().contains(&"c".to_string()));
}

#[tokio::test]
async fn append_failure_is_returned() {
    let values = vec![line("ok"), line("bad"), line("later")];
    let result = Pipeline::new(Span::none())
        .with_concurrency(1)
        .run(decoder_for(values).await, Arc::new(PickySink), CancellationToken::new())
        .await;

    assert!(
        matches!(result, Err(PublishError::ServiceUnavailable(_))),
        "{result:?}"
    );
}

#[test]
fn zero_concurrency_means_one() {
    assert_eq!(Pipeline::new(Span::none()).with_concurrency(0).concurrency(), 1);
    assert_eq!(Pipeline::new(Span::none()).concurrency(), DEFAULT_CONCURRENCY);
}
