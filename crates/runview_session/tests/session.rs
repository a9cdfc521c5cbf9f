use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use tokio::time::timeout;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use runview_core::{ReconcilerConfig, RowSource, RunPhase, RunViewModel, ViewMode};
use runview_session::{
    PersistedResult, PersistedResultPage, QueryError, ResultsQuery, RunMetadata, RunMetadataQuery,
    RunSession,
};
use runview_stream::{RecordId, RunId, ScrapedRecord, StreamSettings};

fn sse_event(name: &str, data: &str) -> String {
    format!("event: {name}\ndata: {data}\n\n")
}

fn record_json(title: &str) -> String {
    format!(
        r#"{{"url":"https://shop.example/{title}","title":"{title}","extracted_at":"2025-06-01T10:00:00.000000","fields":{{}}}}"#
    )
}

fn scraped(title: &str) -> ScrapedRecord {
    ScrapedRecord {
        id: None,
        url: format!("https://shop.example/{title}"),
        title: title.to_string(),
        extracted_at: Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap(),
        fields: serde_json::Map::new(),
    }
}

struct FakeResults {
    rows: Vec<PersistedResult>,
    calls: AtomicUsize,
    last_coords: Mutex<Option<(u32, u32)>>,
    fail: bool,
}

impl FakeResults {
    fn with_rows(rows: Vec<PersistedResult>) -> Arc<Self> {
        Arc::new(Self {
            rows,
            calls: AtomicUsize::new(0),
            last_coords: Mutex::new(None),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            rows: Vec::new(),
            calls: AtomicUsize::new(0),
            last_coords: Mutex::new(None),
            fail: true,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_coords(&self) -> Option<(u32, u32)> {
        *self.last_coords.lock().unwrap()
    }
}

#[async_trait]
impl ResultsQuery for FakeResults {
    async fn fetch_page(
        &self,
        _run_id: RunId,
        page: u32,
        page_size: u32,
    ) -> Result<PersistedResultPage, QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_coords.lock().unwrap() = Some((page, page_size));
        if self.fail {
            return Err(QueryError::Backend("results backend unavailable".to_string()));
        }
        Ok(PersistedResultPage {
            results: self.rows.clone(),
            total: self.rows.len() as u64,
            page,
            page_size,
        })
    }
}

struct FakeMetadata {
    metadata: RunMetadata,
    calls: AtomicUsize,
}

impl FakeMetadata {
    fn with_phase(phase: runview_stream::RunPhase) -> Arc<Self> {
        Arc::new(Self {
            metadata: RunMetadata {
                phase,
                records_extracted: 0,
                error: None,
                updated_at: Some(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()),
                source_urls: vec!["https://shop.example".to_string()],
            },
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RunMetadataQuery for FakeMetadata {
    async fn fetch(&self, _run_id: RunId) -> Result<RunMetadata, QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.metadata.clone())
    }
}

fn persisted_row(id: i64, run_id: RunId, title: &str) -> PersistedResult {
    PersistedResult {
        id,
        run_id,
        data: scraped(title),
        created_at: Utc.with_ymd_and_hms(2025, 6, 1, 10, 5, 0).unwrap(),
    }
}

fn config() -> ReconcilerConfig {
    ReconcilerConfig {
        settle_delay: Duration::from_millis(50),
        ..ReconcilerConfig::default()
    }
}

fn session_for(
    server: &MockServer,
    results: Arc<FakeResults>,
    metadata: Arc<FakeMetadata>,
) -> RunSession {
    let base = Url::parse(&server.uri()).expect("mock server uri");
    RunSession::new(StreamSettings::new(base), config(), results, metadata).expect("session")
}

async fn drive_until(session: &mut RunSession, pred: impl Fn(&RunViewModel) -> bool) {
    timeout(Duration::from_secs(5), async {
        while !pred(&session.view()) {
            assert!(session.next_turn().await, "session channels closed");
        }
    })
    .await
    .expect("condition within timeout");
}

#[tokio::test]
async fn live_run_streams_then_hands_over_to_paginated() {
    let server = MockServer::start().await;
    let body = [
        sse_event("record", &record_json("alpha")),
        sse_event("record", &record_json("beta")),
        sse_event("status", r#"{"records_extracted":2,"status":"running"}"#),
        sse_event("complete", r#"{"total_records":2,"urls_processed":1}"#),
    ]
    .concat();
    Mock::given(method("GET"))
        .and(path("/runs/42/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let results = FakeResults::with_rows(vec![
        persisted_row(101, 42, "alpha"),
        persisted_row(102, 42, "beta"),
    ]);
    let metadata = FakeMetadata::with_phase(runview_stream::RunPhase::Completed);
    let mut session = session_for(&server, Arc::clone(&results), Arc::clone(&metadata));

    session.bind(Some(42));
    drive_until(&mut session, |view| {
        view.phase == Some(RunPhase::Completed) && !view.connected
    })
    .await;

    // The finished transcript is fully materialized, so it stays on screen
    // until the settle switch.
    let view = session.view();
    assert_eq!(view.mode, ViewMode::Live);
    assert_eq!(view.rows, RowSource::Live);
    assert_eq!(view.records_extracted, 2);
    assert_eq!(view.total_expected, Some(2));
    let rows = session.table_rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, RecordId::Local(1));
    assert_eq!(rows[0].data.title, "alpha");

    // Settle timer flips the source; the refetched page takes over.
    drive_until(&mut session, |view| {
        view.mode == ViewMode::Paginated && !view.is_loading
    })
    .await;
    let rows = session.table_rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, RecordId::Persisted(101));

    // One fetch pair at bind, exactly one more for the live completion.
    assert_eq!(results.calls(), 2);
    assert_eq!(metadata.calls(), 2);
}

#[tokio::test]
async fn mount_time_terminal_run_does_not_refetch() {
    // No stream mock: the SSE endpoint 404s, as it would for a long-finished
    // run with no live channel.
    let server = MockServer::start().await;
    let results = FakeResults::with_rows(vec![persisted_row(7, 9, "old")]);
    let metadata = FakeMetadata::with_phase(runview_stream::RunPhase::Completed);
    let mut session = session_for(&server, Arc::clone(&results), Arc::clone(&metadata));

    session.bind(Some(9));
    drive_until(&mut session, |view| {
        view.phase == Some(RunPhase::Completed) && !view.is_loading
    })
    .await;

    // Give any stray work a moment, then make sure nothing else fired.
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.drain_pending();
    assert_eq!(results.calls(), 1);
    assert_eq!(metadata.calls(), 1);

    let view = session.view();
    assert_eq!(view.rows, RowSource::Persisted);
    assert_eq!(session.table_rows().len(), 1);
}

#[tokio::test]
async fn page_change_fetches_new_coordinates_and_switches_mode() {
    let server = MockServer::start().await;
    let results = FakeResults::with_rows(vec![persisted_row(1, 5, "row")]);
    let metadata = FakeMetadata::with_phase(runview_stream::RunPhase::Completed);
    let mut session = session_for(&server, Arc::clone(&results), Arc::clone(&metadata));

    session.bind(Some(5));
    drive_until(&mut session, |view| !view.is_loading && view.phase.is_some()).await;

    session.change_page(2);
    drive_until(&mut session, |view| view.page == 2 && !view.is_loading).await;

    assert_eq!(session.view().mode, ViewMode::Paginated);
    assert_eq!(results.last_coords(), Some((2, 25)));

    session.change_page_size(50);
    drive_until(&mut session, |view| view.page_size == 50 && !view.is_loading).await;
    assert_eq!(session.view().page, 0);
    assert_eq!(results.last_coords(), Some((0, 50)));
}

#[tokio::test]
async fn results_query_failure_surfaces_a_warning() {
    let server = MockServer::start().await;
    let results = FakeResults::failing();
    let metadata = FakeMetadata::with_phase(runview_stream::RunPhase::Completed);
    let mut session = session_for(&server, Arc::clone(&results), metadata);

    session.bind(Some(3));
    drive_until(&mut session, |view| view.warning.is_some()).await;

    let warning = session.view().warning.expect("warning");
    assert!(warning.contains("results backend unavailable"));
    assert!(session.table_rows().is_empty());
}

#[tokio::test]
async fn unbinding_clears_everything() {
    let server = MockServer::start().await;
    let body = [
        sse_event("record", &record_json("alpha")),
        sse_event("complete", r#"{"total_records":1,"urls_processed":1}"#),
    ]
    .concat();
    Mock::given(method("GET"))
        .and(path("/runs/8/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let results = FakeResults::with_rows(vec![persisted_row(1, 8, "alpha")]);
    let metadata = FakeMetadata::with_phase(runview_stream::RunPhase::Completed);
    let mut session = session_for(&server, results, metadata);

    session.bind(Some(8));
    drive_until(&mut session, |view| view.phase == Some(RunPhase::Completed)).await;

    session.bind(None);
    let view = session.view();
    assert_eq!(view.phase, None);
    assert!(!view.connected);
    assert_eq!(view.warning, None);
    assert_eq!(session.run_id(), None);
    assert!(session.table_rows().is_empty());
    assert_eq!(session.stream_snapshot().live_count(), 0);
}
