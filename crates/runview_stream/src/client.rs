//! The stream client: owns at most one live SSE connection per bound run and
//! translates wire frames into typed state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use stream_logging::{stream_debug, stream_info, stream_trace, stream_warn};

use crate::event::{decode_event, RecordId, RunCompletion, RunEvent, RunId, RunStatus, ScrapedRecord};
use crate::sse::{SseFrame, SseParser};
use crate::state::StreamState;

/// Connection settings for the run-event endpoint.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// API root the stream endpoint hangs off, e.g. `https://host/api/v1/`.
    pub base_url: Url,
    pub connect_timeout: Duration,
}

impl StreamSettings {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            connect_timeout: Duration::from_secs(10),
        }
    }

    fn endpoint(&self, run_id: RunId) -> Result<Url, StreamError> {
        self.base_url
            .join(&format!("runs/{run_id}/stream"))
            .map_err(|err| StreamError::Endpoint(err.to_string()))
    }
}

/// Why a stream could not be established or stopped delivering.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("invalid stream endpoint: {0}")]
    Endpoint(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("transport failed: {0}")]
    Transport(String),
    #[error("stream ended before completion")]
    UnexpectedEof,
}

/// Progress notifications pumped to the consumer as the connection task runs.
/// Notices carry the deltas; [`EventStreamClient::snapshot`] carries the full
/// accumulated state.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamNotice {
    /// The HTTP stream is established and state was reset for this run.
    Connected { run_id: RunId },
    /// A record was appended to the accumulator.
    RecordAppended {
        id: RecordId,
        record: ScrapedRecord,
        live_count: u64,
        records_extracted: u64,
    },
    /// A `status` event overwrote the run status.
    StatusReplaced { status: RunStatus },
    /// The run finished; the connection closed itself.
    Completed {
        completion: RunCompletion,
        live_count: u64,
    },
    /// One event payload was dropped as undecodable; the stream stays up.
    ParseFailed { event: String, message: String },
    /// The transport failed or ended early; the stream is down for good.
    TransportFailed { error: StreamError },
}

struct Connection {
    run_id: RunId,
    token: CancellationToken,
}

/// Owns one streaming connection per bound run identifier.
///
/// At most one connection is live at a time; opening a new one cancels the
/// previous one before any new event can be observed. All state mutation
/// happens in the connection task; consumers read via [`snapshot`] and the
/// notice channel returned by [`new`].
///
/// [`snapshot`]: EventStreamClient::snapshot
/// [`new`]: EventStreamClient::new
pub struct EventStreamClient {
    settings: StreamSettings,
    http: reqwest::Client,
    shared: Arc<Mutex<StreamState>>,
    notice_tx: mpsc::UnboundedSender<StreamNotice>,
    conn: Option<Connection>,
}

impl EventStreamClient {
    /// Build a client and the receiving end of its notice channel. Must be
    /// used from within a tokio runtime: `open` spawns the reader task.
    pub fn new(
        settings: StreamSettings,
    ) -> Result<(Self, mpsc::UnboundedReceiver<StreamNotice>), StreamError> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| StreamError::Connect(err.to_string()))?;
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let client = Self {
            settings,
            http,
            shared: Arc::new(Mutex::new(StreamState::new())),
            notice_tx,
            conn: None,
        };
        Ok((client, notice_rx))
    }

    /// The run the client is currently bound to, if any.
    pub fn run_id(&self) -> Option<RunId> {
        self.conn.as_ref().map(|conn| conn.run_id)
    }

    /// Latest accumulated state for the bound run.
    pub fn snapshot(&self) -> StreamState {
        self.shared.lock().expect("stream state lock").clone()
    }

    /// Open a stream for `run_id`. Any previous connection is closed and all
    /// accumulated state resets to baseline before the new one can deliver.
    pub fn open(&mut self, run_id: RunId) {
        self.close();
        self.shared.lock().expect("stream state lock").reset();

        let endpoint = match self.settings.endpoint(run_id) {
            Ok(endpoint) => endpoint,
            Err(err) => {
                stream_warn!("run {}: {}", run_id, err);
                self.shared
                    .lock()
                    .expect("stream state lock")
                    .record_transport_error(err.to_string());
                let _ = self.notice_tx.send(StreamNotice::TransportFailed { error: err });
                return;
            }
        };

        let token = CancellationToken::new();
        self.conn = Some(Connection {
            run_id,
            token: token.clone(),
        });
        tokio::spawn(run_connection(
            self.http.clone(),
            endpoint,
            run_id,
            Arc::clone(&self.shared),
            self.notice_tx.clone(),
            token,
        ));
    }

    /// Idempotent: cancels the reader task if one is live and always leaves
    /// the connection flag down. Accumulated state is retained so a finished
    /// run stays viewable.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            stream_debug!("run {}: closing stream", conn.run_id);
            conn.token.cancel();
        }
        self.shared
            .lock()
            .expect("stream state lock")
            .mark_disconnected();
    }

    /// Unbind entirely: close and drop all accumulated state back to the
    /// no-active-run baseline.
    pub fn clear(&mut self) {
        self.close();
        self.shared.lock().expect("stream state lock").reset();
    }
}

impl Drop for EventStreamClient {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.token.cancel();
        }
    }
}

async fn run_connection(
    http: reqwest::Client,
    endpoint: Url,
    run_id: RunId,
    shared: Arc<Mutex<StreamState>>,
    notices: mpsc::UnboundedSender<StreamNotice>,
    token: CancellationToken,
) {
    let response = tokio::select! {
        _ = token.cancelled() => return,
        response = http.get(endpoint.clone()).send() => response,
    };

    let response = match response {
        Ok(response) => response,
        Err(err) => {
            fail(&shared, &notices, map_reqwest_error(err));
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        fail(&shared, &notices, StreamError::HttpStatus(status.as_u16()));
        return;
    }

    stream_info!("run {}: stream open at {}", run_id, endpoint);
    shared.lock().expect("stream state lock").mark_connected();
    let _ = notices.send(StreamNotice::Connected { run_id });

    let mut parser = SseParser::new();
    let mut body = response.bytes_stream();
    loop {
        let chunk = tokio::select! {
            _ = token.cancelled() => {
                shared.lock().expect("stream state lock").mark_disconnected();
                return;
            }
            chunk = body.next() => chunk,
        };
        match chunk {
            Some(Ok(bytes)) => {
                for frame in parser.feed(&bytes) {
                    if handle_frame(&frame, run_id, &shared, &notices) == FrameOutcome::Closed {
                        return;
                    }
                }
            }
            Some(Err(err)) => {
                fail(&shared, &notices, map_reqwest_error(err));
                return;
            }
            None => {
                // Server hung up without a `complete` event.
                fail(&shared, &notices, StreamError::UnexpectedEof);
                return;
            }
        }
    }
}

#[derive(PartialEq)]
enum FrameOutcome {
    Open,
    Closed,
}

fn handle_frame(
    frame: &SseFrame,
    run_id: RunId,
    shared: &Arc<Mutex<StreamState>>,
    notices: &mpsc::UnboundedSender<StreamNotice>,
) -> FrameOutcome {
    let event = match decode_event(frame) {
        Ok(Some(event)) => event,
        Ok(None) => {
            stream_debug!("run {}: ignoring '{}' event", run_id, frame.event);
            return FrameOutcome::Open;
        }
        Err(err) => {
            stream_warn!("run {}: {}", run_id, err);
            let message = err.to_string();
            shared
                .lock()
                .expect("stream state lock")
                .record_parse_error(message.clone());
            let _ = notices.send(StreamNotice::ParseFailed {
                event: frame.event.clone(),
                message,
            });
            return FrameOutcome::Open;
        }
    };

    let mut state = shared.lock().expect("stream state lock");
    match event {
        RunEvent::Record(record) => {
            let id = state.apply_record(record.clone());
            let live_count = state.live_count();
            let records_extracted = state
                .status()
                .map(|status| status.records_extracted)
                .unwrap_or(live_count);
            drop(state);
            let _ = notices.send(StreamNotice::RecordAppended {
                id,
                record,
                live_count,
                records_extracted,
            });
        }
        RunEvent::Status(status) => {
            if state.apply_status(status.clone()) {
                drop(state);
                let _ = notices.send(StreamNotice::StatusReplaced { status });
            } else {
                stream_debug!("run {}: status event after terminal phase ignored", run_id);
            }
        }
        RunEvent::Complete(completion) => {
            state.apply_complete(completion);
            let live_count = state.live_count();
            drop(state);
            stream_info!(
                "run {}: complete, {} records from {} urls",
                run_id,
                completion.total_records,
                completion.urls_processed
            );
            let _ = notices.send(StreamNotice::Completed {
                completion,
                live_count,
            });
            return FrameOutcome::Closed;
        }
        RunEvent::Ping => {
            stream_trace!("run {}: ping", run_id);
        }
    }
    FrameOutcome::Open
}

fn fail(
    shared: &Arc<Mutex<StreamState>>,
    notices: &mpsc::UnboundedSender<StreamNotice>,
    error: StreamError,
) {
    stream_warn!("stream failed: {}", error);
    shared
        .lock()
        .expect("stream state lock")
        .record_transport_error(error.to_string());
    let _ = notices.send(StreamNotice::TransportFailed { error });
}

fn map_reqwest_error(err: reqwest::Error) -> StreamError {
    if err.is_connect() || err.is_timeout() {
        StreamError::Connect(err.to_string())
    } else {
        StreamError::Transport(err.to_string())
    }
}
