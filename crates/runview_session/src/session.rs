use std::sync::Arc;

use tokio::sync::mpsc;

use runview_core::{update, Effect, Msg, ReconcilerConfig, ReconcilerState, RowSource, RunViewModel};
use runview_stream::{
    EventStreamClient, RunId, StreamError, StreamNotice, StreamSettings, StreamState,
};
use stream_logging::{stream_debug, stream_info};

use crate::query::{PersistedResultPage, ResultsQuery, RunMetadata, RunMetadataQuery};
use crate::rows::{live_rows, persisted_rows, ResultRow};

/// Everything that can land in the session inbox besides a stream notice:
/// timer ticks and the outcomes of spawned collaborator fetches.
enum Inbound {
    Core(Msg),
    Page(PersistedResultPage),
    PageFailed(String),
    Metadata(RunMetadata),
    MetadataFailed(String),
}

/// Drives one results view.
///
/// Owns the stream client and the reconciler state, merges stream notices,
/// user actions, timer ticks, and query outcomes into a single ordered inbox,
/// and executes the effects the reconciler asks for. Single-owner: all
/// processing happens on the caller's task; spawned work only posts messages
/// back.
pub struct RunSession {
    state: ReconcilerState,
    client: EventStreamClient,
    notices: mpsc::UnboundedReceiver<StreamNotice>,
    inbox_tx: mpsc::UnboundedSender<Inbound>,
    inbox_rx: mpsc::UnboundedReceiver<Inbound>,
    results: Arc<dyn ResultsQuery>,
    metadata: Arc<dyn RunMetadataQuery>,
    run_id: Option<RunId>,
    page_cache: PersistedResultPage,
}

impl RunSession {
    pub fn new(
        settings: StreamSettings,
        config: ReconcilerConfig,
        results: Arc<dyn ResultsQuery>,
        metadata: Arc<dyn RunMetadataQuery>,
    ) -> Result<Self, StreamError> {
        let (client, notices) = EventStreamClient::new(settings)?;
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Ok(Self {
            state: ReconcilerState::with_config(config),
            client,
            notices,
            inbox_tx,
            inbox_rx,
            results,
            metadata,
            run_id: None,
            page_cache: PersistedResultPage::default(),
        })
    }

    /// Bind to a run (or to none). The previous connection is closed and all
    /// accumulated state drops to baseline before anything new starts; for a
    /// real run both external queries load and the stream opens.
    pub fn bind(&mut self, run_id: Option<RunId>) {
        self.client.clear();
        self.run_id = run_id;
        self.page_cache = PersistedResultPage::default();
        self.dispatch(Msg::RunUnbound);
        if let Some(run_id) = run_id {
            stream_info!("binding results view to run {}", run_id);
            self.dispatch(Msg::RefreshRequested);
            self.client.open(run_id);
        }
    }

    pub fn run_id(&self) -> Option<RunId> {
        self.run_id
    }

    /// Feed one message through the reconciler and execute its effects.
    pub fn dispatch(&mut self, msg: Msg) {
        let (state, effects) = update(std::mem::take(&mut self.state), msg);
        self.state = state;
        self.run_effects(effects);
    }

    // User actions, mirrored one-to-one onto reconciler messages.

    pub fn change_page(&mut self, page: u32) {
        self.dispatch(Msg::PageChanged { page });
    }

    pub fn change_page_size(&mut self, page_size: u32) {
        self.dispatch(Msg::PageSizeChanged { page_size });
    }

    pub fn toggle_view(&mut self) {
        self.dispatch(Msg::ViewToggled);
    }

    pub fn refresh(&mut self) {
        self.dispatch(Msg::RefreshRequested);
    }

    pub fn dismiss_warning(&mut self) {
        self.dispatch(Msg::WarningDismissed);
    }

    /// Await and process the next event from any source. Returns false once
    /// every channel is closed.
    pub async fn next_turn(&mut self) -> bool {
        tokio::select! {
            notice = self.notices.recv() => match notice {
                Some(notice) => {
                    self.on_notice(notice);
                    true
                }
                None => false,
            },
            inbound = self.inbox_rx.recv() => match inbound {
                Some(inbound) => {
                    self.on_inbound(inbound);
                    true
                }
                None => false,
            },
        }
    }

    /// Process everything already queued without waiting.
    pub fn drain_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            if let Ok(notice) = self.notices.try_recv() {
                self.on_notice(notice);
                handled += 1;
                continue;
            }
            if let Ok(inbound) = self.inbox_rx.try_recv() {
                self.on_inbound(inbound);
                handled += 1;
                continue;
            }
            return handled;
        }
    }

    pub fn view(&self) -> RunViewModel {
        self.state.view()
    }

    /// Materialize the rows the current view model selects.
    pub fn table_rows(&self) -> Vec<ResultRow> {
        match self.state.view().rows {
            RowSource::Live => match self.run_id {
                Some(run_id) => live_rows(run_id, self.client.snapshot().records()),
                None => Vec::new(),
            },
            RowSource::Persisted => persisted_rows(&self.page_cache),
        }
    }

    /// Raw stream state, for consumers that need more than the view model.
    pub fn stream_snapshot(&self) -> StreamState {
        self.client.snapshot()
    }

    fn on_notice(&mut self, notice: StreamNotice) {
        let msg = match notice {
            StreamNotice::Connected { .. } => Msg::StreamConnected,
            StreamNotice::RecordAppended {
                live_count,
                records_extracted,
                ..
            } => Msg::StreamRecord {
                live_count,
                records_extracted,
            },
            StreamNotice::StatusReplaced { status } => Msg::StreamStatus {
                phase: map_phase(status.phase),
                records_extracted: status.records_extracted,
                error: status.error,
            },
            StreamNotice::Completed {
                completion,
                live_count,
            } => Msg::StreamCompleted {
                total_records: completion.total_records,
                live_count,
            },
            StreamNotice::ParseFailed { message, .. } => Msg::StreamParseFailed { message },
            StreamNotice::TransportFailed { error } => Msg::StreamTransportFailed {
                message: error.to_string(),
            },
        };
        self.dispatch(msg);
    }

    fn on_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Core(msg) => self.dispatch(msg),
            Inbound::Page(page) => {
                let msg = Msg::ResultsLoaded {
                    total: page.total,
                    page: page.page,
                    page_size: page.page_size,
                };
                self.page_cache = page;
                self.dispatch(msg);
            }
            Inbound::PageFailed(message) => self.dispatch(Msg::ResultsFailed { message }),
            Inbound::Metadata(metadata) => self.dispatch(Msg::MetadataLoaded {
                phase: map_phase(metadata.phase),
                records_extracted: metadata.records_extracted,
                error: metadata.error,
                updated_at: metadata.updated_at.map(|at| at.to_rfc3339()),
                source_urls: metadata.source_urls,
            }),
            Inbound::MetadataFailed(message) => self.dispatch(Msg::MetadataFailed { message }),
        }
    }

    fn run_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::RefetchResults { page, page_size } => {
                    self.spawn_results_fetch(page, page_size);
                }
                Effect::RefetchRunMetadata => self.spawn_metadata_fetch(),
                Effect::ScheduleSettle { epoch, delay } => {
                    stream_debug!("arming settle timer, epoch {}", epoch);
                    let tx = self.inbox_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(Inbound::Core(Msg::SettleElapsed { epoch }));
                    });
                }
            }
        }
    }

    fn spawn_results_fetch(&mut self, page: u32, page_size: u32) {
        let Some(run_id) = self.run_id else {
            return;
        };
        self.dispatch(Msg::ResultsLoading);
        let results = Arc::clone(&self.results);
        let tx = self.inbox_tx.clone();
        tokio::spawn(async move {
            let outcome = results.fetch_page(run_id, page, page_size).await;
            let _ = tx.send(match outcome {
                Ok(page) => Inbound::Page(page),
                Err(err) => Inbound::PageFailed(err.to_string()),
            });
        });
    }

    fn spawn_metadata_fetch(&mut self) {
        let Some(run_id) = self.run_id else {
            return;
        };
        self.dispatch(Msg::MetadataLoading);
        let metadata = Arc::clone(&self.metadata);
        let tx = self.inbox_tx.clone();
        tokio::spawn(async move {
            let outcome = metadata.fetch(run_id).await;
            let _ = tx.send(match outcome {
                Ok(metadata) => Inbound::Metadata(metadata),
                Err(err) => Inbound::MetadataFailed(err.to_string()),
            });
        });
    }
}

fn map_phase(phase: runview_stream::RunPhase) -> runview_core::RunPhase {
    match phase {
        runview_stream::RunPhase::Pending => runview_core::RunPhase::Pending,
        runview_stream::RunPhase::Running => runview_core::RunPhase::Running,
        runview_stream::RunPhase::Completed => runview_core::RunPhase::Completed,
        runview_stream::RunPhase::Failed => runview_core::RunPhase::Failed,
    }
}
