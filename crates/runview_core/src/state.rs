use std::time::Duration;

use crate::view_model::{RowSource, RunViewModel};

/// Which source feeds the visible table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    /// Rows come from the in-memory streamed accumulator.
    #[default]
    Live,
    /// Rows come from the externally owned paginated query.
    Paginated,
}

/// Lifecycle phase of a run as the reconciler sees it. Mirrors the stream
/// crate's phase; the session maps between the two at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Failed)
    }

    pub fn is_active(self) -> bool {
        matches!(self, RunPhase::Pending | RunPhase::Running)
    }

    pub fn label(self) -> &'static str {
        match self {
            RunPhase::Pending => "pending",
            RunPhase::Running => "running",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
        }
    }
}

/// Tunables for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Grace period between a terminal status and the automatic switch to
    /// the paginated source, letting records that raced the completion
    /// settle visually before the source flips.
    pub settle_delay: Duration,
    /// Page size the paginated query starts out with.
    pub default_page_size: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(1000),
            default_page_size: 25,
        }
    }
}

/// Reconciler state: the view mode it owns plus mirrored facts from the live
/// stream and the external queries. Mutated only through [`crate::update`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilerState {
    pub(crate) config: ReconcilerConfig,
    pub(crate) mode: ViewMode,
    /// Monotonic guard for the settle timer: any user action or reconnect
    /// bumps it, orphaning timers armed before.
    pub(crate) settle_epoch: u64,
    /// One refetch pair per connection, latched at the first live terminal
    /// transition.
    pub(crate) refetch_latched: bool,
    pub(crate) dismissed_warning: Option<String>,

    // Live stream mirror.
    pub(crate) connected: bool,
    pub(crate) stream_phase: Option<RunPhase>,
    pub(crate) stream_records_extracted: u64,
    pub(crate) live_count: u64,
    pub(crate) total_expected: Option<u64>,
    /// Run-level failure reason carried by `status` payloads.
    pub(crate) run_error: Option<String>,
    /// Transport/parse/query trouble surfaced as a dismissible warning.
    pub(crate) warning: Option<String>,

    // External query mirror.
    pub(crate) page: u32,
    pub(crate) page_size: u32,
    pub(crate) persisted_total: u64,
    pub(crate) results_loading: bool,
    pub(crate) metadata_loading: bool,
    pub(crate) metadata_phase: Option<RunPhase>,
    pub(crate) metadata_records_extracted: u64,
    pub(crate) metadata_error: Option<String>,
    pub(crate) updated_at: Option<String>,
    pub(crate) source_urls: Vec<String>,
}

impl Default for ReconcilerState {
    fn default() -> Self {
        Self::with_config(ReconcilerConfig::default())
    }
}

impl ReconcilerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ReconcilerConfig) -> Self {
        let page_size = config.default_page_size;
        Self {
            config,
            mode: ViewMode::Live,
            settle_epoch: 0,
            refetch_latched: false,
            dismissed_warning: None,
            connected: false,
            stream_phase: None,
            stream_records_extracted: 0,
            live_count: 0,
            total_expected: None,
            run_error: None,
            warning: None,
            page: 0,
            page_size,
            persisted_total: 0,
            results_loading: false,
            metadata_loading: false,
            metadata_phase: None,
            metadata_records_extracted: 0,
            metadata_error: None,
            updated_at: None,
            source_urls: Vec::new(),
        }
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Drop everything except the configuration back to baseline.
    pub(crate) fn reset(&mut self) {
        *self = Self::with_config(self.config.clone());
    }

    /// True while the stream is both up and carrying a run that can still
    /// produce records.
    fn live_is_authoritative(&self) -> bool {
        self.connected && self.stream_phase.is_some_and(RunPhase::is_active)
    }

    /// Selection rule, in priority order: an active live run wins, a fully
    /// materialized finished transcript is kept (it saves the round trip),
    /// anything else falls back to the persisted page.
    fn row_source(&self) -> RowSource {
        if self.mode == ViewMode::Live {
            if self.live_is_authoritative() {
                return RowSource::Live;
            }
            if self.stream_phase == Some(RunPhase::Completed)
                && self
                    .total_expected
                    .is_some_and(|total| self.live_count == total)
            {
                return RowSource::Live;
            }
        }
        RowSource::Persisted
    }

    /// Composite loading signal: persisted-query loading is suppressed while
    /// live data is already authoritative, so streaming never flickers a
    /// spinner.
    fn is_loading(&self) -> bool {
        self.metadata_loading || (self.results_loading && !self.live_is_authoritative())
    }

    pub fn view(&self) -> RunViewModel {
        // Stream facts back the status display whenever a stream was
        // observed this session, even a finished one; metadata only fills in
        // when no stream ever connected.
        let (phase, records_extracted, run_error) = if self.stream_phase.is_some() {
            (
                self.stream_phase,
                self.stream_records_extracted,
                self.run_error.clone(),
            )
        } else {
            (
                self.metadata_phase,
                self.metadata_records_extracted,
                self.metadata_error.clone(),
            )
        };

        let warning = match (&self.warning, &self.dismissed_warning) {
            (Some(warning), Some(dismissed)) if warning == dismissed => None,
            (warning, _) => warning.clone(),
        };

        let page_count = if self.page_size == 0 {
            1
        } else {
            (self.persisted_total.div_ceil(u64::from(self.page_size))).max(1)
        };

        RunViewModel {
            mode: self.mode,
            rows: self.row_source(),
            is_loading: self.is_loading(),
            connected: self.connected,
            phase,
            records_extracted,
            live_count: self.live_count,
            total_expected: self.total_expected,
            run_error,
            warning,
            page: self.page,
            page_size: self.page_size,
            persisted_total: self.persisted_total,
            page_count,
            updated_at: self.updated_at.clone(),
            source_urls: self.source_urls.clone(),
            awaiting_first_record: self.live_is_authoritative() && self.stream_records_extracted == 0,
        }
    }
}
