use crate::RunPhase;

/// Everything the reconciler reacts to, merged into one ordered inbox:
/// live-stream deltas, user actions, external query outcomes, and timer
/// ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// The stream connection came up for the bound run.
    StreamConnected,
    /// A record landed in the live accumulator.
    StreamRecord {
        live_count: u64,
        records_extracted: u64,
    },
    /// Authoritative status overwrite from the stream.
    StreamStatus {
        phase: RunPhase,
        records_extracted: u64,
        error: Option<String>,
    },
    /// The run finished and the stream closed itself.
    StreamCompleted {
        total_records: u64,
        live_count: u64,
    },
    /// One stream payload was dropped as undecodable; the stream is still up.
    StreamParseFailed { message: String },
    /// The transport dropped; no reconnection will happen.
    StreamTransportFailed { message: String },
    /// User moved to another results page.
    PageChanged { page: u32 },
    /// User picked another page size.
    PageSizeChanged { page_size: u32 },
    /// User toggled between live and paginated view.
    ViewToggled,
    /// User asked for a manual refresh of both external queries.
    RefreshRequested,
    /// User dismissed the warning banner.
    WarningDismissed,
    /// The settle timer armed at a terminal transition fired.
    SettleElapsed { epoch: u64 },
    /// The paginated query started loading.
    ResultsLoading,
    /// The paginated query delivered a page.
    ResultsLoaded {
        total: u64,
        page: u32,
        page_size: u32,
    },
    /// The paginated query failed.
    ResultsFailed { message: String },
    /// The run metadata query started loading.
    MetadataLoading,
    /// The run metadata query delivered.
    MetadataLoaded {
        phase: RunPhase,
        records_extracted: u64,
        error: Option<String>,
        updated_at: Option<String>,
        source_urls: Vec<String>,
    },
    /// The run metadata query failed.
    MetadataFailed { message: String },
    /// The bound run went away; drop to the no-run baseline.
    RunUnbound,
    /// Fallback for placeholder wiring.
    NoOp,
}
