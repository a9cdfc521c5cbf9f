use crate::{RunPhase, ViewMode};

/// Which source the embedder should materialize rows from this render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSource {
    /// The in-memory streamed accumulator, already fully addressable.
    Live,
    /// The externally owned paginated query.
    Persisted,
}

/// Render-ready projection of the reconciler state.
#[derive(Debug, Clone, PartialEq)]
pub struct RunViewModel {
    pub mode: ViewMode,
    pub rows: RowSource,
    pub is_loading: bool,
    pub connected: bool,
    /// Display status: live while connected, else last known metadata.
    pub phase: Option<RunPhase>,
    pub records_extracted: u64,
    /// Length of the live accumulator (may trail `records_extracted` briefly
    /// around completion).
    pub live_count: u64,
    /// Total announced by the completion event, unknown until then.
    pub total_expected: Option<u64>,
    /// Run-level failure reason, set when the run failed.
    pub run_error: Option<String>,
    /// Dismissible connection/query warning.
    pub warning: Option<String>,
    pub page: u32,
    pub page_size: u32,
    pub persisted_total: u64,
    /// Page count for pagination controls, never below 1.
    pub page_count: u64,
    pub updated_at: Option<String>,
    pub source_urls: Vec<String>,
    /// An active run is connected but nothing has streamed in yet.
    pub awaiting_first_record: bool,
}
