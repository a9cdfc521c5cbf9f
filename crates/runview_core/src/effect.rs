use std::time::Duration;

/// Side effects the embedder must execute on the reconciler's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Re-run the persisted paginated query at the given coordinates.
    RefetchResults { page: u32, page_size: u32 },
    /// Re-run the run metadata query.
    RefetchRunMetadata,
    /// Arm the live-to-paginated settle timer: deliver
    /// `Msg::SettleElapsed { epoch }` after `delay`. Stale epochs are ignored
    /// on arrival, so an armed timer never needs cancelling.
    ScheduleSettle { epoch: u64, delay: Duration },
}
