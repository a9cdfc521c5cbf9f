//! Connection-scoped live state: the run status machine plus the record
//! accumulator.
//!
//! Kept separate from the transport so the transition rules are testable
//! without IO. Mutation is restricted to this crate; consumers read
//! snapshots.

use crate::event::{RecordId, RunCompletion, RunPhase, RunStatus, ScrapedRecord};

/// One accumulated record plus the identity assigned on arrival.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveRecord {
    pub id: RecordId,
    pub record: ScrapedRecord,
}

/// Everything one stream connection has accumulated so far.
///
/// Baseline (no active run): empty records, no status, no completion total,
/// no error, disconnected. Restored exactly when a connection (re)opens or
/// the bound run goes away.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamState {
    records: Vec<LiveRecord>,
    status: Option<RunStatus>,
    total_expected: Option<u64>,
    error: Option<String>,
    connected: bool,
    next_local_id: u64,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records in arrival order. No sorting, dedup, or reconciliation against
    /// persisted storage is ever applied.
    pub fn records(&self) -> &[LiveRecord] {
        &self.records
    }

    pub fn live_count(&self) -> u64 {
        self.records.len() as u64
    }

    pub fn status(&self) -> Option<&RunStatus> {
        self.status.as_ref()
    }

    pub fn phase(&self) -> Option<RunPhase> {
        self.status.as_ref().map(|status| status.phase)
    }

    /// Total announced by the `complete` event, unknown until then.
    pub fn total_expected(&self) -> Option<u64> {
        self.total_expected
    }

    /// Latest transport or payload error, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// Called once the HTTP stream is established: drop anything from a prior
    /// connection and start the status machine at `Pending`.
    pub(crate) fn mark_connected(&mut self) {
        self.records.clear();
        self.status = Some(RunStatus {
            records_extracted: 0,
            phase: RunPhase::Pending,
            error: None,
        });
        self.total_expected = None;
        self.error = None;
        self.next_local_id = 0;
        self.connected = true;
    }

    pub(crate) fn mark_disconnected(&mut self) {
        self.connected = false;
    }

    pub(crate) fn record_transport_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.connected = false;
    }

    /// A payload failed to decode: surface it, keep the connection open, and
    /// leave the machine untouched.
    pub(crate) fn record_parse_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Append one record and advance the counter. `records_extracted` counts
    /// events observed on this connection, never a value from the payload.
    /// Terminal phases are absorbing, so a late record cannot resurrect a
    /// finished run, but it is still accumulated and counted.
    pub(crate) fn apply_record(&mut self, record: ScrapedRecord) -> RecordId {
        let id = match record.id {
            Some(persisted) => RecordId::Persisted(persisted),
            None => {
                self.next_local_id += 1;
                RecordId::Local(self.next_local_id)
            }
        };
        self.records.push(LiveRecord { id, record });

        let status = self.status.get_or_insert(RunStatus {
            records_extracted: 0,
            phase: RunPhase::Running,
            error: None,
        });
        status.records_extracted += 1;
        if !status.phase.is_terminal() {
            status.phase = RunPhase::Running;
        }
        id
    }

    /// Wholesale status overwrite. Returns false when the machine is already
    /// terminal and the event was disregarded.
    pub(crate) fn apply_status(&mut self, status: RunStatus) -> bool {
        if self.phase().is_some_and(RunPhase::is_terminal) {
            return false;
        }
        self.status = Some(status);
        true
    }

    /// Completion is authoritative: the announced total replaces any
    /// per-record counting, and the connection is considered over.
    pub(crate) fn apply_complete(&mut self, completion: RunCompletion) {
        self.total_expected = Some(completion.total_records);
        if !self.phase().is_some_and(RunPhase::is_terminal) {
            let error = self.status.take().and_then(|status| status.error);
            self.status = Some(RunStatus {
                records_extracted: completion.total_records,
                phase: RunPhase::Completed,
                error,
            });
        }
        self.connected = false;
    }
}
