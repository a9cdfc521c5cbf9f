//! Row materialization: both sources collapse to one table row shape so the
//! rendering layer never cares which side fed it.

use chrono::{DateTime, Utc};

use runview_stream::{LiveRecord, RecordId, RunId, ScrapedRecord};

use crate::query::PersistedResultPage;

/// One table row, independent of which source produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub id: RecordId,
    pub run_id: RunId,
    pub data: ScrapedRecord,
    pub created_at: DateTime<Utc>,
}

pub(crate) fn live_rows(run_id: RunId, records: &[LiveRecord]) -> Vec<ResultRow> {
    records
        .iter()
        .map(|live| ResultRow {
            id: live.id,
            run_id,
            data: live.record.clone(),
            // Streamed records carry no persistence timestamp yet; the
            // extraction time stands in.
            created_at: live.record.extracted_at,
        })
        .collect()
}

pub(crate) fn persisted_rows(page: &PersistedResultPage) -> Vec<ResultRow> {
    page.results
        .iter()
        .map(|row| ResultRow {
            id: RecordId::Persisted(row.id),
            run_id: row.run_id,
            data: row.data.clone(),
            created_at: row.created_at,
        })
        .collect()
}
