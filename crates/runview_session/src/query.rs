//! External collaborator boundaries: the persisted paginated-results query
//! and the run metadata query. Embedders implement these against their
//! backend; tests supply in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use runview_stream::{RunId, RunPhase, ScrapedRecord};

/// A collaborator call that did not produce data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("query failed: {0}")]
    Backend(String),
}

/// One persisted row as served by the results API.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PersistedResult {
    pub id: i64,
    pub run_id: RunId,
    pub data: ScrapedRecord,
    pub created_at: DateTime<Utc>,
}

/// One page of the persisted results query.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct PersistedResultPage {
    pub results: Vec<PersistedResult>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

/// Run metadata as served by the runs API.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RunMetadata {
    #[serde(rename = "status")]
    pub phase: RunPhase,
    #[serde(default)]
    pub records_extracted: u64,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_urls: Vec<String>,
}

/// Paginated persisted-results query: `(run_id, page, page_size)` in, one
/// page out.
#[async_trait]
pub trait ResultsQuery: Send + Sync {
    async fn fetch_page(
        &self,
        run_id: RunId,
        page: u32,
        page_size: u32,
    ) -> Result<PersistedResultPage, QueryError>;
}

/// Run metadata query.
#[async_trait]
pub trait RunMetadataQuery: Send + Sync {
    async fn fetch(&self, run_id: RunId) -> Result<RunMetadata, QueryError>;
}
