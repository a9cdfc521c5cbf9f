//! Runview session: wires the stream client to the pure reconciler and
//! executes its effects against the external query collaborators.
mod query;
mod rows;
mod session;

pub use query::{
    PersistedResult, PersistedResultPage, QueryError, ResultsQuery, RunMetadata, RunMetadataQuery,
};
pub use rows::ResultRow;
pub use session::RunSession;
