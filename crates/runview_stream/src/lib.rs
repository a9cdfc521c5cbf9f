//! Runview stream: SSE consumption and live run state.
mod client;
mod event;
mod sse;
mod state;

pub use client::{EventStreamClient, StreamError, StreamNotice, StreamSettings};
pub use event::{
    decode_event, EventDecodeError, RecordId, RunCompletion, RunEvent, RunId, RunPhase, RunStatus,
    ScrapedRecord,
};
pub use sse::{SseFrame, SseParser};
pub use state::{LiveRecord, StreamState};
