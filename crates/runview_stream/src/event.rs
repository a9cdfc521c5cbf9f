//! Typed model of the run-event wire protocol.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sse::SseFrame;

/// Opaque numeric key identifying one scrape run.
pub type RunId = u64;

/// Row identity in the UI key space.
///
/// Streamed records may arrive before the backend has persisted them, so a
/// locally synthesized id stands in until the paginated query takes over.
/// Keeping the two spaces in separate variants means a local id can never
/// collide with a legitimate (even negative) persisted id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordId {
    /// Server-assigned id from the results store.
    Persisted(i64),
    /// Synthesized per-connection placeholder, starting at 1.
    Local(u64),
}

/// One extracted item as carried by a `record` event. Immutable once
/// received.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScrapedRecord {
    /// Present only once the backend has persisted the row.
    #[serde(default)]
    pub id: Option<i64>,
    pub url: String,
    pub title: String,
    #[serde(with = "wire_time")]
    pub extracted_at: DateTime<Utc>,
    /// Arbitrary extracted fields keyed by the selector schema.
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Lifecycle phase of a run. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
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
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Pending => write!(f, "pending"),
            RunPhase::Running => write!(f, "running"),
            RunPhase::Completed => write!(f, "completed"),
            RunPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Payload of a `status` event: an authoritative snapshot of the run.
///
/// Failure payloads from the worker omit `records_extracted`, so it defaults
/// to zero; a `status` overwrite is wholesale, not a merge.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RunStatus {
    #[serde(default)]
    pub records_extracted: u64,
    #[serde(rename = "status")]
    pub phase: RunPhase,
    /// Set only when `phase` is `Failed`.
    #[serde(default)]
    pub error: Option<String>,
}

/// Payload of a `complete` event; always the final meaningful event of a
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RunCompletion {
    pub total_records: u64,
    pub urls_processed: u64,
}

/// One decoded event from the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Record(ScrapedRecord),
    Status(RunStatus),
    Complete(RunCompletion),
    /// Liveness signal; carries no state.
    Ping,
}

/// A frame whose payload could not be decoded. The event is dropped and the
/// connection stays open.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventDecodeError {
    #[error("malformed {event} payload: {message}")]
    Payload { event: String, message: String },
}

/// Decode a named frame into a typed event. `Ok(None)` marks event names the
/// endpoint may emit but this consumer does not act on.
pub fn decode_event(frame: &SseFrame) -> Result<Option<RunEvent>, EventDecodeError> {
    match frame.event.as_str() {
        "record" => parse_payload(frame).map(RunEvent::Record).map(Some),
        "status" => parse_payload(frame).map(RunEvent::Status).map(Some),
        "complete" => parse_payload(frame).map(RunEvent::Complete).map(Some),
        "ping" => Ok(Some(RunEvent::Ping)),
        _ => Ok(None),
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    frame: &SseFrame,
) -> Result<T, EventDecodeError> {
    serde_json::from_str(&frame.data).map_err(|err| EventDecodeError::Payload {
        event: frame.event.clone(),
        message: err.to_string(),
    })
}

/// Timestamps on the wire come in two shapes: RFC 3339 from the persistence
/// layer, and naive ISO strings from the worker (which stamps records with
/// plain UTC). Accept both, treat naive as UTC.
mod wire_time {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("unrecognized timestamp {raw:?}")))
    }

    fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(stamped) = DateTime::parse_from_rfc3339(raw) {
            return Some(stamped.with_timezone(&Utc));
        }
        raw.parse::<NaiveDateTime>().ok().map(|naive| naive.and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_event, EventDecodeError, RunEvent, RunPhase};
    use crate::sse::SseFrame;

    fn frame(event: &str, data: &str) -> SseFrame {
        SseFrame {
            event: event.to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn record_payload_decodes() {
        let decoded = decode_event(&frame(
            "record",
            r#"{"url":"https://shop.example/p/1","title":"Widget","extracted_at":"2025-06-01T10:00:00.123456","fields":{"price":"9.99"}}"#,
        ))
        .unwrap();
        let Some(RunEvent::Record(record)) = decoded else {
            panic!("expected record event, got {decoded:?}");
        };
        assert_eq!(record.id, None);
        assert_eq!(record.title, "Widget");
        assert_eq!(record.fields["price"], "9.99");
    }

    #[test]
    fn record_accepts_rfc3339_timestamps() {
        let decoded = decode_event(&frame(
            "record",
            r#"{"id":7,"url":"u","title":"t","extracted_at":"2025-06-01T10:00:00+02:00"}"#,
        ))
        .unwrap();
        let Some(RunEvent::Record(record)) = decoded else {
            panic!("expected record event");
        };
        assert_eq!(record.id, Some(7));
        assert_eq!(record.extracted_at.to_rfc3339(), "2025-06-01T08:00:00+00:00");
    }

    #[test]
    fn status_payload_decodes() {
        let decoded = decode_event(&frame(
            "status",
            r#"{"records_extracted":4,"status":"running"}"#,
        ))
        .unwrap();
        let Some(RunEvent::Status(status)) = decoded else {
            panic!("expected status event");
        };
        assert_eq!(status.records_extracted, 4);
        assert_eq!(status.phase, RunPhase::Running);
        assert_eq!(status.error, None);
    }

    #[test]
    fn failed_status_may_omit_count() {
        let decoded = decode_event(&frame(
            "status",
            r#"{"status":"failed","error":"No selector schema found"}"#,
        ))
        .unwrap();
        let Some(RunEvent::Status(status)) = decoded else {
            panic!("expected status event");
        };
        assert_eq!(status.records_extracted, 0);
        assert_eq!(status.phase, RunPhase::Failed);
        assert_eq!(status.error.as_deref(), Some("No selector schema found"));
    }

    #[test]
    fn complete_payload_decodes() {
        let decoded = decode_event(&frame(
            "complete",
            r#"{"total_records":12,"urls_processed":3}"#,
        ))
        .unwrap();
        let Some(RunEvent::Complete(completion)) = decoded else {
            panic!("expected complete event");
        };
        assert_eq!(completion.total_records, 12);
        assert_eq!(completion.urls_processed, 3);
    }

    #[test]
    fn ping_ignores_payload_contents() {
        let decoded = decode_event(&frame("ping", "not even json")).unwrap();
        assert_eq!(decoded, Some(RunEvent::Ping));
    }

    #[test]
    fn unknown_event_names_are_skipped() {
        let decoded = decode_event(&frame("url_error", r#"{"detail":"x"}"#)).unwrap();
        assert_eq!(decoded, None);
    }

    #[test]
    fn malformed_payload_reports_event_name() {
        let err = decode_event(&frame("record", "{truncated")).unwrap_err();
        let EventDecodeError::Payload { event, .. } = err;
        assert_eq!(event, "record");
    }

    #[test]
    fn unexpected_status_value_is_a_payload_error() {
        // The stream contract knows four phases; anything else is dropped
        // like any other malformed payload.
        let err = decode_event(&frame("status", r#"{"status":"cancelled"}"#));
        assert!(err.is_err());
    }
}
