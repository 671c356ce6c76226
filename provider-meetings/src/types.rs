//! Meeting provider response shapes
//!
//! Provider API versions disagree on field names (`recordings` vs `items`,
//! `topic` vs `title`, numeric vs string ids, ...). Rather than one struct
//! per version, pages are read as JSON objects and each field is looked up
//! under every known name, first match wins.

use bridge_traits::storage::{ReadinessState, Recording};
use serde_json::{Map, Value};

use crate::error::{ProviderError, Result};

const ARRAY_FIELDS: &[&str] = &["recordings", "items", "data"];
const NEXT_PAGE_FIELDS: &[&str] = &["next_page_token", "nextPageToken"];
const ID_FIELDS: &[&str] = &["id", "uuid", "recording_id", "recordingId"];
const TITLE_FIELDS: &[&str] = &["title", "topic", "name"];
const STATUS_FIELDS: &[&str] = &["status", "state", "recording_status"];
const URL_FIELDS: &[&str] = &["download_url", "downloadUrl", "url"];
const FORMAT_FIELDS: &[&str] = &["file_type", "format", "fileType"];
const SIZE_FIELDS: &[&str] = &["file_size", "size", "fileSize"];

/// One page of the listing response.
#[derive(Debug)]
pub struct RecordingsPage {
    pub recordings: Vec<Recording>,
    /// Items that could not be mapped (no usable id)
    pub skipped_items: usize,
    pub next_page_token: Option<String>,
}

/// Parse a listing response body.
///
/// A body carrying an `error` member, or with no recordings array, is a
/// malformed page.
pub fn parse_page(body: &[u8]) -> Result<RecordingsPage> {
    let root: Value = serde_json::from_slice(body)
        .map_err(|e| ProviderError::ParseError(format!("listing is not JSON: {}", e)))?;

    let object = root
        .as_object()
        .ok_or_else(|| ProviderError::MalformedPage("expected a JSON object".to_string()))?;

    if let Some(error) = object.get("error").filter(|v| !v.is_null()) {
        return Err(ProviderError::MalformedPage(describe_error(error)));
    }

    let items = ARRAY_FIELDS
        .iter()
        .find_map(|field| object.get(*field).and_then(Value::as_array))
        .ok_or_else(|| ProviderError::MalformedPage("no recordings array".to_string()))?;

    let mut recordings = Vec::with_capacity(items.len());
    let mut skipped_items = 0;
    for item in items {
        match item.as_object().and_then(recording_from_object) {
            Some(recording) => recordings.push(recording),
            None => skipped_items += 1,
        }
    }

    let next_page_token = first_string(object, NEXT_PAGE_FIELDS);

    Ok(RecordingsPage {
        recordings,
        skipped_items,
        next_page_token,
    })
}

/// Map one provider item onto a [`Recording`]. `None` when it has no id.
pub fn recording_from_object(item: &Map<String, Value>) -> Option<Recording> {
    let id = first_scalar(item, ID_FIELDS)?;

    Some(Recording {
        id,
        title: first_string(item, TITLE_FIELDS),
        readiness: parse_readiness(first_string(item, STATUS_FIELDS).as_deref()),
        download_url: first_string(item, URL_FIELDS),
        format: first_string(item, FORMAT_FIELDS),
        size: first_u64(item, SIZE_FIELDS),
    })
}

/// Normalise a provider readiness string.
pub fn parse_readiness(raw: Option<&str>) -> ReadinessState {
    let Some(raw) = raw else {
        return ReadinessState::Unknown(String::new());
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "ready" | "completed" | "complete" | "available" | "done" => ReadinessState::Ready,
        "processing" | "pending" | "in_progress" | "waiting" => ReadinessState::Pending,
        _ => ReadinessState::Unknown(raw.to_string()),
    }
}

fn describe_error(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(fields) => fields
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

fn first_string(object: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .filter_map(|field| object.get(*field).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// String or integer id, stringified.
fn first_scalar(object: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| match object.get(*field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn first_u64(object: &Map<String, Value>, fields: &[&str]) -> Option<u64> {
    fields.iter().find_map(|field| match object.get(*field)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_with_current_field_names() {
        let body = br#"{
            "recordings": [
                {
                    "id": "m1",
                    "title": "Weekly sync",
                    "status": "ready",
                    "download_url": "https://media.example.com/m1.mp4",
                    "file_type": "MP4",
                    "file_size": 2048
                },
                { "id": "m2", "status": "processing" }
            ],
            "next_page_token": ""
        }"#;

        let page = parse_page(body).unwrap();
        assert_eq!(page.recordings.len(), 2);
        assert_eq!(page.next_page_token, None);

        let m1 = &page.recordings[0];
        assert_eq!(m1.id, "m1");
        assert_eq!(m1.title.as_deref(), Some("Weekly sync"));
        assert!(m1.readiness.is_ready());
        assert_eq!(m1.format.as_deref(), Some("MP4"));
        assert_eq!(m1.size, Some(2048));

        let m2 = &page.recordings[1];
        assert_eq!(m2.readiness, ReadinessState::Pending);
        assert!(m2.download_url.is_none());
    }

    #[test]
    fn test_parse_page_with_legacy_field_names() {
        let body = br#"{
            "items": [
                {
                    "recording_id": 81234567,
                    "topic": "All hands",
                    "state": "COMPLETED",
                    "downloadUrl": "https://media.example.com/stream/index.m3u8",
                    "format": "M3U8",
                    "size": "4096"
                },
                { "topic": "no id here" }
            ],
            "nextPageToken": "page-2"
        }"#;

        let page = parse_page(body).unwrap();
        assert_eq!(page.recordings.len(), 1);
        assert_eq!(page.skipped_items, 1);
        assert_eq!(page.next_page_token.as_deref(), Some("page-2"));

        let recording = &page.recordings[0];
        assert_eq!(recording.id, "81234567");
        assert_eq!(recording.title.as_deref(), Some("All hands"));
        assert!(recording.readiness.is_ready());
        assert_eq!(recording.size, Some(4096));
    }

    #[test]
    fn test_error_member_is_malformed_page() {
        let err = parse_page(br#"{"error": {"code": 124, "message": "Invalid access token."}}"#)
            .unwrap_err();
        assert!(
            matches!(err, ProviderError::MalformedPage(ref msg) if msg == "Invalid access token.")
        );

        assert!(matches!(
            parse_page(br#"{"error": "throttled"}"#).unwrap_err(),
            ProviderError::MalformedPage(_)
        ));
    }

    #[test]
    fn test_missing_array_is_malformed_page() {
        assert!(matches!(
            parse_page(br#"{"page_size": 300}"#).unwrap_err(),
            ProviderError::MalformedPage(_)
        ));
        assert!(matches!(
            parse_page(br#"[1, 2]"#).unwrap_err(),
            ProviderError::MalformedPage(_)
        ));
        assert!(matches!(
            parse_page(b"<html>").unwrap_err(),
            ProviderError::ParseError(_)
        ));
    }

    #[test]
    fn test_readiness_normalisation() {
        assert_eq!(parse_readiness(Some("Available")), ReadinessState::Ready);
        assert_eq!(parse_readiness(Some("in_progress")), ReadinessState::Pending);
        assert_eq!(
            parse_readiness(Some("deleted")),
            ReadinessState::Unknown("deleted".to_string())
        );
        assert_eq!(parse_readiness(None), ReadinessState::Unknown(String::new()));
    }
}
