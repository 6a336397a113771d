//! Conversion between store records and the in-memory conversation shape.
//!
//! This is the only place that knows the store keeps `messages` as a text
//! blob and that listings may come back as something other than an array.

use serde_json::Value;
use thiserror::Error;

use crate::store::ConversationRecord;
use crate::types::{Conversation, DEFAULT_TITLE, Message, compare_timestamps};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("listing is neither an array nor a keyed mapping: {found}")]
    MalformedListing { found: &'static str },

    #[error("malformed conversation record: {0}")]
    MalformedRecord(#[source] serde_json::Error),

    #[error("malformed message sequence: {0}")]
    MalformedMessages(#[source] serde_json::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;

pub fn encode_messages(messages: &[Message]) -> CodecResult<String> {
    serde_json::to_string(messages).map_err(CodecError::MalformedMessages)
}

/// Decode a record's `messages` field: a text blob is parsed, an array is
/// taken as-is, anything absent becomes an empty sequence.
pub fn decode_messages(raw: Option<&Value>) -> CodecResult<Vec<Message>> {
    match raw {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(blob)) if blob.trim().is_empty() => Ok(Vec::new()),
        Some(Value::String(blob)) => {
            serde_json::from_str(blob).map_err(CodecError::MalformedMessages)
        }
        Some(other) => {
            serde_json::from_value(other.clone()).map_err(CodecError::MalformedMessages)
        }
    }
}

pub fn decode_record(record: ConversationRecord) -> CodecResult<Conversation> {
    let messages = decode_messages(record.messages.as_ref())?;
    Ok(Conversation {
        id: record.id,
        title: record.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        messages,
        created_at: record.created_at,
        updated_at: record.updated_at,
        user_id: record.user_id,
    })
}

/// Normalize a raw store listing into conversations, most recently updated
/// first. Arrays and keyed mappings are both accepted; `null` is empty.
pub fn decode_listing(listing: Value) -> CodecResult<Vec<Conversation>> {
    let rows = match listing {
        Value::Null => Vec::new(),
        Value::Array(rows) => rows,
        Value::Object(keyed) => keyed.into_iter().map(|(_, row)| row).collect(),
        Value::Bool(_) => return Err(CodecError::MalformedListing { found: "boolean" }),
        Value::Number(_) => return Err(CodecError::MalformedListing { found: "number" }),
        Value::String(_) => return Err(CodecError::MalformedListing { found: "string" }),
    };

    let mut conversations = rows
        .into_iter()
        .map(|row| {
            let record: ConversationRecord =
                serde_json::from_value(row).map_err(CodecError::MalformedRecord)?;
            decode_record(record)
        })
        .collect::<CodecResult<Vec<_>>>()?;

    conversations.sort_by(|a, b| compare_timestamps(&b.updated_at, &a.updated_at));
    Ok(conversations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use serde_json::json;

    fn message(id: &str, role: Role, content: &str, timestamp: i64) -> Message {
        Message {
            id: id.to_string(),
            content: content.to_string(),
            role,
            timestamp,
        }
    }

    #[test]
    fn encoded_messages_decode_to_the_same_sequence() {
        let messages = vec![
            message("1", Role::User, "Hello", 1_700_000_000_000),
            message("2", Role::Assistant, "Hi there", 1_700_000_000_500),
        ];

        let blob = encode_messages(&messages).unwrap();
        let decoded = decode_messages(Some(&Value::String(blob))).unwrap();

        assert_eq!(decoded, messages);
    }

    #[test]
    fn messages_field_accepts_array_and_absent() {
        let array = json!([{ "id": "1", "content": "x", "role": "user", "timestamp": 5 }]);
        assert_eq!(decode_messages(Some(&array)).unwrap().len(), 1);
        assert!(decode_messages(None).unwrap().is_empty());
        assert!(decode_messages(Some(&Value::Null)).unwrap().is_empty());
    }

    #[test]
    fn garbage_blob_is_an_error() {
        let raw = Value::String("not json".to_string());
        assert!(matches!(
            decode_messages(Some(&raw)),
            Err(CodecError::MalformedMessages(_))
        ));
    }

    #[test]
    fn empty_keyed_mapping_is_an_empty_listing() {
        assert!(decode_listing(json!({})).unwrap().is_empty());
        assert!(decode_listing(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn keyed_mapping_is_sorted_by_update_time() {
        let listing = json!({
            "a": { "id": "a", "title": "Old", "messages": "[]", "createdAt": "2024-01-01T00:00:00Z",
                   "updatedAt": "2024-01-01T00:00:00Z", "userId": "u1" },
            "b": { "id": "b", "title": "New", "messages": "[]", "createdAt": "2024-01-01T00:00:00Z",
                   "updatedAt": "2024-03-01T00:00:00Z", "userId": "u1" }
        });

        let ids: Vec<String> = decode_listing(listing)
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();

        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn sub_second_stamps_sort_chronologically() {
        let listing = json!([
            { "id": "older", "createdAt": "t", "updatedAt": "2023-11-14T22:13:20.12Z", "userId": "u1" },
            { "id": "newer", "createdAt": "t", "updatedAt": "2023-11-14T22:13:20.123Z", "userId": "u1" },
            { "id": "oldest", "createdAt": "t", "updatedAt": "2023-11-14T22:13:20Z", "userId": "u1" }
        ]);

        let ids: Vec<String> = decode_listing(listing)
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();

        assert_eq!(ids, vec!["newer", "older", "oldest"]);
    }

    #[test]
    fn missing_title_defaults() {
        let listing = json!([{ "id": "a", "createdAt": "t", "updatedAt": "t", "userId": "u1" }]);
        let conversations = decode_listing(listing).unwrap();
        assert_eq!(conversations[0].title, DEFAULT_TITLE);
        assert!(conversations[0].messages.is_empty());
    }

    #[test]
    fn scalar_listing_is_rejected() {
        assert!(matches!(
            decode_listing(json!("oops")),
            Err(CodecError::MalformedListing { found: "string" })
        ));
    }
}
