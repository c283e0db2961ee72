//! Type definitions for the parts of Cursor's `composerData` document we rely on.
//!
//! Each conversation ("composer") has one structural document stored under
//! `composerData:<composerId>`. It lists the message headers in order but not their
//! text; the text lives in per-message `bubbleId:<composerId>:<bubbleId>` documents.
//!
//! ```json
//! {
//!   "composerId": "20e7a53f-33e9-40e9-9237-a8f5ded267e0",
//!   "name": "Set up docker compose",
//!   "createdAt": 1730000000000,
//!   "lastUpdatedAt": 1730000500000,
//!   "fullConversationHeadersOnly": [{"bubbleId": "b1", "type": 1}, {"bubbleId": "b2", "type": 2}],
//!   "codeBlockData": {"file:///...": {"<blockId>": {"uri": {...}, "languageId": "yaml", "status": "accepted"}}},
//!   "originalFileStates": {"file:///...": {"uri": {...}, "isNewlyCreated": true, "content": "..."}}
//! }
//! ```
//!
//! The schema is undocumented and changes between Cursor releases, so every field is
//! optional and wrong-typed fields fall back to their defaults instead of failing.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Message author.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Map the header `type` code: `1` is the user, everything else the assistant.
    pub fn from_header_type(code: i64) -> Self {
        if code == 1 { Role::User } else { Role::Assistant }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One entry of `fullConversationHeadersOnly`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawHeader")]
pub struct MessageHeader {
    pub bubble_id: String,
    pub role: Role,
}

impl MessageHeader {
    pub fn new(bubble_id: impl Into<String>, role: Role) -> Self {
        Self {
            bubble_id: bubble_id.into(),
            role,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHeader {
    #[serde(default, deserialize_with = "lenient")]
    bubble_id: String,
    #[serde(default, rename = "type", deserialize_with = "lenient")]
    kind: i64,
}

impl From<RawHeader> for MessageHeader {
    fn from(raw: RawHeader) -> Self {
        Self {
            bubble_id: raw.bubble_id,
            role: Role::from_header_type(raw.kind),
        }
    }
}

/// The structural document of one conversation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposerData {
    #[serde(default, deserialize_with = "lenient")]
    pub composer_id: Option<String>,

    /// Older spelling of `composerId`.
    #[serde(default, deserialize_with = "lenient")]
    pub conversation_id: Option<String>,

    /// User-visible conversation title.
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "epoch_millis")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "epoch_millis")]
    pub last_updated_at: Option<DateTime<Utc>>,

    /// Message headers in conversation order.
    #[serde(default, deserialize_with = "lenient_headers")]
    full_conversation_headers_only: Option<Vec<MessageHeader>>,

    /// Older spelling of `fullConversationHeadersOnly`.
    #[serde(default, deserialize_with = "lenient_headers")]
    headers: Option<Vec<MessageHeader>>,

    /// `fileKey -> blockId -> block metadata`.
    #[serde(default, deserialize_with = "lenient")]
    pub code_block_data: Map<String, Value>,

    /// `fileKey -> original file state`.
    #[serde(default, deserialize_with = "lenient")]
    pub original_file_states: Map<String, Value>,
}

impl ComposerData {
    /// `fullConversationHeadersOnly` when present as a list, else `headers`.
    pub fn headers(&self) -> &[MessageHeader] {
        self.full_conversation_headers_only
            .as_deref()
            .or(self.headers.as_deref())
            .unwrap_or(&[])
    }

    /// `composerId`, else `conversationId`, ignoring empty strings.
    pub fn id(&self) -> Option<&str> {
        [&self.composer_id, &self.conversation_id]
            .into_iter()
            .find_map(|id| id.as_deref().filter(|id| !id.is_empty()))
    }

    pub fn title(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

/// Parse a structure dump written by an earlier extraction run.
///
/// Accepts the `{"key": "composerData:<id>", "data": {...}}` wrapper or a bare
/// structural document. The conversation id is taken from the document, then the
/// wrapper key, then the first UUID-shaped segment of `file_stem`.
pub fn parse_structure_dump(
    bytes: &[u8],
    file_stem: &str,
) -> serde_json::Result<Option<(String, ComposerData)>> {
    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(default)]
        key: Option<String>,
        data: Value,
    }

    let value: Value = serde_json::from_slice(bytes)?;
    let (key, data) = match serde_json::from_value::<Wrapper>(value.clone()) {
        Ok(w) if w.data.is_object() => (w.key, w.data),
        _ => (None, value),
    };
    let composer: ComposerData = serde_json::from_value(data)?;

    let id = composer
        .id()
        .map(str::to_string)
        .or_else(|| {
            key.as_deref()
                .and_then(|k| k.strip_prefix(crate::recover::COMPOSER_KEY_PREFIX))
                .map(str::to_string)
        })
        .or_else(|| uuid_segment(file_stem).map(str::to_string));

    Ok(id.map(|id| (id, composer)))
}

fn uuid_segment(stem: &str) -> Option<&str> {
    stem.split('_').find(|part| {
        part.len() == 36
            && part.chars().filter(|c| *c == '-').count() == 4
            && part.chars().all(|c| c == '-' || c.is_ascii_hexdigit())
    })
}

/// Deserialize a field, falling back to its default when the stored value has an
/// unexpected type (`null`, a string where a map was expected, ...).
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Headers are decoded one by one so a single odd entry does not discard the list.
/// Anything other than a list counts as absent.
fn lenient_headers<'de, D>(deserializer: D) -> Result<Option<Vec<MessageHeader>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Array(items) = Value::deserialize(deserializer)? else {
        return Ok(None);
    };
    Ok(Some(
        items
            .into_iter()
            .map(|item| {
                serde_json::from_value(item)
                    .unwrap_or_else(|_| MessageHeader::new("", Role::Assistant))
            })
            .collect(),
    ))
}

/// Timestamps are epoch milliseconds; RFC 3339 strings are accepted too.
fn epoch_millis<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(DateTime::from_timestamp_millis),
        Value::String(s) => s.parse::<DateTime<Utc>>().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_composer_data() {
        let json = r#"{
            "composerId": "c1",
            "name": "Docker setup",
            "createdAt": 1730000000000,
            "lastUpdatedAt": 1730000500000,
            "fullConversationHeadersOnly": [
                {"bubbleId": "b1", "type": 1},
                {"bubbleId": "b2", "type": 2, "serverBubbleId": "x"}
            ],
            "codeBlockData": {"file:///a.rs": {"blk": {"languageId": "rust"}}},
            "originalFileStates": {}
        }"#;

        let data: ComposerData = serde_json::from_str(json).unwrap();
        assert_eq!(data.id(), Some("c1"));
        assert_eq!(data.title(), "Docker setup");
        assert_eq!(
            data.headers(),
            &[
                MessageHeader::new("b1", Role::User),
                MessageHeader::new("b2", Role::Assistant)
            ]
        );
        assert_eq!(
            data.last_updated_at,
            DateTime::from_timestamp_millis(1730000500000)
        );
        assert_eq!(data.code_block_data.len(), 1);
    }

    #[test]
    fn test_alternate_field_names_and_bad_types() {
        let json = r#"{
            "conversationId": "c2",
            "headers": [{"bubbleId": "b1", "type": 1}, {"type": "weird"}, 5],
            "codeBlockData": null,
            "originalFileStates": "nope",
            "lastUpdatedAt": "2025-01-02T03:04:05Z"
        }"#;

        let data: ComposerData = serde_json::from_str(json).unwrap();
        assert_eq!(data.id(), Some("c2"));
        assert_eq!(data.headers().len(), 3);
        assert_eq!(data.headers()[1].role, Role::Assistant);
        assert_eq!(data.headers()[2].bubble_id, "");
        assert!(data.code_block_data.is_empty());
        assert!(data.original_file_states.is_empty());
        assert!(data.last_updated_at.is_some());
        assert!(data.created_at.is_none());
    }

    #[test]
    fn test_both_spellings_present() {
        let json = r#"{
            "composerId": "c",
            "conversationId": "c-old",
            "fullConversationHeadersOnly": [{"bubbleId": "b1", "type": 1}],
            "headers": []
        }"#;

        let data: ComposerData = serde_json::from_str(json).unwrap();
        assert_eq!(data.id(), Some("c"));
        assert_eq!(data.headers(), &[MessageHeader::new("b1", Role::User)]);

        let json = r#"{"composerId": "", "conversationId": "c-old", "fullConversationHeadersOnly": null, "headers": [{"bubbleId": "h", "type": 2}]}"#;
        let data: ComposerData = serde_json::from_str(json).unwrap();
        assert_eq!(data.id(), Some("c-old"));
        assert_eq!(data.headers(), &[MessageHeader::new("h", Role::Assistant)]);
    }

    #[test]
    fn test_header_type_mapping() {
        assert_eq!(Role::from_header_type(1), Role::User);
        assert_eq!(Role::from_header_type(2), Role::Assistant);
        assert_eq!(Role::from_header_type(0), Role::Assistant);
    }

    #[test]
    fn test_structure_dump_wrapper() {
        let dump = br#"{"key": "composerData:abc", "data": {"fullConversationHeadersOnly": []}, "extracted_at": "x"}"#;
        let (id, data) = parse_structure_dump(dump, "conversation_1").unwrap().unwrap();
        assert_eq!(id, "abc");
        assert!(data.headers().is_empty());
    }

    #[test]
    fn test_structure_dump_id_from_file_stem() {
        let dump = br#"{"fullConversationHeadersOnly": [{"bubbleId": "b", "type": 1}]}"#;
        let stem = "conversation_3_composerData_20e7a53f-33e9-40e9-9237-a8f5ded267e0";
        let (id, data) = parse_structure_dump(dump, stem).unwrap().unwrap();
        assert_eq!(id, "20e7a53f-33e9-40e9-9237-a8f5ded267e0");
        assert_eq!(data.headers().len(), 1);

        assert!(parse_structure_dump(dump, "conversation_3").unwrap().is_none());
    }
}
