//! Resolution of per-message content ("bubble") documents.
//!
//! A bubble lives under `bubbleId:<conversationId>:<bubbleId>`. Depending on the
//! Cursor version that wrote it, it sits in `cursorDiskKV` or in `ItemTable`, and its
//! text is either a plain field or a serialized rich-text tree.
use std::borrow::Cow;

use serde_json::{Map, Value};

use crate::error::Result;
use crate::rich_text;
use crate::store::{KeyValueStore, Lookup, Table};

pub const BUBBLE_KEY_PREFIX: &str = "bubbleId";

/// Tables searched for a bubble, in priority order. Every location is tried until one
/// yields a usable document.
pub const BUBBLE_LOCATIONS: [Table; 2] = [Table::CursorDiskKv, Table::ItemTable];

/// Fields that may carry the message text directly, in the order they are consulted.
pub const DIRECT_TEXT_FIELDS: [&str; 8] = [
    "text",
    "message",
    "content",
    "userMessage",
    "assistantMessage",
    "prompt",
    "response",
    "body",
];

pub const RICH_TEXT_FIELD: &str = "richText";

/// A bubble payload decoded into a JSON object.
pub type ContentDocument = Map<String, Value>;

pub fn bubble_key(conversation_id: &str, bubble_id: &str) -> String {
    format!("{BUBBLE_KEY_PREFIX}:{conversation_id}:{bubble_id}")
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found(ContentDocument),
    Missing,
}

impl Resolution {
    pub fn document(&self) -> Option<&ContentDocument> {
        match self {
            Resolution::Found(doc) => Some(doc),
            Resolution::Missing => None,
        }
    }
}

/// Result of decoding one stored payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Document(ContentDocument),
    Malformed(String),
}

/// Decode a payload as a JSON object. Invalid UTF-8 is replaced rather than rejected.
pub fn decode_document(bytes: &[u8]) -> Decoded {
    let text: Cow<'_, str> = String::from_utf8_lossy(bytes);
    match rich_text::parse_json(&text) {
        Ok(Value::Object(doc)) => Decoded::Document(doc),
        Ok(other) => Decoded::Malformed(format!("expected a JSON object, got {}", kind(&other))),
        Err(e) => Decoded::Malformed(e.to_string()),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Looks up bubble documents through a [`KeyValueStore`].
pub struct BubbleResolver<S> {
    store: S,
}

impl<S: KeyValueStore> BubbleResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Find the content document for one message.
    ///
    /// Malformed payloads count as a miss at that location. Only a store failure is
    /// returned as an error.
    pub fn resolve(&self, conversation_id: &str, bubble_id: &str) -> Result<Resolution> {
        let key = bubble_key(conversation_id, bubble_id);

        for table in BUBBLE_LOCATIONS {
            match self.store.lookup(table, &key)? {
                Lookup::NotFound => {
                    tracing::trace!(%table, %key, "bubble not in table");
                }
                Lookup::Found(bytes) => match decode_document(&bytes) {
                    Decoded::Document(doc) => return Ok(Resolution::Found(doc)),
                    Decoded::Malformed(reason) => {
                        tracing::debug!(%table, %key, %reason, "malformed bubble payload, trying next location");
                    }
                },
            }
        }

        Ok(Resolution::Missing)
    }
}

/// Where the text of a content document comes from, decided once per document.
#[derive(Debug, Clone, PartialEq)]
pub enum BubbleContent<'a> {
    DirectText(&'a str),
    RichTree(&'a Value),
    Absent,
}

impl<'a> BubbleContent<'a> {
    /// Consult [`DIRECT_TEXT_FIELDS`] in order, then `richText`.
    ///
    /// A direct field wins only if it is a string with non-whitespace content.
    pub fn classify(doc: &'a ContentDocument) -> Self {
        for field in DIRECT_TEXT_FIELDS {
            if let Some(Value::String(text)) = doc.get(field)
                && !text.trim().is_empty()
            {
                return BubbleContent::DirectText(text);
            }
        }

        match doc.get(RICH_TEXT_FIELD) {
            Some(tree) if !is_empty(tree) => BubbleContent::RichTree(tree),
            _ => BubbleContent::Absent,
        }
    }

    /// The plain text; empty when nothing usable was found.
    pub fn into_text(self) -> String {
        match self {
            BubbleContent::DirectText(text) => text.to_string(),
            BubbleContent::RichTree(tree) => rich_text::flatten(Some(tree)),
            BubbleContent::Absent => String::new(),
        }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
