//! The reconstructed conversation handed to the output stage.
//!
//! Records are built once by [`crate::assemble::assemble`] and are read-only afterwards;
//! fields are private so the count invariants cannot drift from the message list.
use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::composer::Role;

/// One message in conversation order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    index: usize,
    bubble_id: String,
    role: Role,
    text: String,
    content_found: bool,
}

impl MessageRecord {
    pub(crate) fn new(
        index: usize,
        bubble_id: String,
        role: Role,
        text: String,
        content_found: bool,
    ) -> Self {
        Self {
            index,
            bubble_id,
            role,
            text,
            content_found,
        }
    }

    /// 1-based position in the header sequence.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn bubble_id(&self) -> &str {
        &self.bubble_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether a content document was found for this message, even one without text.
    pub fn content_found(&self) -> bool {
        self.content_found
    }
}

/// A code block generated during the conversation, copied from `codeBlockData`.
///
/// The stored block is kept unchanged in `metadata`. `fileKey` and `blockId` are the
/// two map keys it was stored under and `path` is the normalized file path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeBlockEntry {
    path: String,
    file_key: String,
    block_id: String,
    metadata: Map<String, Value>,
}

impl CodeBlockEntry {
    pub(crate) fn new(
        path: String,
        file_key: String,
        block_id: String,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            path,
            file_key,
            block_id,
            metadata,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn block_id(&self) -> &str {
        &self.block_id
    }

    pub fn language_id(&self) -> Option<&str> {
        self.metadata.get("languageId").and_then(Value::as_str)
    }

    pub fn status(&self) -> Option<&str> {
        self.metadata.get("status").and_then(Value::as_str)
    }

    pub fn bubble_id(&self) -> Option<&str> {
        self.metadata.get("bubbleId").and_then(Value::as_str)
    }
}

/// The state of a file before the conversation touched it, copied from `originalFileStates`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStateEntry {
    path: String,
    file_key: String,
    metadata: Map<String, Value>,
}

impl FileStateEntry {
    pub(crate) fn new(path: String, file_key: String, metadata: Map<String, Value>) -> Self {
        Self {
            path,
            file_key,
            metadata,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_newly_created(&self) -> bool {
        self.metadata
            .get("isNewlyCreated")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn content(&self) -> Option<&str> {
        self.metadata
            .get("content")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
    }

    pub fn first_edit_bubble_id(&self) -> Option<&str> {
        self.metadata.get("firstEditBubbleId").and_then(Value::as_str)
    }
}

/// A fully reconstructed conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    id: String,
    messages: Vec<MessageRecord>,
    total_messages: usize,
    messages_with_content: usize,
    code_blocks: Vec<CodeBlockEntry>,
    file_states: Vec<FileStateEntry>,
}

impl ConversationRecord {
    /// Counts are derived here, from the finished message list.
    pub(crate) fn new(
        id: String,
        messages: Vec<MessageRecord>,
        code_blocks: Vec<CodeBlockEntry>,
        file_states: Vec<FileStateEntry>,
    ) -> Self {
        let total_messages = messages.len();
        let messages_with_content = messages.iter().filter(|m| m.content_found).count();
        Self {
            id,
            messages,
            total_messages,
            messages_with_content,
            code_blocks,
            file_states,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn messages(&self) -> &[MessageRecord] {
        &self.messages
    }

    pub fn total_messages(&self) -> usize {
        self.total_messages
    }

    pub fn messages_with_content(&self) -> usize {
        self.messages_with_content
    }

    pub fn code_blocks(&self) -> &[CodeBlockEntry] {
        &self.code_blocks
    }

    pub fn file_states(&self) -> &[FileStateEntry] {
        &self.file_states
    }

    /// The 1-based index of the message with this bubble id.
    pub fn message_index(&self, bubble_id: &str) -> Option<usize> {
        self.messages
            .iter()
            .find(|m| m.bubble_id == bubble_id)
            .map(MessageRecord::index)
    }

    /// Code blocks grouped by normalized file path.
    pub fn code_blocks_by_path(&self) -> BTreeMap<&str, Vec<&CodeBlockEntry>> {
        let mut grouped: BTreeMap<&str, Vec<&CodeBlockEntry>> = BTreeMap::new();
        for block in &self.code_blocks {
            grouped.entry(block.path()).or_default().push(block);
        }
        grouped
    }

    /// Every distinct file path referenced by code blocks or file states, sorted.
    pub fn file_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self
            .code_blocks
            .iter()
            .map(CodeBlockEntry::path)
            .chain(self.file_states.iter().map(FileStateEntry::path))
            .collect();
        paths.sort_unstable();
        paths.dedup();
        paths
    }
}
