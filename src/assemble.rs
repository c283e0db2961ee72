use serde_json::{Map, Value};

use crate::bubble::{BubbleContent, BubbleResolver};
use crate::composer::MessageHeader;
use crate::error::Result;
use crate::paths::entry_path;
use crate::record::{CodeBlockEntry, ConversationRecord, FileStateEntry, MessageRecord};
use crate::store::KeyValueStore;

/// Text recorded for a message whose content could not be recovered.
pub const PLACEHOLDER: &str = "[Content not found in database]";

/// Rebuild one conversation from its ordered headers.
///
/// Messages keep the header order and are numbered from 1. A message counts as found
/// when a content document exists for it, even if no text could be extracted; in that
/// case its text is still [`PLACEHOLDER`]. The only error is an unreachable store.
pub fn assemble<S: KeyValueStore>(
    resolver: &BubbleResolver<S>,
    conversation_id: &str,
    headers: &[MessageHeader],
    code_block_meta: &Map<String, Value>,
    file_state_meta: &Map<String, Value>,
) -> Result<ConversationRecord> {
    let mut messages = Vec::with_capacity(headers.len());

    for (position, header) in headers.iter().enumerate() {
        let resolution = resolver.resolve(conversation_id, &header.bubble_id)?;
        let (text, content_found) = match resolution.document() {
            None => (PLACEHOLDER.to_string(), false),
            Some(doc) => {
                let text = BubbleContent::classify(doc).into_text();
                if text.is_empty() {
                    tracing::debug!(bubble_id = %header.bubble_id, "bubble has no recognizable text");
                    (PLACEHOLDER.to_string(), true)
                } else {
                    (text, true)
                }
            }
        };

        messages.push(MessageRecord::new(
            position + 1,
            header.bubble_id.clone(),
            header.role,
            text,
            content_found,
        ));
    }

    Ok(ConversationRecord::new(
        conversation_id.to_string(),
        messages,
        collect_code_blocks(code_block_meta),
        collect_file_states(file_state_meta),
    ))
}

fn collect_code_blocks(meta: &Map<String, Value>) -> Vec<CodeBlockEntry> {
    let mut blocks = Vec::new();
    for (file_key, per_file) in meta {
        let Some(per_file) = per_file.as_object() else {
            tracing::debug!(%file_key, "code block group is not an object, skipped");
            continue;
        };
        for (block_id, block) in per_file {
            let Some(block) = block.as_object() else {
                tracing::debug!(%file_key, %block_id, "code block is not an object, skipped");
                continue;
            };
            blocks.push(CodeBlockEntry::new(
                entry_path(block, file_key),
                file_key.clone(),
                block_id.clone(),
                block.clone(),
            ));
        }
    }
    blocks
}

fn collect_file_states(meta: &Map<String, Value>) -> Vec<FileStateEntry> {
    meta.iter()
        .filter_map(|(file_key, state)| {
            let state = state.as_object()?;
            Some(FileStateEntry::new(
                entry_path(state, file_key),
                file_key.clone(),
                state.clone(),
            ))
        })
        .collect()
}
