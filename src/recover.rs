//! Conversation discovery and the per-conversation reconstruction entry point.
use std::collections::HashSet;

use crate::assemble::assemble;
use crate::bubble::BubbleResolver;
use crate::composer::ComposerData;
use crate::error::Result;
use crate::record::ConversationRecord;
use crate::store::{KeyValueStore, Lookup, Table};

pub const COMPOSER_KEY_PREFIX: &str = "composerData:";

/// Tables searched for a structural document, in priority order.
pub const COMPOSER_LOCATIONS: [Table; 2] = [Table::CursorDiskKv, Table::ItemTable];

pub fn composer_key(conversation_id: &str) -> String {
    format!("{COMPOSER_KEY_PREFIX}{conversation_id}")
}

/// Ids of every conversation with a structural document, deduplicated, primary table first.
pub fn list_conversations<S: KeyValueStore>(store: &S) -> Result<Vec<String>> {
    let mut ids: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for table in COMPOSER_LOCATIONS {
        for key in store.keys_with_prefix(table, COMPOSER_KEY_PREFIX)? {
            let id = &key[COMPOSER_KEY_PREFIX.len()..];
            if !id.is_empty() && seen.insert(id.to_string()) {
                ids.push(id.to_string());
            }
        }
    }
    Ok(ids)
}

#[derive(Debug)]
pub enum ComposerLookup {
    Found(ComposerData),
    /// Present but undecodable in every location that had it.
    Malformed(serde_json::Error),
    Missing,
}

/// Load the structural document of one conversation.
pub fn load_composer<S: KeyValueStore>(store: &S, conversation_id: &str) -> Result<ComposerLookup> {
    let key = composer_key(conversation_id);
    let mut malformed = None;

    for table in COMPOSER_LOCATIONS {
        let Lookup::Found(bytes) = store.lookup(table, &key)? else {
            continue;
        };
        let text = String::from_utf8_lossy(&bytes);
        match serde_json::from_str::<ComposerData>(&text) {
            Ok(data) => return Ok(ComposerLookup::Found(data)),
            Err(e) => {
                tracing::debug!(%table, %key, error = %e, "malformed composer document");
                malformed = Some(e);
            }
        }
    }

    Ok(match malformed {
        Some(e) => ComposerLookup::Malformed(e),
        None => ComposerLookup::Missing,
    })
}

/// Rebuild a conversation from its structural document, resolving message content
/// through `resolver`.
pub fn recover_conversation<S: KeyValueStore>(
    resolver: &BubbleResolver<S>,
    conversation_id: &str,
    composer: &ComposerData,
) -> Result<ConversationRecord> {
    let record = assemble(
        resolver,
        conversation_id,
        composer.headers(),
        &composer.code_block_data,
        &composer.original_file_states,
    )?;

    tracing::info!(
        conversation = conversation_id,
        total = record.total_messages(),
        with_content = record.messages_with_content(),
        code_blocks = record.code_blocks().len(),
        file_states = record.file_states().len(),
        "recovered conversation"
    );

    Ok(record)
}
