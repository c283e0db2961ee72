//! # cursor-chat-export
//!
//! Recovers [Cursor](https://cursor.com) AI chat conversations from the editor's local
//! `state.vscdb` and writes them out as Markdown and JSON.
//!
//! ## What it does
//!
//! Cursor keeps each conversation in two places inside a SQLite key-value database: a
//! structural document (`composerData:<id>`) listing the ordered message headers and the
//! code/file metadata, and one content document per message (`bubbleId:<id>:<bubble>`).
//! Either may live in the `cursorDiskKV` table or the legacy `ItemTable`. This crate joins
//! the two back together, extracts message text (plain fields first, then the Lexical
//! rich-text tree), and keeps a placeholder for any message whose content is gone.
//!
//! The database is snapshotted with SQLite's backup API and only the snapshot is read.
//!
//! ## Incremental export
//!
//! Markdown files carry the conversation's `updated_at` in their frontmatter. On repeated
//! runs, conversations whose stored timestamp is not newer are skipped.
//!
//! ## Usage
//!
//! ```sh
//! # Export all conversations to a directory
//! cursor-chat-export ~/notes/cursor-chats
//!
//! # Only two conversations, JSON records only, four workers
//! cursor-chat-export out --conversation 20e7a53f-... --conversation 7c1b... --format json --jobs 4
//! ```
//!
//! Preferences can be persisted in `~/.config/cursor-chat-export/config.toml`.
pub mod assemble;
pub mod bubble;
pub mod composer;
pub mod context;
pub mod error;
pub mod exporter;
pub mod parallel;
pub mod paths;
pub mod process;
pub mod record;
pub mod recover;
pub mod rich_text;
pub mod sequential;
pub mod store;
pub mod utils;

pub use assemble::{PLACEHOLDER, assemble};
pub use bubble::{BubbleContent, BubbleResolver, Resolution};
pub use composer::{ComposerData, MessageHeader, Role};
pub use context::ProjectContext;
pub use error::StoreError;
pub use record::{CodeBlockEntry, ConversationRecord, FileStateEntry, MessageRecord};
pub use recover::{ComposerLookup, list_conversations, load_composer, recover_conversation};
pub use store::{KeyValueStore, Lookup, MemoryStore, SqliteStore, Table};
pub use utils::{ExportConfig, OutputFormat, Summary};

/// Run a full export, sequentially for a single job and with a worker pool otherwise.
pub fn export(config: &ExportConfig) -> eyre::Result<Summary> {
    if config.jobs > 1 {
        parallel::execute(config)
    } else {
        sequential::execute(config)
    }
}
