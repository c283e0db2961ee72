//! Project recovery view of a conversation: files it created or modified, every path
//! its metadata references, and filesystem paths quoted in the message text.
use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::assemble::PLACEHOLDER;
use crate::record::{ConversationRecord, FileStateEntry};

/// Cap on mentioned paths listed per conversation.
pub const MAX_MENTIONED_PATHS: usize = 50;

// `C:\src\app.py`, `/c:/src/app.py`
static WINDOWS_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[A-Za-z]:\\[^\s`'"<>|]+|/[A-Za-z]:/[^\s`'"<>|]+"#).expect("valid regex")
});

// An absolute path starting a word: `/home/u/app`, `(/etc/hosts)`.
static UNIX_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[\s(\[`'"])(/[^\s`'"()\[\]<>]+)"#).expect("valid regex")
});

const TRAILING_PUNCTUATION: [char; 6] = ['.', ',', ':', ';', '!', '?'];

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectContext<'a> {
    pub files_created: Vec<&'a FileStateEntry>,
    pub files_modified: Vec<&'a FileStateEntry>,
    pub all_file_paths: Vec<&'a str>,
    /// Sorted, deduplicated, at most [`MAX_MENTIONED_PATHS`].
    pub paths_mentioned: Vec<String>,
}

impl<'a> ProjectContext<'a> {
    pub fn from_record(record: &'a ConversationRecord) -> Self {
        let (files_created, files_modified): (Vec<_>, Vec<_>) = record
            .file_states()
            .iter()
            .partition(|state| state.is_newly_created());

        let mut mentioned = BTreeSet::new();
        for msg in record.messages() {
            if msg.content_found() && msg.text() != PLACEHOLDER {
                mentioned.extend(mentioned_paths(msg.text()));
            }
        }

        Self {
            files_created,
            files_modified,
            all_file_paths: record.file_paths(),
            paths_mentioned: mentioned
                .into_iter()
                .take(MAX_MENTIONED_PATHS)
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Filesystem paths quoted in `text`, Windows drive paths and absolute Unix paths
/// longer than three characters.
pub fn mentioned_paths(text: &str) -> Vec<&str> {
    let windows = WINDOWS_PATH.find_iter(text).map(|m| m.as_str());
    let unix = UNIX_PATH
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str());

    windows
        .chain(unix)
        .map(|p| p.trim_end_matches(TRAILING_PUNCTUATION))
        .filter(|p| p.len() > 3)
        .collect()
}
