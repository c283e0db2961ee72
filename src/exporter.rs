use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

use crate::composer::ComposerData;
use crate::context::ProjectContext;
use crate::record::ConversationRecord;

/// Characters of original file content shown under each file state.
const PREVIEW_CHARS: usize = 200;

#[derive(Serialize)]
struct Frontmatter<'a> {
    id: &'a str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
    total_messages: usize,
    messages_with_content: usize,
    extracted_at: DateTime<Utc>,
}

pub fn write_markdown<W: Write>(
    writer: &mut W,
    record: &ConversationRecord,
    composer: &ComposerData,
    extracted_at: DateTime<Utc>,
) -> std::io::Result<()> {
    let fm = Frontmatter {
        id: record.id(),
        title: composer.title(),
        created_at: composer.created_at,
        updated_at: composer.last_updated_at,
        total_messages: record.total_messages(),
        messages_with_content: record.messages_with_content(),
        extracted_at,
    };

    writeln!(writer, "---")?;
    let yaml = serde_yaml::to_string(&fm).map_err(std::io::Error::other)?;
    write!(writer, "{}", yaml)?;
    writeln!(writer, "---")?;
    writeln!(writer)?;

    if !composer.title().is_empty() {
        writeln!(writer, "# {}", composer.title())?;
        writeln!(writer)?;
    }

    for msg in record.messages() {
        writeln!(writer, "## [{}] {}", msg.index(), msg.role().label())?;
        writeln!(writer)?;
        writeln!(writer, "{}", msg.text())?;
        writeln!(writer)?;
    }

    write_project_context(writer, record)?;

    Ok(())
}

fn write_project_context<W: Write>(
    writer: &mut W,
    record: &ConversationRecord,
) -> std::io::Result<()> {
    let ctx = ProjectContext::from_record(record);

    for (heading, states, status) in [
        ("Files Created", &ctx.files_created, "new file"),
        ("Files Modified", &ctx.files_modified, "modified"),
    ] {
        if states.is_empty() {
            continue;
        }
        writeln!(writer, "## {}", heading)?;
        writeln!(writer)?;
        for state in states {
            writeln!(writer, "### `{}` ({})", state.path(), status)?;
            writeln!(writer)?;
            if let Some(n) = state
                .first_edit_bubble_id()
                .and_then(|b| record.message_index(b))
            {
                writeln!(writer, "First edited in message [{}].", n)?;
                writeln!(writer)?;
            }
            if let Some(content) = state.content() {
                let preview: String = content.chars().take(PREVIEW_CHARS).collect();
                let ellipsis = if preview.len() < content.len() { "\n..." } else { "" };
                writeln!(writer, "```")?;
                writeln!(writer, "{}{}", preview, ellipsis)?;
                writeln!(writer, "```")?;
                writeln!(writer)?;
            }
        }
    }

    if !ctx.all_file_paths.is_empty() {
        writeln!(writer, "## All File Paths Referenced")?;
        writeln!(writer)?;
        for path in &ctx.all_file_paths {
            writeln!(writer, "- `{}`", path)?;
        }
        writeln!(writer)?;
    }

    if !record.code_blocks().is_empty() {
        writeln!(writer, "## Code Blocks Generated")?;
        writeln!(writer)?;
        for (path, blocks) in record.code_blocks_by_path() {
            writeln!(writer, "- `{}`: {} block(s)", path, blocks.len())?;
            for block in blocks {
                write!(
                    writer,
                    "  - {}, status: {}",
                    block.language_id().unwrap_or("unknown"),
                    block.status().unwrap_or("unknown")
                )?;
                match block.bubble_id().and_then(|b| record.message_index(b)) {
                    Some(n) => writeln!(writer, " (message [{}])", n)?,
                    None => writeln!(writer)?,
                }
            }
        }
        writeln!(writer)?;
    }

    if !ctx.paths_mentioned.is_empty() {
        writeln!(writer, "## Project Paths Mentioned")?;
        writeln!(writer)?;
        for path in &ctx.paths_mentioned {
            writeln!(writer, "- `{}`", path)?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

pub fn write_json<W: Write>(writer: &mut W, record: &ConversationRecord) -> serde_json::Result<()> {
    serde_json::to_writer_pretty(&mut *writer, record)?;
    writeln!(writer).map_err(serde_json::Error::io)
}
