use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use futures_util::{pin_mut, StreamExt};

use crate::ledger::Ledger;
use crate::planner::plan;
use crate::platform::{message_stream, ConversationRef, MediaSource};

/// Outcome of one sync pass over a single conversation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// New media files transferred and recorded.
    pub downloaded: usize,
    /// Candidates whose file was already on disk; recorded without transfer.
    pub recorded_existing: usize,
    /// Transfers that failed; left unrecorded so the next run retries them.
    pub failed: usize,
}

/// Runs one sequential sync pass: load the ledger, stream history through
/// the planner, transfer each yielded candidate, record each success
/// immediately. A ledger write failure aborts the pass with the downloaded
/// file left on disk and its id unrecorded, so the next run re-attempts
/// exactly that message.
pub async fn sync_conversation<S>(
    source: &S,
    conversation: &ConversationRef,
    output_root: &Path,
    limit: Option<usize>,
    page_size: usize,
) -> Result<SyncReport>
where
    S: MediaSource + ?Sized,
{
    let folder = output_root.join(conversation.id.to_string());
    tokio::fs::create_dir_all(&folder)
        .await
        .with_context(|| format!("failed to create {}", folder.display()))?;

    let mut ledger = Ledger::load(&folder)?;
    let existing = existing_file_names(&folder).await?;
    tracing::info!(
        conversation_id = conversation.id,
        recorded = ledger.len(),
        folder = %folder.display(),
        "starting sync pass"
    );

    let candidates = message_stream(source, conversation.id, page_size)
        .map(|item| item.map(|view| view.to_candidate()));
    let pending = plan(candidates, &ledger, limit);
    pin_mut!(pending);

    let mut report = SyncReport::default();
    while let Some(item) = pending.next().await {
        let candidate = item.context("message stream failed")?;

        if has_file_for(&existing, candidate.message_id) {
            println!(
                "[SKIP] File for message {} already exists.",
                candidate.message_id
            );
            ledger.record(candidate.message_id)?;
            report.recorded_existing += 1;
            continue;
        }

        let dest = folder.join(&candidate.suggested_filename);
        match source
            .fetch_media(conversation.id, candidate.message_id, &dest)
            .await
        {
            Ok(bytes) => {
                report.downloaded += 1;
                println!(
                    "[{}] Saved: {} ({bytes} bytes)",
                    report.downloaded,
                    dest.display()
                );
                // Record before moving on; a failure here must not mark the
                // message as downloaded.
                ledger.record(candidate.message_id)?;
            }
            Err(err) => {
                report.failed += 1;
                tracing::warn!(
                    message_id = candidate.message_id,
                    error = %err,
                    "download failed, will retry on next run"
                );
            }
        }
    }

    if let Some(limit) = limit {
        tracing::info!(limit, "scan bounded by message limit");
    }
    Ok(report)
}

/// Names already present in the folder, gathered once at pass start. A file
/// on disk without a ledger entry means a prior run crashed between transfer
/// and record; it is adopted instead of re-downloaded.
async fn existing_file_names(folder: &Path) -> Result<HashSet<String>> {
    let mut names = HashSet::new();
    let mut entries = tokio::fs::read_dir(folder)
        .await
        .with_context(|| format!("failed to list {}", folder.display()))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed to list {}", folder.display()))?
    {
        if let Ok(name) = entry.file_name().into_string() {
            names.insert(name);
        }
    }
    Ok(names)
}

fn has_file_for(existing: &HashSet<String>, message_id: i64) -> bool {
    let prefix = format!("{message_id}.");
    let bare = message_id.to_string();
    existing
        .iter()
        .any(|name| name.starts_with(&prefix) || *name == bare)
}
