use anyhow::{Context, Result};
use dialoguer::Select;

use crate::platform::ConversationRef;

/// Presents the conversation list and returns the chosen entry, or `None`
/// when the prompt is cancelled or there is nothing to pick.
pub fn choose_conversation(dialogs: &[ConversationRef]) -> Result<Option<ConversationRef>> {
    if dialogs.is_empty() {
        return Ok(None);
    }
    let rows: Vec<String> = dialogs.iter().map(row).collect();
    let picked = Select::new()
        .with_prompt("Select a chat/channel")
        .items(&rows)
        .default(0)
        .interact_opt()
        .context("selection prompt failed")?;
    Ok(picked.map(|index| dialogs[index].clone()))
}

fn row(dialog: &ConversationRef) -> String {
    match dialog.kind.as_deref() {
        Some(kind) => format!("{} ({}, {kind})", dialog.name, dialog.id),
        None => format!("{} ({})", dialog.name, dialog.id),
    }
}
