//! Inter-instance note-passing: send, list, and acknowledge messages
//! between named agent instances (or a broadcast `"all"`).

use crate::config::Config;
use crate::error::{PalaceError, Result};
use crate::storage::handoff;
use crate::storage::Storage;
use crate::types::{HandoffMessage, VALID_MESSAGE_TYPES};

/// Send a message from one configured instance to another, or to `"all"`.
/// `from_instance` must be a configured instance; broadcasts may only be
/// sent *to* `"all"`, never *from* it.
pub async fn send_handoff(
    storage: &Storage,
    config: &Config,
    from_instance: &str,
    to_instance: &str,
    message_type: &str,
    content: &str,
    subject: Option<&str>,
) -> Result<i64> {
    if !config.instances.iter().any(|i| i == from_instance) {
        return Err(PalaceError::Validation(format!(
            "invalid from_instance {from_instance:?}, must be one of {:?}",
            config.instances
        )));
    }
    if to_instance != "all" && !config.instances.iter().any(|i| i == to_instance) {
        return Err(PalaceError::Validation(format!(
            "invalid to_instance {to_instance:?}, must be one of {:?} or \"all\"",
            config.instances
        )));
    }
    if !VALID_MESSAGE_TYPES.contains(&message_type) {
        return Err(PalaceError::Validation(format!(
            "invalid message_type {message_type:?}, must be one of {VALID_MESSAGE_TYPES:?}"
        )));
    }

    handoff::insert(storage, from_instance, to_instance, message_type, subject, content).await
}

/// Fetch messages addressed to `for_instance` (or broadcast to `"all"`).
pub async fn get_handoffs(
    storage: &Storage,
    config: &Config,
    for_instance: &str,
    unread_only: bool,
    message_type: Option<&str>,
    limit: i64,
) -> Result<Vec<HandoffMessage>> {
    if !config.instances.iter().any(|i| i == for_instance) {
        return Err(PalaceError::Validation(format!(
            "invalid for_instance {for_instance:?}, must be one of {:?}",
            config.instances
        )));
    }
    if let Some(mt) = message_type {
        if !VALID_MESSAGE_TYPES.contains(&mt) {
            return Err(PalaceError::Validation(format!(
                "invalid message_type {mt:?}, must be one of {VALID_MESSAGE_TYPES:?}"
            )));
        }
    }

    handoff::list_for_instance(storage, for_instance, unread_only, message_type, limit).await
}

/// Mark a message as read. Last-writer-wins: a repeat call against the same
/// message overwrites `read_by` rather than rejecting the second reader —
/// see `storage::handoff::mark_read`.
pub async fn mark_handoff_read(
    storage: &Storage,
    config: &Config,
    message_id: i64,
    read_by: &str,
) -> Result<()> {
    if !config.instances.iter().any(|i| i == read_by) {
        return Err(PalaceError::Validation(format!(
            "invalid read_by {read_by:?}, must be one of {:?}",
            config.instances
        )));
    }
    handoff::mark_read(storage, message_id, read_by).await
}
