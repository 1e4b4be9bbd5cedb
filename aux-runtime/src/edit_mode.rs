//! Realtime edit modes.

use serde::{Deserialize, Serialize};

use aux_common::TagUpdate;

/// How a single tag or tag mask write is handled.
///
/// The mode is decided per operation by the [`RuntimeBotInterface`]; there is
/// no per-bot state machine.
///
/// [`RuntimeBotInterface`]: crate::interface::RuntimeBotInterface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RealtimeEditMode {
    /// The write is rejected. Nothing changes and nothing is recorded.
    None = 0,
    /// The write applies to local memory right away.
    Immediate = 1,
    /// The write is recorded but only applied once an external authority
    /// accepts it.
    Delayed = 2,
}

impl RealtimeEditMode {
    /// Whether the write should show up in the bot's pending changes.
    pub fn records_change(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Whether the write should be applied to the compiled bot.
    pub fn applies_locally(&self) -> bool {
        matches!(self, Self::Immediate)
    }
}

/// Result of asking the interface about a write.
#[derive(Debug, Clone, PartialEq)]
pub struct EditResult {
    /// How the write is handled
    pub mode: RealtimeEditMode,
    /// Value recorded in the bot's changes
    pub changed_value: TagUpdate,
}

impl EditResult {
    /// Create a result.
    pub fn new(mode: RealtimeEditMode, changed_value: TagUpdate) -> Self {
        Self { mode, changed_value }
    }

    /// A rejected write.
    pub fn rejected() -> Self {
        Self::new(RealtimeEditMode::None, TagUpdate::delete())
    }
}
