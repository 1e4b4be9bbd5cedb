//! Side effects queued by scripts for the surrounding simulation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bots::Bot;

/// An action produced while scripts run.
///
/// Actions are collected by the global context and handed to the batcher,
/// which forwards them to partitions (bot lifecycle) or to the host
/// application (everything else).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BotAction {
    /// A bot should be added to its partition
    AddBot {
        /// ID of the new bot
        id: String,
        /// The bot record
        bot: Bot,
    },
    /// A bot should be removed from its partition
    RemoveBot {
        /// ID of the removed bot
        id: String,
    },
    /// Any other action, identified by name
    Custom {
        /// Action name
        name: String,
        /// Action payload
        #[serde(default)]
        data: Value,
    },
}

impl BotAction {
    /// Create a custom action.
    pub fn custom(name: impl Into<String>, data: Value) -> Self {
        Self::Custom {
            name: name.into(),
            data,
        }
    }
}

/// Action announcing that a bot was added.
pub fn bot_added(bot: Bot) -> BotAction {
    BotAction::AddBot {
        id: bot.id.clone(),
        bot,
    }
}

/// Action announcing that a bot was removed.
pub fn bot_removed(id: impl Into<String>) -> BotAction {
    BotAction::RemoveBot { id: id.into() }
}
