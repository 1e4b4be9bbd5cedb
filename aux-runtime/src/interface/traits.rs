//! Collaborator traits.

use serde_json::Value;

use aux_common::{Bot, BotAction, BotSpace, CurrentVersion, TagUpdate};

use crate::compiled_bot::{CompiledBot, CompiledBotListener};
use crate::edit_mode::{EditResult, RealtimeEditMode};
use crate::interpreter::ScriptGenerator;
use crate::runtime_bot::RuntimeBot;

/// Receives notifications that something changed while scripts ran.
///
/// Implementations are expected to debounce; the runtime notifies on every
/// individual change.
pub trait RuntimeBatcher: Send + Sync {
    /// A bot changed.
    fn notify_change(&self);

    /// An action was queued.
    fn notify_action_enqueued(&self, action: &BotAction);
}

/// Bots referenced by a bot link tag.
#[derive(Debug, Clone, PartialEq)]
pub enum TagLink {
    /// The link references a single bot
    Bot(RuntimeBot),
    /// The link references several bots
    Bots(Vec<RuntimeBot>),
}

impl TagLink {
    /// IDs of the linked bots.
    pub fn ids(&self) -> Vec<String> {
        match self {
            Self::Bot(bot) => vec![bot.id()],
            Self::Bots(bots) => bots.iter().map(RuntimeBot::id).collect(),
        }
    }

    /// The linked bot when the link references exactly one bot.
    pub fn as_bot(&self) -> Option<&RuntimeBot> {
        match self {
            Self::Bot(bot) => Some(bot),
            Self::Bots(_) => None,
        }
    }
}

/// Policy and accessor boundary for runtime bots.
///
/// Every read and write a script makes through a [`RuntimeBot`] is delegated
/// here. Writes are classified with a [`RealtimeEditMode`]; the runtime bot
/// applies and records them accordingly.
pub trait RuntimeBotInterface: RuntimeBatcher {
    /// Classify a tag write. Must not fail for ordinary values.
    fn update_tag(&self, bot: &CompiledBot, tag: &str, value: &TagUpdate) -> EditResult;

    /// Classify a tag mask write targeting the given spaces.
    fn update_tag_mask(
        &self,
        bot: &CompiledBot,
        tag: &str,
        spaces: &[BotSpace],
        value: &TagUpdate,
    ) -> EditResult;

    /// Computed value of a tag, with tag masks applied.
    fn get_value(&self, bot: &CompiledBot, tag: &str) -> Option<Value>;

    /// Raw (uncompiled) value of a tag.
    fn get_raw_value(&self, bot: &CompiledBot, tag: &str) -> Option<Value>;

    /// Highest priority tag mask value.
    fn get_tag_mask(&self, bot: &CompiledBot, tag: &str) -> Option<Value>;

    /// Bots referenced by a link tag.
    fn get_tag_link(&self, bot: &CompiledBot, tag: &str) -> Option<TagLink>;

    /// Listener registered for a tag.
    fn get_listener(&self, bot: &CompiledBot, tag: &str) -> Option<CompiledBotListener>;

    /// Tag covered by a signature.
    fn get_signature(&self, bot: &CompiledBot, signature: &str) -> Option<String>;

    /// Version edits are stamped with.
    fn current_version(&self) -> CurrentVersion;
}

/// Creates and destroys runtime bots on behalf of the global context.
pub trait RuntimeBotFactory: Send + Sync {
    /// Materialize a runtime bot whose unqualified mask writes go to
    /// `default_mask_space`. `None` when the bot may not be created locally.
    fn create_runtime_bot(&self, bot: Bot, default_mask_space: BotSpace) -> Option<RuntimeBot>;

    /// Destroy a runtime bot and report how the removal is handled.
    fn destroy_script_bot(&self, bot: &RuntimeBot) -> RealtimeEditMode;
}

/// Steps suspended scripts.
pub trait RuntimeInterpreterGeneratorProcessor: Send + Sync {
    /// Take ownership of a suspended script and run it.
    fn process_generator(&self, generator: Box<dyn ScriptGenerator>);
}
