//! Compiled bot records.
//!
//! A [`CompiledBot`] is the authoritative in-memory record for one bot after
//! its tags have been compiled. It is a transparent record: it has no
//! mutation methods and enforces no policy. Policy lives one layer up, in the
//! [`RuntimeBotInterface`](crate::interface::RuntimeBotInterface), and every
//! script-visible access goes through a [`RuntimeBot`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use aux_common::{BotSpace, BotTagMasks, BotTags};

use crate::interpreter::ListenerOutput;
use crate::runtime_bot::{RuntimeBot, WeakRuntimeBot};

/// A compiled listener. Receives the listener argument.
pub type CompiledBotListener = Arc<dyn Fn(Value) -> ListenerOutput + Send + Sync>;

/// A compiled module initializer.
pub type CompiledBotModule = Arc<dyn Fn(Value) -> ListenerOutput + Send + Sync>;

/// Compiled bot shared between its runtime bot and the runtime.
pub type SharedCompiledBot = Arc<RwLock<CompiledBot>>;

/// When a breakpoint pauses a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakpointState {
    /// Before the statement runs
    Before,
    /// After the statement runs
    After,
}

/// A debugger breakpoint registered for a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    /// Breakpoint ID
    pub id: String,
    /// Bot the breakpoint is set on
    pub bot_id: String,
    /// Tag the breakpoint is set in
    pub tag: String,
    /// 1-based line number
    pub line_number: u32,
    /// 1-based column number
    pub column_number: u32,
    /// States the breakpoint pauses in
    pub states: Vec<BreakpointState>,
    /// Whether the breakpoint is disabled
    #[serde(default)]
    pub disabled: bool,
}

/// The canonical record for one bot.
#[derive(Clone)]
pub struct CompiledBot {
    /// Unique bot ID
    pub id: String,
    /// Space the bot lives in. `None` means the default space.
    pub space: Option<BotSpace>,
    /// Raw tag values as authored
    pub tags: BotTags,
    /// Precalculated tag values
    pub values: BotTags,
    /// Tag mask overrides by space
    pub masks: BotTagMasks,
    /// Compiled listeners by tag
    pub listeners: BTreeMap<String, CompiledBotListener>,
    /// Dynamically registered listeners that shadow the compiled ones
    pub listener_overrides: BTreeMap<String, CompiledBotListener>,
    /// Compiled modules by tag
    pub modules: BTreeMap<String, CompiledBotModule>,
    /// Values exported by modules, by tag
    pub exports: BTreeMap<String, Value>,
    /// Signature hash to signed tag
    pub signatures: BTreeMap<String, String>,
    /// Runtime bot wrapping this record
    pub script: Option<WeakRuntimeBot>,
    /// Tag values before the first pending edit
    pub original_tag_edit_values: BTreeMap<String, Value>,
    /// Tag mask values before the first pending edit
    pub original_tag_mask_edit_values: BTreeMap<BotSpace, BTreeMap<String, Value>>,
    /// Breakpoints registered in this bot's tags
    pub breakpoints: Vec<Breakpoint>,
    /// Number of script errors per tag
    pub error_counts: BTreeMap<String, u32>,
}

impl CompiledBot {
    /// Create a compiled bot whose raw tags equal its values.
    pub fn new(id: impl Into<String>, values: BotTags) -> Self {
        Self {
            id: id.into(),
            space: None,
            tags: values.clone(),
            values,
            masks: BotTagMasks::new(),
            listeners: BTreeMap::new(),
            listener_overrides: BTreeMap::new(),
            modules: BTreeMap::new(),
            exports: BTreeMap::new(),
            signatures: BTreeMap::new(),
            script: None,
            original_tag_edit_values: BTreeMap::new(),
            original_tag_mask_edit_values: BTreeMap::new(),
            breakpoints: Vec::new(),
            error_counts: BTreeMap::new(),
        }
    }

    /// Set the raw tags.
    pub fn with_tags(mut self, tags: BotTags) -> Self {
        self.tags = tags;
        self
    }

    /// Set the space.
    pub fn with_space(mut self, space: BotSpace) -> Self {
        self.space = Some(space);
        self
    }

    /// Set the tag masks.
    pub fn with_masks(mut self, masks: BotTagMasks) -> Self {
        self.masks = masks;
        self
    }

    /// Add a compiled listener.
    pub fn with_listener(mut self, tag: impl Into<String>, listener: CompiledBotListener) -> Self {
        self.listeners.insert(tag.into(), listener);
        self
    }

    /// Set the compiled listeners.
    pub fn with_listeners(mut self, listeners: BTreeMap<String, CompiledBotListener>) -> Self {
        self.listeners = listeners;
        self
    }

    /// Add a dynamically registered listener.
    pub fn with_listener_override(
        mut self,
        tag: impl Into<String>,
        listener: CompiledBotListener,
    ) -> Self {
        self.listener_overrides.insert(tag.into(), listener);
        self
    }

    /// Set the signatures.
    pub fn with_signatures(mut self, signatures: BTreeMap<String, String>) -> Self {
        self.signatures = signatures;
        self
    }

    /// Set the compiled modules.
    pub fn with_modules(mut self, modules: BTreeMap<String, CompiledBotModule>) -> Self {
        self.modules = modules;
        self
    }

    /// The runtime bot wrapping this record, if it is still alive.
    pub fn script(&self) -> Option<RuntimeBot> {
        self.script.as_ref().and_then(WeakRuntimeBot::upgrade)
    }

    /// Names of every listener, compiled or dynamically registered.
    pub fn listener_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .listeners
            .keys()
            .chain(self.listener_overrides.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

impl fmt::Debug for CompiledBot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledBot")
            .field("id", &self.id)
            .field("space", &self.space)
            .field("tags", &self.tags)
            .field("values", &self.values)
            .field("masks", &self.masks)
            .field("listeners", &self.listeners.keys().collect::<Vec<_>>())
            .field("signatures", &self.signatures)
            .field("breakpoints", &self.breakpoints)
            .field("error_counts", &self.error_counts)
            .finish_non_exhaustive()
    }
}

/// Create a compiled bot.
///
/// When `tags` is omitted the bot was authored directly with precalculated
/// values, so the raw tags are the values. When `space` is omitted the bot
/// has no space field at all, which means the default space.
pub fn create_compiled_bot(
    id: impl Into<String>,
    values: BotTags,
    tags: Option<BotTags>,
    space: Option<BotSpace>,
) -> CompiledBot {
    let mut bot = CompiledBot::new(id, values);
    if let Some(tags) = tags {
        bot = bot.with_tags(tags);
    }
    if let Some(space) = space {
        bot = bot.with_space(space);
    }
    bot
}
