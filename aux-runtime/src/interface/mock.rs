//! In-memory collaborators for testing.
//!
//! [`MockBotInterface`] is a reference implementation of the policy
//! boundary: reads overlay tag masks on the compiled values, and every write
//! is classified with a configurable edit mode and recorded for inspection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use aux_common::{
    highest_priority_mask, parse_bot_link, Bot, BotAction, BotSpace, CurrentVersion, TagUpdate,
};

use super::traits::*;
use crate::compiled_bot::{create_compiled_bot, CompiledBot, CompiledBotListener};
use crate::edit_mode::{EditResult, RealtimeEditMode};
use crate::interpreter::{GeneratorStep, ScriptGenerator};
use crate::runtime_bot::{RuntimeBot, WeakRuntimeBot};
use crate::sync::lock;

/// A recorded `update_tag` call.
#[derive(Debug, Clone, PartialEq)]
pub struct TagUpdateCall {
    pub bot_id: String,
    pub tag: String,
    pub value: TagUpdate,
}

/// A recorded `update_tag_mask` call.
#[derive(Debug, Clone, PartialEq)]
pub struct TagMaskUpdateCall {
    pub bot_id: String,
    pub tag: String,
    pub spaces: Vec<BotSpace>,
    pub value: TagUpdate,
}

/// Mock policy interface.
pub struct MockBotInterface {
    edit_mode: Mutex<RealtimeEditMode>,
    mask_edit_mode: Mutex<RealtimeEditMode>,
    version: Mutex<CurrentVersion>,
    bots: Mutex<HashMap<String, WeakRuntimeBot>>,
    tag_updates: Mutex<Vec<TagUpdateCall>>,
    mask_updates: Mutex<Vec<TagMaskUpdateCall>>,
    actions: Mutex<Vec<BotAction>>,
    change_count: AtomicU32,
}

impl MockBotInterface {
    /// Create an interface that applies every write immediately.
    pub fn new() -> Self {
        Self {
            edit_mode: Mutex::new(RealtimeEditMode::Immediate),
            mask_edit_mode: Mutex::new(RealtimeEditMode::Immediate),
            version: Mutex::new(CurrentVersion::default()),
            bots: Mutex::new(HashMap::new()),
            tag_updates: Mutex::new(Vec::new()),
            mask_updates: Mutex::new(Vec::new()),
            actions: Mutex::new(Vec::new()),
            change_count: AtomicU32::new(0),
        }
    }

    /// Set the mode tag writes are classified with.
    pub fn with_edit_mode(self, mode: RealtimeEditMode) -> Self {
        self.set_edit_mode(mode);
        self
    }

    /// Set the mode tag mask writes are classified with.
    pub fn with_mask_edit_mode(self, mode: RealtimeEditMode) -> Self {
        self.set_mask_edit_mode(mode);
        self
    }

    /// Set the version edits are stamped with.
    pub fn with_version(self, version: CurrentVersion) -> Self {
        *lock(&self.version) = version;
        self
    }

    pub fn set_edit_mode(&self, mode: RealtimeEditMode) {
        *lock(&self.edit_mode) = mode;
    }

    pub fn set_mask_edit_mode(&self, mode: RealtimeEditMode) {
        *lock(&self.mask_edit_mode) = mode;
    }

    pub fn set_version(&self, version: CurrentVersion) {
        *lock(&self.version) = version;
    }

    /// Make a bot resolvable through links.
    pub fn register(&self, bot: &RuntimeBot) {
        lock(&self.bots).insert(bot.id(), bot.downgrade());
    }

    /// Stop resolving a bot through links.
    pub fn unregister(&self, id: &str) {
        lock(&self.bots).remove(id);
    }

    /// Every `update_tag` call so far.
    pub fn tag_updates(&self) -> Vec<TagUpdateCall> {
        lock(&self.tag_updates).clone()
    }

    /// Every `update_tag_mask` call so far.
    pub fn mask_updates(&self) -> Vec<TagMaskUpdateCall> {
        lock(&self.mask_updates).clone()
    }

    /// Actions announced through the batching hook.
    pub fn actions(&self) -> Vec<BotAction> {
        lock(&self.actions).clone()
    }

    /// Number of `notify_change` calls.
    pub fn change_count(&self) -> u32 {
        self.change_count.load(Ordering::SeqCst)
    }

    /// Forget every recorded call.
    pub fn reset(&self) {
        lock(&self.tag_updates).clear();
        lock(&self.mask_updates).clear();
        lock(&self.actions).clear();
        self.change_count.store(0, Ordering::SeqCst);
    }

    fn lookup(&self, id: &str) -> Option<RuntimeBot> {
        lock(&self.bots).get(id).and_then(WeakRuntimeBot::upgrade)
    }
}

impl Default for MockBotInterface {
    fn default() -> Self {
        Self::new()
    }
}

/// Value recorded in changes: edits are stamped as remote, values pass
/// through.
fn changed_value(mode: RealtimeEditMode, value: &TagUpdate) -> EditResult {
    if mode == RealtimeEditMode::None {
        return EditResult::rejected();
    }
    let changed = match value {
        TagUpdate::Edit(edit) => TagUpdate::Edit(edit.clone().into_remote()),
        TagUpdate::Value(value) => TagUpdate::Value(value.clone()),
    };
    EditResult::new(mode, changed)
}

impl RuntimeBatcher for MockBotInterface {
    fn notify_change(&self) {
        self.change_count.fetch_add(1, Ordering::SeqCst);
    }

    fn notify_action_enqueued(&self, action: &BotAction) {
        lock(&self.actions).push(action.clone());
    }
}

impl RuntimeBotInterface for MockBotInterface {
    fn update_tag(&self, bot: &CompiledBot, tag: &str, value: &TagUpdate) -> EditResult {
        lock(&self.tag_updates).push(TagUpdateCall {
            bot_id: bot.id.clone(),
            tag: tag.to_string(),
            value: value.clone(),
        });
        changed_value(*lock(&self.edit_mode), value)
    }

    fn update_tag_mask(
        &self,
        bot: &CompiledBot,
        tag: &str,
        spaces: &[BotSpace],
        value: &TagUpdate,
    ) -> EditResult {
        lock(&self.mask_updates).push(TagMaskUpdateCall {
            bot_id: bot.id.clone(),
            tag: tag.to_string(),
            spaces: spaces.to_vec(),
            value: value.clone(),
        });
        changed_value(*lock(&self.mask_edit_mode), value)
    }

    fn get_value(&self, bot: &CompiledBot, tag: &str) -> Option<Value> {
        match highest_priority_mask(&bot.masks, tag) {
            Some((_, mask)) => Some(mask.clone()),
            None => bot.values.get(tag).cloned(),
        }
    }

    fn get_raw_value(&self, bot: &CompiledBot, tag: &str) -> Option<Value> {
        bot.tags.get(tag).cloned()
    }

    fn get_tag_mask(&self, bot: &CompiledBot, tag: &str) -> Option<Value> {
        highest_priority_mask(&bot.masks, tag).map(|(_, mask)| mask.clone())
    }

    fn get_tag_link(&self, bot: &CompiledBot, tag: &str) -> Option<TagLink> {
        let ids = parse_bot_link(&self.get_value(bot, tag)?)?;
        let mut bots: Vec<RuntimeBot> = ids.iter().filter_map(|id| self.lookup(id)).collect();
        match (ids.len(), bots.len()) {
            (_, 0) => None,
            (1, 1) => bots.pop().map(TagLink::Bot),
            _ => Some(TagLink::Bots(bots)),
        }
    }

    fn get_listener(&self, bot: &CompiledBot, tag: &str) -> Option<CompiledBotListener> {
        bot.listener_overrides
            .get(tag)
            .or_else(|| bot.listeners.get(tag))
            .cloned()
    }

    fn get_signature(&self, bot: &CompiledBot, signature: &str) -> Option<String> {
        bot.signatures.get(signature).cloned()
    }

    fn current_version(&self) -> CurrentVersion {
        lock(&self.version).clone()
    }
}

/// Mock factory building runtime bots over a [`MockBotInterface`].
pub struct MockBotFactory {
    interface: Arc<MockBotInterface>,
    create_enabled: AtomicBool,
    destroy_mode: Mutex<RealtimeEditMode>,
    destroyed: Mutex<Vec<String>>,
}

impl MockBotFactory {
    /// Create a factory that creates and destroys bots immediately.
    pub fn new(interface: Arc<MockBotInterface>) -> Self {
        Self {
            interface,
            create_enabled: AtomicBool::new(true),
            destroy_mode: Mutex::new(RealtimeEditMode::Immediate),
            destroyed: Mutex::new(Vec::new()),
        }
    }

    /// Allow or refuse bot creation.
    pub fn set_create_enabled(&self, enabled: bool) {
        self.create_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Set the mode bot destruction reports.
    pub fn set_destroy_mode(&self, mode: RealtimeEditMode) {
        *lock(&self.destroy_mode) = mode;
    }

    /// The interface created bots delegate to.
    pub fn interface(&self) -> Arc<MockBotInterface> {
        self.interface.clone()
    }

    /// IDs of every bot passed to `destroy_script_bot`.
    pub fn destroyed(&self) -> Vec<String> {
        lock(&self.destroyed).clone()
    }
}

impl RuntimeBotFactory for MockBotFactory {
    fn create_runtime_bot(&self, bot: Bot, default_mask_space: BotSpace) -> Option<RuntimeBot> {
        if !self.create_enabled.load(Ordering::SeqCst) {
            return None;
        }
        let compiled = create_compiled_bot(bot.id, bot.tags, None, bot.space)
            .with_masks(bot.masks)
            .with_signatures(bot.signatures);
        let runtime_bot = RuntimeBot::with_default_mask_space(
            compiled,
            self.interface.clone(),
            default_mask_space,
        );
        self.interface.register(&runtime_bot);
        Some(runtime_bot)
    }

    fn destroy_script_bot(&self, bot: &RuntimeBot) -> RealtimeEditMode {
        let id = bot.id();
        let mode = *lock(&self.destroy_mode);
        if mode == RealtimeEditMode::Immediate {
            self.interface.unregister(&id);
        }
        lock(&self.destroyed).push(id);
        mode
    }
}

/// Mock batcher counting notifications.
#[derive(Default)]
pub struct MockBatcher {
    change_count: AtomicU32,
    actions: Mutex<Vec<BotAction>>,
}

impl MockBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `notify_change` calls.
    pub fn change_count(&self) -> u32 {
        self.change_count.load(Ordering::SeqCst)
    }

    /// Actions announced so far.
    pub fn actions(&self) -> Vec<BotAction> {
        lock(&self.actions).clone()
    }
}

impl RuntimeBatcher for MockBatcher {
    fn notify_change(&self) {
        self.change_count.fetch_add(1, Ordering::SeqCst);
    }

    fn notify_action_enqueued(&self, action: &BotAction) {
        lock(&self.actions).push(action.clone());
    }
}

/// Mock processor that runs every generator to completion.
pub struct MockGeneratorProcessor {
    max_steps: usize,
    results: Mutex<Vec<Value>>,
}

impl MockGeneratorProcessor {
    pub fn new() -> Self {
        Self {
            max_steps: 10_000,
            results: Mutex::new(Vec::new()),
        }
    }

    /// Give up on generators that have not returned after `max_steps`.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Return values of every generator that finished.
    pub fn results(&self) -> Vec<Value> {
        lock(&self.results).clone()
    }

    /// Number of generators that finished.
    pub fn processed_count(&self) -> usize {
        lock(&self.results).len()
    }
}

impl Default for MockGeneratorProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeInterpreterGeneratorProcessor for MockGeneratorProcessor {
    fn process_generator(&self, mut generator: Box<dyn ScriptGenerator>) {
        let mut input = Value::Null;
        for _ in 0..self.max_steps {
            match generator.resume(input) {
                GeneratorStep::Return(value) => {
                    lock(&self.results).push(value);
                    return;
                }
                GeneratorStep::Yield(value) => input = value,
            }
        }
    }
}
