//! Runtime bots.
//!
//! A [`RuntimeBot`] is the object scripts interact with. It projects a
//! [`CompiledBot`] through a [`RuntimeBotInterface`]: reads resolve through
//! the interface's accessors, writes are classified by the interface and then
//! applied and/or recorded as pending changes.
//!
//! Tag access is split into explicit views ([`TagsView`], [`RawTagsView`],
//! [`MasksView`], [`LinksView`], [`ListenersView`], [`SignaturesView`]), each
//! offering `get`/`set`/`delete`/`keys`. Array values can be read as a
//! [`TrackedArray`] whose in-place mutations run through the same write
//! pipeline. Operations that are not tag access (clearing changes, editing
//! text, replacing the bot) live on the [`RuntimeBotControl`] capability.

mod tracked_array;
mod views;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock, Weak};

use serde_json::{Map, Value};
use tracing::debug;

use aux_common::{
    edit, has_value, spaces_with_mask, Bot, BotSpace, BotTagMasks, TagEditOp, TagUpdate,
    CONSTANT_TAGS, DEFAULT_TAG_MASK_SPACE, TAG_MASK_SPACE_PRIORITIES,
};

use crate::compiled_bot::{CompiledBot, SharedCompiledBot};
use crate::edit_mode::RealtimeEditMode;
use crate::interface::RuntimeBotInterface;
use crate::sync::{lock, read, write};
use crate::types::{Result, RuntimeError};

pub use tracked_array::{ArrayBacking, TrackedArray};
pub use views::{
    LinkTarget, LinksView, ListenersView, MasksView, RawTagsView, SignaturesView, TagsView,
};

/// Pending tag changes by tag.
pub type TagChanges = BTreeMap<String, TagUpdate>;

/// Pending tag mask changes by space, then tag.
pub type TagMaskChanges = BTreeMap<BotSpace, TagChanges>;

/// Script-local scratch state attached to a bot.
///
/// Not tracked and not synchronized. Cloning shares the same storage.
#[derive(Clone, Default)]
pub struct Vars(Arc<Mutex<Map<String, Value>>>);

impl Vars {
    /// Read a variable.
    pub fn get(&self, key: &str) -> Option<Value> {
        lock(&self.0).get(key).cloned()
    }

    /// Write a variable.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        lock(&self.0).insert(key.into(), value.into());
    }

    /// Remove a variable.
    pub fn remove(&self, key: &str) -> Option<Value> {
        lock(&self.0).remove(key)
    }

    /// Names of every variable.
    pub fn keys(&self) -> Vec<String> {
        lock(&self.0).keys().cloned().collect()
    }

    /// Whether both handles share the same storage.
    pub fn ptr_eq(&self, other: &Vars) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Vars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Vars").field(&*lock(&self.0)).finish()
    }
}

struct RuntimeBotState {
    id: String,
    space: Option<BotSpace>,
    compiled: SharedCompiledBot,
    manager: Arc<dyn RuntimeBotInterface>,
    default_mask_space: BotSpace,
    changes: Mutex<TagChanges>,
    mask_changes: Mutex<TagMaskChanges>,
    /// Tags whose value and mask in a space were assigned the same array
    shared_arrays: Mutex<BTreeMap<String, BotSpace>>,
    vars: RwLock<Vars>,
    replacement: RwLock<Option<RuntimeBot>>,
}

/// Script-facing projection over a compiled bot.
///
/// Cloning is cheap and yields another handle to the same bot.
#[derive(Clone)]
pub struct RuntimeBot {
    state: Arc<RuntimeBotState>,
}

/// Non-owning reference to a runtime bot.
#[derive(Clone)]
pub struct WeakRuntimeBot(Weak<RuntimeBotState>);

impl WeakRuntimeBot {
    /// Get the bot if it is still alive.
    pub fn upgrade(&self) -> Option<RuntimeBot> {
        self.0.upgrade().map(|state| RuntimeBot { state })
    }
}

impl fmt::Debug for WeakRuntimeBot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakRuntimeBot(..)")
    }
}

impl RuntimeBot {
    /// Wrap a compiled bot, using the default tag mask space.
    pub fn new(compiled: CompiledBot, manager: Arc<dyn RuntimeBotInterface>) -> Self {
        Self::with_default_mask_space(compiled, manager, DEFAULT_TAG_MASK_SPACE)
    }

    /// Wrap a compiled bot with a custom default tag mask space.
    ///
    /// The compiled bot's `script` back-reference is pointed at the new bot.
    pub fn with_default_mask_space(
        mut compiled: CompiledBot,
        manager: Arc<dyn RuntimeBotInterface>,
        default_mask_space: BotSpace,
    ) -> Self {
        let state = Arc::new_cyclic(move |weak| {
            compiled.script = Some(WeakRuntimeBot(weak.clone()));
            RuntimeBotState {
                id: compiled.id.clone(),
                space: compiled.space,
                compiled: Arc::new(RwLock::new(compiled)),
                manager,
                default_mask_space,
                changes: Mutex::new(TagChanges::new()),
                mask_changes: Mutex::new(TagMaskChanges::new()),
                shared_arrays: Mutex::new(BTreeMap::new()),
                vars: RwLock::new(Vars::default()),
                replacement: RwLock::new(None),
            }
        });
        Self { state }
    }

    /// Follow replacements to the bot that currently backs this one.
    fn resolve(&self) -> RuntimeBot {
        let mut current = self.clone();
        loop {
            let next = read(&current.state.replacement).clone();
            match next {
                Some(next) => current = next,
                None => return current,
            }
        }
    }

    /// Bot ID.
    pub fn id(&self) -> String {
        self.resolve().state.id.clone()
    }

    /// Bot space. `None` means the default space.
    pub fn space(&self) -> Option<BotSpace> {
        self.resolve().state.space
    }

    /// Computed tags.
    pub fn tags(&self) -> TagsView {
        TagsView::new(self.clone())
    }

    /// Raw (uncompiled) tags.
    pub fn raw(&self) -> RawTagsView {
        RawTagsView::new(self.clone())
    }

    /// Tag masks.
    pub fn masks(&self) -> MasksView {
        MasksView::new(self.clone())
    }

    /// Bot links.
    pub fn links(&self) -> LinksView {
        LinksView::new(self.clone())
    }

    /// Listeners.
    pub fn listeners(&self) -> ListenersView {
        ListenersView::new(self.clone())
    }

    /// Tag signatures. Read only.
    pub fn signatures(&self) -> SignaturesView {
        SignaturesView::new(self.clone())
    }

    /// Script-local variables.
    pub fn vars(&self) -> Vars {
        read(&self.resolve().state.vars).clone()
    }

    /// Tag changes made since the last time changes were cleared.
    pub fn changes(&self) -> TagChanges {
        lock(&self.resolve().state.changes).clone()
    }

    /// Tag mask changes made since the last time changes were cleared.
    pub fn mask_changes(&self) -> TagMaskChanges {
        lock(&self.resolve().state.mask_changes).clone()
    }

    /// The compiled bot backing this runtime bot.
    pub fn compiled(&self) -> SharedCompiledBot {
        self.resolve().state.compiled.clone()
    }

    /// Whether this bot forwards to a replacement.
    pub fn is_replaced(&self) -> bool {
        read(&self.state.replacement).is_some()
    }

    /// Get a non-owning reference to this bot.
    pub fn downgrade(&self) -> WeakRuntimeBot {
        WeakRuntimeBot(Arc::downgrade(&self.state))
    }

    /// Whether both handles currently resolve to the same bot.
    pub fn same_bot(&self, other: &RuntimeBot) -> bool {
        Arc::ptr_eq(&self.resolve().state, &other.resolve().state)
    }

    /// Snapshot the bot as a plain record.
    pub fn to_bot(&self) -> Bot {
        let target = self.resolve();
        let compiled = read(&target.state.compiled);
        Bot {
            id: compiled.id.clone(),
            space: compiled.space,
            tags: compiled.tags.clone(),
            masks: non_empty_masks(&compiled.masks),
            signatures: compiled.signatures.clone(),
        }
    }

    fn manager(&self) -> &dyn RuntimeBotInterface {
        self.state.manager.as_ref()
    }

    fn constant_tag(&self, tag: &str) -> Option<Option<Value>> {
        match tag {
            "id" => Some(Some(Value::String(self.state.id.clone()))),
            "space" => Some(self.state.space.map(|s| Value::String(s.as_str().to_string()))),
            _ => None,
        }
    }

    pub(crate) fn read_value(&self, tag: &str) -> Option<Value> {
        let target = self.resolve();
        if let Some(constant) = target.constant_tag(tag) {
            return constant;
        }
        let compiled = read(&target.state.compiled);
        target.manager().get_value(&compiled, tag)
    }

    pub(crate) fn read_raw_value(&self, tag: &str) -> Option<Value> {
        let target = self.resolve();
        if let Some(constant) = target.constant_tag(tag) {
            return constant;
        }
        let compiled = read(&target.state.compiled);
        target.manager().get_raw_value(&compiled, tag)
    }

    pub(crate) fn read_tag_mask(&self, tag: &str) -> Option<Value> {
        let target = self.resolve();
        let compiled = read(&target.state.compiled);
        target.manager().get_tag_mask(&compiled, tag)
    }

    /// Run a closure against the resolved compiled bot and its interface.
    pub(crate) fn with_compiled<R>(
        &self,
        f: impl FnOnce(&CompiledBot, &dyn RuntimeBotInterface) -> R,
    ) -> R {
        let target = self.resolve();
        let compiled = read(&target.state.compiled);
        f(&compiled, target.manager())
    }

    /// Write a tag through the edit mode pipeline.
    pub(crate) fn write_tag(&self, tag: &str, update: TagUpdate) -> RealtimeEditMode {
        let target = self.resolve();
        if CONSTANT_TAGS.contains(&tag) {
            return RealtimeEditMode::None;
        }

        let result = {
            let compiled = read(&target.state.compiled);
            target.manager().update_tag(&compiled, tag, &update)
        };

        if result.mode.applies_locally() {
            let mut compiled = write(&target.state.compiled);
            apply_tag_update(&mut compiled, tag, &update);
            lock(&target.state.shared_arrays).remove(tag);
        }
        if result.mode.records_change() {
            let mut changes = lock(&target.state.changes);
            let previous = changes.remove(tag);
            changes.insert(tag.to_string(), TagUpdate::compose(previous, result.changed_value));
        }
        result.mode
    }

    /// Write a tag mask through the edit mode pipeline.
    ///
    /// Without an explicit space, values go to the default mask space and
    /// deletions go to every space currently holding the tag. Writes to a
    /// space that cannot hold masks are rejected before reaching the policy.
    pub(crate) fn write_tag_mask(
        &self,
        tag: &str,
        update: TagUpdate,
        space: Option<BotSpace>,
    ) -> RealtimeEditMode {
        let target = self.resolve();
        let (result, spaces) = {
            let compiled = read(&target.state.compiled);
            let spaces = match space {
                Some(space) => vec![space],
                None => match &update {
                    TagUpdate::Value(value) if !has_value(value) => {
                        spaces_with_mask(&compiled.masks, tag)
                    }
                    _ => vec![target.state.default_mask_space],
                },
            };
            if spaces.is_empty() || !spaces.iter().all(BotSpace::holds_tag_masks) {
                return RealtimeEditMode::None;
            }
            let result = target
                .manager()
                .update_tag_mask(&compiled, tag, &spaces, &update);
            (result, spaces)
        };

        if result.mode.applies_locally() {
            let mut compiled = write(&target.state.compiled);
            for space in &spaces {
                apply_tag_mask_update(&mut compiled, *space, tag, &update);
            }
            let mut shared = lock(&target.state.shared_arrays);
            if shared.get(tag).is_some_and(|space| spaces.contains(space)) {
                shared.remove(tag);
            }
        }
        if result.mode.records_change() {
            let mut mask_changes = lock(&target.state.mask_changes);
            for space in spaces {
                let changes = mask_changes.entry(space).or_default();
                let previous = changes.remove(tag);
                changes.insert(
                    tag.to_string(),
                    TagUpdate::compose(previous, result.changed_value.clone()),
                );
            }
        }
        result.mode
    }

    /// Space whose mask shares its array with the tag value, if any.
    pub(crate) fn shared_array_space(&self, tag: &str) -> Option<BotSpace> {
        lock(&self.resolve().state.shared_arrays).get(tag).copied()
    }

    /// Record that the tag value and its mask in `space` hold the same array.
    pub(crate) fn share_array(&self, tag: &str, space: BotSpace) {
        lock(&self.resolve().state.shared_arrays).insert(tag.to_string(), space);
    }

    /// Space unqualified mask writes go to.
    pub(crate) fn default_mask_space(&self) -> BotSpace {
        self.resolve().state.default_mask_space
    }

    /// Store an array mutated through the raw view.
    ///
    /// Raw values are read-through only: the mutation lands in memory
    /// without being classified or recorded. Precalculated values that
    /// mirrored the raw array follow it.
    pub(crate) fn write_raw_in_place(&self, tag: &str, value: Value) {
        let target = self.resolve();
        let mut compiled = write(&target.state.compiled);
        let previous = compiled.tags.insert(tag.to_string(), value.clone());
        if previous.is_some() && compiled.values.get(tag) == previous.as_ref() {
            compiled.values.insert(tag.to_string(), value);
        }
    }
}

/// Apply an accepted tag write to the compiled bot.
fn apply_tag_update(compiled: &mut CompiledBot, tag: &str, update: &TagUpdate) {
    let value = match update {
        TagUpdate::Value(value) => {
            compiled.original_tag_edit_values.remove(tag);
            value.clone()
        }
        TagUpdate::Edit(edit) => {
            let current = compiled.tags.get(tag).cloned().unwrap_or(Value::Null);
            compiled
                .original_tag_edit_values
                .entry(tag.to_string())
                .or_insert_with(|| current.clone());
            Value::String(edit.apply(&current))
        }
    };

    if has_value(&value) {
        compiled.tags.insert(tag.to_string(), value.clone());
        compiled.values.insert(tag.to_string(), value);
    } else {
        compiled.tags.remove(tag);
        compiled.values.remove(tag);
    }
}

/// Apply an accepted tag mask write to one space of the compiled bot.
fn apply_tag_mask_update(compiled: &mut CompiledBot, space: BotSpace, tag: &str, update: &TagUpdate) {
    let value = match update {
        TagUpdate::Value(value) => {
            if let Some(originals) = compiled.original_tag_mask_edit_values.get_mut(&space) {
                originals.remove(tag);
            }
            value.clone()
        }
        TagUpdate::Edit(edit) => {
            let current = compiled
                .masks
                .get(&space)
                .and_then(|tags| tags.get(tag))
                .cloned()
                .unwrap_or(Value::Null);
            compiled
                .original_tag_mask_edit_values
                .entry(space)
                .or_default()
                .entry(tag.to_string())
                .or_insert_with(|| current.clone());
            Value::String(edit.apply(&current))
        }
    };

    if has_value(&value) {
        compiled
            .masks
            .entry(space)
            .or_default()
            .insert(tag.to_string(), value);
    } else if let Some(tags) = compiled.masks.get_mut(&space) {
        tags.remove(tag);
        if tags.is_empty() {
            compiled.masks.remove(&space);
        }
    }
}

fn non_empty_masks(masks: &BotTagMasks) -> BotTagMasks {
    masks
        .iter()
        .filter(|(_, tags)| !tags.is_empty())
        .map(|(space, tags)| (*space, tags.clone()))
        .collect()
}

impl PartialEq for RuntimeBot {
    fn eq(&self, other: &Self) -> bool {
        self.same_bot(other)
    }
}

impl fmt::Debug for RuntimeBot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeBot")
            .field("id", &self.state.id)
            .field("space", &self.state.space)
            .field("replaced", &self.is_replaced())
            .finish()
    }
}

/// Control surface of a runtime bot.
///
/// These operations are not tag access: they are used by the runtime and by
/// script library functions, never enumerated alongside tags.
pub trait RuntimeBotControl {
    /// Forget every pending tag and tag mask change.
    fn clear_changes(&self);

    /// Set a tag mask in a specific space.
    fn set_tag_mask(&self, tag: &str, value: TagUpdate, space: BotSpace) -> RealtimeEditMode;

    /// Every non-empty tag mask, by space.
    fn get_tag_masks(&self) -> BotTagMasks;

    /// Delete every tag mask in a space, or in every space. Returns what
    /// was cleared.
    fn clear_tag_masks(&self, space: Option<BotSpace>) -> BotTagMasks;

    /// Apply a text edit to a tag.
    fn edit_tag(&self, tag: &str, operations: Vec<TagEditOp>) -> RealtimeEditMode;

    /// Apply a text edit to a tag mask.
    ///
    /// Without a space, the highest priority space already holding the tag
    /// is edited, falling back to the default mask space.
    fn edit_tag_mask(
        &self,
        tag: &str,
        operations: Vec<TagEditOp>,
        space: Option<BotSpace>,
    ) -> RealtimeEditMode;

    /// Redirect every later access on this bot to `replacement`.
    ///
    /// The replacement adopts this bot's vars.
    fn replace_bot(&self, replacement: RuntimeBot) -> Result<()>;
}

impl RuntimeBotControl for RuntimeBot {
    fn clear_changes(&self) {
        let target = self.resolve();
        lock(&target.state.changes).clear();
        lock(&target.state.mask_changes).clear();
        let mut compiled = write(&target.state.compiled);
        compiled.original_tag_edit_values.clear();
        compiled.original_tag_mask_edit_values.clear();
    }

    fn set_tag_mask(&self, tag: &str, value: TagUpdate, space: BotSpace) -> RealtimeEditMode {
        self.write_tag_mask(tag, value, Some(space))
    }

    fn get_tag_masks(&self) -> BotTagMasks {
        let target = self.resolve();
        let compiled = read(&target.state.compiled);
        non_empty_masks(&compiled.masks)
    }

    fn clear_tag_masks(&self, space: Option<BotSpace>) -> BotTagMasks {
        let spaces = match space {
            Some(space) => vec![space],
            None => TAG_MASK_SPACE_PRIORITIES.to_vec(),
        };
        let existing = self.get_tag_masks();

        let mut cleared = BotTagMasks::new();
        for space in spaces {
            let Some(tags) = existing.get(&space) else {
                continue;
            };
            for (tag, value) in tags {
                self.write_tag_mask(tag, TagUpdate::delete(), Some(space));
                cleared
                    .entry(space)
                    .or_default()
                    .insert(tag.clone(), value.clone());
            }
        }
        cleared
    }

    fn edit_tag(&self, tag: &str, operations: Vec<TagEditOp>) -> RealtimeEditMode {
        let version = self.resolve().manager().current_version();
        self.write_tag(tag, TagUpdate::Edit(edit(version.vector, operations)))
    }

    fn edit_tag_mask(
        &self,
        tag: &str,
        operations: Vec<TagEditOp>,
        space: Option<BotSpace>,
    ) -> RealtimeEditMode {
        let target = self.resolve();
        let space = space.unwrap_or_else(|| {
            let compiled = read(&target.state.compiled);
            spaces_with_mask(&compiled.masks, tag)
                .first()
                .copied()
                .unwrap_or(target.state.default_mask_space)
        });
        let version = target.manager().current_version();
        target.write_tag_mask(tag, TagUpdate::Edit(edit(version.vector, operations)), Some(space))
    }

    fn replace_bot(&self, replacement: RuntimeBot) -> Result<()> {
        let resolved = replacement.resolve();
        if Arc::ptr_eq(&self.state, &replacement.state) || Arc::ptr_eq(&self.state, &resolved.state)
        {
            return Err(RuntimeError::SelfReplacement(self.state.id.clone()));
        }

        let vars = self.vars();
        *write(&resolved.state.vars) = vars;
        *write(&self.state.replacement) = Some(replacement);

        debug!(
            bot_id = %self.state.id,
            replacement_id = %resolved.state.id,
            "Replaced runtime bot"
        );
        Ok(())
    }
}
