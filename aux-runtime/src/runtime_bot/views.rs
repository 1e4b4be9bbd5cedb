//! Tag views of a runtime bot.
//!
//! Views are cheap handles created on demand. Each one holds the runtime bot
//! it was taken from and resolves replacements on every operation, so a view
//! taken before a bot was replaced keeps following the replacement.

use serde_json::Value;

use aux_common::{
    create_bot_link, is_bot_link, spaces_with_mask, BotSpace, TagUpdate,
};

use crate::compiled_bot::CompiledBotListener;
use crate::edit_mode::RealtimeEditMode;
use crate::interface::TagLink;
use crate::runtime_bot::tracked_array::{ArrayBacking, TrackedArray};
use crate::runtime_bot::RuntimeBot;

macro_rules! view_equality {
    ($view:ty) => {
        impl PartialEq for $view {
            fn eq(&self, other: &Self) -> bool {
                self.bot.same_bot(&other.bot)
            }
        }

        impl std::fmt::Debug for $view {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($view))
                    .field("bot", &self.bot)
                    .finish()
            }
        }
    };
}

/// Computed tag values.
#[derive(Clone)]
pub struct TagsView {
    bot: RuntimeBot,
}

impl TagsView {
    pub(crate) fn new(bot: RuntimeBot) -> Self {
        Self { bot }
    }

    /// Computed value of a tag.
    pub fn get(&self, tag: &str) -> Option<Value> {
        self.bot.read_value(tag)
    }

    /// Computed value of an array tag, tracked for in-place mutation.
    ///
    /// When the tag is masked the array backs the highest priority mask, and
    /// the tag value too if the two were assigned the same array.
    pub fn get_array(&self, tag: &str) -> Option<TrackedArray> {
        let Value::Array(items) = self.bot.read_value(tag)? else {
            return None;
        };
        let shared = self.bot.shared_array_space(tag);
        let masked = self.bot.with_compiled(|compiled, manager| {
            manager.get_tag_mask(compiled, tag)?;
            spaces_with_mask(&compiled.masks, tag).first().copied()
        });
        let backing = match masked {
            Some(space) => mask_backing(space, shared),
            None => ArrayBacking::Tag,
        };
        Some(TrackedArray::new(self.bot.clone(), tag, backing, items))
    }

    /// Write a tag. `null` deletes it.
    pub fn set(&self, tag: &str, value: impl Into<TagUpdate>) -> RealtimeEditMode {
        self.bot.write_tag(tag, value.into())
    }

    /// Assign a tracked array to a tag.
    ///
    /// Assigning a mask array of this bot back to its own tag makes the tag
    /// value and that mask share the array, so later mutations write both.
    pub fn set_array(&self, tag: &str, array: &TrackedArray) -> RealtimeEditMode {
        let mode = self
            .bot
            .write_tag(tag, TagUpdate::Value(Value::Array(array.as_slice().to_vec())));
        if mode.applies_locally() && array.tag() == tag && array.owner().same_bot(&self.bot) {
            if let ArrayBacking::Mask(space) | ArrayBacking::Both(space) = array.backing() {
                self.bot.share_array(tag, space);
            }
        }
        mode
    }

    /// Delete a tag.
    pub fn delete(&self, tag: &str) -> RealtimeEditMode {
        self.bot.write_tag(tag, TagUpdate::delete())
    }

    /// Names of the bot's tags.
    pub fn keys(&self) -> Vec<String> {
        self.bot
            .with_compiled(|compiled, _| compiled.tags.keys().cloned().collect())
    }
}

view_equality!(TagsView);

fn mask_backing(space: BotSpace, shared: Option<BotSpace>) -> ArrayBacking {
    if shared == Some(space) {
        ArrayBacking::Both(space)
    } else {
        ArrayBacking::Mask(space)
    }
}

/// Raw (uncompiled) tag values.
///
/// Writes go through the same pipeline as [`TagsView`].
#[derive(Clone)]
pub struct RawTagsView {
    bot: RuntimeBot,
}

impl RawTagsView {
    pub(crate) fn new(bot: RuntimeBot) -> Self {
        Self { bot }
    }

    /// Raw value of a tag.
    pub fn get(&self, tag: &str) -> Option<Value> {
        self.bot.read_raw_value(tag)
    }

    /// Raw value of an array tag.
    ///
    /// Mutations land in memory directly; they are not classified or
    /// recorded as changes.
    pub fn get_array(&self, tag: &str) -> Option<TrackedArray> {
        match self.bot.read_raw_value(tag)? {
            Value::Array(items) => Some(TrackedArray::new(
                self.bot.clone(),
                tag,
                ArrayBacking::RawTag,
                items,
            )),
            _ => None,
        }
    }

    /// Write a tag. `null` deletes it.
    pub fn set(&self, tag: &str, value: impl Into<TagUpdate>) -> RealtimeEditMode {
        self.bot.write_tag(tag, value.into())
    }

    /// Delete a tag.
    pub fn delete(&self, tag: &str) -> RealtimeEditMode {
        self.bot.write_tag(tag, TagUpdate::delete())
    }

    /// Names of the bot's tags.
    pub fn keys(&self) -> Vec<String> {
        self.bot
            .with_compiled(|compiled, _| compiled.tags.keys().cloned().collect())
    }
}

view_equality!(RawTagsView);

/// Tag masks, flattened by space priority.
#[derive(Clone)]
pub struct MasksView {
    bot: RuntimeBot,
}

impl MasksView {
    pub(crate) fn new(bot: RuntimeBot) -> Self {
        Self { bot }
    }

    /// Highest priority mask value of a tag.
    pub fn get(&self, tag: &str) -> Option<Value> {
        self.bot.read_tag_mask(tag)
    }

    /// Highest priority mask value of an array tag, tracked for in-place
    /// mutation.
    pub fn get_array(&self, tag: &str) -> Option<TrackedArray> {
        let shared = self.bot.shared_array_space(tag);
        let (items, space) = self.bot.with_compiled(|compiled, manager| {
            let Some(Value::Array(items)) = manager.get_tag_mask(compiled, tag) else {
                return None;
            };
            let space = spaces_with_mask(&compiled.masks, tag).first().copied()?;
            Some((items, space))
        })?;
        Some(TrackedArray::new(
            self.bot.clone(),
            tag,
            mask_backing(space, shared),
            items,
        ))
    }

    /// Write a mask in the default mask space. `null` deletes the mask from
    /// every space holding it.
    pub fn set(&self, tag: &str, value: impl Into<TagUpdate>) -> RealtimeEditMode {
        self.bot.write_tag_mask(tag, value.into(), None)
    }

    /// Assign a tracked array as the mask in the default mask space.
    ///
    /// Assigning a tag array of this bot to its own mask makes the tag value
    /// and the mask share the array, so later mutations write both.
    pub fn set_array(&self, tag: &str, array: &TrackedArray) -> RealtimeEditMode {
        let space = self.bot.default_mask_space();
        let mode = self.bot.write_tag_mask(
            tag,
            TagUpdate::Value(Value::Array(array.as_slice().to_vec())),
            Some(space),
        );
        let from_tag = matches!(
            array.backing(),
            ArrayBacking::Tag | ArrayBacking::RawTag | ArrayBacking::Both(_)
        );
        if mode.applies_locally() && from_tag && array.tag() == tag && array.owner().same_bot(&self.bot) {
            self.bot.share_array(tag, space);
        }
        mode
    }

    /// Write a mask in a specific space.
    pub fn set_in(&self, tag: &str, space: BotSpace, value: impl Into<TagUpdate>) -> RealtimeEditMode {
        self.bot.write_tag_mask(tag, value.into(), Some(space))
    }

    /// Delete a mask from every space holding it.
    pub fn delete(&self, tag: &str) -> RealtimeEditMode {
        self.bot.write_tag_mask(tag, TagUpdate::delete(), None)
    }

    /// Names of every masked tag, across spaces.
    pub fn keys(&self) -> Vec<String> {
        self.bot.with_compiled(|compiled, _| {
            let mut keys: Vec<String> = compiled
                .masks
                .values()
                .flat_map(|tags| tags.keys().cloned())
                .collect();
            keys.sort();
            keys.dedup();
            keys
        })
    }
}

view_equality!(MasksView);

/// Value assigned through [`LinksView`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Link to a single bot by ID
    Bot(String),
    /// Link to several bots by ID
    Bots(Vec<String>),
    /// An encoded link, or a bare bot ID
    Text(String),
    /// Remove the link
    Clear,
}

impl LinkTarget {
    /// Canonical encoding of the target. `None` clears the link.
    pub fn encode(self) -> Option<String> {
        match self {
            Self::Bot(id) => create_bot_link([id]),
            Self::Bots(ids) => create_bot_link(ids),
            Self::Text(text) if is_bot_link(&Value::String(text.clone())) => Some(text),
            Self::Text(text) => create_bot_link([text]),
            Self::Clear => None,
        }
    }
}

impl From<&RuntimeBot> for LinkTarget {
    fn from(bot: &RuntimeBot) -> Self {
        Self::Bot(bot.id())
    }
}

impl From<RuntimeBot> for LinkTarget {
    fn from(bot: RuntimeBot) -> Self {
        Self::Bot(bot.id())
    }
}

impl From<&[RuntimeBot]> for LinkTarget {
    fn from(bots: &[RuntimeBot]) -> Self {
        Self::Bots(bots.iter().map(RuntimeBot::id).collect())
    }
}

impl From<Vec<RuntimeBot>> for LinkTarget {
    fn from(bots: Vec<RuntimeBot>) -> Self {
        Self::from(bots.as_slice())
    }
}

impl From<&str> for LinkTarget {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for LinkTarget {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl<T: Into<LinkTarget>> From<Option<T>> for LinkTarget {
    fn from(target: Option<T>) -> Self {
        target.map_or(Self::Clear, Into::into)
    }
}

/// Tags holding bot links.
#[derive(Clone)]
pub struct LinksView {
    bot: RuntimeBot,
}

impl LinksView {
    pub(crate) fn new(bot: RuntimeBot) -> Self {
        Self { bot }
    }

    /// Bots referenced by a link tag.
    pub fn get(&self, tag: &str) -> Option<TagLink> {
        self.bot
            .with_compiled(|compiled, manager| manager.get_tag_link(compiled, tag))
    }

    /// Point a tag at one or more bots.
    ///
    /// Clearing only touches the tag when it currently holds a link.
    pub fn set(&self, tag: &str, target: impl Into<LinkTarget>) -> RealtimeEditMode {
        match target.into().encode() {
            Some(link) => self.bot.write_tag(tag, TagUpdate::from(link)),
            None => self.delete(tag),
        }
    }

    /// Remove a link. Tags whose raw value is not a link are left alone.
    pub fn delete(&self, tag: &str) -> RealtimeEditMode {
        let holds_link = self
            .bot
            .read_raw_value(tag)
            .is_some_and(|value| is_bot_link(&value));
        if !holds_link {
            return RealtimeEditMode::None;
        }
        self.bot.write_tag(tag, TagUpdate::delete())
    }

    /// Names of the tags whose raw value is a bot link. Masks are ignored,
    /// matching what [`LinksView::delete`] clears.
    pub fn keys(&self) -> Vec<String> {
        self.bot.with_compiled(|compiled, manager| {
            compiled
                .tags
                .keys()
                .filter(|tag| {
                    manager
                        .get_raw_value(compiled, tag)
                        .is_some_and(|value| is_bot_link(&value))
                })
                .cloned()
                .collect()
        })
    }
}

view_equality!(LinksView);

/// Listeners, resolved through the interface.
#[derive(Clone)]
pub struct ListenersView {
    bot: RuntimeBot,
}

impl ListenersView {
    pub(crate) fn new(bot: RuntimeBot) -> Self {
        Self { bot }
    }

    /// Listener registered for a tag.
    pub fn get(&self, tag: &str) -> Option<CompiledBotListener> {
        self.bot
            .with_compiled(|compiled, manager| manager.get_listener(compiled, tag))
    }

    /// Names of every compiled or dynamically registered listener.
    pub fn keys(&self) -> Vec<String> {
        self.bot
            .with_compiled(|compiled, _| compiled.listener_names())
    }
}

view_equality!(ListenersView);

/// Tag signatures. Read only: writes and deletes are ignored.
#[derive(Clone)]
pub struct SignaturesView {
    bot: RuntimeBot,
}

impl SignaturesView {
    pub(crate) fn new(bot: RuntimeBot) -> Self {
        Self { bot }
    }

    /// Tag covered by a signature.
    pub fn get(&self, signature: &str) -> Option<String> {
        self.bot
            .with_compiled(|compiled, manager| manager.get_signature(compiled, signature))
    }

    /// Ignored.
    pub fn set(&self, _signature: &str, _tag: impl Into<String>) {}

    /// Ignored.
    pub fn delete(&self, _signature: &str) {}

    /// Every signature hash.
    pub fn keys(&self) -> Vec<String> {
        self.bot
            .with_compiled(|compiled, _| compiled.signatures.keys().cloned().collect())
    }
}

view_equality!(SignaturesView);
