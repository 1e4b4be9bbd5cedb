//! Array tag values that write back on mutation.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

use aux_common::{BotSpace, TagUpdate};

use crate::edit_mode::RealtimeEditMode;
use crate::runtime_bot::RuntimeBot;

/// What a tracked array is the canonical value of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayBacking {
    /// The bot's tag value
    Tag,
    /// The tag mask in a space
    Mask(BotSpace),
    /// Both the tag value and the tag mask in a space, after the same array
    /// was assigned to each
    Both(BotSpace),
    /// The raw tag value, mutated in memory without going through policy
    RawTag,
}

/// An array tag or tag mask value.
///
/// Every mutating method commits the whole mutated array once, through the
/// same pipeline as assigning the value. Converting the array into a
/// [`Value`] or [`TagUpdate`] unwraps it, so assigning it to another tag
/// copies the items instead of sharing the backing.
#[derive(Clone)]
pub struct TrackedArray {
    bot: RuntimeBot,
    tag: String,
    backing: ArrayBacking,
    items: Vec<Value>,
    last_mode: Option<RealtimeEditMode>,
}

impl TrackedArray {
    pub(crate) fn new(bot: RuntimeBot, tag: &str, backing: ArrayBacking, items: Vec<Value>) -> Self {
        Self {
            bot,
            tag: tag.to_string(),
            backing,
            items,
            last_mode: None,
        }
    }

    /// Tag the array belongs to.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// What the array backs.
    pub fn backing(&self) -> ArrayBacking {
        self.backing
    }

    pub(crate) fn owner(&self) -> &RuntimeBot {
        &self.bot
    }

    /// Edit mode of the most recent commit, if any mutation happened.
    ///
    /// Raw arrays always report `Immediate`.
    pub fn last_mode(&self) -> Option<RealtimeEditMode> {
        self.last_mode
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.items
    }

    /// Unwrap into the plain items.
    pub fn into_vec(self) -> Vec<Value> {
        self.items
    }

    /// Append an item. Returns the new length.
    pub fn push(&mut self, value: impl Into<Value>) -> usize {
        self.items.push(value.into());
        self.commit();
        self.items.len()
    }

    /// Remove the last item.
    pub fn pop(&mut self) -> Option<Value> {
        let value = self.items.pop();
        self.commit();
        value
    }

    /// Remove the first item.
    pub fn shift(&mut self) -> Option<Value> {
        let value = (!self.items.is_empty()).then(|| self.items.remove(0));
        self.commit();
        value
    }

    /// Prepend an item. Returns the new length.
    pub fn unshift(&mut self, value: impl Into<Value>) -> usize {
        self.items.insert(0, value.into());
        self.commit();
        self.items.len()
    }

    /// Remove `delete_count` items at `start` and insert `insert` in their
    /// place. Out of range arguments are clamped. Returns the removed items.
    pub fn splice(&mut self, start: usize, delete_count: usize, insert: Vec<Value>) -> Vec<Value> {
        let start = start.min(self.items.len());
        let end = start.saturating_add(delete_count).min(self.items.len());
        let removed = self.items.splice(start..end, insert).collect();
        self.commit();
        removed
    }

    /// Sort items by their string form.
    pub fn sort(&mut self) {
        self.items.sort_by_key(sort_key);
        self.commit();
    }

    /// Sort items with a comparator.
    pub fn sort_by(&mut self, compare: impl FnMut(&Value, &Value) -> Ordering) {
        self.items.sort_by(compare);
        self.commit();
    }

    pub fn reverse(&mut self) {
        self.items.reverse();
        self.commit();
    }

    /// Replace every item with `value`.
    pub fn fill(&mut self, value: impl Into<Value>) {
        let value = value.into();
        self.items.iter_mut().for_each(|item| *item = value.clone());
        self.commit();
    }

    /// Truncate, or pad with nulls.
    pub fn set_len(&mut self, len: usize) {
        self.items.resize(len, Value::Null);
        self.commit();
    }

    /// Assign an item, padding with nulls when `index` is past the end.
    /// Indexes that cannot be addressed are ignored.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) {
        if index >= self.items.len() {
            let Some(len) = index.checked_add(1) else {
                return;
            };
            self.items.resize(len, Value::Null);
        }
        self.items[index] = value.into();
        self.commit();
    }

    fn commit(&mut self) {
        let value = Value::Array(self.items.clone());
        let mode = match self.backing {
            ArrayBacking::Tag => self.bot.write_tag(&self.tag, TagUpdate::Value(value)),
            ArrayBacking::Mask(space) => {
                self.bot
                    .write_tag_mask(&self.tag, TagUpdate::Value(value), Some(space))
            }
            ArrayBacking::Both(space) => {
                let mode = self.bot.write_tag(&self.tag, TagUpdate::Value(value.clone()));
                let mask_mode =
                    self.bot
                        .write_tag_mask(&self.tag, TagUpdate::Value(value), Some(space));
                if mode.applies_locally() && mask_mode.applies_locally() {
                    self.bot.share_array(&self.tag, space);
                }
                mode
            }
            ArrayBacking::RawTag => {
                self.bot.write_raw_in_place(&self.tag, value);
                RealtimeEditMode::Immediate
            }
        };
        self.last_mode = Some(mode);
    }
}

fn sort_key(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

impl fmt::Debug for TrackedArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedArray")
            .field("tag", &self.tag)
            .field("backing", &self.backing)
            .field("items", &self.items)
            .finish()
    }
}

impl PartialEq<Vec<Value>> for TrackedArray {
    fn eq(&self, other: &Vec<Value>) -> bool {
        &self.items == other
    }
}

impl From<TrackedArray> for Value {
    fn from(array: TrackedArray) -> Self {
        Value::Array(array.items)
    }
}

impl From<TrackedArray> for TagUpdate {
    fn from(array: TrackedArray) -> Self {
        TagUpdate::Value(Value::Array(array.items))
    }
}

impl<'a> IntoIterator for &'a TrackedArray {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
