//! Bot records and the spaces they live in.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Tag name to value mapping.
///
/// Ordered so that iteration (and therefore serialization and change
/// reports) is deterministic.
pub type BotTags = BTreeMap<String, Value>;

/// Space to tag mapping for tag masks.
pub type BotTagMasks = BTreeMap<BotSpace, BotTags>;

/// Partition a bot (or a tag mask) lives in.
///
/// The space governs how the bot is replicated and persisted, and the
/// partition layer uses it to decide how writes are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BotSpace {
    /// Shared with every user in the inst
    Shared,
    /// Shared with the other devices of the current user, never persisted
    TempShared,
    /// Temporary shared state of remote devices
    RemoteTempShared,
    /// Local to the device, never persisted
    TempLocal,
    /// Local to the device, persisted
    Local,
    /// Version history bots
    History,
    /// Error records
    Error,
    /// Admin space shared across insts
    Admin,
    /// Certified bots
    Certified,
    /// Custom partitions
    Custom,
}

impl BotSpace {
    /// Get the canonical name of the space.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::TempShared => "tempShared",
            Self::RemoteTempShared => "remoteTempShared",
            Self::TempLocal => "tempLocal",
            Self::Local => "local",
            Self::History => "history",
            Self::Error => "error",
            Self::Admin => "admin",
            Self::Certified => "certified",
            Self::Custom => "custom",
        }
    }

    /// Whether tag masks can be stored in this space.
    pub fn holds_tag_masks(&self) -> bool {
        TAG_MASK_SPACE_PRIORITIES.contains(self)
    }
}

impl fmt::Display for BotSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSpace(pub String);

impl fmt::Display for UnknownSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown bot space: {}", self.0)
    }
}

impl std::error::Error for UnknownSpace {}

impl FromStr for BotSpace {
    type Err = UnknownSpace;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "shared" => Self::Shared,
            "tempShared" => Self::TempShared,
            "remoteTempShared" => Self::RemoteTempShared,
            "tempLocal" => Self::TempLocal,
            "local" => Self::Local,
            "history" => Self::History,
            "error" => Self::Error,
            "admin" => Self::Admin,
            "certified" => Self::Certified,
            "custom" => Self::Custom,
            other => return Err(UnknownSpace(other.to_string())),
        })
    }
}

/// Spaces that tag masks may be stored in, highest priority first.
///
/// When masks from several spaces exist for the same tag, the first space in
/// this list wins. Unqualified mask edits also target the first space in this
/// list that already holds the tag. Masks cannot live in any other space.
pub const TAG_MASK_SPACE_PRIORITIES: [BotSpace; 7] = [
    BotSpace::TempLocal,
    BotSpace::Local,
    BotSpace::Custom,
    BotSpace::TempShared,
    BotSpace::RemoteTempShared,
    BotSpace::Shared,
    BotSpace::Admin,
];

/// Space that unqualified tag mask writes go to.
pub const DEFAULT_TAG_MASK_SPACE: BotSpace = BotSpace::TempLocal;

/// Tags that shadow the bot's identity and can never be written.
pub const CONSTANT_TAGS: [&str; 2] = ["id", "space"];

/// Whether the value counts as "set".
///
/// `null` and the empty string are treated as absent, so writing either to a
/// tag deletes it.
pub fn has_value(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Find the highest priority mask for a tag.
pub fn highest_priority_mask<'a>(masks: &'a BotTagMasks, tag: &str) -> Option<(BotSpace, &'a Value)> {
    TAG_MASK_SPACE_PRIORITIES.iter().find_map(|space| {
        masks
            .get(space)
            .and_then(|tags| tags.get(tag))
            .map(|value| (*space, value))
    })
}

/// Spaces (in priority order) that currently hold a mask for the tag.
pub fn spaces_with_mask(masks: &BotTagMasks, tag: &str) -> Vec<BotSpace> {
    TAG_MASK_SPACE_PRIORITIES
        .iter()
        .copied()
        .filter(|space| masks.get(space).is_some_and(|tags| tags.contains_key(tag)))
        .collect()
}

/// A bot as it is exchanged with partitions and carried in actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bot {
    /// Unique bot ID
    pub id: String,
    /// Space the bot lives in. Absent means the default space.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<BotSpace>,
    /// Raw tag values
    pub tags: BotTags,
    /// Tag masks by space
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub masks: BotTagMasks,
    /// Signature hash to signed tag
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub signatures: BTreeMap<String, String>,
}

impl Bot {
    /// Set the tag masks of the bot.
    pub fn with_masks(mut self, masks: BotTagMasks) -> Self {
        self.masks = masks;
        self
    }

    /// Set the signatures of the bot.
    pub fn with_signatures(mut self, signatures: BTreeMap<String, String>) -> Self {
        self.signatures = signatures;
        self
    }
}

/// Create a bot record.
pub fn create_bot(id: impl Into<String>, tags: BotTags, space: Option<BotSpace>) -> Bot {
    Bot {
        id: id.into(),
        space,
        tags,
        masks: BTreeMap::new(),
        signatures: BTreeMap::new(),
    }
}

/// Build a [`BotTags`] map from `(tag, value)` pairs.
pub fn tags<K, V, I>(pairs: I) -> BotTags
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
