//! Text edits over tag values.
//!
//! An edit is a list of operation sequences. Each sequence walks the text from
//! the start: `preserve` skips characters, `insert` adds text at the cursor
//! and `delete` removes characters at the cursor. Sequences are applied in
//! order, each against the result of the previous one, which makes merging two
//! edits a simple concatenation.
//!
//! Offsets count characters, not bytes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::version::VersionVector;

/// A single step of an edit sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TagEditOp {
    /// Keep the next `count` characters
    Preserve { count: usize },
    /// Insert text at the cursor
    Insert { text: String },
    /// Remove the next `count` characters
    Delete { count: usize },
}

/// Keep `count` characters.
pub fn preserve(count: usize) -> TagEditOp {
    TagEditOp::Preserve { count }
}

/// Insert `text` at the cursor.
pub fn insert(text: impl Into<String>) -> TagEditOp {
    TagEditOp::Insert { text: text.into() }
}

/// Delete `count` characters.
pub fn del(count: usize) -> TagEditOp {
    TagEditOp::Delete { count }
}

/// An edit to the text of a tag or tag mask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagEdit {
    /// Version the edit was made against
    pub version: VersionVector,
    /// Operation sequences, applied in order
    pub operations: Vec<Vec<TagEditOp>>,
    /// Whether the edit has been stamped for the replication layer
    #[serde(default)]
    pub is_remote: bool,
}

impl TagEdit {
    /// Apply the edit to a value, producing the edited text.
    pub fn apply(&self, value: &Value) -> String {
        let mut text = edit_text(value);
        for ops in &self.operations {
            text = apply_edit_ops(&text, ops);
        }
        text
    }

    /// Append the operations of a later edit.
    ///
    /// The merged edit carries the version of the later edit and is only
    /// remote when both edits are.
    pub fn merge(&mut self, later: TagEdit) {
        self.operations.extend(later.operations);
        self.version = later.version;
        self.is_remote = self.is_remote && later.is_remote;
    }

    /// Mark the edit as stamped for the replication layer.
    pub fn into_remote(mut self) -> Self {
        self.is_remote = true;
        self
    }
}

/// Create a local edit with a single operation sequence.
pub fn edit(version: VersionVector, operations: Vec<TagEditOp>) -> TagEdit {
    edits(version, vec![operations])
}

/// Create a local edit from several operation sequences.
pub fn edits(version: VersionVector, operations: Vec<Vec<TagEditOp>>) -> TagEdit {
    TagEdit {
        version,
        operations,
        is_remote: false,
    }
}

/// Create a remote edit with a single operation sequence.
pub fn remote_edit(version: VersionVector, operations: Vec<TagEditOp>) -> TagEdit {
    edit(version, operations).into_remote()
}

/// Create a remote edit from several operation sequences.
pub fn remote_edits(version: VersionVector, operations: Vec<Vec<TagEditOp>>) -> TagEdit {
    edits(version, operations).into_remote()
}

/// Text an edit operates on for a given value.
///
/// Missing values edit the empty string and non-strings are stringified.
pub fn edit_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Apply one operation sequence to a string.
pub fn apply_edit_ops(text: &str, ops: &[TagEditOp]) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    let mut index = 0usize;
    for op in ops {
        match op {
            TagEditOp::Preserve { count } => {
                index = (index + count).min(chars.len());
            }
            TagEditOp::Insert { text } => {
                let at = index.min(chars.len());
                let inserted: Vec<char> = text.chars().collect();
                let len = inserted.len();
                chars.splice(at..at, inserted);
                index = at + len;
            }
            TagEditOp::Delete { count } => {
                let start = index.min(chars.len());
                let end = (start + count).min(chars.len());
                chars.drain(start..end);
            }
        }
    }
    chars.into_iter().collect()
}

/// Value carried by a tag or tag mask write.
///
/// A write either replaces the value (`null` deletes) or edits the text that
/// is already there.
#[derive(Debug, Clone, PartialEq)]
pub enum TagUpdate {
    /// Replace the value
    Value(Value),
    /// Edit the current text
    Edit(TagEdit),
}

impl TagUpdate {
    /// Update that deletes the tag.
    pub fn delete() -> Self {
        Self::Value(Value::Null)
    }

    /// Whether this update is a text edit.
    pub fn is_edit(&self) -> bool {
        matches!(self, Self::Edit(_))
    }

    /// The replacement value, if this is not an edit.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Edit(_) => None,
        }
    }

    /// The edit, if this is one.
    pub fn as_edit(&self) -> Option<&TagEdit> {
        match self {
            Self::Edit(edit) => Some(edit),
            Self::Value(_) => None,
        }
    }

    /// Compose this update on top of a previously recorded one.
    ///
    /// Edits merge into earlier edits and apply onto earlier concrete values;
    /// any concrete value simply replaces what came before.
    pub fn compose(previous: Option<TagUpdate>, next: TagUpdate) -> TagUpdate {
        match (previous, next) {
            (Some(TagUpdate::Edit(mut earlier)), TagUpdate::Edit(later)) => {
                earlier.merge(later);
                TagUpdate::Edit(earlier)
            }
            (Some(TagUpdate::Value(value)), TagUpdate::Edit(later)) => {
                TagUpdate::Value(Value::String(later.apply(&value)))
            }
            (_, next) => next,
        }
    }
}

impl From<Value> for TagUpdate {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<TagEdit> for TagUpdate {
    fn from(edit: TagEdit) -> Self {
        Self::Edit(edit)
    }
}

impl From<Option<Value>> for TagUpdate {
    fn from(value: Option<Value>) -> Self {
        Self::Value(value.unwrap_or(Value::Null))
    }
}

impl From<&str> for TagUpdate {
    fn from(value: &str) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<String> for TagUpdate {
    fn from(value: String) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<bool> for TagUpdate {
    fn from(value: bool) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<i32> for TagUpdate {
    fn from(value: i32) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<i64> for TagUpdate {
    fn from(value: i64) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<f64> for TagUpdate {
    fn from(value: f64) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<Vec<Value>> for TagUpdate {
    fn from(value: Vec<Value>) -> Self {
        Self::Value(Value::Array(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn version() -> VersionVector {
        VersionVector::from([("a".to_string(), 1)])
    }

    #[test]
    fn test_apply_edit_ops() {
        assert_eq!(
            apply_edit_ops("def", &[preserve(1), insert("111"), del(1)]),
            "d111f"
        );
        assert_eq!(
            apply_edit_ops("d111f", &[preserve(2), insert("2"), del(1)]),
            "d121f"
        );
    }

    #[test]
    fn test_apply_edit_ops_clamps_out_of_range() {
        assert_eq!(apply_edit_ops("ab", &[preserve(10), insert("c")]), "abc");
        assert_eq!(apply_edit_ops("ab", &[preserve(1), del(10)]), "a");
    }

    #[test]
    fn test_apply_edit_counts_characters() {
        assert_eq!(apply_edit_ops("🔗b", &[preserve(1), insert("a")]), "🔗ab");
    }

    #[test]
    fn test_edit_applies_to_missing_and_non_string_values() {
        let e = edit(version(), vec![insert("abc")]);
        assert_eq!(e.apply(&Value::Null), "abc");
        assert_eq!(e.apply(&json!(12)), "abc12");
    }

    #[test]
    fn test_merge_appends_sequences() {
        let mut first = remote_edit(version(), vec![preserve(1), insert("111"), del(1)]);
        let second = remote_edit(version(), vec![preserve(2), insert("2"), del(1)]);
        first.merge(second);

        assert_eq!(
            first,
            remote_edits(
                version(),
                vec![
                    vec![preserve(1), insert("111"), del(1)],
                    vec![preserve(2), insert("2"), del(1)],
                ]
            )
        );
        assert_eq!(first.apply(&json!("def")), "d121f");
    }

    #[test]
    fn test_compose_edit_onto_value() {
        let composed = TagUpdate::compose(
            Some(TagUpdate::from("def")),
            TagUpdate::Edit(edit(version(), vec![preserve(1), insert("111"), del(1)])),
        );
        assert_eq!(composed, TagUpdate::from("d111f"));
    }

    #[test]
    fn test_compose_value_replaces_edit() {
        let composed = TagUpdate::compose(
            Some(TagUpdate::Edit(edit(version(), vec![insert("a")]))),
            TagUpdate::from(5),
        );
        assert_eq!(composed, TagUpdate::from(5));
    }

    #[test]
    fn test_edit_op_serialization() {
        let json = serde_json::to_value(insert("abc")).unwrap();
        assert_eq!(json, json!({ "type": "insert", "text": "abc" }));
    }
}
