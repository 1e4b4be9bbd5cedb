//! Bot link encoding.
//!
//! A bot link is a tag value that references other bots: the link marker
//! followed by a comma separated list of bot IDs, e.g. `🔗abc,def`.

use serde_json::Value;

/// Marker that prefixes every bot link.
pub const BOT_LINK_TAG_PREFIX: &str = "🔗";

/// Encode a list of bot IDs as a bot link.
///
/// Returns `None` when there are no IDs to link to.
pub fn create_bot_link<I, S>(ids: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let ids: Vec<String> = ids
        .into_iter()
        .map(|id| id.as_ref().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    if ids.is_empty() {
        return None;
    }
    Some(format!("{}{}", BOT_LINK_TAG_PREFIX, ids.join(",")))
}

/// Whether the value is a string carrying the bot link marker.
pub fn is_bot_link(value: &Value) -> bool {
    value
        .as_str()
        .is_some_and(|s| s.starts_with(BOT_LINK_TAG_PREFIX))
}

/// Decode the bot IDs referenced by a link value.
///
/// Returns `None` for values that are not links. Empty entries are skipped.
pub fn parse_bot_link(value: &Value) -> Option<Vec<String>> {
    let text = value.as_str()?.strip_prefix(BOT_LINK_TAG_PREFIX)?;
    Some(
        text.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_bot_link() {
        assert_eq!(create_bot_link(["abc"]).as_deref(), Some("🔗abc"));
        assert_eq!(create_bot_link(["abc", "def"]).as_deref(), Some("🔗abc,def"));
        assert_eq!(create_bot_link(Vec::<String>::new()), None);
        assert_eq!(create_bot_link([""]), None);
    }

    #[test]
    fn test_is_bot_link() {
        assert!(is_bot_link(&json!("🔗abc")));
        assert!(!is_bot_link(&json!("abc")));
        assert!(!is_bot_link(&json!(123)));
        assert!(!is_bot_link(&Value::Null));
    }

    #[test]
    fn test_parse_bot_link() {
        assert_eq!(
            parse_bot_link(&json!("🔗abc,def")),
            Some(vec!["abc".to_string(), "def".to_string()])
        );
        assert_eq!(parse_bot_link(&json!("🔗")), Some(vec![]));
        assert_eq!(parse_bot_link(&json!("🔗abc,,")), Some(vec!["abc".to_string()]));
        assert_eq!(parse_bot_link(&json!("abc")), None);
    }
}
