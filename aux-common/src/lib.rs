//! Shared data types for the CasualOS runtime.
//!
//! Everything in this crate is plain data with no policy attached:
//!
//! - **Bots**: [`Bot`] records, tag maps and the [`BotSpace`] partitions
//! - **Tag masks**: the space priority that decides which mask wins
//! - **Bot links**: the `🔗` encoding used to reference other bots from a tag
//! - **Edits**: character-level text edits ([`TagEdit`]) and the
//!   [`TagUpdate`] value every tag write carries
//! - **Versions**: vector-clock style [`CurrentVersion`] used to stamp edits
//! - **Actions**: side effects ([`BotAction`]) queued for the replication layer

pub mod actions;
pub mod bots;
pub mod edits;
pub mod links;
pub mod version;

// Re-export main types
pub use actions::{bot_added, bot_removed, BotAction};
pub use bots::*;
pub use edits::*;
pub use links::{create_bot_link, is_bot_link, parse_bot_link, BOT_LINK_TAG_PREFIX};
pub use version::{CurrentVersion, VersionVector};
