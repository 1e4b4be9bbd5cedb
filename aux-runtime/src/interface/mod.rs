//! Collaborator contracts of the runtime.
//!
//! - [`RuntimeBotInterface`]: the policy boundary every runtime bot access
//!   goes through
//! - [`RuntimeBotFactory`]: materializes and destroys runtime bots
//! - [`RuntimeBatcher`]: coalesces change and action notifications
//! - [`RuntimeInterpreterGeneratorProcessor`]: steps suspended scripts
//!
//! [`mock`] holds in-memory reference implementations of all four.

pub mod mock;
mod traits;

pub use traits::*;
