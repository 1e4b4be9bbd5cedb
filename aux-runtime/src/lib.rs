//! AUX Runtime - Runtime bots and the global context
//!
//! The in-memory object model that gives scripts controlled, observable
//! access to shared bots:
//!
//! - **Compiled bots**: the canonical record for each bot
//! - **Runtime bots**: script-facing projections that route every read and
//!   write through a policy interface and record pending changes
//! - **Realtime edit modes**: per-write classification into rejected,
//!   immediate or delayed
//! - **Global context**: live bots, queued actions and errors, timers,
//!   watchers and tasks for one session
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      GlobalContext                       │
//! │   bots · listeners · actions · errors · timers · tasks   │
//! │                                                          │
//! │  ┌────────────┐  ┌────────────┐  ┌───────────────────┐   │
//! │  │ RuntimeBot │──│ RuntimeBot │──│ RuntimeBotFactory │   │
//! │  └─────┬──────┘  │ Interface  │  └───────────────────┘   │
//! │        │         └────────────┘                          │
//! │  ┌─────▼──────┐                                          │
//! │  │ CompiledBot│                                          │
//! │  └────────────┘                                          │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod compiled_bot;
pub mod config;
pub mod edit_mode;
pub mod global_context;
pub mod interface;
pub mod interpreter;
pub mod runtime_bot;
pub mod types;

mod sync;

// Re-export main types
pub use compiled_bot::{create_compiled_bot, CompiledBot, CompiledBotListener, SharedCompiledBot};
pub use config::RuntimeConfig;
pub use edit_mode::{EditResult, RealtimeEditMode};
pub use global_context::{AsyncTask, GlobalContext, TaskId, TaskPromise};
pub use interpreter::{GeneratorStep, ListenerOutput, ScriptGenerator};
pub use runtime_bot::{RuntimeBot, RuntimeBotControl, TrackedArray};
pub use types::*;
