//! Session-wide runtime state.
//!
//! One [`GlobalContext`] exists per simulation session. It owns the live bot
//! collection, the action and error queues, the listener index, per-bot
//! timers and watchers, pending tasks and mock returns. Collaborators are
//! injected at construction.

mod mocks;
mod tasks;
mod timers;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use aux_common::{bot_added, bot_removed, Bot, BotAction};

use crate::config::RuntimeConfig;
use crate::edit_mode::RealtimeEditMode;
use crate::interface::{
    RuntimeBatcher, RuntimeBotFactory, RuntimeInterpreterGeneratorProcessor,
};
use crate::interpreter::{self, ListenerOutput};
use crate::runtime_bot::RuntimeBot;
use crate::types::{Result, RuntimeError, ScriptError};

pub use mocks::MockReturns;
pub use tasks::{AsyncTask, TaskError, TaskId, TaskPromise};
pub use timers::{BotTimer, BotWatcher, TimerCallback, TimerKind};

use tasks::PendingTask;

/// Accumulated listener run time.
#[derive(Debug, Clone, PartialEq)]
pub struct ShoutTimer {
    /// Listener name
    pub listener: String,
    /// Total milliseconds spent running it
    pub time_ms: f64,
}

/// Session-wide runtime state.
pub struct GlobalContext {
    config: RuntimeConfig,
    factory: Arc<dyn RuntimeBotFactory>,
    batcher: Arc<dyn RuntimeBatcher>,
    processor: Arc<dyn RuntimeInterpreterGeneratorProcessor>,

    /// Live bots, sorted by ID
    bots: Vec<RuntimeBot>,
    /// Listener tag to sorted IDs of the bots declaring it
    listener_map: HashMap<String, Vec<String>>,

    actions: Vec<BotAction>,
    errors: Vec<ScriptError>,

    /// Owner bot ID to its timers, in registration order
    bot_timers: HashMap<String, Vec<BotTimer>>,
    /// Watched bot ID to its watchers, in registration order
    bot_watchers: HashMap<String, Vec<BotWatcher>>,
    /// Watched portal ID to its watchers, in registration order
    portal_watchers: HashMap<String, Vec<BotWatcher>>,
    next_timer_id: u64,

    tasks: HashMap<TaskId, PendingTask>,
    next_task_id: u64,

    mocks: MockReturns,

    energy: u64,
    shout_timers: HashMap<String, f64>,
    start_time: DateTime<Utc>,
}

impl GlobalContext {
    /// Create a context with its collaborators.
    pub fn new(
        config: RuntimeConfig,
        factory: Arc<dyn RuntimeBotFactory>,
        batcher: Arc<dyn RuntimeBatcher>,
        processor: Arc<dyn RuntimeInterpreterGeneratorProcessor>,
    ) -> Self {
        let energy = config.energy;
        Self {
            config,
            factory,
            batcher,
            processor,
            bots: Vec::new(),
            listener_map: HashMap::new(),
            actions: Vec::new(),
            errors: Vec::new(),
            bot_timers: HashMap::new(),
            bot_watchers: HashMap::new(),
            portal_watchers: HashMap::new(),
            next_timer_id: 0,
            tasks: HashMap::new(),
            next_task_id: 0,
            mocks: MockReturns::default(),
            energy,
            shout_timers: HashMap::new(),
            start_time: Utc::now(),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    // ==================== Bots ====================

    /// Live bots, sorted by ID.
    pub fn bots(&self) -> &[RuntimeBot] {
        &self.bots
    }

    /// Find a live bot by ID.
    pub fn get_bot(&self, id: &str) -> Option<&RuntimeBot> {
        self.position(id).ok().map(|index| &self.bots[index])
    }

    fn position(&self, id: &str) -> std::result::Result<usize, usize> {
        self.bots.binary_search_by(|bot| bot.id().as_str().cmp(id))
    }

    /// Add bots to the live collection and index their listeners.
    ///
    /// Fails without adding anything if any ID is already live.
    pub fn add_to_context(&mut self, bots: impl IntoIterator<Item = RuntimeBot>) -> Result<()> {
        let bots: Vec<RuntimeBot> = bots.into_iter().collect();
        let mut ids: Vec<String> = bots.iter().map(RuntimeBot::id).collect();
        ids.sort();
        if let Some(pair) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(RuntimeError::DuplicateBot(pair[0].clone()));
        }
        if let Some(id) = ids.iter().find(|id| self.position(id).is_ok()) {
            return Err(RuntimeError::DuplicateBot(id.clone()));
        }

        for bot in bots {
            let id = bot.id();
            for listener in bot.listeners().keys() {
                self.record_listener_presense(&id, &listener, true);
            }
            if let Err(index) = self.position(&id) {
                self.bots.insert(index, bot);
            }
            debug!(bot_id = %id, "Added bot to context");
        }
        Ok(())
    }

    /// Remove bots from the live collection and the listener index.
    ///
    /// Bots that are not live are skipped. Their timers are canceled unless
    /// `cancel_timers` is false, in which case the timers keep running.
    pub fn remove_from_context<'a>(
        &mut self,
        bots: impl IntoIterator<Item = &'a RuntimeBot>,
        cancel_timers: bool,
    ) {
        for bot in bots {
            let id = bot.id();
            let Ok(index) = self.position(&id) else {
                continue;
            };
            self.bots.remove(index);
            let listeners: Vec<String> = self.listener_map.keys().cloned().collect();
            for listener in listeners {
                self.record_listener_presense(&id, &listener, false);
            }
            if cancel_timers {
                self.cancel_bot_timers(&id, true);
            }
            debug!(bot_id = %id, cancel_timers, "Removed bot from context");
        }
    }

    /// Create a bot through the factory, using the configured default mask
    /// space.
    ///
    /// The "bot added" action is queued even when the factory refuses to
    /// create the bot locally, in which case `None` is returned.
    pub fn create_bot(&mut self, bot: Bot) -> Result<Option<RuntimeBot>> {
        let runtime_bot = self
            .factory
            .create_runtime_bot(bot.clone(), self.config.default_mask_space);
        match &runtime_bot {
            Some(created) => self.add_to_context([created.clone()])?,
            None => info!(bot_id = %bot.id, "Bot was not created locally"),
        }
        self.enqueue_action(bot_added(bot));
        Ok(runtime_bot)
    }

    /// Destroy a live bot through the factory.
    ///
    /// The bot only leaves the context when the factory reports
    /// `Immediate`; the "bot removed" action is queued either way. Returns
    /// `None` when the bot is not live.
    pub fn destroy_bot(&mut self, bot: &RuntimeBot) -> Option<RealtimeEditMode> {
        let id = bot.id();
        self.position(&id).ok()?;

        let mode = self.factory.destroy_script_bot(bot);
        debug!(bot_id = %id, mode = ?mode, "Destroyed bot");
        if mode == RealtimeEditMode::Immediate {
            self.remove_from_context([bot], true);
        }
        self.enqueue_action(bot_removed(id));
        Some(mode)
    }

    // ==================== Listener index ====================

    /// Record whether a bot declares a listener.
    pub fn record_listener_presense(&mut self, bot_id: &str, tag: &str, present: bool) {
        if present {
            let ids = self.listener_map.entry(tag.to_string()).or_default();
            if let Err(index) = ids.binary_search_by(|id| id.as_str().cmp(bot_id)) {
                ids.insert(index, bot_id.to_string());
            }
        } else if let Some(ids) = self.listener_map.get_mut(tag) {
            if let Ok(index) = ids.binary_search_by(|id| id.as_str().cmp(bot_id)) {
                ids.remove(index);
            }
            if ids.is_empty() {
                self.listener_map.remove(tag);
            }
        }
    }

    /// Sorted IDs of the bots declaring a listener.
    pub fn get_bot_ids_with_listener(&self, tag: &str) -> Vec<String> {
        self.listener_map.get(tag).cloned().unwrap_or_default()
    }

    // ==================== Queues ====================

    /// Queue an action and notify the batcher.
    pub fn enqueue_action(&mut self, action: BotAction) {
        self.batcher.notify_action_enqueued(&action);
        self.actions.push(action);
    }

    /// Take every queued action.
    pub fn dequeue_actions(&mut self) -> Vec<BotAction> {
        std::mem::take(&mut self.actions)
    }

    /// Queue a script error and notify the batcher.
    ///
    /// Running out of energy is fatal: it is returned immediately instead
    /// of being queued.
    pub fn enqueue_error(&mut self, error: ScriptError) -> Result<()> {
        if error.is_fatal() {
            warn!(error = %error, "Fatal script error");
            return Err(error.into());
        }
        self.errors.push(error);
        self.batcher.notify_change();
        Ok(())
    }

    /// Take every queued error.
    pub fn dequeue_errors(&mut self) -> Vec<ScriptError> {
        std::mem::take(&mut self.errors)
    }

    // ==================== Interpreter ====================

    /// Hand a suspended script to the interpreter. Completed values are
    /// ignored.
    pub fn process_bot_timer_result(&self, result: ListenerOutput) {
        interpreter::process_bot_timer_result(self.processor.as_ref(), result);
    }

    // ==================== Energy ====================

    pub fn energy(&self) -> u64 {
        self.energy
    }

    pub fn set_energy(&mut self, energy: u64) {
        self.energy = energy;
    }

    /// Spend energy. Exhausting the budget is the fatal
    /// [`ScriptError::RanOutOfEnergy`].
    pub fn consume_energy(&mut self, amount: u64) -> Result<()> {
        match self.energy.checked_sub(amount) {
            Some(remaining) => {
                self.energy = remaining;
                Ok(())
            }
            None => {
                self.energy = 0;
                Err(ScriptError::RanOutOfEnergy.into())
            }
        }
    }

    // ==================== Time ====================

    /// Wall-clock time the context was created.
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Milliseconds of wall-clock time since the context was created.
    pub fn local_time(&self) -> i64 {
        (Utc::now() - self.start_time).num_milliseconds()
    }

    /// Record time spent running a listener.
    pub fn add_shout_time(&mut self, listener: &str, time_ms: f64) {
        *self.shout_timers.entry(listener.to_string()).or_default() += time_ms;
    }

    /// Accumulated listener run times, longest first.
    pub fn shout_timers(&self) -> Vec<ShoutTimer> {
        let mut timers: Vec<ShoutTimer> = self
            .shout_timers
            .iter()
            .map(|(listener, time_ms)| ShoutTimer {
                listener: listener.clone(),
                time_ms: *time_ms,
            })
            .collect();
        timers.sort_by(|a, b| {
            b.time_ms
                .total_cmp(&a.time_ms)
                .then_with(|| a.listener.cmp(&b.listener))
        });
        timers
    }

    // ==================== Misc ====================

    /// A new random UUID.
    pub fn uuid(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests;
