//! Per-bot timers and watchers.
//!
//! Every timer belongs to the bot that created it and is only canceled in
//! bulk, when that bot is destroyed or removed from the context. Timeouts
//! that already fired stop counting as active and are pruned when the next
//! timer is recorded.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::{interval_at, sleep, Instant};
use tracing::debug;

use super::GlobalContext;
use crate::interpreter::{process_bot_timer_result, ListenerOutput};
use crate::types::{Result, RuntimeError};

/// Callback run by a timer or watcher.
pub type TimerCallback = Arc<dyn Fn() -> ListenerOutput + Send + Sync>;

/// Kind of a timer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Timeout,
    Interval,
    WatchBot,
    WatchPortal,
}

/// A timer owned by a bot.
#[derive(Clone)]
pub enum BotTimer {
    /// One-shot platform timer
    Timeout {
        timer_id: u64,
        handle: Option<AbortHandle>,
    },
    /// Repeating platform timer
    Interval {
        timer_id: u64,
        handle: Option<AbortHandle>,
    },
    /// Observer of another bot's changes
    WatchBot {
        timer_id: u64,
        bot_id: String,
        tag: String,
        handler: TimerCallback,
    },
    /// Observer of a portal's changes
    WatchPortal {
        timer_id: u64,
        portal_id: String,
        tag: String,
        handler: TimerCallback,
    },
}

impl BotTimer {
    pub fn timer_id(&self) -> u64 {
        match self {
            Self::Timeout { timer_id, .. }
            | Self::Interval { timer_id, .. }
            | Self::WatchBot { timer_id, .. }
            | Self::WatchPortal { timer_id, .. } => *timer_id,
        }
    }

    pub fn kind(&self) -> TimerKind {
        match self {
            Self::Timeout { .. } => TimerKind::Timeout,
            Self::Interval { .. } => TimerKind::Interval,
            Self::WatchBot { .. } => TimerKind::WatchBot,
            Self::WatchPortal { .. } => TimerKind::WatchPortal,
        }
    }

    /// Whether the underlying platform timer has finished or been canceled.
    /// Watchers have no platform timer and are never finished.
    pub fn is_finished(&self) -> bool {
        match self {
            Self::Timeout { handle, .. } | Self::Interval { handle, .. } => {
                handle.as_ref().is_some_and(AbortHandle::is_finished)
            }
            Self::WatchBot { .. } | Self::WatchPortal { .. } => false,
        }
    }

    fn cancel(&self) {
        if let Self::Timeout { handle: Some(handle), .. } | Self::Interval { handle: Some(handle), .. } =
            self
        {
            handle.abort();
        }
    }

    fn watcher(&self) -> Option<BotWatcher> {
        match self {
            Self::WatchBot { timer_id, tag, handler, .. }
            | Self::WatchPortal { timer_id, tag, handler, .. } => Some(BotWatcher {
                timer_id: *timer_id,
                tag: tag.clone(),
                handler: handler.clone(),
            }),
            Self::Timeout { .. } | Self::Interval { .. } => None,
        }
    }
}

impl fmt::Debug for BotTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotTimer")
            .field("timer_id", &self.timer_id())
            .field("kind", &self.kind())
            .finish()
    }
}

/// A registered watcher.
#[derive(Clone)]
pub struct BotWatcher {
    /// ID of the watch timer, used for cancellation
    pub timer_id: u64,
    /// Tag that registered the watcher
    pub tag: String,
    /// Handler to run when the watched target changes
    pub handler: TimerCallback,
}

impl fmt::Debug for BotWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotWatcher")
            .field("timer_id", &self.timer_id)
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

impl GlobalContext {
    /// Allocate an ID for a new timer.
    pub fn next_timer_id(&mut self) -> u64 {
        self.next_timer_id += 1;
        self.next_timer_id
    }

    /// Register a timer owned by a bot.
    pub fn record_bot_timer(&mut self, bot_id: &str, timer: BotTimer) {
        self.prune_finished_timers();
        let watchers = match &timer {
            BotTimer::WatchBot { bot_id: target, .. } => {
                Some(self.bot_watchers.entry(target.clone()).or_default())
            }
            BotTimer::WatchPortal { portal_id, .. } => {
                Some(self.portal_watchers.entry(portal_id.clone()).or_default())
            }
            BotTimer::Timeout { .. } | BotTimer::Interval { .. } => None,
        };
        if let (Some(watchers), Some(watcher)) = (watchers, timer.watcher()) {
            watchers.push(watcher);
        }
        self.bot_timers
            .entry(bot_id.to_string())
            .or_default()
            .push(timer);
    }

    /// Remove one timer record, e.g. after a timeout fired.
    ///
    /// The platform timer is left alone.
    pub fn remove_bot_timer(&mut self, bot_id: &str, timer_id: u64) {
        let Some(timers) = self.bot_timers.get_mut(bot_id) else {
            return;
        };
        let Some(index) = timers.iter().position(|t| t.timer_id() == timer_id) else {
            return;
        };
        let timer = timers.remove(index);
        if timers.is_empty() {
            self.bot_timers.remove(bot_id);
        }
        self.forget_watcher(&timer);
    }

    /// Remove every timer owned by a bot, canceling the platform timers
    /// when `should_cancel` is set.
    pub fn cancel_bot_timers(&mut self, bot_id: &str, should_cancel: bool) {
        let Some(timers) = self.bot_timers.remove(bot_id) else {
            return;
        };
        for timer in &timers {
            if should_cancel {
                timer.cancel();
            }
            self.forget_watcher(timer);
        }
        debug!(bot_id = %bot_id, count = timers.len(), "Canceled bot timers");
    }

    /// Cancel the timers of every bot.
    pub fn cancel_all_bot_timers(&mut self) {
        let owners: Vec<String> = self.bot_timers.keys().cloned().collect();
        for owner in owners {
            self.cancel_bot_timers(&owner, true);
        }
    }

    /// Number of registered timers across all bots that have not finished.
    pub fn number_of_active_timers(&self) -> usize {
        self.bot_timers
            .values()
            .flatten()
            .filter(|timer| !timer.is_finished())
            .count()
    }

    /// Unfinished timers owned by a bot, in registration order.
    pub fn get_bot_timers(&self, bot_id: &str) -> Vec<BotTimer> {
        self.bot_timers
            .get(bot_id)
            .map(|timers| timers.iter().filter(|t| !t.is_finished()).cloned().collect())
            .unwrap_or_default()
    }

    /// Drop the records of platform timers that already finished.
    fn prune_finished_timers(&mut self) {
        self.bot_timers.retain(|_, timers| {
            timers.retain(|timer| !timer.is_finished());
            !timers.is_empty()
        });
    }

    /// Watchers of a bot, in registration order.
    pub fn get_watchers_for_bot(&self, bot_id: &str) -> Vec<BotWatcher> {
        self.bot_watchers.get(bot_id).cloned().unwrap_or_default()
    }

    /// Watchers of a portal, in registration order.
    pub fn get_watchers_for_portal(&self, portal_id: &str) -> Vec<BotWatcher> {
        self.portal_watchers.get(portal_id).cloned().unwrap_or_default()
    }

    fn forget_watcher(&mut self, timer: &BotTimer) {
        let (index, key) = match timer {
            BotTimer::WatchBot { bot_id, .. } => (&mut self.bot_watchers, bot_id),
            BotTimer::WatchPortal { portal_id, .. } => (&mut self.portal_watchers, portal_id),
            BotTimer::Timeout { .. } | BotTimer::Interval { .. } => return,
        };
        if let Some(watchers) = index.get_mut(key) {
            watchers.retain(|w| w.timer_id != timer.timer_id());
            if watchers.is_empty() {
                index.remove(key);
            }
        }
    }

    /// Run `callback` once after `delay`. Returns the timer ID.
    pub fn start_timeout(
        &mut self,
        bot_id: &str,
        delay: Duration,
        callback: TimerCallback,
    ) -> Result<u64> {
        let runtime = Handle::try_current().map_err(|_| RuntimeError::NoTimerRuntime)?;
        let processor = self.processor.clone();
        let task = runtime.spawn(async move {
            sleep(delay).await;
            process_bot_timer_result(processor.as_ref(), callback());
        });

        let timer_id = self.next_timer_id();
        self.record_bot_timer(
            bot_id,
            BotTimer::Timeout {
                timer_id,
                handle: Some(task.abort_handle()),
            },
        );
        Ok(timer_id)
    }

    /// Run `callback` every `period`, starting one period from now. Returns
    /// the timer ID.
    pub fn start_interval(
        &mut self,
        bot_id: &str,
        period: Duration,
        callback: TimerCallback,
    ) -> Result<u64> {
        let runtime = Handle::try_current().map_err(|_| RuntimeError::NoTimerRuntime)?;
        let processor = self.processor.clone();
        let task = runtime.spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            loop {
                ticks.tick().await;
                process_bot_timer_result(processor.as_ref(), callback());
            }
        });

        let timer_id = self.next_timer_id();
        self.record_bot_timer(
            bot_id,
            BotTimer::Interval {
                timer_id,
                handle: Some(task.abort_handle()),
            },
        );
        Ok(timer_id)
    }

    /// Register `owner_id` as a watcher of `bot_id`. Returns the timer ID.
    pub fn watch_bot(
        &mut self,
        owner_id: &str,
        bot_id: &str,
        tag: &str,
        handler: TimerCallback,
    ) -> u64 {
        let timer_id = self.next_timer_id();
        self.record_bot_timer(
            owner_id,
            BotTimer::WatchBot {
                timer_id,
                bot_id: bot_id.to_string(),
                tag: tag.to_string(),
                handler,
            },
        );
        timer_id
    }

    /// Register `owner_id` as a watcher of a portal. Returns the timer ID.
    pub fn watch_portal(
        &mut self,
        owner_id: &str,
        portal_id: &str,
        tag: &str,
        handler: TimerCallback,
    ) -> u64 {
        let timer_id = self.next_timer_id();
        self.record_bot_timer(
            owner_id,
            BotTimer::WatchPortal {
                timer_id,
                portal_id: portal_id.to_string(),
                tag: tag.to_string(),
                handler,
            },
        );
        timer_id
    }
}
