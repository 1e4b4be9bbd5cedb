use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_test::{assert_pending, assert_ready_eq};

use aux_common::{bot_added, bot_removed, create_bot, tags, BotSpace, BotTags};

use super::*;
use crate::compiled_bot::CompiledBot;
use crate::interface::mock::{MockBatcher, MockBotFactory, MockBotInterface, MockGeneratorProcessor};
use crate::interpreter::{GeneratorStep, ScriptGenerator};
use crate::runtime_bot::RuntimeBotControl;

struct Harness {
    context: GlobalContext,
    interface: Arc<MockBotInterface>,
    factory: Arc<MockBotFactory>,
    batcher: Arc<MockBatcher>,
    processor: Arc<MockGeneratorProcessor>,
}

fn setup() -> Harness {
    setup_with_config(RuntimeConfig::default())
}

fn setup_with_config(config: RuntimeConfig) -> Harness {
    let interface = Arc::new(MockBotInterface::new());
    let factory = Arc::new(MockBotFactory::new(interface.clone()));
    let batcher = Arc::new(MockBatcher::new());
    let processor = Arc::new(MockGeneratorProcessor::new());
    let context = GlobalContext::new(config, factory.clone(), batcher.clone(), processor.clone());
    Harness {
        context,
        interface,
        factory,
        batcher,
        processor,
    }
}

fn runtime_bot(harness: &Harness, id: &str) -> RuntimeBot {
    RuntimeBot::new(CompiledBot::new(id, BotTags::new()), harness.interface.clone())
}

fn counter_callback(count: &Arc<AtomicU32>) -> TimerCallback {
    let count = count.clone();
    Arc::new(move || {
        count.fetch_add(1, Ordering::SeqCst);
        ListenerOutput::done()
    })
}

fn watcher_ids(watchers: &[BotWatcher]) -> Vec<u64> {
    watchers.iter().map(|w| w.timer_id).collect()
}

struct Immediate(Value);

impl ScriptGenerator for Immediate {
    fn resume(&mut self, _input: Value) -> GeneratorStep {
        GeneratorStep::Return(self.0.clone())
    }
}

// ==================== Bots ====================

#[test]
fn test_bots_are_sorted_by_id() {
    let mut harness = setup();
    let bots = ["test1", "test3", "test2"].map(|id| runtime_bot(&harness, id));

    harness.context.add_to_context(bots).unwrap();

    let ids: Vec<String> = harness.context.bots().iter().map(RuntimeBot::id).collect();
    assert_eq!(ids, vec!["test1", "test2", "test3"]);
    assert_eq!(harness.context.get_bot("test2").map(RuntimeBot::id).as_deref(), Some("test2"));
    assert!(harness.context.get_bot("missing").is_none());
}

#[test]
fn test_duplicate_bots_are_rejected() {
    let mut harness = setup();
    let first = runtime_bot(&harness, "test1");
    harness.context.add_to_context([first]).unwrap();

    let again = runtime_bot(&harness, "test1");
    let other = runtime_bot(&harness, "test2");
    let result = harness.context.add_to_context([other, again]);

    assert!(matches!(result, Err(RuntimeError::DuplicateBot(id)) if id == "test1"));
    assert_eq!(harness.context.bots().len(), 1);
}

#[test]
fn test_removing_missing_bot_is_noop() {
    let mut harness = setup();
    let live = runtime_bot(&harness, "live");
    let stale = runtime_bot(&harness, "stale");
    harness.context.add_to_context([live]).unwrap();

    harness.context.remove_from_context([&stale], true);

    assert_eq!(harness.context.bots().len(), 1);
    assert!(harness.context.dequeue_actions().is_empty());
}

#[test]
fn test_listener_index_follows_membership() {
    let mut harness = setup();
    let listener: crate::compiled_bot::CompiledBotListener =
        Arc::new(|_: Value| ListenerOutput::done());
    let make = |id: &str| {
        RuntimeBot::new(
            CompiledBot::new(id, BotTags::new()).with_listener("onClick", listener.clone()),
            harness.interface.clone(),
        )
    };
    let b = make("b");
    let a = make("a");
    harness.context.add_to_context([b.clone(), a]).unwrap();

    assert_eq!(harness.context.get_bot_ids_with_listener("onClick"), vec!["a", "b"]);

    harness.context.remove_from_context([&b], true);
    assert_eq!(harness.context.get_bot_ids_with_listener("onClick"), vec!["a"]);
    assert!(harness.context.get_bot_ids_with_listener("onDrag").is_empty());
}

#[test]
fn test_listener_ids_are_a_copy() {
    let mut harness = setup();
    harness.context.record_listener_presense("b", "onClick", true);
    harness.context.record_listener_presense("a", "onClick", true);
    harness.context.record_listener_presense("a", "onClick", true);

    let mut ids = harness.context.get_bot_ids_with_listener("onClick");
    ids.push("mutated".to_string());

    assert_eq!(harness.context.get_bot_ids_with_listener("onClick"), vec!["a", "b"]);

    harness.context.record_listener_presense("a", "onClick", false);
    assert_eq!(harness.context.get_bot_ids_with_listener("onClick"), vec!["b"]);
}

#[test]
fn test_create_bot() {
    let mut harness = setup();
    let data = create_bot("test", tags([("abc", "def")]), None);

    let bot = harness.context.create_bot(data.clone()).unwrap().unwrap();

    assert_eq!(bot.tags().get("abc"), Some(json!("def")));
    assert_eq!(harness.context.bots(), &[bot]);
    assert_eq!(harness.context.dequeue_actions(), vec![bot_added(data.clone())]);
    assert_eq!(harness.batcher.actions(), vec![bot_added(data)]);
}

#[test]
fn test_created_bots_use_configured_mask_space() {
    let config = RuntimeConfig::default().with_default_mask_space(BotSpace::Local);
    let mut harness = setup_with_config(config);

    let bot = harness
        .context
        .create_bot(create_bot("test", BotTags::new(), None))
        .unwrap()
        .unwrap();
    bot.masks().set("abc", "masked");

    assert!(bot.get_tag_masks()[&BotSpace::Local].contains_key("abc"));
    assert_eq!(harness.interface.mask_updates()[0].spaces, vec![BotSpace::Local]);
}

#[test]
fn test_refused_creation_still_queues_action() {
    let mut harness = setup();
    harness.factory.set_create_enabled(false);
    let data = create_bot("test", tags([("abc", "def")]), None);

    assert!(harness.context.create_bot(data.clone()).unwrap().is_none());

    assert!(harness.context.bots().is_empty());
    assert_eq!(harness.context.dequeue_actions(), vec![bot_added(data)]);
}

#[test]
fn test_destroy_bot_immediately() {
    let mut harness = setup();
    let bot = harness
        .context
        .create_bot(create_bot("test", BotTags::new(), None))
        .unwrap()
        .unwrap();
    harness.context.watch_bot("test", "other", "onChanged", Arc::new(ListenerOutput::done));
    harness.context.dequeue_actions();

    assert_eq!(harness.context.destroy_bot(&bot), Some(RealtimeEditMode::Immediate));

    assert!(harness.context.bots().is_empty());
    assert_eq!(harness.context.number_of_active_timers(), 0);
    assert_eq!(harness.context.dequeue_actions(), vec![bot_removed("test")]);
    assert_eq!(harness.factory.destroyed(), vec!["test"]);
}

#[test]
fn test_delayed_destroy_keeps_bot() {
    let mut harness = setup();
    let bot = harness
        .context
        .create_bot(create_bot("test", BotTags::new(), None))
        .unwrap()
        .unwrap();
    harness.context.watch_bot("test", "other", "onChanged", Arc::new(ListenerOutput::done));
    harness.context.dequeue_actions();
    harness.factory.set_destroy_mode(RealtimeEditMode::Delayed);

    assert_eq!(harness.context.destroy_bot(&bot), Some(RealtimeEditMode::Delayed));

    assert_eq!(harness.context.bots().len(), 1);
    assert_eq!(harness.context.number_of_active_timers(), 1);
    assert_eq!(harness.context.dequeue_actions(), vec![bot_removed("test")]);
}

#[test]
fn test_destroying_missing_bot_does_nothing() {
    let mut harness = setup();
    let stale = runtime_bot(&harness, "stale");

    assert_eq!(harness.context.destroy_bot(&stale), None);
    assert!(harness.context.dequeue_actions().is_empty());
    assert!(harness.factory.destroyed().is_empty());
}

#[test]
fn test_stale_bot_keeps_working() {
    let mut harness = setup();
    let bot = harness
        .context
        .create_bot(create_bot("test", tags([("abc", "def")]), None))
        .unwrap()
        .unwrap();
    harness.context.destroy_bot(&bot);

    bot.tags().set("abc", "still here");
    assert_eq!(bot.tags().get("abc"), Some(json!("still here")));
}

// ==================== Queues ====================

#[test]
fn test_actions_drain_in_order() {
    let mut harness = setup();
    harness.context.enqueue_action(BotAction::custom("first", Value::Null));
    harness.context.enqueue_action(BotAction::custom("second", json!({ "n": 2 })));

    let actions = harness.context.dequeue_actions();
    assert_eq!(
        actions,
        vec![
            BotAction::custom("first", Value::Null),
            BotAction::custom("second", json!({ "n": 2 })),
        ]
    );
    assert!(harness.context.dequeue_actions().is_empty());
    assert_eq!(harness.batcher.actions().len(), 2);
}

#[test]
fn test_script_errors_are_queued() {
    let mut harness = setup();
    let error = ScriptError::thrown("boom").in_tag("test", "onClick");

    harness.context.enqueue_error(error.clone()).unwrap();

    assert_eq!(harness.batcher.change_count(), 1);
    assert_eq!(harness.context.dequeue_errors(), vec![error]);
    assert!(harness.context.dequeue_errors().is_empty());
}

#[test]
fn test_running_out_of_energy_is_fatal() {
    let mut harness = setup();

    let result = harness.context.enqueue_error(ScriptError::RanOutOfEnergy);

    assert!(matches!(
        result,
        Err(RuntimeError::Script(ScriptError::RanOutOfEnergy))
    ));
    assert!(harness.context.dequeue_errors().is_empty());
    assert_eq!(harness.batcher.change_count(), 0);
}

#[test]
fn test_energy_budget() {
    let mut harness = setup_with_config(RuntimeConfig {
        energy: 10,
        ..RuntimeConfig::default()
    });
    assert_eq!(harness.context.energy(), 10);

    harness.context.consume_energy(4).unwrap();
    assert_eq!(harness.context.energy(), 6);

    assert!(harness.context.consume_energy(7).is_err());
    assert_eq!(harness.context.energy(), 0);

    harness.context.set_energy(100);
    assert!(harness.context.consume_energy(100).is_ok());
}

// ==================== Timers ====================

#[test]
fn test_timer_bookkeeping() {
    let mut harness = setup();
    let context = &mut harness.context;
    context.record_bot_timer("a", BotTimer::Timeout { timer_id: 1, handle: None });
    context.record_bot_timer("a", BotTimer::Interval { timer_id: 2, handle: None });
    context.record_bot_timer("b", BotTimer::Timeout { timer_id: 3, handle: None });
    assert_eq!(context.number_of_active_timers(), 3);

    context.cancel_bot_timers("a", true);
    assert_eq!(context.number_of_active_timers(), 1);
    assert!(context.get_bot_timers("a").is_empty());
    assert_eq!(context.get_bot_timers("b")[0].timer_id(), 3);

    context.cancel_all_bot_timers();
    assert_eq!(context.number_of_active_timers(), 0);
}

#[test]
fn test_remove_single_timer_record() {
    let mut harness = setup();
    let context = &mut harness.context;
    context.record_bot_timer("a", BotTimer::Timeout { timer_id: 1, handle: None });
    context.record_bot_timer("a", BotTimer::Timeout { timer_id: 2, handle: None });

    context.remove_bot_timer("a", 1);
    context.remove_bot_timer("a", 42);

    assert_eq!(context.number_of_active_timers(), 1);
    assert_eq!(context.get_bot_timers("a")[0].timer_id(), 2);
}

#[test]
fn test_watchers_in_registration_order() {
    let mut harness = setup();
    let context = &mut harness.context;
    let handler: TimerCallback = Arc::new(ListenerOutput::done);

    let first = context.watch_bot("owner1", "target", "onChanged", handler.clone());
    let second = context.watch_bot("owner2", "target", "onOther", handler.clone());
    let third = context.watch_bot("owner1", "target", "onThird", handler.clone());
    let portal = context.watch_portal("owner2", "gridPortal", "onPortal", handler);

    assert_eq!(
        watcher_ids(&context.get_watchers_for_bot("target")),
        vec![first, second, third]
    );
    assert_eq!(context.get_watchers_for_bot("target")[1].tag, "onOther");
    assert_eq!(watcher_ids(&context.get_watchers_for_portal("gridPortal")), vec![portal]);
    assert_eq!(context.get_bot_timers("owner2")[1].kind(), TimerKind::WatchPortal);

    context.cancel_bot_timers("owner1", true);
    assert_eq!(watcher_ids(&context.get_watchers_for_bot("target")), vec![second]);

    context.cancel_bot_timers("owner2", true);
    assert!(context.get_watchers_for_bot("target").is_empty());
    assert!(context.get_watchers_for_portal("gridPortal").is_empty());
}

#[test]
fn test_timers_need_a_runtime() {
    let mut harness = setup();
    let result = harness
        .context
        .start_timeout("a", Duration::from_millis(10), Arc::new(ListenerOutput::done));
    assert!(matches!(result, Err(RuntimeError::NoTimerRuntime)));
    assert_eq!(harness.context.number_of_active_timers(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_canceling_timers_leaves_other_bots_alone() {
    let mut harness = setup();
    let a_count = Arc::new(AtomicU32::new(0));
    let b_count = Arc::new(AtomicU32::new(0));
    let delay = Duration::from_millis(100);

    harness.context.start_timeout("a", delay, counter_callback(&a_count)).unwrap();
    harness.context.start_interval("a", delay, counter_callback(&a_count)).unwrap();
    harness.context.start_timeout("b", delay, counter_callback(&b_count)).unwrap();
    assert_eq!(harness.context.number_of_active_timers(), 3);

    harness.context.cancel_bot_timers("a", true);
    assert_eq!(harness.context.number_of_active_timers(), 1);

    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(a_count.load(Ordering::SeqCst), 0);
    assert_eq!(b_count.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_interval_repeats() {
    let mut harness = setup();
    let count = Arc::new(AtomicU32::new(0));

    let timer_id = harness
        .context
        .start_interval("a", Duration::from_millis(100), counter_callback(&count))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(350)).await;

    assert_eq!(count.load(Ordering::SeqCst), 3);
    assert_eq!(harness.context.get_bot_timers("a")[0].timer_id(), timer_id);
    assert!(!harness.context.get_bot_timers("a")[0].is_finished());
}

#[tokio::test(start_paused = true)]
async fn test_removal_can_keep_timers_running() {
    let mut harness = setup();
    let bot = harness
        .context
        .create_bot(create_bot("test", BotTags::new(), None))
        .unwrap()
        .unwrap();
    let count = Arc::new(AtomicU32::new(0));
    harness
        .context
        .start_timeout("test", Duration::from_millis(100), counter_callback(&count))
        .unwrap();

    harness.context.remove_from_context([&bot], false);

    assert!(harness.context.bots().is_empty());
    assert_eq!(harness.context.number_of_active_timers(), 1);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_removal_cancels_timers_by_default() {
    let mut harness = setup();
    let bot = harness
        .context
        .create_bot(create_bot("test", BotTags::new(), None))
        .unwrap()
        .unwrap();
    let count = Arc::new(AtomicU32::new(0));
    harness
        .context
        .start_timeout("test", Duration::from_millis(100), counter_callback(&count))
        .unwrap();

    harness.context.remove_from_context([&bot], true);

    assert_eq!(harness.context.number_of_active_timers(), 0);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_suspended_timer_callbacks_reach_the_interpreter() {
    let mut harness = setup();
    let callback: TimerCallback =
        Arc::new(|| ListenerOutput::Generator(Box::new(Immediate(json!("tick")))));

    harness
        .context
        .start_timeout("a", Duration::from_millis(10), callback)
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(harness.processor.results(), vec![json!("tick")]);
}

#[tokio::test(start_paused = true)]
async fn test_fired_timeouts_stop_counting_as_active() {
    let mut harness = setup();
    let count = Arc::new(AtomicU32::new(0));
    for _ in 0..5 {
        harness
            .context
            .start_timeout("a", Duration::from_millis(10), counter_callback(&count))
            .unwrap();
    }
    assert_eq!(harness.context.number_of_active_timers(), 5);

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(count.load(Ordering::SeqCst), 5);
    assert_eq!(harness.context.number_of_active_timers(), 0);
    assert!(harness.context.get_bot_timers("a").is_empty());

    let pending = harness
        .context
        .start_timeout("a", Duration::from_millis(10), counter_callback(&count))
        .unwrap();
    assert_eq!(harness.context.number_of_active_timers(), 1);
    let records: Vec<u64> = harness.context.bot_timers["a"].iter().map(BotTimer::timer_id).collect();
    assert_eq!(records, vec![pending]);
}

// ==================== Interpreter ====================

#[test]
fn test_process_bot_timer_result() {
    let harness = setup();

    harness.context.process_bot_timer_result(ListenerOutput::Value(json!(1)));
    assert_eq!(harness.processor.processed_count(), 0);

    harness
        .context
        .process_bot_timer_result(ListenerOutput::Generator(Box::new(Immediate(json!("done")))));
    assert_eq!(harness.processor.results(), vec![json!("done")]);
}

// ==================== Tasks ====================

#[test]
fn test_task_ids_are_sequential() {
    let mut harness = setup();
    let ids: Vec<TaskId> = (0..3)
        .map(|_| harness.context.create_task(false, false).task_id)
        .collect();
    assert_eq!(ids, vec![TaskId::Number(1), TaskId::Number(2), TaskId::Number(3)]);
}

#[test]
fn test_factory_tasks_are_unguessable() {
    let mut harness = setup();
    let task = harness.context.create_task(true, false);
    match task.task_id {
        TaskId::Uuid(id) => assert!(uuid::Uuid::parse_str(&id).is_ok()),
        TaskId::Number(id) => panic!("expected a uuid, got {id}"),
    }
    assert_eq!(harness.context.create_task(false, false).task_id, TaskId::Number(1));
}

#[test]
fn test_forced_unguessable_ids() {
    let mut harness = setup_with_config(RuntimeConfig::default().with_unguessable_task_ids(true));
    assert!(matches!(harness.context.create_task(false, false).task_id, TaskId::Uuid(_)));
}

#[test]
fn test_resolve_task_once() {
    let mut harness = setup();
    let task = harness.context.create_task(false, false);
    let mut promise = tokio_test::task::spawn(task.promise);
    assert_pending!(promise.poll());

    assert!(!harness.context.resolve_task(&task.task_id, json!("remote"), true));
    assert_pending!(promise.poll());

    assert!(harness.context.resolve_task(&task.task_id, json!("local"), false));
    assert!(!harness.context.resolve_task(&task.task_id, json!("again"), false));
    assert!(!harness.context.reject_task(&task.task_id, json!("late"), false));

    assert_ready_eq!(promise.poll(), Ok(json!("local")));
    assert_eq!(harness.context.pending_task_count(), 0);
}

#[test]
fn test_remote_task_ignores_local_settlement() {
    let mut harness = setup();
    let task = harness.context.create_task(false, true);
    let mut promise = tokio_test::task::spawn(task.promise);

    assert!(!harness.context.reject_task(&task.task_id, json!("local"), false));
    assert_pending!(promise.poll());

    assert!(harness.context.reject_task(&task.task_id, json!("denied"), true));
    assert_ready_eq!(promise.poll(), Err(TaskError::Rejected(json!("denied"))));
}

#[test]
fn test_unknown_task_is_ignored() {
    let mut harness = setup();
    assert!(!harness.context.resolve_task(&TaskId::Number(99), Value::Null, false));
    assert!(!harness.context.resolve_task(&TaskId::Uuid("nope".to_string()), Value::Null, true));
}

#[test]
fn test_dropped_context_abandons_tasks() {
    let mut harness = setup();
    let task = harness.context.create_task(false, false);
    let mut promise = tokio_test::task::spawn(task.promise);
    drop(harness);
    assert_ready_eq!(promise.poll(), Err(TaskError::Abandoned));
}

// ==================== Mocks ====================

#[test]
fn test_mock_returns_through_context() {
    let mut harness = setup();
    harness.context.set_mock_returns("os.toast", vec![json!(1)]);
    harness.context.set_mock_return("web.get", vec![json!("url")], json!("body"));

    assert_eq!(harness.context.get_next_mock_return("os.toast", "os.toast", &[]).unwrap(), json!(1));
    assert_eq!(
        harness.context.get_next_mock_return("web.get", "web.get", &[json!("url")]).unwrap(),
        json!("body")
    );
    assert!(matches!(
        harness.context.get_next_mock_return("os.toast", "os.toast", &[]),
        Err(RuntimeError::MockValuesExhausted(_))
    ));
    assert!(matches!(
        harness.context.get_next_mock_return("os.sleep", "os.sleep", &[]),
        Err(RuntimeError::NoMockData(_))
    ));
}

// ==================== Time & misc ====================

#[test]
fn test_local_time_uses_wall_clock() {
    let harness = setup();
    assert!(harness.context.start_time() <= chrono::Utc::now());
    assert!(harness.context.local_time() >= 0);
}

#[test]
fn test_shout_timers_sorted_by_total() {
    let mut harness = setup();
    harness.context.add_shout_time("onClick", 5.0);
    harness.context.add_shout_time("onDrag", 8.0);
    harness.context.add_shout_time("onClick", 4.0);

    let timers = harness.context.shout_timers();
    assert_eq!(
        timers,
        vec![
            ShoutTimer { listener: "onClick".into(), time_ms: 9.0 },
            ShoutTimer { listener: "onDrag".into(), time_ms: 8.0 },
        ]
    );
}

#[test]
fn test_uuids_are_unique() {
    let harness = setup();
    assert_ne!(harness.context.uuid(), harness.context.uuid());
}
