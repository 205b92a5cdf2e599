//! End-to-end dispatch tests: commands flow through the real queues,
//! handler tables, and metrics, without sockets.

use std::sync::Arc;

use chrono::Utc;

use ashfall::config::ServerConfig;
use ashfall::data::loot::StandardLootCalculator;
use ashfall::data::script::NoopHookRunner;
use ashfall::data::{CreatureDefinition, DefinitionStore, MapDefinition};
use ashfall::scheduler::ai::AiScheduler;
use ashfall::scheduler::spawn::SpawnScheduler;
use ashfall::scheduler::{Clock, ManualClock};
use ashfall::session::OutboundMessage;
use ashfall::world::command::{ClientCommand, ControlCommand, RawPacket};
use ashfall::world::dispatch;
use ashfall::world::guard::{MSG_CANNOT_IN_STATE, MSG_CANNOT_NOW};
use ashfall::world::handlers::{OP_ATTACK, OP_TALK, OP_WALK};
use ashfall::world::object::Creature;
use ashfall::world::WorldRuntime;

fn world_store() -> DefinitionStore {
    let mut store = DefinitionStore::new();
    store.add_map(MapDefinition::new(1, "mileth", 10, 10)).unwrap();
    store
        .add_creature(CreatureDefinition {
            name: "goblin".to_string(),
            hp: 50,
            action_delay_ms: 1000,
            on_load: None,
        })
        .unwrap();
    store
}

fn test_runtime() -> (Arc<WorldRuntime>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let runtime = Arc::new(WorldRuntime::new(
        ServerConfig::default(),
        Arc::new(world_store()),
        Arc::new(NoopHookRunner),
        Arc::new(StandardLootCalculator),
        Arc::clone(&clock) as Arc<dyn Clock>,
    ));
    (runtime, clock)
}

fn client_command(connection_id: u64, opcode: u8, payload: Vec<u8>) -> ClientCommand {
    ClientCommand {
        connection_id,
        packet: RawPacket::new(opcode, payload),
    }
}

fn attack_payload(target: u32, damage: u32) -> Vec<u8> {
    let mut payload = target.to_le_bytes().to_vec();
    payload.extend_from_slice(&damage.to_le_bytes());
    payload
}

fn insert_goblin(runtime: &WorldRuntime, x: u16, y: u16) -> u32 {
    let def = runtime.store.creature("goblin").unwrap();
    let creature =
        Creature::from_definition(&def, 1, x, y, Default::default(), runtime.clock.now());
    runtime.objects.insert(creature).id
}

#[test]
fn test_talk_flows_through_both_queues_in_order() {
    let (runtime, _clock) = test_runtime();
    let control_rx = runtime.take_control_receiver();
    let (actor, outbound) = runtime.sessions.register("aislinn", 1);

    for text in ["one", "two", "three"] {
        dispatch::dispatch_client(
            &runtime,
            client_command(actor.connection_id, OP_TALK, text.as_bytes().to_vec()),
        );
    }
    assert_eq!(runtime.metrics.processed(), 3);

    // The control queue preserves submission order, and the broadcast
    // handler preserves it onto the outbound channel.
    let mut delivered = Vec::new();
    while let Some(command) = control_rx.try_recv() {
        dispatch::dispatch_control(&runtime, command);
    }
    while let Some(OutboundMessage::SystemMessage(text)) = outbound.try_recv().ok() {
        delivered.push(text);
    }
    assert_eq!(
        delivered,
        vec![
            "aislinn: one".to_string(),
            "aislinn: two".to_string(),
            "aislinn: three".to_string()
        ]
    );
}

#[test]
fn test_prohibited_condition_blocks_with_notice() {
    let (runtime, _clock) = test_runtime();
    let (actor, outbound) = runtime.sessions.register("aislinn", 1);
    actor.set_position(5, 5);
    actor.add_condition(ashfall::world::guard::ConditionFlags::FROZEN);

    dispatch::dispatch_client(&runtime, client_command(actor.connection_id, OP_WALK, vec![0]));

    assert_eq!(runtime.metrics.guard_blocked(), 1);
    assert_eq!(runtime.metrics.processed(), 0);
    assert_eq!(actor.position(), (5, 5));
    assert_eq!(
        outbound.try_recv().unwrap(),
        OutboundMessage::SystemMessage(MSG_CANNOT_IN_STATE.to_string())
    );
}

#[test]
fn test_walk_in_dialog_forces_refresh() {
    let (runtime, _clock) = test_runtime();
    let (actor, outbound) = runtime.sessions.register("aislinn", 1);
    actor.set_position(5, 5);
    actor.add_condition(ashfall::world::guard::ConditionFlags::IN_DIALOG);

    dispatch::dispatch_client(&runtime, client_command(actor.connection_id, OP_WALK, vec![0]));

    assert_eq!(runtime.metrics.guard_blocked(), 1);
    assert_eq!(actor.position(), (5, 5));
    assert_eq!(outbound.try_recv().unwrap(), OutboundMessage::Refresh);
}

#[test]
fn test_blocked_while_in_dialog_closes_dialog() {
    let (runtime, _clock) = test_runtime();
    let (actor, outbound) = runtime.sessions.register("aislinn", 1);
    actor.add_condition(ashfall::world::guard::ConditionFlags::IN_DIALOG);
    let goblin = insert_goblin(&runtime, 3, 3);

    // Attacking is prohibited while in dialog; the notice is followed by a
    // dialog teardown and the flag clears.
    dispatch::dispatch_client(
        &runtime,
        client_command(actor.connection_id, OP_ATTACK, attack_payload(goblin, 10)),
    );

    assert_eq!(
        outbound.try_recv().unwrap(),
        OutboundMessage::SystemMessage(MSG_CANNOT_IN_STATE.to_string())
    );
    assert_eq!(outbound.try_recv().unwrap(), OutboundMessage::CloseDialog);
    assert!(!actor
        .condition()
        .intersects(ashfall::world::guard::ConditionFlags::IN_DIALOG));
}

#[test]
fn test_required_condition_blocks_with_notice() {
    let (runtime, _clock) = test_runtime();
    let (actor, outbound) = runtime.sessions.register("aislinn", 1);
    actor.set_condition(ashfall::world::guard::ConditionFlags::NONE);

    dispatch::dispatch_client(
        &runtime,
        client_command(actor.connection_id, OP_TALK, b"hello".to_vec()),
    );

    assert_eq!(runtime.metrics.guard_blocked(), 1);
    assert_eq!(
        outbound.try_recv().unwrap(),
        OutboundMessage::SystemMessage(MSG_CANNOT_NOW.to_string())
    );
}

#[test]
fn test_handler_error_does_not_stop_dispatch() {
    let (runtime, _clock) = test_runtime();
    let (actor, _outbound) = runtime.sessions.register("aislinn", 1);

    // Truncated attack payload fails parsing.
    dispatch::dispatch_client(
        &runtime,
        client_command(actor.connection_id, OP_ATTACK, vec![1, 2]),
    );
    assert_eq!(runtime.metrics.handler_errors(), 1);
    assert_eq!(runtime.metrics.processed(), 0);

    // The next command still dispatches normally.
    dispatch::dispatch_client(
        &runtime,
        client_command(actor.connection_id, OP_TALK, b"still here".to_vec()),
    );
    assert_eq!(runtime.metrics.processed(), 1);
}

#[test]
fn test_unknown_opcode_is_ignored() {
    let (runtime, _clock) = test_runtime();
    let (actor, _outbound) = runtime.sessions.register("aislinn", 1);

    dispatch::dispatch_client(&runtime, client_command(actor.connection_id, 0xFF, vec![]));

    assert_eq!(runtime.metrics.unknown_opcodes(), 1);
    assert_eq!(runtime.metrics.processed(), 0);
    assert_eq!(runtime.metrics.handler_errors(), 0);
}

#[test]
fn test_unresolved_actor_is_counted() {
    let (runtime, _clock) = test_runtime();

    dispatch::dispatch_client(&runtime, client_command(4242, OP_TALK, b"ghost".to_vec()));

    assert_eq!(runtime.metrics.unresolved_actors(), 1);
    assert_eq!(runtime.metrics.processed(), 0);
}

#[test]
fn test_attack_kills_creature_through_control_queue() {
    let (runtime, _clock) = test_runtime();
    let control_rx = runtime.take_control_receiver();
    let (actor, outbound) = runtime.sessions.register("aislinn", 1);
    let goblin = insert_goblin(&runtime, 3, 3);

    dispatch::dispatch_client(
        &runtime,
        client_command(actor.connection_id, OP_ATTACK, attack_payload(goblin, 60)),
    );

    let command = control_rx.try_recv().expect("damage intent expected");
    assert!(matches!(command, ControlCommand::DamageCreature { .. }));
    dispatch::dispatch_control(&runtime, command);

    // Killed, removed, and announced to observers on the map.
    assert!(runtime.objects.get(goblin).is_none());
    assert_eq!(
        outbound.try_recv().unwrap(),
        OutboundMessage::SystemMessage("goblin dies.".to_string())
    );
}

#[test]
fn test_spawn_intents_materialize_through_control_consumer() {
    let mut store = world_store();
    store.add_spawn_group(
        serde_yaml::from_str(
            r#"
name: fields
maps:
  - map: mileth
    limit: 5
    interval_secs: 30
    min_count: 2
    max_count: 2
spawns:
  - base: goblin
"#,
        )
        .unwrap(),
    );
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let runtime = Arc::new(WorldRuntime::new(
        ServerConfig::default(),
        Arc::new(store),
        Arc::new(NoopHookRunner),
        Arc::new(StandardLootCalculator),
        clock,
    ));
    let control_rx = runtime.take_control_receiver();

    let mut scheduler = SpawnScheduler::new(Arc::clone(&runtime));
    scheduler.scan_once();

    // Scans never touch the table themselves.
    assert!(runtime.objects.is_empty());

    while let Some(command) = control_rx.try_recv() {
        dispatch::dispatch_control(&runtime, command);
    }
    assert_eq!(runtime.objects.count_on(1), 2);
}

#[test]
fn test_ai_intent_stamps_cooldown_only_at_execution() {
    let (runtime, clock) = test_runtime();
    let control_rx = runtime.take_control_receiver();
    let (_actor, _outbound) = runtime.sessions.register("watcher", 1);
    let goblin = insert_goblin(&runtime, 3, 3);

    clock.advance(chrono::Duration::seconds(2));
    let mut scheduler = AiScheduler::new(Arc::clone(&runtime));
    scheduler.scan_once();

    let obj = runtime.objects.get(goblin).unwrap();
    assert!(obj.creature.action_ready(runtime.clock.now()));

    let command = control_rx.try_recv().expect("ai intent expected");
    dispatch::dispatch_control(&runtime, command);

    // Executed: cooldown restarts from now.
    assert!(!obj.creature.action_ready(runtime.clock.now()));
}

#[test]
fn test_status_tick_regenerates_through_control_consumer() {
    let (runtime, _clock) = test_runtime();
    let goblin = insert_goblin(&runtime, 3, 3);
    let obj = runtime.objects.get(goblin).unwrap();
    obj.creature.apply_damage(20);

    dispatch::dispatch_control(&runtime, ControlCommand::StatusTick { creature_id: goblin });
    assert_eq!(obj.creature.hp(), 35);

    // At full health the tick is a no-op.
    obj.creature.apply_heal(100);
    dispatch::dispatch_control(&runtime, ControlCommand::StatusTick { creature_id: goblin });
    assert_eq!(obj.creature.hp(), 50);

    // Stale tick after removal is dropped, not an error.
    runtime.objects.remove(goblin);
    dispatch::dispatch_control(&runtime, ControlCommand::StatusTick { creature_id: goblin });
    assert_eq!(runtime.metrics.handler_errors(), 0);
}

#[test]
fn test_stale_ai_intent_for_dead_creature_is_dropped() {
    let (runtime, clock) = test_runtime();
    let control_rx = runtime.take_control_receiver();
    let (_actor, _outbound) = runtime.sessions.register("watcher", 1);
    let goblin = insert_goblin(&runtime, 3, 3);

    clock.advance(chrono::Duration::seconds(2));
    let mut scheduler = AiScheduler::new(Arc::clone(&runtime));
    scheduler.scan_once();
    let command = control_rx.try_recv().expect("ai intent expected");

    // The creature dies between scan and execution.
    runtime.objects.remove(goblin);
    dispatch::dispatch_control(&runtime, command);
    assert_eq!(runtime.metrics.handler_errors(), 0);
    assert_eq!(runtime.metrics.processed(), 1);
}

#[test]
fn test_buffered_commands_discarded_after_shutdown() {
    let (runtime, _clock) = test_runtime();
    let (actor, _outbound) = runtime.sessions.register("aislinn", 1);

    for _ in 0..3 {
        runtime.enqueue_client(client_command(actor.connection_id, OP_TALK, b"hi".to_vec()));
    }
    runtime.begin_shutdown();

    let handles = runtime.start_consumers();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(runtime.metrics.discarded_on_close(), 3);
    assert_eq!(runtime.metrics.processed(), 0);
}

#[test]
fn test_enqueue_after_shutdown_is_dropped_and_counted() {
    let (runtime, _clock) = test_runtime();
    runtime.begin_shutdown();

    let outcome = runtime.enqueue_control(ControlCommand::GlobalMessage {
        message: "too late".to_string(),
    });
    assert_eq!(
        outcome,
        ashfall::world::queue::EnqueueOutcome::DroppedClosed
    );
    assert_eq!(runtime.control_queue.dropped_count(), 1);
}

#[test]
fn test_end_to_end_order_through_consumer_threads() {
    let (runtime, _clock) = test_runtime();
    let (actor, outbound) = runtime.sessions.register("aislinn", 1);
    let handles = runtime.start_consumers();

    for i in 0..20 {
        runtime.enqueue_client(client_command(
            actor.connection_id,
            OP_TALK,
            format!("{i}").into_bytes(),
        ));
    }

    // 20 client dispatches plus 20 control broadcasts.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while runtime.metrics.processed() < 40 {
        assert!(std::time::Instant::now() < deadline, "dispatch stalled");
        std::thread::sleep(std::time::Duration::from_millis(5));
    }

    runtime.begin_shutdown();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut delivered = Vec::new();
    while let Ok(OutboundMessage::SystemMessage(text)) = outbound.try_recv() {
        delivered.push(text);
    }
    let expected: Vec<String> = (0..20).map(|i| format!("aislinn: {i}")).collect();
    assert_eq!(delivered, expected);
}
