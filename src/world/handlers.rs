//! Handler registries for both queues.
//!
//! Both tables are built statically at startup. Registration is explicit
//! code; there is no scanning or runtime discovery, so the full opcode
//! surface is visible in one place and misregistration is a compile error
//! or an obvious gap in [`default_packet_handlers`].

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::bail;
use rand::RngExt;

use crate::session::Actor;
use crate::world::command::{ControlCommand, ControlOpcode, RawPacket};
use crate::world::guard::{ConditionFlags, CorrectiveAction, GuardRules};
use crate::world::WorldRuntime;

pub const OP_WALK: u8 = 0x06;
pub const OP_EXIT: u8 = 0x0B;
pub const OP_TALK: u8 = 0x0E;
pub const OP_ATTACK: u8 = 0x13;
pub const OP_REFRESH: u8 = 0x38;
pub const OP_HEARTBEAT: u8 = 0x45;

pub type PacketHandlerFn =
    Box<dyn Fn(&WorldRuntime, &Arc<Actor>, &RawPacket) -> anyhow::Result<()> + Send + Sync>;

pub struct PacketHandler {
    pub name: &'static str,
    pub guards: GuardRules,
    handler: PacketHandlerFn,
}

impl PacketHandler {
    pub fn invoke(
        &self,
        runtime: &WorldRuntime,
        actor: &Arc<Actor>,
        packet: &RawPacket,
    ) -> anyhow::Result<()> {
        (self.handler)(runtime, actor, packet)
    }
}

/// Client-opcode dispatch table, one slot per possible opcode byte.
pub struct PacketHandlerTable {
    entries: [Option<PacketHandler>; 256],
}

impl PacketHandlerTable {
    pub fn empty() -> Self {
        Self {
            entries: std::array::from_fn(|_| None),
        }
    }

    pub fn register(
        &mut self,
        opcode: u8,
        name: &'static str,
        guards: GuardRules,
        handler: PacketHandlerFn,
    ) {
        if self.entries[opcode as usize].is_some() {
            tracing::warn!("[handlers] opcode 0x{:02X} re-registered as {}", opcode, name);
        }
        self.entries[opcode as usize] = Some(PacketHandler {
            name,
            guards,
            handler,
        });
    }

    pub fn get(&self, opcode: u8) -> Option<&PacketHandler> {
        self.entries[opcode as usize].as_ref()
    }

    pub fn registered_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }
}

/// The stock client opcode set.
pub fn default_packet_handlers() -> PacketHandlerTable {
    let mut table = PacketHandlerTable::empty();

    table.register(
        OP_WALK,
        "walk",
        GuardRules::new()
            .prohibited(ConditionFlags::FROZEN | ConditionFlags::ASLEEP | ConditionFlags::PARALYZED)
            .prohibited_with(ConditionFlags::IN_DIALOG, CorrectiveAction::ForceRefresh),
        Box::new(handle_walk),
    );

    table.register(
        OP_EXIT,
        "exit",
        GuardRules::new(),
        Box::new(handle_exit),
    );

    table.register(
        OP_TALK,
        "talk",
        GuardRules::new()
            .required(ConditionFlags::ALIVE)
            .prohibited(ConditionFlags::ASLEEP),
        Box::new(handle_talk),
    );

    table.register(
        OP_ATTACK,
        "attack",
        GuardRules::new()
            .required(ConditionFlags::ALIVE)
            .prohibited(
                ConditionFlags::FROZEN
                    | ConditionFlags::ASLEEP
                    | ConditionFlags::PARALYZED
                    | ConditionFlags::IN_DIALOG,
            ),
        Box::new(handle_attack),
    );

    table.register(
        OP_REFRESH,
        "refresh",
        GuardRules::new(),
        Box::new(|_runtime, actor, _packet| {
            actor.refresh();
            Ok(())
        }),
    );

    table.register(
        OP_HEARTBEAT,
        "heartbeat",
        GuardRules::new(),
        Box::new(|_runtime, _actor, _packet| Ok(())),
    );

    table
}

fn handle_walk(runtime: &WorldRuntime, actor: &Arc<Actor>, packet: &RawPacket) -> anyhow::Result<()> {
    let Some(&direction) = packet.payload.first() else {
        bail!("walk packet missing direction byte");
    };
    let (x, y) = actor.position();
    let target = match direction {
        0 => (x, y.wrapping_sub(1)),
        1 => (x.wrapping_add(1), y),
        2 => (x, y.wrapping_add(1)),
        3 => (x.wrapping_sub(1), y),
        other => bail!("walk packet has invalid direction {other}"),
    };
    let Some(map) = runtime.store.map(actor.map_id()) else {
        bail!("actor {} is on unknown map {}", actor.name, actor.map_id());
    };
    if map.is_wall(target.0, target.1) {
        // Client desync; snap it back.
        actor.refresh();
        return Ok(());
    }
    actor.set_position(target.0, target.1);
    Ok(())
}

fn handle_exit(runtime: &WorldRuntime, actor: &Arc<Actor>, _packet: &RawPacket) -> anyhow::Result<()> {
    runtime.enqueue_control(ControlCommand::CleanupSession {
        connection_id: actor.connection_id,
    });
    Ok(())
}

fn handle_talk(runtime: &WorldRuntime, actor: &Arc<Actor>, packet: &RawPacket) -> anyhow::Result<()> {
    let text = std::str::from_utf8(&packet.payload)?;
    runtime.enqueue_control(ControlCommand::GlobalMessage {
        message: format!("{}: {}", actor.name, text),
    });
    Ok(())
}

fn handle_attack(runtime: &WorldRuntime, _actor: &Arc<Actor>, packet: &RawPacket) -> anyhow::Result<()> {
    if packet.payload.len() < 8 {
        bail!("attack packet is {} bytes, expected 8", packet.payload.len());
    }
    let target = u32::from_le_bytes(packet.payload[0..4].try_into()?);
    let damage = u32::from_le_bytes(packet.payload[4..8].try_into()?);
    runtime.enqueue_control(ControlCommand::DamageCreature {
        creature_id: target,
        amount: damage,
    });
    Ok(())
}

pub type ControlHandlerFn =
    Box<dyn Fn(&WorldRuntime, ControlCommand) -> anyhow::Result<()> + Send + Sync>;

/// Control-opcode dispatch table.
pub struct ControlHandlerTable {
    entries: HashMap<ControlOpcode, ControlHandlerFn>,
}

impl ControlHandlerTable {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, opcode: ControlOpcode, handler: ControlHandlerFn) {
        if self.entries.insert(opcode, handler).is_some() {
            tracing::warn!("[handlers] control opcode {} re-registered", opcode.label());
        }
    }

    pub fn get(&self, opcode: ControlOpcode) -> Option<&ControlHandlerFn> {
        self.entries.get(&opcode)
    }

    pub fn registered_count(&self) -> usize {
        self.entries.len()
    }
}

/// The stock control command set. All world-table mutation lives here, on
/// the single control consumer thread.
pub fn default_control_handlers() -> ControlHandlerTable {
    let mut table = ControlHandlerTable::empty();

    table.register(
        ControlOpcode::SpawnCreature,
        Box::new(|runtime, command| {
            let ControlCommand::SpawnCreature { creature, map_id } = command else {
                bail!("mismatched control command for spawn_creature");
            };
            if runtime.store.map(map_id).is_none() {
                bail!("spawn requested on unknown map {map_id}");
            }
            runtime.objects.insert(creature);
            Ok(())
        }),
    );

    table.register(
        ControlOpcode::AiEvaluate,
        Box::new(|runtime, command| {
            let ControlCommand::AiEvaluate { creature_id, map_id } = command else {
                bail!("mismatched control command for ai_evaluate");
            };
            // The intent was derived from a snapshot; the creature may have
            // died or moved maps since. Stale intents are dropped silently.
            let Some(obj) = runtime.objects.get(creature_id) else {
                return Ok(());
            };
            let creature = &obj.creature;
            if creature.map_id != map_id || creature.ai_disabled() || !creature.is_alive() {
                return Ok(());
            }
            let now = runtime.clock.now();
            if !creature.action_ready(now) {
                return Ok(());
            }
            creature.touch_action(now);

            let Some(map) = runtime.store.map(map_id) else {
                return Ok(());
            };
            let (x, y) = creature.position();
            let mut rng = rand::rng();
            let target = match rng.random_range(0..4u8) {
                0 => (x, y.wrapping_sub(1)),
                1 => (x.wrapping_add(1), y),
                2 => (x, y.wrapping_add(1)),
                _ => (x.wrapping_sub(1), y),
            };
            if !map.is_wall(target.0, target.1)
                && !runtime.objects.occupied(map_id, target.0, target.1)
            {
                creature.set_position(target.0, target.1);
            }
            Ok(())
        }),
    );

    table.register(
        ControlOpcode::DamageCreature,
        Box::new(|runtime, command| {
            let ControlCommand::DamageCreature { creature_id, amount } = command else {
                bail!("mismatched control command for damage_creature");
            };
            let Some(obj) = runtime.objects.get(creature_id) else {
                return Ok(());
            };
            let remaining = obj.creature.apply_damage(amount);
            tracing::debug!(
                "[world] {} id={} took {} damage, {} hp left",
                obj.creature.name,
                creature_id,
                amount,
                remaining
            );
            if remaining == 0 {
                process_death(runtime, creature_id);
            }
            Ok(())
        }),
    );

    table.register(
        ControlOpcode::HandleDeath,
        Box::new(|runtime, command| {
            let ControlCommand::HandleDeath { creature_id } = command else {
                bail!("mismatched control command for handle_death");
            };
            process_death(runtime, creature_id);
            Ok(())
        }),
    );

    table.register(
        ControlOpcode::StatusTick,
        Box::new(|runtime, command| {
            let ControlCommand::StatusTick { creature_id } = command else {
                bail!("mismatched control command for status_tick");
            };
            // Stale ticks for removed or dead creatures are dropped.
            let Some(obj) = runtime.objects.get(creature_id) else {
                return Ok(());
            };
            let creature = &obj.creature;
            if !creature.is_alive() || creature.hp() >= creature.max_hp {
                return Ok(());
            }
            let amount = (creature.max_hp / 10).max(1);
            let healed = creature.apply_heal(amount);
            tracing::debug!(
                "[world] {} id={} regenerated to {} hp",
                creature.name,
                creature_id,
                healed
            );
            Ok(())
        }),
    );

    table.register(
        ControlOpcode::CleanupSession,
        Box::new(|runtime, command| {
            let ControlCommand::CleanupSession { connection_id } = command else {
                bail!("mismatched control command for cleanup_session");
            };
            runtime.sessions.remove(connection_id);
            Ok(())
        }),
    );

    table.register(
        ControlOpcode::GlobalMessage,
        Box::new(|runtime, command| {
            let ControlCommand::GlobalMessage { message } = command else {
                bail!("mismatched control command for global_message");
            };
            for actor in runtime.sessions.all() {
                actor.send_system_message(message.clone());
            }
            Ok(())
        }),
    );

    table.register(
        ControlOpcode::Shutdown,
        Box::new(|runtime, command| {
            let ControlCommand::Shutdown = command else {
                bail!("mismatched control command for shutdown");
            };
            runtime.begin_shutdown();
            Ok(())
        }),
    );

    table
}

/// Death processing runs only on the control consumer. Removal fires the
/// lifecycle hook and announces the death to observers on the same map.
fn process_death(runtime: &WorldRuntime, creature_id: crate::world::object::ObjectId) {
    let Some(obj) = runtime.objects.remove(creature_id) else {
        return;
    };
    let creature = &obj.creature;
    tracing::info!(
        "[world] {} id={} died, loot: {} xp, {} gold, {} items",
        creature.name,
        obj.id,
        creature.loot.xp,
        creature.loot.gold,
        creature.loot.items.len()
    );
    for actor in runtime.sessions.all() {
        if actor.map_id() == creature.map_id {
            actor.send_system_message(format!("{} dies.", creature.name));
        }
    }
}
