//! Command model for the dual-queue dispatcher.
//!
//! Commands are immutable once enqueued: a producer creates one, exactly one
//! consumer loop takes ownership and dispatches it, then it is dropped.

use bytes::Bytes;

use crate::data::MapId;
use crate::session::ConnectionId;
use crate::world::object::{Creature, ObjectId};

/// A wire packet as handed over by the transport layer. The core never
/// decodes payload bytes beyond the already-extracted leading opcode.
#[derive(Debug, Clone)]
pub struct RawPacket {
    pub opcode: u8,
    pub payload: Bytes,
}

impl RawPacket {
    pub fn new(opcode: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }
}

/// A command originating from a network client.
#[derive(Debug, Clone)]
pub struct ClientCommand {
    pub connection_id: ConnectionId,
    pub packet: RawPacket,
}

/// Internal control commands: intents produced by the schedulers and by
/// handlers routing world mutations to the single-writer control consumer.
#[derive(Debug)]
pub enum ControlCommand {
    /// Materialize a fully-formed creature on a map. Only the control
    /// consumer may perform the actual insertion.
    SpawnCreature { creature: Creature, map_id: MapId },
    /// Run one AI action for a creature whose cooldown has elapsed.
    AiEvaluate { creature_id: ObjectId, map_id: MapId },
    /// Apply damage; death processing happens here, not in packet handlers.
    DamageCreature { creature_id: ObjectId, amount: u32 },
    /// Remove a dead creature from the world.
    HandleDeath { creature_id: ObjectId },
    /// Periodic regeneration tick for a damaged creature.
    StatusTick { creature_id: ObjectId },
    /// Tear down a departed session.
    CleanupSession { connection_id: ConnectionId },
    /// Broadcast a message to every connected actor.
    GlobalMessage { message: String },
    /// Request process shutdown.
    Shutdown,
}

/// Registry key for control commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlOpcode {
    SpawnCreature,
    AiEvaluate,
    DamageCreature,
    HandleDeath,
    StatusTick,
    CleanupSession,
    GlobalMessage,
    Shutdown,
}

impl ControlCommand {
    pub fn opcode(&self) -> ControlOpcode {
        match self {
            ControlCommand::SpawnCreature { .. } => ControlOpcode::SpawnCreature,
            ControlCommand::AiEvaluate { .. } => ControlOpcode::AiEvaluate,
            ControlCommand::DamageCreature { .. } => ControlOpcode::DamageCreature,
            ControlCommand::HandleDeath { .. } => ControlOpcode::HandleDeath,
            ControlCommand::StatusTick { .. } => ControlOpcode::StatusTick,
            ControlCommand::CleanupSession { .. } => ControlOpcode::CleanupSession,
            ControlCommand::GlobalMessage { .. } => ControlOpcode::GlobalMessage,
            ControlCommand::Shutdown => ControlOpcode::Shutdown,
        }
    }
}

impl ControlOpcode {
    /// Stable label for logs and timer sinks.
    pub fn label(&self) -> &'static str {
        match self {
            ControlOpcode::SpawnCreature => "spawn_creature",
            ControlOpcode::AiEvaluate => "ai_evaluate",
            ControlOpcode::DamageCreature => "damage_creature",
            ControlOpcode::HandleDeath => "handle_death",
            ControlOpcode::StatusTick => "status_tick",
            ControlOpcode::CleanupSession => "cleanup_session",
            ControlOpcode::GlobalMessage => "global_message",
            ControlOpcode::Shutdown => "shutdown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_opcode_mapping() {
        let cmd = ControlCommand::GlobalMessage {
            message: "hello".to_string(),
        };
        assert_eq!(cmd.opcode(), ControlOpcode::GlobalMessage);
        assert_eq!(cmd.opcode().label(), "global_message");
        assert_eq!(ControlCommand::Shutdown.opcode(), ControlOpcode::Shutdown);
        assert_eq!(
            ControlCommand::StatusTick { creature_id: 3 }.opcode().label(),
            "status_tick"
        );
    }

    #[test]
    fn test_raw_packet_payload() {
        let pkt = RawPacket::new(0x06, vec![1u8, 2, 3]);
        assert_eq!(pkt.opcode, 0x06);
        assert_eq!(&pkt.payload[..], &[1, 2, 3]);
    }
}
