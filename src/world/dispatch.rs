//! The two consumer loops.
//!
//! Each loop is the sole consumer of its queue and runs on its own thread
//! until the queue is closed and drained. One failed command never takes a
//! loop down: handler errors are logged and counted, and a panicking handler
//! is caught at the dispatch boundary.
//!
//! No per-command timeout is enforced; a stalled handler blocks its consumer
//! until it returns. The per-opcode timer sink is what makes slow handlers
//! visible.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::session::OutboundMessage;
use crate::world::command::{ClientCommand, ControlCommand};
use crate::world::guard::{ConditionFlags, CorrectiveAction, GuardDecision};
use crate::world::queue::CommandReceiver;
use crate::world::WorldRuntime;

/// Consume client commands until close-and-drain. Commands still buffered
/// when the queue closes are discarded and counted, never dispatched.
pub fn run_client_loop(runtime: Arc<WorldRuntime>, rx: CommandReceiver<ClientCommand>) {
    tracing::info!("[dispatch] client consumer started");
    while let Some(command) = rx.recv() {
        if runtime.client_queue.is_closed() {
            runtime.metrics.note_discarded_on_close();
            continue;
        }
        dispatch_client(&runtime, command);
    }
    tracing::info!("[dispatch] client consumer stopped");
}

/// Consume control commands until close-and-drain.
pub fn run_control_loop(runtime: Arc<WorldRuntime>, rx: CommandReceiver<ControlCommand>) {
    tracing::info!("[dispatch] control consumer started");
    while let Some(command) = rx.recv() {
        if runtime.control_queue.is_closed() {
            runtime.metrics.note_discarded_on_close();
            continue;
        }
        dispatch_control(&runtime, command);
    }
    tracing::info!("[dispatch] control consumer stopped");
}

/// Dispatch a single client command: resolve the actor, evaluate the
/// handler's guards, then run it under a panic boundary with timing.
pub fn dispatch_client(runtime: &WorldRuntime, command: ClientCommand) {
    let opcode = command.packet.opcode;
    let Some(actor) = runtime.sessions.try_resolve(command.connection_id) else {
        tracing::warn!(
            "[dispatch] no session for connection {}, dropping opcode 0x{:02X}",
            command.connection_id,
            opcode
        );
        runtime.metrics.note_unresolved_actor();
        return;
    };

    let Some(handler) = runtime.packet_handlers().get(opcode) else {
        tracing::warn!(
            "[dispatch] unknown opcode 0x{:02X} from {}",
            opcode,
            actor.name
        );
        runtime.metrics.note_unknown_opcode();
        return;
    };

    let condition = actor.condition();
    if let GuardDecision::Block(action) = handler.guards.evaluate(condition) {
        match action {
            CorrectiveAction::SystemMessage(text) => {
                actor.send_system_message(text);
                // A block while a dialog is open also tears the dialog down,
                // so the client is not left stuck in it.
                if condition.intersects(ConditionFlags::IN_DIALOG) {
                    actor.send(OutboundMessage::CloseDialog);
                    actor.remove_condition(ConditionFlags::IN_DIALOG);
                }
            }
            CorrectiveAction::ForceRefresh => actor.refresh(),
        }
        runtime.metrics.note_guard_blocked();
        return;
    }

    let started = std::time::Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        handler.invoke(runtime, &actor, &command.packet)
    }));
    runtime.metrics.record_time(handler.name, started.elapsed());

    match outcome {
        Ok(Ok(())) => runtime.metrics.note_processed(),
        Ok(Err(err)) => {
            tracing::error!(
                "[dispatch] handler {} failed for {}: {:#}",
                handler.name,
                actor.name,
                err
            );
            runtime.metrics.note_handler_error();
        }
        Err(_) => {
            tracing::error!(
                "[dispatch] handler {} panicked for {}",
                handler.name,
                actor.name
            );
            runtime.metrics.note_handler_error();
        }
    }
}

/// Dispatch a single control command.
pub fn dispatch_control(runtime: &WorldRuntime, command: ControlCommand) {
    let opcode = command.opcode();
    let Some(handler) = runtime.control_handlers().get(opcode) else {
        tracing::warn!("[dispatch] unhandled control command {}", opcode.label());
        return;
    };

    let started = std::time::Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(runtime, command)));
    runtime.metrics.record_time(opcode.label(), started.elapsed());

    match outcome {
        Ok(Ok(())) => runtime.metrics.note_processed(),
        Ok(Err(err)) => {
            tracing::error!("[dispatch] control {} failed: {:#}", opcode.label(), err);
            runtime.metrics.note_handler_error();
        }
        Err(_) => {
            tracing::error!("[dispatch] control {} panicked", opcode.label());
            runtime.metrics.note_handler_error();
        }
    }
}
