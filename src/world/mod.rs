//! The world core: command queues, handler registries, dispatch loops, and
//! the object table, wired together by [`WorldRuntime`].
//!
//! Concurrency contract: any thread may enqueue; exactly one consumer thread
//! per queue dispatches; only the control consumer mutates the world object
//! table. The schedulers read snapshots and enqueue intents, nothing more.

pub mod command;
pub mod dispatch;
pub mod guard;
pub mod handlers;
pub mod metrics;
pub mod object;
pub mod queue;

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::config::ServerConfig;
use crate::core::ShutdownToken;
use crate::data::loot::{LootCalculator, StandardLootCalculator};
use crate::data::script::{HookRunner, NoopHookRunner};
use crate::data::DefinitionStore;
use crate::scheduler::{Clock, SystemClock};
use crate::session::SessionRegistry;
use crate::world::command::{ClientCommand, ControlCommand};
use crate::world::handlers::{ControlHandlerTable, PacketHandlerTable};
use crate::world::metrics::DispatchMetrics;
use crate::world::object::WorldObjectTable;
use crate::world::queue::{CommandQueue, CommandReceiver, EnqueueOutcome};

/// Shared world state and the two command queues. Everything hangs off one
/// `Arc<WorldRuntime>`.
pub struct WorldRuntime {
    pub config: ServerConfig,
    pub store: Arc<DefinitionStore>,
    pub objects: WorldObjectTable,
    pub sessions: SessionRegistry,
    pub metrics: Arc<DispatchMetrics>,
    pub clock: Arc<dyn Clock>,
    pub loot: Arc<dyn LootCalculator>,
    pub client_queue: CommandQueue<ClientCommand>,
    pub control_queue: CommandQueue<ControlCommand>,
    packet_handlers: PacketHandlerTable,
    control_handlers: ControlHandlerTable,
    client_rx: Mutex<Option<CommandReceiver<ClientCommand>>>,
    control_rx: Mutex<Option<CommandReceiver<ControlCommand>>>,
    shutdown: ShutdownToken,
}

impl WorldRuntime {
    pub fn new(
        config: ServerConfig,
        store: Arc<DefinitionStore>,
        hooks: Arc<dyn HookRunner>,
        loot: Arc<dyn LootCalculator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (client_queue, client_rx) = CommandQueue::new("client");
        let (control_queue, control_rx) = CommandQueue::new("control");
        Self {
            config,
            store,
            objects: WorldObjectTable::new(hooks),
            sessions: SessionRegistry::new(),
            metrics: Arc::new(DispatchMetrics::new()),
            clock,
            loot,
            client_queue,
            control_queue,
            packet_handlers: handlers::default_packet_handlers(),
            control_handlers: handlers::default_control_handlers(),
            client_rx: Mutex::new(Some(client_rx)),
            control_rx: Mutex::new(Some(control_rx)),
            shutdown: ShutdownToken::new(),
        }
    }

    /// A runtime with stock wiring: real clock, standard loot, no hooks.
    pub fn with_defaults(config: ServerConfig, store: Arc<DefinitionStore>) -> Self {
        Self::new(
            config,
            store,
            Arc::new(NoopHookRunner),
            Arc::new(StandardLootCalculator),
            Arc::new(SystemClock),
        )
    }

    pub fn packet_handlers(&self) -> &PacketHandlerTable {
        &self.packet_handlers
    }

    pub fn control_handlers(&self) -> &ControlHandlerTable {
        &self.control_handlers
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_triggered()
    }

    pub fn enqueue_client(&self, command: ClientCommand) -> EnqueueOutcome {
        self.client_queue.enqueue(command)
    }

    pub fn enqueue_control(&self, command: ControlCommand) -> EnqueueOutcome {
        self.control_queue.enqueue(command)
    }

    /// Trigger shutdown: flips the token and closes both queues so the
    /// consumer loops exit once their buffers drain. Idempotent, callable
    /// from any thread including the control consumer itself.
    pub fn begin_shutdown(&self) {
        if self.shutdown.is_triggered() {
            return;
        }
        tracing::info!("[world] shutdown triggered");
        self.shutdown.trigger();
        self.client_queue.close();
        self.control_queue.close();
    }

    /// Take the client receiver. Panics if the consumer was already started.
    pub fn take_client_receiver(&self) -> CommandReceiver<ClientCommand> {
        self.client_rx
            .lock()
            .expect("client receiver lock poisoned")
            .take()
            .expect("client consumer already started")
    }

    /// Take the control receiver. Panics if the consumer was already started.
    pub fn take_control_receiver(&self) -> CommandReceiver<ControlCommand> {
        self.control_rx
            .lock()
            .expect("control receiver lock poisoned")
            .take()
            .expect("control consumer already started")
    }

    /// Spawn the two consumer threads. The returned handles join once
    /// shutdown closes the queues and the buffers drain.
    pub fn start_consumers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let client_rx = self.take_client_receiver();
        let control_rx = self.take_control_receiver();

        let client_runtime = Arc::clone(self);
        let control_runtime = Arc::clone(self);
        vec![
            std::thread::Builder::new()
                .name("client-consumer".to_string())
                .spawn(move || dispatch::run_client_loop(client_runtime, client_rx))
                .expect("failed to spawn client consumer"),
            std::thread::Builder::new()
                .name("control-consumer".to_string())
                .spawn(move || dispatch::run_control_loop(control_runtime, control_rx))
                .expect("failed to spawn control consumer"),
        ]
    }
}
