//! Single-consumer blocking work queue with explicit close semantics.
//!
//! Producers on any thread call [`CommandQueue::enqueue`]; exactly one
//! consumer loop owns the matching [`CommandReceiver`]. Closing the queue is
//! the shutdown signal: enqueue attempts after close are dropped and counted,
//! never surfaced as an error to the caller.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crossbeam_channel::{Receiver, Sender};

/// Outcome of an enqueue attempt. Never an error; shutdown-ordering races
/// are expected and harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    DroppedClosed,
}

pub struct CommandQueue<T> {
    name: &'static str,
    // Sender lives behind the mutex so close() can drop it, which is what
    // unblocks a consumer waiting on an empty queue.
    sender: Mutex<Option<Sender<T>>>,
    closed: AtomicBool,
    dropped: AtomicU64,
}

pub struct CommandReceiver<T> {
    rx: Receiver<T>,
}

impl<T> CommandQueue<T> {
    /// Create a queue and its single consumer handle.
    pub fn new(name: &'static str) -> (Self, CommandReceiver<T>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (
            Self {
                name,
                sender: Mutex::new(Some(tx)),
                closed: AtomicBool::new(false),
                dropped: AtomicU64::new(0),
            },
            CommandReceiver { rx },
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Non-blocking append, callable from any thread.
    pub fn enqueue(&self, command: T) -> EnqueueOutcome {
        let guard = self.sender.lock().expect("queue sender lock poisoned");
        match guard.as_ref() {
            Some(tx) => match tx.send(command) {
                Ok(()) => EnqueueOutcome::Enqueued,
                // Unreachable while the sender is held, but treat it like a
                // close race rather than an error.
                Err(_) => self.note_drop(),
            },
            None => self.note_drop(),
        }
    }

    fn note_drop(&self) -> EnqueueOutcome {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("[queue] {}: dropped command, queue closed", self.name);
        EnqueueOutcome::DroppedClosed
    }

    /// Mark the queue closed. Buffered commands remain visible to the
    /// consumer (which discards them, see the dispatcher); once the buffer
    /// drains the consumer's `recv` returns `None` and its loop exits.
    /// Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut guard = self.sender.lock().expect("queue sender lock poisoned");
        if guard.take().is_some() {
            tracing::info!("[queue] {}: closed", self.name);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Commands dropped because they arrived after close.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T> CommandReceiver<T> {
    /// Block until a command is available. Returns `None` once the queue is
    /// closed and fully drained.
    pub fn recv(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    /// Non-blocking variant, for tests and drain loops.
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
