//! Ashfall world server core.
//!
//! A persistent multiplayer world built around a dual-queue, single-writer
//! dispatcher: client packets and internal control commands flow through
//! separate queues, each with exactly one consumer thread, and only the
//! control consumer mutates the world object table. Background schedulers
//! scan read-only snapshots and enqueue intents.

pub mod config;
pub mod core;
pub mod data;
pub mod network;
pub mod scheduler;
pub mod session;
pub mod world;
