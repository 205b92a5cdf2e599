//! World server binary: wires configuration, world data, the consumer
//! threads, both schedulers, and the network listener together.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use ashfall::config::ServerConfig;
use ashfall::data::script::NoopHookRunner;
use ashfall::data::DefinitionStore;
use ashfall::network;
use ashfall::scheduler::ai::AiScheduler;
use ashfall::scheduler::spawn::SpawnScheduler;
use ashfall::world::WorldRuntime;

fn load_config() -> Result<ServerConfig> {
    let mut args = std::env::args().skip(1);
    let mut path = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--conf" => path = args.next(),
            other => {
                anyhow::bail!("unknown argument '{other}', expected --conf <file>");
            }
        }
    }
    match path {
        Some(path) => ServerConfig::load(&path)
            .with_context(|| format!("loading configuration from {path}")),
        None => Ok(ServerConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    let store = DefinitionStore::load_dir(&config.data_dir, &NoopHookRunner)
        .with_context(|| format!("loading world data from {}", config.data_dir))?;

    let runtime = Arc::new(WorldRuntime::with_defaults(config, Arc::new(store)));

    let mut threads = runtime.start_consumers();

    let spawn_scheduler = SpawnScheduler::new(Arc::clone(&runtime));
    threads.push(
        std::thread::Builder::new()
            .name("spawn-scheduler".to_string())
            .spawn(move || spawn_scheduler.run())
            .context("spawning spawn scheduler")?,
    );

    let ai_scheduler = AiScheduler::new(Arc::clone(&runtime));
    threads.push(
        std::thread::Builder::new()
            .name("ai-scheduler".to_string())
            .spawn(move || ai_scheduler.run())
            .context("spawning ai scheduler")?,
    );

    let listener = tokio::spawn(network::serve(Arc::clone(&runtime)));

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("[main] interrupt received, shutting down");
    runtime.begin_shutdown();

    listener.await.context("listener task")??;
    for thread in threads {
        if thread.join().is_err() {
            tracing::error!("[main] worker thread panicked during shutdown");
        }
    }
    tracing::info!("[main] shutdown complete");
    Ok(())
}
