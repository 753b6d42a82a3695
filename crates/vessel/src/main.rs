use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use vessel_net::{
    Component, Conductor, GateKeeper, Loom, LoopComponent, Sentinel, TickKind, Watcher, Weaver,
};

/// Default tick interval for a kind with neither a config override nor a
/// game-module-registered default. The core ships no game logic of its own;
/// this keeps the scheduler productive out of the box.
const DEFAULT_TICK_INTERVAL_MS: u64 = 50;

fn config_path_from_args() -> PathBuf {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return PathBuf::from(path);
            }
        } else if let Some(path) = arg.strip_prefix("--config=") {
            return PathBuf::from(path);
        }
    }
    vessel_net::config::default_config_path()
}

/// Registers every known tick kind with the core's default interval, then
/// applies any `[ticks]` overrides from configuration. Stands in for the
/// dynamically loaded game module the core omits (§6: discovery is out of
/// scope).
fn register_default_ticks(weaver: &Weaver, overrides: &vessel_net::config::TickOverrides) {
    for kind in TickKind::ALL {
        let interval_ms = overrides
            .0
            .get(kind.name())
            .copied()
            .unwrap_or(DEFAULT_TICK_INTERVAL_MS);
        weaver.register(kind, interval_ms, None, None, None);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    vessel_log::init();

    let config_path = config_path_from_args();
    let config = match vessel_net::config::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            error!(%err, path = %config_path.display(), "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let watcher = Watcher::new();
    let gatekeeper = Arc::new(GateKeeper::new(config.security.shared_secret.as_bytes()));
    let weaver = Weaver::new(Arc::clone(&watcher));
    register_default_ticks(&weaver, &config.tick_overrides);

    let sentinel = match Sentinel::bind(
        config.stream_addr(),
        config.datagram_addr(),
        Arc::clone(&watcher),
        Arc::clone(&gatekeeper),
        config.network.max_sessions,
    )
    .await
    {
        Ok(sentinel) => Arc::new(sentinel),
        Err(err) => {
            error!(%err, "failed to bind sentinel listeners");
            return ExitCode::FAILURE;
        }
    };

    let loom = Loom::new(Arc::clone(&weaver));

    let sentinel_component = LoopComponent::new("sentinel", {
        let sentinel = Arc::clone(&sentinel);
        move |shutdown| {
            let sentinel = Arc::clone(&sentinel);
            async move { sentinel.run(shutdown).await }
        }
    });

    let loom_component = LoopComponent::new("loom", {
        let loom = Arc::clone(&loom);
        move |shutdown| {
            let loom = Arc::clone(&loom);
            async move { loom.run(shutdown).await }
        }
    });

    let conductor = Conductor::new(vec![
        sentinel_component as Arc<dyn Component>,
        loom_component as Arc<dyn Component>,
    ]);

    info!("vessel starting");
    conductor.start().await;

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "failed to listen for ctrl-c, shutting down anyway");
    }

    info!("shutdown requested, stopping components");
    if !conductor.stop().await {
        error!("one or more components did not stop cleanly");
    }
    info!("vessel stopped");

    ExitCode::SUCCESS
}
