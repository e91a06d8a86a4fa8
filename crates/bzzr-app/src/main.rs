//! bzzr host binary.
//!
//! Loads `config.ron`, applies CLI overrides, connects to the event server
//! over framed TCP, and runs the fixed-rate owner-thread loop that drains the
//! host's action queue until Ctrl-C.
//!
//! Run with: `cargo run -p bzzr-app -- --server 127.0.0.1 --port 7777`

mod tick_loop;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bzzr_config::{CliArgs, Config};
use bzzr_host::BzzrHost;
use bzzr_net::{EventClient, EventClientConfig, FrameConfig};
use clap::Parser;
use tracing::{error, info, warn};

use crate::tick_loop::TickLoop;

/// How often `config.ron` is checked for edits.
const CONFIG_RELOAD_SECONDS: u64 = 5;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let (config_dir, log_dir) = match resolve_dirs(&args) {
        Ok(dirs) => dirs,
        Err(e) => {
            eprintln!("bzzr: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut on_disk = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("bzzr: {e}; falling back to defaults");
        Config::default()
    });
    let mut config = on_disk.clone();
    config.apply_cli_overrides(&args);

    bzzr_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));
    info!("bzzr host v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Server: {} | Tick rate: {} Hz",
        config.server_endpoint(),
        config.host.tick_rate_hz
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("bzzr-net")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start network runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let client = EventClient::new(client_config(&config), runtime.handle().clone());
    let host = BzzrHost::new(Arc::new(client));
    host.subscribe(|event| info!("{event}"));

    if config.host.auto_create_session {
        host.create_session();
    }

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, shutting down");
            }
            stop.store(true, Ordering::Relaxed);
        });
    }

    let mut tick_loop = TickLoop::new(config.host.tick_rate_hz);
    info!("Ticking every {:.1} ms", tick_loop.interval() * 1000.0);
    let ticks_per_second = u64::from(config.host.tick_rate_hz.max(1));
    let reload_every = CONFIG_RELOAD_SECONDS * ticks_per_second;
    let mut dump_every = u64::from(config.host.diagnostics_interval_seconds) * ticks_per_second;

    tick_loop.run_until(&stop, |tick| {
        host.tick();
        if tick > 0 && tick % reload_every == 0
            && let Some(fresh) = reload_config(&mut on_disk, &args, &config_dir)
        {
            dump_every = u64::from(fresh.host.diagnostics_interval_seconds) * ticks_per_second;
            if fresh.network != config.network || fresh.host.tick_rate_hz != config.host.tick_rate_hz {
                warn!("Network and tick rate changes apply after a restart");
            }
        }
        if dump_every > 0 && tick % dump_every == 0 {
            info!("Room state:\n{}", host.diagnostics());
        }
    });

    host.shutdown();
    info!(
        "Ran {} ticks over {} frames",
        tick_loop.tick_count(),
        tick_loop.frame_count()
    );
    drop(host);
    runtime.shutdown_timeout(Duration::from_secs(1));
    ExitCode::SUCCESS
}

/// Config and log directories: the `--config` override, or the platform defaults.
fn resolve_dirs(args: &CliArgs) -> Result<(PathBuf, PathBuf), bzzr_config::ConfigError> {
    match &args.config {
        Some(dir) => Ok((dir.clone(), dir.join("logs"))),
        None => Ok((Config::default_dir()?, Config::default_log_dir()?)),
    }
}

/// Re-read `config.ron`. On change, remembers the file contents in `on_disk`
/// and returns them with the CLI overrides applied again.
fn reload_config(on_disk: &mut Config, args: &CliArgs, config_dir: &Path) -> Option<Config> {
    match on_disk.reload(config_dir) {
        Ok(Some(fresh)) => {
            *on_disk = fresh.clone();
            let mut effective = fresh;
            effective.apply_cli_overrides(args);
            info!("Reloaded {}", config_dir.join("config.ron").display());
            Some(effective)
        }
        Ok(None) => None,
        Err(e) => {
            warn!("Keeping current config: {e}");
            None
        }
    }
}

fn client_config(config: &Config) -> EventClientConfig {
    let mut client = EventClientConfig::new(config.server_endpoint());
    client.frame = FrameConfig {
        max_payload_size: config.network.max_frame_bytes,
    };
    client.heartbeat_interval = Duration::from_millis(config.network.heartbeat_interval_ms);
    client.timeout = Duration::from_secs(u64::from(config.network.timeout_seconds));
    client.reconnect.max_attempts = config.network.reconnect_attempts;
    client
}
