// SPDX-License-Identifier: MIT

//! Centralized configuration resolution for the daemon binary: env vars
//! first (`OUTPOST_*`), CLI flags (`clap`) override them. Grounded on the
//! teacher's `daemon/src/env.rs` pattern of one function per setting.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_LISTEN_ADDR: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 7117);

use clap::Parser;
use outpost_engine::backoff::BackoffConfig;
use outpost_engine::SupervisorConfig;

fn env_duration_ms(key: &str) -> Option<Duration> {
    std::env::var(key).ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_millis)
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|s| s.parse::<usize>().ok())
}

/// `OUTPOST_LISTEN_ADDR`, default `127.0.0.1:7117`.
fn listen_addr_from_env() -> Option<SocketAddr> {
    std::env::var("OUTPOST_LISTEN_ADDR").ok().and_then(|s| s.parse().ok())
}

/// `OUTPOST_SCRATCH_DIR`, default a fresh `outpost` dir under the system
/// temp directory.
fn scratch_dir_from_env() -> Option<PathBuf> {
    std::env::var("OUTPOST_SCRATCH_DIR").ok().map(PathBuf::from)
}

#[derive(Debug, Parser)]
#[command(name = "outpostd", about = "Remote process-runner agent")]
struct Cli {
    /// Address to listen on. Overrides OUTPOST_LISTEN_ADDR.
    #[arg(long)]
    listen_addr: Option<SocketAddr>,

    /// Root directory for per-process scratch trees. Overrides OUTPOST_SCRATCH_DIR.
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// Tail buffer length per log hub. Overrides OUTPOST_LOG_TAIL.
    #[arg(long)]
    log_tail: Option<usize>,

    /// Per-subscriber outbound queue capacity. Overrides OUTPOST_LOG_QUEUE.
    #[arg(long)]
    log_queue: Option<usize>,
}

/// Fully resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub supervisor: SupervisorConfig,
    pub log_tail_capacity: usize,
    pub log_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR,
            supervisor: SupervisorConfig::default(),
            log_tail_capacity: 256,
            log_queue_capacity: 1024,
        }
    }
}

impl Config {
    /// Resolve from environment, then let CLI flags (if any were passed)
    /// override. CLI flags win; env wins over built-in defaults.
    pub fn resolve() -> Self {
        let cli = Cli::parse();
        let defaults = Config::default();

        let backoff = BackoffConfig {
            base: env_duration_ms("OUTPOST_BACKOFF_BASE_MS").unwrap_or(defaults.supervisor.backoff.base),
            cap: env_duration_ms("OUTPOST_BACKOFF_CAP_MS").unwrap_or(defaults.supervisor.backoff.cap),
            reset_window: env_duration_ms("OUTPOST_BACKOFF_RESET_MS")
                .unwrap_or(defaults.supervisor.backoff.reset_window),
        };

        let termination_grace = env_duration_ms("OUTPOST_TERMINATION_GRACE_MS")
            .unwrap_or(defaults.supervisor.termination_grace);

        let scratch_root = cli
            .scratch_dir
            .or_else(scratch_dir_from_env)
            .unwrap_or(defaults.supervisor.scratch_root);

        Config {
            listen_addr: cli.listen_addr.or_else(listen_addr_from_env).unwrap_or(defaults.listen_addr),
            supervisor: SupervisorConfig { backoff, termination_grace, scratch_root },
            log_tail_capacity: cli
                .log_tail
                .or_else(|| env_usize("OUTPOST_LOG_TAIL"))
                .unwrap_or(defaults.log_tail_capacity),
            log_queue_capacity: cli
                .log_queue
                .or_else(|| env_usize("OUTPOST_LOG_QUEUE"))
                .unwrap_or(defaults.log_queue_capacity),
        }
    }
}
