//! trace-bridge
//!
//! One binary, two roles:
//!
//! ```text
//!                 ┌──────────────────────────── gateway ───────────────────────────┐
//!  HTTP client ──▶│ ingress :3000 ──▶ downstream client (HTTP or CoAP) ────────────┼──▶ terminal
//!                 │                                                                │   :5683
//!                 │ span relay :3002 (HTTP)  ◀──────────────────────────────────────┼─── terminal spans
//!                 │ span relay :3002 (CoAP)  ◀──────────────────────────────────────┼───  (report_to = gateway)
//!                 └──────────────┬─────────────────────────────────────────────────┘
//!                                ▼
//!                        collector POST /span
//! ```
//!
//! Each hop keeps the inbound trace-id, opens a span with a fresh span-id and
//! reports it when the hop is done, if the trace is sampled.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use trace_bridge::config::{load_config, BridgeConfig};
use trace_bridge::lifecycle::{signals, Shutdown};
use trace_bridge::observability::{cpu::CpuMonitor, logging, metrics};
use trace_bridge::{Gateway, Terminal};

#[derive(Parser)]
#[command(name = "trace-bridge")]
#[command(about = "W3C trace-context propagating HTTP to CoAP/HTTP gateway", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults and environment apply without one.
    #[arg(short, long, global = true, env = "TRACE_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Clone, Copy)]
enum Role {
    /// HTTP ingress, downstream client and span relays
    Gateway,
    /// End-of-chain HTTP or CoAP server
    Terminal,
}

impl Role {
    fn service(self) -> &'static str {
        match self {
            Role::Gateway => "Gateway",
            Role::Terminal => "IoT-Server",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("trace-bridge: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.observability);
    tracing::info!(role = cli.role.service(), "trace-bridge v{} starting", env!("CARGO_PKG_VERSION"));
    log_config(&config);

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        signal_shutdown.trigger();
    });

    let monitor = config.cpu_monitor.enabled.then(|| {
        let monitor = CpuMonitor::new(
            cli.role.service(),
            Duration::from_millis(config.cpu_monitor.interval_ms),
        );
        tokio::spawn(monitor.run(shutdown.subscribe()))
    });

    let outcome = match cli.role {
        Role::Gateway => Gateway::new(&config)?.run(shutdown.clone()).await,
        Role::Terminal => Terminal::new(&config)?.run(shutdown.clone()).await,
    };

    // Listeners may have failed on their own; stop the monitor either way.
    shutdown.trigger();
    if let Some(monitor) = monitor {
        let _ = monitor.await;
    }

    outcome?;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn log_config(config: &BridgeConfig) {
    tracing::info!(
        downstream = %config.downstream.authority(),
        downstream_protocol = %config.gateway.downstream_protocol,
        collector = %config.collector.authority(),
        terminal_protocol = %config.terminal.protocol,
        request_timeout_secs = config.timeouts.request_secs,
        downstream_timeout_secs = config.timeouts.downstream_secs,
        "Configuration loaded"
    );
}
