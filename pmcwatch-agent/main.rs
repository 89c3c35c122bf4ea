use std::sync::Arc;
use std::time::Duration;

use axum::{response::IntoResponse, routing::get, Router};
use clap::Parser;
use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use pmcwatch::common::topology::{Topology, CPU_ARCH};
use pmcwatch::engine::MsrRegisterAccess;
use pmcwatch::prom::OverallMetricsExporter;
use pmcwatch::{configs, table, CpuSelection, MonitoringConfig, MonitoringSession};

#[derive(Parser, Debug)]
#[command(name = "pmcwatch")]
#[command(about = "Hardware performance-counter monitoring for x86 CPUs")]
struct Args {
    #[arg(long, help = "List the monitoring configurations for this CPU and exit")]
    list: bool,

    #[arg(
        long,
        help = "Monitoring configuration to run (default: the first one for this CPU)"
    )]
    config: Option<String>,

    #[arg(long, default_value_t = 1.0, help = "Polling interval in seconds")]
    interval: f64,

    #[arg(
        long = "core",
        help = "CPUs to monitor (supports ranges and comma-separated lists: --core 0-3,5 or --core 0-3 --core 5)",
        action = clap::ArgAction::Append
    )]
    cores: Vec<String>,

    #[arg(long, help = "Serve Prometheus gauges of the overall values on this port")]
    metrics_port: Option<u16>,

    #[arg(long, help = "Print update results as JSON lines instead of tables")]
    json: bool,

    #[arg(long, help = "Exit after this many polling ticks")]
    ticks: Option<u64>,

    #[arg(short, long, help = "Enable verbose logging (shows register traffic)")]
    verbose: bool,
}

fn check_permissions() {
    let msr_path = "/dev/cpu/0/msr";
    if std::fs::metadata(msr_path).is_err() {
        eprintln!(
            "\nERROR: Cannot access {msr_path}\n\nThe MSR kernel module may not be loaded.\nRun: sudo modprobe msr\n"
        );
        std::process::exit(1);
    }

    if let Err(e) = pmcwatch_raw::msr::probe(0) {
        eprintln!("\nERROR: MSR access probe failed: {e}\n\nRun as root or grant CAP_SYS_RAWIO.\n");
        std::process::exit(1);
    }
}

async fn metrics_handler(
    axum::extract::State(registry): axum::extract::State<Registry>,
) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }

    let content_type = encoder.format_type().to_string();
    (
        [("Content-Type", content_type)],
        String::from_utf8(buffer).unwrap_or_default(),
    )
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Shutdown triggered by Ctrl+C");
        },
        _ = terminate => {
            tracing::info!("Shutdown triggered by SIGTERM");
        },
    }

    cancel_token.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let arch = *CPU_ARCH;
    tracing::info!("Detected CPU architecture: {}", arch.name());

    let catalog = configs::catalog(arch);
    if catalog.is_empty() {
        anyhow::bail!(
            "No monitoring configurations for this CPU ({})",
            arch.name()
        );
    }

    if args.list {
        println!("Monitoring configurations for {}:", arch.name());
        for config in &catalog {
            println!("  {:24} {}", config.name(), config.help_text());
        }
        return Ok(());
    }

    check_permissions();

    let selection = CpuSelection::from_ranges(&args.cores);

    tracing::info!(
        "Monitoring {} sockets, {} CPUs",
        selection.sockets.len(),
        selection.cpus.len()
    );

    let topology = Topology::probe(arch, &selection.cpus)?;

    let config: &dyn MonitoringConfig = match &args.config {
        None => catalog[0].as_ref(),
        Some(name) => catalog
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
            .map(|c| c.as_ref())
            .ok_or_else(|| {
                let names: Vec<&str> = catalog.iter().map(|c| c.name()).collect();
                anyhow::anyhow!(
                    "Unknown configuration {name:?}; available: {}",
                    names.join(", ")
                )
            })?,
    };

    let mut session = MonitoringSession::new(MsrRegisterAccess::shared(), topology);
    session.activate(config)?;

    let exporter = Arc::new(OverallMetricsExporter::new());

    if let Some(port) = args.metrics_port {
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(exporter.registry());
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        tracing::info!("Serving Prometheus metrics on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Metrics server failed: {}", e);
            }
        });
    }

    let cancel_token = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel_token.clone()));

    let mut interval = tokio::time::interval(Duration::from_secs_f64(args.interval.max(0.05)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so the first sample covers
    // a full interval
    interval.tick().await;

    let mut ticks_done = 0u64;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let results = session.update(config)?;
                exporter.publish(&results.overall_raw_values);

                if args.json {
                    println!("{}", serde_json::to_string(&results)?);
                } else {
                    println!("\n{} on {}", config.name(), arch.name());
                    print!("{}", table::render(config.column_headers(), &results));
                }

                ticks_done += 1;
                if args.ticks.is_some_and(|limit| ticks_done >= limit) {
                    break;
                }
            }
            _ = cancel_token.cancelled() => {
                break;
            }
        }
    }

    tracing::info!("Stopping counters");
    session.shutdown()?;

    Ok(())
}
