use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use foreman_lite::config::{DispatchConfig, RetryPolicy, ViewConfig};
use foreman_lite::dashboard::{run_dashboard, DashboardState};
use foreman_lite::dispatch::{JobDispatcher, WorkerRegistry};
use foreman_lite::grpc::DispatchGrpcServer;
use foreman_lite::proto::view_service_client::ViewServiceClient;
use foreman_lite::proto::QueryRequest;
use foreman_lite::shutdown::install_shutdown_handler;
use foreman_lite::view::ViewServer;

#[derive(Parser, Debug)]
#[command(name = "foreman-lite")]
#[command(version)]
#[command(about = "Fault-tolerant job dispatcher and primary/backup view service")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// View service commands
    View {
        #[command(subcommand)]
        command: ViewCommands,
    },

    /// Job dispatch commands
    Dispatch {
        #[command(subcommand)]
        command: DispatchCommands,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ViewCommands {
    /// Start the view service
    Serve {
        /// Port to listen on for gRPC
        #[arg(long, default_value = "50070")]
        port: u16,

        /// Heartbeat interval in milliseconds (also the tick period)
        #[arg(long, default_value = "100")]
        ping_interval_ms: u64,

        /// Missed intervals before a server is considered dead
        #[arg(long, default_value = "5")]
        dead_pings: u32,

        /// Port for the JSON status dashboard (optional)
        #[arg(long)]
        dashboard_port: Option<u16>,
    },

    /// Query the current view
    Query {
        /// View service address
        #[arg(long, short = 'a', default_value = "http://127.0.0.1:50070")]
        addr: String,

        /// Output format
        #[arg(long, short = 'o', default_value = "table")]
        output: OutputFormat,
    },
}

#[derive(clap::Subcommand, Debug)]
enum DispatchCommands {
    /// Start the coordinator and run a map/reduce batch to completion
    Run {
        /// Port to listen on for worker registrations
        #[arg(long, default_value = "50080")]
        port: u16,

        /// Input reference handed to every worker
        #[arg(long)]
        input: String,

        /// Number of map jobs
        #[arg(long)]
        maps: u32,

        /// Number of reduce jobs
        #[arg(long)]
        reduces: u32,

        /// Give up on a job after this many attempts (default: retry forever)
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Output format for the final summary
        #[arg(long, short = 'o', default_value = "table")]
        output: OutputFormat,
    },
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct ViewOutput {
    viewnum: u64,
    primary: String,
    backup: String,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

async fn run_view_server(
    port: u16,
    ping_interval_ms: u64,
    dead_pings: u32,
    dashboard_port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let listen_addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    let mut config = ViewConfig::new(listen_addr)
        .with_ping_interval(Duration::from_millis(ping_interval_ms))
        .with_dead_pings(dead_pings);
    if let Some(p) = dashboard_port {
        config = config.with_dashboard_addr(format!("0.0.0.0:{}", p).parse()?);
    }

    tracing::info!(
        listen_addr = %config.listen_addr,
        ping_interval_ms,
        dead_pings,
        dashboard_addr = ?config.dashboard_addr,
        "Starting view service"
    );

    let server = Arc::new(ViewServer::new(config.clone()));

    // A SIGTERM/SIGINT is just another caller of the idempotent kill.
    let signals = install_shutdown_handler();
    {
        let server = server.clone();
        tokio::spawn(async move {
            signals.cancelled().await;
            server.kill();
        });
    }

    if let Some(dashboard_addr) = config.dashboard_addr {
        let state = DashboardState {
            view_server: server.clone(),
        };
        tokio::spawn(async move {
            run_dashboard(dashboard_addr, state).await;
        });
    }

    server.run().await?;
    Ok(())
}

async fn run_dispatch(
    port: u16,
    input: String,
    maps: u32,
    reduces: u32,
    max_attempts: Option<u32>,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let listen_addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
    let retry = match max_attempts {
        Some(max_attempts) => RetryPolicy::Capped { max_attempts },
        None => RetryPolicy::Unlimited,
    };
    let config = DispatchConfig::new(listen_addr).with_retry(retry);

    let registry = Arc::new(WorkerRegistry::new());
    let shutdown = install_shutdown_handler();

    // Registration keeps running in the background for the whole batch;
    // workers may join at any time.
    let registration = DispatchGrpcServer::new(config.listen_addr, registry.clone());
    let registration_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = registration.run(registration_shutdown).await {
            tracing::error!(error = %e, "Registration server failed");
        }
    });

    tracing::info!(listen_addr = %config.listen_addr, maps, reduces, "Starting dispatch");
    let dispatcher = JobDispatcher::new(registry, input, config);
    let summary = dispatcher.run_all(maps, reduces).await;
    shutdown.cancel();

    match output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Table => {
            println!("{:<25} JOBS", "WORKER");
            println!("{}", "-".repeat(35));
            for report in &summary.reports {
                println!("{:<25} {}", report.address, report.jobs_completed);
            }
            println!();
            println!(
                "Completed {} jobs across {} workers",
                summary.total_jobs(),
                summary.reports.len()
            );
        }
    }
    Ok(())
}

async fn handle_view_query(
    addr: String,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = ViewServiceClient::connect(addr).await?;
    let reply = client.query(QueryRequest {}).await?.into_inner();
    let view = reply.view.unwrap_or_default();

    match output {
        OutputFormat::Json => {
            let out = ViewOutput {
                viewnum: view.viewnum,
                primary: view.primary,
                backup: view.backup,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => {
            println!("View:    {}", view.viewnum);
            println!(
                "Primary: {}",
                if view.primary.is_empty() {
                    "-"
                } else {
                    view.primary.as_str()
                }
            );
            println!(
                "Backup:  {}",
                if view.backup.is_empty() {
                    "-"
                } else {
                    view.backup.as_str()
                }
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::View { command } => match command {
            ViewCommands::Serve {
                port,
                ping_interval_ms,
                dead_pings,
                dashboard_port,
            } => {
                run_view_server(port, ping_interval_ms, dead_pings, dashboard_port).await?;
            }
            ViewCommands::Query { addr, output } => {
                handle_view_query(addr, output).await?;
            }
        },
        Commands::Dispatch { command } => match command {
            DispatchCommands::Run {
                port,
                input,
                maps,
                reduces,
                max_attempts,
                output,
            } => {
                run_dispatch(port, input, maps, reduces, max_attempts, output).await?;
            }
        },
    }

    Ok(())
}
