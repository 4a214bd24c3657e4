use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use droidpool::allocation::AllocationScheduler;
use droidpool::config::AppConfig;
use droidpool::health::{HealthMonitor, SimulatedHealthProbe};
use droidpool::registry::{DeviceRegistry, Platform};
use droidpool::server::{ClientConfig, PoolClient, PoolServer};
use droidpool::services::Collaborators;
use droidpool::session::SessionManager;
use droidpool::utils::VirtualClock;
use droidpool::workflow::{
    PhaseKind, ScheduleWindow, StrategyRegistry, WorkflowConfig, WorkflowOrchestrator,
    WorkflowPhase,
};

#[derive(Parser)]
#[command(
    name = "droidpool",
    version,
    about = "Device pool scheduler and multi-device workflow orchestrator",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pool server
    Serve {
        /// Config file path (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the bind address
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Show pool statistics from a running server
    Status {
        /// Pool server URL
        #[arg(short, long, default_value = "http://localhost:8080")]
        server: String,
    },

    /// List the device inventory of a running server
    Devices {
        /// Pool server URL
        #[arg(short, long, default_value = "http://localhost:8080")]
        server: String,
    },

    /// Run an end-to-end simulated workflow locally and print the results
    Demo {
        /// Number of simulated devices
        #[arg(short, long, default_value = "4")]
        devices: usize,

        /// Simulation seed
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Watch phase duration in minutes (virtual time)
        #[arg(short, long, default_value = "10")]
        watch_mins: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    match cli.command {
        Commands::Serve { config, bind } => {
            serve(config, bind).await?;
        }

        Commands::Status { server } => {
            status(server).await?;
        }

        Commands::Devices { server } => {
            devices(server).await?;
        }

        Commands::Demo {
            devices,
            seed,
            watch_mins,
        } => {
            demo(devices, seed, watch_mins).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("droidpool=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("droidpool=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

async fn serve(config_path: Option<PathBuf>, bind: Option<String>) -> Result<()> {
    let mut config = match config_path {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::from_env()?,
    };
    if let Some(bind) = bind {
        config.server.bind_address = bind.parse()?;
    }

    tracing::info!(bind = %config.server.bind_address, "Starting droidpool server");

    let server = PoolServer::new(config)?;
    println!("{}", server.info().display());

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received");
    };
    server.start_with_shutdown(shutdown).await?;
    Ok(())
}

async fn status(server_url: String) -> Result<()> {
    let client = PoolClient::new(ClientConfig::new(server_url))?;
    let stats = client.pool_stats().await?;

    println!("{}", stats.pool.display());
    println!("Active Sessions: {}", stats.active_sessions);
    println!("Queued Requests: {}", stats.queued_requests);
    println!("Server Uptime: {}s", stats.uptime_secs);
    Ok(())
}

async fn devices(server_url: String) -> Result<()> {
    let client = PoolClient::new(ClientConfig::new(server_url))?;
    let response = client.devices().await?;

    println!(
        "{:<12} {:>10} {:>8} {:>7} {:>9} {:>8}",
        "Device", "Status", "Battery", "Temp", "Success", "Posts"
    );
    println!("{:-<60}", "");
    for device in &response.devices {
        println!(
            "{:<12} {:>10} {:>7.0}% {:>6.1}C {:>8.1}% {:>8}",
            device.id,
            device.status.to_string(),
            device.health.battery_level,
            device.health.temperature_c,
            device.stats.success_rate,
            device.stats.total_posts
        );
    }
    Ok(())
}

async fn demo(device_count: usize, seed: u64, watch_mins: u64) -> Result<()> {
    tracing::info!(devices = device_count, seed, "Running simulated demo");

    // Assemble a pool by hand on a virtual clock so multi-minute phases
    // finish immediately
    let registry = Arc::new(DeviceRegistry::new(device_count.max(1)));
    for config in droidpool::config::simulated_fleet(device_count) {
        registry.add(config).await?;
    }

    let sessions = Arc::new(SessionManager::new(registry.clone()));
    let scheduler = Arc::new(AllocationScheduler::with_defaults(
        registry.clone(),
        sessions.clone(),
    ));
    let monitor = HealthMonitor::with_defaults(
        registry.clone(),
        Arc::new(SimulatedHealthProbe::new(seed)),
    );
    let orchestrator = Arc::new(WorkflowOrchestrator::new(
        registry.clone(),
        scheduler.clone(),
        sessions.clone(),
        Collaborators::simulated(seed),
        StrategyRegistry::with_builtins(),
        Arc::new(VirtualClock::new()),
        droidpool::workflow::OrchestratorConfig {
            inter_phase_pause_secs: 30,
            seed,
        },
    ));

    let scheduler_loop = scheduler.clone();
    tokio::spawn(async move { scheduler_loop.start().await });
    monitor.run_sweep().await;

    let device_ids = registry.list(None).await.into_iter().map(|d| d.id).collect();
    let workflow_id = orchestrator
        .create_workflow(WorkflowConfig {
            name: "demo run".to_string(),
            device_ids,
            platforms: vec![Platform::Tiktok, Platform::Youtube],
            schedule: ScheduleWindow::immediate(),
            phases: vec![
                WorkflowPhase::new(PhaseKind::Watch, watch_mins * 60),
                WorkflowPhase::new(PhaseKind::Post, 60)
                    .with_param("caption", "fresh from the pool")
                    .with_param("tags", "fyp,automation"),
                WorkflowPhase::new(PhaseKind::Analyze, 0),
            ],
            strategy: "balanced".to_string(),
        })
        .await?;
    orchestrator.start_workflow(workflow_id).await?;

    // Poll until the workflow reaches a terminal state
    let workflow = loop {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let workflow = orchestrator
            .get_workflow(workflow_id)
            .await
            .ok_or_else(|| anyhow::anyhow!("demo workflow vanished"))?;
        if workflow.status.is_terminal() {
            break workflow;
        }
    };
    scheduler.stop().await;

    println!("Workflow '{}' finished: {}", workflow.name, workflow.status);
    if let Some(error) = &workflow.error {
        println!("  Error: {error}");
    }
    println!("  Watch time: {}s", workflow.stats.total_watch_secs);
    println!("  Posts: {}", workflow.stats.total_posts);
    println!("  Engagements: {}", workflow.stats.total_engagements);
    println!();
    println!("{}", registry.pool_statistics().await.display());
    Ok(())
}
