//! Guest Dashboard Guard - Entry Point
//!
//! Runs the audit engine against a JSON host state file until Ctrl-C.

use anyhow::Context;
use guest_dashboard_guard::{AuditEngine, FileHost, GuardConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");
    let json_logs = args.iter().any(|a| a == "--json");
    let once = args.iter().any(|a| a == "--once");
    let config_path = flag_value(&args, "--config");
    let state_path = flag_value(&args, "--state")
        .or_else(|| std::env::var("GUARD_STATE_FILE").ok())
        .unwrap_or_else(|| "host.json".to_string());

    if help_mode {
        println!("Guest Dashboard Guard v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: guest-dashboard-guard [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --state <FILE>     Host state file (default: host.json)");
        println!("  --config <FILE>    TOML configuration file");
        println!("  --once             Run a single audit cycle and exit");
        println!("  --json             Log as JSON");
        println!("  --help, -h         Show this help");
        println!();
        println!("Environment variables:");
        println!("  GUARD_ACTION_MODE            notify_only | auto_revoke");
        println!("  GUARD_GUEST_DETECTION        non_admin | explicit");
        println!("  GUARD_GUEST_USERS            Comma-separated guest user ids");
        println!("  GUARD_INTERVAL_SECS          Audit interval, 10-3600 (default: 60)");
        println!("  GUARD_IGNORED_DASHBOARDS     Comma-separated dashboard ids");
        println!("  GUARD_SHUTDOWN_TIMEOUT_SECS  Teardown wait (default: 10)");
        println!("  GUARD_STATE_FILE             Host state file");
        println!("  GUARD_NOTIFICATION_LOG       Append notifications as JSON lines");
        println!("  GUARD_SENSOR_FILE            Mirror sensor states to this file");
        return Ok(());
    }

    // Setup logging
    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    if json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("Guest Dashboard Guard v{}", env!("CARGO_PKG_VERSION"));

    let config = match config_path {
        Some(path) => GuardConfig::from_file(&PathBuf::from(&path))
            .with_context(|| format!("loading {}", path))?,
        None => GuardConfig::from_env()?,
    };

    let mut host = FileHost::new(&state_path);
    if let Ok(path) = std::env::var("GUARD_NOTIFICATION_LOG") {
        host = host.with_notification_log(path);
    }
    if let Ok(path) = std::env::var("GUARD_SENSOR_FILE") {
        host = host.with_sensor_output(path);
    }
    let host = Arc::new(host);

    if once {
        config.validate()?;
        let scheduler = guest_dashboard_guard::AuditScheduler::new(host.handles(), config);
        let report = scheduler.run_cycle().await;
        if let guest_dashboard_guard::CycleOutcome::Skipped(e) = report.outcome {
            return Err(e).context("audit cycle skipped");
        }
        return Ok(());
    }

    let engine = AuditEngine::start(host.handles(), config)?;
    info!("Watching {}", state_path);

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    engine.shutdown().await;

    Ok(())
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
