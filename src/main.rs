mod config;
mod drivers;
mod managers;
mod normalize;
mod store;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use drivers::DriverRegistry;
use managers::dispatch::CancelSource;
use managers::run::{RunCoordinator, RunSettings};
use std::path::PathBuf;
use utils::RunLock;

#[derive(Parser)]
#[command(name = "netstash")]
#[command(about = "Versioned configuration backup for network devices", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/netstash/netstash.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one backup pass over the inventory (or a subset)
    Run {
        /// Back up only these device ids (repeatable)
        #[arg(short, long)]
        device: Vec<String>,

        /// Back up only devices in these groups (repeatable)
        #[arg(short, long)]
        group: Vec<String>,
    },

    /// List the device inventory
    List,

    /// Validate the configuration file
    Validate,

    /// Show recent snapshot commits, optionally for one device
    History {
        /// Device id to narrow the history to
        #[arg(short, long)]
        device: Option<String>,

        /// Number of commits to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { device, group } => run_backup(&cli.config, device, group).await,
        Commands::List => {
            managers::logging::init_console_logging();
            list_devices(&cli.config)
        }
        Commands::Validate => {
            managers::logging::init_console_logging();
            validate(&cli.config)
        }
        Commands::History { device, limit } => {
            managers::logging::init_console_logging();
            history(&cli.config, device.as_deref(), limit).await
        }
    }
}

async fn run_backup(config_path: &PathBuf, ids: Vec<String>, groups: Vec<String>) -> Result<()> {
    let config = config::load_config(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let logging_config = managers::logging::LoggingConfig::from_config(
        &config.global.log_directory,
        &config.global.log_level,
        config.global.log_max_files,
    );
    let _log_guard = managers::logging::init_logging(&logging_config)?;

    let devices = config::resolve_devices(&config)?;
    let selected = config::select_devices(&devices, &ids, &groups)?;
    if selected.is_empty() {
        println!("No devices match the given filter");
        return Ok(());
    }

    let credentials = config::resolve_all_credentials(&config)?;

    // One run at a time per backup directory
    let _lock = RunLock::acquire(&config.global.backup_dir)?;

    let coordinator = RunCoordinator::new(
        RunSettings::from_config(&config),
        selected,
        credentials,
        DriverRegistry::builtin(),
    );

    let cancel = CancelSource::new();
    let token = cancel.token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupt received, cancelling run...");
            cancel.cancel();
        }
    });

    let report = coordinator.run(token).await?;

    // The report lives outside the git tree so it never dirties a commit
    let report_path = managers::logging::expand_tilde(&config.global.log_directory)
        .join(format!("report-{}.json", report.run_id));
    if let Err(e) = std::fs::write(&report_path, serde_json::to_string_pretty(&report)?) {
        eprintln!("Warning: could not write {}: {}", report_path.display(), e);
    }

    println!("Run {}: {}", report.run_id, report.summary_line());
    for result in &report.results {
        match result.status {
            managers::report::BackupStatus::Success => {
                println!("  ✓ {} ({} attempt(s))", result.device_id, result.attempts)
            }
            managers::report::BackupStatus::Skipped => {
                println!("  - {} (skipped)", result.device_id)
            }
            managers::report::BackupStatus::Failed => println!(
                "  ✗ {}: {}",
                result.device_id,
                result.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    // Exit status reflects the aggregate outcome only; detail is in the report
    if !report.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn list_devices(config_path: &PathBuf) -> Result<()> {
    let config = config::load_config(config_path)?;
    let devices = config::resolve_devices(&config)?;

    println!("Configured devices:");
    for device in &devices {
        let state = if device.enabled { "" } else { " (disabled)" };
        println!(
            "  {} - {}:{} [{}] groups: {}{}",
            device.id,
            device.address,
            device.port,
            device.platform,
            if device.groups.is_empty() {
                "-".to_string()
            } else {
                device.groups.join(", ")
            },
            state
        );
    }
    Ok(())
}

fn validate(config_path: &PathBuf) -> Result<()> {
    let config = config::load_config(config_path)?;
    let devices = config::resolve_devices(&config)?;
    println!("Configuration is valid!");
    println!("Devices: {}", devices.len());
    println!("Credentials: {}", config.credentials.len());
    Ok(())
}

async fn history(config_path: &PathBuf, device: Option<&str>, limit: usize) -> Result<()> {
    let config = config::load_config(config_path)?;
    let store = store::GitStore::open_or_init(&config.global.backup_dir).await?;

    let narrowed = match device {
        Some(id) => {
            let devices = config::resolve_devices(&config)?;
            let descriptor = devices
                .iter()
                .find(|d| d.id == id)
                .with_context(|| format!("Device '{}' not found in inventory", id))?;
            Some((descriptor.platform.as_str(), id))
        }
        None => None,
    };

    let log = store.history(narrowed, limit).await?;
    if log.trim().is_empty() {
        println!("No snapshot history yet");
    } else {
        print!("{}", log);
    }
    Ok(())
}
