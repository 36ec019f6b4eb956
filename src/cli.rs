// Doorcam Sync CLI binary

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

use doorcam_sync_lib::config::{self, Settings};
use doorcam_sync_lib::constants::{
    DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_LISTEN_ADDR, DEFAULT_RETENTION_MARGIN_MINUTES,
    DEFAULT_RETENTION_MINUTES, DEFAULT_STORAGE_PATH, DEFAULT_SYNC_INTERVAL_SECS, DEFAULT_TIMEZONE,
    DEFAULT_WEBHOOK_WORKERS,
};
use doorcam_sync_lib::device::{is_safe_component, Device, DeviceGateway, HttpGateway};
use doorcam_sync_lib::ingest::SyncCycleResult;
use doorcam_sync_lib::jobs;
use doorcam_sync_lib::library::{gate, paths, reconcile};
use doorcam_sync_lib::webhook::{self, HttpClipSource, WebhookReceiver};

#[derive(Parser)]
#[command(name = "doorcam")]
#[command(about = "Doorcam Sync - archives doorbell camera clips into a dated library", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    storage: StorageArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StorageArgs {
    /// Library root
    #[arg(long, env = "STORAGE_PATH", default_value = DEFAULT_STORAGE_PATH, global = true)]
    storage_path: PathBuf,
    /// IANA timezone used for folder dates and file names
    #[arg(long, env = "TIMEZONE", default_value = DEFAULT_TIMEZONE, global = true)]
    timezone: String,
    /// Owner uid applied to written clips (needs --pgid too)
    #[arg(long, env = "PUID", global = true)]
    puid: Option<u32>,
    /// Owner gid applied to written clips (needs --puid too)
    #[arg(long, env = "PGID", global = true)]
    pgid: Option<u32>,
}

#[derive(Args)]
struct GatewayArgs {
    /// Base URL of the device gateway
    #[arg(long, env = "GATEWAY_URL")]
    gateway_url: Option<String>,
    /// Bearer token for the device gateway
    #[arg(long, env = "GATEWAY_TOKEN", hide_env_values = true)]
    gateway_token: Option<String>,
    /// JSON device registry
    #[arg(long, env = "DEVICES_FILE")]
    devices_file: Option<PathBuf>,
    /// Provider retention window in minutes
    #[arg(long, env = "RETENTION_MINUTES", default_value_t = DEFAULT_RETENTION_MINUTES)]
    retention_minutes: u32,
    /// Extra minutes added to the listing window
    #[arg(long, env = "RETENTION_MARGIN_MINUTES", default_value_t = DEFAULT_RETENTION_MARGIN_MINUTES)]
    retention_margin_minutes: u32,
    /// Connect/read timeout for gateway and clip requests
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = DEFAULT_HTTP_TIMEOUT_SECS)]
    http_timeout_secs: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook receiver and, with a gateway configured, the periodic sync workers
    Serve {
        /// Address the webhook server binds
        #[arg(long, env = "LISTEN_ADDR", default_value = DEFAULT_LISTEN_ADDR)]
        listen: String,
        /// Webhook worker threads
        #[arg(long, env = "WEBHOOK_WORKERS", default_value_t = DEFAULT_WEBHOOK_WORKERS)]
        workers: usize,
        /// Seconds between sync cycles per device
        #[arg(long, env = "SYNC_INTERVAL_SECS", default_value_t = DEFAULT_SYNC_INTERVAL_SECS)]
        interval_secs: u64,
        /// Only accept pushes; do not poll the gateway
        #[arg(long)]
        no_sync: bool,
        #[command(flatten)]
        gateway: GatewayArgs,
    },

    /// Run one sync cycle for every registered device
    Sync {
        /// Print per-device results as JSON
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        gateway: GatewayArgs,
    },

    /// Remove empty folders and stale partial downloads under one device's tree
    Sweep {
        /// Device folder name
        device_name: String,
    },

    /// Print the library path an event would be stored at
    Resolve {
        /// Device folder name
        device_name: String,
        /// Event start time (RFC 3339)
        start_time: String,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { listen, workers, interval_secs, no_sync, gateway } => {
            cmd_serve(&cli.storage, &listen, workers, interval_secs, no_sync, &gateway)
        }
        Commands::Sync { json, gateway } => cmd_sync(&cli.storage, &gateway, json),
        Commands::Sweep { device_name } => cmd_sweep(&cli.storage, &device_name),
        Commands::Resolve { device_name, start_time } => cmd_resolve(&cli.storage, &device_name, &start_time),
    }
}

fn load_settings(storage: &StorageArgs) -> Result<Settings> {
    let settings = Settings::new(&storage.storage_path, &storage.timezone)?.with_owner(storage.puid, storage.pgid);
    if storage.puid.is_some() != storage.pgid.is_some() {
        log::warn!("PUID and PGID must both be set to change clip ownership; ignoring");
    }
    Ok(settings)
}

impl GatewayArgs {
    fn is_configured(&self) -> bool {
        self.gateway_url.is_some() || self.devices_file.is_some()
    }
}

fn load_gateway(settings: Settings, gateway: &GatewayArgs) -> Result<(Settings, HttpGateway, Vec<Device>)> {
    let (Some(url), Some(devices_file)) = (&gateway.gateway_url, &gateway.devices_file) else {
        anyhow::bail!("GATEWAY_URL and DEVICES_FILE are both required to sync");
    };
    let settings = settings.with_window(gateway.retention_minutes, gateway.retention_margin_minutes)?;
    let devices = config::load_devices(devices_file)
        .with_context(|| format!("Failed to load devices from {}", devices_file.display()))?;
    let client = HttpGateway::new(
        url.clone(),
        gateway.gateway_token.clone(),
        Duration::from_secs(gateway.http_timeout_secs),
    );
    Ok((settings, client, devices))
}

fn cmd_serve(
    storage: &StorageArgs,
    listen: &str,
    workers: usize,
    interval_secs: u64,
    no_sync: bool,
    gateway: &GatewayArgs,
) -> Result<()> {
    let settings = load_settings(storage)?;
    std::fs::create_dir_all(&settings.storage_root)
        .with_context(|| format!("Failed to create {}", settings.storage_root.display()))?;

    let timeout = Duration::from_secs(gateway.http_timeout_secs);
    let receiver = Arc::new(WebhookReceiver::new(
        settings.storage_root.clone(),
        settings.timezone,
        settings.commit_options(),
        Arc::new(HttpClipSource::new(timeout)),
    ));

    let sync_workers = if no_sync || !gateway.is_configured() {
        log::info!("Gateway sync disabled; accepting pushed clips only");
        None
    } else {
        let (settings, client, devices) = load_gateway(settings, gateway)?;
        log::info!(
            "Syncing {} device(s) every {}s over a {}-minute window",
            devices.len(),
            interval_secs,
            settings.window_minutes()
        );
        let client: Arc<dyn DeviceGateway> = Arc::new(client);
        Some(jobs::spawn_workers(client, devices, Arc::new(settings), Duration::from_secs(interval_secs))?)
    };

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        log::info!("Shutdown requested, finishing in-flight work...");
        stop_handler.store(true, Ordering::Relaxed);
    })
    .context("Failed to install signal handler")?;

    let server = webhook::start_server(listen, receiver, workers)?;
    jobs::wait_for_shutdown(&stop);

    server.shutdown();
    if let Some(sync_workers) = sync_workers {
        sync_workers.shutdown();
    }
    log::info!("Stopped");
    Ok(())
}

fn cmd_sync(storage: &StorageArgs, gateway: &GatewayArgs, json: bool) -> Result<()> {
    let (settings, client, devices) = load_gateway(load_settings(storage)?, gateway)?;

    let results = jobs::sync_all(&client, &devices, &settings);
    let failures = results.iter().filter(|(_, outcome)| outcome.is_err()).count();

    if json {
        println!("{}", serde_json::to_string_pretty(&jobs::summarize(&results))?);
    } else {
        print_sync_summary(&results);
    }

    if failures > 0 {
        anyhow::bail!("{} of {} device(s) failed to sync", failures, results.len());
    }
    Ok(())
}

fn print_sync_summary(results: &[(Device, doorcam_sync_lib::Result<SyncCycleResult>)]) {
    println!();
    println!("Sync complete:");
    for (device, outcome) in results {
        match outcome {
            Ok(r) if r.unsupported => {
                println!("  {:<20} unsupported device family", device.device_name);
            }
            Ok(r) => {
                println!(
                    "  {:<20} seen {:>3}  downloaded {:>3}  skipped {:>3}  failed {:>3}",
                    device.device_name, r.seen, r.downloaded, r.skipped, r.failed
                );
                if r.collisions > 0 {
                    println!("  {:<20} {} event(s) not saved: file name already taken", "", r.collisions);
                }
            }
            Err(e) => {
                println!("  {:<20} error: {}", device.device_name, e);
            }
        }
    }
}

fn cmd_sweep(storage: &StorageArgs, device_name: &str) -> Result<()> {
    if !is_safe_component(device_name) {
        anyhow::bail!("Invalid device name: {}", device_name);
    }
    let settings = load_settings(storage)?;
    let root = paths::device_root(&settings.storage_root, device_name);

    let report = reconcile::sweep(&root, settings.stale_partial_after);

    println!("Swept {}", root.display());
    println!("  Empty folders removed:    {}", report.dirs_removed);
    println!("  Partial files removed:    {}", report.partials_removed);
    println!("  Failures:                 {}", report.failures);
    Ok(())
}

fn cmd_resolve(storage: &StorageArgs, device_name: &str, start_time: &str) -> Result<()> {
    let settings = load_settings(storage)?;
    let start: DateTime<Utc> = DateTime::parse_from_rfc3339(start_time)
        .with_context(|| format!("Invalid RFC 3339 time: {}", start_time))?
        .with_timezone(&Utc);

    let location = paths::resolve(&settings.storage_root, device_name, start, settings.timezone);
    let path = location.path();
    let state = if gate::is_materialized(&path) { "present" } else { "missing" };

    println!("{} ({})", path.display(), state);
    Ok(())
}
