pub mod aa55;
pub mod channels;
pub mod config;
pub mod datalog_writer;
pub mod error;
pub mod options;
pub mod polling_cache;
pub mod prelude;
pub mod reading;
pub mod scheduler;
pub mod utils;

pub use error::Error;

const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::aa55::inverter::InverterClient;
use crate::datalog_writer::DatalogWriter;
use crate::options::Options;
use crate::prelude::*;
use crate::scheduler::Scheduler;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Main application entry point: read config, connect, then poll until
/// Ctrl+C or the runtime limit.
pub async fn app() -> Result<()> {
    let options = Options::new();

    let config = Config::new(options.config_file.clone())?;
    init_logging(config.loglevel());

    info!(
        "aa55-bridge {} starting with config file: {}",
        CARGO_PKG_VERSION, options.config_file
    );
    config.log_summary();

    // no identity means no device to talk to; that's fatal
    let client = InverterClient::from_config(config.inverter()).await?;

    if options.diagnostics {
        return diagnostics(&client).await;
    }

    run(config, client, options.runtime.map(Duration::from_secs)).await
}

/// Spawns the poller, scheduler and datalog writer around a connected
/// client and stops them again once shutdown is requested.
pub async fn run(config: Config, client: InverterClient, runtime: Option<Duration>) -> Result<()> {
    info!("Initializing channels...");
    let channels = Channels::new();

    let poller = PollingCache::new(&config, Arc::new(client), channels.clone());
    let scheduler = Scheduler::new(config.scheduler().clone(), channels.clone());

    let datalog_handle = match config.datalog_file() {
        Some(path) => {
            let writer = DatalogWriter::new(path)?;
            let identity = poller.identity().clone();
            let receiver = channels.from_poller.subscribe();
            Some(tokio::spawn(async move {
                writer.start(identity, receiver).await
            }))
        }
        None => None,
    };

    let scheduler_handle = {
        let receiver = channels.to_poller.subscribe();
        tokio::spawn(async move { scheduler.start(receiver).await })
    };

    let poller_handle = {
        let poller = poller.clone();
        let receiver = channels.to_poller.subscribe();
        tokio::spawn(async move { poller.start(receiver).await })
    };

    wait_for_shutdown(runtime).await;

    info!("Shutdown signal received, stopping components...");
    poller.stop();

    join("poller", poller_handle).await;
    join("scheduler", scheduler_handle).await;
    if let Some(handle) = datalog_handle {
        join("datalog writer", handle).await;
    }

    poller
        .stats
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .print_summary();

    info!("Application shutdown complete");
    Ok(())
}

/// One-shot check of the link: identity plus a single decoded snapshot.
async fn diagnostics(client: &InverterClient) -> Result<()> {
    let identity = client.identity();
    let snapshot = client.fetch_running_snapshot().await?;

    println!("Model:          {}", identity.model);
    println!("Serial number:  {}", identity.serial_number);
    println!("Work mode:      {}", snapshot.work_mode);
    println!("Feeding power:  {} W", snapshot.pac);
    println!("Energy today:   {} kWh", snapshot.e_today);
    println!("Energy total:   {} kWh", snapshot.e_total);
    println!("L1 voltage:     {} V", snapshot.l1_voltage);
    println!("L1 frequency:   {} Hz", snapshot.l1_frequency);
    println!("Running hours:  {} h", snapshot.running_hours);
    println!("Temperature:    {} C", snapshot.temperature);

    Ok(())
}

async fn wait_for_shutdown(runtime: Option<Duration>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match runtime {
        Some(limit) => tokio::select! {
            _ = ctrl_c => {}
            _ = tokio::time::sleep(limit) => info!("runtime limit of {}s reached", limit.as_secs()),
        },
        None => ctrl_c.await,
    }
}

async fn join(name: &str, handle: JoinHandle<Result<()>>) {
    match handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("{} task failed: {}", name, e),
        Err(e) => error!("Error waiting for {} task: {}", name, e),
    }
}

fn init_logging(loglevel: &str) {
    // RUST_LOG still wins over the configured level
    let result = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(loglevel))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init();

    if let Err(e) = result {
        eprintln!("Failed to initialise logging: {}", e);
    }
}
