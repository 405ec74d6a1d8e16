//! Kernel simulator host process.
//!
//! Boots a simulated disk (formatting it if requested) and runs one of the
//! built-in scenarios to completion, watched by a timeout so a runaway
//! scenario cannot hang the process.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kernelcore::fs::coordination::OpenFileTable;
use kernelcore::fs::FileSystem;
use kernelcore::machine::{FileBackedDisk, SynchDisk};
use kernelcore::threads::Scheduler;
use kernelsim::{scenarios, Config};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true).with_thread_names(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,kernelsim=debug")))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    info!("starting kernel simulator");
    info!(version = env!("CARGO_PKG_VERSION"));

    let config = Config::load().context("loading configuration")?;
    let scenario = std::env::args().nth(1).unwrap_or_else(|| "simple-thread".to_string());
    info!(?config, scenario, "configuration loaded");

    let watchdog = tokio::time::timeout(Duration::from_secs(30), tokio::task::spawn_blocking(move || run_scenario(&config, &scenario)));

    match watchdog.await {
        Ok(join_result) => join_result.context("scenario task panicked")??,
        Err(_) => anyhow::bail!("scenario did not complete within the watchdog timeout"),
    }

    Ok(())
}

fn run_scenario(config: &Config, scenario: &str) -> Result<()> {
    let kernel_config = config.kernel_config();
    let scheduler = Scheduler::new(kernel_config);
    let main = scheduler.bootstrap_main_thread("main");

    match scenario {
        "simple-thread" => {
            let log = scenarios::run_simple_thread(&scheduler, main, 3, 5);
            for line in log {
                info!("{line}");
            }
        }
        "write-read" => {
            let disk = Arc::new(SynchDisk::new(
                Arc::new(FileBackedDisk::open(std::path::Path::new(&config.disk_path), kernel_config.disk_num_sectors, kernel_config.page_size, Duration::ZERO).context("opening disk file")?),
                Arc::clone(&scheduler),
            ));
            let open_files = OpenFileTable::new(Arc::clone(&scheduler));
            let fs = FileSystem::format(disk, main, kernel_config.num_dir_entries, kernel_config.num_cache_blocks > 0, open_files);
            let chunks = scenarios::run_write_read(&fs, main, "TestFile", 1000, b"1234567890");
            info!(chunks = chunks.len(), "write-read scenario complete");
        }
        other => anyhow::bail!("unknown scenario {other:?}, expected simple-thread or write-read"),
    }

    scheduler.join_os_threads();
    Ok(())
}
