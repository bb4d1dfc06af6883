use std::io::Write;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::Parser;
use tokio::signal;
use tokio::signal::unix::SignalKind;

use ewebridge::config;
use ewebridge::connection;
use ewebridge::error::ApiResult;
use ewebridge::host::{AccessoryStore, PLATFORM_NAME, PLUGIN_NAME};
use ewebridge::platform::{EweLinkPlatform, PlatformHandle};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: Utf8PathBuf,
}

/*
 * Formatter function to output in syslog format. This makes sense when running
 * as a service (where output might go to a log file, or the system journal)
 */
#[allow(clippy::match_same_arms)]
fn syslog_format(
    buf: &mut pretty_env_logger::env_logger::fmt::Formatter,
    record: &log::Record,
) -> std::io::Result<()> {
    writeln!(
        buf,
        "<{}>{}: {}",
        match record.level() {
            log::Level::Error => 3,
            log::Level::Warn => 4,
            log::Level::Info => 6,
            log::Level::Debug => 7,
            log::Level::Trace => 7,
        },
        record.target(),
        record.args()
    )
}

fn init_logging() -> ApiResult<()> {
    /* Try to provide reasonable default filters, when RUST_LOG is not specified */
    const DEFAULT_LOG_FILTERS: &[&str] = &[
        "debug",
        "mdns_sd=off",
        "reqwest=info",
        "tungstenite=info",
        "hyper_util=info",
    ];

    let log_filters = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTERS.join(","));

    /* Detect if we need syslog or human-readable formatting */
    if std::env::var("SYSTEMD_EXEC_PID").is_ok_and(|pid| pid == std::process::id().to_string()) {
        Ok(pretty_env_logger::env_logger::builder()
            .format(syslog_format)
            .parse_filters(&log_filters)
            .try_init()?)
    } else {
        Ok(pretty_env_logger::formatted_timed_builder()
            .parse_filters(&log_filters)
            .try_init()?)
    }
}

fn install_signal_handlers(handle: &PlatformHandle) -> ApiResult<()> {
    fn shutdown(msg: &str, handle: &PlatformHandle) {
        log::warn!("{msg}");
        let _ = std::io::stderr().flush();
        if let Err(err) = handle.shutdown() {
            log::error!("Failed to request shutdown: {err}");
        }
    }

    let ctrlc = handle.clone();
    tokio::spawn(async move {
        if matches!(signal::ctrl_c().await, Ok(())) {
            shutdown("Ctrl-C pressed, exiting..", &ctrlc);
        }
    });

    let term = handle.clone();
    let mut signal = signal::unix::signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        if matches!(signal.recv().await, Some(())) {
            shutdown("SIGTERM received, exiting..", &term);
        }
    });

    Ok(())
}

async fn run() -> ApiResult<()> {
    init_logging()?;

    let args = Args::parse();

    let config = config::parse(&args.config)?;
    log::debug!("Configuration loaded successfully");

    let connection = connection::from_config(&config)?;

    let store = Arc::new(AccessoryStore::load(&config.cache_file)?);
    let cached = store.cached().await;

    let mut platform = EweLinkPlatform::new(config, connection, store)?;
    log::info!(
        "Starting [{PLUGIN_NAME}/{PLATFORM_NAME}] with {} cached accessories",
        cached.len()
    );

    for accessory in cached {
        let name = accessory.display_name.clone();
        if let Err(err) = platform.configure_accessory(accessory).await {
            log::error!("[{name}] Failed to restore cached accessory: {err}");
        }
    }

    install_signal_handlers(&platform.handle())?;

    platform.did_finish_launching().await?;

    platform.run().await
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        log::error!("ewebridge error: {err}");
        log::error!("Fatal error encountered, cannot continue.");
    }
}
