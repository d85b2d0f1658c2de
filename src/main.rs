//! forecast_service: polls the forecast API for every configured location
//! and keeps the device states in the local state snapshot current.

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;

use forecast_service::config::{self, DEFAULT_CONFIG_PATH};
use forecast_service::host::LocalHost;
use forecast_service::ingest::darksky::DarkSkyClient;
use forecast_service::ingest::image::ImageDownloader;
use forecast_service::logging::{self, LogLevel, Source};
use forecast_service::poll::Poller;
use forecast_service::verify;

/// Forecast polling service
#[derive(Parser)]
#[command(name = "forecast_service", about = "Polls a forecast API and publishes device states")]
struct Cli {
    /// Configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Device state snapshot, restored on start and written after each cycle.
    #[arg(long, default_value = "forecast_state.json")]
    state: PathBuf,

    /// Run one refresh cycle and exit.
    #[arg(long)]
    once: bool,

    /// Check every configured location against the API, print a report and exit.
    #[arg(long)]
    verify: bool,

    /// Write the fetched documents to the log folder after every cycle.
    #[arg(long)]
    dump: bool,

    /// Overrides `show_debug_level` (debug, info, warning, error or 10-50).
    #[arg(long)]
    log_level: Option<String>,

    /// Also write the log to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Prefix console log lines with a timestamp.
    #[arg(long)]
    timestamps: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = config::load_config(&cli.config)?;

    let level_pref = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.prefs.show_debug_level);
    let level = LogLevel::from_pref(level_pref).unwrap_or(LogLevel::Warning);
    logging::init_logger(level, cli.log_file.as_deref(), cli.timestamps)?;

    let client = DarkSkyClient::new(&config.prefs)?;

    if cli.verify {
        let report = verify::run_full_verification(&client, &config.devices);
        verify::print_summary(&report);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    logging::info(
        Source::System,
        None,
        &format!(
            "Loaded {} devices and {} triggers from {}",
            config.devices.len(),
            config.triggers.len(),
            cli.config.display()
        ),
    );

    let host = LocalHost::new(config).with_snapshot(&cli.state)?;
    let stop = host.stop_handle();
    ctrlc::set_handler(move || {
        logging::info(Source::System, None, "Shutdown requested.");
        stop.stop();
    })?;
    let mut poller = Poller::new(client, host)
        .with_images(ImageDownloader::new()?)
        .with_dump(cli.dump);

    if cli.once {
        poller.refresh_now()?;
        return Ok(());
    }

    if let Err(stopped) = poller.run() {
        logging::debug(Source::System, None, &format!("Stopping: {stopped}"));
        if let Err(e) = poller.host().save() {
            logging::error(Source::System, None, &format!("Unable to save state: {e}"));
        }
    }
    Ok(())
}
