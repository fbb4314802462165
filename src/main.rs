//! Command-line entry point.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use rust_conform::plans;
use rust_conform::{
    logging, ConformSettings, ConformanceTestManager, DeviceCategory, TracingSink, TransportKind,
    Verdict,
};

/// Exit code for settings that fail to load or validate.
const EXIT_BAD_SETTINGS: u8 = 99;

/// Check an astronomy device driver against its interface contract.
#[derive(Parser, Debug)]
#[command(name = "rust_conform", version, about)]
struct Args {
    /// Settings file (TOML)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Write the JSON report here
    #[arg(long)]
    results_file: Option<PathBuf>,

    /// Device category, e.g. FilterWheel
    #[arg(long)]
    category: Option<DeviceCategory>,

    /// Transport: local or alpaca
    #[arg(long)]
    transport: Option<TransportKind>,

    /// Alpaca device as HOST, HOST:PORT, [IPv6]:PORT or http://HOST:PORT
    #[arg(long)]
    address: Option<String>,

    /// Alpaca device number
    #[arg(long)]
    device_number: Option<u32>,

    /// Local driver identifier, e.g. Simulator.Focuser
    #[arg(long)]
    driver_id: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Print the test plan and exit
    #[arg(long)]
    list_plan: bool,
}

impl Args {
    fn apply(&self, settings: &mut ConformSettings) -> anyhow::Result<()> {
        if let Some(path) = &self.results_file {
            settings.results_file = Some(path.clone());
        }
        if let Some(category) = self.category {
            settings.device.category = category;
        }
        if let Some(transport) = self.transport {
            settings.device.transport = transport;
        }
        if let Some(address) = &self.address {
            settings
                .device
                .alpaca
                .set_address(address)
                .with_context(|| format!("invalid --address {}", address))?;
        }
        if let Some(number) = self.device_number {
            settings.device.alpaca.device_number = number;
        }
        if let Some(driver_id) = &self.driver_id {
            settings.device.local.driver_id = driver_id.clone();
        }
        if let Some(level) = &self.log_level {
            settings.logging.level = level.clone();
        }
        if self.json_logs {
            settings.logging.json = true;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let mut settings = match ConformSettings::load(args.settings.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(ExitCode::from(EXIT_BAD_SETTINGS));
        }
    };
    if let Err(e) = args.apply(&mut settings) {
        eprintln!("{:#}", e);
        return Ok(ExitCode::from(EXIT_BAD_SETTINGS));
    }
    logging::init(&settings.logging);
    if let Err(e) = settings.validate() {
        error!("{}", e);
        eprintln!("{}", e);
        return Ok(ExitCode::from(EXIT_BAD_SETTINGS));
    }

    if args.list_plan {
        let plan = plans::plan_for(settings.device.category)?;
        print!("{}", plans::describe(&plan));
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling the run");
                cancel.cancel();
            }
        }
    });

    let results_file = settings.results_file.clone();
    let mut manager = ConformanceTestManager::new(settings, Arc::new(TracingSink), cancel);
    let report = manager.run_conformance_test().await?;
    manager.dispose();

    println!("{}", report.to_markdown());
    if let Some(path) = results_file {
        report
            .write_json(&path)
            .with_context(|| format!("writing report to {}", path.display()))?;
        info!(path = %path.display(), "Report written");
    }

    Ok(match report.verdict {
        Verdict::Pass | Verdict::Warning | Verdict::Skipped => ExitCode::SUCCESS,
        Verdict::Fail | Verdict::Aborted | Verdict::Fatal => ExitCode::FAILURE,
    })
}
