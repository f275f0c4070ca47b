use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use argos_harvest::cli::{Cli, Commands};
use argos_harvest::driver::{self, BatchOptions};
use argos_harvest::input::InputError;
use argos_harvest::report::{self, ReportError};
use argos_harvest::store::StateStore;

#[derive(Error, Debug)]
pub enum MainError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("Logging error: {0}")]
    Logging(String),
}

impl From<driver::DriverError> for MainError {
    fn from(err: driver::DriverError) -> Self {
        match err {
            driver::DriverError::Input(e) => MainError::Input(e),
            driver::DriverError::Store(e) => MainError::Io(e),
        }
    }
}

async fn run_batch_command(
    input: String,
    data_dir: String,
    output_dir: String,
    rescrape: bool,
) -> Result<(), MainError> {
    let options = BatchOptions {
        input_csv: input.into(),
        data_dir: data_dir.into(),
        output_dir: output_dir.into(),
        rescrape,
    };

    // Ctrl+C requests a stop; the driver honors it after the identifier in
    // flight completes, then flushes state.
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nReceived Ctrl+C, stopping after the current identifier...");
            shutdown_flag.store(true, Ordering::SeqCst);
        }
    });

    let summary = driver::run_batch(&options, shutdown).await?;
    println!(
        "Processed {}: {} scraped, {} failed, {} not found{}",
        summary.processed,
        summary.successful,
        summary.failed,
        summary.not_found,
        if summary.stopped_early {
            " (stopped early, re-run to continue)"
        } else {
            ""
        }
    );
    Ok(())
}

fn run_report_command(input_dir: String, output: String) -> Result<(), MainError> {
    let rows = report::generate_report(&input_dir, &output)?;
    println!("Wrote {} rows to {}", rows, output);
    Ok(())
}

fn run_status_command(data_dir: String) -> Result<(), MainError> {
    let store = StateStore::new(&data_dir)?;
    let state = store.load();
    driver::log_channel_report(&state.channels);
    println!(
        "{} resolved, {} not found, {} URLs visited",
        state.resolved.len(),
        state.not_found.len(),
        state.visited.len()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), MainError> {
    let cli = Cli::parse_args();

    let log_root = match &cli.command {
        Commands::Run { data_dir, .. } | Commands::Status { data_dir } => data_dir.clone(),
        Commands::Report { .. } => ".".to_string(),
    };
    argos_harvest::logging::init_logging(Path::new(&log_root).join("logs"))
        .map_err(|e| MainError::Logging(e.to_string()))?;

    match cli.command {
        Commands::Run {
            input,
            data_dir,
            output_dir,
            rescrape,
        } => run_batch_command(input, data_dir, output_dir, rescrape).await?,

        Commands::Report { input_dir, output } => run_report_command(input_dir, output)?,

        Commands::Status { data_dir } => run_status_command(data_dir)?,
    }

    Ok(())
}
