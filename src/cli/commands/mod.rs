//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod download_invoice;
mod download_invoices;

use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use mfk_invoices::config::{load_settings, LoadOptions};

use download_invoices::RangeArgs;

#[derive(Parser)]
#[command(name = "mfk")]
#[command(about = "Download invoice PDFs from the MoneyForward Kessai API")]
#[command(version)]
pub struct Cli {
    /// API key (takes precedence over the config file)
    #[arg(short = 'k', long, global = true, env = "MFK_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// API base URL (for the sandbox environment)
    #[arg(long, global = true, env = "MFK_BASE_URL")]
    base_url: Option<String>,

    /// Config file path (overrides auto-discovery)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Download the PDF of a single invoice
    ///
    /// The output directory is created if it does not exist.
    ///
    /// Example: mfk download-invoice IN_XXXXXXXXXXXXX ~/Downloads/mfk
    DownloadInvoice {
        /// Invoice ID (IN_...)
        invoice_id: String,
        /// Directory to write <INVOICE_ID>.pdf into
        output_dir: String,
    },

    /// Download the PDFs of every invoice issued within a date range
    ///
    /// Dates are YYYY-MM-DD. The output directory is created if it does not exist.
    ///
    /// Example: mfk download-invoices -c 5 2024-09-01 2025-09-30 ~/Downloads/mfk
    DownloadInvoices {
        /// First issue date (inclusive)
        start_date: NaiveDate,
        /// Last issue date (inclusive)
        end_date: NaiveDate,
        /// Directory to write the PDFs into
        output_dir: String,
        /// Number of parallel downloads [default: 5, or `concurrency` from config]
        #[arg(short, long)]
        concurrency: Option<NonZeroUsize>,
        /// Only billings due on or after this date
        #[arg(long)]
        due_date_from: Option<NaiveDate>,
        /// Only billings due on or before this date
        #[arg(long)]
        due_date_to: Option<NaiveDate>,
        /// Only billings with this status (repeatable)
        #[arg(long = "status")]
        statuses: Vec<String>,
        /// Show a progress bar instead of per-invoice lines
        #[arg(short = 'P', long)]
        progress: bool,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
    };
    let mut settings = load_settings(&options)
        .await
        .context("failed to load configuration")?;

    // Flags win over config and environment
    if let Some(api_key) = cli.api_key.filter(|k| !k.is_empty()) {
        settings.api_key = Some(api_key);
    }
    if let Some(base_url) = cli.base_url {
        settings.base_url = base_url;
    }

    match cli.command {
        Commands::DownloadInvoice {
            invoice_id,
            output_dir,
        } => download_invoice::cmd_download_invoice(&settings, &invoice_id, &output_dir).await,
        Commands::DownloadInvoices {
            start_date,
            end_date,
            output_dir,
            concurrency,
            due_date_from,
            due_date_to,
            statuses,
            progress,
        } => {
            let args = RangeArgs {
                start_date,
                end_date,
                due_date_from,
                due_date_to,
                statuses,
                output_dir,
                concurrency: concurrency.map_or(settings.concurrency, NonZeroUsize::get),
                progress,
            };
            download_invoices::cmd_download_invoices(&settings, args).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_download_invoices() {
        let cli = Cli::try_parse_from([
            "mfk",
            "download-invoices",
            "-c",
            "3",
            "--status",
            "scheduled",
            "--status",
            "paid",
            "2024-09-01",
            "2025-09-30",
            "out",
        ])
        .unwrap();

        match cli.command {
            Commands::DownloadInvoices {
                start_date,
                concurrency,
                statuses,
                ..
            } => {
                assert_eq!(start_date, NaiveDate::from_ymd_opt(2024, 9, 1).unwrap());
                assert_eq!(concurrency.map(NonZeroUsize::get), Some(3));
                assert_eq!(statuses, vec!["scheduled", "paid"]);
            }
            _ => panic!("expected download-invoices"),
        }
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(Cli::try_parse_from(["mfk", "download-invoices", "-c", "0", "2024-09-01", "2025-09-30", "out"]).is_err());
        assert!(Cli::try_parse_from(["mfk", "download-invoices", "2024-13-01", "2025-09-30", "out"]).is_err());
        assert!(Cli::try_parse_from(["mfk", "download-invoice", "IN_1"]).is_err());
    }
}
