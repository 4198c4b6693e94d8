//! Download invoices for a date range command.

use anyhow::bail;
use chrono::NaiveDate;
use console::style;
use tokio::sync::mpsc;

use mfk_invoices::config::Settings;
use mfk_invoices::mfkessai::BillingSearchParams;
use mfk_invoices::services::{DownloadError, DownloadEvent, DownloadService, DownloadSummary};

use crate::cli::helpers::prepare_output_dir;
use crate::cli::progress::BatchProgress;

/// Arguments for a range download.
pub struct RangeArgs {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub due_date_from: Option<NaiveDate>,
    pub due_date_to: Option<NaiveDate>,
    pub statuses: Vec<String>,
    pub output_dir: String,
    pub concurrency: usize,
    pub progress: bool,
}

impl RangeArgs {
    fn search_params(&self) -> BillingSearchParams {
        BillingSearchParams {
            issue_date_from: Some(self.start_date),
            issue_date_to: Some(self.end_date),
            due_date_from: self.due_date_from,
            due_date_to: self.due_date_to,
            statuses: self.statuses.clone(),
        }
    }
}

/// Download every invoice issued within the range.
pub async fn cmd_download_invoices(settings: &Settings, args: RangeArgs) -> anyhow::Result<()> {
    if args.start_date > args.end_date {
        bail!(
            "start date {} is after end date {}",
            args.start_date,
            args.end_date
        );
    }

    let client = settings.create_client()?;
    let output_dir = prepare_output_dir(&args.output_dir)?;

    println!(
        "{} Downloading invoices issued {} to {} into {} ({} parallel)",
        style("→").cyan(),
        args.start_date,
        args.end_date,
        output_dir.display(),
        args.concurrency
    );

    // Event channel for progress updates
    let (event_tx, mut event_rx) = mpsc::channel::<DownloadEvent>(100);
    let service = DownloadService::new(client).with_events(event_tx);

    // Spawn event handler task (UI layer)
    let mut progress = BatchProgress::new(args.progress);
    let event_handler = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            progress.handle(&event);
        }
        progress.finish();
    });

    let result = service
        .download_range(&args.search_params(), &output_dir, args.concurrency)
        .await;

    // Closes the event channel so the handler can drain and exit
    drop(service);
    if let Err(e) = event_handler.await {
        tracing::warn!("Event handler task failed: {}", e);
    }

    match result {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(err) => {
            if let DownloadError::PartialFailure(ref summary) = err {
                print_summary(summary);
                print_errors(summary);
            }
            Err(anyhow::Error::new(err).context("failed to download invoices"))
        }
    }
}

fn print_summary(summary: &DownloadSummary) {
    if summary.total == 0 {
        println!("{} No invoices to download", style("!").yellow());
        return;
    }

    println!();
    println!("{}", style("Download summary").bold());
    println!("  Billings:   {}", summary.billings);
    println!("  Invoices:   {}", summary.total);
    println!("  Succeeded:  {}", style(summary.succeeded).green());
    if summary.failed > 0 {
        println!("  Failed:     {}", style(summary.failed).red());
    } else {
        println!("  Failed:     0");
    }
}

fn print_errors(summary: &DownloadSummary) {
    if summary.errors.is_empty() {
        return;
    }
    eprintln!();
    eprintln!("{}", style("Errors encountered:").red());
    for (i, err) in summary.errors.iter().enumerate() {
        eprintln!("  {}. {}", i + 1, err);
    }
}
