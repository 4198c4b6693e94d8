//! Progress display for batch downloads.

use indicatif::{ProgressBar, ProgressStyle};

use console::style;
use mfk_invoices::services::DownloadEvent;

/// Renders download events either as a progress bar or as one line per invoice.
pub struct BatchProgress {
    bar: Option<ProgressBar>,
    show_bar: bool,
}

impl BatchProgress {
    pub fn new(show_bar: bool) -> Self {
        Self {
            bar: None,
            show_bar,
        }
    }

    /// Update the display for one event.
    pub fn handle(&mut self, event: &DownloadEvent) {
        match event {
            DownloadEvent::Planned { billings, invoices } => {
                println!(
                    "{} Found {} billing(s) with {} invoice(s)",
                    style("→").cyan(),
                    billings,
                    invoices
                );
                if self.show_bar && *invoices > 0 {
                    let bar = ProgressBar::new(*invoices as u64);
                    bar.set_style(
                        ProgressStyle::default_bar()
                            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_bar())
                            .progress_chars("#>-"),
                    );
                    self.bar = Some(bar);
                }
            }
            DownloadEvent::Started { invoice_id, .. } => {
                if let Some(ref bar) = self.bar {
                    bar.set_message(invoice_id.clone());
                }
            }
            DownloadEvent::Completed {
                seq,
                total,
                path,
                bytes,
                ..
            } => match self.bar {
                Some(ref bar) => bar.inc(1),
                None => println!(
                    "[{}/{}] {} Saved {} ({} bytes)",
                    seq,
                    total,
                    style("✓").green(),
                    path.display(),
                    bytes
                ),
            },
            DownloadEvent::Failed {
                seq, total, error, ..
            } => {
                let line = format!("[{}/{}] {} {}", seq, total, style("✗").red(), error);
                match self.bar {
                    Some(ref bar) => {
                        bar.println(line);
                        bar.inc(1);
                    }
                    None => eprintln!("{}", line),
                }
            }
        }
    }

    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}
