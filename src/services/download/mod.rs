//! Invoice download service.
//!
//! Resolves billings through the API client and writes invoice PDFs to the
//! output directory, either one at a time or as a bounded concurrent batch.
//! Separated from UI concerns - emits events for progress tracking.

mod dispatcher;
mod types;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::mpsc;

use crate::mfkessai::{BillingSearchParams, Client};

pub use dispatcher::{run_all, DispatchReport};
pub use types::{DownloadError, DownloadEvent, DownloadSummary, InvoiceJob, SavedInvoice};

/// Parallel downloads used when the caller does not say otherwise.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Service for downloading invoice PDFs.
pub struct DownloadService {
    client: Client,
    event_tx: Option<mpsc::Sender<DownloadEvent>>,
}

impl DownloadService {
    /// Create a new download service.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            event_tx: None,
        }
    }

    /// Report progress events on the given channel.
    pub fn with_events(mut self, event_tx: mpsc::Sender<DownloadEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Download a single invoice by ID.
    ///
    /// The owning billing is located first; any failure aborts the download.
    pub async fn download_one(
        &self,
        invoice_id: &str,
        output_dir: &Path,
    ) -> Result<SavedInvoice, DownloadError> {
        let billing = self
            .client
            .find_billing_containing(invoice_id)
            .await
            .map_err(|source| DownloadError::Lookup {
                invoice_id: invoice_id.to_string(),
                source,
            })?;

        tracing::info!(
            billing_id = %billing.id,
            issue_date = %billing.issue_date,
            amount = billing.amount,
            "Found billing for invoice {}",
            invoice_id
        );

        save_invoice(&self.client, &billing.id, invoice_id, output_dir).await
    }

    /// Download every invoice of every billing matching `params`.
    ///
    /// Returns `Ok` only if all invoices were saved. Otherwise the error is
    /// [`DownloadError::PartialFailure`] carrying the full summary.
    pub async fn download_range(
        &self,
        params: &BillingSearchParams,
        output_dir: &Path,
        concurrency: usize,
    ) -> Result<DownloadSummary, DownloadError> {
        let billings = self
            .client
            .fetch_billings(params)
            .await
            .map_err(DownloadError::Billings)?;

        let jobs = InvoiceJob::expand(&billings);
        let total = jobs.len();

        tracing::info!(
            "Found {} billing(s) with {} invoice(s)",
            billings.len(),
            total
        );
        emit(
            &self.event_tx,
            DownloadEvent::Planned {
                billings: billings.len(),
                invoices: total,
            },
        )
        .await;

        if total == 0 {
            return Ok(DownloadSummary {
                billings: billings.len(),
                ..DownloadSummary::default()
            });
        }

        let client = self.client.clone();
        let output_dir: Arc<PathBuf> = Arc::new(output_dir.to_path_buf());
        let event_tx = self.event_tx.clone();

        let report = run_all(jobs, concurrency, move |job: InvoiceJob| {
            let client = client.clone();
            let output_dir = output_dir.clone();
            let event_tx = event_tx.clone();

            async move {
                tracing::info!(
                    "[{}/{}] Processing invoice ID: {} (Billing: {})",
                    job.seq,
                    total,
                    job.invoice_id,
                    job.billing_id
                );
                emit(
                    &event_tx,
                    DownloadEvent::Started {
                        seq: job.seq,
                        total,
                        invoice_id: job.invoice_id.clone(),
                        billing_id: job.billing_id.clone(),
                    },
                )
                .await;

                let result = {
                    let client = client.clone();
                    let output_dir = output_dir.clone();
                    let billing_id = job.billing_id.clone();
                    let invoice_id = job.invoice_id.clone();
                    isolate(&job.invoice_id, async move {
                        save_invoice(&client, &billing_id, &invoice_id, &output_dir).await
                    })
                    .await
                };

                let event = match &result {
                    Ok(saved) => DownloadEvent::Completed {
                        seq: job.seq,
                        total,
                        invoice_id: job.invoice_id.clone(),
                        path: saved.path.clone(),
                        bytes: saved.bytes,
                    },
                    Err(e) => {
                        tracing::warn!("[{}/{}] {}", job.seq, total, e);
                        DownloadEvent::Failed {
                            seq: job.seq,
                            total,
                            invoice_id: job.invoice_id.clone(),
                            error: e.to_string(),
                        }
                    }
                };
                emit(&event_tx, event).await;

                result
            }
        })
        .await;

        let summary = DownloadSummary {
            billings: billings.len(),
            total: report.total,
            succeeded: report.succeeded,
            failed: report.failed,
            saved: report.completed,
            errors: report.errors,
        };

        if summary.is_success() {
            Ok(summary)
        } else {
            Err(DownloadError::PartialFailure(summary))
        }
    }
}

/// Download a single invoice into `output_dir`, returning the written path.
pub async fn download_one(
    api_key: &str,
    invoice_id: &str,
    output_dir: &Path,
) -> Result<PathBuf, DownloadError> {
    let service = DownloadService::new(Client::new(api_key)?);
    Ok(service.download_one(invoice_id, output_dir).await?.path)
}

/// Download every invoice issued between `start` and `end` (inclusive).
pub async fn download_range(
    api_key: &str,
    start: NaiveDate,
    end: NaiveDate,
    output_dir: &Path,
    concurrency: usize,
) -> Result<DownloadSummary, DownloadError> {
    let service = DownloadService::new(Client::new(api_key)?);
    service
        .download_range(
            &BillingSearchParams::issued_between(start, end),
            output_dir,
            concurrency,
        )
        .await
}

/// Path an invoice PDF is written to.
///
/// Path separators in the ID are replaced so the file always lands directly
/// in `output_dir`.
pub fn invoice_path(output_dir: &Path, invoice_id: &str) -> PathBuf {
    let name: String = invoice_id
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    output_dir.join(format!("{}.pdf", name))
}

/// Resolve, fetch and write one invoice. Shared by the single and batch paths.
async fn save_invoice(
    client: &Client,
    billing_id: &str,
    invoice_id: &str,
    output_dir: &Path,
) -> Result<SavedInvoice, DownloadError> {
    let url = client
        .get_download_url(billing_id, invoice_id)
        .await
        .map_err(|source| DownloadError::SignedUrl {
            invoice_id: invoice_id.to_string(),
            source,
        })?;

    let content = client
        .download_bytes(&url)
        .await
        .map_err(|source| DownloadError::Fetch {
            invoice_id: invoice_id.to_string(),
            source,
        })?;

    let path = invoice_path(output_dir, invoice_id);
    tokio::fs::write(&path, &content)
        .await
        .map_err(|source| DownloadError::FileWrite {
            invoice_id: invoice_id.to_string(),
            path: path.clone(),
            source,
        })?;

    tracing::info!("Saved {} ({} bytes)", path.display(), content.len());

    Ok(SavedInvoice {
        invoice_id: invoice_id.to_string(),
        path,
        bytes: content.len() as u64,
    })
}

/// Run one invoice's work on its own task so a panic becomes an error for
/// that invoice.
async fn isolate<F>(invoice_id: &str, work: F) -> Result<SavedInvoice, DownloadError>
where
    F: Future<Output = Result<SavedInvoice, DownloadError>> + Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(result) => result,
        Err(source) => Err(DownloadError::Aborted {
            invoice_id: invoice_id.to_string(),
            source,
        }),
    }
}

async fn emit(event_tx: &Option<mpsc::Sender<DownloadEvent>>, event: DownloadEvent) {
    if let Some(tx) = event_tx {
        let _ = tx.send(event).await;
    }
}
