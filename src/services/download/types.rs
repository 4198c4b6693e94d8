//! Download service types and events.

use std::path::PathBuf;

use thiserror::Error;

use crate::mfkessai::{Billing, ClientError};

/// One invoice to download within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceJob {
    pub billing_id: String,
    pub invoice_id: String,
    /// 1-based position within the batch.
    pub seq: usize,
}

impl InvoiceJob {
    /// Expand billings into one job per invoice ID, in listing order.
    pub fn expand(billings: &[Billing]) -> Vec<InvoiceJob> {
        billings
            .iter()
            .flat_map(|billing| {
                billing
                    .invoice_ids
                    .iter()
                    .map(move |invoice_id| (billing.id.clone(), invoice_id.clone()))
            })
            .enumerate()
            .map(|(i, (billing_id, invoice_id))| InvoiceJob {
                billing_id,
                invoice_id,
                seq: i + 1,
            })
            .collect()
    }
}

/// A PDF written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedInvoice {
    pub invoice_id: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Events emitted during download operations.
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    /// Billings were fetched and expanded into jobs
    Planned { billings: usize, invoices: usize },
    /// A job acquired a slot and started
    Started {
        seq: usize,
        total: usize,
        invoice_id: String,
        billing_id: String,
    },
    /// Invoice saved
    Completed {
        seq: usize,
        total: usize,
        invoice_id: String,
        path: PathBuf,
        bytes: u64,
    },
    /// Invoice failed
    Failed {
        seq: usize,
        total: usize,
        invoice_id: String,
        error: String,
    },
}

/// Aggregate result of a batch download.
#[derive(Debug, Default)]
pub struct DownloadSummary {
    pub billings: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub saved: Vec<SavedInvoice>,
    /// One entry per failed invoice, in completion order.
    pub errors: Vec<DownloadError>,
}

impl DownloadSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to get billings: {0}")]
    Billings(#[source] ClientError),
    #[error("failed to find billing for invoice {invoice_id}: {source}")]
    Lookup {
        invoice_id: String,
        source: ClientError,
    },
    #[error("failed to get download URL for invoice {invoice_id}: {source}")]
    SignedUrl {
        invoice_id: String,
        source: ClientError,
    },
    #[error("failed to download file for invoice {invoice_id}: {source}")]
    Fetch {
        invoice_id: String,
        source: ClientError,
    },
    #[error("failed to write file for invoice {invoice_id} to {}: {source}", .path.display())]
    FileWrite {
        invoice_id: String,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("download of invoice {invoice_id} aborted: {source}")]
    Aborted {
        invoice_id: String,
        source: tokio::task::JoinError,
    },
    #[error("download task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("{} out of {} invoice downloads failed", .0.failed, .0.total)]
    PartialFailure(DownloadSummary),
}

impl DownloadError {
    /// The invoice this error belongs to, when it belongs to one.
    pub fn invoice_id(&self) -> Option<&str> {
        match self {
            DownloadError::Lookup { invoice_id, .. }
            | DownloadError::SignedUrl { invoice_id, .. }
            | DownloadError::Fetch { invoice_id, .. }
            | DownloadError::FileWrite { invoice_id, .. }
            | DownloadError::Aborted { invoice_id, .. } => Some(invoice_id),
            _ => None,
        }
    }

    /// The underlying API client error, if any.
    pub fn client_error(&self) -> Option<&ClientError> {
        match self {
            DownloadError::Billings(source)
            | DownloadError::Lookup { source, .. }
            | DownloadError::SignedUrl { source, .. }
            | DownloadError::Fetch { source, .. }
            | DownloadError::Client(source) => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn billing(id: &str, invoices: &[&str]) -> Billing {
        Billing {
            object: "billing".to_string(),
            id: id.to_string(),
            customer_id: String::new(),
            amount: 0,
            issue_date: String::new(),
            due_date: String::new(),
            status: String::new(),
            invoice_ids: invoices.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_expand_one_job_per_invoice() {
        let billings = vec![
            billing("BL_1", &["IN_1", "IN_2"]),
            billing("BL_2", &[]),
            billing("BL_3", &["IN_3"]),
        ];

        let jobs = InvoiceJob::expand(&billings);
        let tuples: Vec<_> = jobs
            .iter()
            .map(|j| (j.billing_id.as_str(), j.invoice_id.as_str(), j.seq))
            .collect();
        assert_eq!(
            tuples,
            vec![("BL_1", "IN_1", 1), ("BL_1", "IN_2", 2), ("BL_3", "IN_3", 3)]
        );
    }

    #[test]
    fn test_partial_failure_message() {
        let summary = DownloadSummary {
            billings: 2,
            total: 3,
            succeeded: 2,
            failed: 1,
            saved: Vec::new(),
            errors: vec![DownloadError::SignedUrl {
                invoice_id: "IN_2".to_string(),
                source: ClientError::Api {
                    status: 500,
                    body: "oops".to_string(),
                },
            }],
        };
        let err = DownloadError::PartialFailure(summary);
        assert_eq!(err.to_string(), "1 out of 3 invoice downloads failed");
    }

    #[test]
    fn test_error_accessors() {
        let err = DownloadError::Fetch {
            invoice_id: "IN_7".to_string(),
            source: ClientError::Download { status: 403 },
        };
        assert_eq!(err.invoice_id(), Some("IN_7"));
        assert_eq!(err.client_error().and_then(ClientError::status), Some(403));
        assert_eq!(
            err.to_string(),
            "failed to download file for invoice IN_7: download failed with status 403"
        );
    }
}
