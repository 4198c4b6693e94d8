//! Service layer for invoice downloads.
//!
//! This module contains domain logic separated from UI concerns.
//! Services can be used by the CLI or embedded in other tools.

pub mod download;

pub use download::{
    download_one, download_range, DownloadError, DownloadEvent, DownloadService, DownloadSummary,
    SavedInvoice,
};
