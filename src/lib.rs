//! mfk-invoices - invoice PDF downloader for the MoneyForward Kessai API.
//!
//! Fetches billing records for a date range and downloads every invoice
//! they reference with bounded concurrency, or downloads a single invoice
//! by ID.

pub mod config;
pub mod mfkessai;
pub mod services;

pub use mfkessai::{Billing, BillingSearchParams, Client, ClientError};
pub use services::{download_one, download_range, DownloadError, DownloadService, DownloadSummary};
