//! MoneyForward Kessai billing API client.
//!
//! Covers the three calls the downloader needs: listing qualified billings,
//! asking for a signed download URL per invoice, and fetching the PDF behind
//! that URL. Every call is a single attempt; failures are returned as-is.

mod error;
mod types;

pub use error::ClientError;
pub use types::{
    next_cursor, select_download_url, Billing, BillingSearchParams, BillingsPage, Pagination,
    SignedUrl, SignedUrlResponse, DATE_FORMAT,
};

use std::time::Duration;

use chrono::{Local, Months, NaiveDate};
use reqwest::header::ACCEPT;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use url::Url;

/// Production API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.mfkessai.co.jp";

/// Page size for billing list requests.
pub const PAGE_LIMIT: u32 = 100;

/// Client-side timeout applied to every request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How far back `find_billing_containing` looks by default (two years).
pub const DEFAULT_LOOKUP_WINDOW_MONTHS: u32 = 24;

const API_KEY_HEADER: &str = "apikey";

const USER_AGENT: &str = concat!("mfk-invoices/", env!("CARGO_PKG_VERSION"));

/// Authenticated client for the billing API.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    api_key: String,
    base_url: Url,
    lookup_window_months: u32,
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    api_key: String,
    base_url: String,
    timeout: Duration,
    lookup_window_months: u32,
}

impl ClientBuilder {
    /// Override the API endpoint (sandbox, test server).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how many months back single-invoice lookup searches.
    pub fn lookup_window_months(mut self, months: u32) -> Self {
        self.lookup_window_months = months;
        self
    }

    pub fn build(self) -> Result<Client, ClientError> {
        let base_url = Url::parse(&self.base_url).map_err(|e| ClientError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidBaseUrl {
                url: self.base_url,
                reason: "expected an http(s) URL".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.timeout)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Client {
            http,
            api_key: self.api_key,
            base_url,
            lookup_window_months: self.lookup_window_months,
        })
    }
}

impl Client {
    /// Create a client for the production API with default settings.
    pub fn new(api_key: &str) -> Result<Self, ClientError> {
        Self::builder(api_key).build()
    }

    pub fn builder(api_key: &str) -> ClientBuilder {
        ClientBuilder {
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            lookup_window_months: DEFAULT_LOOKUP_WINDOW_MONTHS,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Get billings issued within the given date range.
    pub async fn get_billings(
        &self,
        issue_date_from: NaiveDate,
        issue_date_to: NaiveDate,
    ) -> Result<Vec<Billing>, ClientError> {
        self.fetch_billings(&BillingSearchParams::issued_between(
            issue_date_from,
            issue_date_to,
        ))
        .await
    }

    /// Get every billing matching `params`, following pagination to the end.
    ///
    /// Uses the qualified billings endpoint required for invoice system
    /// compliance.
    pub async fn fetch_billings(
        &self,
        params: &BillingSearchParams,
    ) -> Result<Vec<Billing>, ClientError> {
        let url = self.endpoint(&["v2", "billings", "qualified"]);
        let mut billings = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            tracing::debug!(
                url = %url,
                starting_after = cursor.as_deref().unwrap_or(""),
                "Fetching billings page"
            );

            let request = self
                .authorized(self.http.get(url.clone()))
                .query(&params.to_query(PAGE_LIMIT, cursor.as_deref()));
            let page: BillingsPage = self.send_json(request).await?;

            tracing::debug!(
                total = page.pagination.total,
                has_next = page.pagination.has_next,
                items = page.items.len(),
                end = page.pagination.end.as_deref().unwrap_or(""),
                "Received billings page"
            );

            let BillingsPage {
                pagination, items, ..
            } = page;
            billings.extend(items);

            if !pagination.has_next {
                break;
            }

            match next_cursor(cursor.as_deref(), pagination.end.as_deref()) {
                Some(next) => cursor = Some(next.to_string()),
                None => {
                    tracing::warn!(
                        current = cursor.as_deref().unwrap_or(""),
                        new = pagination.end.as_deref().unwrap_or(""),
                        "Pagination cursor not advancing, stopping"
                    );
                    break;
                }
            }
        }

        Ok(billings)
    }

    /// Get a signed URL for downloading an invoice PDF.
    ///
    /// The `i` path segment is literal and selects the invoice document type.
    pub async fn get_download_url(
        &self,
        billing_id: &str,
        invoice_id: &str,
    ) -> Result<String, ClientError> {
        let url = self.endpoint(&[
            "v2",
            "billings",
            billing_id,
            "issues",
            "i",
            invoice_id,
            "download_signed_url",
        ]);
        tracing::debug!(url = %url, "Requesting signed download URL");

        let response: SignedUrlResponse =
            self.send_json(self.authorized(self.http.post(url))).await?;

        select_download_url(&response.items)
            .map(str::to_string)
            .ok_or(ClientError::NoDownloadUrl)
    }

    /// Download raw bytes from a signed URL.
    ///
    /// The signature carries authorization, so no API key is sent.
    pub async fn download_bytes(&self, url: &str) -> Result<Vec<u8>, ClientError> {
        let response = self.http.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Download {
                status: status.as_u16(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Find the billing that lists `invoice_id`.
    ///
    /// Only billings issued within the lookup window (two years up to today
    /// by default) are searched; older invoices are not found.
    pub async fn find_billing_containing(&self, invoice_id: &str) -> Result<Billing, ClientError> {
        let today = Local::now().date_naive();
        let from = today
            .checked_sub_months(Months::new(self.lookup_window_months))
            .unwrap_or(NaiveDate::MIN);

        tracing::debug!(invoice_id, %from, to = %today, "Searching billings for invoice");

        let billings = self.get_billings(from, today).await?;
        find_in(billings, invoice_id).ok_or_else(|| ClientError::NotFound(invoice_id.to_string()))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(API_KEY_HEADER, &self.api_key)
            .header(ACCEPT, "application/json")
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // build() rejects cannot-be-a-base URLs
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(ClientError::Decode)
    }
}

/// Linear scan for the first billing listing `invoice_id`.
pub fn find_in(billings: Vec<Billing>, invoice_id: &str) -> Option<Billing> {
    billings
        .into_iter()
        .find(|billing| billing.contains_invoice(invoice_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn billing(id: &str, invoices: &[&str]) -> Billing {
        Billing {
            object: "billing".to_string(),
            id: id.to_string(),
            customer_id: "CS_1".to_string(),
            amount: 1000,
            issue_date: "2025-01-01".to_string(),
            due_date: "2025-01-31".to_string(),
            status: "scheduled".to_string(),
            invoice_ids: invoices.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_find_in_exact_match() {
        let billings = vec![billing("BL_1", &["IN_1", "IN_2"]), billing("BL_2", &["IN_3"])];
        assert_eq!(find_in(billings.clone(), "IN_3").unwrap().id, "BL_2");
        assert!(find_in(billings.clone(), "IN_999").is_none());
        assert!(find_in(billings, "IN_").is_none());
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let client = Client::builder("key")
            .base_url("https://api.example.test/")
            .build()
            .unwrap();
        let url = client.endpoint(&["v2", "billings", "BL_1", "issues", "i", "IN_1", "download_signed_url"]);
        assert_eq!(
            url.as_str(),
            "https://api.example.test/v2/billings/BL_1/issues/i/IN_1/download_signed_url"
        );
    }

    #[test]
    fn test_endpoint_escapes_ids() {
        let client = Client::builder("key")
            .base_url("https://api.example.test")
            .build()
            .unwrap();
        let url = client.endpoint(&["v2", "billings", "a/b"]);
        assert_eq!(url.as_str(), "https://api.example.test/v2/billings/a%2Fb");
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(matches!(
            Client::builder("key").base_url("not a url").build(),
            Err(ClientError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            Client::builder("key").base_url("mailto:billing@example.test").build(),
            Err(ClientError::InvalidBaseUrl { .. })
        ));
    }
}
