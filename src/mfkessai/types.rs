//! Wire types for the billing API.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Date format used by every date parameter and field of the API.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Decode an explicit `null` as the type's default value.
fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// A billing record, aggregating one or more invoice documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Billing {
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub customer_id: String,
    /// Amount in the smallest currency unit.
    #[serde(default, deserialize_with = "null_as_default")]
    pub amount: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub issue_date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub due_date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub invoice_ids: Vec<String>,
}

impl Billing {
    /// Check whether this billing lists the given invoice.
    pub fn contains_invoice(&self, invoice_id: &str) -> bool {
        self.invoice_ids.iter().any(|id| id == invoice_id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    #[serde(default, deserialize_with = "null_as_default")]
    pub total: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub limit: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub has_next: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub has_previous: bool,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

/// One page of `/v2/billings/qualified`.
#[derive(Debug, Deserialize)]
pub struct BillingsPage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pagination: Pagination,
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<Billing>,
}

/// A signed, time-limited download link for one issued document.
#[derive(Debug, Clone, Deserialize)]
pub struct SignedUrl {
    #[serde(default, deserialize_with = "null_as_default")]
    pub signed_url: String,
    #[serde(default)]
    pub expired_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct SignedUrlResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<SignedUrl>,
}

/// Filters for listing billings.
#[derive(Debug, Clone, Default)]
pub struct BillingSearchParams {
    pub issue_date_from: Option<NaiveDate>,
    pub issue_date_to: Option<NaiveDate>,
    pub due_date_from: Option<NaiveDate>,
    pub due_date_to: Option<NaiveDate>,
    pub statuses: Vec<String>,
}

impl BillingSearchParams {
    /// Search by issue date only.
    pub fn issued_between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            issue_date_from: Some(from),
            issue_date_to: Some(to),
            ..Self::default()
        }
    }

    /// Build the query string pairs for one page request.
    pub fn to_query(&self, limit: u32, starting_after: Option<&str>) -> Vec<(&'static str, String)> {
        let mut query = vec![("limit", limit.to_string())];

        let dates = [
            ("issue_date_from", self.issue_date_from),
            ("issue_date_to", self.issue_date_to),
            ("due_date_from", self.due_date_from),
            ("due_date_to", self.due_date_to),
        ];
        for (key, date) in dates {
            if let Some(date) = date {
                query.push((key, date.format(DATE_FORMAT).to_string()));
            }
        }

        for status in &self.statuses {
            query.push(("status", status.clone()));
        }

        if let Some(cursor) = starting_after.filter(|c| !c.is_empty()) {
            query.push(("starting_after", cursor.to_string()));
        }

        query
    }
}

/// Pick the URL to download from a signed URL response.
///
/// The first `pdf` item wins; otherwise the first item is used. A missing or
/// blank URL yields `None`.
pub fn select_download_url(items: &[SignedUrl]) -> Option<&str> {
    items
        .iter()
        .find(|item| item.kind == "pdf")
        .or_else(|| items.first())
        .map(|item| item.signed_url.as_str())
        .filter(|url| !url.trim().is_empty())
}

/// Decide the cursor for the next page.
///
/// Returns `None` when the server handed back an empty cursor or the one we
/// just used, which would otherwise loop forever.
pub fn next_cursor<'a>(current: Option<&str>, end: Option<&'a str>) -> Option<&'a str> {
    let end = end.filter(|e| !e.is_empty())?;
    if current == Some(end) {
        None
    } else {
        Some(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(kind: &str, url: &str) -> SignedUrl {
        SignedUrl {
            signed_url: url.to_string(),
            expired_at: None,
            kind: kind.to_string(),
        }
    }

    #[test]
    fn test_select_prefers_pdf() {
        let items = vec![item("other", ""), item("pdf", "X")];
        assert_eq!(select_download_url(&items), Some("X"));
    }

    #[test]
    fn test_select_falls_back_to_first() {
        let items = vec![item("other", "Y")];
        assert_eq!(select_download_url(&items), Some("Y"));
    }

    #[test]
    fn test_select_empty_or_blank() {
        assert_eq!(select_download_url(&[]), None);
        assert_eq!(select_download_url(&[item("other", "")]), None);
    }

    #[test]
    fn test_next_cursor() {
        assert_eq!(next_cursor(None, Some("c1")), Some("c1"));
        assert_eq!(next_cursor(Some("c1"), Some("c2")), Some("c2"));
        assert_eq!(next_cursor(Some("c1"), Some("c1")), None);
        assert_eq!(next_cursor(Some("c1"), Some("")), None);
        assert_eq!(next_cursor(None, None), None);
    }

    #[test]
    fn test_query_order_and_filters() {
        let params = BillingSearchParams {
            issue_date_from: NaiveDate::from_ymd_opt(2024, 9, 1),
            issue_date_to: NaiveDate::from_ymd_opt(2025, 9, 30),
            due_date_from: None,
            due_date_to: NaiveDate::from_ymd_opt(2025, 10, 31),
            statuses: vec!["scheduled".to_string(), "paid".to_string()],
        };

        let query = params.to_query(100, Some("bl_9"));
        assert_eq!(
            query,
            vec![
                ("limit", "100".to_string()),
                ("issue_date_from", "2024-09-01".to_string()),
                ("issue_date_to", "2025-09-30".to_string()),
                ("due_date_to", "2025-10-31".to_string()),
                ("status", "scheduled".to_string()),
                ("status", "paid".to_string()),
                ("starting_after", "bl_9".to_string()),
            ]
        );
    }

    #[test]
    fn test_billing_deserializes_api_shape() {
        let json = r#"{
            "object": "billing",
            "id": "BL_1",
            "customer_id": "CS_1",
            "amount": 11000,
            "issue_date": "2025-01-31",
            "due_date": "2025-02-28",
            "status": "scheduled",
            "invoice_ids": ["IN_1", "IN_2"]
        }"#;
        let billing: Billing = serde_json::from_str(json).unwrap();
        assert_eq!(billing.amount, 11000);
        assert!(billing.contains_invoice("IN_2"));
        assert!(!billing.contains_invoice("IN_3"));
    }

    #[test]
    fn test_signed_url_response_parses_expiry() {
        let json = r#"{
            "object": "list",
            "items": [{"signed_url": "https://files.example/a.pdf", "expired_at": "2025-10-01T12:00:00+09:00", "type": "pdf"}]
        }"#;
        let resp: SignedUrlResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.items.len(), 1);
        assert!(resp.items[0].expired_at.is_some());
        assert_eq!(select_download_url(&resp.items), Some("https://files.example/a.pdf"));
    }

    #[test]
    fn test_null_fields_decode_as_empty() {
        let page: BillingsPage = serde_json::from_str(
            r#"{
                "object": "list",
                "pagination": {"total": 1, "limit": 100, "has_next": null, "end": null},
                "items": [{
                    "id": "BL_1",
                    "customer_id": null,
                    "amount": null,
                    "issue_date": "2025-01-31",
                    "status": null,
                    "invoice_ids": null
                }]
            }"#,
        )
        .unwrap();
        assert!(!page.pagination.has_next);
        assert_eq!(page.items.len(), 1);
        let billing = &page.items[0];
        assert_eq!(billing.customer_id, "");
        assert_eq!(billing.amount, 0);
        assert!(billing.invoice_ids.is_empty());

        let empty: BillingsPage =
            serde_json::from_str(r#"{"object": null, "pagination": null, "items": null}"#).unwrap();
        assert!(empty.items.is_empty());

        let signed: SignedUrlResponse = serde_json::from_str(
            r#"{"object": "list", "items": [{"signed_url": "https://files.test/a.pdf", "type": null}]}"#,
        )
        .unwrap();
        assert_eq!(signed.items[0].kind, "");
        assert_eq!(select_download_url(&signed.items), Some("https://files.test/a.pdf"));
    }
}
