//! crates/finance_tracker_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format
//! (serde derives appear only where a type crosses the HTTP boundary).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A persisted record of one purchase.
///
/// Invariant after ingestion: `total - total_discount == total_paid` to
/// 2-decimal precision (only enforced when one side was derived during
/// normalization, see `totals`).
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub id: i64,
    pub user_id: i64,
    pub market: String,
    pub branch: String,
    pub invoice: Option<String>,
    pub date: NaiveDate,
    /// Pre-discount total.
    pub total: f64,
    pub total_discount: f64,
    /// Post-discount amount actually paid.
    pub total_paid: f64,
    /// Deduplication key: attachment name, optionally suffixed with the
    /// email's received timestamp. `None` for rows predating dedup.
    pub filename: Option<String>,
}

/// One product entry within a receipt. Owned by exactly one `Receipt`;
/// deleted together with it.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptProduct {
    pub id: i64,
    pub receipt_id: i64,
    pub product_type: String,
    pub product: String,
    pub quantity: f64,
    pub price: f64,
    pub discount: f64,
    pub discount2: f64,
}

/// Column values for a receipt that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewReceipt {
    pub user_id: i64,
    pub market: String,
    pub branch: String,
    pub invoice: Option<String>,
    pub date: NaiveDate,
    pub total: f64,
    pub total_discount: f64,
    pub total_paid: f64,
    pub filename: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewReceiptProduct {
    pub product_type: String,
    pub product: String,
    pub quantity: f64,
    pub price: f64,
    pub discount: f64,
    pub discount2: f64,
}

/// A manually logged income/expense entry.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: String,
    pub person: String,
    pub category: String,
    pub description: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTransaction {
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: String,
    pub person: String,
    pub category: String,
    pub description: String,
    pub amount: f64,
}

// Represents a user - used throughout app
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub id: i64,
    pub username: String,
    pub hashed_password: String,
}

/// Per-user Outlook OAuth state, persisted on the user row.
#[derive(Debug, Clone, Default)]
pub struct OutlookConnection {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires: Option<DateTime<Utc>>,
    pub oauth_state: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
}

/// An in-memory file pending submission to the external PDF-extraction API.
/// Exists only for the duration of one ingestion run.
#[derive(Debug, Clone)]
pub struct ExtractionCandidate {
    /// Dedup key: attachment name + formatted received timestamp when known.
    pub filename: String,
    /// The attachment name as the user would recognize it.
    pub original_filename: String,
    pub content: Vec<u8>,
}

/// Per-file result of one extraction call, aligned positionally with the
/// submitted candidates.
#[derive(Debug, Clone)]
pub enum FileExtraction {
    /// The raw `receipt` object from the extractor. Kept untyped so that
    /// required-key validation distinguishes a missing key from an explicit
    /// null, the way the upstream contract behaves.
    Extracted(serde_json::Value),
    Failed(String),
}

/// Typed view of an extracted receipt payload, produced after required-key
/// validation. Every money field may still be null; `totals::normalize`
/// resolves them.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedReceipt {
    pub market: String,
    pub branch: String,
    #[serde(default)]
    pub invoice: Option<String>,
    pub date: String,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub total_discount: Option<f64>,
    #[serde(default)]
    pub total_paid: Option<f64>,
    #[serde(default)]
    pub products: Vec<ExtractedProduct>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedProduct {
    pub product_type: String,
    pub product: String,
    pub quantity: f64,
    pub price: f64,
    #[serde(default)]
    pub discount: Option<f64>,
    #[serde(default)]
    pub discount2: Option<f64>,
}

/// Outcome of ingesting one candidate, in candidate order. Mirrors the
/// shape returned to the UI for each uploaded file.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_id: Option<i64>,
    pub message: String,
    /// Echo of the extracted payload for caller-side display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_data: Option<serde_json::Value>,
}

impl IngestOutcome {
    pub fn success(receipt_id: i64, message: String, extracted: serde_json::Value) -> Self {
        Self {
            success: true,
            receipt_id: Some(receipt_id),
            message,
            extracted_data: Some(extracted),
        }
    }

    pub fn failure(message: String) -> Self {
        Self {
            success: false,
            receipt_id: None,
            message,
            extracted_data: None,
        }
    }

    pub fn failure_with_data(message: String, extracted: serde_json::Value) -> Self {
        Self {
            success: false,
            receipt_id: None,
            message,
            extracted_data: Some(extracted),
        }
    }
}

/// A message found in the connected mailbox.
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub id: String,
    pub subject: String,
    pub received_date_time: Option<String>,
    pub has_attachments: bool,
}

/// Attachment metadata, listed before any content is downloaded so the
/// pre-download duplicate check can run on names alone.
#[derive(Debug, Clone)]
pub struct AttachmentMeta {
    pub id: String,
    pub name: String,
    pub content_type: String,
}

impl AttachmentMeta {
    /// The Graph API reports PDFs either with their real content type or as
    /// octet-stream with a `.pdf` name.
    pub fn is_pdf(&self) -> bool {
        self.content_type == "application/pdf"
            || (self.content_type == "application/octet-stream"
                && self.name.to_lowercase().ends_with(".pdf"))
    }
}

/// Tokens returned by the OAuth code exchange.
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}
