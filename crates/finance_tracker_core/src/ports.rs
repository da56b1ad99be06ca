//! crates/finance_tracker_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;

use crate::domain::{
    AttachmentMeta, ExtractionCandidate, FileExtraction, MailMessage, NewReceipt,
    NewReceiptProduct, NewTransaction, OutlookConnection, Receipt, ReceiptProduct, TokenSet,
    Transaction, User, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Aggregated spending for one product category, used by the dashboard.
#[derive(Debug, Clone)]
pub struct CategoryTotal {
    pub category: String,
    pub amount: f64,
}

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    async fn create_user(&self, username: &str, hashed_password: &str) -> PortResult<User>;

    async fn get_user_by_username(&self, username: &str) -> PortResult<UserCredentials>;

    async fn get_user(&self, user_id: i64) -> PortResult<User>;

    // --- Auth Sessions ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<i64>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Receipts ---

    /// Persists one receipt and all of its products in a single unit of work.
    /// A failure at any write rolls back this receipt only; receipts already
    /// committed by earlier calls stay committed.
    async fn create_receipt_with_products(
        &self,
        receipt: NewReceipt,
        products: Vec<NewReceiptProduct>,
    ) -> PortResult<i64>;

    async fn list_receipts(&self, user_id: i64, offset: i64, limit: i64)
        -> PortResult<Vec<Receipt>>;

    async fn get_receipt(&self, user_id: i64, receipt_id: i64) -> PortResult<Receipt>;

    async fn get_receipt_products(&self, receipt_id: i64) -> PortResult<Vec<ReceiptProduct>>;

    /// Deletes a receipt and, by cascade, its products.
    async fn delete_receipt(&self, user_id: i64, receipt_id: i64) -> PortResult<()>;

    /// Point-in-time snapshot of every dedup filename already ingested for
    /// this user. Used by the duplicate filter before download and again
    /// before persistence.
    async fn processed_filenames(&self, user_id: i64) -> PortResult<HashSet<String>>;

    // --- Transactions ---
    async fn create_transaction(
        &self,
        user_id: i64,
        transaction: NewTransaction,
    ) -> PortResult<Transaction>;

    async fn list_transactions(&self, user_id: i64) -> PortResult<Vec<Transaction>>;

    /// Replaces every mutable field of one transaction the user owns.
    async fn update_transaction(
        &self,
        user_id: i64,
        transaction_id: i64,
        transaction: NewTransaction,
    ) -> PortResult<Transaction>;

    async fn delete_transaction(&self, user_id: i64, transaction_id: i64) -> PortResult<()>;

    // --- Dashboard ---
    async fn receipts_between(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PortResult<Vec<Receipt>>;

    async fn category_totals_between(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
        limit: i64,
    ) -> PortResult<Vec<CategoryTotal>>;

    // --- Outlook Connection ---
    async fn get_outlook_connection(&self, user_id: i64) -> PortResult<OutlookConnection>;

    async fn store_outlook_state(&self, user_id: i64, state: &str) -> PortResult<()>;

    async fn store_outlook_tokens(
        &self,
        user_id: i64,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn clear_outlook_connection(&self, user_id: i64) -> PortResult<()>;

    async fn touch_outlook_last_sync(&self, user_id: i64, when: DateTime<Utc>) -> PortResult<()>;
}

#[async_trait]
pub trait ReceiptExtractionService: Send + Sync {
    /// Submits one chunk of files to the external PDF-extraction API and
    /// returns one outcome per input file, in input order.
    ///
    /// This never fails as a whole: a transport error, non-200 status, or
    /// malformed response marks every file in the chunk as `Failed` with a
    /// uniform message. Chunking to a bounded size is the caller's job.
    async fn extract_batch(&self, files: &[ExtractionCandidate]) -> Vec<FileExtraction>;
}

#[async_trait]
pub trait MailboxService: Send + Sync {
    /// Builds the user-facing authorization URL for connecting the mailbox.
    fn authorization_url(&self, state: &str) -> PortResult<String>;

    /// Exchanges an authorization code for tokens.
    async fn exchange_code(&self, code: &str) -> PortResult<TokenSet>;

    /// Searches the mailbox for messages from one sender that carry
    /// attachments.
    async fn search_messages(
        &self,
        access_token: &str,
        sender: &str,
    ) -> PortResult<Vec<MailMessage>>;

    /// Lists attachment metadata for one message without downloading any
    /// content, so known files can be skipped before download.
    async fn list_attachments(
        &self,
        access_token: &str,
        message_id: &str,
    ) -> PortResult<Vec<AttachmentMeta>>;

    /// Downloads the raw bytes of one attachment.
    async fn download_attachment(
        &self,
        access_token: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> PortResult<Vec<u8>>;
}
