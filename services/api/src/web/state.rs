//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use finance_tracker_core::pipeline::ReceiptIngestionPipeline;
use finance_tracker_core::ports::{DatabaseService, MailboxService, ReceiptExtractionService};
use finance_tracker_core::progress::SyncProgressRegistry;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub extractor: Arc<dyn ReceiptExtractionService>,
    /// `None` when the Outlook OAuth application is not configured; the
    /// mailbox endpoints answer 400 in that case.
    pub mailbox: Option<Arc<dyn MailboxService>>,
    pub config: Arc<Config>,
    /// Advisory sync progress, process-wide and lost on restart.
    pub progress: Arc<SyncProgressRegistry>,
}

impl AppState {
    /// Builds an ingestion pipeline over this state's ports.
    pub fn pipeline(&self) -> ReceiptIngestionPipeline {
        ReceiptIngestionPipeline::new(self.db.clone(), self.extractor.clone())
    }
}

/// The authenticated user's id, inserted into request extensions by the
/// auth middleware.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub i64);
