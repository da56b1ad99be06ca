pub mod dates;
pub mod dedup;
pub mod domain;
pub mod pipeline;
pub mod ports;
pub mod progress;
pub mod totals;

pub use domain::{
    ExtractionCandidate, FileExtraction, IngestOutcome, NewReceipt, NewReceiptProduct,
    OutlookConnection, Receipt, ReceiptProduct, Transaction, User, UserCredentials,
};
pub use pipeline::{summarize, IngestSummary, ReceiptIngestionPipeline};
pub use ports::{
    DatabaseService, MailboxService, PortError, PortResult, ReceiptExtractionService,
};
pub use progress::{SyncProgress, SyncProgressRegistry, SyncStatus};
