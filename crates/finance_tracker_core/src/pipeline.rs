//! crates/finance_tracker_core/src/pipeline.rs
//!
//! The receipt ingestion pipeline: turns heterogeneous, partially-null
//! extraction results into persisted receipts with consistent totals.
//!
//! Batch semantics: one unit of work per candidate, committed immediately,
//! so one bad record never voids good records already written in the same
//! call. Every internal error is captured as a per-file outcome; nothing
//! here propagates an error to the caller.

use std::sync::Arc;

use tracing::{info, warn};

use crate::dates::{parse_receipt_date, SUPPORTED_FORMATS};
use crate::domain::{
    ExtractedReceipt, ExtractionCandidate, FileExtraction, IngestOutcome, NewReceipt,
    NewReceiptProduct,
};
use crate::ports::{DatabaseService, ReceiptExtractionService};
use crate::totals::{normalize, RawTotals};

/// Files per extraction call. The batch endpoint is slow and unbounded
/// requests time out, so large candidate sets are chunked; chunks run
/// strictly one after another.
pub const EXTRACTION_BATCH_SIZE: usize = 10;

/// How many error messages a summary quotes verbatim before collapsing the
/// rest into a remaining count.
pub const MAX_SUMMARY_ERRORS: usize = 3;

/// Keys an extracted payload must carry before typed decoding is attempted.
/// Presence is what is checked: a key that is present but null passes here
/// and is resolved (or rejected) by later stages.
const REQUIRED_KEYS: [&str; 7] = [
    "market",
    "branch",
    "total",
    "total_discount",
    "total_paid",
    "date",
    "products",
];

pub struct ReceiptIngestionPipeline {
    db: Arc<dyn DatabaseService>,
    extractor: Arc<dyn ReceiptExtractionService>,
}

impl ReceiptIngestionPipeline {
    pub fn new(db: Arc<dyn DatabaseService>, extractor: Arc<dyn ReceiptExtractionService>) -> Self {
        Self { db, extractor }
    }

    /// Extracts and ingests every candidate, chunked at
    /// [`EXTRACTION_BATCH_SIZE`] files per extraction call. Outcomes come
    /// back in candidate order, one per input.
    pub async fn run(
        &self,
        candidates: &[ExtractionCandidate],
        user_id: i64,
    ) -> Vec<IngestOutcome> {
        let mut outcomes = Vec::with_capacity(candidates.len());
        let total_chunks = candidates.len().div_ceil(EXTRACTION_BATCH_SIZE);

        for (index, chunk) in candidates.chunks(EXTRACTION_BATCH_SIZE).enumerate() {
            info!(
                chunk = index + 1,
                total_chunks,
                files = chunk.len(),
                "submitting extraction chunk"
            );
            let extractions = self.extractor.extract_batch(chunk).await;
            outcomes.extend(self.ingest_batch(chunk, extractions, user_id).await);
        }

        outcomes
    }

    /// Ingests one chunk of candidates against their already-obtained
    /// extraction results. Results are aligned positionally; when the
    /// extractor returned fewer results than inputs, only the unmatched
    /// tail fails.
    pub async fn ingest_batch(
        &self,
        candidates: &[ExtractionCandidate],
        extractions: Vec<FileExtraction>,
        user_id: i64,
    ) -> Vec<IngestOutcome> {
        // Persistence-time duplicate safety net: a fresh snapshot, since the
        // pre-download check may have raced a concurrent sync.
        let mut processed = match self.db.processed_filenames(user_id).await {
            Ok(set) => set,
            Err(e) => {
                warn!("could not load processed filenames: {e}");
                return candidates
                    .iter()
                    .map(|c| {
                        IngestOutcome::failure(format!(
                            "Failed to process receipt {}: {}",
                            c.original_filename, e
                        ))
                    })
                    .collect();
            }
        };

        let mut extractions = extractions.into_iter();
        let mut outcomes = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let extraction = extractions.next().unwrap_or_else(|| {
                FileExtraction::Failed("no result returned by extraction service".to_string())
            });

            let outcome = self
                .ingest_one(candidate, extraction, user_id, &processed)
                .await;
            if outcome.success {
                // Also guards against the same file appearing twice in one
                // batch: the second occurrence becomes a duplicate skip
                // instead of a unique-constraint rollback.
                processed.insert(candidate.filename.clone());
            }
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn ingest_one(
        &self,
        candidate: &ExtractionCandidate,
        extraction: FileExtraction,
        user_id: i64,
        processed: &std::collections::HashSet<String>,
    ) -> IngestOutcome {
        let display_name = &candidate.original_filename;

        let payload = match extraction {
            FileExtraction::Extracted(value) => value,
            FileExtraction::Failed(message) => {
                return IngestOutcome::failure(format!(
                    "Extraction failed for {display_name}: {message}"
                ));
            }
        };

        if processed.contains(&candidate.filename) {
            return IngestOutcome::failure(format!(
                "Receipt {display_name} already processed, skipping"
            ));
        }

        let missing: Vec<&str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| payload.get(key).is_none())
            .collect();
        if !missing.is_empty() {
            return IngestOutcome::failure_with_data(
                format!(
                    "Incomplete receipt data extracted from {display_name}. Missing: {}",
                    missing.join(", ")
                ),
                payload,
            );
        }

        let receipt: ExtractedReceipt = match serde_json::from_value(payload.clone()) {
            Ok(receipt) => receipt,
            Err(e) => {
                return IngestOutcome::failure_with_data(
                    format!("Malformed receipt data extracted from {display_name}: {e}"),
                    payload,
                );
            }
        };

        let date = match parse_receipt_date(&receipt.date) {
            Ok(date) => date,
            Err(_) => {
                return IngestOutcome::failure_with_data(
                    format!(
                        "Invalid date format in extracted data for {display_name}: '{}' (supported: {})",
                        receipt.date,
                        SUPPORTED_FORMATS.join(", ")
                    ),
                    payload,
                );
            }
        };

        let totals = normalize(&RawTotals::from(&receipt));

        let new_receipt = NewReceipt {
            user_id,
            market: receipt.market.clone(),
            branch: receipt.branch.clone(),
            invoice: receipt.invoice.clone(),
            date,
            total: totals.total,
            total_discount: totals.total_discount,
            total_paid: totals.total_paid,
            filename: Some(candidate.filename.clone()),
        };
        let products: Vec<NewReceiptProduct> = receipt
            .products
            .iter()
            .map(|p| NewReceiptProduct {
                product_type: p.product_type.clone(),
                product: p.product.clone(),
                quantity: p.quantity,
                price: p.price,
                discount: p.discount.unwrap_or(0.0),
                discount2: p.discount2.unwrap_or(0.0),
            })
            .collect();

        match self
            .db
            .create_receipt_with_products(new_receipt, products)
            .await
        {
            Ok(receipt_id) => {
                info!(receipt_id, file = %display_name, "receipt ingested");
                IngestOutcome::success(
                    receipt_id,
                    format!("Receipt {display_name} uploaded and processed successfully"),
                    payload,
                )
            }
            Err(e) => {
                warn!(file = %display_name, "receipt persistence failed: {e}");
                IngestOutcome::failure(format!("Failed to process receipt {display_name}: {e}"))
            }
        }
    }
}

/// Aggregate view of one batch run, for the sync endpoints.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestSummary {
    pub message: String,
    pub processed: usize,
    pub skipped: usize,
}

/// Collapses per-file outcomes into `{message, processed, skipped}`.
///
/// `already_skipped` counts files the caller dropped before the pipeline
/// ever saw them (the pre-download duplicate check); `harvest_errors` are
/// failures from gathering the files (mailbox search, download). At most
/// [`MAX_SUMMARY_ERRORS`] error messages are quoted; the rest become a
/// remaining count.
pub fn summarize(
    outcomes: &[IngestOutcome],
    already_skipped: usize,
    harvest_errors: &[String],
) -> IngestSummary {
    let processed = outcomes.iter().filter(|o| o.success).count();
    let skipped = outcomes.len() - processed + already_skipped;
    let errors: Vec<&str> = harvest_errors
        .iter()
        .map(String::as_str)
        .chain(
            outcomes
                .iter()
                .filter(|o| !o.success)
                .map(|o| o.message.as_str()),
        )
        .collect();

    let mut message = format!("Processed {processed} receipts from Outlook");
    if skipped > 0 {
        message.push_str(&format!(", skipped {skipped}"));
    }
    if !errors.is_empty() {
        message.push_str(&format!(
            ". Errors: {}",
            errors[..errors.len().min(MAX_SUMMARY_ERRORS)].join("; ")
        ));
        if errors.len() > MAX_SUMMARY_ERRORS {
            message.push_str(&format!(" (and {} more)", errors.len() - MAX_SUMMARY_ERRORS));
        }
    }

    IngestSummary {
        message,
        processed,
        skipped,
    }
}

/// Extension check for interactive uploads. The extractor only handles
/// PDFs, so anything else is rejected per file before any network call.
pub fn is_pdf_filename(name: &str) -> bool {
    name.to_lowercase().ends_with(".pdf")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(id: i64) -> IngestOutcome {
        IngestOutcome::success(
            id,
            format!("Receipt r{id}.pdf processed"),
            serde_json::Value::Null,
        )
    }

    fn fail(msg: &str) -> IngestOutcome {
        IngestOutcome::failure(msg.to_string())
    }

    #[test]
    fn summary_counts_successes_and_skips() {
        let summary = summarize(&[ok(1), fail("bad date"), ok(2)], 0, &[]);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.skipped, 1);
        assert!(summary.message.contains("Processed 2 receipts"));
        assert!(summary.message.contains("skipped 1"));
        assert!(summary.message.contains("bad date"));
    }

    #[test]
    fn summary_caps_quoted_errors_at_three() {
        let outcomes: Vec<_> = (0..5).map(|i| fail(&format!("error {i}"))).collect();
        let summary = summarize(&outcomes, 0, &[]);
        assert_eq!(summary.skipped, 5);
        assert!(summary.message.contains("error 0"));
        assert!(summary.message.contains("error 2"));
        assert!(!summary.message.contains("error 3"));
        assert!(summary.message.contains("(and 2 more)"));
    }

    #[test]
    fn clean_run_has_no_error_suffix() {
        let summary = summarize(&[ok(1), ok(2)], 0, &[]);
        assert!(!summary.message.contains("Errors"));
        assert_eq!(summary.skipped, 0);
    }

    #[test]
    fn pre_skips_and_harvest_errors_fold_into_the_summary() {
        let summary = summarize(&[ok(1)], 4, &["Sender x: timeout".to_string()]);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped, 4);
        assert!(summary.message.contains("skipped 4"));
        assert!(summary.message.contains("Sender x: timeout"));
    }

    #[test]
    fn pdf_extension_check_is_case_insensitive() {
        assert!(is_pdf_filename("Fatura.PDF"));
        assert!(is_pdf_filename("a.pdf"));
        assert!(!is_pdf_filename("a.pdf.txt"));
        assert!(!is_pdf_filename("notes.docx"));
    }
}
