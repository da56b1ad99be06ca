//! services/api/tests/ingestion.rs
//!
//! End-to-end ingestion tests over a real in-memory SQLite database and a
//! scripted extraction service.

use api_lib::adapters::db::DbAdapter;
use async_trait::async_trait;
use finance_tracker_core::domain::{ExtractionCandidate, FileExtraction};
use finance_tracker_core::pipeline::{ReceiptIngestionPipeline, EXTRACTION_BATCH_SIZE};
use finance_tracker_core::ports::{DatabaseService, ReceiptExtractionService};
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Extraction stub: answers from a per-file script, falling back to a valid
/// payload, and records the size of every batch it receives.
struct FakeExtractor {
    scripted: HashMap<String, FileExtraction>,
    batch_sizes: Mutex<Vec<usize>>,
}

impl FakeExtractor {
    fn new() -> Self {
        Self {
            scripted: HashMap::new(),
            batch_sizes: Mutex::new(Vec::new()),
        }
    }

    fn script(mut self, filename: &str, extraction: FileExtraction) -> Self {
        self.scripted.insert(filename.to_string(), extraction);
        self
    }

    fn sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReceiptExtractionService for FakeExtractor {
    async fn extract_batch(&self, files: &[ExtractionCandidate]) -> Vec<FileExtraction> {
        self.batch_sizes.lock().unwrap().push(files.len());
        files
            .iter()
            .map(|f| {
                self.scripted
                    .get(&f.original_filename)
                    .cloned()
                    .unwrap_or_else(|| FileExtraction::Extracted(valid_payload()))
            })
            .collect()
    }
}

fn valid_payload() -> serde_json::Value {
    serde_json::json!({
        "market": "Pingo Doce",
        "branch": "Lisboa",
        "invoice": "FT 1/001",
        "total": 20.0,
        "total_discount": 2.0,
        "total_paid": 18.0,
        "date": "17/09/2024",
        "products": [
            {
                "product_type": "Groceries",
                "product": "Milk",
                "quantity": 2.0,
                "price": 1.5,
                "discount": 0.0,
                "discount2": 0.0
            }
        ]
    })
}

fn candidate(name: &str) -> ExtractionCandidate {
    ExtractionCandidate {
        filename: name.to_string(),
        original_filename: name.to_string(),
        content: b"%PDF-1.4".to_vec(),
    }
}

/// Fresh in-memory database with migrations applied and one user created.
async fn setup(extractor: Arc<dyn ReceiptExtractionService>) -> (Arc<DbAdapter>, ReceiptIngestionPipeline, i64) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let db = Arc::new(DbAdapter::new(pool));
    db.run_migrations().await.unwrap();
    let user = db.create_user("alice", "not-a-real-hash").await.unwrap();
    let pipeline = ReceiptIngestionPipeline::new(db.clone(), extractor);
    (db, pipeline, user.id)
}

#[tokio::test]
async fn one_bad_file_does_not_sink_the_batch() {
    let mut bad = valid_payload();
    bad.as_object_mut().unwrap().remove("total");

    let extractor = Arc::new(
        FakeExtractor::new().script("b.pdf", FileExtraction::Extracted(bad)),
    );
    let (db, pipeline, user_id) = setup(extractor).await;

    let candidates = vec![candidate("a.pdf"), candidate("b.pdf"), candidate("c.pdf")];
    let outcomes = pipeline.run(&candidates, user_id).await;

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].success);
    assert!(!outcomes[1].success);
    assert!(outcomes[1].message.contains("Missing: total"));
    assert!(outcomes[2].success);

    let receipts = db.list_receipts(user_id, 0, 100).await.unwrap();
    assert_eq!(receipts.len(), 2);
}

#[tokio::test]
async fn rerun_skips_already_processed_files() {
    let extractor = Arc::new(FakeExtractor::new());
    let (db, pipeline, user_id) = setup(extractor).await;

    let candidates = vec![candidate("a.pdf"), candidate("b.pdf")];
    let first = pipeline.run(&candidates, user_id).await;
    assert!(first.iter().all(|o| o.success));

    let second = pipeline.run(&candidates, user_id).await;
    assert!(second.iter().all(|o| !o.success));
    assert!(second
        .iter()
        .all(|o| o.message.contains("already processed")));

    let receipts = db.list_receipts(user_id, 0, 100).await.unwrap();
    assert_eq!(receipts.len(), 2);
}

#[tokio::test]
async fn duplicate_within_one_batch_is_skipped_not_errored() {
    let extractor = Arc::new(FakeExtractor::new());
    let (db, pipeline, user_id) = setup(extractor).await;

    let candidates = vec![candidate("same.pdf"), candidate("same.pdf")];
    let outcomes = pipeline.run(&candidates, user_id).await;

    assert!(outcomes[0].success);
    assert!(!outcomes[1].success);
    assert!(outcomes[1].message.contains("already processed"));

    let receipts = db.list_receipts(user_id, 0, 100).await.unwrap();
    assert_eq!(receipts.len(), 1);
}

#[tokio::test]
async fn unparseable_date_fails_that_file_only() {
    let mut bad = valid_payload();
    bad["date"] = serde_json::json!("31/31/2024");

    let extractor = Arc::new(
        FakeExtractor::new().script("bad-date.pdf", FileExtraction::Extracted(bad)),
    );
    let (db, pipeline, user_id) = setup(extractor).await;

    let candidates = vec![candidate("ok.pdf"), candidate("bad-date.pdf")];
    let outcomes = pipeline.run(&candidates, user_id).await;

    assert!(outcomes[0].success);
    assert!(!outcomes[1].success);
    assert!(outcomes[1].message.contains("Invalid date format"));
    assert!(outcomes[1].message.contains("31/31/2024"));

    let receipts = db.list_receipts(user_id, 0, 100).await.unwrap();
    assert_eq!(receipts.len(), 1);
}

#[tokio::test]
async fn extraction_failure_carries_the_service_message() {
    let extractor = Arc::new(FakeExtractor::new().script(
        "broken.pdf",
        FileExtraction::Failed("corrupt PDF structure".to_string()),
    ));
    let (_db, pipeline, user_id) = setup(extractor).await;

    let outcomes = pipeline.run(&[candidate("broken.pdf")], user_id).await;
    assert!(!outcomes[0].success);
    assert!(outcomes[0].message.contains("Extraction failed"));
    assert!(outcomes[0].message.contains("corrupt PDF structure"));
}

#[tokio::test]
async fn large_runs_are_chunked_at_the_batch_size() {
    let extractor = Arc::new(FakeExtractor::new());
    let sizes_handle = extractor.clone();
    let (db, pipeline, user_id) = setup(extractor).await;

    let candidates: Vec<_> = (0..25).map(|i| candidate(&format!("f{i:02}.pdf"))).collect();
    let outcomes = pipeline.run(&candidates, user_id).await;

    assert_eq!(outcomes.len(), 25);
    assert!(outcomes.iter().all(|o| o.success));
    assert_eq!(
        sizes_handle.sizes(),
        vec![EXTRACTION_BATCH_SIZE, EXTRACTION_BATCH_SIZE, 5]
    );

    let receipts = db.list_receipts(user_id, 0, 100).await.unwrap();
    assert_eq!(receipts.len(), 25);
}

#[tokio::test]
async fn persisted_totals_stay_reconciled() {
    // total omitted: it must be rebuilt from the product lines, and the
    // stored row must satisfy total - total_discount == total_paid.
    let payload = serde_json::json!({
        "market": "Continente",
        "branch": "Porto",
        "total": null,
        "total_discount": null,
        "total_paid": 4.5,
        "date": "2024-09-17",
        "products": [
            { "product_type": "Groceries", "product": "Bread", "quantity": 2.0, "price": 1.0 },
            { "product_type": "Groceries", "product": "Cheese", "quantity": 1.0, "price": 3.0 }
        ]
    });

    let extractor = Arc::new(
        FakeExtractor::new().script("r.pdf", FileExtraction::Extracted(payload)),
    );
    let (db, pipeline, user_id) = setup(extractor).await;

    let outcomes = pipeline.run(&[candidate("r.pdf")], user_id).await;
    assert!(outcomes[0].success, "{}", outcomes[0].message);

    let receipts = db.list_receipts(user_id, 0, 100).await.unwrap();
    let receipt = &receipts[0];
    assert_eq!(receipt.total, 5.0);
    assert_eq!(receipt.total_discount, 0.5);
    assert_eq!(receipt.total_paid, 4.5);
    assert!((receipt.total - receipt.total_discount - receipt.total_paid).abs() < 1e-9);

    let products = db.get_receipt_products(receipt.id).await.unwrap();
    assert_eq!(products.len(), 2);
}
