//! services/api/src/web/receipts.rs
//!
//! Receipt endpoints: interactive multipart upload into the ingestion
//! pipeline, listing/detail/delete, and CSV export.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use finance_tracker_core::domain::{ExtractionCandidate, IngestOutcome, Receipt, ReceiptProduct};
use finance_tracker_core::pipeline::is_pdf_filename;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::web::state::{AppState, CurrentUser};

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

#[derive(Serialize)]
pub struct ReceiptDetail {
    #[serde(flatten)]
    pub receipt: Receipt,
    pub products: Vec<ReceiptProduct>,
}

//=========================================================================================
// Upload Entrypoint
//=========================================================================================

/// One submitted file, either rejected up front or queued for extraction.
enum UploadSlot {
    Rejected(IngestOutcome),
    Candidate(usize),
}

/// POST /receipts/upload - Upload one or more PDF receipts.
///
/// Always answers 200 with one outcome per submitted file, in submission
/// order; callers must inspect each outcome's success flag. Non-PDF names
/// are rejected per file without touching the extraction service.
#[utoipa::path(
    post,
    path = "/receipts/upload",
    request_body(content_type = "multipart/form-data", description = "PDF receipt files."),
    responses(
        (status = 200, description = "One outcome per submitted file"),
        (status = 400, description = "Malformed multipart request")
    )
)]
pub async fn upload_receipts_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut slots: Vec<UploadSlot> = Vec::new();
    let mut candidates: Vec<ExtractionCandidate> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read multipart data: {e}"),
        )
    })? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        if !is_pdf_filename(&file_name) {
            slots.push(UploadSlot::Rejected(IngestOutcome::failure(format!(
                "File {file_name} is not a PDF. Only PDF files are allowed."
            ))));
            continue;
        }

        let data = field.bytes().await.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read file bytes: {e}"),
            )
        })?;
        info!(file = %file_name, size = data.len(), "read uploaded file");

        slots.push(UploadSlot::Candidate(candidates.len()));
        candidates.push(ExtractionCandidate {
            // Interactive uploads have no mail timestamp; the display name
            // doubles as the dedup key.
            filename: file_name.clone(),
            original_filename: file_name,
            content: data.to_vec(),
        });
    }

    if slots.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Multipart form must include at least one file".to_string(),
        ));
    }

    let outcomes = state.pipeline().run(&candidates, user_id).await;

    let results: Vec<IngestOutcome> = slots
        .into_iter()
        .map(|slot| match slot {
            UploadSlot::Rejected(outcome) => outcome,
            UploadSlot::Candidate(index) => outcomes[index].clone(),
        })
        .collect();

    Ok(Json(results))
}

//=========================================================================================
// Listing / Detail / Delete
//=========================================================================================

/// GET /receipts - List the user's receipts.
pub async fn list_receipts_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let receipts = state
        .db
        .list_receipts(user_id, params.skip, params.limit)
        .await
        .map_err(|e| {
            error!("Failed to list receipts: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list receipts".to_string(),
            )
        })?;
    Ok(Json(receipts))
}

/// GET /receipts/{id} - One receipt with its products.
pub async fn get_receipt_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(receipt_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let receipt = state
        .db
        .get_receipt(user_id, receipt_id)
        .await
        .map_err(|_| (StatusCode::NOT_FOUND, "Receipt not found".to_string()))?;
    let products = state
        .db
        .get_receipt_products(receipt_id)
        .await
        .map_err(|e| {
            error!("Failed to load receipt products: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load receipt".to_string(),
            )
        })?;
    Ok(Json(ReceiptDetail { receipt, products }))
}

/// DELETE /receipts/{id} - Delete a receipt and its products.
pub async fn delete_receipt_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(receipt_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .db
        .delete_receipt(user_id, receipt_id)
        .await
        .map_err(|_| (StatusCode::NOT_FOUND, "Receipt not found".to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// CSV Export
//=========================================================================================

/// Encodes one receipt's products into a single CSV column:
/// fields joined with `|`, items joined with `;`.
fn encode_products(products: &[ReceiptProduct]) -> String {
    products
        .iter()
        .map(|p| {
            format!(
                "{}|{}|{}|{}|{}|{}",
                p.product_type, p.product, p.quantity, p.price, p.discount, p.discount2
            )
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// GET /receipts/export/csv - All receipts as CSV, one row per receipt.
pub async fn export_receipts_csv_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let export_error = |e: &dyn std::fmt::Debug| {
        error!("CSV export failed: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to export receipts".to_string(),
        )
    };

    let receipts = state
        .db
        .list_receipts(user_id, 0, i64::MAX)
        .await
        .map_err(|e| export_error(&e))?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "id",
            "date",
            "market",
            "branch",
            "invoice",
            "total",
            "total_discount",
            "total_paid",
            "products",
        ])
        .map_err(|e| export_error(&e))?;

    for receipt in &receipts {
        let products = state
            .db
            .get_receipt_products(receipt.id)
            .await
            .map_err(|e| export_error(&e))?;
        writer
            .write_record([
                receipt.id.to_string(),
                receipt.date.to_string(),
                receipt.market.clone(),
                receipt.branch.clone(),
                receipt.invoice.clone().unwrap_or_default(),
                format!("{:.2}", receipt.total),
                format!("{:.2}", receipt.total_discount),
                format!("{:.2}", receipt.total_paid),
                encode_products(&products),
            ])
            .map_err(|e| export_error(&e))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| export_error(&e))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"receipts.csv\"".to_string(),
            ),
        ],
        bytes,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn products_encode_into_one_column() {
        let products = vec![
            ReceiptProduct {
                id: 1,
                receipt_id: 1,
                product_type: "Groceries".to_string(),
                product: "Milk".to_string(),
                quantity: 2.0,
                price: 1.25,
                discount: 0.0,
                discount2: 0.0,
            },
            ReceiptProduct {
                id: 2,
                receipt_id: 1,
                product_type: "Bakery".to_string(),
                product: "Bread".to_string(),
                quantity: 1.0,
                price: 2.5,
                discount: 0.5,
                discount2: 0.0,
            },
        ];
        assert_eq!(
            encode_products(&products),
            "Groceries|Milk|2|1.25|0|0;Bakery|Bread|1|2.5|0.5|0"
        );
    }

    #[test]
    fn empty_product_list_encodes_to_empty_string() {
        assert_eq!(encode_products(&[]), "");
    }
}
