//! services/api/src/web/transactions.rs
//!
//! CRUD for manually logged income/expense entries.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use finance_tracker_core::domain::NewTransaction;
use finance_tracker_core::ports::PortError;
use std::sync::Arc;
use tracing::error;

use crate::web::state::{AppState, CurrentUser};

type HandlerError = (StatusCode, String);

/// POST /transactions
pub async fn create_transaction_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Json(req): Json<NewTransaction>,
) -> Result<impl IntoResponse, HandlerError> {
    let transaction = state
        .db
        .create_transaction(user_id, req)
        .await
        .map_err(|e| {
            error!("Failed to create transaction: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create transaction".to_string(),
            )
        })?;

    Ok((StatusCode::CREATED, Json(transaction)))
}

/// GET /transactions
pub async fn list_transactions_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, HandlerError> {
    let transactions = state.db.list_transactions(user_id).await.map_err(|e| {
        error!("Failed to list transactions: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to list transactions".to_string(),
        )
    })?;

    Ok(Json(transactions))
}

/// PUT /transactions/{id}
pub async fn update_transaction_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(transaction_id): Path<i64>,
    Json(req): Json<NewTransaction>,
) -> Result<impl IntoResponse, HandlerError> {
    match state
        .db
        .update_transaction(user_id, transaction_id, req)
        .await
    {
        Ok(transaction) => Ok(Json(transaction)),
        Err(PortError::NotFound(_)) => {
            Err((StatusCode::NOT_FOUND, "Transaction not found".to_string()))
        }
        Err(e) => {
            error!("Failed to update transaction: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to update transaction".to_string(),
            ))
        }
    }
}

/// DELETE /transactions/{id}
pub async fn delete_transaction_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(transaction_id): Path<i64>,
) -> Result<impl IntoResponse, HandlerError> {
    match state.db.delete_transaction(user_id, transaction_id).await {
        Ok(()) => Ok(Json(
            serde_json::json!({ "message": "Transaction deleted successfully" }),
        )),
        Err(PortError::NotFound(_)) => {
            Err((StatusCode::NOT_FOUND, "Transaction not found".to_string()))
        }
        Err(e) => {
            error!("Failed to delete transaction: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to delete transaction".to_string(),
            ))
        }
    }
}
