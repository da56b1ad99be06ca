//! services/api/src/web/mod.rs

use utoipa::OpenApi;

pub mod auth;
pub mod dashboard;
pub mod middleware;
pub mod outlook;
pub mod receipts;
pub mod state;
pub mod transactions;

pub use middleware::require_auth;
pub use state::AppState;

/// OpenAPI document served by the Swagger UI. Only the endpoints with
/// non-obvious contracts are annotated; CRUD routes are self-describing.
#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register_handler,
        auth::login_handler,
        receipts::upload_receipts_handler,
        outlook::sync_handler,
    ),
    components(schemas(
        auth::RegisterRequest,
        auth::LoginRequest,
        auth::AuthResponse,
        outlook::CodeExchangeRequest,
        outlook::SyncResponse,
        dashboard::CategorySpending,
        dashboard::DashboardSummary,
    )),
    info(
        title = "Finance Tracker API",
        description = "Receipt ingestion, Outlook sync, transactions and spending summaries."
    )
)]
pub struct ApiDoc;
