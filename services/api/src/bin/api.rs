//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{db::DbAdapter, extractor::HttpExtractorAdapter, outlook::GraphMailAdapter},
    config::Config,
    error::ApiError,
    web::{
        auth::{login_handler, logout_handler, me_handler, register_handler},
        dashboard::summary_handler,
        middleware::require_auth,
        outlook::{
            auth_url_handler, callback_handler, disconnect_handler, exchange_code_handler,
            status_handler, sync_handler, sync_progress_handler,
        },
        receipts::{
            delete_receipt_handler, export_receipts_csv_handler, get_receipt_handler,
            list_receipts_handler, upload_receipts_handler,
        },
        state::AppState,
        transactions::{
            create_transaction_handler, delete_transaction_handler, list_transactions_handler,
            update_transaction_handler,
        },
        ApiDoc,
    },
};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use finance_tracker_core::ports::MailboxService;
use finance_tracker_core::progress::SyncProgressRegistry;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            config.log_level.to_string(),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let extractor = Arc::new(HttpExtractorAdapter::new(
        config.extractor_url.clone(),
        config.extractor_timeout_secs,
    )?);

    let mailbox: Option<Arc<dyn MailboxService>> =
        match (&config.outlook_client_id, &config.outlook_redirect_uri) {
            (Some(client_id), Some(redirect_uri)) => Some(Arc::new(GraphMailAdapter::new(
                reqwest::Client::new(),
                client_id.clone(),
                config.outlook_tenant_id.clone(),
                redirect_uri.clone(),
            ))),
            _ => {
                warn!("OUTLOOK_CLIENT_ID/OUTLOOK_REDIRECT_URI not set; mailbox sync disabled");
                None
            }
        };

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        db: db_adapter,
        extractor,
        mailbox,
        config: config.clone(),
        progress: Arc::new(SyncProgressRegistry::new()),
    });

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .frontend_url
                .parse::<HeaderValue>()
                .map_err(|e| ApiError::Internal(format!("Invalid FRONTEND_URL: {e}")))?,
        )
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Public routes (no auth required). The OAuth callback must stay public
    // because Microsoft redirects the browser here without our cookie.
    let public_routes = Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/outlook/callback", get(callback_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/me", get(me_handler))
        .route("/receipts/upload", post(upload_receipts_handler))
        .route("/receipts", get(list_receipts_handler))
        .route("/receipts/export/csv", get(export_receipts_csv_handler))
        .route(
            "/receipts/{id}",
            get(get_receipt_handler).delete(delete_receipt_handler),
        )
        .route("/outlook/auth-url", get(auth_url_handler))
        .route("/outlook/exchange-code", post(exchange_code_handler))
        .route("/outlook/status", get(status_handler))
        .route("/outlook/disconnect", post(disconnect_handler))
        .route("/outlook/sync", post(sync_handler))
        .route("/outlook/sync-progress", get(sync_progress_handler))
        .route(
            "/transactions",
            get(list_transactions_handler).post(create_transaction_handler),
        )
        .route(
            "/transactions/{id}",
            put(update_transaction_handler).delete(delete_transaction_handler),
        )
        .route("/dashboard/summary", get(summary_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes. Uploads carry multiple PDFs, so allow a larger body.
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024))
        .layer(cors)
        .with_state(app_state);

    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
