//! services/api/src/web/outlook.rs
//!
//! Outlook connection endpoints and the mailbox sync sweep:
//! search senders -> pre-download duplicate filter -> download attachments ->
//! chunked extraction/ingestion -> summary, with coarse progress published
//! to the in-process registry along the way.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    Extension, Json,
};
use chrono::{Duration, Utc};
use finance_tracker_core::dedup;
use finance_tracker_core::domain::{AttachmentMeta, ExtractionCandidate, OutlookConnection};
use finance_tracker_core::pipeline::summarize;
use finance_tracker_core::ports::MailboxService;
use finance_tracker_core::progress::SyncStatus;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::state::{AppState, CurrentUser};

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CodeExchangeRequest {
    pub code: String,
    pub state: String,
}

#[derive(Deserialize)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

#[derive(Serialize, ToSchema)]
pub struct SyncResponse {
    pub message: String,
    pub processed: usize,
    pub skipped: usize,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub connected: bool,
    pub expires: Option<String>,
    pub last_sync: Option<String>,
}

type HandlerError = (StatusCode, String);

fn mailbox_of(state: &AppState) -> Result<Arc<dyn MailboxService>, HandlerError> {
    state.mailbox.clone().ok_or((
        StatusCode::BAD_REQUEST,
        "Outlook integration is not configured".to_string(),
    ))
}

//=========================================================================================
// OAuth Handlers
//=========================================================================================

/// GET /outlook/auth-url - Start a fresh authorization attempt.
pub async fn auth_url_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, HandlerError> {
    let mailbox = mailbox_of(&state)?;

    let oauth_state = Uuid::new_v4().to_string();
    state
        .db
        .store_outlook_state(user_id, &oauth_state)
        .await
        .map_err(|e| {
            error!("Failed to store OAuth state: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to start authorization".to_string(),
            )
        })?;

    let auth_url = mailbox
        .authorization_url(&oauth_state)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    info!(user_id, "generated Outlook authorization URL");
    Ok(Json(
        serde_json::json!({ "auth_url": auth_url, "state": oauth_state }),
    ))
}

/// POST /outlook/exchange-code - Exchange the authorization code for tokens.
pub async fn exchange_code_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Json(req): Json<CodeExchangeRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let mailbox = mailbox_of(&state)?;

    let connection = state
        .db
        .get_outlook_connection(user_id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    if connection.oauth_state.as_deref() != Some(req.state.as_str()) {
        warn!(user_id, "OAuth state mismatch");
        return Err((StatusCode::BAD_REQUEST, "Invalid state".to_string()));
    }

    let tokens = mailbox
        .exchange_code(&req.code)
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let expires_at = Utc::now() + Duration::seconds(tokens.expires_in);
    state
        .db
        .store_outlook_tokens(
            user_id,
            &tokens.access_token,
            tokens.refresh_token.as_deref(),
            expires_at,
        )
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    info!(user_id, "Outlook connected");
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Outlook connected successfully"
    })))
}

/// GET /outlook/callback - OAuth redirect target; forwards to the frontend.
pub async fn callback_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    let url = format!(
        "{}/settings?code={}&state={}&outlook_callback=true",
        state.config.frontend_url, params.code, params.state
    );
    Redirect::to(&url)
}

/// GET /outlook/status - Whether a usable connection exists.
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, HandlerError> {
    let connection = state
        .db
        .get_outlook_connection(user_id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let mut connected = connection.access_token.is_some();
    if let Some(expires) = connection.token_expires {
        if expires <= Utc::now() {
            connected = false;
        }
    }

    Ok(Json(StatusResponse {
        connected,
        expires: connection.token_expires.map(|t| t.to_rfc3339()),
        last_sync: connection.last_sync.map(|t| t.to_rfc3339()),
    }))
}

/// POST /outlook/disconnect - Drop stored tokens.
pub async fn disconnect_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, HandlerError> {
    state
        .db
        .clear_outlook_connection(user_id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    info!(user_id, "Outlook disconnected");
    Ok(Json(
        serde_json::json!({ "message": "Outlook disconnected successfully" }),
    ))
}

/// GET /outlook/sync-progress - Advisory progress of the current sync.
pub async fn sync_progress_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> impl IntoResponse {
    Json(state.progress.snapshot(user_id))
}

//=========================================================================================
// Sync Sweep
//=========================================================================================

/// POST /outlook/sync - Run the full search/download/extract/ingest sweep.
#[utoipa::path(
    post,
    path = "/outlook/sync",
    responses(
        (status = 200, description = "Sync summary", body = SyncResponse),
        (status = 400, description = "Outlook not connected or sync failed")
    )
)]
pub async fn sync_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, HandlerError> {
    let mailbox = mailbox_of(&state)?;

    match run_sync(&state, mailbox, user_id).await {
        Ok(summary) => Ok(Json(summary)),
        Err(message) => {
            error!(user_id, "Outlook sync failed: {message}");
            state.progress.update(
                user_id,
                SyncStatus::Error,
                format!("Sync failed: {message}"),
                0,
                0,
            );
            Err((StatusCode::BAD_REQUEST, message))
        }
    }
}

/// Returns a valid access token or a user-actionable message. Tokens about
/// to expire (within 5 minutes) are rejected; as a public OAuth client we
/// cannot refresh silently, the user must reconnect.
fn valid_token(connection: &OutlookConnection) -> Result<String, String> {
    let token = connection
        .access_token
        .clone()
        .ok_or_else(|| "Outlook not connected".to_string())?;

    if let Some(expires) = connection.token_expires {
        if expires <= Utc::now() + Duration::minutes(5) {
            return Err(
                "Outlook token has expired. Please reconnect your Outlook account.".to_string(),
            );
        }
    }

    Ok(token)
}

/// Builds content-less candidates for one message's PDF attachments and a
/// per-key queue of attachment ids. Identically named attachments on the
/// same message share a dedup key, so each kept candidate must pop its own
/// id instead of all resolving to one.
fn pending_downloads(
    attachments: &[AttachmentMeta],
    received_date_time: Option<&str>,
) -> (Vec<ExtractionCandidate>, HashMap<String, VecDeque<String>>) {
    let mut ids: HashMap<String, VecDeque<String>> = HashMap::new();
    let mut pending = Vec::new();
    for attachment in attachments.iter().filter(|a| a.is_pdf()) {
        let key = dedup::dedup_key(&attachment.name, received_date_time);
        ids.entry(key.clone())
            .or_default()
            .push_back(attachment.id.clone());
        pending.push(ExtractionCandidate {
            filename: key,
            original_filename: attachment.name.clone(),
            content: Vec::new(),
        });
    }
    (pending, ids)
}

async fn run_sync(
    state: &Arc<AppState>,
    mailbox: Arc<dyn MailboxService>,
    user_id: i64,
) -> Result<SyncResponse, String> {
    let progress = &state.progress;
    progress.update(
        user_id,
        SyncStatus::Starting,
        "Initializing Outlook sync...",
        0,
        0,
    );

    let connection = state
        .db
        .get_outlook_connection(user_id)
        .await
        .map_err(|e| e.to_string())?;
    let token = valid_token(&connection)?;

    // Pre-download snapshot: known attachments are skipped before any
    // bytes move. The pipeline re-checks right before persistence.
    let processed = state
        .db
        .processed_filenames(user_id)
        .await
        .map_err(|e| e.to_string())?;

    let senders = &state.config.receipt_senders;
    let total_senders = senders.len();
    let mut candidates: Vec<ExtractionCandidate> = Vec::new();
    let mut errors: Vec<String> = Vec::new();
    let mut known_skipped = 0usize;

    for (sender_idx, sender) in senders.iter().enumerate() {
        let sender_label = sender.split('@').next().unwrap_or(sender);
        progress.update(
            user_id,
            SyncStatus::Searching,
            format!("Searching emails from {sender_label}..."),
            total_senders,
            sender_idx,
        );

        let messages = match mailbox.search_messages(&token, sender).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(%sender, "email search failed: {e}");
                errors.push(format!("Sender {sender}: {e}"));
                continue;
            }
        };

        if !messages.is_empty() {
            progress.update(
                user_id,
                SyncStatus::Downloading,
                format!(
                    "Found {} emails from {sender_label}, collecting attachments...",
                    messages.len()
                ),
                total_senders,
                sender_idx,
            );
        }

        for message in messages.iter().filter(|m| m.has_attachments) {
            let attachments = match mailbox.list_attachments(&token, &message.id).await {
                Ok(attachments) => attachments,
                Err(e) => {
                    warn!(subject = %message.subject, "attachment listing failed: {e}");
                    errors.push(format!("Email {}: {e}", message.subject));
                    continue;
                }
            };

            // Candidates start content-less; bytes are fetched only for the
            // ones the duplicate filter keeps.
            let (pending, mut attachment_ids) =
                pending_downloads(&attachments, message.received_date_time.as_deref());

            let (skip, keep) = dedup::partition(pending, &processed);
            known_skipped += skip.len();

            // Partition preserves order, so popping ids front-first keeps
            // each kept candidate paired with its own attachment.
            for mut candidate in keep {
                let Some(attachment_id) = attachment_ids
                    .get_mut(&candidate.filename)
                    .and_then(|queue| queue.pop_front())
                else {
                    continue;
                };
                match mailbox
                    .download_attachment(&token, &message.id, &attachment_id)
                    .await
                {
                    Ok(content) => {
                        info!(
                            file = %candidate.original_filename,
                            key = %candidate.filename,
                            "downloaded PDF attachment"
                        );
                        candidate.content = content;
                        candidates.push(candidate);
                    }
                    Err(e) => {
                        warn!(file = %candidate.original_filename, "attachment download failed: {e}");
                        errors.push(format!("{}: {e}", candidate.original_filename));
                    }
                }
            }
        }
    }

    let mut outcomes = Vec::new();
    if !candidates.is_empty() {
        progress.update(
            user_id,
            SyncStatus::Extracting,
            format!("Processing {} receipts in batches...", candidates.len()),
            total_senders,
            total_senders,
        );
        outcomes = state.pipeline().run(&candidates, user_id).await;
    }

    let summary = summarize(&outcomes, known_skipped, &errors);

    progress.update(
        user_id,
        SyncStatus::Completed,
        format!("Sync completed: {} receipts processed", summary.processed),
        total_senders,
        total_senders,
    );

    if let Err(e) = state.db.touch_outlook_last_sync(user_id, Utc::now()).await {
        warn!(user_id, "could not record last sync time: {e}");
    }

    info!(user_id, message = %summary.message, "Outlook sync completed");
    Ok(SyncResponse {
        message: summary.message,
        processed: summary.processed,
        skipped: summary.skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf(id: &str, name: &str) -> AttachmentMeta {
        AttachmentMeta {
            id: id.to_string(),
            name: name.to_string(),
            content_type: "application/pdf".to_string(),
        }
    }

    #[test]
    fn same_named_attachments_keep_distinct_download_ids() {
        let attachments = vec![pdf("att-1", "fatura.pdf"), pdf("att-2", "fatura.pdf")];
        let (pending, mut ids) =
            pending_downloads(&attachments, Some("2024-01-01T00:00:00Z"));

        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].filename, pending[1].filename);

        let queue = ids.get_mut(&pending[0].filename).unwrap();
        assert_eq!(queue.pop_front().as_deref(), Some("att-1"));
        assert_eq!(queue.pop_front().as_deref(), Some("att-2"));
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn non_pdf_attachments_are_not_queued() {
        let attachments = vec![
            pdf("att-1", "fatura.pdf"),
            AttachmentMeta {
                id: "att-2".to_string(),
                name: "logo.png".to_string(),
                content_type: "image/png".to_string(),
            },
        ];
        let (pending, ids) = pending_downloads(&attachments, None);

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].original_filename, "fatura.pdf");
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn distinct_names_get_their_own_keys() {
        let attachments = vec![pdf("att-1", "a.pdf"), pdf("att-2", "b.pdf")];
        let (pending, ids) = pending_downloads(&attachments, Some("2024-01-01T00:00:00Z"));

        assert_eq!(pending.len(), 2);
        assert_ne!(pending[0].filename, pending[1].filename);
        assert_eq!(ids.len(), 2);
    }
}
