//! services/api/src/adapters/outlook.rs
//!
//! Adapter for the Microsoft identity platform and Graph mail API,
//! implementing the `MailboxService` port: OAuth authorization-code flow
//! plus sender-filtered message search and attachment download.

use async_trait::async_trait;
use finance_tracker_core::domain::{AttachmentMeta, MailMessage, TokenSet};
use finance_tracker_core::ports::{MailboxService, PortError, PortResult};
use serde::Deserialize;
use tracing::{error, info};

const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";
const LOGIN_BASE: &str = "https://login.microsoftonline.com";
const MAIL_SCOPE: &str = "https://graph.microsoft.com/Mail.Read";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter for a public (no client secret) Microsoft OAuth application.
pub struct GraphMailAdapter {
    client: reqwest::Client,
    client_id: String,
    tenant_id: String,
    redirect_uri: String,
}

impl GraphMailAdapter {
    pub fn new(
        client: reqwest::Client,
        client_id: String,
        tenant_id: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            client,
            client_id,
            tenant_id,
            redirect_uri,
        }
    }

    fn authority(&self) -> String {
        format!("{LOGIN_BASE}/{}", self.tenant_id)
    }
}

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct GraphList<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    id: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    received_date_time: Option<String>,
    #[serde(default)]
    has_attachments: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphAttachment {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
}

fn graph_error(context: &str, e: reqwest::Error) -> PortError {
    error!("{context}: {e}");
    PortError::Unexpected(format!("{context}: {e}"))
}

//=========================================================================================
// `MailboxService` Trait Implementation
//=========================================================================================

#[async_trait]
impl MailboxService for GraphMailAdapter {
    fn authorization_url(&self, state: &str) -> PortResult<String> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/oauth2/v2.0/authorize", self.authority()),
            &[
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", MAIL_SCOPE),
                ("state", state),
            ],
        )
        .map_err(|e| PortError::Unexpected(format!("invalid authorization URL: {e}")))?;
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> PortResult<TokenSet> {
        let response = self
            .client
            .post(format!("{}/oauth2/v2.0/token", self.authority()))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", MAIL_SCOPE),
            ])
            .send()
            .await
            .map_err(|e| graph_error("token exchange request failed", e))?;

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| graph_error("token exchange returned malformed JSON", e))?;

        match body.access_token {
            Some(access_token) => Ok(TokenSet {
                access_token,
                refresh_token: body.refresh_token,
                // One hour unless the identity platform says otherwise.
                expires_in: body.expires_in.unwrap_or(3600),
            }),
            None => {
                let detail = body
                    .error_description
                    .unwrap_or_else(|| "Unknown error".to_string());
                Err(PortError::Unexpected(format!(
                    "Failed to exchange code: {detail}"
                )))
            }
        }
    }

    async fn search_messages(
        &self,
        access_token: &str,
        sender: &str,
    ) -> PortResult<Vec<MailMessage>> {
        // The whole mailbox history is searched; dedup filtering downstream
        // makes repeated full sweeps cheap.
        let filter = format!(
            "from/emailAddress/address eq '{sender}' and hasAttachments eq true"
        );

        let response = self
            .client
            .get(format!("{GRAPH_BASE}/me/messages"))
            .bearer_auth(access_token)
            .query(&[
                ("$filter", filter.as_str()),
                ("$top", "999"),
                ("$select", "id,subject,receivedDateTime,hasAttachments"),
            ])
            .send()
            .await
            .map_err(|e| graph_error("message search failed", e))?;

        if !response.status().is_success() {
            let status = response.status();
            error!(%status, sender, "Graph message search returned an error status");
            return Err(PortError::Unexpected(format!(
                "message search for {sender} returned {status}"
            )));
        }

        let body: GraphList<GraphMessage> = response
            .json()
            .await
            .map_err(|e| graph_error("message search returned malformed JSON", e))?;

        info!(sender, found = body.value.len(), "searched mailbox");
        Ok(body
            .value
            .into_iter()
            .map(|m| MailMessage {
                id: m.id,
                subject: m.subject.unwrap_or_default(),
                received_date_time: m.received_date_time,
                has_attachments: m.has_attachments,
            })
            .collect())
    }

    async fn list_attachments(
        &self,
        access_token: &str,
        message_id: &str,
    ) -> PortResult<Vec<AttachmentMeta>> {
        let response = self
            .client
            .get(format!("{GRAPH_BASE}/me/messages/{message_id}/attachments"))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| graph_error("attachment listing failed", e))?;

        if !response.status().is_success() {
            return Err(PortError::Unexpected(format!(
                "attachment listing returned {}",
                response.status()
            )));
        }

        let body: GraphList<GraphAttachment> = response
            .json()
            .await
            .map_err(|e| graph_error("attachment listing returned malformed JSON", e))?;

        Ok(body
            .value
            .into_iter()
            .map(|a| AttachmentMeta {
                id: a.id,
                name: a.name.unwrap_or_default(),
                content_type: a.content_type.unwrap_or_default(),
            })
            .collect())
    }

    async fn download_attachment(
        &self,
        access_token: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> PortResult<Vec<u8>> {
        let response = self
            .client
            .get(format!(
                "{GRAPH_BASE}/me/messages/{message_id}/attachments/{attachment_id}/$value"
            ))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| graph_error("attachment download failed", e))?;

        if !response.status().is_success() {
            return Err(PortError::Unexpected(format!(
                "attachment download returned {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| graph_error("attachment download truncated", e))?;
        Ok(bytes.to_vec())
    }
}
