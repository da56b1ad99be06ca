//! services/api/src/adapters/extractor.rs
//!
//! Adapter for the external PDF-extraction HTTP API, implementing the
//! `ReceiptExtractionService` port. One multipart POST carries a whole
//! chunk of files; the response's `results` array is matched back onto the
//! inputs by position.
//!
//! Failure policy: a non-200 status, a network/timeout error, or a
//! malformed response fails every file in the chunk with a uniform message.
//! A well-formed response that is shorter than the input fails only the
//! unmatched tail.

use async_trait::async_trait;
use finance_tracker_core::domain::{ExtractionCandidate, FileExtraction};
use finance_tracker_core::ports::ReceiptExtractionService;
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that submits extraction batches to the external PDF service.
pub struct HttpExtractorAdapter {
    client: reqwest::Client,
    url: String,
}

impl HttpExtractorAdapter {
    /// Creates a new adapter with the batch endpoint URL and a bounded
    /// per-call timeout (the batch endpoint is slow; two minutes is the
    /// expected order of magnitude).
    pub fn new(url: String, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client, url })
    }
}

//=========================================================================================
// Wire Types and Positional Alignment
//=========================================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct BatchResponse {
    pub(crate) results: Option<Vec<BatchResult>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchResult {
    #[serde(default)]
    pub(crate) success: bool,
    #[serde(default)]
    pub(crate) receipt: Option<serde_json::Value>,
    #[serde(default)]
    pub(crate) error_message: Option<String>,
}

/// Maps the response's results back onto `input_count` submitted files by
/// index. A missing tail fails only the files it left unmatched; extra
/// results are dropped.
pub(crate) fn align_results(input_count: usize, results: Vec<BatchResult>) -> Vec<FileExtraction> {
    let mut results = results.into_iter();
    (0..input_count)
        .map(|_| match results.next() {
            None => FileExtraction::Failed(
                "no result returned by extraction service".to_string(),
            ),
            Some(result) if !result.success => FileExtraction::Failed(
                result
                    .error_message
                    .unwrap_or_else(|| "Unknown error".to_string()),
            ),
            Some(result) => match result.receipt {
                Some(receipt) => FileExtraction::Extracted(receipt),
                None => FileExtraction::Failed(
                    "extraction result carried no receipt payload".to_string(),
                ),
            },
        })
        .collect()
}

fn all_failed(count: usize, message: &str) -> Vec<FileExtraction> {
    (0..count)
        .map(|_| FileExtraction::Failed(message.to_string()))
        .collect()
}

//=========================================================================================
// `ReceiptExtractionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ReceiptExtractionService for HttpExtractorAdapter {
    async fn extract_batch(&self, files: &[ExtractionCandidate]) -> Vec<FileExtraction> {
        let mut form = reqwest::multipart::Form::new();
        for file in files {
            let part = match reqwest::multipart::Part::bytes(file.content.clone())
                .file_name(file.original_filename.clone())
                .mime_str("application/pdf")
            {
                Ok(part) => part,
                Err(e) => {
                    error!("failed to build multipart form: {e}");
                    return all_failed(files.len(), &format!("invalid upload part: {e}"));
                }
            };
            form = form.part("files", part);
        }

        info!(files = files.len(), url = %self.url, "calling PDF extraction API");
        let response = match self.client.post(&self.url).multipart(form).send().await {
            Ok(response) => response,
            Err(e) => {
                // Timeouts land here too and are treated as any other
                // transport failure.
                error!("network error calling PDF extraction API: {e}");
                return all_failed(
                    files.len(),
                    &format!("failed to connect to extraction service: {e}"),
                );
            }
        };

        let status = response.status();
        if !status.is_success() {
            error!(%status, "extraction API returned an error status");
            return all_failed(
                files.len(),
                &format!("extraction service returned {status}"),
            );
        }

        let body: BatchResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                error!("failed to parse extraction API response: {e}");
                return all_failed(
                    files.len(),
                    "invalid response format from extraction service",
                );
            }
        };

        match body.results {
            Some(results) => align_results(files.len(), results),
            None => all_failed(files.len(), "no results in extraction response"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(body: &str) -> BatchResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn successful_results_forward_receipt_payloads_in_order() {
        let body = parse(
            r#"{"results": [
                {"success": true, "receipt": {"market": "A"}},
                {"success": true, "receipt": {"market": "B"}}
            ], "total_files": 2, "successful_extractions": 2, "failed_extractions": 0}"#,
        );
        let aligned = align_results(2, body.results.unwrap());
        match &aligned[0] {
            FileExtraction::Extracted(value) => assert_eq!(value["market"], json!("A")),
            other => panic!("expected extracted payload, got {other:?}"),
        }
        match &aligned[1] {
            FileExtraction::Extracted(value) => assert_eq!(value["market"], json!("B")),
            other => panic!("expected extracted payload, got {other:?}"),
        }
    }

    #[test]
    fn unsuccessful_result_carries_the_extractor_message() {
        let body = parse(
            r#"{"results": [{"success": false, "error_message": "not a receipt"}]}"#,
        );
        let aligned = align_results(1, body.results.unwrap());
        match &aligned[0] {
            FileExtraction::Failed(message) => assert_eq!(message, "not a receipt"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn unsuccessful_result_without_message_gets_a_default() {
        let body = parse(r#"{"results": [{"success": false}]}"#);
        let aligned = align_results(1, body.results.unwrap());
        match &aligned[0] {
            FileExtraction::Failed(message) => assert_eq!(message, "Unknown error"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn short_result_list_fails_only_the_unmatched_tail() {
        let body = parse(r#"{"results": [{"success": true, "receipt": {"market": "A"}}]}"#);
        let aligned = align_results(3, body.results.unwrap());
        assert!(matches!(aligned[0], FileExtraction::Extracted(_)));
        assert!(matches!(aligned[1], FileExtraction::Failed(_)));
        assert!(matches!(aligned[2], FileExtraction::Failed(_)));
    }

    #[test]
    fn success_without_receipt_payload_fails_that_file() {
        let body = parse(r#"{"results": [{"success": true}]}"#);
        let aligned = align_results(1, body.results.unwrap());
        match &aligned[0] {
            FileExtraction::Failed(message) => {
                assert!(message.contains("no receipt payload"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn missing_results_key_deserializes_as_none() {
        let body = parse(r#"{"total_files": 2}"#);
        assert!(body.results.is_none());
    }
}
