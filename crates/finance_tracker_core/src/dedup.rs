//! crates/finance_tracker_core/src/dedup.rs
//!
//! Duplicate detection for extraction candidates. The same filter runs
//! twice per sync: before any attachment download (cheap skip of known
//! files) and again inside the ingestion pipeline just before persistence
//! (safety net against two overlapping syncs). Both checks must derive the
//! key the same way, which is why the derivation lives here.

use chrono::DateTime;
use std::collections::HashSet;

use crate::domain::ExtractionCandidate;

/// Derives the deduplication key for one attachment: the attachment name,
/// suffixed with the email's received timestamp when one is known. The
/// suffix distinguishes identically named attachments sent on different
/// days. An unparseable timestamp falls back to the bare name.
pub fn dedup_key(attachment_name: &str, received_date_time: Option<&str>) -> String {
    match received_date_time.and_then(|raw| DateTime::parse_from_rfc3339(raw).ok()) {
        Some(received) => format!("{}_{}", attachment_name, received.format("%Y%m%d_%H%M%S")),
        None => attachment_name.to_string(),
    }
}

/// Splits candidates into (skip, keep): a candidate is skipped iff its
/// dedup filename is already in `already_processed`. Relative order is
/// preserved within each partition.
pub fn partition(
    candidates: Vec<ExtractionCandidate>,
    already_processed: &HashSet<String>,
) -> (Vec<ExtractionCandidate>, Vec<ExtractionCandidate>) {
    candidates
        .into_iter()
        .partition(|candidate| already_processed.contains(&candidate.filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(filename: &str) -> ExtractionCandidate {
        ExtractionCandidate {
            filename: filename.to_string(),
            original_filename: filename.to_string(),
            content: Vec::new(),
        }
    }

    #[test]
    fn key_includes_received_timestamp() {
        let key = dedup_key("fatura.pdf", Some("2024-01-01T00:00:00Z"));
        assert_eq!(key, "fatura.pdf_20240101_000000");
    }

    #[test]
    fn key_without_timestamp_is_bare_name() {
        assert_eq!(dedup_key("fatura.pdf", None), "fatura.pdf");
    }

    #[test]
    fn unparseable_timestamp_falls_back_to_bare_name() {
        assert_eq!(dedup_key("fatura.pdf", Some("yesterday")), "fatura.pdf");
    }

    #[test]
    fn offset_timestamps_keep_their_local_clock_time() {
        let key = dedup_key("a.pdf", Some("2024-06-15T13:45:30+02:00"));
        assert_eq!(key, "a.pdf_20240615_134530");
    }

    #[test]
    fn partition_routes_known_keys_to_skip() {
        let candidates = vec![candidate("a.pdf_20240101_000000"), candidate("b.pdf")];
        let processed: HashSet<String> = ["a.pdf_20240101_000000".to_string()].into();

        let (skip, keep) = partition(candidates, &processed);
        assert_eq!(skip.len(), 1);
        assert_eq!(skip[0].filename, "a.pdf_20240101_000000");
        assert_eq!(keep.len(), 1);
        assert_eq!(keep[0].filename, "b.pdf");
    }

    #[test]
    fn partition_with_empty_history_keeps_everything() {
        let candidates = vec![candidate("a.pdf"), candidate("b.pdf")];
        let (skip, keep) = partition(candidates, &HashSet::new());
        assert!(skip.is_empty());
        assert_eq!(keep.len(), 2);
    }

    #[test]
    fn partition_preserves_input_order() {
        let candidates: Vec<_> = ["c.pdf", "a.pdf", "b.pdf"]
            .iter()
            .map(|n| candidate(n))
            .collect();
        let (_, keep) = partition(candidates, &HashSet::new());
        let names: Vec<_> = keep.iter().map(|c| c.filename.as_str()).collect();
        assert_eq!(names, vec!["c.pdf", "a.pdf", "b.pdf"]);
    }
}
