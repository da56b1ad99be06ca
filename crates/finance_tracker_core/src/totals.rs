//! crates/finance_tracker_core/src/totals.rs
//!
//! Normalizes the three money fields of an extracted receipt. The external
//! extractor may return any subset of total / total_discount / total_paid as
//! null; downstream persistence and the CSV exporter require all three.

use crate::domain::ExtractedReceipt;

/// Raw money fields plus the product lines they can be derived from.
/// All fields optional: this is the shape the extractor actually returns.
#[derive(Debug, Clone, Default)]
pub struct RawTotals {
    pub total: Option<f64>,
    pub total_discount: Option<f64>,
    pub total_paid: Option<f64>,
    /// `(price, quantity)` per line item, missing components as `None`.
    pub product_lines: Vec<(Option<f64>, Option<f64>)>,
}

impl From<&ExtractedReceipt> for RawTotals {
    fn from(receipt: &ExtractedReceipt) -> Self {
        Self {
            total: receipt.total,
            total_discount: receipt.total_discount,
            total_paid: receipt.total_paid,
            product_lines: receipt
                .products
                .iter()
                .map(|p| (Some(p.price), Some(p.quantity)))
                .collect(),
        }
    }
}

/// Sanitized `(total, discount, paid)` as non-null values rounded to cents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedTotals {
    pub total: f64,
    pub total_discount: f64,
    pub total_paid: f64,
}

/// Returns sanitized (total, discount, paid) as non-null floats.
///
/// Strategy, applied in order:
/// - If total is absent, prefer sum(price * qty), then total_paid, else 0.0.
/// - If discount is absent, use max(total - total_paid, 0.0).
/// - If paid is absent, use max(total - discount, 0.0).
///
/// Never returns a negative discount or paid amount. Does not force
/// `paid <= total` when both sides came from the extractor independently.
pub fn normalize(raw: &RawTotals) -> NormalizedTotals {
    let products_sum: f64 = raw
        .product_lines
        .iter()
        .map(|(price, quantity)| price.unwrap_or(0.0) * quantity.unwrap_or(0.0))
        .sum();

    let total = match raw.total {
        Some(t) => t,
        None => {
            if products_sum > 0.0 {
                products_sum
            } else {
                raw.total_paid.unwrap_or(0.0)
            }
        }
    };

    let total_discount = match raw.total_discount {
        Some(d) => d,
        None => match raw.total_paid {
            Some(paid) => (total - paid).max(0.0),
            None => 0.0,
        },
    };

    let total_paid = match raw.total_paid {
        Some(p) => p,
        None => (total - total_discount).max(0.0),
    };

    NormalizedTotals {
        total: round_cents(total),
        total_discount: round_cents(total_discount),
        total_paid: round_cents(total_paid),
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(
        total: Option<f64>,
        discount: Option<f64>,
        paid: Option<f64>,
        lines: &[(f64, f64)],
    ) -> RawTotals {
        RawTotals {
            total,
            total_discount: discount,
            total_paid: paid,
            product_lines: lines.iter().map(|&(p, q)| (Some(p), Some(q))).collect(),
        }
    }

    #[test]
    fn all_absent_defaults_to_zero() {
        let out = normalize(&RawTotals::default());
        assert_eq!(out.total, 0.0);
        assert_eq!(out.total_discount, 0.0);
        assert_eq!(out.total_paid, 0.0);
    }

    #[test]
    fn missing_total_uses_products_sum() {
        let out = normalize(&raw(None, None, Some(2.99), &[(2.99, 1.0)]));
        assert_eq!(out.total, 2.99);
        assert_eq!(out.total_discount, 0.0);
        assert_eq!(out.total_paid, 2.99);
    }

    #[test]
    fn only_total_given_makes_paid_equal_total() {
        let out = normalize(&raw(Some(10.0), None, None, &[(3.0, 2.0)]));
        assert_eq!(out.total, 10.0);
        assert_eq!(out.total_discount, 0.0);
        assert_eq!(out.total_paid, 10.0);
    }

    #[test]
    fn only_paid_given_prefers_products_sum_for_total() {
        // products sum to 6.00, paid 7.00: discount clamps to zero rather
        // than going negative.
        let out = normalize(&raw(None, None, Some(7.0), &[(3.0, 2.0)]));
        assert_eq!(out.total, 6.0);
        assert_eq!(out.total_discount, 0.0);
        assert_eq!(out.total_paid, 7.0);
    }

    #[test]
    fn total_and_discount_given_derives_paid() {
        let out = normalize(&raw(Some(10.0), Some(3.0), None, &[]));
        assert_eq!(out.total, 10.0);
        assert_eq!(out.total_discount, 3.0);
        assert_eq!(out.total_paid, 7.0);
    }

    #[test]
    fn total_and_paid_given_derives_discount() {
        let out = normalize(&raw(Some(12.5), None, Some(10.0), &[]));
        assert_eq!(out.total_discount, 2.5);
        assert!((out.total - out.total_discount - out.total_paid).abs() < 0.005);
    }

    #[test]
    fn discount_exceeding_total_clamps_paid_at_zero() {
        let out = normalize(&raw(Some(5.0), Some(9.0), None, &[]));
        assert_eq!(out.total_paid, 0.0);
    }

    #[test]
    fn missing_line_components_count_as_zero() {
        let lines = vec![(Some(2.0), None), (None, Some(3.0)), (Some(1.5), Some(2.0))];
        let out = normalize(&RawTotals {
            product_lines: lines,
            ..Default::default()
        });
        assert_eq!(out.total, 3.0);
    }

    #[test]
    fn outputs_rounded_to_two_decimals() {
        let out = normalize(&raw(None, None, None, &[(0.333, 3.0)]));
        assert_eq!(out.total, 1.0);
        assert_eq!(out.total_paid, 1.0);
    }

    #[test]
    fn extractor_supplied_inconsistency_is_preserved() {
        // All three given but inconsistent: nothing was derived, so nothing
        // is corrected.
        let out = normalize(&raw(Some(10.0), Some(1.0), Some(10.0), &[]));
        assert_eq!(out.total, 10.0);
        assert_eq!(out.total_discount, 1.0);
        assert_eq!(out.total_paid, 10.0);
    }
}
