//! services/api/src/web/dashboard.rs
//!
//! Spending summary over a trailing period (current week or month).

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use crate::web::state::{AppState, CurrentUser};

type HandlerError = (StatusCode, String);

#[derive(Deserialize)]
pub struct SummaryParams {
    #[serde(default = "default_period")]
    pub period: String,
}

fn default_period() -> String {
    "month".to_string()
}

#[derive(Serialize, ToSchema)]
pub struct CategorySpending {
    pub category: String,
    pub amount: f64,
}

#[derive(Serialize, ToSchema)]
pub struct DashboardSummary {
    pub period: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_spent: f64,
    pub receipt_count: usize,
    pub average_per_receipt: f64,
    pub top_categories: Vec<CategorySpending>,
}

/// Date window for the requested period. Weeks start on Monday; months run
/// from the first to the last calendar day.
fn period_bounds(period: &str, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), String> {
    match period {
        "week" => {
            let start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
            Ok((start, start + Duration::days(6)))
        }
        "month" => {
            let start = today.with_day(1).ok_or("invalid month start")?;
            let next_month = if start.month() == 12 {
                NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
            } else {
                NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)
            }
            .ok_or("invalid month end")?;
            Ok((start, next_month - Duration::days(1)))
        }
        other => Err(format!(
            "Invalid period '{other}'. Must be 'week' or 'month'."
        )),
    }
}

/// GET /dashboard/summary?period=week|month
pub async fn summary_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Query(params): Query<SummaryParams>,
) -> Result<impl IntoResponse, HandlerError> {
    let today = Utc::now().date_naive();
    let (start, end) =
        period_bounds(&params.period, today).map_err(|m| (StatusCode::BAD_REQUEST, m))?;

    let receipts = state
        .db
        .receipts_between(user_id, start, end)
        .await
        .map_err(|e| {
            error!("Failed to load receipts for summary: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to build summary".to_string(),
            )
        })?;

    let total_spent: f64 = receipts.iter().map(|r| r.total_paid).sum();
    let receipt_count = receipts.len();
    let average_per_receipt = if receipt_count > 0 {
        total_spent / receipt_count as f64
    } else {
        0.0
    };

    let top_categories = state
        .db
        .category_totals_between(user_id, start, end, 5)
        .await
        .map_err(|e| {
            error!("Failed to load category totals: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to build summary".to_string(),
            )
        })?
        .into_iter()
        .map(|t| CategorySpending {
            category: t.category,
            amount: (t.amount * 100.0).round() / 100.0,
        })
        .collect();

    Ok(Json(DashboardSummary {
        period: params.period,
        start_date: start,
        end_date: end,
        total_spent: (total_spent * 100.0).round() / 100.0,
        receipt_count,
        average_per_receipt: (average_per_receipt * 100.0).round() / 100.0,
        top_categories,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_starts_on_monday() {
        // 2024-09-18 is a Wednesday.
        let today = NaiveDate::from_ymd_opt(2024, 9, 18).unwrap();
        let (start, end) = period_bounds("week", today).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 9, 16).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 9, 22).unwrap());
    }

    #[test]
    fn month_covers_full_calendar_month() {
        let today = NaiveDate::from_ymd_opt(2024, 2, 15).unwrap();
        let (start, end) = period_bounds("month", today).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn december_rolls_into_next_year() {
        let today = NaiveDate::from_ymd_opt(2024, 12, 10).unwrap();
        let (start, end) = period_bounds("month", today).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
    }

    #[test]
    fn unknown_period_is_rejected() {
        let today = NaiveDate::from_ymd_opt(2024, 9, 18).unwrap();
        assert!(period_bounds("year", today).is_err());
    }
}
