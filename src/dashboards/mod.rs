//! Read-only summary of the ticket collection for the IT dashboard.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::auth::ItSession;
use crate::shared::error::{ApiError, ApiResult};
use crate::shared::state::AppState;
use crate::tickets::lifecycle::{CategoryFilter, OverduePolicy};
use crate::tickets::types::{IssueCategory, Ticket, TicketStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub external: usize,
    pub overdue_threshold_minutes: i64,
    pub overdue: Vec<Ticket>,
    /// Still `open` past the threshold; the "immediate action" alert.
    pub unassigned_overdue: Vec<Ticket>,
    pub generated_at: DateTime<Utc>,
}

impl DashboardSummary {
    pub fn compute(
        tickets: &[Ticket],
        category: CategoryFilter,
        policy: &OverduePolicy,
        now: DateTime<Utc>,
    ) -> Self {
        let scoped: Vec<&Ticket> = tickets
            .iter()
            .filter(|t| category.matches(t.issue_category))
            .collect();

        let mut by_status: BTreeMap<String, usize> = TicketStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut by_category: BTreeMap<String, usize> =
            [IssueCategory::Software, IssueCategory::Hardware]
                .iter()
                .map(|c| (c.as_str().to_string(), 0))
                .collect();

        for ticket in &scoped {
            *by_status.entry(ticket.status.as_str().to_string()).or_default() += 1;
            *by_category
                .entry(ticket.issue_category.as_str().to_string())
                .or_default() += 1;
        }

        Self {
            total: scoped.len(),
            by_status,
            by_category,
            external: scoped.iter().filter(|t| t.is_external).count(),
            overdue_threshold_minutes: policy.threshold().num_minutes(),
            overdue: scoped
                .iter()
                .filter(|t| policy.ticket_overdue(t, now))
                .map(|t| (*t).clone())
                .collect(),
            unassigned_overdue: scoped
                .iter()
                .filter(|t| policy.ticket_unassigned_overdue(t, now))
                .map(|t| (*t).clone())
                .collect(),
            generated_at: now,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub category: Option<String>,
}

pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    _session: ItSession,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<Json<DashboardSummary>> {
    let category = match query.category.as_deref() {
        Some(c) => c.parse::<CategoryFilter>().map_err(ApiError::validation)?,
        None => CategoryFilter::All,
    };
    let tickets = state.tickets.list().await?;
    Ok(Json(DashboardSummary::compute(
        &tickets,
        category,
        &state.overdue,
        Utc::now(),
    )))
}

pub fn configure_dashboards_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/dashboard", get(get_dashboard))
}
