pub mod attachments;
pub mod lifecycle;
pub mod store;
pub mod types;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::auth::{ItSession, Session};
use crate::notifications::{notify_best_effort, Notification};
use crate::shared::error::{ApiError, ApiResult};
use crate::shared::state::AppState;
use attachments::{accept_report, attachment_disposition, CSV_CONTENT_TYPE};
use lifecycle::{filter_tickets, validate_new_ticket, validate_update, CategoryFilter, TicketTab};
use types::{NewTicket, Ticket, TicketUpdate};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub tab: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub filename: Option<String>,
}

/// Students own the tickets filed under their login email.
fn can_view(session: &Session, ticket: &Ticket) -> bool {
    session.is_it() || ticket.student_email.eq_ignore_ascii_case(&session.email)
}

async fn load_visible(state: &AppState, session: &Session, id: &str) -> ApiResult<Ticket> {
    let ticket = state
        .tickets
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Ticket not found"))?;
    if !can_view(session, &ticket) {
        return Err(ApiError::Forbidden(
            "You can only view your own tickets".into(),
        ));
    }
    Ok(ticket)
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    session: Session,
    payload: Result<Json<NewTicket>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Ticket>)> {
    let Json(mut new) = payload?;

    if !session.is_it() {
        if new.student_email.trim().is_empty() {
            new.student_email = session.email.clone();
        } else if !new.student_email.trim().eq_ignore_ascii_case(&session.email) {
            return Err(ApiError::Forbidden(
                "Students can only submit tickets for themselves".into(),
            ));
        }
    }
    validate_new_ticket(&new).map_err(ApiError::validation)?;

    let ticket = state.tickets.create(new).await?;
    info!(
        "Ticket {} created for {} ({})",
        ticket.id, ticket.student_id, ticket.issue_category
    );
    notify_best_effort(state.notifier.as_ref(), Notification::new_ticket(&ticket)).await;

    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    _session: ItSession,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Ticket>>> {
    let category = match query.category.as_deref() {
        Some(c) => c.parse::<CategoryFilter>().map_err(ApiError::validation)?,
        None => CategoryFilter::All,
    };
    let tab = match query.tab.as_deref() {
        Some(t) => t.parse::<TicketTab>().map_err(ApiError::validation)?,
        None => TicketTab::All,
    };

    let tickets = state.tickets.list().await?;
    Ok(Json(filter_tickets(
        &tickets,
        category,
        tab,
        &state.overdue,
        Utc::now(),
    )))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
) -> ApiResult<Json<Ticket>> {
    Ok(Json(load_visible(&state, &session, &id).await?))
}

pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    ItSession(session): ItSession,
    Path(id): Path<String>,
    payload: Result<Json<TicketUpdate>, JsonRejection>,
) -> ApiResult<Json<Ticket>> {
    let Json(update) = payload?;
    if state.tickets.get(&id).await?.is_none() {
        return Err(ApiError::not_found("Ticket not found"));
    }
    validate_update(&update, &state.config.tickets.engineers).map_err(ApiError::validation)?;

    let ticket = state
        .tickets
        .update(&id, update)
        .await?
        .ok_or_else(|| ApiError::not_found("Ticket not found"))?;
    info!("Ticket {} updated by {} (status {})", ticket.id, session.email, ticket.status);
    Ok(Json(ticket))
}

pub async fn list_student_tickets(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(student_id): Path<String>,
) -> ApiResult<Json<Vec<Ticket>>> {
    let tickets = state
        .tickets
        .list_for_student(&student_id)
        .await?
        .into_iter()
        .filter(|t| can_view(&session, t))
        .collect();
    Ok(Json(tickets))
}

pub async fn upload_report(
    State(state): State<Arc<AppState>>,
    ItSession(session): ItSession,
    Path(id): Path<String>,
    Query(query): Query<ReportQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Ticket>> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let report = accept_report(
        query.filename.as_deref().unwrap_or_default(),
        content_type,
        &body,
        state.config.attachments.max_report_bytes,
        Utc::now(),
    )
    .map_err(|e| ApiError::validation(e.to_string()))?;

    let file_name = report.name.clone();
    let update = TicketUpdate {
        report_file: Some(report),
        ..Default::default()
    };
    let ticket = state
        .tickets
        .update(&id, update)
        .await?
        .ok_or_else(|| ApiError::not_found("Ticket not found"))?;
    info!("Report {file_name} attached to {} by {}", ticket.id, session.email);
    Ok(Json(ticket))
}

pub async fn download_report(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let ticket = load_visible(&state, &session, &id).await?;
    let report = ticket
        .report_file
        .ok_or_else(|| ApiError::not_found("No report attached to this ticket"))?;
    Ok((
        [
            (header::CONTENT_TYPE, CSV_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, attachment_disposition(&report.name)),
        ],
        report.data,
    ))
}

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/:id", get(get_ticket).put(update_ticket))
        .route(
            "/api/tickets/:id/report",
            get(download_report).put(upload_report),
        )
        .route("/api/students/:student_id/tickets", get(list_student_tickets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Portal;
    use crate::tickets::lifecycle::tests::sample_ticket;
    use crate::tickets::types::{IssueCategory, TicketStatus};

    fn session(portal: Portal, email: &str) -> Session {
        Session {
            account_id: 1,
            email: email.into(),
            role: "Student".into(),
            portal,
        }
    }

    #[test]
    fn test_visibility() {
        let ticket = sample_ticket("TKT-001", IssueCategory::Software, TicketStatus::Open);
        assert!(can_view(&session(Portal::Student, "Alex.Johnson@school.edu"), &ticket));
        assert!(!can_view(&session(Portal::Student, "sarah.chen@school.edu"), &ticket));
        assert!(can_view(&session(Portal::It, "it@school.edu"), &ticket));
    }
}
