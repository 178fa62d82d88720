//! Self-help knowledge base shown to students before they file a ticket.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::auth::ItSession;
use crate::shared::error::{ApiError, ApiResult};
use crate::shared::state::AppState;
use crate::tickets::lifecycle::CategoryFilter;
use crate::tickets::types::IssueCategory;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonIssue {
    pub issue: String,
    pub category: IssueCategory,
    pub fix_steps: Vec<String>,
}

impl CommonIssue {
    fn new(issue: &str, category: IssueCategory, steps: &[&str]) -> Self {
        Self {
            issue: issue.to_string(),
            category,
            fix_steps: steps.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Trims the entry and drops blank steps, rejecting what is left empty.
    pub fn normalized(self) -> Result<Self, String> {
        let issue = self.issue.trim().to_string();
        if issue.is_empty() {
            return Err("Issue title is required".into());
        }
        let fix_steps: Vec<String> = self
            .fix_steps
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if fix_steps.is_empty() {
            return Err("At least one fix step is required".into());
        }
        Ok(Self {
            issue,
            category: self.category,
            fix_steps,
        })
    }
}

pub fn default_issues() -> Vec<CommonIssue> {
    use IssueCategory::{Hardware, Software};
    vec![
        CommonIssue::new(
            "Laptop will not power on",
            Hardware,
            &[
                "Plug in the charger and wait a few minutes",
                "Hold the power button for 15 seconds, then try again",
                "Check whether the charger light is on",
            ],
        ),
        CommonIssue::new(
            "Wi-Fi keeps disconnecting",
            Software,
            &[
                "Forget the campus network and join it again",
                "Turn airplane mode on and off",
                "Restart the laptop",
            ],
        ),
        CommonIssue::new(
            "Application crashes on launch",
            Software,
            &[
                "Install pending system updates",
                "Reinstall the application",
                "Restart before opening it again",
            ],
        ),
        CommonIssue::new(
            "Keyboard keys not responding",
            Hardware,
            &[
                "Clean around the keys with compressed air",
                "Try an external keyboard to rule out software",
            ],
        ),
        CommonIssue::new(
            "Screen flickers or stays black",
            Hardware,
            &[
                "Raise the brightness",
                "Connect an external monitor to see if the display works there",
            ],
        ),
        CommonIssue::new(
            "Cannot sign in to the school account",
            Software,
            &[
                "Check that Caps Lock is off",
                "Reset the password from the school portal",
            ],
        ),
    ]
}

#[derive(Debug, Deserialize)]
pub struct IssueQuery {
    pub category: Option<String>,
}

pub async fn list_common_issues(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IssueQuery>,
) -> ApiResult<Json<Vec<CommonIssue>>> {
    let category = match query.category.as_deref() {
        Some(c) => c.parse::<CategoryFilter>().map_err(ApiError::validation)?,
        None => CategoryFilter::All,
    };
    let issues = state.common_issues.read().await;
    Ok(Json(
        issues
            .iter()
            .filter(|i| category.matches(i.category))
            .cloned()
            .collect(),
    ))
}

pub async fn add_common_issue(
    State(state): State<Arc<AppState>>,
    ItSession(session): ItSession,
    payload: Result<Json<CommonIssue>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CommonIssue>)> {
    let Json(issue) = payload?;
    let issue = issue.normalized().map_err(ApiError::validation)?;
    state.common_issues.write().await.push(issue.clone());
    info!("Common issue '{}' added by {}", issue.issue, session.email);
    Ok((StatusCode::CREATED, Json(issue)))
}

pub fn configure_common_issues_routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/api/common-issues",
        get(list_common_issues).post(add_common_issue),
    )
}
