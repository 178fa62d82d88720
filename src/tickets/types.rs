use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TicketStatus {
    Open,
    Assigned,
    InProgress,
    WaitingExternal,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 6] = [
        Self::Open,
        Self::Assigned,
        Self::InProgress,
        Self::WaitingExternal,
        Self::Resolved,
        Self::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Assigned => "assigned",
            Self::InProgress => "in-progress",
            Self::WaitingExternal => "waiting-external",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    /// Resolved and closed tickets are finished; everything else still needs work.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Resolved | Self::Closed)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Unknown ticket status: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueCategory {
    Software,
    Hardware,
}

impl IssueCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Software => "software",
            Self::Hardware => "hardware",
        }
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "software" => Ok(Self::Software),
            "hardware" => Ok(Self::Hardware),
            other => Err(format!("Unknown issue category: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFile {
    pub name: String,
    pub data: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub student_email: String,
    pub department: String,
    pub year: String,
    pub class_year: String,
    pub instructor_name: String,
    pub device_type: String,
    pub device_ip_address: String,
    pub issue_description: String,
    pub issue_category: IssueCategory,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_repair_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_notes: Option<String>,
    #[serde(default)]
    pub is_external: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_repair_company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_engineer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_file: Option<ReportFile>,
}

/// A student submission: everything but the id, status and timestamps.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewTicket {
    pub student_id: String,
    pub student_name: String,
    pub student_email: String,
    pub department: String,
    pub year: String,
    pub class_year: String,
    pub instructor_name: String,
    pub device_type: String,
    pub device_ip_address: String,
    pub issue_description: String,
    pub issue_category: Option<IssueCategory>,
    pub priority: Option<Priority>,
    pub notes: Option<String>,
}

/// IT-side partial update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TicketUpdate {
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    pub assigned_engineer: Option<String>,
    pub notes: Option<String>,
    pub internal_notes: Option<String>,
    pub estimated_repair_time: Option<String>,
    pub is_external: Option<bool>,
    pub external_repair_company: Option<String>,
    pub external_tracking_number: Option<String>,
    #[serde(skip)]
    pub report_file: Option<ReportFile>,
}

impl TicketUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.priority.is_none()
            && self.assigned_engineer.is_none()
            && self.notes.is_none()
            && self.internal_notes.is_none()
            && self.estimated_repair_time.is_none()
            && self.is_external.is_none()
            && self.external_repair_company.is_none()
            && self.external_tracking_number.is_none()
            && self.report_file.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        for status in TicketStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<TicketStatus>().unwrap(), status);
        }
        assert!("pending".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn test_active_statuses() {
        assert!(TicketStatus::Open.is_active());
        assert!(TicketStatus::WaitingExternal.is_active());
        assert!(!TicketStatus::Resolved.is_active());
        assert!(!TicketStatus::Closed.is_active());
    }

    #[test]
    fn test_update_ignores_unknown_and_report_fields() {
        let update: TicketUpdate = serde_json::from_str(
            r#"{"status":"in-progress","internalNotes":"reseat RAM","reportFile":{"name":"x"}}"#,
        )
        .unwrap();
        assert_eq!(update.status, Some(TicketStatus::InProgress));
        assert_eq!(update.internal_notes.as_deref(), Some("reseat RAM"));
        assert!(update.report_file.is_none());
        assert!(TicketUpdate::default().is_empty());
    }
}
