//! Ticket lifecycle rules: overdue detection, list filtering and applying
//! updates. Everything here is a pure function of its inputs; callers pass
//! `now` explicitly so nothing time-dependent is ever cached.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::net::IpAddr;
use std::str::FromStr;

use super::types::{IssueCategory, NewTicket, Ticket, TicketStatus, TicketUpdate};

pub const DEFAULT_OVERDUE_THRESHOLD_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverduePolicy {
    threshold: Duration,
}

impl Default for OverduePolicy {
    fn default() -> Self {
        Self::from_minutes(DEFAULT_OVERDUE_THRESHOLD_MINUTES)
    }
}

impl OverduePolicy {
    pub fn from_minutes(minutes: i64) -> Self {
        Self {
            threshold: Duration::minutes(minutes.max(0)),
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn is_overdue(
        &self,
        status: TicketStatus,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        status.is_active() && now.signed_duration_since(created_at) > self.threshold
    }

    pub fn ticket_overdue(&self, ticket: &Ticket, now: DateTime<Utc>) -> bool {
        self.is_overdue(ticket.status, ticket.created_at, now)
    }

    /// Still `open` (nobody picked it up) past the threshold.
    pub fn ticket_unassigned_overdue(&self, ticket: &Ticket, now: DateTime<Utc>) -> bool {
        ticket.status == TicketStatus::Open && self.ticket_overdue(ticket, now)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryFilter {
    #[default]
    All,
    Software,
    Hardware,
}

impl CategoryFilter {
    pub fn matches(&self, category: IssueCategory) -> bool {
        match self {
            Self::All => true,
            Self::Software => category == IssueCategory::Software,
            Self::Hardware => category == IssueCategory::Hardware,
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "software" => Ok(Self::Software),
            "hardware" => Ok(Self::Hardware),
            other => Err(format!("Unknown category filter: {other}")),
        }
    }
}

/// Which board tab is being viewed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TicketTab {
    #[default]
    All,
    Overview,
    Overdue,
    Status(TicketStatus),
}

impl TicketTab {
    pub fn matches(&self, ticket: &Ticket, policy: &OverduePolicy, now: DateTime<Utc>) -> bool {
        match self {
            Self::All | Self::Overview => true,
            Self::Overdue => policy.ticket_overdue(ticket, now),
            Self::Status(status) => ticket.status == *status,
        }
    }
}

impl FromStr for TicketTab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "overview" => Ok(Self::Overview),
            "overdue" => Ok(Self::Overdue),
            other => other
                .parse::<TicketStatus>()
                .map(Self::Status)
                .map_err(|_| format!("Unknown ticket tab: {other}")),
        }
    }
}

/// Order-preserving selection by category and tab.
pub fn filter_tickets<'a, I>(
    tickets: I,
    category: CategoryFilter,
    tab: TicketTab,
    policy: &OverduePolicy,
    now: DateTime<Utc>,
) -> Vec<Ticket>
where
    I: IntoIterator<Item = &'a Ticket>,
{
    tickets
        .into_iter()
        .filter(|t| category.matches(t.issue_category))
        .filter(|t| tab.matches(t, policy, now))
        .cloned()
        .collect()
}

/// Checks a submission before it is stored. Returns a message fit for a 400.
pub fn validate_new_ticket(new: &NewTicket) -> Result<(), String> {
    let required = [
        ("studentId", &new.student_id),
        ("studentName", &new.student_name),
        ("studentEmail", &new.student_email),
        ("deviceType", &new.device_type),
        ("issueDescription", &new.issue_description),
    ];
    let mut missing: Vec<&str> = required
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if new.issue_category.is_none() {
        missing.push("issueCategory");
    }
    if !missing.is_empty() {
        return Err(format!("Missing required fields: {}", missing.join(", ")));
    }

    let ip = new.device_ip_address.trim();
    if !ip.is_empty() && ip.parse::<IpAddr>().is_err() {
        return Err(format!("Invalid device IP address: {ip}"));
    }

    Ok(())
}

pub fn validate_update(update: &TicketUpdate, engineers: &[String]) -> Result<(), String> {
    if update.is_empty() {
        return Err("No fields to update".into());
    }
    if let Some(engineer) = &update.assigned_engineer {
        // Empty string unassigns.
        let known = engineer.is_empty() || engineers.iter().any(|e| e == engineer);
        if !engineers.is_empty() && !known {
            return Err(format!("Unknown engineer: {engineer}"));
        }
    }
    Ok(())
}

pub fn new_ticket(id: String, new: NewTicket, now: DateTime<Utc>) -> Ticket {
    Ticket {
        id,
        student_id: new.student_id.trim().to_string(),
        student_name: new.student_name.trim().to_string(),
        student_email: new.student_email.trim().to_string(),
        department: new.department,
        year: new.year,
        class_year: new.class_year,
        instructor_name: new.instructor_name,
        device_type: new.device_type,
        device_ip_address: new.device_ip_address.trim().to_string(),
        issue_description: new.issue_description,
        issue_category: new.issue_category.unwrap_or(IssueCategory::Software),
        status: TicketStatus::Open,
        created_at: now,
        updated_at: now,
        estimated_repair_time: None,
        priority: new.priority,
        notes: new.notes,
        internal_notes: None,
        is_external: false,
        external_repair_company: None,
        external_tracking_number: None,
        assigned_engineer: None,
        report_file: None,
    }
}

/// Applies the given fields and stamps `updated_at`. Any status may follow
/// any other. `updated_at` never falls behind `created_at`, even if the
/// clock went backwards.
pub fn apply_update(ticket: &mut Ticket, update: TicketUpdate, now: DateTime<Utc>) {
    if let Some(status) = update.status {
        ticket.status = status;
    }
    if let Some(priority) = update.priority {
        ticket.priority = Some(priority);
    }
    if let Some(engineer) = update.assigned_engineer {
        ticket.assigned_engineer = Some(engineer).filter(|e| !e.is_empty());
    }
    if let Some(notes) = update.notes {
        ticket.notes = Some(notes);
    }
    if let Some(internal_notes) = update.internal_notes {
        ticket.internal_notes = Some(internal_notes);
    }
    if let Some(eta) = update.estimated_repair_time {
        ticket.estimated_repair_time = Some(eta);
    }
    if let Some(is_external) = update.is_external {
        ticket.is_external = is_external;
    }
    if let Some(company) = update.external_repair_company {
        ticket.external_repair_company = Some(company);
    }
    if let Some(tracking) = update.external_tracking_number {
        ticket.external_tracking_number = Some(tracking);
    }
    if let Some(report) = update.report_file {
        ticket.report_file = Some(report);
    }
    ticket.updated_at = now.max(ticket.created_at);
}
