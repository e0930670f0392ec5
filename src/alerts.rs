use crate::db;
use crate::ipc::error::ApiError;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertType {
    Academic,
    Attendance,
    Behavioral,
    Health,
    Bullying,
    HomeIssue,
    Other,
}

impl AlertType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "academic" => Some(AlertType::Academic),
            "attendance" => Some(AlertType::Attendance),
            "behavioral" => Some(AlertType::Behavioral),
            "health" => Some(AlertType::Health),
            "bullying" => Some(AlertType::Bullying),
            "home_issue" => Some(AlertType::HomeIssue),
            "other" => Some(AlertType::Other),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::Academic => "academic",
            AlertType::Attendance => "attendance",
            AlertType::Behavioral => "behavioral",
            AlertType::Health => "health",
            AlertType::Bullying => "bullying",
            AlertType::HomeIssue => "home_issue",
            AlertType::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl AlertPriority {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(AlertPriority::Low),
            "normal" => Some(AlertPriority::Normal),
            "high" => Some(AlertPriority::High),
            "urgent" => Some(AlertPriority::Urgent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertPriority::Low => "low",
            AlertPriority::Normal => "normal",
            AlertPriority::High => "high",
            AlertPriority::Urgent => "urgent",
        }
    }

    /// High and urgent alerts escalate to a school-scoped admin notification.
    pub fn escalates(self) -> bool {
        matches!(self, AlertPriority::High | AlertPriority::Urgent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    Active,
    InProgress,
    Resolved,
    Escalated,
}

impl AlertStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AlertStatus::Active),
            "in_progress" => Some(AlertStatus::InProgress),
            "resolved" => Some(AlertStatus::Resolved),
            "escalated" => Some(AlertStatus::Escalated),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::InProgress => "in_progress",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Escalated => "escalated",
        }
    }
}

/// active -> in_progress | escalated | resolved; in_progress -> escalated |
/// resolved; escalated -> resolved. Resolved is terminal.
pub fn valid_transition(from: AlertStatus, to: AlertStatus) -> bool {
    use AlertStatus::*;
    match (from, to) {
        (Active, InProgress) | (Active, Escalated) | (Active, Resolved) => true,
        (InProgress, Escalated) | (InProgress, Resolved) => true,
        (Escalated, Resolved) => true,
        _ => false,
    }
}

pub struct AlertContext<'a> {
    pub alert_id: &'a str,
    pub school_id: &'a str,
    pub student_user_id: &'a str,
    pub student_name: &'a str,
    pub creator_name: &'a str,
    pub title: &'a str,
    pub priority: AlertPriority,
}

/// Emits the notification side effects of a newly created alert: always one
/// student-targeted record, plus one school-scoped admin record when the
/// priority escalates. Runs against the same transaction that inserts the
/// alert row, so the escalation trigger is atomic with alert creation.
pub fn emit_alert_notifications(
    conn: &Connection,
    ctx: &AlertContext<'_>,
) -> Result<usize, ApiError> {
    let kind = if ctx.priority.escalates() {
        "warning"
    } else {
        "info"
    };
    conn.execute(
        "INSERT INTO notifications(id, user_id, school_id, type, priority, title, body, is_read, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)",
        (
            db::new_id(),
            ctx.student_user_id,
            ctx.school_id,
            kind,
            ctx.priority.as_str(),
            format!("New alert: {}", ctx.title),
            format!(
                "{} raised a {} alert concerning you: {}",
                ctx.creator_name,
                ctx.priority.as_str(),
                ctx.title
            ),
            db::now_ts(),
        ),
    )?;
    let mut created = 1;

    if ctx.priority.escalates() {
        conn.execute(
            "INSERT INTO notifications(id, user_id, school_id, type, priority, title, body, is_read, created_at)
             VALUES (?, NULL, ?, 'alert', ?, ?, ?, 0, ?)",
            (
                db::new_id(),
                ctx.school_id,
                ctx.priority.as_str(),
                "High-priority student alert",
                format!(
                    "{} raised a {} alert for {}: {}",
                    ctx.creator_name,
                    ctx.priority.as_str(),
                    ctx.student_name,
                    ctx.title
                ),
                db::now_ts(),
            ),
        )?;
        created += 1;
        tracing::info!(
            alert_id = ctx.alert_id,
            school_id = ctx.school_id,
            priority = ctx.priority.as_str(),
            "alert escalated to admin notification"
        );
    }

    Ok(created)
}
