// Notification outbox: events written alongside state changes, drained later.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Success => "success",
            Level::Warning => "warning",
            Level::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Level {
        match s {
            "success" => Level::Success,
            "warning" => Level::Warning,
            "error" => Level::Error,
            _ => Level::Info,
        }
    }
}

/// A message for one user, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub user_id: i64,
    pub message: String,
    pub level: Level,
    pub redirect_to: Option<String>,
}

impl Notification {
    pub fn new(user_id: i64, message: impl Into<String>, level: Level) -> Self {
        Notification {
            user_id,
            message: message.into(),
            level,
            redirect_to: None,
        }
    }

    pub fn with_redirect(mut self, redirect: impl Into<String>) -> Self {
        self.redirect_to = Some(redirect.into());
        self
    }
}

/// An outbox row awaiting delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingNotification {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub message: String,
    pub level: Level,
    pub redirect_to: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Outbox writes (called inside service transactions)
// ---------------------------------------------------------------------------

pub fn enqueue(conn: &Connection, note: &Notification, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "INSERT INTO notifications (user_id, message, level, redirect_to, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            note.user_id,
            note.message,
            note.level.as_str(),
            note.redirect_to,
            now
        ],
    )?;
    Ok(())
}

/// Queue a message for the owner of `team_id`.
pub fn notify_team(
    conn: &Connection,
    team_id: i64,
    message: impl Into<String>,
    level: Level,
    redirect: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    let owner: Option<i64> = conn
        .query_row("SELECT owner_id FROM teams WHERE id = ?1", [team_id], |r| r.get(0))
        .optional()?;
    let Some(owner) = owner else {
        tracing::warn!(team_id, "notification dropped: team has no owner");
        return Ok(());
    };
    let mut note = Notification::new(owner, message, level);
    if let Some(redirect) = redirect {
        note = note.with_redirect(redirect);
    }
    enqueue(conn, &note, now)
}

// ---------------------------------------------------------------------------
// Outbox reads (dispatcher side)
// ---------------------------------------------------------------------------

/// Undelivered notifications with fewer than `max_attempts` tries, least
/// tried first and then oldest, at most `limit`. Rows that reach the cap are
/// left in place as dead letters.
pub fn pending(conn: &Connection, limit: u32, max_attempts: u32) -> Result<Vec<PendingNotification>> {
    let mut stmt = conn.prepare(
        "SELECT n.id, n.user_id, u.username, n.message, n.level, n.redirect_to,
                n.attempts, n.created_at
         FROM notifications n JOIN users u ON u.id = n.user_id
         WHERE n.delivered_at IS NULL AND n.attempts < ?2
         ORDER BY n.attempts, n.id
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit, max_attempts], |row| {
            Ok(PendingNotification {
                id: row.get(0)?,
                user_id: row.get(1)?,
                username: row.get(2)?,
                message: row.get(3)?,
                level: Level::parse(&row.get::<_, String>(4)?),
                redirect_to: row.get(5)?,
                attempts: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn mark_delivered(conn: &Connection, id: i64, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE notifications SET delivered_at = ?2, attempts = attempts + 1 WHERE id = ?1",
        params![id, now],
    )?;
    Ok(())
}

pub fn record_failure(conn: &Connection, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE notifications SET attempts = attempts + 1 WHERE id = ?1",
        [id],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Message helpers
// ---------------------------------------------------------------------------

/// English ordinal suffix: 1st, 2nd, 3rd, 4th, 11th, 12th, 13th, 21st...
pub fn ordinal_suffix(n: u32) -> &'static str {
    if (11..=13).contains(&(n % 100)) {
        return "th";
    }
    match n % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

/// "2025 league draft" or "2025 draft".
pub fn draft_label(year: i32, is_league_draft: bool) -> String {
    if is_league_draft {
        format!("{year} league draft")
    } else {
        format!("{year} draft")
    }
}

/// Hours in a pick limit, without a trailing `.0` for whole hours.
pub fn hours_label(limit_minutes: u32) -> String {
    let plural = if limit_minutes == 60 { "" } else { "s" };
    if limit_minutes % 60 == 0 {
        format!("{} hour{plural}", limit_minutes / 60)
    } else {
        format!("{} hour{plural}", f64::from(limit_minutes) / 60.0)
    }
}
