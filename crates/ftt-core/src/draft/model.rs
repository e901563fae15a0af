// Draft and draft-position records and their storage.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::draft::clock::ActiveHours;
use crate::error::{LeagueError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub id: i64,
    pub year: i32,
    pub rounds: u32,
    pub starts_at: Option<DateTime<Utc>>,
    pub time_limit_minutes: u32,
    pub active_hours: ActiveHours,
    pub is_completed: bool,
    pub is_league_draft: bool,
}

impl Draft {
    /// A draft is live once its start time has passed and it is not done.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.is_completed && self.starts_at.map_or(true, |starts| starts <= now)
    }
}

/// Parameters for creating a draft.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDraft {
    pub year: i32,
    pub rounds: u32,
    pub team_ids: Vec<i64>,
    pub player_ids: Vec<i64>,
    pub starts_at: Option<DateTime<Utc>>,
    pub time_limit_minutes: u32,
    pub active_hour_start: u32,
    pub active_hour_end: u32,
    pub is_league_draft: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftPosition {
    pub id: i64,
    pub draft_id: i64,
    pub pick_id: Option<i64>,
    pub overall_pick: u32,
    pub round: u32,
    pub round_pick: u32,
    pub selected_player_id: Option<i64>,
    pub is_current: bool,
    pub is_pick_made: bool,
    pub is_auto_pick: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub pick_made_at: Option<DateTime<Utc>>,
    pub contract_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Drafts
// ---------------------------------------------------------------------------

const DRAFT_COLUMNS: &str = "id, year, rounds, starts_at, time_limit_minutes, \
     active_hour_start, active_hour_end, is_completed, is_league_draft";

struct DraftRow {
    draft: Draft,
    hour_start: u32,
    hour_end: u32,
}

fn draft_from_row(row: &Row<'_>) -> rusqlite::Result<DraftRow> {
    let hour_start: u32 = row.get(5)?;
    let hour_end: u32 = row.get(6)?;
    Ok(DraftRow {
        draft: Draft {
            id: row.get(0)?,
            year: row.get(1)?,
            rounds: row.get(2)?,
            starts_at: row.get(3)?,
            time_limit_minutes: row.get(4)?,
            active_hours: ActiveHours::default(),
            is_completed: row.get(7)?,
            is_league_draft: row.get(8)?,
        },
        hour_start,
        hour_end,
    })
}

fn finish_draft(row: DraftRow) -> Result<Draft> {
    let mut draft = row.draft;
    draft.active_hours = ActiveHours::new(row.hour_start, row.hour_end)?;
    Ok(draft)
}

pub fn insert_draft(conn: &Connection, new: &NewDraft, now: DateTime<Utc>) -> Result<Draft> {
    if new.rounds == 0 {
        return Err(LeagueError::InvalidDraftConfiguration(
            "a draft needs at least one round".into(),
        ));
    }
    if new.time_limit_minutes == 0 {
        return Err(LeagueError::InvalidDraftConfiguration(
            "pick time limit must be positive".into(),
        ));
    }
    let hours = ActiveHours::new(new.active_hour_start, new.active_hour_end)?;
    let taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM drafts WHERE year = ?1 AND is_league_draft = ?2)",
        params![new.year, new.is_league_draft],
        |row| row.get(0),
    )?;
    if taken {
        let kind = if new.is_league_draft { "league" } else { "rookie" };
        return Err(LeagueError::InvalidDraftConfiguration(format!(
            "a {kind} draft for {} already exists",
            new.year
        )));
    }
    conn.execute(
        "INSERT INTO drafts (year, rounds, starts_at, time_limit_minutes, active_hour_start,
                             active_hour_end, is_league_draft, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            new.year,
            new.rounds,
            new.starts_at,
            new.time_limit_minutes,
            hours.start_hour(),
            hours.end_hour(),
            new.is_league_draft,
            now,
        ],
    )?;
    let id = conn.last_insert_rowid();

    for team_id in &new.team_ids {
        conn.execute(
            "INSERT INTO draft_teams (draft_id, team_id) VALUES (?1, ?2)",
            params![id, team_id],
        )?;
    }
    for player_id in &new.player_ids {
        conn.execute(
            "INSERT OR IGNORE INTO draft_pool (draft_id, player_id) VALUES (?1, ?2)",
            params![id, player_id],
        )?;
    }

    Ok(Draft {
        id,
        year: new.year,
        rounds: new.rounds,
        starts_at: new.starts_at,
        time_limit_minutes: new.time_limit_minutes,
        active_hours: hours,
        is_completed: false,
        is_league_draft: new.is_league_draft,
    })
}

pub fn draft(conn: &Connection, id: i64) -> Result<Draft> {
    let row = conn
        .query_row(
            &format!("SELECT {DRAFT_COLUMNS} FROM drafts WHERE id = ?1"),
            [id],
            draft_from_row,
        )
        .optional()?
        .ok_or_else(|| LeagueError::not_found("draft", id))?;
    finish_draft(row)
}

/// Drafts that are not completed, ordered by id.
pub fn open_drafts(conn: &Connection) -> Result<Vec<Draft>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DRAFT_COLUMNS} FROM drafts WHERE is_completed = 0 ORDER BY id"
    ))?;
    let rows = stmt
        .query_map([], draft_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(finish_draft).collect()
}

pub fn mark_completed(conn: &Connection, draft_id: i64) -> Result<()> {
    conn.execute("UPDATE drafts SET is_completed = 1 WHERE id = ?1", [draft_id])?;
    Ok(())
}

pub fn draft_team_ids(conn: &Connection, draft_id: i64) -> Result<Vec<i64>> {
    let mut stmt =
        conn.prepare("SELECT team_id FROM draft_teams WHERE draft_id = ?1 ORDER BY team_id")?;
    let ids = stmt
        .query_map([draft_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(ids)
}

// ---------------------------------------------------------------------------
// Player pool
// ---------------------------------------------------------------------------

pub fn in_pool(conn: &Connection, draft_id: i64, player_id: i64) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM draft_pool WHERE draft_id = ?1 AND player_id = ?2)",
        params![draft_id, player_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn remove_from_pool(conn: &Connection, draft_id: i64, player_id: i64) -> Result<()> {
    conn.execute(
        "DELETE FROM draft_pool WHERE draft_id = ?1 AND player_id = ?2",
        params![draft_id, player_id],
    )?;
    Ok(())
}

pub fn pool_size(conn: &Connection, draft_id: i64) -> Result<usize> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM draft_pool WHERE draft_id = ?1",
        [draft_id],
        |row| row.get(0),
    )?;
    Ok(n as usize)
}

/// Highest-relevance pool player with a real-world team and no contract.
/// Ties go to the lowest player id.
pub fn best_available(conn: &Connection, draft_id: i64) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT p.id FROM draft_pool dp JOIN players p ON p.id = dp.player_id
             WHERE dp.draft_id = ?1 AND p.real_team IS NOT NULL
               AND NOT EXISTS (SELECT 1 FROM contracts c WHERE c.player_id = p.id)
             ORDER BY p.relevance DESC, p.id ASC
             LIMIT 1",
            [draft_id],
            |row| row.get(0),
        )
        .optional()?)
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

const POSITION_COLUMNS: &str = "id, draft_id, pick_id, overall_pick, round, round_pick, \
     selected_player_id, is_current, is_pick_made, is_auto_pick, started_at, pick_made_at, \
     contract_id";

fn position_from_row(row: &Row<'_>) -> rusqlite::Result<DraftPosition> {
    Ok(DraftPosition {
        id: row.get(0)?,
        draft_id: row.get(1)?,
        pick_id: row.get(2)?,
        overall_pick: row.get(3)?,
        round: row.get(4)?,
        round_pick: row.get(5)?,
        selected_player_id: row.get(6)?,
        is_current: row.get(7)?,
        is_pick_made: row.get(8)?,
        is_auto_pick: row.get(9)?,
        started_at: row.get(10)?,
        pick_made_at: row.get(11)?,
        contract_id: row.get(12)?,
    })
}

pub struct NewPosition {
    pub pick_id: i64,
    pub overall_pick: u32,
    pub round: u32,
    pub round_pick: u32,
    pub contract_id: i64,
}

pub fn insert_position(conn: &Connection, draft_id: i64, new: &NewPosition) -> Result<i64> {
    conn.execute(
        "INSERT INTO draft_positions (draft_id, pick_id, overall_pick, round, round_pick, contract_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            draft_id,
            new.pick_id,
            new.overall_pick,
            new.round,
            new.round_pick,
            new.contract_id
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn position(conn: &Connection, id: i64) -> Result<DraftPosition> {
    conn.query_row(
        &format!("SELECT {POSITION_COLUMNS} FROM draft_positions WHERE id = ?1"),
        [id],
        position_from_row,
    )
    .optional()?
    .ok_or_else(|| LeagueError::not_found("draft position", id))
}

pub fn positions(conn: &Connection, draft_id: i64) -> Result<Vec<DraftPosition>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {POSITION_COLUMNS} FROM draft_positions WHERE draft_id = ?1 ORDER BY overall_pick"
    ))?;
    let rows = stmt
        .query_map([draft_id], position_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn position_count(conn: &Connection, draft_id: i64) -> Result<u32> {
    let n: u32 = conn.query_row(
        "SELECT COUNT(*) FROM draft_positions WHERE draft_id = ?1",
        [draft_id],
        |row| row.get(0),
    )?;
    Ok(n)
}

pub fn current_position(conn: &Connection, draft_id: i64) -> Result<Option<DraftPosition>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {POSITION_COLUMNS} FROM draft_positions
                 WHERE draft_id = ?1 AND is_current = 1"
            ),
            [draft_id],
            position_from_row,
        )
        .optional()?)
}

pub fn position_at(
    conn: &Connection,
    draft_id: i64,
    overall_pick: u32,
) -> Result<Option<DraftPosition>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {POSITION_COLUMNS} FROM draft_positions
                 WHERE draft_id = ?1 AND overall_pick = ?2"
            ),
            params![draft_id, overall_pick],
            position_from_row,
        )
        .optional()?)
}

/// Record a selection and take the position off the clock.
pub fn record_selection(
    conn: &Connection,
    position_id: i64,
    player_id: i64,
    is_auto_pick: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let changed = conn.execute(
        "UPDATE draft_positions
         SET selected_player_id = ?2, is_pick_made = 1, is_auto_pick = ?3,
             pick_made_at = ?4, is_current = 0
         WHERE id = ?1 AND is_pick_made = 0 AND is_current = 1",
        params![position_id, player_id, is_auto_pick, now],
    )?;
    if changed == 0 {
        return Err(LeagueError::ConcurrentModification(format!(
            "draft position {position_id} changed while picking"
        )));
    }
    Ok(())
}

/// Put a position on the clock.
pub fn start_clock(conn: &Connection, position_id: i64, started_at: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE draft_positions SET is_current = 1, started_at = ?2 WHERE id = ?1",
        params![position_id, started_at],
    )?;
    Ok(())
}
