// Draft pick assets and their typed protection rules.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::{LeagueError, Result};

/// Conditional conveyance attached to a pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Protection {
    None,
    /// Protected when it lands in the top `top` picks; rolls to `rollover_year`.
    TopX { top: u32, rollover_year: i32 },
    /// Swaps with the target when this pick lands earlier.
    SwapBest { target_pick_id: i64 },
    /// Swaps with the target when this pick lands later.
    SwapWorst { target_pick_id: i64 },
    /// Stays with the original team when it lands in `[range_start, range_end]`.
    DoesntConvey {
        range_start: u32,
        range_end: u32,
        rollover_year: i32,
    },
}

impl Protection {
    pub fn kind(&self) -> &'static str {
        match self {
            Protection::None => "none",
            Protection::TopX { .. } => "top_x",
            Protection::SwapBest { .. } => "swap_best",
            Protection::SwapWorst { .. } => "swap_worst",
            Protection::DoesntConvey { .. } => "doesnt_convey",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Protection::None)
    }

    pub fn swap_target(&self) -> Option<i64> {
        match self {
            Protection::SwapBest { target_pick_id } | Protection::SwapWorst { target_pick_id } => {
                Some(*target_pick_id)
            }
            _ => None,
        }
    }

    /// Flatten into the nullable storage columns
    /// `(type, range_start, range_end, swap_target, rollover_year)`.
    pub(crate) fn to_columns(self) -> ProtectionColumns {
        let mut cols = ProtectionColumns {
            kind: self.kind().to_string(),
            ..ProtectionColumns::default()
        };
        match self {
            Protection::None => {}
            Protection::TopX { top, rollover_year } => {
                cols.range_start = Some(1);
                cols.range_end = Some(top);
                cols.rollover_year = Some(rollover_year);
            }
            Protection::SwapBest { target_pick_id } | Protection::SwapWorst { target_pick_id } => {
                cols.swap_target = Some(target_pick_id);
            }
            Protection::DoesntConvey {
                range_start,
                range_end,
                rollover_year,
            } => {
                cols.range_start = Some(range_start);
                cols.range_end = Some(range_end);
                cols.rollover_year = Some(rollover_year);
            }
        }
        cols
    }

    pub(crate) fn from_columns(cols: &ProtectionColumns) -> Result<Protection> {
        let missing = |field: &str| {
            LeagueError::ProtectionConfiguration(format!("{} protection is missing {field}", cols.kind))
        };
        let protection = match cols.kind.as_str() {
            "none" => Protection::None,
            "top_x" => Protection::TopX {
                top: cols.range_end.ok_or_else(|| missing("range end"))?,
                rollover_year: cols.rollover_year.ok_or_else(|| missing("rollover year"))?,
            },
            "swap_best" => Protection::SwapBest {
                target_pick_id: cols.swap_target.ok_or_else(|| missing("swap target"))?,
            },
            "swap_worst" => Protection::SwapWorst {
                target_pick_id: cols.swap_target.ok_or_else(|| missing("swap target"))?,
            },
            "doesnt_convey" => Protection::DoesntConvey {
                range_start: cols.range_start.ok_or_else(|| missing("range start"))?,
                range_end: cols.range_end.ok_or_else(|| missing("range end"))?,
                rollover_year: cols.rollover_year.ok_or_else(|| missing("rollover year"))?,
            },
            other => {
                return Err(LeagueError::ProtectionConfiguration(format!(
                    "unknown protection type `{other}`"
                )))
            }
        };
        Ok(protection)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ProtectionColumns {
    pub kind: String,
    pub range_start: Option<u32>,
    pub range_end: Option<u32>,
    pub swap_target: Option<i64>,
    pub rollover_year: Option<i32>,
}

/// A draft pick asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    pub id: i64,
    pub original_team_id: i64,
    pub current_team_id: i64,
    pub draft_year: i32,
    pub round: u32,
    pub from_league_draft: bool,
    pub protection: Protection,
    pub actual_pick_number: Option<u32>,
    pub is_conveyed: bool,
}

/// Fields for minting a pick.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPick {
    pub original_team_id: i64,
    pub current_team_id: i64,
    pub draft_year: i32,
    pub round: u32,
    pub from_league_draft: bool,
    pub protection: Protection,
}

impl NewPick {
    /// An unprotected pick still held by its original team.
    pub fn own(team_id: i64, draft_year: i32, round: u32) -> Self {
        NewPick {
            original_team_id: team_id,
            current_team_id: team_id,
            draft_year,
            round,
            from_league_draft: false,
            protection: Protection::None,
        }
    }
}

/// Check a protection against the pick it will be attached to.
pub fn validate_protection(
    conn: &Connection,
    pick_id: Option<i64>,
    draft_year: i32,
    round: u32,
    protection: &Protection,
) -> Result<()> {
    match *protection {
        Protection::None => Ok(()),
        Protection::TopX { top, rollover_year } => {
            if top == 0 {
                return Err(LeagueError::ProtectionConfiguration(
                    "top-x protection needs x >= 1".into(),
                ));
            }
            check_rollover(draft_year, rollover_year)
        }
        Protection::DoesntConvey {
            range_start,
            range_end,
            rollover_year,
        } => {
            if range_start == 0 || range_start > range_end {
                return Err(LeagueError::ProtectionConfiguration(format!(
                    "protected range {range_start}-{range_end} is invalid"
                )));
            }
            check_rollover(draft_year, rollover_year)
        }
        Protection::SwapBest { target_pick_id } | Protection::SwapWorst { target_pick_id } => {
            if pick_id == Some(target_pick_id) {
                return Err(LeagueError::ProtectionConfiguration(
                    "cannot swap a pick with itself".into(),
                ));
            }
            let target = find(conn, target_pick_id)?.ok_or_else(|| {
                LeagueError::ProtectionConfiguration(format!(
                    "swap target pick {target_pick_id} does not exist"
                ))
            })?;
            if target.draft_year != draft_year || target.round != round {
                return Err(LeagueError::ProtectionConfiguration(format!(
                    "swap target must be a {draft_year} round {round} pick, got {} round {}",
                    target.draft_year, target.round
                )));
            }
            Ok(())
        }
    }
}

fn check_rollover(draft_year: i32, rollover_year: i32) -> Result<()> {
    if rollover_year <= draft_year {
        return Err(LeagueError::ProtectionConfiguration(format!(
            "rollover year {rollover_year} must be after {draft_year}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

const PICK_COLUMNS: &str = "id, original_team_id, current_team_id, draft_year, round, \
     from_league_draft, protection_type, range_start, range_end, swap_target_id, \
     rollover_year, actual_pick_number, is_conveyed";

struct PickRow {
    pick: Pick,
    protection: ProtectionColumns,
}

fn pick_from_row(row: &Row<'_>) -> rusqlite::Result<PickRow> {
    Ok(PickRow {
        pick: Pick {
            id: row.get(0)?,
            original_team_id: row.get(1)?,
            current_team_id: row.get(2)?,
            draft_year: row.get(3)?,
            round: row.get(4)?,
            from_league_draft: row.get(5)?,
            protection: Protection::None,
            actual_pick_number: row.get(11)?,
            is_conveyed: row.get(12)?,
        },
        protection: ProtectionColumns {
            kind: row.get(6)?,
            range_start: row.get(7)?,
            range_end: row.get(8)?,
            swap_target: row.get(9)?,
            rollover_year: row.get(10)?,
        },
    })
}

fn finish(row: PickRow) -> Result<Pick> {
    let mut pick = row.pick;
    pick.protection = Protection::from_columns(&row.protection)?;
    Ok(pick)
}

pub fn insert(conn: &Connection, new: &NewPick) -> Result<Pick> {
    validate_protection(conn, None, new.draft_year, new.round, &new.protection)?;
    let cols = new.protection.to_columns();
    conn.execute(
        "INSERT INTO picks (original_team_id, current_team_id, draft_year, round,
                            from_league_draft, protection_type, range_start, range_end,
                            swap_target_id, rollover_year)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            new.original_team_id,
            new.current_team_id,
            new.draft_year,
            new.round,
            new.from_league_draft,
            cols.kind,
            cols.range_start,
            cols.range_end,
            cols.swap_target,
            cols.rollover_year,
        ],
    )?;
    Ok(Pick {
        id: conn.last_insert_rowid(),
        original_team_id: new.original_team_id,
        current_team_id: new.current_team_id,
        draft_year: new.draft_year,
        round: new.round,
        from_league_draft: new.from_league_draft,
        protection: new.protection,
        actual_pick_number: None,
        is_conveyed: true,
    })
}

pub fn find(conn: &Connection, id: i64) -> Result<Option<Pick>> {
    let row = conn
        .query_row(
            &format!("SELECT {PICK_COLUMNS} FROM picks WHERE id = ?1"),
            [id],
            pick_from_row,
        )
        .optional()?;
    row.map(finish).transpose()
}

pub fn get(conn: &Connection, id: i64) -> Result<Pick> {
    find(conn, id)?.ok_or_else(|| LeagueError::not_found("pick", id))
}

/// The non-league pick for an original team's slot, if one exists.
pub fn find_slot(
    conn: &Connection,
    original_team_id: i64,
    draft_year: i32,
    round: u32,
) -> Result<Option<Pick>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {PICK_COLUMNS} FROM picks
                 WHERE original_team_id = ?1 AND draft_year = ?2 AND round = ?3
                   AND from_league_draft = 0
                 ORDER BY id LIMIT 1"
            ),
            params![original_team_id, draft_year, round],
            pick_from_row,
        )
        .optional()?;
    row.map(finish).transpose()
}

/// Every pick of a year that carries a protection, ordered by id.
pub fn protected_in_year(conn: &Connection, draft_year: i32) -> Result<Vec<Pick>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PICK_COLUMNS} FROM picks
         WHERE draft_year = ?1 AND protection_type != 'none'
         ORDER BY id"
    ))?;
    let rows = stmt
        .query_map([draft_year], pick_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(finish).collect()
}

pub fn set_current_team(conn: &Connection, pick_id: i64, team_id: i64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE picks SET current_team_id = ?2 WHERE id = ?1",
        params![pick_id, team_id],
    )?;
    if changed == 0 {
        return Err(LeagueError::not_found("pick", pick_id));
    }
    Ok(())
}

/// Replace a pick's protection after validating it against the pick.
pub fn set_protection(conn: &Connection, pick_id: i64, protection: &Protection) -> Result<()> {
    let pick = get(conn, pick_id)?;
    validate_protection(conn, Some(pick.id), pick.draft_year, pick.round, protection)?;
    let cols = protection.to_columns();
    conn.execute(
        "UPDATE picks SET protection_type = ?2, range_start = ?3, range_end = ?4,
                          swap_target_id = ?5, rollover_year = ?6
         WHERE id = ?1",
        params![
            pick_id,
            cols.kind,
            cols.range_start,
            cols.range_end,
            cols.swap_target,
            cols.rollover_year
        ],
    )?;
    Ok(())
}

pub fn set_actual_number(conn: &Connection, pick_id: i64, number: u32) -> Result<()> {
    let changed = conn.execute(
        "UPDATE picks SET actual_pick_number = ?2 WHERE id = ?1",
        params![pick_id, number],
    )?;
    if changed == 0 {
        return Err(LeagueError::not_found("pick", pick_id));
    }
    Ok(())
}

pub fn set_conveyed(conn: &Connection, pick_id: i64, is_conveyed: bool) -> Result<()> {
    conn.execute(
        "UPDATE picks SET is_conveyed = ?2 WHERE id = ?1",
        params![pick_id, is_conveyed],
    )?;
    Ok(())
}
