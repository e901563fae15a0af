// League membership records: users, teams, players and contracts.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::{LeagueError, Result};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub is_commissioner: bool,
    pub is_admin: bool,
}

impl User {
    /// Commissioners and admins may vote on trades.
    pub fn can_vote(&self) -> bool {
        self.is_commissioner || self.is_admin
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: i64,
    pub name: String,
    /// Real-world team affiliation. Players without one are never auto-picked
    /// from the pool.
    pub real_team: Option<String>,
    pub relevance: f64,
    pub is_ir: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: i64,
    pub player_id: Option<i64>,
    pub team_id: Option<i64>,
    pub start_year: i32,
    pub duration: u32,
    pub salary: f64,
    pub is_rfa: bool,
    pub team_option: bool,
}

impl Contract {
    /// Contract years left as of `year`. Zero or negative means expired.
    pub fn years_remaining(&self, year: i32) -> i32 {
        self.start_year + self.duration as i32 - year
    }
}

/// Salary and head count used for cap checks. IR players are excluded.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TeamTotals {
    pub salary: f64,
    pub players: i64,
}

// ---------------------------------------------------------------------------
// Inserts
// ---------------------------------------------------------------------------

pub fn insert_user(
    conn: &Connection,
    username: &str,
    is_commissioner: bool,
    is_admin: bool,
) -> Result<User> {
    conn.execute(
        "INSERT INTO users (username, is_commissioner, is_admin) VALUES (?1, ?2, ?3)",
        params![username, is_commissioner, is_admin],
    )?;
    Ok(User {
        id: conn.last_insert_rowid(),
        username: username.to_string(),
        is_commissioner,
        is_admin,
    })
}

pub fn insert_team(conn: &Connection, name: &str, owner_id: i64) -> Result<Team> {
    conn.execute(
        "INSERT INTO teams (name, owner_id) VALUES (?1, ?2)",
        params![name, owner_id],
    )?;
    Ok(Team {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        owner_id,
    })
}

pub fn insert_player(
    conn: &Connection,
    name: &str,
    real_team: Option<&str>,
    relevance: f64,
) -> Result<Player> {
    conn.execute(
        "INSERT INTO players (name, real_team, relevance) VALUES (?1, ?2, ?3)",
        params![name, real_team, relevance],
    )?;
    Ok(Player {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        real_team: real_team.map(str::to_string),
        relevance,
        is_ir: false,
    })
}

pub fn set_injured(conn: &Connection, player_id: i64, is_ir: bool) -> Result<()> {
    let changed = conn.execute(
        "UPDATE players SET is_ir = ?2 WHERE id = ?1",
        params![player_id, is_ir],
    )?;
    if changed == 0 {
        return Err(LeagueError::not_found("player", player_id));
    }
    Ok(())
}

/// Insert a contract. `id` on the argument is ignored.
pub fn insert_contract(conn: &Connection, contract: &Contract) -> Result<Contract> {
    conn.execute(
        "INSERT INTO contracts (player_id, team_id, start_year, duration, salary, is_rfa, team_option)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            contract.player_id,
            contract.team_id,
            contract.start_year,
            contract.duration,
            contract.salary,
            contract.is_rfa,
            contract.team_option,
        ],
    )?;
    Ok(Contract {
        id: conn.last_insert_rowid(),
        ..contract.clone()
    })
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        is_commissioner: row.get(2)?,
        is_admin: row.get(3)?,
    })
}

pub fn user(conn: &Connection, id: i64) -> Result<User> {
    conn.query_row(
        "SELECT id, username, is_commissioner, is_admin FROM users WHERE id = ?1",
        [id],
        user_from_row,
    )
    .optional()?
    .ok_or_else(|| LeagueError::not_found("user", id))
}

/// Everyone allowed to vote on trades, ordered by id.
pub fn voters(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, is_commissioner, is_admin FROM users
         WHERE is_commissioner = 1 OR is_admin = 1 ORDER BY id",
    )?;
    let users = stmt
        .query_map([], user_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(users)
}

pub fn team(conn: &Connection, id: i64) -> Result<Team> {
    conn.query_row(
        "SELECT id, name, owner_id FROM teams WHERE id = ?1",
        [id],
        |row| {
            Ok(Team {
                id: row.get(0)?,
                name: row.get(1)?,
                owner_id: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| LeagueError::not_found("team", id))
}

pub fn team_ids(conn: &Connection) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM teams ORDER BY id")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(ids)
}

pub fn player(conn: &Connection, id: i64) -> Result<Player> {
    conn.query_row(
        "SELECT id, name, real_team, relevance, is_ir FROM players WHERE id = ?1",
        [id],
        |row| {
            Ok(Player {
                id: row.get(0)?,
                name: row.get(1)?,
                real_team: row.get(2)?,
                relevance: row.get(3)?,
                is_ir: row.get(4)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| LeagueError::not_found("player", id))
}

fn contract_from_row(row: &Row<'_>) -> rusqlite::Result<Contract> {
    Ok(Contract {
        id: row.get(0)?,
        player_id: row.get(1)?,
        team_id: row.get(2)?,
        start_year: row.get(3)?,
        duration: row.get(4)?,
        salary: row.get(5)?,
        is_rfa: row.get(6)?,
        team_option: row.get(7)?,
    })
}

const CONTRACT_COLUMNS: &str =
    "id, player_id, team_id, start_year, duration, salary, is_rfa, team_option";

pub fn contract(conn: &Connection, id: i64) -> Result<Contract> {
    conn.query_row(
        &format!("SELECT {CONTRACT_COLUMNS} FROM contracts WHERE id = ?1"),
        [id],
        contract_from_row,
    )
    .optional()?
    .ok_or_else(|| LeagueError::not_found("contract", id))
}

/// A player is rostered once any contract names them.
pub fn is_rostered(conn: &Connection, player_id: i64) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM contracts WHERE player_id = ?1)",
        [player_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn team_totals(conn: &Connection, team_id: i64) -> Result<TeamTotals> {
    let (salary, players) = conn.query_row(
        "SELECT COALESCE(SUM(c.salary), 0.0), COUNT(c.id)
         FROM contracts c JOIN players p ON p.id = c.player_id
         WHERE c.team_id = ?1 AND p.is_ir = 0",
        [team_id],
        |row| Ok((row.get::<_, f64>(0)?, row.get::<_, i64>(1)?)),
    )?;
    Ok(TeamTotals { salary, players })
}

/// Move a contract to another team (or to no team).
pub fn assign_contract(
    conn: &Connection,
    contract_id: i64,
    player_id: Option<i64>,
    team_id: Option<i64>,
) -> Result<()> {
    let changed = conn.execute(
        "UPDATE contracts SET player_id = ?2, team_id = ?3 WHERE id = ?1",
        params![contract_id, player_id, team_id],
    )?;
    if changed == 0 {
        return Err(LeagueError::not_found("contract", contract_id));
    }
    Ok(())
}

/// Hand a signed contract to another team, keeping its player.
pub fn set_contract_team(conn: &Connection, contract_id: i64, team_id: i64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE contracts SET team_id = ?2 WHERE id = ?1",
        params![contract_id, team_id],
    )?;
    if changed == 0 {
        return Err(LeagueError::not_found("contract", contract_id));
    }
    Ok(())
}
