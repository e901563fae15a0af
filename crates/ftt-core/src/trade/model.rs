// Trade records: status machine states, assets, responses and votes.

use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::draft::pick::{Protection, ProtectionColumns};
use crate::error::{LeagueError, Result};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Draft,
    Proposed,
    Accepted,
    Rejected,
    Cancelled,
    WaitingApproval,
    Approved,
    Vetoed,
    Completed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Draft => "draft",
            TradeStatus::Proposed => "proposed",
            TradeStatus::Accepted => "accepted",
            TradeStatus::Rejected => "rejected",
            TradeStatus::Cancelled => "cancelled",
            TradeStatus::WaitingApproval => "waiting_approval",
            TradeStatus::Approved => "approved",
            TradeStatus::Vetoed => "vetoed",
            TradeStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<TradeStatus> {
        let status = match s {
            "draft" => TradeStatus::Draft,
            "proposed" => TradeStatus::Proposed,
            "accepted" => TradeStatus::Accepted,
            "rejected" => TradeStatus::Rejected,
            "cancelled" => TradeStatus::Cancelled,
            "waiting_approval" => TradeStatus::WaitingApproval,
            "approved" => TradeStatus::Approved,
            "vetoed" => TradeStatus::Vetoed,
            "completed" => TradeStatus::Completed,
            _ => return None,
        };
        Some(status)
    }

    /// No further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TradeStatus::Rejected
                | TradeStatus::Cancelled
                | TradeStatus::Vetoed
                | TradeStatus::Completed
        )
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Pending,
    Accepted,
    Rejected,
    Countered,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Pending => "pending",
            ResponseStatus::Accepted => "accepted",
            ResponseStatus::Rejected => "rejected",
            ResponseStatus::Countered => "countered",
        }
    }

    fn parse(s: &str) -> ResponseStatus {
        match s {
            "accepted" => ResponseStatus::Accepted,
            "rejected" => ResponseStatus::Rejected,
            "countered" => ResponseStatus::Countered,
            _ => ResponseStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vote {
    Approve,
    Veto,
}

impl Vote {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vote::Approve => "approve",
            Vote::Veto => "veto",
        }
    }

    fn parse(s: &str) -> Vote {
        if s == "veto" {
            Vote::Veto
        } else {
            Vote::Approve
        }
    }
}

/// What a traded asset points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssetRef {
    Player { contract_id: i64 },
    Pick { pick_id: i64 },
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeAsset {
    pub id: i64,
    pub trade_id: i64,
    pub sender_team_id: i64,
    pub receiver_team_id: i64,
    pub asset: AssetRef,
    /// Replaces the pick's protection when the trade executes.
    pub protection_override: Option<Protection>,
}

/// An asset to attach to a new trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAsset {
    pub sender_team_id: i64,
    pub receiver_team_id: i64,
    pub asset: AssetRef,
    #[serde(default)]
    pub protection_override: Option<Protection>,
}

impl NewAsset {
    pub fn player(from: i64, to: i64, contract_id: i64) -> Self {
        NewAsset {
            sender_team_id: from,
            receiver_team_id: to,
            asset: AssetRef::Player { contract_id },
            protection_override: None,
        }
    }

    pub fn pick(from: i64, to: i64, pick_id: i64) -> Self {
        NewAsset {
            sender_team_id: from,
            receiver_team_id: to,
            asset: AssetRef::Pick { pick_id },
            protection_override: None,
        }
    }

    pub fn with_protection(mut self, protection: Protection) -> Self {
        self.protection_override = Some(protection);
        self
    }
}

impl From<&TradeAsset> for NewAsset {
    fn from(asset: &TradeAsset) -> Self {
        NewAsset {
            sender_team_id: asset.sender_team_id,
            receiver_team_id: asset.receiver_team_id,
            asset: asset.asset,
            protection_override: asset.protection_override,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrade {
    pub sender_team_id: i64,
    /// Teams involved. The sender is added if missing.
    pub participants: Vec<i64>,
    pub assets: Vec<NewAsset>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub sender_team_id: i64,
    pub parent_id: Option<i64>,
    pub status: TradeStatus,
    /// False once a counter-offer supersedes this trade.
    pub is_latest: bool,
    pub notes: String,
    pub participants: Vec<i64>,
    pub assets: Vec<TradeAsset>,
    pub created_at: DateTime<Utc>,
    pub proposed_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<i64>,
    pub completed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Trade {
    pub fn is_counter_offer(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn involves(&self, team_id: i64) -> bool {
        self.participants.contains(&team_id)
    }

    pub(crate) fn require(&self, allowed: &[TradeStatus], action: &'static str) -> Result<()> {
        if allowed.contains(&self.status) {
            return Ok(());
        }
        Err(LeagueError::InvalidStateTransition {
            entity: "trade",
            status: self.status.to_string(),
            action,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResponse {
    pub id: i64,
    pub trade_id: i64,
    pub team_id: i64,
    pub status: ResponseStatus,
    pub message: String,
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeVote {
    pub trade_id: i64,
    pub commissioner_id: i64,
    pub vote: Vote,
    pub notes: String,
    pub voted_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Trades
// ---------------------------------------------------------------------------

pub fn insert_trade(
    conn: &Connection,
    new: &NewTrade,
    parent_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<Trade> {
    conn.execute(
        "INSERT INTO trades (sender_team_id, parent_id, status, notes, created_at)
         VALUES (?1, ?2, 'draft', ?3, ?4)",
        params![new.sender_team_id, parent_id, new.notes, now],
    )?;
    let trade_id = conn.last_insert_rowid();

    let mut participants = new.participants.clone();
    if !participants.contains(&new.sender_team_id) {
        participants.insert(0, new.sender_team_id);
    }
    participants.dedup();
    for team_id in &participants {
        conn.execute(
            "INSERT OR IGNORE INTO trade_participants (trade_id, team_id) VALUES (?1, ?2)",
            params![trade_id, team_id],
        )?;
    }

    for asset in &new.assets {
        insert_asset(conn, trade_id, asset)?;
    }

    trade(conn, trade_id)
}

fn insert_asset(conn: &Connection, trade_id: i64, asset: &NewAsset) -> Result<()> {
    let (contract_id, pick_id) = match asset.asset {
        AssetRef::Player { contract_id } => (Some(contract_id), None),
        AssetRef::Pick { pick_id } => (None, Some(pick_id)),
    };
    let cols = asset.protection_override.map(Protection::to_columns);
    conn.execute(
        "INSERT INTO trade_assets (trade_id, sender_team_id, receiver_team_id, contract_id,
                                   pick_id, override_type, override_start, override_end,
                                   override_target_id, override_rollover)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            trade_id,
            asset.sender_team_id,
            asset.receiver_team_id,
            contract_id,
            pick_id,
            cols.as_ref().map(|c| c.kind.clone()),
            cols.as_ref().and_then(|c| c.range_start),
            cols.as_ref().and_then(|c| c.range_end),
            cols.as_ref().and_then(|c| c.swap_target),
            cols.as_ref().and_then(|c| c.rollover_year),
        ],
    )?;
    Ok(())
}

const TRADE_COLUMNS: &str = "id, sender_team_id, parent_id, status, is_latest, notes, \
     created_at, proposed_at, approved_at, approved_by, completed_at, closed_at";

fn trade_from_row(row: &Row<'_>) -> rusqlite::Result<(Trade, String)> {
    let status: String = row.get(3)?;
    Ok((
        Trade {
            id: row.get(0)?,
            sender_team_id: row.get(1)?,
            parent_id: row.get(2)?,
            status: TradeStatus::Draft,
            is_latest: row.get(4)?,
            notes: row.get(5)?,
            participants: Vec::new(),
            assets: Vec::new(),
            created_at: row.get(6)?,
            proposed_at: row.get(7)?,
            approved_at: row.get(8)?,
            approved_by: row.get(9)?,
            completed_at: row.get(10)?,
            closed_at: row.get(11)?,
        },
        status,
    ))
}

/// Load a trade with its participants and assets.
pub fn trade(conn: &Connection, id: i64) -> Result<Trade> {
    let (mut trade, status) = conn
        .query_row(
            &format!("SELECT {TRADE_COLUMNS} FROM trades WHERE id = ?1"),
            [id],
            trade_from_row,
        )
        .optional()?
        .ok_or_else(|| LeagueError::not_found("trade", id))?;

    trade.status = TradeStatus::parse(&status).ok_or_else(|| {
        LeagueError::InvalidTrade(format!("trade {id} has unknown status `{status}`"))
    })?;
    trade.participants = participants(conn, id)?;
    trade.assets = assets(conn, id)?;
    Ok(trade)
}

/// Ids of trades in a status, oldest first.
pub fn trade_ids_with_status(conn: &Connection, status: TradeStatus) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM trades WHERE status = ?1 ORDER BY id")?;
    let ids = stmt
        .query_map([status.as_str()], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(ids)
}

fn participants(conn: &Connection, trade_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT team_id FROM trade_participants WHERE trade_id = ?1 ORDER BY rowid",
    )?;
    let ids = stmt
        .query_map([trade_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(ids)
}

fn assets(conn: &Connection, trade_id: i64) -> Result<Vec<TradeAsset>> {
    let mut stmt = conn.prepare(
        "SELECT id, sender_team_id, receiver_team_id, contract_id, pick_id, override_type,
                override_start, override_end, override_target_id, override_rollover
         FROM trade_assets WHERE trade_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map([trade_id], |row| {
            let contract_id: Option<i64> = row.get(3)?;
            let pick_id: Option<i64> = row.get(4)?;
            let override_kind: Option<String> = row.get(5)?;
            let cols = override_kind.map(|kind| -> rusqlite::Result<ProtectionColumns> {
                Ok(ProtectionColumns {
                    kind,
                    range_start: row.get(6)?,
                    range_end: row.get(7)?,
                    swap_target: row.get(8)?,
                    rollover_year: row.get(9)?,
                })
            });
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                contract_id,
                pick_id,
                cols.transpose()?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, sender, receiver, contract_id, pick_id, cols)| {
            let asset = match (contract_id, pick_id) {
                (Some(contract_id), None) => AssetRef::Player { contract_id },
                (None, Some(pick_id)) => AssetRef::Pick { pick_id },
                _ => {
                    return Err(LeagueError::InvalidTrade(format!(
                        "trade asset {id} must reference exactly one player or pick"
                    )))
                }
            };
            let protection_override = cols.as_ref().map(Protection::from_columns).transpose()?;
            Ok(TradeAsset {
                id,
                trade_id,
                sender_team_id: sender,
                receiver_team_id: receiver,
                asset,
                protection_override,
            })
        })
        .collect()
}

pub fn set_status(conn: &Connection, trade_id: i64, status: TradeStatus) -> Result<()> {
    conn.execute(
        "UPDATE trades SET status = ?2 WHERE id = ?1",
        params![trade_id, status.as_str()],
    )?;
    Ok(())
}

pub fn mark_proposed(conn: &Connection, trade_id: i64, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE trades SET status = 'proposed', proposed_at = ?2 WHERE id = ?1",
        params![trade_id, now],
    )?;
    Ok(())
}

pub fn mark_approved(
    conn: &Connection,
    trade_id: i64,
    approved_by: Option<i64>,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE trades SET status = 'approved', approved_at = ?2, approved_by = ?3 WHERE id = ?1",
        params![trade_id, now, approved_by],
    )?;
    Ok(())
}

pub fn mark_completed(conn: &Connection, trade_id: i64, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE trades SET status = 'completed', completed_at = ?2 WHERE id = ?1",
        params![trade_id, now],
    )?;
    Ok(())
}

/// Move to a terminal status other than completed.
pub fn mark_closed(
    conn: &Connection,
    trade_id: i64,
    status: TradeStatus,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE trades SET status = ?2, closed_at = ?3 WHERE id = ?1",
        params![trade_id, status.as_str(), now],
    )?;
    Ok(())
}

pub fn mark_superseded(conn: &Connection, trade_id: i64) -> Result<()> {
    conn.execute("UPDATE trades SET is_latest = 0 WHERE id = ?1", [trade_id])?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

pub fn insert_response(
    conn: &Connection,
    trade_id: i64,
    team_id: i64,
    status: ResponseStatus,
    now: Option<DateTime<Utc>>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO trade_responses (trade_id, team_id, status, responded_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![trade_id, team_id, status.as_str(), now],
    )?;
    Ok(())
}

fn response_from_row(row: &Row<'_>) -> rusqlite::Result<TradeResponse> {
    Ok(TradeResponse {
        id: row.get(0)?,
        trade_id: row.get(1)?,
        team_id: row.get(2)?,
        status: ResponseStatus::parse(&row.get::<_, String>(3)?),
        message: row.get(4)?,
        responded_at: row.get(5)?,
    })
}

pub fn responses(conn: &Connection, trade_id: i64) -> Result<Vec<TradeResponse>> {
    let mut stmt = conn.prepare(
        "SELECT id, trade_id, team_id, status, message, responded_at
         FROM trade_responses WHERE trade_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map([trade_id], response_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn response(conn: &Connection, trade_id: i64, team_id: i64) -> Result<Option<TradeResponse>> {
    Ok(conn
        .query_row(
            "SELECT id, trade_id, team_id, status, message, responded_at
             FROM trade_responses WHERE trade_id = ?1 AND team_id = ?2",
            params![trade_id, team_id],
            response_from_row,
        )
        .optional()?)
}

/// Move a pending response to `status`. Fails if someone answered first.
pub fn answer(
    conn: &Connection,
    response_id: i64,
    status: ResponseStatus,
    message: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let changed = conn.execute(
        "UPDATE trade_responses SET status = ?2, message = ?3, responded_at = ?4
         WHERE id = ?1 AND status = 'pending'",
        params![response_id, status.as_str(), message, now],
    )?;
    if changed == 0 {
        return Err(LeagueError::ConcurrentModification(format!(
            "trade response {response_id} was already answered"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Votes
// ---------------------------------------------------------------------------

/// Insert or replace a voter's ballot. One row per (trade, commissioner).
pub fn upsert_vote(conn: &Connection, vote: &TradeVote) -> Result<()> {
    conn.execute(
        "INSERT INTO trade_votes (trade_id, commissioner_id, vote, notes, voted_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(trade_id, commissioner_id) DO UPDATE SET
             vote = excluded.vote,
             notes = excluded.notes,
             voted_at = excluded.voted_at",
        params![
            vote.trade_id,
            vote.commissioner_id,
            vote.vote.as_str(),
            vote.notes,
            vote.voted_at
        ],
    )?;
    Ok(())
}

pub fn votes(conn: &Connection, trade_id: i64) -> Result<Vec<TradeVote>> {
    let mut stmt = conn.prepare(
        "SELECT trade_id, commissioner_id, vote, notes, voted_at
         FROM trade_votes WHERE trade_id = ?1 ORDER BY voted_at, commissioner_id",
    )?;
    let rows = stmt
        .query_map([trade_id], |row| {
            Ok(TradeVote {
                trade_id: row.get(0)?,
                commissioner_id: row.get(1)?,
                vote: Vote::parse(&row.get::<_, String>(2)?),
                notes: row.get(3)?,
                voted_at: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
