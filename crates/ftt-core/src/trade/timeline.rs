// Chronological history of a trade, rebuilt from stored rows.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::error::Result;
use crate::trade::model::{self, ResponseStatus, Trade, TradeStatus, Vote};

/// Variants are declared in workflow order; entries sharing a timestamp sort
/// by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineKind {
    Created,
    Proposed,
    CounterOffered,
    Accepted,
    Rejected,
    Countered,
    Voted,
    Approved,
    Vetoed,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub at: DateTime<Utc>,
    pub kind: TimelineKind,
    pub team_id: Option<i64>,
    pub user_id: Option<i64>,
    pub description: String,
}

impl TimelineEntry {
    fn new(at: DateTime<Utc>, kind: TimelineKind, description: impl Into<String>) -> Self {
        Self {
            at,
            kind,
            team_id: None,
            user_id: None,
            description: description.into(),
        }
    }

    fn team(mut self, team_id: i64) -> Self {
        self.team_id = Some(team_id);
        self
    }

    fn user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// Entries sorted by time, then by workflow stage.
pub fn timeline(conn: &Connection, trade_id: i64) -> Result<Vec<TimelineEntry>> {
    let trade = model::trade(conn, trade_id)?;
    let mut entries = trade_events(&trade);

    for response in model::responses(conn, trade_id)? {
        // The proposer's automatic acceptance is covered by the proposal entry.
        if response.team_id == trade.sender_team_id {
            continue;
        }
        let Some(at) = response.responded_at else {
            continue;
        };
        let (kind, verb) = match response.status {
            ResponseStatus::Pending => continue,
            ResponseStatus::Accepted => (TimelineKind::Accepted, "accepted"),
            ResponseStatus::Rejected => (TimelineKind::Rejected, "rejected"),
            ResponseStatus::Countered => (TimelineKind::Countered, "countered"),
        };
        let mut description = format!("Team {} {verb} the trade", response.team_id);
        if !response.message.is_empty() {
            description.push_str(&format!(": {}", response.message));
        }
        entries.push(TimelineEntry::new(at, kind, description).team(response.team_id));
    }

    for vote in model::votes(conn, trade_id)? {
        let verb = match vote.vote {
            Vote::Approve => "approve",
            Vote::Veto => "veto",
        };
        entries.push(
            TimelineEntry::new(
                vote.voted_at,
                TimelineKind::Voted,
                format!("Commissioner {} voted to {verb}", vote.commissioner_id),
            )
            .user(vote.commissioner_id),
        );
    }

    entries.sort_by_key(|e| (e.at, e.kind));
    Ok(entries)
}

fn trade_events(trade: &Trade) -> Vec<TimelineEntry> {
    let mut entries = vec![TimelineEntry::new(
        trade.created_at,
        TimelineKind::Created,
        format!("Trade {} drafted", trade.id),
    )
    .team(trade.sender_team_id)];

    if let Some(at) = trade.proposed_at {
        let entry = match trade.parent_id {
            Some(parent) => TimelineEntry::new(
                at,
                TimelineKind::CounterOffered,
                format!("Counter-offer to trade {parent} proposed"),
            ),
            None => TimelineEntry::new(at, TimelineKind::Proposed, "Trade proposed"),
        };
        entries.push(entry.team(trade.sender_team_id));
    }

    if let Some(at) = trade.approved_at {
        let entry = TimelineEntry::new(at, TimelineKind::Approved, "Trade approved");
        entries.push(match trade.approved_by {
            Some(user_id) => entry.user(user_id),
            None => entry,
        });
    }

    if let Some(at) = trade.completed_at {
        entries.push(TimelineEntry::new(
            at,
            TimelineKind::Completed,
            "Assets transferred",
        ));
    }

    if let Some(at) = trade.closed_at {
        let kind = match trade.status {
            TradeStatus::Vetoed => Some(TimelineKind::Vetoed),
            TradeStatus::Cancelled => Some(TimelineKind::Cancelled),
            // Rejections show up through the rejecting team's response.
            _ => None,
        };
        if let Some(kind) = kind {
            let description = match kind {
                TimelineKind::Vetoed => "Trade vetoed",
                _ => "Trade cancelled by its proposer",
            };
            entries.push(TimelineEntry::new(at, kind, description));
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::draft::pick::{self, NewPick};
    use crate::roster;
    use crate::trade::model::{NewAsset, NewTrade};
    use chrono::{Duration, TimeZone};

    #[test]
    fn orders_proposal_response_and_vote() {
        let db = Database::open_in_memory().unwrap();
        let t0 = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap();
        let entries = db
            .transaction(|tx| {
                let ua = roster::insert_user(tx, "a", false, false)?;
                let ub = roster::insert_user(tx, "b", false, false)?;
                let comm = roster::insert_user(tx, "c", true, false)?;
                let a = roster::insert_team(tx, "A", ua.id)?.id;
                let b = roster::insert_team(tx, "B", ub.id)?.id;
                let pa = pick::insert(tx, &NewPick::own(a, 2026, 1))?;
                let pb = pick::insert(tx, &NewPick::own(b, 2026, 1))?;
                let trade = model::insert_trade(
                    tx,
                    &NewTrade {
                        sender_team_id: a,
                        participants: vec![a, b],
                        assets: vec![NewAsset::pick(a, b, pa.id), NewAsset::pick(b, a, pb.id)],
                        notes: String::new(),
                    },
                    None,
                    t0,
                )?;
                model::mark_proposed(tx, trade.id, t0 + Duration::minutes(1))?;
                model::insert_response(tx, trade.id, a, ResponseStatus::Accepted, Some(t0))?;
                model::insert_response(tx, trade.id, b, ResponseStatus::Pending, None)?;
                let resp = model::response(tx, trade.id, b)?.unwrap();
                model::answer(tx, resp.id, ResponseStatus::Accepted, "deal", t0 + Duration::hours(1))?;
                model::upsert_vote(
                    tx,
                    &model::TradeVote {
                        trade_id: trade.id,
                        commissioner_id: comm.id,
                        vote: Vote::Approve,
                        notes: String::new(),
                        voted_at: t0 + Duration::hours(2),
                    },
                )?;
                timeline(tx, trade.id)
            })
            .unwrap();

        let kinds: Vec<_> = entries.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TimelineKind::Created,
                TimelineKind::Proposed,
                TimelineKind::Accepted,
                TimelineKind::Voted
            ]
        );
        assert_eq!(entries[2].description, "Team 2 accepted the trade: deal");
    }
}
