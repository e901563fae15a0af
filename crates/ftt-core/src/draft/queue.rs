// Per-team draft queues consumed by auto-pick.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::draft::model;
use crate::error::{LeagueError, Result};
use crate::notify::{self, Level};
use crate::roster;

/// A team's ordered wish list for one draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftQueue {
    pub draft_id: i64,
    pub team_id: i64,
    pub autopick_enabled: bool,
    pub player_ids: Vec<i64>,
}

impl DraftQueue {
    pub fn empty(draft_id: i64, team_id: i64) -> Self {
        DraftQueue {
            draft_id,
            team_id,
            autopick_enabled: true,
            player_ids: Vec::new(),
        }
    }

    /// Whether a cascade should try to pick from this queue.
    pub fn is_armed(&self) -> bool {
        self.autopick_enabled && !self.player_ids.is_empty()
    }
}

pub fn load(conn: &Connection, draft_id: i64, team_id: i64) -> Result<Option<DraftQueue>> {
    let row = conn
        .query_row(
            "SELECT autopick_enabled, player_ids FROM draft_queues
             WHERE draft_id = ?1 AND team_id = ?2",
            params![draft_id, team_id],
            |row| Ok((row.get::<_, bool>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;
    let Some((autopick_enabled, ids)) = row else {
        return Ok(None);
    };
    Ok(Some(DraftQueue {
        draft_id,
        team_id,
        autopick_enabled,
        player_ids: serde_json::from_str(&ids)?,
    }))
}

fn store(conn: &Connection, queue: &DraftQueue, now: DateTime<Utc>) -> Result<()> {
    let ids = serde_json::to_string(&queue.player_ids)?;
    conn.execute(
        "INSERT INTO draft_queues (draft_id, team_id, autopick_enabled, player_ids, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(draft_id, team_id) DO UPDATE SET
             autopick_enabled = excluded.autopick_enabled,
             player_ids = excluded.player_ids,
             updated_at = excluded.updated_at",
        params![queue.draft_id, queue.team_id, queue.autopick_enabled, ids, now],
    )?;
    Ok(())
}

/// Save a queue, first dropping players who no longer exist or are already
/// rostered. The team owner is told about each dropped player.
pub fn save(conn: &Connection, queue: &DraftQueue, now: DateTime<Utc>) -> Result<DraftQueue> {
    let mut kept = Vec::with_capacity(queue.player_ids.len());
    for &player_id in &queue.player_ids {
        if kept.contains(&player_id) {
            continue;
        }
        let player = match roster::player(conn, player_id) {
            Ok(player) => player,
            Err(LeagueError::NotFound { .. }) => {
                tracing::debug!(player_id, "dropping unknown player from queue");
                continue;
            }
            Err(e) => return Err(e),
        };
        if roster::is_rostered(conn, player_id)? {
            notify::notify_team(
                conn,
                queue.team_id,
                format!(
                    "Player {} has been removed from your draft queue because they are no longer available.",
                    player.name
                ),
                Level::Warning,
                None,
                now,
            )?;
            continue;
        }
        kept.push(player_id);
    }

    let saved = DraftQueue {
        player_ids: kept,
        ..queue.clone()
    };
    store(conn, &saved, now)?;
    Ok(saved)
}

/// Pop players off the head of the team's queue until one is still in the
/// draft pool. Skipped and returned players are removed from the queue.
pub fn pop_available(
    conn: &Connection,
    draft_id: i64,
    team_id: i64,
    now: DateTime<Utc>,
) -> Result<Option<i64>> {
    let Some(mut queue) = load(conn, draft_id, team_id)? else {
        return Ok(None);
    };
    if !queue.is_armed() {
        return Ok(None);
    }

    let mut chosen = None;
    while !queue.player_ids.is_empty() {
        let player_id = queue.player_ids.remove(0);
        if !roster::is_rostered(conn, player_id)? && model::in_pool(conn, draft_id, player_id)? {
            chosen = Some(player_id);
            break;
        }
        tracing::debug!(draft_id, team_id, player_id, "skipping unavailable queued player");
    }

    store(conn, &queue, now)?;
    Ok(chosen)
}

/// Remove a just-drafted player from every queue in the draft.
pub fn remove_everywhere(
    conn: &Connection,
    draft_id: i64,
    player_id: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut stmt = conn.prepare("SELECT team_id FROM draft_queues WHERE draft_id = ?1")?;
    let teams = stmt
        .query_map([draft_id], |row| row.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for team_id in teams {
        if let Some(mut queue) = load(conn, draft_id, team_id)? {
            let before = queue.player_ids.len();
            queue.player_ids.retain(|&id| id != player_id);
            if queue.player_ids.len() != before {
                store(conn, &queue, now)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::draft::model::{insert_draft, NewDraft};
    use crate::roster::{insert_contract, insert_player, insert_team, insert_user, Contract};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    struct Fixture {
        db: Database,
        draft_id: i64,
        team_id: i64,
        players: Vec<i64>,
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let (draft_id, team_id, players) = db
            .transaction(|tx| {
                let owner = insert_user(tx, "owner", false, false)?;
                let team = insert_team(tx, "Team", owner.id)?;
                let players = (0..4)
                    .map(|i| insert_player(tx, &format!("P{i}"), Some("BOS"), f64::from(i)))
                    .map(|p| p.map(|p| p.id))
                    .collect::<Result<Vec<_>>>()?;
                let draft = insert_draft(
                    tx,
                    &NewDraft {
                        year: 2025,
                        rounds: 1,
                        team_ids: vec![team.id],
                        player_ids: players.clone(),
                        starts_at: None,
                        time_limit_minutes: 60,
                        active_hour_start: 0,
                        active_hour_end: 24,
                        is_league_draft: false,
                    },
                    now(),
                )?;
                Ok((draft.id, team.id, players))
            })
            .unwrap();
        Fixture { db, draft_id, team_id, players }
    }

    #[test]
    fn save_prunes_rostered_players_and_notifies() {
        let f = fixture();
        let saved = f
            .db
            .transaction(|tx| {
                insert_contract(
                    tx,
                    &Contract {
                        id: 0,
                        player_id: Some(f.players[1]),
                        team_id: Some(f.team_id),
                        start_year: 2025,
                        duration: 2,
                        salary: 2.0,
                        is_rfa: false,
                        team_option: false,
                    },
                )?;
                let mut queue = DraftQueue::empty(f.draft_id, f.team_id);
                queue.player_ids = vec![f.players[0], f.players[1], 9999, f.players[0]];
                save(tx, &queue, now())
            })
            .unwrap();
        assert_eq!(saved.player_ids, vec![f.players[0]]);

        let pending = f.db.read(|conn| notify::pending(conn, 10, 5)).unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].message.contains("P1"));
    }

    #[test]
    fn pop_skips_players_no_longer_in_pool() {
        let f = fixture();
        let popped = f
            .db
            .transaction(|tx| {
                let mut queue = DraftQueue::empty(f.draft_id, f.team_id);
                queue.player_ids = vec![f.players[2], f.players[3]];
                save(tx, &queue, now())?;
                model::remove_from_pool(tx, f.draft_id, f.players[2])?;
                let popped = pop_available(tx, f.draft_id, f.team_id, now())?;
                Ok((popped, load(tx, f.draft_id, f.team_id)?))
            })
            .unwrap();
        assert_eq!(popped.0, Some(f.players[3]));
        assert!(popped.1.unwrap().player_ids.is_empty());
    }

    #[test]
    fn disabled_queue_never_pops() {
        let f = fixture();
        let popped = f
            .db
            .transaction(|tx| {
                let queue = DraftQueue {
                    autopick_enabled: false,
                    player_ids: vec![f.players[0]],
                    ..DraftQueue::empty(f.draft_id, f.team_id)
                };
                save(tx, &queue, now())?;
                pop_available(tx, f.draft_id, f.team_id, now())
            })
            .unwrap();
        assert_eq!(popped, None);
    }

    #[test]
    fn remove_everywhere_strips_drafted_player() {
        let f = fixture();
        let queue = f
            .db
            .transaction(|tx| {
                let queue = DraftQueue {
                    player_ids: vec![f.players[0], f.players[1]],
                    ..DraftQueue::empty(f.draft_id, f.team_id)
                };
                save(tx, &queue, now())?;
                remove_everywhere(tx, f.draft_id, f.players[0], now())?;
                load(tx, f.draft_id, f.team_id)
            })
            .unwrap()
            .unwrap();
        assert_eq!(queue.player_ids, vec![f.players[1]]);
    }
}
