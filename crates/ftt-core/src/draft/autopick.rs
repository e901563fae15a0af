// Auto-pick resolution: queue first, then best available by relevance.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::draft::{model, queue};
use crate::error::{LeagueError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoPickSource {
    Queue,
    BestAvailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AutoPickChoice {
    pub player_id: i64,
    pub source: AutoPickSource,
}

/// Choose a player for `team_id` in `draft_id`.
///
/// Fails with `EmptyPlayerPool` when nobody is left to pick, which aborts
/// the whole pick attempt.
pub fn resolve(
    conn: &Connection,
    draft_id: i64,
    team_id: i64,
    now: DateTime<Utc>,
) -> Result<AutoPickChoice> {
    if let Some(player_id) = queue::pop_available(conn, draft_id, team_id, now)? {
        return Ok(AutoPickChoice {
            player_id,
            source: AutoPickSource::Queue,
        });
    }

    match model::best_available(conn, draft_id)? {
        Some(player_id) => Ok(AutoPickChoice {
            player_id,
            source: AutoPickSource::BestAvailable,
        }),
        None => {
            tracing::error!(draft_id, team_id, "auto-pick found an empty player pool");
            Err(LeagueError::EmptyPlayerPool(draft_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::draft::model::{insert_draft, NewDraft};
    use crate::draft::queue::DraftQueue;
    use crate::roster::{insert_player, insert_team, insert_user};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn draft_with(tx: &Connection, team_id: i64, players: Vec<i64>) -> Result<i64> {
        let draft = insert_draft(
            tx,
            &NewDraft {
                year: 2025,
                rounds: 1,
                team_ids: vec![team_id],
                player_ids: players,
                starts_at: None,
                time_limit_minutes: 60,
                active_hour_start: 0,
                active_hour_end: 24,
                is_league_draft: false,
            },
            now(),
        )?;
        Ok(draft.id)
    }

    #[test]
    fn prefers_queue_over_relevance() {
        let db = Database::open_in_memory().unwrap();
        let (choice, low) = db
            .transaction(|tx| {
                let owner = insert_user(tx, "o", false, false)?;
                let team = insert_team(tx, "T", owner.id)?;
                let star = insert_player(tx, "Star", Some("DEN"), 90.0)?;
                let low = insert_player(tx, "Bench", Some("UTA"), 1.0)?;
                let draft_id = draft_with(tx, team.id, vec![star.id, low.id])?;
                queue::save(
                    tx,
                    &DraftQueue {
                        player_ids: vec![low.id],
                        ..DraftQueue::empty(draft_id, team.id)
                    },
                    now(),
                )?;
                Ok((resolve(tx, draft_id, team.id, now())?, low.id))
            })
            .unwrap();
        assert_eq!(choice.player_id, low);
        assert_eq!(choice.source, AutoPickSource::Queue);
    }

    #[test]
    fn falls_back_to_highest_relevance() {
        let db = Database::open_in_memory().unwrap();
        let (choice, star) = db
            .transaction(|tx| {
                let owner = insert_user(tx, "o", false, false)?;
                let team = insert_team(tx, "T", owner.id)?;
                let star = insert_player(tx, "Star", Some("DEN"), 90.0)?;
                let low = insert_player(tx, "Bench", Some("UTA"), 1.0)?;
                let draft_id = draft_with(tx, team.id, vec![low.id, star.id])?;
                Ok((resolve(tx, draft_id, team.id, now())?, star.id))
            })
            .unwrap();
        assert_eq!(choice.player_id, star);
        assert_eq!(choice.source, AutoPickSource::BestAvailable);
    }

    #[test]
    fn empty_pool_is_fatal() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .transaction(|tx| {
                let owner = insert_user(tx, "o", false, false)?;
                let team = insert_team(tx, "T", owner.id)?;
                let unaffiliated = insert_player(tx, "Nobody", None, 50.0)?;
                let draft_id = draft_with(tx, team.id, vec![unaffiliated.id])?;
                resolve(tx, draft_id, team.id, now())
            })
            .unwrap_err();
        assert!(matches!(err, LeagueError::EmptyPlayerPool(_)));
    }
}
