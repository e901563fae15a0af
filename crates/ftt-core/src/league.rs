// League facade: one entry point per operation, each in its own transaction.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::{error, info};

use crate::config::{Config, ConfigError};
use crate::db::Database;
use crate::draft::executor::{self, DraftEnv, PickOutcome};
use crate::draft::model::{self, Draft, NewDraft};
use crate::draft::pick;
use crate::draft::protection::{self, ProtectionResult};
use crate::draft::queue::{self, DraftQueue};
use crate::error::{LeagueError, Result};
use crate::notify::{self, PendingNotification};
use crate::roster;
use crate::time::Clock;
use crate::trade::model::{self as trade_model, NewTrade, Trade, Vote};
use crate::trade::timeline::{self, TimelineEntry};
use crate::trade::workflow::{self, Response, ResponseOutcome, TradeEnv, VoteOutcome, VoteSummary};

/// One row of the draft board.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardEntry {
    pub position_id: i64,
    pub overall_pick: u32,
    pub round: u32,
    pub round_pick: u32,
    /// Team holding the pick (after trades).
    pub team_id: Option<i64>,
    pub player_id: Option<i64>,
    pub player_name: Option<String>,
    pub is_current: bool,
    pub is_auto_pick: bool,
    pub pick_made_at: Option<DateTime<Utc>>,
}

pub struct League {
    db: Database,
    config: Config,
    draft_env: DraftEnv,
    trade_env: TradeEnv,
    clock: Arc<dyn Clock>,
}

impl League {
    pub fn new(db: Database, config: Config, clock: Arc<dyn Clock>) -> std::result::Result<Self, ConfigError> {
        let tz = config.league.timezone()?;
        Ok(League {
            draft_env: DraftEnv {
                rules: config.draft.clone(),
                tz,
            },
            trade_env: TradeEnv {
                rules: config.league.clone(),
                trades: config.trades.clone(),
                tz,
            },
            db,
            config,
            clock,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Direct storage access for seeding users, teams and players.
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // -----------------------------------------------------------------------
    // Drafts
    // -----------------------------------------------------------------------

    pub fn create_draft(&self, new: &NewDraft) -> Result<Draft> {
        let now = self.now();
        self.db.transaction(|tx| model::insert_draft(tx, new, now))
    }

    pub fn draft(&self, draft_id: i64) -> Result<Draft> {
        self.db.read(|conn| model::draft(conn, draft_id))
    }

    pub fn start_draft(&self, draft_id: i64) -> Result<Vec<i64>> {
        self.start_draft_with(draft_id, &mut rand::rng())
    }

    /// Start with a caller-provided RNG for a reproducible order.
    pub fn start_draft_with<R: Rng + ?Sized>(&self, draft_id: i64, rng: &mut R) -> Result<Vec<i64>> {
        let now = self.now();
        self.db
            .transaction(|tx| executor::start_draft(tx, &self.draft_env, draft_id, now, rng))
    }

    pub fn make_pick(&self, position_id: i64, player_id: Option<i64>) -> Result<PickOutcome> {
        let now = self.now();
        self.db
            .transaction(|tx| executor::make_pick(tx, &self.draft_env, position_id, player_id, now))
    }

    pub fn set_queue(&self, queue: &DraftQueue) -> Result<DraftQueue> {
        let now = self.now();
        self.db.transaction(|tx| {
            model::draft(tx, queue.draft_id)?;
            roster::team(tx, queue.team_id)?;
            queue::save(tx, queue, now)
        })
    }

    pub fn queue(&self, draft_id: i64, team_id: i64) -> Result<DraftQueue> {
        self.db.read(|conn| {
            Ok(queue::load(conn, draft_id, team_id)?
                .unwrap_or_else(|| DraftQueue::empty(draft_id, team_id)))
        })
    }

    /// Record actual slot numbers for the draft's year, then resolve every
    /// protected pick of that year.
    pub fn evaluate_draft_protections(
        &self,
        draft_id: i64,
        actual_numbers: &BTreeMap<i64, u32>,
    ) -> Result<Vec<ProtectionResult>> {
        self.db.transaction(|tx| {
            let draft = model::draft(tx, draft_id)?;
            for &pick_id in actual_numbers.keys() {
                let pick = pick::get(tx, pick_id)?;
                if pick.draft_year != draft.year {
                    return Err(LeagueError::ProtectionConfiguration(format!(
                        "pick {pick_id} belongs to {}, not the {} draft",
                        pick.draft_year, draft.year
                    )));
                }
            }
            let results = protection::evaluate_year(tx, draft.year, actual_numbers)?;
            info!(draft_id, year = draft.year, evaluated = results.len(), "protections evaluated");
            Ok(results)
        })
    }

    /// Auto-pick every expired clock across open drafts, one transaction per
    /// draft. A failing draft does not stop the others; the last error is
    /// returned after all drafts were tried.
    pub fn process_expired_picks(&self) -> Result<Vec<PickOutcome>> {
        let now = self.now();
        let drafts = self.db.read(model::open_drafts)?;
        let mut outcomes = Vec::new();
        let mut failure = None;

        for draft in drafts {
            match self
                .db
                .transaction(|tx| executor::process_expired(tx, &self.draft_env, draft.id, now))
            {
                Ok(mut done) => outcomes.append(&mut done),
                Err(e) => {
                    error!(draft_id = draft.id, error = %e, "processing expired picks failed");
                    failure = Some(e);
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(outcomes),
        }
    }

    /// Earliest clock expiry across open drafts.
    pub fn next_expiry(&self) -> Result<Option<DateTime<Utc>>> {
        let now = self.now();
        self.db.read(|conn| {
            let mut earliest: Option<DateTime<Utc>> = None;
            for draft in model::open_drafts(conn)? {
                if let Some(at) = executor::expiry(conn, &self.draft_env, &draft, now)? {
                    earliest = Some(earliest.map_or(at, |e| e.min(at)));
                }
            }
            Ok(earliest)
        })
    }

    pub fn remaining_seconds(&self, position_id: i64) -> Result<i64> {
        let now = self.now();
        self.db.read(|conn| {
            let position = model::position(conn, position_id)?;
            executor::remaining_seconds(conn, &self.draft_env, &position, now)
        })
    }

    pub fn draft_board(&self, draft_id: i64) -> Result<Vec<BoardEntry>> {
        self.db.read(|conn| {
            model::draft(conn, draft_id)?;
            let mut board = Vec::new();
            for position in model::positions(conn, draft_id)? {
                let team_id = match position.pick_id {
                    Some(pick_id) => Some(pick::get(conn, pick_id)?.current_team_id),
                    None => None,
                };
                let player_name = match position.selected_player_id {
                    Some(player_id) => Some(roster::player(conn, player_id)?.name),
                    None => None,
                };
                board.push(BoardEntry {
                    position_id: position.id,
                    overall_pick: position.overall_pick,
                    round: position.round,
                    round_pick: position.round_pick,
                    team_id,
                    player_id: position.selected_player_id,
                    player_name,
                    is_current: position.is_current,
                    is_auto_pick: position.is_auto_pick,
                    pick_made_at: position.pick_made_at,
                });
            }
            Ok(board)
        })
    }

    // -----------------------------------------------------------------------
    // Trades
    // -----------------------------------------------------------------------

    pub fn create_trade(&self, new: &NewTrade) -> Result<Trade> {
        let now = self.now();
        self.db.transaction(|tx| workflow::create_trade(tx, new, now))
    }

    pub fn propose_trade(&self, trade_id: i64) -> Result<Trade> {
        let now = self.now();
        self.db.transaction(|tx| workflow::propose(tx, trade_id, now))
    }

    pub fn respond_to_trade(
        &self,
        trade_id: i64,
        team_id: i64,
        response: Response,
        message: &str,
    ) -> Result<ResponseOutcome> {
        let now = self.now();
        self.db.transaction(|tx| {
            workflow::respond(tx, &self.trade_env, trade_id, team_id, response, message, now)
        })
    }

    pub fn cancel_trade(&self, trade_id: i64, team_id: i64) -> Result<Trade> {
        let now = self.now();
        self.db.transaction(|tx| workflow::cancel(tx, trade_id, team_id, now))
    }

    pub fn record_vote(&self, trade_id: i64, user_id: i64, vote: Vote, notes: &str) -> Result<VoteOutcome> {
        let now = self.now();
        self.db.transaction(|tx| {
            workflow::record_vote(tx, &self.trade_env, trade_id, user_id, vote, notes, now)
        })
    }

    pub fn execute_trade(&self, trade_id: i64) -> Result<Trade> {
        let now = self.now();
        self.db
            .transaction(|tx| workflow::execute(tx, &self.trade_env, trade_id, now))
    }

    pub fn trade(&self, trade_id: i64) -> Result<Trade> {
        self.db.read(|conn| trade_model::trade(conn, trade_id))
    }

    pub fn vote_summary(&self, trade_id: i64) -> Result<VoteSummary> {
        self.db.read(|conn| workflow::vote_summary(conn, trade_id))
    }

    pub fn timeline(&self, trade_id: i64) -> Result<Vec<TimelineEntry>> {
        self.db.read(|conn| timeline::timeline(conn, trade_id))
    }

    // -----------------------------------------------------------------------
    // Notification outbox
    // -----------------------------------------------------------------------

    pub fn pending_notifications(&self, limit: u32) -> Result<Vec<PendingNotification>> {
        let max_attempts = self.config.scheduler.dispatch_max_attempts;
        self.db.read(|conn| notify::pending(conn, limit, max_attempts))
    }

    pub fn mark_delivered(&self, notification_id: i64) -> Result<()> {
        let now = self.now();
        self.db
            .transaction(|tx| notify::mark_delivered(tx, notification_id, now))
    }

    pub fn record_failure(&self, notification_id: i64) -> Result<()> {
        self.db.transaction(|tx| notify::record_failure(tx, notification_id))
    }
}
