// Trade state machine: propose, respond, approve or veto, execute.

use chrono::{DateTime, Datelike, FixedOffset, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{LeagueRules, TradeRules};
use crate::error::{LeagueError, Result};
use crate::notify::{self, Level, Notification};
use crate::draft::pick;
use crate::roster::{self, User};
use crate::trade::compliance;
use crate::trade::model::{
    self, AssetRef, NewAsset, NewTrade, ResponseStatus, Trade, TradeResponse, TradeStatus, TradeVote, Vote,
};
use crate::trade::transfer;
use crate::trade::voting::{self, Decision, Tally};

/// League settings the trade workflow reads.
#[derive(Debug, Clone)]
pub struct TradeEnv {
    pub rules: LeagueRules,
    pub trades: TradeRules,
    pub tz: FixedOffset,
}

impl TradeEnv {
    /// League year used for contract tradeability.
    pub fn season(&self, now: DateTime<Utc>) -> i32 {
        now.with_timezone(&self.tz).year()
    }
}

/// A participant's answer to a proposed trade.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Accept,
    Reject,
    /// Counter with a new asset list, or with the original one when `None`.
    Counter { assets: Option<Vec<NewAsset>> },
}

impl Response {
    fn action(&self) -> &'static str {
        match self {
            Response::Accept => "accept",
            Response::Reject => "reject",
            Response::Counter { .. } => "counter",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseOutcome {
    pub trade: Trade,
    pub response: TradeResponse,
    /// The child trade created by a counter-offer.
    pub counter_offer: Option<Trade>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteOutcome {
    pub decision_made: bool,
    /// `Approved` or `Vetoed` once decided.
    pub final_status: Option<TradeStatus>,
    pub votes_needed: u32,
    pub tally: Tally,
    /// Whether the approval also executed the trade.
    pub executed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteSummary {
    pub tally: Tally,
    pub votes: Vec<TradeVote>,
    /// Regular commissioners who have not voted yet.
    pub pending_voters: Vec<i64>,
}

fn redirect(trade_id: i64) -> String {
    format!("/trades/{trade_id}/")
}

fn notify_teams(
    conn: &Connection,
    teams: impl IntoIterator<Item = i64>,
    trade_id: i64,
    message: &str,
    level: Level,
    now: DateTime<Utc>,
) -> Result<()> {
    let link = redirect(trade_id);
    for team_id in teams {
        notify::notify_team(conn, team_id, message, level, Some(&link), now)?;
    }
    Ok(())
}

fn notify_users(
    conn: &Connection,
    users: impl IntoIterator<Item = i64>,
    trade_id: i64,
    message: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    for user_id in users {
        let note = Notification::new(user_id, message, Level::Info).with_redirect(redirect(trade_id));
        notify::enqueue(conn, &note, now)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Draft and proposal
// ---------------------------------------------------------------------------

/// Store a new trade in `draft` status.
pub fn create_trade(conn: &Connection, new: &NewTrade, now: DateTime<Utc>) -> Result<Trade> {
    roster::team(conn, new.sender_team_id)?;
    for &team_id in &new.participants {
        roster::team(conn, team_id)?;
    }
    require_assets(conn, &new.assets)?;
    let trade = model::insert_trade(conn, new, None, now)?;
    info!(trade_id = trade.id, sender = trade.sender_team_id, "trade created");
    Ok(trade)
}

/// Every contract, pick and swap target an asset list names must exist.
fn require_assets(conn: &Connection, assets: &[NewAsset]) -> Result<()> {
    for asset in assets {
        match asset.asset {
            AssetRef::Player { contract_id } => {
                roster::contract(conn, contract_id)?;
            }
            AssetRef::Pick { pick_id } => {
                pick::get(conn, pick_id)?;
            }
        }
        if let Some(target) = asset.protection_override.as_ref().and_then(|p| p.swap_target()) {
            pick::get(conn, target)?;
        }
    }
    Ok(())
}

pub fn propose(conn: &Connection, trade_id: i64, now: DateTime<Utc>) -> Result<Trade> {
    let trade = model::trade(conn, trade_id)?;
    trade.require(&[TradeStatus::Draft], "propose")?;
    compliance::validate_structure(&trade)?;

    model::mark_proposed(conn, trade_id, now)?;
    for &team_id in &trade.participants {
        if team_id == trade.sender_team_id {
            model::insert_response(conn, trade_id, team_id, ResponseStatus::Accepted, Some(now))?;
        } else {
            model::insert_response(conn, trade_id, team_id, ResponseStatus::Pending, None)?;
        }
    }

    notify_teams(
        conn,
        trade.participants.iter().copied(),
        trade_id,
        "A new trade has been proposed involving your team.",
        Level::Info,
        now,
    )?;
    info!(trade_id, counter_offer = trade.is_counter_offer(), "trade proposed");
    model::trade(conn, trade_id)
}

pub fn cancel(
    conn: &Connection,
    trade_id: i64,
    team_id: i64,
    now: DateTime<Utc>,
) -> Result<Trade> {
    let trade = model::trade(conn, trade_id)?;
    if trade.sender_team_id != team_id {
        return Err(LeagueError::PermissionDenied(format!(
            "only the proposing team can cancel trade {trade_id}"
        )));
    }
    trade.require(&[TradeStatus::Draft, TradeStatus::Proposed], "cancel")?;
    model::mark_closed(conn, trade_id, TradeStatus::Cancelled, now)?;

    if trade.status == TradeStatus::Proposed {
        notify_teams(
            conn,
            trade.participants.iter().copied().filter(|&t| t != team_id),
            trade_id,
            "A trade you are involved in has been cancelled by its proposer.",
            Level::Info,
            now,
        )?;
    }
    info!(trade_id, "trade cancelled");
    model::trade(conn, trade_id)
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

pub fn respond(
    conn: &Connection,
    env: &TradeEnv,
    trade_id: i64,
    team_id: i64,
    response: Response,
    message: &str,
    now: DateTime<Utc>,
) -> Result<ResponseOutcome> {
    let action = response.action();
    let trade = model::trade(conn, trade_id)?;
    trade.require(&[TradeStatus::Proposed], "respond to")?;
    if !trade.is_latest {
        return Err(LeagueError::InvalidStateTransition {
            entity: "trade",
            status: "superseded".into(),
            action,
        });
    }
    if !trade.involves(team_id) {
        return Err(LeagueError::PermissionDenied(format!(
            "team {team_id} is not part of trade {trade_id}"
        )));
    }
    let current = model::response(conn, trade_id, team_id)?
        .ok_or_else(|| LeagueError::not_found("trade response", trade_id))?;
    if current.status != ResponseStatus::Pending {
        return Err(LeagueError::InvalidStateTransition {
            entity: "trade response",
            status: current.status.as_str().into(),
            action,
        });
    }

    let mut counter_offer = None;
    match response {
        Response::Accept => {
            model::answer(conn, current.id, ResponseStatus::Accepted, message, now)?;
            info!(trade_id, team_id, "trade accepted by team");
            let all_accepted = model::responses(conn, trade_id)?
                .iter()
                .all(|r| r.status == ResponseStatus::Accepted);
            if all_accepted {
                accept_trade(conn, env, &trade, now)?;
            }
        }
        Response::Reject => {
            model::answer(conn, current.id, ResponseStatus::Rejected, message, now)?;
            model::mark_closed(conn, trade_id, TradeStatus::Rejected, now)?;
            notify_teams(
                conn,
                trade.participants.iter().copied(),
                trade_id,
                "A trade you are involved in has been rejected by one of the parties.",
                Level::Info,
                now,
            )?;
            info!(trade_id, team_id, "trade rejected");
        }
        Response::Counter { assets } => {
            model::answer(conn, current.id, ResponseStatus::Countered, message, now)?;
            counter_offer = Some(counter(conn, &trade, team_id, assets, now)?);
        }
    }

    let response = model::response(conn, trade_id, team_id)?
        .ok_or_else(|| LeagueError::not_found("trade response", trade_id))?;
    Ok(ResponseOutcome {
        trade: model::trade(conn, trade_id)?,
        response,
        counter_offer,
    })
}

fn counter(
    conn: &Connection,
    parent: &Trade,
    team_id: i64,
    assets: Option<Vec<NewAsset>>,
    now: DateTime<Utc>,
) -> Result<Trade> {
    model::mark_superseded(conn, parent.id)?;
    let assets = assets.unwrap_or_else(|| parent.assets.iter().map(NewAsset::from).collect());
    require_assets(conn, &assets)?;
    let child = model::insert_trade(
        conn,
        &NewTrade {
            sender_team_id: team_id,
            participants: parent.participants.clone(),
            assets,
            notes: format!("Counter-offer to Trade {}", parent.id),
        },
        Some(parent.id),
        now,
    )?;

    let team = roster::team(conn, team_id)?;
    let owner = roster::user(conn, team.owner_id)?;
    notify::notify_team(
        conn,
        parent.sender_team_id,
        format!(
            "A counteroffer has been made to your trade proposal by {}.",
            owner.username
        ),
        Level::Info,
        Some(&redirect(parent.id)),
        now,
    )?;
    info!(parent_id = parent.id, trade_id = child.id, team_id, "counter-offer created");
    Ok(child)
}

/// Everyone accepted: validate, then route to commissioners or auto-approve.
fn accept_trade(conn: &Connection, env: &TradeEnv, trade: &Trade, now: DateTime<Utc>) -> Result<()> {
    compliance::validate_compliance(conn, trade, &env.rules, env.season(now))?;
    model::set_status(conn, trade.id, TradeStatus::Accepted)?;
    notify_teams(
        conn,
        trade.participants.iter().copied(),
        trade.id,
        "A trade you are involved in has been accepted by all parties.",
        Level::Info,
        now,
    )?;
    request_approval(conn, env, trade.id, now)
}

fn request_approval(conn: &Connection, env: &TradeEnv, trade_id: i64, now: DateTime<Utc>) -> Result<()> {
    let voters = roster::voters(conn)?;
    if voters.is_empty() {
        info!(trade_id, "no commissioners, auto-approving trade");
        approve(conn, env, trade_id, None, now)?;
        return Ok(());
    }

    model::set_status(conn, trade_id, TradeStatus::WaitingApproval)?;
    notify_users(
        conn,
        voters.iter().map(|u| u.id),
        trade_id,
        "A trade has been accepted and requires your review as a commissioner.",
        now,
    )?;
    info!(trade_id, voters = voters.len(), "trade waiting for approval");
    Ok(())
}

// ---------------------------------------------------------------------------
// Voting
// ---------------------------------------------------------------------------

/// Regular commissioners form the majority denominator; admins decide alone.
fn regular_commissioners(voters: &[User]) -> Vec<i64> {
    voters.iter().filter(|u| !u.is_admin).map(|u| u.id).collect()
}

fn tally_for(votes: &[TradeVote], regular: &[i64]) -> Tally {
    Tally::count(
        votes
            .iter()
            .filter(|v| regular.contains(&v.commissioner_id))
            .map(|v| &v.vote),
        regular.len() as u32,
    )
}

pub fn record_vote(
    conn: &Connection,
    env: &TradeEnv,
    trade_id: i64,
    user_id: i64,
    vote: Vote,
    notes: &str,
    now: DateTime<Utc>,
) -> Result<VoteOutcome> {
    let user = roster::user(conn, user_id)?;
    if !user.can_vote() {
        return Err(LeagueError::PermissionDenied(format!(
            "user {} is not a commissioner",
            user.username
        )));
    }
    let trade = model::trade(conn, trade_id)?;
    trade.require(&[TradeStatus::Accepted, TradeStatus::WaitingApproval], "vote on")?;

    model::upsert_vote(
        conn,
        &TradeVote {
            trade_id,
            commissioner_id: user_id,
            vote,
            notes: notes.to_string(),
            voted_at: now,
        },
    )?;

    let voters = roster::voters(conn)?;
    let regular = regular_commissioners(&voters);
    let votes = model::votes(conn, trade_id)?;
    let tally = tally_for(&votes, &regular);
    let decision = if user.is_admin {
        voting::admin_decision(vote)
    } else {
        tally.decide()
    };
    info!(trade_id, user_id, vote = vote.as_str(), admin = user.is_admin, ?decision, "vote recorded");

    let (final_status, votes_needed, executed) = match decision {
        Decision::Approved => {
            let executed = approve(conn, env, trade_id, Some(user_id), now)?;
            (Some(TradeStatus::Approved), 0, executed)
        }
        Decision::Vetoed => {
            veto(conn, &trade, now)?;
            (Some(TradeStatus::Vetoed), 0, false)
        }
        Decision::Pending { votes_needed } => {
            let pending = regular
                .iter()
                .copied()
                .filter(|id| !votes.iter().any(|v| v.commissioner_id == *id));
            notify_users(
                conn,
                pending,
                trade_id,
                &format!(
                    "A trade is waiting on your vote: {votes_needed} more approval{} needed.",
                    if votes_needed == 1 { "" } else { "s" }
                ),
                now,
            )?;
            (None, votes_needed, false)
        }
    };

    Ok(VoteOutcome {
        decision_made: decision.is_final(),
        final_status,
        votes_needed,
        tally,
        executed,
    })
}

pub fn vote_summary(conn: &Connection, trade_id: i64) -> Result<VoteSummary> {
    model::trade(conn, trade_id)?;
    let voters = roster::voters(conn)?;
    let regular = regular_commissioners(&voters);
    let votes = model::votes(conn, trade_id)?;
    let pending_voters = regular
        .iter()
        .copied()
        .filter(|id| !votes.iter().any(|v| v.commissioner_id == *id))
        .collect();
    Ok(VoteSummary {
        tally: tally_for(&votes, &regular),
        votes,
        pending_voters,
    })
}

/// Approve, then execute when the league executes on approval. Returns
/// whether the trade was executed.
fn approve(
    conn: &Connection,
    env: &TradeEnv,
    trade_id: i64,
    approved_by: Option<i64>,
    now: DateTime<Utc>,
) -> Result<bool> {
    let trade = model::trade(conn, trade_id)?;
    compliance::validate_compliance(conn, &trade, &env.rules, env.season(now))?;
    model::mark_approved(conn, trade_id, approved_by, now)?;
    info!(trade_id, ?approved_by, "trade approved");

    if env.trades.execute_on_approval {
        execute(conn, env, trade_id, now)?;
        return Ok(true);
    }
    notify_teams(
        conn,
        trade.participants.iter().copied(),
        trade_id,
        "A trade you are involved in has been approved by the commissioners.",
        Level::Success,
        now,
    )?;
    Ok(false)
}

fn veto(conn: &Connection, trade: &Trade, now: DateTime<Utc>) -> Result<()> {
    model::mark_closed(conn, trade.id, TradeStatus::Vetoed, now)?;
    notify_teams(
        conn,
        trade.participants.iter().copied(),
        trade.id,
        "A trade you are involved in has been vetoed by the commissioners.",
        Level::Warning,
        now,
    )?;
    warn!(trade_id = trade.id, "trade vetoed");
    Ok(())
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Validate and transfer every asset, then mark the trade completed.
pub fn execute(conn: &Connection, env: &TradeEnv, trade_id: i64, now: DateTime<Utc>) -> Result<Trade> {
    let trade = model::trade(conn, trade_id)?;
    trade.require(&[TradeStatus::Accepted, TradeStatus::Approved], "execute")?;
    compliance::validate_compliance(conn, &trade, &env.rules, env.season(now))?;

    transfer::transfer_all(conn, &trade)?;
    model::mark_completed(conn, trade_id, now)?;

    notify_teams(
        conn,
        trade.participants.iter().copied(),
        trade_id,
        "A trade you are involved in has been approved and assets have been transferred.",
        Level::Success,
        now,
    )?;
    let others: Vec<i64> = roster::team_ids(conn)?
        .into_iter()
        .filter(|t| !trade.involves(*t))
        .collect();
    notify_teams(
        conn,
        others,
        trade_id,
        "A trade has been completed in the league.",
        Level::Info,
        now,
    )?;
    info!(trade_id, assets = trade.assets.len(), "trade completed");
    model::trade(conn, trade_id)
}
