// End-to-end trade tests through the `League` facade: proposal, counter-offers,
// commissioner voting, cap enforcement and execution.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use ftt_core::config::config_from_str;
use ftt_core::db::Database;
use ftt_core::draft::pick::{self, NewPick, Protection};
use ftt_core::roster::{self, Contract};
use ftt_core::time::FixedClock;
use ftt_core::trade::model::{NewAsset, NewTrade, TradeStatus, Vote};
use ftt_core::trade::timeline::TimelineKind;
use ftt_core::trade::workflow::Response;
use ftt_core::{League, LeagueError};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 15, 18, 0, 0).unwrap()
}

fn league_with(config: &str) -> League {
    let clock = Arc::new(FixedClock::new(now()));
    let db = Database::open_in_memory().unwrap();
    League::new(db, config_from_str(config).unwrap(), clock).unwrap()
}

fn config(salary_cap: f64) -> String {
    format!(
        r#"
[league]
name = "Trade League"
salary_cap = {salary_cap:.1}
max_players = 15
min_players = 0
utc_offset = "-05:00"
"#
    )
}

struct Teams {
    a: i64,
    b: i64,
    pick_a: i64,
    pick_b: i64,
}

/// Two owned teams, each holding its own 2026 first.
fn two_teams(league: &League) -> Teams {
    league
        .db()
        .transaction(|tx| {
            let ua = roster::insert_user(tx, "alice", false, false)?;
            let ub = roster::insert_user(tx, "bob", false, false)?;
            let a = roster::insert_team(tx, "Aces", ua.id)?.id;
            let b = roster::insert_team(tx, "Bears", ub.id)?.id;
            let pick_a = pick::insert(tx, &NewPick::own(a, 2026, 1))?.id;
            let pick_b = pick::insert(tx, &NewPick::own(b, 2026, 1))?.id;
            Ok(Teams {
                a,
                b,
                pick_a,
                pick_b,
            })
        })
        .unwrap()
}

fn commissioners(league: &League, count: usize, admin: bool) -> Vec<i64> {
    league
        .db()
        .transaction(|tx| {
            let mut ids = Vec::new();
            for i in 0..count {
                let name = if admin { format!("admin{i}") } else { format!("comm{i}") };
                ids.push(roster::insert_user(tx, &name, !admin, admin)?.id);
            }
            Ok(ids)
        })
        .unwrap()
}

fn pick_swap(league: &League, t: &Teams) -> i64 {
    league
        .create_trade(&NewTrade {
            sender_team_id: t.a,
            participants: vec![t.a, t.b],
            assets: vec![
                NewAsset::pick(t.a, t.b, t.pick_a),
                NewAsset::pick(t.b, t.a, t.pick_b),
            ],
            notes: "firsts for firsts".into(),
        })
        .unwrap()
        .id
}

#[test]
fn single_participant_trade_is_rejected() {
    let league = league_with(&config(200.0));
    let t = two_teams(&league);
    let trade = league
        .create_trade(&NewTrade {
            sender_team_id: t.a,
            participants: vec![t.a],
            assets: vec![],
            notes: String::new(),
        })
        .unwrap();
    assert!(matches!(
        league.propose_trade(trade.id),
        Err(LeagueError::InvalidTrade(_))
    ));
    assert_eq!(league.trade(trade.id).unwrap().status, TradeStatus::Draft);
}

#[test]
fn unknown_assets_are_not_found() {
    let league = league_with(&config(200.0));
    let t = two_teams(&league);
    let err = league
        .create_trade(&NewTrade {
            sender_team_id: t.a,
            participants: vec![t.a, t.b],
            assets: vec![NewAsset::pick(t.a, t.b, 9999), NewAsset::pick(t.b, t.a, 9998)],
            notes: String::new(),
        })
        .unwrap_err();
    assert!(matches!(err, LeagueError::NotFound { entity: "pick", id: 9999 }));
    assert!(!err.is_retryable());

    let err = league
        .create_trade(&NewTrade {
            sender_team_id: t.a,
            participants: vec![t.a, t.b],
            assets: vec![NewAsset::player(t.a, t.b, 4242), NewAsset::pick(t.b, t.a, t.pick_b)],
            notes: String::new(),
        })
        .unwrap_err();
    assert!(matches!(err, LeagueError::NotFound { entity: "contract", id: 4242 }));
}

#[test]
fn five_commissioners_need_three_approvals() {
    let league = league_with(&config(200.0));
    let t = two_teams(&league);
    let comms = commissioners(&league, 5, false);
    let trade_id = pick_swap(&league, &t);

    league.propose_trade(trade_id).unwrap();
    let accepted = league
        .respond_to_trade(trade_id, t.b, Response::Accept, "")
        .unwrap();
    assert_eq!(accepted.trade.status, TradeStatus::WaitingApproval);

    let first = league.record_vote(trade_id, comms[0], Vote::Approve, "").unwrap();
    assert!(!first.decision_made);
    assert_eq!(first.votes_needed, 2);

    league.record_vote(trade_id, comms[1], Vote::Approve, "").unwrap();
    let split = league.record_vote(trade_id, comms[2], Vote::Veto, "lopsided").unwrap();
    assert!(!split.decision_made);
    assert_eq!(split.final_status, None);
    assert_eq!((split.tally.approve, split.tally.veto, split.tally.total), (2, 1, 5));

    let summary = league.vote_summary(trade_id).unwrap();
    assert_eq!(summary.pending_voters, vec![comms[3], comms[4]]);

    let decided = league.record_vote(trade_id, comms[3], Vote::Approve, "").unwrap();
    assert!(decided.decision_made);
    assert_eq!(decided.final_status, Some(TradeStatus::Approved));
    assert!(decided.executed);

    let trade = league.trade(trade_id).unwrap();
    assert_eq!(trade.status, TradeStatus::Completed);
    assert_eq!(trade.approved_by, Some(comms[3]));

    let (pa, pb) = league
        .db()
        .read(|conn| Ok((pick::get(conn, t.pick_a)?, pick::get(conn, t.pick_b)?)))
        .unwrap();
    assert_eq!(pa.current_team_id, t.b);
    assert_eq!(pb.current_team_id, t.a);

    // Voting on a finished trade is a state error.
    assert!(matches!(
        league.record_vote(trade_id, comms[4], Vote::Veto, ""),
        Err(LeagueError::InvalidStateTransition { .. })
    ));

    let kinds: Vec<TimelineKind> = league.timeline(trade_id).unwrap().iter().map(|e| e.kind).collect();
    assert_eq!(kinds.first(), Some(&TimelineKind::Created));
    assert_eq!(kinds.last(), Some(&TimelineKind::Completed));
    assert_eq!(kinds.iter().filter(|k| **k == TimelineKind::Voted).count(), 4);
}

#[test]
fn admin_vote_is_decisive() {
    let league = league_with(&config(200.0));
    let t = two_teams(&league);
    commissioners(&league, 3, false);
    let admin = commissioners(&league, 1, true)[0];
    let trade_id = pick_swap(&league, &t);

    league.propose_trade(trade_id).unwrap();
    league
        .respond_to_trade(trade_id, t.b, Response::Accept, "")
        .unwrap();
    let outcome = league.record_vote(trade_id, admin, Vote::Veto, "no").unwrap();
    assert!(outcome.decision_made);
    assert_eq!(outcome.final_status, Some(TradeStatus::Vetoed));
    // The admin's ballot is not part of the commissioner tally.
    assert_eq!(outcome.tally.total, 3);
    assert_eq!(outcome.tally.veto, 0);

    let trade = league.trade(trade_id).unwrap();
    assert_eq!(trade.status, TradeStatus::Vetoed);
    assert!(trade.closed_at.is_some());
}

#[test]
fn counter_offer_supersedes_the_parent() {
    let league = league_with(&config(200.0));
    let t = two_teams(&league);
    let trade_id = pick_swap(&league, &t);
    league.propose_trade(trade_id).unwrap();

    let protection = Protection::TopX {
        top: 3,
        rollover_year: 2027,
    };
    let outcome = league
        .respond_to_trade(
            trade_id,
            t.b,
            Response::Counter {
                assets: Some(vec![
                    NewAsset::pick(t.a, t.b, t.pick_a),
                    NewAsset::pick(t.b, t.a, t.pick_b).with_protection(protection),
                ]),
            },
            "protect mine",
        )
        .unwrap();
    let child = outcome.counter_offer.expect("counter-offer");
    assert_eq!(child.parent_id, Some(trade_id));
    assert_eq!(child.sender_team_id, t.b);
    assert_eq!(child.status, TradeStatus::Draft);
    assert_eq!(child.notes, format!("Counter-offer to Trade {trade_id}"));
    assert!(!outcome.trade.is_latest);

    // The parent can no longer be accepted.
    assert!(matches!(
        league.respond_to_trade(trade_id, t.a, Response::Accept, ""),
        Err(LeagueError::InvalidStateTransition { .. })
    ));

    league.propose_trade(child.id).unwrap();
    let done = league
        .respond_to_trade(child.id, t.a, Response::Accept, "fine")
        .unwrap();
    assert_eq!(done.trade.status, TradeStatus::Completed);

    let moved = league.db().read(|conn| pick::get(conn, t.pick_b)).unwrap();
    assert_eq!(moved.current_team_id, t.a);
    assert_eq!(moved.protection, protection);

    let messages: Vec<String> = league
        .pending_notifications(100)
        .unwrap()
        .into_iter()
        .map(|n| n.message)
        .collect();
    assert!(messages
        .iter()
        .any(|m| m == "A counteroffer has been made to your trade proposal by bob."));
}

#[test]
fn rejection_closes_the_trade() {
    let league = league_with(&config(200.0));
    let t = two_teams(&league);
    let trade_id = pick_swap(&league, &t);
    league.propose_trade(trade_id).unwrap();

    let outcome = league
        .respond_to_trade(trade_id, t.b, Response::Reject, "no thanks")
        .unwrap();
    assert_eq!(outcome.trade.status, TradeStatus::Rejected);
    assert!(matches!(
        league.cancel_trade(trade_id, t.a),
        Err(LeagueError::InvalidStateTransition { .. })
    ));
}

#[test]
fn cap_violation_blocks_acceptance() {
    let league = league_with(&config(50.0));
    let t = two_teams(&league);
    let (big, small) = league
        .db()
        .transaction(|tx| {
            let contract = |team_id: i64, name: &str, salary: f64| -> ftt_core::Result<i64> {
                let player = roster::insert_player(tx, name, Some("LAL"), 50.0)?;
                Ok(roster::insert_contract(
                    tx,
                    &Contract {
                        id: 0,
                        player_id: Some(player.id),
                        team_id: Some(team_id),
                        start_year: 2025,
                        duration: 3,
                        salary,
                        is_rfa: false,
                        team_option: false,
                    },
                )?
                .id)
            };
            let big = contract(t.a, "Star", 45.0)?;
            contract(t.b, "Starter", 30.0)?;
            let small = contract(t.b, "Bench", 2.0)?;
            Ok((big, small))
        })
        .unwrap();

    let trade_id = league
        .create_trade(&NewTrade {
            sender_team_id: t.a,
            participants: vec![t.a, t.b],
            assets: vec![
                NewAsset::player(t.a, t.b, big),
                NewAsset::player(t.b, t.a, small),
            ],
            notes: String::new(),
        })
        .unwrap()
        .id;
    league.propose_trade(trade_id).unwrap();

    let err = league
        .respond_to_trade(trade_id, t.b, Response::Accept, "")
        .unwrap_err();
    assert!(matches!(err, LeagueError::CapacityExceeded { team_id, .. } if team_id == t.b));

    // The failed acceptance rolled back; the response is still open.
    let trade = league.trade(trade_id).unwrap();
    assert_eq!(trade.status, TradeStatus::Proposed);
    let responses = league
        .db()
        .read(|conn| ftt_core::trade::model::responses(conn, trade_id))
        .unwrap();
    assert!(responses
        .iter()
        .any(|r| r.team_id == t.b && r.status == ftt_core::trade::model::ResponseStatus::Pending));
}

#[test]
fn untradeable_expired_contract() {
    let league = league_with(&config(200.0));
    let t = two_teams(&league);
    let expired = league
        .db()
        .transaction(|tx| {
            let player = roster::insert_player(tx, "Veteran", Some("BOS"), 10.0)?;
            Ok(roster::insert_contract(
                tx,
                &Contract {
                    id: 0,
                    player_id: Some(player.id),
                    team_id: Some(t.a),
                    start_year: 2022,
                    duration: 3,
                    salary: 5.0,
                    is_rfa: false,
                    team_option: false,
                },
            )?
            .id)
        })
        .unwrap();

    let trade_id = league
        .create_trade(&NewTrade {
            sender_team_id: t.a,
            participants: vec![t.a, t.b],
            assets: vec![
                NewAsset::player(t.a, t.b, expired),
                NewAsset::pick(t.b, t.a, t.pick_b),
            ],
            notes: String::new(),
        })
        .unwrap()
        .id;
    league.propose_trade(trade_id).unwrap();
    assert!(matches!(
        league.respond_to_trade(trade_id, t.b, Response::Accept, ""),
        Err(LeagueError::PlayerNotTradeable { .. })
    ));
}
