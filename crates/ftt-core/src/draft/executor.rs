// Draft start, pick execution and the queued auto-pick cascade.

use chrono::{DateTime, FixedOffset, Utc};
use rand::Rng;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::DraftRules;
use crate::draft::autopick;
use crate::draft::clock::PickClock;
use crate::draft::model::{self, Draft, DraftPosition, NewPosition};
use crate::draft::order::DraftOrder;
use crate::draft::pick::{self, NewPick};
use crate::draft::queue;
use crate::error::{LeagueError, Result};
use crate::notify::{self, draft_label, hours_label, ordinal_suffix, Level};
use crate::roster::{self, Contract};

/// League-wide settings the draft engine needs.
#[derive(Debug, Clone)]
pub struct DraftEnv {
    pub rules: DraftRules,
    pub tz: FixedOffset,
}

impl DraftEnv {
    pub fn clock_for(&self, draft: &Draft) -> PickClock<FixedOffset> {
        PickClock::new(draft.active_hours, self.tz)
    }
}

/// Result of a `make_pick` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PickOutcome {
    /// The position the caller picked for.
    pub position: DraftPosition,
    /// Positions filled from teams' queues right after, in order.
    pub cascaded: Vec<DraftPosition>,
    /// The position now on the clock, if any.
    pub next_position_id: Option<i64>,
    pub draft_completed: bool,
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

/// Generate the order, create every position with its pick and contract, and
/// start the first clock. Returns the base team order.
pub fn start_draft<R: Rng + ?Sized>(
    conn: &Connection,
    env: &DraftEnv,
    draft_id: i64,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<Vec<i64>> {
    let draft = model::draft(conn, draft_id)?;
    if draft.is_completed {
        return Err(LeagueError::InvalidStateTransition {
            entity: "draft",
            status: "completed".into(),
            action: "start",
        });
    }
    if model::position_count(conn, draft_id)? > 0 {
        return Err(LeagueError::InvalidStateTransition {
            entity: "draft",
            status: "started".into(),
            action: "start",
        });
    }

    let teams = model::draft_team_ids(conn, draft_id)?;
    if teams.is_empty() {
        return Err(LeagueError::InvalidDraftConfiguration(format!(
            "draft {draft_id} has no teams"
        )));
    }

    let order = DraftOrder::generate_with(&teams, rng);
    let label = draft_label(draft.year, draft.is_league_draft);
    let mut first = None;

    for (overall, (round, round_pick, team_id)) in (1u32..).zip(order.slots(draft.rounds)) {
        let pick = slot_pick(conn, &draft, team_id, round)?;
        let terms = env.rules.contract_for(round, draft.is_league_draft);
        let contract = roster::insert_contract(
            conn,
            &Contract {
                id: 0,
                player_id: None,
                team_id: None,
                start_year: draft.year,
                duration: terms.duration,
                salary: terms.salary,
                is_rfa: false,
                team_option: terms.team_option,
            },
        )?;
        let position_id = model::insert_position(
            conn,
            draft_id,
            &NewPosition {
                pick_id: pick.id,
                overall_pick: overall,
                round,
                round_pick,
                contract_id: contract.id,
            },
        )?;
        first.get_or_insert(position_id);

        notify::notify_team(
            conn,
            pick.current_team_id,
            format!(
                "Your team has the {overall}{} pick in the {label}!",
                ordinal_suffix(overall)
            ),
            Level::Info,
            None,
            now,
        )?;
    }

    if let Some(first) = first {
        let started_at = draft.starts_at.map_or(now, |starts| starts.max(now));
        model::start_clock(conn, first, started_at)?;
        let position = model::position(conn, first)?;
        notify_on_clock(conn, env, &draft, &position, now)?;
    }

    info!(
        draft_id,
        year = draft.year,
        rounds = draft.rounds,
        teams = teams.len(),
        "draft started"
    );
    Ok(order.base().to_vec())
}

/// League drafts mint fresh picks; other drafts use the original team's
/// existing pick for the slot, creating it if it was never issued.
fn slot_pick(conn: &Connection, draft: &Draft, team_id: i64, round: u32) -> Result<pick::Pick> {
    if draft.is_league_draft {
        return pick::insert(
            conn,
            &NewPick {
                from_league_draft: true,
                ..NewPick::own(team_id, draft.year, round)
            },
        );
    }
    match pick::find_slot(conn, team_id, draft.year, round)? {
        Some(existing) => Ok(existing),
        None => {
            debug!(team_id, year = draft.year, round, "issuing missing pick");
            pick::insert(conn, &NewPick::own(team_id, draft.year, round))
        }
    }
}

// ---------------------------------------------------------------------------
// Picking
// ---------------------------------------------------------------------------

/// Make a pick for the current position. Without `player_id` the pick is
/// resolved by auto-pick. Afterwards the next position goes on the clock and
/// queued teams pick immediately.
pub fn make_pick(
    conn: &Connection,
    env: &DraftEnv,
    position_id: i64,
    player_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<PickOutcome> {
    let position = model::position(conn, position_id)?;
    if position.is_pick_made {
        return Err(LeagueError::PickAlreadyMade(position_id));
    }
    if !position.is_current {
        return Err(LeagueError::NotCurrentPosition(position_id));
    }

    let draft = model::draft(conn, position.draft_id)?;
    if draft.is_completed {
        return Err(LeagueError::InvalidStateTransition {
            entity: "draft",
            status: "completed".into(),
            action: "pick in",
        });
    }

    let (player_id, is_auto_pick) = match player_id {
        Some(player_id) => (player_id, false),
        None => {
            let team_id = selecting_team(conn, &position)?;
            let choice = autopick::resolve(conn, draft.id, team_id, now)?;
            warn!(
                draft_id = draft.id,
                position = position.overall_pick,
                player_id = choice.player_id,
                source = ?choice.source,
                "auto-pick"
            );
            (choice.player_id, true)
        }
    };

    record_pick(conn, &draft, &position, player_id, is_auto_pick, now)?;
    let advance = advance(conn, env, &draft, &position, now)?;

    Ok(PickOutcome {
        position: model::position(conn, position_id)?,
        cascaded: advance.cascaded,
        next_position_id: advance.next_position_id,
        draft_completed: advance.draft_completed,
    })
}

fn selecting_team(conn: &Connection, position: &DraftPosition) -> Result<i64> {
    let pick_id = position.pick_id.ok_or_else(|| {
        LeagueError::InvalidPick(format!("draft position {} has no pick", position.id))
    })?;
    Ok(pick::get(conn, pick_id)?.current_team_id)
}

fn record_pick(
    conn: &Connection,
    draft: &Draft,
    position: &DraftPosition,
    player_id: i64,
    is_auto_pick: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let pick_id = position.pick_id.ok_or_else(|| {
        LeagueError::InvalidPick(format!("draft position {} has no pick", position.id))
    })?;
    let contract_id = position.contract_id.ok_or_else(|| {
        LeagueError::InvalidPick(format!("draft position {} has no contract", position.id))
    })?;
    let pick = pick::find(conn, pick_id)?
        .ok_or_else(|| LeagueError::InvalidPick(format!("pick {pick_id} no longer exists")))?;

    if !model::in_pool(conn, draft.id, player_id)? || roster::is_rostered(conn, player_id)? {
        return Err(LeagueError::PlayerUnavailable(player_id));
    }

    model::record_selection(conn, position.id, player_id, is_auto_pick, now)?;
    roster::assign_contract(conn, contract_id, Some(player_id), Some(pick.current_team_id))?;
    model::remove_from_pool(conn, draft.id, player_id)?;
    queue::remove_everywhere(conn, draft.id, player_id, now)?;
    if pick.actual_pick_number.is_none() {
        pick::set_actual_number(conn, pick.id, position.overall_pick)?;
    }

    info!(
        draft_id = draft.id,
        position = position.overall_pick,
        team_id = pick.current_team_id,
        player_id,
        is_auto_pick,
        "pick made"
    );
    Ok(())
}

struct Advance {
    cascaded: Vec<DraftPosition>,
    next_position_id: Option<i64>,
    draft_completed: bool,
}

/// Move the clock past `from`. Each following team with an armed queue picks
/// straight away; the loop stops at the first team that has to pick by hand
/// or when the draft runs out of positions.
fn advance(
    conn: &Connection,
    env: &DraftEnv,
    draft: &Draft,
    from: &DraftPosition,
    now: DateTime<Utc>,
) -> Result<Advance> {
    let total = model::position_count(conn, draft.id)?;
    let mut cascaded = Vec::new();
    let mut overall = from.overall_pick;

    loop {
        let Some(next) = model::position_at(conn, draft.id, overall + 1)? else {
            complete(conn, draft, now)?;
            return Ok(Advance {
                cascaded,
                next_position_id: None,
                draft_completed: true,
            });
        };
        model::start_clock(conn, next.id, now)?;
        let team_id = selecting_team(conn, &next)?;

        let queued = if cascaded.len() < total as usize {
            queue::pop_available(conn, draft.id, team_id, now)?
        } else {
            None
        };
        let Some(player_id) = queued else {
            let next = model::position(conn, next.id)?;
            notify_on_clock(conn, env, draft, &next, now)?;
            return Ok(Advance {
                cascaded,
                next_position_id: Some(next.id),
                draft_completed: false,
            });
        };

        record_pick(conn, draft, &next, player_id, true, now)?;
        let name = roster::player(conn, player_id)?.name;
        notify::notify_team(
            conn,
            team_id,
            format!("Your team has automatically picked {name} from the draft queue."),
            Level::Warning,
            None,
            now,
        )?;
        cascaded.push(model::position(conn, next.id)?);
        overall = next.overall_pick;
    }
}

fn complete(conn: &Connection, draft: &Draft, now: DateTime<Utc>) -> Result<()> {
    model::mark_completed(conn, draft.id)?;
    let label = draft_label(draft.year, draft.is_league_draft);
    for team_id in model::draft_team_ids(conn, draft.id)? {
        notify::notify_team(
            conn,
            team_id,
            format!("The {label} has been completed!"),
            Level::Success,
            None,
            now,
        )?;
    }
    info!(draft_id = draft.id, "draft completed");
    Ok(())
}

/// Tell the team on the clock, and the next few teams how far away they are.
fn notify_on_clock(
    conn: &Connection,
    env: &DraftEnv,
    draft: &Draft,
    position: &DraftPosition,
    now: DateTime<Utc>,
) -> Result<()> {
    let label = draft_label(draft.year, draft.is_league_draft);
    let team_id = selecting_team(conn, position)?;
    notify::notify_team(
        conn,
        team_id,
        format!(
            "Your team is now on the clock for the {}{} pick in the {label}. You have {} to make your pick.",
            position.overall_pick,
            ordinal_suffix(position.overall_pick),
            hours_label(draft.time_limit_minutes)
        ),
        Level::Warning,
        None,
        now,
    )?;

    for ahead in 1..=env.rules.upcoming_notice_count {
        let Some(upcoming) = model::position_at(conn, draft.id, position.overall_pick + ahead)? else {
            break;
        };
        let upcoming_team = selecting_team(conn, &upcoming)?;
        notify::notify_team(
            conn,
            upcoming_team,
            format!("Your team will be on the clock in {ahead} picks in the {label}."),
            Level::Info,
            None,
            now,
        )?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Expiry
// ---------------------------------------------------------------------------

/// Auto-pick every expired clock in one draft. Returns the outcomes in the
/// order they happened; stops at the first clock with time left.
pub fn process_expired(
    conn: &Connection,
    env: &DraftEnv,
    draft_id: i64,
    now: DateTime<Utc>,
) -> Result<Vec<PickOutcome>> {
    let draft = model::draft(conn, draft_id)?;
    if !draft.is_live(now) {
        return Ok(Vec::new());
    }
    let clock = env.clock_for(&draft);
    let budget = model::position_count(conn, draft_id)?;
    let mut outcomes = Vec::new();

    for _ in 0..budget {
        let Some(current) = model::current_position(conn, draft_id)? else {
            break;
        };
        let remaining = clock.remaining_seconds(
            current.started_at,
            current.is_current,
            draft.time_limit_minutes,
            now,
        );
        if remaining > 0 {
            debug!(draft_id, position = current.overall_pick, remaining, "clock still running");
            break;
        }
        let outcome = make_pick(conn, env, current.id, None, now)?;
        let done = outcome.draft_completed;
        outcomes.push(outcome);
        if done {
            break;
        }
    }
    Ok(outcomes)
}

/// When the current clock of `draft_id` runs out, if it has one.
pub fn expiry(
    conn: &Connection,
    env: &DraftEnv,
    draft: &Draft,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    if draft.is_completed {
        return Ok(None);
    }
    let Some(current) = model::current_position(conn, draft.id)? else {
        return Ok(None);
    };
    let clock = env.clock_for(draft);
    Ok(Some(clock.expires_at(
        current.started_at,
        current.is_current,
        draft.time_limit_minutes,
        now,
    )))
}

/// Remaining seconds on a position's clock.
pub fn remaining_seconds(
    conn: &Connection,
    env: &DraftEnv,
    position: &DraftPosition,
    now: DateTime<Utc>,
) -> Result<i64> {
    let draft = model::draft(conn, position.draft_id)?;
    Ok(env.clock_for(&draft).remaining_seconds(
        position.started_at,
        position.is_current,
        draft.time_limit_minutes,
        now,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::draft::model::{insert_draft, NewDraft};
    use crate::draft::queue::DraftQueue;
    use crate::roster::{insert_player, insert_team, insert_user};
    use chrono::{Duration, TimeZone};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn env() -> DraftEnv {
        DraftEnv {
            rules: DraftRules::default(),
            tz: FixedOffset::east_opt(0).unwrap(),
        }
    }

    struct Setup {
        db: Database,
        draft_id: i64,
        teams: Vec<i64>,
        players: Vec<i64>,
    }

    fn setup(team_count: usize, rounds: u32, player_count: usize) -> Setup {
        let db = Database::open_in_memory().unwrap();
        let (draft_id, teams, players) = db
            .transaction(|tx| {
                let mut teams = Vec::new();
                for i in 0..team_count {
                    let user = insert_user(tx, &format!("owner{i}"), false, false)?;
                    teams.push(insert_team(tx, &format!("Team {i}"), user.id)?.id);
                }
                let mut players = Vec::new();
                for i in 0..player_count {
                    let p = insert_player(tx, &format!("Player {i}"), Some("BOS"), (100 - i) as f64)?;
                    players.push(p.id);
                }
                let draft = insert_draft(
                    tx,
                    &NewDraft {
                        year: 2025,
                        rounds,
                        team_ids: teams.clone(),
                        player_ids: players.clone(),
                        starts_at: None,
                        time_limit_minutes: 60,
                        active_hour_start: 0,
                        active_hour_end: 24,
                        is_league_draft: true,
                    },
                    now(),
                )?;
                Ok((draft.id, teams, players))
            })
            .unwrap();
        Setup { db, draft_id, teams, players }
    }

    fn start(s: &Setup) -> Vec<i64> {
        s.db
            .transaction(|tx| {
                start_draft(tx, &env(), s.draft_id, now(), &mut StdRng::seed_from_u64(1))
            })
            .unwrap()
    }

    #[test]
    fn start_creates_every_position_with_first_on_the_clock() {
        let s = setup(4, 3, 20);
        let order = start(&s);
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, s.teams);

        let positions = s.db.read(|conn| model::positions(conn, s.draft_id)).unwrap();
        assert_eq!(positions.len(), 12);
        let numbers: Vec<u32> = positions.iter().map(|p| p.overall_pick).collect();
        assert_eq!(numbers, (1..=12).collect::<Vec<_>>());
        assert!(positions[0].is_current);
        assert_eq!(positions[0].started_at, Some(now()));
        assert_eq!(positions.iter().filter(|p| p.is_current).count(), 1);
        assert!(positions.iter().all(|p| p.contract_id.is_some()));
    }

    #[test]
    fn start_twice_is_rejected() {
        let s = setup(2, 1, 4);
        start(&s);
        let err = s
            .db
            .transaction(|tx| {
                start_draft(tx, &env(), s.draft_id, now(), &mut StdRng::seed_from_u64(2))
            })
            .unwrap_err();
        assert!(matches!(err, LeagueError::InvalidStateTransition { .. }));
    }

    #[test]
    fn pick_errors_in_order() {
        let s = setup(2, 1, 4);
        start(&s);
        let positions = s.db.read(|conn| model::positions(conn, s.draft_id)).unwrap();
        let (first, second) = (positions[0].id, positions[1].id);

        let err = s
            .db
            .transaction(|tx| make_pick(tx, &env(), second, Some(s.players[0]), now()))
            .unwrap_err();
        assert!(matches!(err, LeagueError::NotCurrentPosition(id) if id == second));

        s.db
            .transaction(|tx| make_pick(tx, &env(), first, Some(s.players[0]), now()))
            .unwrap();
        let err = s
            .db
            .transaction(|tx| make_pick(tx, &env(), first, Some(s.players[1]), now()))
            .unwrap_err();
        assert!(matches!(err, LeagueError::PickAlreadyMade(id) if id == first));

        let err = s
            .db
            .transaction(|tx| make_pick(tx, &env(), second, Some(s.players[0]), now()))
            .unwrap_err();
        assert!(matches!(err, LeagueError::PlayerUnavailable(_)));
    }

    #[test]
    fn pick_assigns_contract_to_pick_holder() {
        let s = setup(2, 1, 4);
        start(&s);
        let first = s.db.read(|conn| model::positions(conn, s.draft_id)).unwrap()[0].clone();
        let outcome = s
            .db
            .transaction(|tx| make_pick(tx, &env(), first.id, Some(s.players[2]), now()))
            .unwrap();
        assert!(outcome.position.is_pick_made);
        assert!(!outcome.position.is_auto_pick);
        assert!(outcome.next_position_id.is_some());

        let (contract, holder) = s
            .db
            .read(|conn| {
                let contract = roster::contract(conn, first.contract_id.unwrap())?;
                let holder = pick::get(conn, first.pick_id.unwrap())?.current_team_id;
                Ok((contract, holder))
            })
            .unwrap();
        assert_eq!(contract.player_id, Some(s.players[2]));
        assert_eq!(contract.team_id, Some(holder));
        assert!((contract.salary - 25.0).abs() < 1e-9);
    }

    #[test]
    fn queued_teams_pick_immediately() {
        let s = setup(3, 1, 6);
        start(&s);
        let positions = s.db.read(|conn| model::positions(conn, s.draft_id)).unwrap();
        let holders: Vec<i64> = s
            .db
            .read(|conn| {
                positions
                    .iter()
                    .map(|p| Ok(pick::get(conn, p.pick_id.unwrap())?.current_team_id))
                    .collect()
            })
            .unwrap();

        s.db
            .transaction(|tx| {
                queue::save(
                    tx,
                    &DraftQueue {
                        player_ids: vec![s.players[0], s.players[4]],
                        ..DraftQueue::empty(s.draft_id, holders[1])
                    },
                    now(),
                )
            })
            .unwrap();

        // Team one takes the player team two queued first; team two falls
        // through to its second choice and team three is left on the clock.
        let outcome = s
            .db
            .transaction(|tx| make_pick(tx, &env(), positions[0].id, Some(s.players[0]), now()))
            .unwrap();
        assert_eq!(outcome.cascaded.len(), 1);
        assert_eq!(outcome.cascaded[0].selected_player_id, Some(s.players[4]));
        assert!(outcome.cascaded[0].is_auto_pick);
        assert_eq!(outcome.next_position_id, Some(positions[2].id));
        assert!(!outcome.draft_completed);
    }

    #[test]
    fn expired_clocks_are_auto_picked_until_completion() {
        let s = setup(2, 1, 4);
        start(&s);
        let later = now() + Duration::minutes(61);
        let early = s
            .db
            .transaction(|tx| process_expired(tx, &env(), s.draft_id, now()))
            .unwrap();
        assert!(early.is_empty());

        let first = s
            .db
            .transaction(|tx| process_expired(tx, &env(), s.draft_id, later))
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].position.selected_player_id, Some(s.players[0]));

        let last = s
            .db
            .transaction(|tx| process_expired(tx, &env(), s.draft_id, later + Duration::minutes(61)))
            .unwrap();
        assert_eq!(last.len(), 1);
        assert!(last[0].draft_completed);
        let draft = s.db.read(|conn| model::draft(conn, s.draft_id)).unwrap();
        assert!(draft.is_completed);
    }
}
