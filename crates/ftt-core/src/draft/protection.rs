// Pick protection evaluation (pure) and application (transactional).

use std::collections::BTreeMap;

use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use crate::draft::pick::{self, NewPick, Pick, Protection};
use crate::error::{LeagueError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ProtectionAction {
    /// The pick goes to its holder as-is.
    Convey,
    /// Holders of this pick and the target exchange.
    Swap { with_pick_id: i64 },
    /// The pick stays with its original team and the holder gets a pick in
    /// `rollover_year` instead.
    Rollover { rollover_year: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProtectionOutcome {
    pub triggered: bool,
    pub action: ProtectionAction,
}

impl ProtectionOutcome {
    fn convey() -> Self {
        ProtectionOutcome {
            triggered: false,
            action: ProtectionAction::Convey,
        }
    }
}

/// Decide what a protection does once the pick's slot is known.
///
/// `target_number` is the actual slot of the swap target, required for the
/// swap variants. Equal slots never swap.
pub fn evaluate(
    protection: &Protection,
    actual: u32,
    target_number: Option<u32>,
) -> Result<ProtectionOutcome> {
    let outcome = match *protection {
        Protection::None => ProtectionOutcome::convey(),
        Protection::TopX { top, rollover_year } => {
            rollover_if((1..=top).contains(&actual), rollover_year)
        }
        Protection::DoesntConvey {
            range_start,
            range_end,
            rollover_year,
        } => rollover_if((range_start..=range_end).contains(&actual), rollover_year),
        Protection::SwapBest { target_pick_id } => {
            let target = require_target(target_pick_id, target_number)?;
            swap_if(actual < target, target_pick_id)
        }
        Protection::SwapWorst { target_pick_id } => {
            let target = require_target(target_pick_id, target_number)?;
            swap_if(actual > target, target_pick_id)
        }
    };
    Ok(outcome)
}

fn rollover_if(protected: bool, rollover_year: i32) -> ProtectionOutcome {
    if !protected {
        return ProtectionOutcome::convey();
    }
    ProtectionOutcome {
        triggered: true,
        action: ProtectionAction::Rollover { rollover_year },
    }
}

fn swap_if(swap: bool, with_pick_id: i64) -> ProtectionOutcome {
    if !swap {
        return ProtectionOutcome::convey();
    }
    ProtectionOutcome {
        triggered: true,
        action: ProtectionAction::Swap { with_pick_id },
    }
}

fn require_target(target_pick_id: i64, target_number: Option<u32>) -> Result<u32> {
    target_number.ok_or_else(|| {
        LeagueError::ProtectionConfiguration(format!(
            "swap target pick {target_pick_id} has no draft slot"
        ))
    })
}

/// What applying a protection changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtectionResult {
    pub pick_id: i64,
    pub actual_pick_number: u32,
    pub outcome: ProtectionOutcome,
    pub rollover_pick_id: Option<i64>,
}

/// Apply an evaluated outcome to `pick`. Triggered protections are cleared
/// afterwards so a second evaluation is a no-op.
pub fn apply(conn: &Connection, pick: &Pick, outcome: ProtectionOutcome) -> Result<Option<i64>> {
    match outcome.action {
        ProtectionAction::Convey => {
            pick::set_conveyed(conn, pick.id, true)?;
            Ok(None)
        }
        ProtectionAction::Swap { with_pick_id } => {
            let target = pick::get(conn, with_pick_id)?;
            pick::set_current_team(conn, pick.id, target.current_team_id)?;
            pick::set_current_team(conn, target.id, pick.current_team_id)?;
            pick::set_conveyed(conn, pick.id, true)?;
            pick::set_protection(conn, pick.id, &Protection::None)?;
            if target.protection.swap_target() == Some(pick.id) {
                pick::set_protection(conn, target.id, &Protection::None)?;
            }
            info!(
                pick_id = pick.id,
                target_pick_id = target.id,
                "swap protection triggered"
            );
            Ok(None)
        }
        ProtectionAction::Rollover { rollover_year } => {
            let holder = pick.current_team_id;
            pick::set_current_team(conn, pick.id, pick.original_team_id)?;
            pick::set_conveyed(conn, pick.id, false)?;
            pick::set_protection(conn, pick.id, &Protection::None)?;

            let rolled = pick::insert(
                conn,
                &NewPick {
                    original_team_id: pick.original_team_id,
                    current_team_id: holder,
                    draft_year: rollover_year,
                    round: pick.round,
                    from_league_draft: pick.from_league_draft,
                    protection: Protection::None,
                },
            )?;
            info!(
                pick_id = pick.id,
                rollover_pick_id = rolled.id,
                rollover_year,
                "protected pick rolled over"
            );
            Ok(Some(rolled.id))
        }
    }
}

/// Record actual slots for a draft year's picks, then evaluate and apply
/// every protection in that year whose pick has a slot.
pub fn evaluate_year(
    conn: &Connection,
    draft_year: i32,
    actual_numbers: &BTreeMap<i64, u32>,
) -> Result<Vec<ProtectionResult>> {
    for (&pick_id, &number) in actual_numbers {
        pick::set_actual_number(conn, pick_id, number)?;
    }

    let mut results = Vec::new();
    for candidate in pick::protected_in_year(conn, draft_year)? {
        // Re-read: an earlier swap in this pass may have changed it.
        let current = pick::get(conn, candidate.id)?;
        if current.protection.is_none() {
            continue;
        }
        let Some(actual) = current.actual_pick_number else {
            continue;
        };
        let target_number = match current.protection.swap_target() {
            Some(target_id) => pick::get(conn, target_id)?.actual_pick_number,
            None => None,
        };

        let outcome = evaluate(&current.protection, actual, target_number)?;
        let rollover_pick_id = apply(conn, &current, outcome)?;
        results.push(ProtectionResult {
            pick_id: current.id,
            actual_pick_number: actual,
            outcome,
            rollover_pick_id,
        });
    }
    Ok(results)
}
