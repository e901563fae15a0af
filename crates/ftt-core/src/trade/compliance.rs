// Trade validation: structure, ownership, tradeability and cap bounds.

use std::collections::BTreeMap;

use rusqlite::Connection;

use crate::config::LeagueRules;
use crate::draft::pick;
use crate::error::{LeagueError, Result};
use crate::roster;
use crate::trade::model::{AssetRef, Trade, TradeAsset};

/// At least two participants, every asset moves between two different
/// participants, and every participant both sends and receives.
pub fn validate_structure(trade: &Trade) -> Result<()> {
    if trade.participants.len() < 2 {
        return Err(LeagueError::InvalidTrade(format!(
            "trade {} needs at least 2 participants, has {}",
            trade.id,
            trade.participants.len()
        )));
    }

    for asset in &trade.assets {
        if asset.sender_team_id == asset.receiver_team_id {
            return Err(LeagueError::InvalidTrade(format!(
                "asset {} is sent by team {} to itself",
                asset.id, asset.sender_team_id
            )));
        }
        for team in [asset.sender_team_id, asset.receiver_team_id] {
            if !trade.involves(team) {
                return Err(LeagueError::InvalidTrade(format!(
                    "asset {} involves team {team}, which is not part of the trade",
                    asset.id
                )));
            }
        }
        if asset.protection_override.is_some() && matches!(asset.asset, AssetRef::Player { .. }) {
            return Err(LeagueError::InvalidTrade(format!(
                "asset {} sets a pick protection on a player",
                asset.id
            )));
        }
    }

    for &team in &trade.participants {
        if !trade.assets.iter().any(|a| a.sender_team_id == team) {
            return Err(LeagueError::InvalidTrade(format!(
                "team {team} is not sending any assets"
            )));
        }
        if !trade.assets.iter().any(|a| a.receiver_team_id == team) {
            return Err(LeagueError::InvalidTrade(format!(
                "team {team} is not receiving any assets"
            )));
        }
    }
    Ok(())
}

/// Full compliance check run before a trade is accepted, approved or
/// executed. `season` is the current league year.
pub fn validate_compliance(
    conn: &Connection,
    trade: &Trade,
    rules: &LeagueRules,
    season: i32,
) -> Result<()> {
    validate_structure(trade)?;

    let mut net: BTreeMap<i64, (f64, i64)> = BTreeMap::new();
    for asset in &trade.assets {
        match asset.asset {
            AssetRef::Player { contract_id } => {
                let (salary, counts) = check_player(conn, asset, contract_id, season)?;
                if counts {
                    let from = net.entry(asset.sender_team_id).or_default();
                    from.0 -= salary;
                    from.1 -= 1;
                    let to = net.entry(asset.receiver_team_id).or_default();
                    to.0 += salary;
                    to.1 += 1;
                }
            }
            AssetRef::Pick { pick_id } => check_pick(conn, asset, pick_id)?,
        }
    }

    for &team_id in &trade.participants {
        let (salary_change, player_change) = net.get(&team_id).copied().unwrap_or_default();
        let totals = roster::team_totals(conn, team_id)?;
        let salary = totals.salary + salary_change;
        let players = totals.players + player_change;

        if salary > rules.salary_cap {
            return Err(LeagueError::CapacityExceeded {
                team_id,
                reason: format!(
                    "salary {salary:.2} over cap {:.2} (current {:.2}, net {salary_change:+.2})",
                    rules.salary_cap, totals.salary
                ),
            });
        }
        if players > i64::from(rules.max_players) {
            return Err(LeagueError::CapacityExceeded {
                team_id,
                reason: format!(
                    "{players} players over the {} player limit (net {player_change:+})",
                    rules.max_players
                ),
            });
        }
        if players < i64::from(rules.min_players) {
            return Err(LeagueError::CapacityExceeded {
                team_id,
                reason: format!(
                    "{players} players under the {} player minimum (net {player_change:+})",
                    rules.min_players
                ),
            });
        }
    }
    Ok(())
}

/// Returns the contract salary and whether it counts against caps (players
/// on IR do not).
fn check_player(
    conn: &Connection,
    asset: &TradeAsset,
    contract_id: i64,
    season: i32,
) -> Result<(f64, bool)> {
    let contract = roster::contract(conn, contract_id)?;
    let Some(player_id) = contract.player_id else {
        return Err(LeagueError::InvalidTrade(format!(
            "contract {contract_id} has no player"
        )));
    };
    if contract.team_id != Some(asset.sender_team_id) {
        return Err(LeagueError::AssetNotOwned {
            team_id: asset.sender_team_id,
            asset: format!("player {player_id}"),
        });
    }
    let remaining = contract.years_remaining(season);
    if !contract.is_rfa && remaining <= 0 {
        return Err(LeagueError::PlayerNotTradeable {
            player_id,
            reason: format!("{remaining} contract years remaining and not a restricted free agent"),
        });
    }
    let player = roster::player(conn, player_id)?;
    Ok((contract.salary, !player.is_ir))
}

fn check_pick(conn: &Connection, asset: &TradeAsset, pick_id: i64) -> Result<()> {
    let pick = pick::get(conn, pick_id)?;
    if pick.current_team_id != asset.sender_team_id {
        return Err(LeagueError::AssetNotOwned {
            team_id: asset.sender_team_id,
            asset: format!("pick {pick_id}"),
        });
    }
    if let Some(protection) = &asset.protection_override {
        pick::validate_protection(conn, Some(pick.id), pick.draft_year, pick.round, protection)?;
    }
    Ok(())
}
