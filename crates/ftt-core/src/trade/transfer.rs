// Ownership transfer for every asset of an executed trade.

use rusqlite::Connection;
use tracing::debug;

use crate::draft::pick;
use crate::error::Result;
use crate::roster;
use crate::trade::model::{AssetRef, Trade, TradeAsset};

/// Move one asset to its receiver. Pick overrides replace the pick's
/// protection.
pub fn transfer_asset(conn: &Connection, asset: &TradeAsset) -> Result<()> {
    match asset.asset {
        AssetRef::Player { contract_id } => {
            roster::set_contract_team(conn, contract_id, asset.receiver_team_id)?;
        }
        AssetRef::Pick { pick_id } => {
            pick::set_current_team(conn, pick_id, asset.receiver_team_id)?;
            if let Some(protection) = &asset.protection_override {
                pick::set_protection(conn, pick_id, protection)?;
            }
        }
    }
    debug!(
        trade_id = asset.trade_id,
        asset = ?asset.asset,
        to = asset.receiver_team_id,
        "asset transferred"
    );
    Ok(())
}

/// Transfer every asset. Callers run this inside the trade's transaction so a
/// failure leaves nothing half-moved.
pub fn transfer_all(conn: &Connection, trade: &Trade) -> Result<()> {
    for asset in &trade.assets {
        transfer_asset(conn, asset)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::draft::pick::{NewPick, Protection};
    use crate::roster::{insert_contract, insert_player, insert_team, insert_user, Contract};
    use crate::trade::model::{insert_trade, NewAsset, NewTrade};
    use chrono::Utc;

    #[test]
    fn moves_players_and_picks_with_override() {
        let db = Database::open_in_memory().unwrap();
        let (contract, moved_pick, a, b) = db
            .transaction(|tx| {
                let ua = insert_user(tx, "a", false, false)?;
                let ub = insert_user(tx, "b", false, false)?;
                let a = insert_team(tx, "A", ua.id)?.id;
                let b = insert_team(tx, "B", ub.id)?.id;
                let player = insert_player(tx, "P", Some("MIA"), 1.0)?;
                let contract = insert_contract(
                    tx,
                    &Contract {
                        id: 0,
                        player_id: Some(player.id),
                        team_id: Some(a),
                        start_year: 2025,
                        duration: 2,
                        salary: 10.0,
                        is_rfa: false,
                        team_option: false,
                    },
                )?;
                let pk = pick::insert(tx, &NewPick::own(b, 2026, 1))?;
                let protection =
                    Protection::DoesntConvey { range_start: 1, range_end: 4, rollover_year: 2027 };
                let trade = insert_trade(
                    tx,
                    &NewTrade {
                        sender_team_id: a,
                        participants: vec![a, b],
                        assets: vec![
                            NewAsset::player(a, b, contract.id),
                            NewAsset::pick(b, a, pk.id).with_protection(protection),
                        ],
                        notes: String::new(),
                    },
                    None,
                    Utc::now(),
                )?;
                transfer_all(tx, &trade)?;
                Ok((roster::contract(tx, contract.id)?, pick::get(tx, pk.id)?, a, b))
            })
            .unwrap();

        assert_eq!(contract.team_id, Some(b));
        assert!(contract.player_id.is_some());
        assert_eq!(moved_pick.current_team_id, a);
        assert_eq!(moved_pick.original_team_id, b);
        assert!(matches!(moved_pick.protection, Protection::DoesntConvey { range_end: 4, .. }));
    }
}
