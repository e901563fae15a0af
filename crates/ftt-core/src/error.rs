// Typed failures surfaced by every draft and trade operation.

use rusqlite::ffi;
use thiserror::Error;

/// Errors returned by the league engine.
///
/// Every variant is reported synchronously to the caller; nothing in the
/// engine retries on its own except the scheduler's transient backoff.
#[derive(Debug, Error)]
pub enum LeagueError {
    #[error("cannot {action} {entity} in status `{status}`")]
    InvalidStateTransition {
        entity: &'static str,
        status: String,
        action: &'static str,
    },

    #[error("team {team_id} would be out of compliance: {reason}")]
    CapacityExceeded { team_id: i64, reason: String },

    #[error("team {team_id} does not hold {asset}")]
    AssetNotOwned { team_id: i64, asset: String },

    #[error("invalid pick protection: {0}")]
    ProtectionConfiguration(String),

    #[error("draft position {0} has already been picked")]
    PickAlreadyMade(i64),

    #[error("draft position {0} is not on the clock")]
    NotCurrentPosition(i64),

    #[error("player {0} is not available in this draft")]
    PlayerUnavailable(i64),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("invalid pick: {0}")]
    InvalidPick(String),

    #[error("invalid trade: {0}")]
    InvalidTrade(String),

    #[error("player {player_id} cannot be traded: {reason}")]
    PlayerNotTradeable { player_id: i64, reason: String },

    #[error("draft {0} has no players left to pick from")]
    EmptyPlayerPool(i64),

    #[error("invalid draft configuration: {0}")]
    InvalidDraftConfiguration(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("storage error: {0}")]
    Storage(rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LeagueError {
    pub(crate) fn not_found(entity: &'static str, id: i64) -> Self {
        LeagueError::NotFound { entity, id }
    }

    /// Whether retrying the same call may succeed (a lost race rather than a
    /// rule violation).
    pub fn is_retryable(&self) -> bool {
        matches!(self, LeagueError::ConcurrentModification(_))
    }
}

impl From<rusqlite::Error> for LeagueError {
    /// Only uniqueness conflicts count as a lost race. Foreign key and check
    /// failures stay storage errors.
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref failure, ref msg)
                if matches!(
                    failure.extended_code,
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                ) =>
            {
                LeagueError::ConcurrentModification(
                    msg.clone().unwrap_or_else(|| failure.to_string()),
                )
            }
            other => LeagueError::Storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, LeagueError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn unique_violation_maps_to_concurrent_modification() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, k TEXT UNIQUE);")
            .unwrap();
        conn.execute("INSERT INTO t (k) VALUES ('a')", []).unwrap();
        let err: LeagueError = conn
            .execute("INSERT INTO t (k) VALUES ('a')", [])
            .unwrap_err()
            .into();
        assert!(matches!(err, LeagueError::ConcurrentModification(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn foreign_key_and_check_failures_are_not_retryable() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (
                 id INTEGER PRIMARY KEY,
                 parent_id INTEGER REFERENCES parent(id),
                 n INTEGER CHECK (n > 0)
             );",
        )
        .unwrap();
        let fk: LeagueError = conn
            .execute("INSERT INTO child (parent_id, n) VALUES (9999, 1)", [])
            .unwrap_err()
            .into();
        assert!(matches!(fk, LeagueError::Storage(_)));
        assert!(!fk.is_retryable());

        let check: LeagueError = conn
            .execute("INSERT INTO child (parent_id, n) VALUES (NULL, 0)", [])
            .unwrap_err()
            .into();
        assert!(matches!(check, LeagueError::Storage(_)));
    }

    #[test]
    fn other_sqlite_errors_map_to_storage() {
        let conn = Connection::open_in_memory().unwrap();
        let err: LeagueError = conn.execute("SELECT * FROM missing", []).unwrap_err().into();
        assert!(matches!(err, LeagueError::Storage(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn display_includes_context() {
        let err = LeagueError::InvalidStateTransition {
            entity: "trade",
            status: "rejected".into(),
            action: "propose",
        };
        assert_eq!(err.to_string(), "cannot propose trade in status `rejected`");
    }
}
