// SQLite persistence layer for league, draft and trade state.

use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::error::Result;

/// SQLite-backed store. All engine operations go through [`Database::transaction`]
/// so that each one commits or rolls back as a unit.
pub struct Database {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        username        TEXT NOT NULL UNIQUE,
        is_commissioner INTEGER NOT NULL DEFAULT 0,
        is_admin        INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS teams (
        id       INTEGER PRIMARY KEY AUTOINCREMENT,
        name     TEXT NOT NULL,
        owner_id INTEGER NOT NULL UNIQUE REFERENCES users(id)
    );

    CREATE TABLE IF NOT EXISTS players (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        name      TEXT NOT NULL,
        real_team TEXT,
        relevance REAL NOT NULL DEFAULT 0,
        is_ir     INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS contracts (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        player_id   INTEGER UNIQUE REFERENCES players(id),
        team_id     INTEGER REFERENCES teams(id),
        start_year  INTEGER NOT NULL,
        duration    INTEGER NOT NULL,
        salary      REAL NOT NULL,
        is_rfa      INTEGER NOT NULL DEFAULT 0,
        team_option INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS drafts (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        year               INTEGER NOT NULL,
        rounds             INTEGER NOT NULL,
        starts_at          TEXT,
        time_limit_minutes INTEGER NOT NULL,
        active_hour_start  INTEGER NOT NULL,
        active_hour_end    INTEGER NOT NULL,
        is_completed       INTEGER NOT NULL DEFAULT 0,
        is_league_draft    INTEGER NOT NULL DEFAULT 0,
        created_at         TEXT NOT NULL,
        UNIQUE(year, is_league_draft)
    );

    CREATE TABLE IF NOT EXISTS draft_teams (
        draft_id INTEGER NOT NULL REFERENCES drafts(id) ON DELETE CASCADE,
        team_id  INTEGER NOT NULL REFERENCES teams(id),
        PRIMARY KEY (draft_id, team_id)
    );

    CREATE TABLE IF NOT EXISTS draft_pool (
        draft_id  INTEGER NOT NULL REFERENCES drafts(id) ON DELETE CASCADE,
        player_id INTEGER NOT NULL REFERENCES players(id),
        PRIMARY KEY (draft_id, player_id)
    );

    CREATE TABLE IF NOT EXISTS picks (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        original_team_id    INTEGER NOT NULL REFERENCES teams(id),
        current_team_id     INTEGER NOT NULL REFERENCES teams(id),
        draft_year          INTEGER NOT NULL,
        round               INTEGER NOT NULL,
        from_league_draft   INTEGER NOT NULL DEFAULT 0,
        protection_type     TEXT NOT NULL DEFAULT 'none',
        range_start         INTEGER,
        range_end           INTEGER,
        swap_target_id      INTEGER REFERENCES picks(id) ON DELETE SET NULL,
        rollover_year       INTEGER,
        actual_pick_number  INTEGER,
        is_conveyed         INTEGER NOT NULL DEFAULT 1
    );
    CREATE INDEX IF NOT EXISTS idx_picks_year_team ON picks(draft_year, current_team_id);

    CREATE TABLE IF NOT EXISTS draft_positions (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        draft_id           INTEGER NOT NULL REFERENCES drafts(id) ON DELETE CASCADE,
        pick_id            INTEGER REFERENCES picks(id),
        overall_pick       INTEGER NOT NULL,
        round              INTEGER NOT NULL,
        round_pick         INTEGER NOT NULL,
        selected_player_id INTEGER REFERENCES players(id),
        is_current         INTEGER NOT NULL DEFAULT 0,
        is_pick_made       INTEGER NOT NULL DEFAULT 0,
        is_auto_pick       INTEGER NOT NULL DEFAULT 0,
        started_at         TEXT,
        pick_made_at       TEXT,
        contract_id        INTEGER UNIQUE REFERENCES contracts(id),
        UNIQUE(draft_id, overall_pick)
    );
    CREATE UNIQUE INDEX IF NOT EXISTS one_current_position_per_draft
        ON draft_positions(draft_id) WHERE is_current = 1;

    CREATE TABLE IF NOT EXISTS draft_queues (
        draft_id         INTEGER NOT NULL REFERENCES drafts(id) ON DELETE CASCADE,
        team_id          INTEGER NOT NULL REFERENCES teams(id),
        autopick_enabled INTEGER NOT NULL DEFAULT 1,
        player_ids       TEXT NOT NULL DEFAULT '[]',
        updated_at       TEXT NOT NULL,
        PRIMARY KEY (draft_id, team_id)
    );

    CREATE TABLE IF NOT EXISTS trades (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        sender_team_id INTEGER NOT NULL REFERENCES teams(id),
        parent_id      INTEGER REFERENCES trades(id),
        status         TEXT NOT NULL DEFAULT 'draft',
        is_latest      INTEGER NOT NULL DEFAULT 1,
        notes          TEXT NOT NULL DEFAULT '',
        created_at     TEXT NOT NULL,
        proposed_at    TEXT,
        approved_at    TEXT,
        approved_by    INTEGER REFERENCES users(id),
        completed_at   TEXT,
        closed_at      TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_trades_status ON trades(status);

    CREATE TABLE IF NOT EXISTS trade_participants (
        trade_id INTEGER NOT NULL REFERENCES trades(id) ON DELETE CASCADE,
        team_id  INTEGER NOT NULL REFERENCES teams(id),
        PRIMARY KEY (trade_id, team_id)
    );

    CREATE TABLE IF NOT EXISTS trade_assets (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        trade_id            INTEGER NOT NULL REFERENCES trades(id) ON DELETE CASCADE,
        sender_team_id      INTEGER NOT NULL REFERENCES teams(id),
        receiver_team_id    INTEGER NOT NULL REFERENCES teams(id),
        contract_id         INTEGER REFERENCES contracts(id),
        pick_id             INTEGER REFERENCES picks(id),
        override_type       TEXT,
        override_start      INTEGER,
        override_end        INTEGER,
        override_target_id  INTEGER REFERENCES picks(id),
        override_rollover   INTEGER,
        CHECK ((contract_id IS NULL) != (pick_id IS NULL))
    );

    CREATE TABLE IF NOT EXISTS trade_responses (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        trade_id     INTEGER NOT NULL REFERENCES trades(id) ON DELETE CASCADE,
        team_id      INTEGER NOT NULL REFERENCES teams(id),
        status       TEXT NOT NULL DEFAULT 'pending',
        message      TEXT NOT NULL DEFAULT '',
        responded_at TEXT,
        UNIQUE(trade_id, team_id)
    );

    CREATE TABLE IF NOT EXISTS trade_votes (
        trade_id        INTEGER NOT NULL REFERENCES trades(id) ON DELETE CASCADE,
        commissioner_id INTEGER NOT NULL REFERENCES users(id),
        vote            TEXT NOT NULL,
        notes           TEXT NOT NULL DEFAULT '',
        voted_at        TEXT NOT NULL,
        UNIQUE(trade_id, commissioner_id)
    );

    CREATE TABLE IF NOT EXISTS notifications (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id      INTEGER NOT NULL REFERENCES users(id),
        message      TEXT NOT NULL,
        level        TEXT NOT NULL,
        redirect_to  TEXT,
        created_at   TEXT NOT NULL,
        attempts     INTEGER NOT NULL DEFAULT 0,
        delivered_at TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_notifications_pending
        ON notifications(delivered_at) WHERE delivered_at IS NULL;
";

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Convenience for tests and tools.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock).
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Run `f` inside an immediate transaction. Commits on `Ok`, rolls back
    /// on `Err` (the transaction is dropped without commit).
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run a read-only closure against the connection.
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn();
        f(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LeagueError;

    fn table_names(db: &Database) -> Vec<String> {
        db.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master WHERE type='table' ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .unwrap()
    }

    #[test]
    fn open_creates_tables() {
        let db = Database::open_in_memory().unwrap();
        let names = table_names(&db);
        for expected in [
            "contracts",
            "draft_positions",
            "draft_queues",
            "drafts",
            "notifications",
            "picks",
            "players",
            "teams",
            "trade_assets",
            "trade_votes",
            "trades",
            "users",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing table {expected}");
        }
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<()> = db.transaction(|tx| {
            tx.execute("INSERT INTO users (username) VALUES ('ghost')", [])?;
            Err(LeagueError::InvalidTrade("boom".into()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn foreign_keys_enforced() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .transaction(|tx| {
                tx.execute("INSERT INTO teams (name, owner_id) VALUES ('x', 999)", [])?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, LeagueError::ConcurrentModification(_)));
    }

    #[test]
    fn only_one_current_position_per_draft() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .transaction(|tx| {
                tx.execute_batch(
                    "INSERT INTO drafts (year, rounds, time_limit_minutes, active_hour_start,
                                         active_hour_end, created_at)
                     VALUES (2025, 1, 60, 8, 22, '2025-01-01T00:00:00Z');
                     INSERT INTO draft_positions (draft_id, overall_pick, round, round_pick, is_current)
                     VALUES (1, 1, 1, 1, 1);
                     INSERT INTO draft_positions (draft_id, overall_pick, round, round_pick, is_current)
                     VALUES (1, 2, 1, 2, 1);",
                )?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, LeagueError::ConcurrentModification(_)));
    }
}
