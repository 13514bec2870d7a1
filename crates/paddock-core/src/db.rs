// SQLite persistence layer for the local draft server.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::draft::order::{BaseOrder, DraftMethod, DraftOrderEntry};
use crate::draft::pick::{DraftPick, Driver, DriverId, TeamId};
use crate::protocol::DraftKey;

/// A stored draft order together with the parameters it was generated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOrder {
    pub method: DraftMethod,
    pub snake_base: BaseOrder,
    pub entries: Vec<DraftOrderEntry>,
}

/// A pick ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPick {
    pub round: u32,
    pub pick_number: u32,
    pub team_id: TeamId,
    pub driver_id: DriverId,
    pub is_auto_pick: bool,
}

/// Result of trying to record a pick.
#[derive(Debug, Clone, PartialEq)]
pub enum PickInsert {
    Inserted(DraftPick),
    /// A pick already holds this pick number.
    SlotTaken,
    /// The driver was already picked in this draft.
    DriverTaken,
}

/// SQLite-backed persistence for drivers, draft orders, and picks, scoped by
/// (league, race).
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS drivers (
                league_id     INTEGER NOT NULL,
                race_id       INTEGER NOT NULL,
                driver_id     INTEGER NOT NULL,
                number        INTEGER,
                name          TEXT NOT NULL,
                constructor   TEXT NOT NULL,
                season_points REAL NOT NULL DEFAULT 0,
                PRIMARY KEY (league_id, race_id, driver_id)
            );

            CREATE TABLE IF NOT EXISTS draft_order_meta (
                league_id  INTEGER NOT NULL,
                race_id    INTEGER NOT NULL,
                method     TEXT NOT NULL,
                snake_base TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (league_id, race_id)
            );

            CREATE TABLE IF NOT EXISTS draft_orders (
                league_id             INTEGER NOT NULL,
                race_id               INTEGER NOT NULL,
                draft_position_number INTEGER NOT NULL,
                team_id               INTEGER NOT NULL,
                team_name             TEXT NOT NULL,
                PRIMARY KEY (league_id, race_id, draft_position_number),
                UNIQUE (league_id, race_id, team_id),
                FOREIGN KEY (league_id, race_id)
                    REFERENCES draft_order_meta(league_id, race_id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS draft_picks (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                league_id    INTEGER NOT NULL,
                race_id      INTEGER NOT NULL,
                pick_number  INTEGER NOT NULL,
                round        INTEGER NOT NULL,
                team_id      INTEGER NOT NULL,
                driver_id    INTEGER NOT NULL,
                is_auto_pick INTEGER NOT NULL DEFAULT 0,
                created_at   TEXT NOT NULL,
                UNIQUE (league_id, race_id, pick_number),
                UNIQUE (league_id, race_id, driver_id),
                FOREIGN KEY (league_id, race_id, driver_id)
                    REFERENCES drivers(league_id, race_id, driver_id)
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock).
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    // ------------------------------------------------------------------
    // Drivers
    // ------------------------------------------------------------------

    /// Insert or update drivers for a race in a single transaction.
    pub fn upsert_drivers(&self, key: DraftKey, drivers: &[Driver]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin driver import")?;
        for d in drivers {
            tx.execute(
                "INSERT INTO drivers
                    (league_id, race_id, driver_id, number, name, constructor, season_points)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(league_id, race_id, driver_id) DO UPDATE SET
                    number        = excluded.number,
                    name          = excluded.name,
                    constructor   = excluded.constructor,
                    season_points = excluded.season_points",
                params![
                    key.league_id,
                    key.race_id,
                    d.id,
                    d.number,
                    d.name,
                    d.constructor,
                    d.season_points
                ],
            )
            .with_context(|| format!("failed to upsert driver {}", d.id))?;
        }
        tx.commit().context("failed to commit driver import")?;
        Ok(drivers.len())
    }

    /// Every driver entered for the race, best season first.
    pub fn load_drivers(&self, key: DraftKey) -> Result<Vec<Driver>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT driver_id, number, name, constructor, season_points
                 FROM drivers WHERE league_id = ?1 AND race_id = ?2
                 ORDER BY season_points DESC, driver_id",
            )
            .context("failed to prepare load_drivers query")?;
        let drivers = stmt
            .query_map(params![key.league_id, key.race_id], driver_from_row)
            .context("failed to query drivers")?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read driver row")?;
        Ok(drivers)
    }

    /// Drivers nobody has picked yet in this draft.
    pub fn available_drivers(&self, key: DraftKey) -> Result<Vec<Driver>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT d.driver_id, d.number, d.name, d.constructor, d.season_points
                 FROM drivers d
                 WHERE d.league_id = ?1 AND d.race_id = ?2
                   AND NOT EXISTS (
                       SELECT 1 FROM draft_picks p
                       WHERE p.league_id = d.league_id AND p.race_id = d.race_id
                         AND p.driver_id = d.driver_id)
                 ORDER BY d.season_points DESC, d.driver_id",
            )
            .context("failed to prepare available_drivers query")?;
        let drivers = stmt
            .query_map(params![key.league_id, key.race_id], driver_from_row)
            .context("failed to query available drivers")?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read driver row")?;
        Ok(drivers)
    }

    // ------------------------------------------------------------------
    // Draft order
    // ------------------------------------------------------------------

    /// Store a freshly generated order. Returns `false` without writing
    /// anything when an order already exists for `key`.
    pub fn insert_order(
        &self,
        key: DraftKey,
        method: DraftMethod,
        snake_base: BaseOrder,
        entries: &[DraftOrderEntry],
    ) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin order insert")?;
        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO draft_order_meta
                    (league_id, race_id, method, snake_base, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    key.league_id,
                    key.race_id,
                    method.as_str(),
                    snake_base.as_str(),
                    Utc::now().to_rfc3339()
                ],
            )
            .context("failed to insert draft order meta")?;
        if inserted == 0 {
            return Ok(false);
        }
        insert_entries(&tx, key, entries)?;
        tx.commit().context("failed to commit draft order")?;
        Ok(true)
    }

    /// Overwrite the stored order. Callers must ensure no picks exist.
    pub fn replace_order(
        &self,
        key: DraftKey,
        method: DraftMethod,
        snake_base: BaseOrder,
        entries: &[DraftOrderEntry],
    ) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin order replace")?;
        tx.execute(
            "DELETE FROM draft_order_meta WHERE league_id = ?1 AND race_id = ?2",
            params![key.league_id, key.race_id],
        )
        .context("failed to delete previous draft order")?;
        tx.execute(
            "INSERT INTO draft_order_meta (league_id, race_id, method, snake_base, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                key.league_id,
                key.race_id,
                method.as_str(),
                snake_base.as_str(),
                Utc::now().to_rfc3339()
            ],
        )
        .context("failed to insert draft order meta")?;
        insert_entries(&tx, key, entries)?;
        tx.commit().context("failed to commit draft order")?;
        Ok(())
    }

    pub fn load_order(&self, key: DraftKey) -> Result<Option<StoredOrder>> {
        let conn = self.conn();
        let meta: Option<(String, String)> = conn
            .query_row(
                "SELECT method, snake_base FROM draft_order_meta
                 WHERE league_id = ?1 AND race_id = ?2",
                params![key.league_id, key.race_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("failed to load draft order meta")?;
        let Some((method_tag, base_tag)) = meta else {
            return Ok(None);
        };

        let method = DraftMethod::from_tag(&method_tag)
            .with_context(|| format!("unknown draft method {method_tag:?} in database"))?;
        let snake_base = BaseOrder::from_tag(&base_tag)
            .with_context(|| format!("unknown base order {base_tag:?} in database"))?;

        let mut stmt = conn
            .prepare(
                "SELECT draft_position_number, team_id, team_name FROM draft_orders
                 WHERE league_id = ?1 AND race_id = ?2 ORDER BY draft_position_number",
            )
            .context("failed to prepare load_order query")?;
        let entries = stmt
            .query_map(params![key.league_id, key.race_id], |row| {
                Ok(DraftOrderEntry {
                    draft_position_number: row.get(0)?,
                    team_id: row.get(1)?,
                    team_name: row.get(2)?,
                })
            })
            .context("failed to query draft order")?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read draft order row")?;

        Ok(Some(StoredOrder {
            method,
            snake_base,
            entries,
        }))
    }

    // ------------------------------------------------------------------
    // Picks
    // ------------------------------------------------------------------

    /// Record a pick. The slot and the driver are each unique per draft;
    /// a pick violating either is reported, not written.
    pub fn insert_pick(&self, key: DraftKey, pick: &NewPick) -> Result<PickInsert> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin pick insert")?;

        let slot_taken: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM draft_picks
                 WHERE league_id = ?1 AND race_id = ?2 AND pick_number = ?3)",
                params![key.league_id, key.race_id, pick.pick_number],
                |row| row.get(0),
            )
            .context("failed to check pick slot")?;
        if slot_taken {
            return Ok(PickInsert::SlotTaken);
        }

        let driver_taken: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM draft_picks
                 WHERE league_id = ?1 AND race_id = ?2 AND driver_id = ?3)",
                params![key.league_id, key.race_id, pick.driver_id],
                |row| row.get(0),
            )
            .context("failed to check driver")?;
        if driver_taken {
            return Ok(PickInsert::DriverTaken);
        }

        let created_at = Utc::now();
        tx.execute(
            "INSERT INTO draft_picks
                (league_id, race_id, pick_number, round, team_id, driver_id,
                 is_auto_pick, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                key.league_id,
                key.race_id,
                pick.pick_number,
                pick.round,
                pick.team_id,
                pick.driver_id,
                pick.is_auto_pick,
                created_at.to_rfc3339()
            ],
        )
        .with_context(|| format!("failed to record pick #{}", pick.pick_number))?;
        let id = tx.last_insert_rowid();
        tx.commit().context("failed to commit pick")?;

        Ok(PickInsert::Inserted(DraftPick {
            id,
            round: pick.round,
            pick_number: pick.pick_number,
            team_id: pick.team_id,
            driver_id: pick.driver_id,
            is_auto_pick: pick.is_auto_pick,
            created_at,
        }))
    }

    /// Picks with `pick_number > since` (all when `None`), in pick order.
    pub fn load_picks(&self, key: DraftKey, since: Option<u32>) -> Result<Vec<DraftPick>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, round, pick_number, team_id, driver_id, is_auto_pick, created_at
                 FROM draft_picks
                 WHERE league_id = ?1 AND race_id = ?2 AND pick_number > ?3
                 ORDER BY pick_number",
            )
            .context("failed to prepare load_picks query")?;
        let picks = stmt
            .query_map(
                params![key.league_id, key.race_id, since.unwrap_or(0)],
                pick_from_row,
            )
            .context("failed to query picks")?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read pick row")?;
        Ok(picks)
    }

    pub fn pick_count(&self, key: DraftKey) -> Result<u32> {
        let conn = self.conn();
        let count: u32 = conn
            .query_row(
                "SELECT COUNT(*) FROM draft_picks WHERE league_id = ?1 AND race_id = ?2",
                params![key.league_id, key.race_id],
                |row| row.get(0),
            )
            .context("failed to count picks")?;
        Ok(count)
    }
}

fn insert_entries(
    tx: &rusqlite::Transaction<'_>,
    key: DraftKey,
    entries: &[DraftOrderEntry],
) -> Result<()> {
    for e in entries {
        tx.execute(
            "INSERT INTO draft_orders
                (league_id, race_id, draft_position_number, team_id, team_name)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                key.league_id,
                key.race_id,
                e.draft_position_number,
                e.team_id,
                e.team_name
            ],
        )
        .with_context(|| format!("failed to insert order position {}", e.draft_position_number))?;
    }
    Ok(())
}

fn driver_from_row(row: &Row<'_>) -> rusqlite::Result<Driver> {
    Ok(Driver {
        id: row.get(0)?,
        number: row.get(1)?,
        name: row.get(2)?,
        constructor: row.get(3)?,
        season_points: row.get(4)?,
    })
}

fn pick_from_row(row: &Row<'_>) -> rusqlite::Result<DraftPick> {
    let created: String = row.get(6)?;
    let created_at = DateTime::parse_from_rfc3339(&created)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?
        .with_timezone(&Utc);
    Ok(DraftPick {
        id: row.get(0)?,
        round: row.get(1)?,
        pick_number: row.get(2)?,
        team_id: row.get(3)?,
        driver_id: row.get(4)?,
        is_auto_pick: row.get(5)?,
        created_at,
    })
}
