//! SQLite position cache.
//!
//! Holds at most one snapshot. Positions are stored as change points (the
//! first day of each holding and every day its share count changes) and are
//! forward-filled on load.

use crate::domain::calendar::Calendar;
use crate::domain::error::DepotError;
use crate::domain::position::{HoldingKey, PositionSeries};
use crate::domain::snapshot::SnapshotId;
use crate::ports::cache_port::SeriesCachePort;
use chrono::NaiveDate;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

pub struct SqliteCacheAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_err(e: r2d2::Error) -> DepotError {
    DepotError::Cache {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> DepotError {
    DepotError::Cache {
        reason: e.to_string(),
    }
}

impl SqliteCacheAdapter {
    pub fn open(path: &Path) -> Result<Self, DepotError> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(2).build(manager).map_err(pool_err)?;
        let adapter = Self { pool };
        adapter.initialize_schema()?;
        debug!(path = %path.display(), "position cache opened");
        Ok(adapter)
    }

    pub fn in_memory() -> Result<Self, DepotError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(pool_err)?;
        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    pub fn initialize_schema(&self) -> Result<(), DepotError> {
        let conn = self.pool.get().map_err(pool_err)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache_snapshot (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                snapshot TEXT NOT NULL,
                start_date TEXT NOT NULL,
                days INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS cached_positions (
                wkn TEXT NOT NULL,
                bank TEXT NOT NULL,
                day INTEGER NOT NULL,
                shares REAL NOT NULL,
                PRIMARY KEY (wkn, bank, day)
            );",
        )
        .map_err(query_err)?;
        Ok(())
    }

    /// Number of stored change points.
    pub fn row_count(&self) -> Result<usize, DepotError> {
        let conn = self.pool.get().map_err(pool_err)?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM cached_positions", [], |row| row.get(0))
            .map_err(query_err)?;
        Ok(n as usize)
    }
}

impl SeriesCachePort for SqliteCacheAdapter {
    fn load_positions(&self, snapshot: &SnapshotId) -> Result<Option<PositionSeries>, DepotError> {
        let conn = self.pool.get().map_err(pool_err)?;

        let header: Option<(String, String, i64)> = conn
            .query_row(
                "SELECT snapshot, start_date, days FROM cache_snapshot WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(query_err)?;

        let Some((stored, start_str, days)) = header else {
            debug!("position cache empty");
            return Ok(None);
        };
        let stored = SnapshotId::from_hex(stored);
        if &stored != snapshot {
            info!(%stored, current = %snapshot, "position cache is stale");
            return Ok(None);
        }
        if days <= 0 {
            return Ok(None);
        }

        let start = NaiveDate::parse_from_str(&start_str, "%Y-%m-%d").map_err(|e| {
            DepotError::Cache {
                reason: format!("invalid cached start date '{}': {}", start_str, e),
            }
        })?;
        let calendar = Calendar::new(start, start + chrono::Duration::days(days - 1))?;

        let mut stmt = conn
            .prepare(
                "SELECT wkn, bank, day, shares FROM cached_positions
                 ORDER BY wkn, bank, day",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })
            .map_err(query_err)?;

        let mut shares: BTreeMap<HoldingKey, Vec<f64>> = BTreeMap::new();
        for row in rows {
            let (wkn, bank, day, value) = row.map_err(query_err)?;
            let series = shares
                .entry(HoldingKey { wkn, bank })
                .or_insert_with(|| vec![0.0; calendar.len()]);
            let from = (day.max(0) as usize).min(calendar.len());
            for slot in &mut series[from..] {
                *slot = value;
            }
        }

        Ok(Some(PositionSeries::from_parts(calendar, shares)))
    }

    fn store_positions(
        &self,
        snapshot: &SnapshotId,
        positions: &PositionSeries,
    ) -> Result<(), DepotError> {
        let mut conn = self.pool.get().map_err(pool_err)?;
        let tx = conn.transaction().map_err(query_err)?;

        tx.execute("DELETE FROM cached_positions", [])
            .map_err(query_err)?;
        tx.execute("DELETE FROM cache_snapshot", [])
            .map_err(query_err)?;

        let calendar = positions.calendar();
        tx.execute(
            "INSERT INTO cache_snapshot (id, snapshot, start_date, days) VALUES (1, ?1, ?2, ?3)",
            params![
                snapshot.as_str(),
                calendar.start().format("%Y-%m-%d").to_string(),
                calendar.len() as i64
            ],
        )
        .map_err(query_err)?;

        let mut points = 0usize;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO cached_positions (wkn, bank, day, shares) VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(query_err)?;
            for (key, series) in positions.iter() {
                for (day, value) in series.iter().enumerate() {
                    if day == 0 || series[day - 1] != *value {
                        stmt.execute(params![key.wkn, key.bank, day as i64, value])
                            .map_err(query_err)?;
                        points += 1;
                    }
                }
            }
        }

        tx.commit().map_err(query_err)?;
        debug!(%snapshot, points, "positions cached");
        Ok(())
    }

    fn invalidate(&self) -> Result<(), DepotError> {
        let conn = self.pool.get().map_err(pool_err)?;
        conn.execute_batch("DELETE FROM cached_positions; DELETE FROM cache_snapshot;")
            .map_err(query_err)?;
        info!("position cache cleared");
        Ok(())
    }
}
