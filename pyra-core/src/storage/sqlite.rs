//! SQLite-backed session store.
//!
//! Two tables, `sessions` and `waves`, with `waves.session_id` cascading on
//! session deletion. Timestamps are RFC3339 text; status columns hold the
//! canonical lowercase strings. A single connection behind a mutex is
//! plenty for this write rate, and keeps transactions trivially serialized.

use crate::core::{EngineError, Result, SessionStatus, WaveStatus};
use crate::storage::{FillDelta, SessionFilter, SessionRecord, SessionStore, StateDelta};
use crate::strategy::pyramid::{AdjustRequest, Wave};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;
use tracing::info;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id               INTEGER PRIMARY KEY,
    strategy_type    TEXT    NOT NULL DEFAULT 'pyramid',
    symbol           TEXT    NOT NULL,
    entry_price      REAL    NOT NULL,
    distance_pct     REAL    NOT NULL,
    max_waves        INTEGER NOT NULL,
    isolated_fund    REAL    NOT NULL,
    tp_pct           REAL    NOT NULL,
    timeout_x_min    REAL    NOT NULL,
    gap_y_min        REAL    NOT NULL,
    status           TEXT    NOT NULL,
    current_wave     INTEGER NOT NULL DEFAULT 0,
    avg_price        REAL    NOT NULL DEFAULT 0,
    total_filled_qty REAL    NOT NULL DEFAULT 0,
    total_cost       REAL    NOT NULL DEFAULT 0,
    created_at       TEXT    NOT NULL,
    started_at       TEXT,
    last_fill_at     TEXT,
    completed_at     TEXT,
    created_by       TEXT,
    note             TEXT
);
CREATE INDEX IF NOT EXISTS ix_sessions_symbol ON sessions(symbol);
CREATE INDEX IF NOT EXISTS ix_sessions_status ON sessions(status);
CREATE INDEX IF NOT EXISTS ix_sessions_created_at ON sessions(created_at);

CREATE TABLE IF NOT EXISTS waves (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id       INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    wave_num         INTEGER NOT NULL,
    quantity         REAL    NOT NULL,
    target_price     REAL    NOT NULL,
    status           TEXT    NOT NULL,
    filled_qty       REAL,
    filled_price     REAL,
    filled_at        TEXT,
    sent_at          TEXT,
    created_at       TEXT    NOT NULL,
    pending_order_id INTEGER
);
CREATE INDEX IF NOT EXISTS ix_waves_session_id ON waves(session_id);
CREATE INDEX IF NOT EXISTS ix_waves_status ON waves(status);
CREATE INDEX IF NOT EXISTS ix_waves_pending_order_id ON waves(pending_order_id);
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(Duration::from_millis(5_000))?;
        // WAL for write concurrency with dashboard readers.
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        info!("session store ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

// ----------------------------------------------------------------------
// Row codecs
// ----------------------------------------------------------------------

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}

fn opt_ts(t: Option<DateTime<Utc>>) -> Option<String> {
    t.map(ts)
}

fn decode_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn decode_opt_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|raw| decode_ts(idx, raw)).transpose()
}

fn decode_session_status(idx: usize, raw: String) -> rusqlite::Result<SessionStatus> {
    raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

fn decode_wave_status(idx: usize, raw: String) -> rusqlite::Result<WaveStatus> {
    raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

const SESSION_COLUMNS: &str = "id, symbol, entry_price, distance_pct, max_waves, isolated_fund, \
     tp_pct, timeout_x_min, gap_y_min, status, current_wave, avg_price, total_filled_qty, \
     total_cost, created_at, started_at, last_fill_at, completed_at, created_by, note";

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        symbol: row.get(1)?,
        entry_price: row.get(2)?,
        distance_pct: row.get(3)?,
        max_waves: row.get(4)?,
        isolated_fund: row.get(5)?,
        tp_pct: row.get(6)?,
        timeout_x_min: row.get(7)?,
        gap_y_min: row.get(8)?,
        status: decode_session_status(9, row.get(9)?)?,
        current_wave: row.get(10)?,
        avg_price: row.get(11)?,
        total_filled_qty: row.get(12)?,
        total_cost: row.get(13)?,
        created_at: decode_ts(14, row.get(14)?)?,
        started_at: decode_opt_ts(15, row.get(15)?)?,
        last_fill_at: decode_opt_ts(16, row.get(16)?)?,
        completed_at: decode_opt_ts(17, row.get(17)?)?,
        created_by: row.get(18)?,
        note: row.get(19)?,
        waves: Vec::new(),
    })
}

const WAVE_COLUMNS: &str = "id, session_id, wave_num, quantity, target_price, status, \
     filled_qty, filled_price, filled_at, sent_at, created_at, pending_order_id";

fn row_to_wave(row: &Row<'_>) -> rusqlite::Result<(i64, Wave)> {
    let session_id: i64 = row.get(1)?;
    let wave = Wave {
        id: Some(row.get(0)?),
        wave_num: row.get(2)?,
        quantity: row.get(3)?,
        target_price: row.get(4)?,
        status: decode_wave_status(5, row.get(5)?)?,
        filled_qty: row.get(6)?,
        filled_price: row.get(7)?,
        filled_at: decode_opt_ts(8, row.get(8)?)?,
        sent_at: decode_opt_ts(9, row.get(9)?)?,
        created_at: decode_ts(10, row.get(10)?)?,
        pending_order_id: row.get(11)?,
    };
    Ok((session_id, wave))
}

fn insert_wave_tx(conn: &Connection, session_id: i64, wave: &Wave) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO waves (session_id, wave_num, quantity, target_price, status, filled_qty, \
         filled_price, filled_at, sent_at, created_at, pending_order_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            session_id,
            wave.wave_num,
            wave.quantity,
            wave.target_price,
            wave.status.as_str(),
            wave.filled_qty,
            wave.filled_price,
            opt_ts(wave.filled_at),
            opt_ts(wave.sent_at),
            ts(wave.created_at),
            wave.pending_order_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn update_state_tx(conn: &Connection, session_id: i64, state: &StateDelta) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE sessions SET current_wave = ?2, avg_price = ?3, total_filled_qty = ?4, \
         total_cost = ?5, last_fill_at = COALESCE(?6, last_fill_at) WHERE id = ?1",
        params![
            session_id,
            state.current_wave,
            state.avg_price,
            state.total_filled_qty,
            state.total_cost,
            opt_ts(state.last_fill_at),
        ],
    )?;
    Ok(())
}

fn update_status_tx(
    conn: &Connection,
    session_id: i64,
    status: SessionStatus,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE sessions SET status = ?2, started_at = COALESCE(?3, started_at), \
         completed_at = COALESCE(?4, completed_at) WHERE id = ?1",
        params![
            session_id,
            status.as_str(),
            opt_ts(started_at),
            opt_ts(completed_at)
        ],
    )?;
    Ok(())
}

// ----------------------------------------------------------------------
// SessionStore impl
// ----------------------------------------------------------------------

impl SessionStore for SqliteStore {
    fn insert_session(&self, record: &SessionRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (id, strategy_type, symbol, entry_price, distance_pct, \
             max_waves, isolated_fund, tp_pct, timeout_x_min, gap_y_min, status, current_wave, \
             avg_price, total_filled_qty, total_cost, created_at, started_at, last_fill_at, \
             completed_at, created_by, note) \
             VALUES (?1, 'pyramid', ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, \
             ?15, ?16, ?17, ?18, ?19, ?20)",
            params![
                record.id,
                record.symbol,
                record.entry_price,
                record.distance_pct,
                record.max_waves,
                record.isolated_fund,
                record.tp_pct,
                record.timeout_x_min,
                record.gap_y_min,
                record.status.as_str(),
                record.current_wave,
                record.avg_price,
                record.total_filled_qty,
                record.total_cost,
                ts(record.created_at),
                opt_ts(record.started_at),
                opt_ts(record.last_fill_at),
                opt_ts(record.completed_at),
                record.created_by,
                record.note,
            ],
        )?;
        Ok(())
    }

    fn update_session_status(
        &self,
        session_id: i64,
        status: SessionStatus,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        update_status_tx(&conn, session_id, status, started_at, completed_at)?;
        Ok(())
    }

    fn update_session_state(&self, session_id: i64, state: &StateDelta) -> Result<()> {
        let conn = self.conn.lock();
        update_state_tx(&conn, session_id, state)?;
        Ok(())
    }

    fn update_session_params(&self, session_id: i64, applied: &AdjustRequest) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE sessions SET max_waves = COALESCE(?2, max_waves), \
             isolated_fund = COALESCE(?3, isolated_fund), tp_pct = COALESCE(?4, tp_pct), \
             distance_pct = COALESCE(?5, distance_pct), \
             timeout_x_min = COALESCE(?6, timeout_x_min), gap_y_min = COALESCE(?7, gap_y_min) \
             WHERE id = ?1",
            params![
                session_id,
                applied.max_waves,
                applied.isolated_fund,
                applied.tp_pct,
                applied.distance_pct,
                applied.timeout_x_min,
                applied.gap_y_min,
            ],
        )?;
        Ok(())
    }

    fn delete_session(&self, session_id: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        Ok(())
    }

    fn insert_wave(&self, session_id: i64, wave: &Wave) -> Result<i64> {
        let conn = self.conn.lock();
        Ok(insert_wave_tx(&conn, session_id, wave)?)
    }

    fn mark_wave_sent(
        &self,
        wave_id: i64,
        pending_order_id: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE waves SET status = 'sent', pending_order_id = ?2, sent_at = ?3 WHERE id = ?1",
            params![wave_id, pending_order_id, ts(sent_at)],
        )?;
        Ok(())
    }

    fn mark_wave_filled(
        &self,
        wave_id: i64,
        filled_qty: f64,
        filled_price: f64,
        filled_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE waves SET status = 'filled', filled_qty = ?2, filled_price = ?3, \
             filled_at = ?4 WHERE id = ?1",
            params![wave_id, filled_qty, filled_price, ts(filled_at)],
        )?;
        Ok(())
    }

    fn mark_wave_cancelled(&self, wave_id: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE waves SET status = 'cancelled' WHERE id = ?1",
            params![wave_id],
        )?;
        Ok(())
    }

    fn get_wave_by_pending_order_id(&self, pending_order_id: i64) -> Result<Option<(i64, Wave)>> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                &format!("SELECT {WAVE_COLUMNS} FROM waves WHERE pending_order_id = ?1"),
                params![pending_order_id],
                row_to_wave,
            )
            .optional()?;
        Ok(found)
    }

    fn list_waves_for_session(&self, session_id: i64) -> Result<Vec<Wave>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {WAVE_COLUMNS} FROM waves WHERE session_id = ?1 ORDER BY wave_num"
        ))?;
        let waves = stmt
            .query_map(params![session_id], row_to_wave)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(waves.into_iter().map(|(_, wave)| wave).collect())
    }

    fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<SessionRecord>> {
        let conn = self.conn.lock();
        let mut sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE 1=1");
        let status = filter.status.map(|s| s.as_str());
        let mut args: Vec<&dyn rusqlite::ToSql> = Vec::new();
        if let Some(ref status) = status {
            sql.push_str(" AND status = ?");
            args.push(status);
        }
        if let Some(ref symbol) = filter.symbol {
            sql.push_str(" AND symbol = ?");
            args.push(symbol);
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");
        if let Some(ref limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            args.push(limit);
        }

        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(args.as_slice(), row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn load_all(&self) -> Result<Vec<SessionRecord>> {
        let mut records = self.list_sessions(&SessionFilter::default())?;
        for record in &mut records {
            record.waves = self.list_waves_for_session(record.id)?;
        }
        Ok(records)
    }

    fn max_session_id(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let max: i64 = conn.query_row("SELECT COALESCE(MAX(id), 0) FROM sessions", [], |row| {
            row.get(0)
        })?;
        Ok(max)
    }

    fn record_session_started(
        &self,
        session_id: i64,
        started_at: DateTime<Utc>,
        wave: &Wave,
    ) -> Result<i64> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        update_status_tx(&tx, session_id, SessionStatus::Active, Some(started_at), None)?;
        let wave_id = insert_wave_tx(&tx, session_id, wave)?;
        tx.commit()?;
        Ok(wave_id)
    }

    fn record_fill(&self, session_id: i64, delta: &FillDelta) -> Result<Option<i64>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        update_state_tx(&tx, session_id, &delta.state)?;

        if let Some(wave_id) = delta.filled_wave_id {
            let filled_at = delta.filled_at.ok_or_else(|| {
                EngineError::Corrupt(format!("fill for wave row {wave_id} without a timestamp"))
            })?;
            tx.execute(
                "UPDATE waves SET status = 'filled', filled_qty = ?2, filled_price = ?3, \
                 filled_at = ?4 WHERE id = ?1",
                params![wave_id, delta.filled_qty, delta.filled_price, ts(filled_at)],
            )?;
        }

        let new_wave_id = match &delta.new_wave {
            Some(wave) => Some(insert_wave_tx(&tx, session_id, wave)?),
            None => None,
        };

        if let Some(status) = delta.new_status {
            update_status_tx(&tx, session_id, status, None, delta.completed_at)?;
        }

        tx.commit()?;
        Ok(new_wave_id)
    }
}
