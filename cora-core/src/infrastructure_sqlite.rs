//! SQLite-backed ScheduleStore implementation.
//! Keeps the timetable and all bookings in a single database file.
//!
//! Enable with the `sqlite` feature flag:
//! ```toml
//! cora-core = { path = "../cora-core", features = ["sqlite"] }
//! ```

use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, InterruptHandle, Row};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{ScheduleError, ScheduleResult};
use crate::infrastructure::{ScheduleStore, SeedableStore};
use crate::types::*;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS slots (
        id         INTEGER PRIMARY KEY,
        start_time TEXT NOT NULL,
        end_time   TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS subjects (
        id   TEXT PRIMARY KEY,
        name TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS template_entries (
        room       TEXT NOT NULL,
        weekday    TEXT NOT NULL CHECK (weekday IN ('MON', 'TUE', 'WED', 'THU', 'FRI')),
        slot       INTEGER NOT NULL,
        subject    TEXT NOT NULL,
        instructor TEXT NOT NULL,
        PRIMARY KEY (room, weekday, slot)
    );
    CREATE INDEX IF NOT EXISTS idx_template_slot ON template_entries(weekday, slot);

    CREATE TABLE IF NOT EXISTS override_entries (
        room       TEXT NOT NULL,
        date       TEXT NOT NULL,
        slot       INTEGER NOT NULL,
        instructor TEXT NOT NULL,
        subject    TEXT NOT NULL,
        PRIMARY KEY (room, date, slot)
    );
    CREATE INDEX IF NOT EXISTS idx_override_slot ON override_entries(date, slot);
    CREATE INDEX IF NOT EXISTS idx_override_instructor ON override_entries(instructor);
";

// The freedom predicate and the insert run as one statement; the primary key
// turns a lost race into zero affected rows instead of an error.
const INSERT_IF_FREE: &str = "
    INSERT INTO override_entries (room, date, slot, instructor, subject)
    SELECT ?1, ?2, ?3, ?4, ?5
    WHERE EXISTS (
        SELECT 1 FROM template_entries
        WHERE room = ?1 AND weekday = ?6 AND slot = ?3 AND subject = 'FREE'
    )
    ON CONFLICT (room, date, slot) DO NOTHING";

const TEMPLATE_COLUMNS: &str = "room, weekday, slot, subject, instructor";
const OVERRIDE_COLUMNS: &str = "room, date, slot, instructor, subject";

impl ToSql for Weekday {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for Weekday {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Weekday::from_code(value.as_str()?).ok_or(FromSqlError::InvalidType)
    }
}

/// A persistent timetable store backed by SQLite.
///
/// Uses WAL mode for file databases so readers do not block the writer.
/// Several handles may open the same file; the conditional insert stays
/// correct across them because SQLite serialises writers.
pub struct SqliteScheduleStore {
    conn: Mutex<Connection>,
    interrupt_handle: InterruptHandle,
}

impl SqliteScheduleStore {
    /// Open (or create) a SQLite database at the given path.
    ///
    /// `busy_timeout` bounds how long a call waits for another writer's lock
    /// before failing with [`ScheduleError::StoreUnavailable`].
    pub fn open(path: &str, busy_timeout: Duration) -> ScheduleResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        tracing::info!(path, "Opened SQLite schedule store");
        Self::init(conn)
    }

    /// A private database that lives as long as the store.
    pub fn open_in_memory() -> ScheduleResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> ScheduleResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            interrupt_handle: conn.get_interrupt_handle(),
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> ScheduleResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ScheduleError::StoreUnavailable("sqlite connection lock poisoned".into()))
    }

    fn row_to_template(row: &Row) -> rusqlite::Result<TemplateEntry> {
        Ok(TemplateEntry {
            room: row.get(0)?,
            weekday: row.get(1)?,
            slot: row.get(2)?,
            subject: row.get(3)?,
            instructor: row.get(4)?,
        })
    }

    fn row_to_override(row: &Row) -> rusqlite::Result<OverrideEntry> {
        Ok(OverrideEntry {
            room: row.get(0)?,
            date: row.get(1)?,
            slot: row.get(2)?,
            instructor: row.get(3)?,
            subject: row.get(4)?,
        })
    }

    fn query_template(&self, filter: &str, args: &[&dyn ToSql]) -> ScheduleResult<Vec<TemplateEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM template_entries WHERE {filter}"
        ))?;
        let rows = stmt
            .query_map(args, Self::row_to_template)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn query_overrides(&self, filter: &str, args: &[&dyn ToSql]) -> ScheduleResult<Vec<OverrideEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {OVERRIDE_COLUMNS} FROM override_entries WHERE {filter}"
        ))?;
        let rows = stmt
            .query_map(args, Self::row_to_override)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

impl ScheduleStore for SqliteScheduleStore {
    fn template_for_room(&self, room: &str, weekday: Weekday) -> ScheduleResult<Vec<TemplateEntry>> {
        self.query_template("room = ?1 AND weekday = ?2", params![room, weekday])
    }

    fn template_for_slot(&self, weekday: Weekday, slot: SlotId) -> ScheduleResult<Vec<TemplateEntry>> {
        self.query_template("weekday = ?1 AND slot = ?2", params![weekday, slot])
    }

    fn overrides_for_room(&self, room: &str, date: NaiveDate) -> ScheduleResult<Vec<OverrideEntry>> {
        self.query_overrides("room = ?1 AND date = ?2", params![room, date])
    }

    fn overrides_for_slot(&self, date: NaiveDate, slot: SlotId) -> ScheduleResult<Vec<OverrideEntry>> {
        self.query_overrides("date = ?1 AND slot = ?2", params![date, slot])
    }

    fn insert_override_if_free(&self, entry: &OverrideEntry, weekday: Weekday) -> ScheduleResult<bool> {
        let conn = self.lock()?;
        let rows = conn.prepare_cached(INSERT_IF_FREE)?.execute(params![
            entry.room,
            entry.date,
            entry.slot,
            entry.instructor,
            entry.subject,
            weekday,
        ])?;
        Ok(rows > 0)
    }

    fn delete_override(&self, room: &str, date: NaiveDate, slot: SlotId) -> ScheduleResult<bool> {
        let conn = self.lock()?;
        let rows = conn
            .prepare_cached("DELETE FROM override_entries WHERE room = ?1 AND date = ?2 AND slot = ?3")?
            .execute(params![room, date, slot])?;
        Ok(rows > 0)
    }

    fn overrides_for_instructor(&self, instructor: &str) -> ScheduleResult<Vec<OverrideEntry>> {
        self.query_overrides("instructor = ?1", params![instructor])
    }

    fn slots(&self) -> ScheduleResult<Vec<Slot>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached("SELECT id, start_time, end_time FROM slots ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Slot {
                    id: row.get(0)?,
                    start: row.get(1)?,
                    end: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn rooms(&self) -> ScheduleResult<Vec<RoomId>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached("SELECT DISTINCT room FROM template_entries ORDER BY room")?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn subjects(&self) -> ScheduleResult<Vec<Subject>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached("SELECT id, name FROM subjects ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Subject {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Aborts whichever statement holds the connection. That may belong to
    /// another caller, which then fails with `StoreUnavailable` and rolls back.
    fn interrupt(&self) {
        tracing::warn!("Interrupting running SQLite statement");
        self.interrupt_handle.interrupt();
    }
}

impl SeedableStore for SqliteScheduleStore {
    fn load_seed(&self, seed: &ScheduleSeed) -> ScheduleResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut slot_stmt =
                tx.prepare("INSERT OR REPLACE INTO slots (id, start_time, end_time) VALUES (?1, ?2, ?3)")?;
            for slot in &seed.slots {
                slot_stmt.execute(params![slot.id, slot.start, slot.end])?;
            }

            let mut subject_stmt = tx.prepare("INSERT OR REPLACE INTO subjects (id, name) VALUES (?1, ?2)")?;
            for subject in &seed.subjects {
                subject_stmt.execute(params![subject.id, subject.name])?;
            }

            let mut template_stmt = tx.prepare(&format!(
                "INSERT OR REPLACE INTO template_entries ({TEMPLATE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"
            ))?;
            for entry in &seed.template {
                template_stmt.execute(params![
                    entry.room,
                    entry.weekday,
                    entry.slot,
                    entry.subject,
                    entry.instructor,
                ])?;
            }
        }
        tx.commit()?;
        tracing::info!(
            slots = seed.slots.len(),
            subjects = seed.subjects.len(),
            template = seed.template.len(),
            "Loaded schedule seed"
        );
        Ok(())
    }
}
