use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, params};
use std::path::PathBuf;

use crate::models::{JobRecord, JobStatus, Snapshot, SnapshotUserStats, User};
use crate::period::Granularity;

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open() -> Result<Self> {
        Self::open_at(Self::default_path()?)
    }

    pub fn open_at(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn default_path() -> Result<PathBuf> {
        // Use XDG data directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "grind") {
            Ok(proj_dirs.data_dir().join("grind.db"))
        } else {
            // Fallback to current directory
            Ok(PathBuf::from("grind.db"))
        }
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                name TEXT,
                jobs_applied INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                title TEXT NOT NULL,
                company TEXT NOT NULL,
                url TEXT,
                status TEXT NOT NULL DEFAULT 'applied' CHECK (status IN ('applied', 'assessment', 'interview', 'offer')),
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS leaderboard_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                period TEXT NOT NULL CHECK (period IN ('weekly', 'monthly', 'yearly')),
                period_key TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                users TEXT NOT NULL,
                UNIQUE (period, period_key)
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_username ON jobs(username);
            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='users'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!("Database not initialized. Run 'grind init' first."));
        }
        Ok(())
    }

    // --- Roster operations ---

    pub fn add_user(&self, username: &str, name: Option<&str>) -> Result<i64> {
        if self.get_user(username)?.is_some() {
            return Err(anyhow!("'{}' is already on the roster", username));
        }
        self.conn.execute(
            "INSERT INTO users (username, name) VALUES (?1, ?2)",
            params![username, name],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_user(&self, username: &str) -> Result<Option<User>> {
        let result = self.conn.query_row(
            "SELECT id, username, name, jobs_applied, created_at
             FROM users WHERE username = ?1",
            [username],
            Self::row_to_user,
        );
        match result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, username, name, jobs_applied, created_at
             FROM users ORDER BY username",
        )?;
        let rows = stmt.query_map([], Self::row_to_user)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list users")
    }

    pub fn rename_user(&self, username: &str, name: Option<&str>) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE users SET name = ?1 WHERE username = ?2",
            params![name, username],
        )?;
        Ok(changed > 0)
    }

    /// Remove a user and their job records. Snapshots are immutable history
    /// and are left untouched; leaderboard views join against the roster.
    pub fn remove_user(&self, username: &str) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM jobs WHERE username = ?1", [username])?;
        let removed = tx.execute("DELETE FROM users WHERE username = ?1", [username])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            name: row.get(2)?,
            jobs_applied: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    // --- Job log operations ---

    pub fn add_job(
        &self,
        username: &str,
        title: &str,
        company: &str,
        url: Option<&str>,
    ) -> Result<i64> {
        if self.get_user(username)?.is_none() {
            return Err(anyhow!("'{}' is not on the roster", username));
        }
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO jobs (username, title, company, url) VALUES (?1, ?2, ?3, ?4)",
            params![username, title, company, url],
        )?;
        let job_id = tx.last_insert_rowid();
        tx.execute(
            "UPDATE users SET jobs_applied = jobs_applied + 1 WHERE username = ?1",
            [username],
        )?;
        tx.commit()?;
        Ok(job_id)
    }

    pub fn get_job(&self, id: i64) -> Result<Option<JobRecord>> {
        let result = self.conn.query_row(
            "SELECT id, username, title, company, url, status, created_at
             FROM jobs WHERE id = ?1",
            [id],
            Self::row_to_job,
        );
        match result {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_jobs(&self, username: Option<&str>) -> Result<Vec<JobRecord>> {
        let mut sql = String::from(
            "SELECT id, username, title, company, url, status, created_at FROM jobs",
        );
        if username.is_some() {
            sql.push_str(" WHERE username = ?1");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if let Some(u) = username {
            stmt.query_map([u], Self::row_to_job)?
        } else {
            stmt.query_map([], Self::row_to_job)?
        };

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list jobs")
    }

    /// Advance the job one pipeline stage (wrapping after offer) and return
    /// the new status.
    pub fn advance_job(&self, id: i64) -> Result<Option<JobStatus>> {
        let Some(job) = self.get_job(id)? else {
            return Ok(None);
        };
        let next = job.status.advance();
        self.conn.execute(
            "UPDATE jobs SET status = ?1 WHERE id = ?2",
            params![next.as_str(), id],
        )?;
        Ok(Some(next))
    }

    pub fn delete_job(&self, id: i64) -> Result<bool> {
        let Some(job) = self.get_job(id)? else {
            return Ok(false);
        };
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM jobs WHERE id = ?1", [id])?;
        tx.execute(
            "UPDATE users SET jobs_applied = MAX(jobs_applied - 1, 0) WHERE username = ?1",
            [job.username.as_str()],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Recompute every user's jobs_applied from the jobs table. Returns the
    /// mismatches found as (username, stored, actual); fixes them unless
    /// dry_run is set.
    pub fn reconcile_job_counts(&self, dry_run: bool) -> Result<Vec<(String, i64, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT u.username, u.jobs_applied, COUNT(j.id)
             FROM users u LEFT JOIN jobs j ON j.username = u.username
             GROUP BY u.username
             HAVING u.jobs_applied != COUNT(j.id)",
        )?;
        let mismatches = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<(String, i64, i64)>, _>>()?;

        if !dry_run {
            for (username, _, actual) in &mismatches {
                self.conn.execute(
                    "UPDATE users SET jobs_applied = ?1 WHERE username = ?2",
                    params![actual, username],
                )?;
            }
        }

        Ok(mismatches)
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<JobRecord> {
        let status: String = row.get(5)?;
        let status = JobStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                rusqlite::types::Type::Text,
                format!("unknown job status '{}'", status).into(),
            )
        })?;
        Ok(JobRecord {
            id: row.get(0)?,
            username: row.get(1)?,
            title: row.get(2)?,
            company: row.get(3)?,
            url: row.get(4)?,
            status,
            created_at: row.get(6)?,
        })
    }

    // --- Snapshot store ---

    /// Idempotently materialize the baseline for (granularity, period_key).
    /// The UNIQUE constraint makes the insert a no-op when the snapshot
    /// already exists; either way the stored row is what comes back, so a
    /// racing second caller just re-reads the winner's baseline.
    pub fn ensure_snapshot(
        &self,
        granularity: Granularity,
        period_key: &str,
        entries: &[SnapshotUserStats],
    ) -> Result<Snapshot> {
        let users_json = serde_json::to_string(entries)?;
        self.conn.execute(
            "INSERT INTO leaderboard_snapshots (period, period_key, users)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (period, period_key) DO NOTHING",
            params![granularity.as_str(), period_key, users_json],
        )?;
        self.load_snapshot(granularity, period_key)?.ok_or_else(|| {
            anyhow!(
                "snapshot {} {} missing after insert",
                granularity.as_str(),
                period_key
            )
        })
    }

    /// Point lookup of a historical baseline. Absent is a normal outcome
    /// for periods that were never observed.
    pub fn load_snapshot(
        &self,
        granularity: Granularity,
        period_key: &str,
    ) -> Result<Option<Snapshot>> {
        let result = self.conn.query_row(
            "SELECT id, period, period_key, created_at, users
             FROM leaderboard_snapshots
             WHERE period = ?1 AND period_key = ?2
             LIMIT 1",
            params![granularity.as_str(), period_key],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        );
        let (id, key, created_at, users_json) = match result {
            Ok(columns) => columns,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let users: Vec<SnapshotUserStats> = serde_json::from_str(&users_json)
            .with_context(|| format!("Corrupt snapshot {} {}", granularity.as_str(), key))?;
        Ok(Some(Snapshot {
            id,
            period: granularity,
            period_key: key,
            created_at,
            users,
        }))
    }

    /// Append a late joiner's baseline entry to an already-materialized
    /// snapshot. Never overwrites an existing entry; no-op when the
    /// snapshot is absent or already holds the username.
    pub fn add_user_baseline(
        &self,
        granularity: Granularity,
        period_key: &str,
        entry: &SnapshotUserStats,
    ) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let result = tx.query_row(
            "SELECT id, users FROM leaderboard_snapshots
             WHERE period = ?1 AND period_key = ?2
             LIMIT 1",
            params![granularity.as_str(), period_key],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        );
        let (id, users_json) = match result {
            Ok(columns) => columns,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let mut users: Vec<SnapshotUserStats> = serde_json::from_str(&users_json)
            .with_context(|| format!("Corrupt snapshot {} {}", granularity.as_str(), period_key))?;
        if users.iter().any(|u| u.username == entry.username) {
            return Ok(false);
        }
        users.push(entry.clone());

        tx.execute(
            "UPDATE leaderboard_snapshots SET users = ?1 WHERE id = ?2",
            params![serde_json::to_string(&users)?, id],
        )?;
        tx.commit()?;
        Ok(true)
    }

    #[cfg(test)]
    fn count_snapshots(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM leaderboard_snapshots", [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }
}
