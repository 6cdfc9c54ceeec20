use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};

use crate::db::Database;
use crate::fetch::{StatsClient, StatsResult};
use crate::models::{SnapshotUserStats, UserStats};
use crate::period::{self, Granularity};
use crate::progress;

/// One period tab: ranked progress rows against that period's baseline.
pub struct PeriodBoard {
    pub granularity: Granularity,
    pub period_key: String,
    pub remaining_ms: i64,
    /// Set when the baseline could not be materialized (persistence
    /// failure); rows are all-zero and the UI shows a notice instead of
    /// silent zeros.
    pub baseline_missing: bool,
    pub rows: Vec<UserStats>,
}

pub struct BoardData {
    pub all_time: Vec<UserStats>,
    pub periods: Vec<PeriodBoard>,
    pub jobs: Vec<UserStats>,
}

/// Reconstruction of a finished period from its bracketing baselines.
pub enum PrevBoard {
    NoBaseline {
        granularity: Granularity,
        period_key: String,
    },
    Board {
        granularity: Granularity,
        period_key: String,
        rows: Vec<UserStats>,
    },
}

pub fn refresh(db: &Database, client: &StatsClient) -> Result<BoardData> {
    refresh_at(db, client, Utc::now())
}

/// One full leaderboard pass: fetch everyone's stats, lazily materialize
/// the current baseline for each granularity, and build every ranked view.
/// Per-user fetch failures land in that user's row; a snapshot failure
/// downgrades that one tab instead of aborting the pass.
pub fn refresh_at(db: &Database, client: &StatsClient, now: DateTime<Utc>) -> Result<BoardData> {
    let roster = db.list_users()?;
    let inputs: Vec<(String, i64)> = roster
        .iter()
        .map(|u| (u.username.clone(), u.jobs_applied))
        .collect();
    let results = client.fetch_all(&inputs);

    let current: Vec<UserStats> = roster
        .iter()
        .zip(results)
        .map(|(user, result)| match result {
            StatsResult::Success(mut stats) => {
                stats.name = user.name.clone();
                stats
            }
            StatsResult::UserNotFound { .. } => {
                UserStats::error_row(&user.username, user.name.as_deref(), "user not found")
            }
            StatsResult::TransientFailure { message } => {
                UserStats::error_row(&user.username, user.name.as_deref(), &message)
            }
        })
        .collect();

    // Baselines only capture users whose fetch succeeded. A user erroring
    // at materialization has no entry and therefore zero progress until
    // the next period, which is the "no observed change yet" rule.
    let entries: Vec<SnapshotUserStats> = current
        .iter()
        .filter(|s| s.error.is_none())
        .map(SnapshotUserStats::from_stats)
        .collect();

    let mut periods = Vec::new();
    for granularity in Granularity::ALL {
        let period_key = period::period_key(granularity, now);
        let remaining_ms = period::ms_until_rollover(granularity, now);
        let (rows, baseline_missing) = match db.ensure_snapshot(granularity, &period_key, &entries)
        {
            Ok(snapshot) => {
                let rows = current
                    .iter()
                    .map(|c| progress::compute_progress(c, snapshot.entry(&c.username)))
                    .collect();
                (rows, false)
            }
            Err(e) => {
                log::warn!("{} baseline unavailable: {}", granularity.as_str(), e);
                let rows = current
                    .iter()
                    .map(|c| progress::compute_progress(c, None))
                    .collect();
                (rows, true)
            }
        };
        periods.push(PeriodBoard {
            granularity,
            period_key,
            remaining_ms,
            baseline_missing,
            rows: progress::rank(rows),
        });
    }

    Ok(BoardData {
        jobs: progress::rank_by_jobs(current.clone()),
        all_time: progress::rank(current),
        periods,
    })
}

/// Previous period leaderboard: the current period's baseline is the end
/// state, the previous period's baseline is the start. Participants are
/// taken from the end snapshot, so the view shows the period as it was.
pub fn previous_board(db: &Database, granularity: Granularity) -> Result<PrevBoard> {
    previous_board_at(db, granularity, Utc::now())
}

pub fn previous_board_at(
    db: &Database,
    granularity: Granularity,
    now: DateTime<Utc>,
) -> Result<PrevBoard> {
    let prev_key = period::previous_period_key(granularity, now);
    let current_key = period::period_key(granularity, now);

    let Some(end) = db.load_snapshot(granularity, &current_key)? else {
        return Ok(PrevBoard::NoBaseline {
            granularity,
            period_key: prev_key,
        });
    };
    let start = db.load_snapshot(granularity, &prev_key)?;

    Ok(PrevBoard::Board {
        granularity,
        period_key: prev_key,
        rows: progress::compute_prev_stats(&end, start.as_ref()),
    })
}

/// Validate and add a username to the roster, then fan its baseline entry
/// into every currently materialized snapshot so the join point becomes
/// the zero line for each open period independently.
pub fn register_user(
    db: &Database,
    client: &StatsClient,
    username: &str,
    name: Option<&str>,
) -> Result<UserStats> {
    validate_username(username)?;

    let mut stats = match client.fetch(username, 0) {
        StatsResult::Success(stats) => stats,
        StatsResult::UserNotFound { .. } => {
            return Err(anyhow!("'{}' does not exist on the stats source", username));
        }
        StatsResult::TransientFailure { message } => {
            return Err(anyhow!("stats source unavailable: {}", message));
        }
    };
    stats.name = name.map(|n| n.to_string());

    db.add_user(username, name)?;

    let entry = SnapshotUserStats::from_stats(&stats);
    let now = Utc::now();
    for granularity in Granularity::ALL {
        let key = period::period_key(granularity, now);
        if let Err(e) = db.add_user_baseline(granularity, &key, &entry) {
            log::warn!(
                "could not record {} baseline for {}: {}",
                granularity.as_str(),
                username,
                e
            );
        }
    }

    Ok(stats)
}

pub fn validate_username(username: &str) -> Result<()> {
    if username.trim().is_empty() {
        return Err(anyhow!("username is required"));
    }
    let re = regex::Regex::new(r"^[A-Za-z0-9_-]{1,40}$")?;
    if !re.is_match(username) {
        return Err(anyhow!(
            "'{}' is not a valid username (letters, digits, '-', '_')",
            username
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::open_at(dir.path().join("test.db")).expect("open");
        db.init().expect("init");
        (dir, db)
    }

    fn entry(username: &str, easy: i64, jobs: i64) -> SnapshotUserStats {
        SnapshotUserStats {
            username: username.to_string(),
            name: None,
            jobs_applied: jobs,
            easy,
            medium: 0,
            hard: 0,
            total: easy,
            xp: progress::xp(jobs, easy, 0, 0),
        }
    }

    #[test]
    fn username_validation_rejects_bad_shapes() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("alice-42_x").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("   ").is_err());
        assert!(validate_username("no spaces").is_err());
        assert!(validate_username("bad/char").is_err());
    }

    #[test]
    fn previous_board_reconstructs_from_bracketing_snapshots() {
        let (_dir, db) = test_db();
        // now is Friday 2026-08-07 in the reference zone: current week
        // 2026-W32, previous 2026-W31.
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 17, 0, 0).unwrap();

        db.ensure_snapshot(Granularity::Weekly, "2026-W31", &[entry("alice", 4, 0)])
            .unwrap();
        db.ensure_snapshot(
            Granularity::Weekly,
            "2026-W32",
            &[entry("alice", 10, 0), entry("late", 3, 2)],
        )
        .unwrap();

        let board = previous_board_at(&db, Granularity::Weekly, now).unwrap();
        let PrevBoard::Board { period_key, rows, .. } = board else {
            panic!("expected a reconstructed board");
        };
        assert_eq!(period_key, "2026-W31");

        let alice = rows.iter().find(|r| r.username == "alice").unwrap();
        assert_eq!(alice.easy, 6);
        // Absent from the start snapshot: full credit from zero.
        let late = rows.iter().find(|r| r.username == "late").unwrap();
        assert_eq!((late.easy, late.jobs_applied), (3, 2));
    }

    #[test]
    fn previous_board_without_end_snapshot_reports_no_baseline() {
        let (_dir, db) = test_db();
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 17, 0, 0).unwrap();
        let board = previous_board_at(&db, Granularity::Monthly, now).unwrap();
        assert!(matches!(board, PrevBoard::NoBaseline { .. }));
    }

    #[test]
    fn refresh_isolates_fetch_failures_per_user() {
        let (_dir, db) = test_db();
        db.add_user("alice", None).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 17, 0, 0).unwrap();

        // Nothing listens here; every fetch fails fast and lands in the row.
        let client = StatsClient::new("http://127.0.0.1:9").expect("client");
        let data = refresh_at(&db, &client, now).unwrap();

        assert_eq!(data.all_time.len(), 1);
        assert!(data.all_time[0].error.is_some());
        assert_eq!(data.all_time[0].xp, 0.0);

        // The baseline still materialized, with no entries for errored
        // users, and each period tab reports zero progress rather than
        // aborting.
        for period_board in &data.periods {
            assert!(!period_board.baseline_missing);
            assert_eq!(period_board.rows.len(), 1);
            assert_eq!(period_board.rows[0].total, 0);
        }
        let snap = db
            .load_snapshot(Granularity::Weekly, "2026-W32")
            .unwrap()
            .unwrap();
        assert!(snap.users.is_empty());
    }
}
