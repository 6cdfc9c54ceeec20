use std::cmp::Ordering;

use crate::models::{Snapshot, SnapshotUserStats, UserStats};

/// Weighted experience score. The single source of truth for the weighting
/// formula; applied identically to lifetime counts and to period deltas.
pub fn xp(jobs_applied: i64, easy: i64, medium: i64, hard: i64) -> f64 {
    0.5 * jobs_applied as f64 + easy as f64 + 2.0 * medium as f64 + 4.0 * hard as f64
}

fn delta(current: i64, baseline: i64) -> i64 {
    (current - baseline).max(0)
}

/// Change since the period baseline. No baseline entry means no observed
/// change yet, so every field is zero; with a baseline, each counter is
/// clamped at zero and the xp is recomputed from the deltas.
pub fn compute_progress(current: &UserStats, baseline: Option<&SnapshotUserStats>) -> UserStats {
    let mut out = UserStats::zeroed(&current.username, current.name.as_deref());
    out.error = current.error.clone();

    let Some(base) = baseline else {
        return out;
    };

    out.easy = delta(current.easy, base.easy);
    out.medium = delta(current.medium, base.medium);
    out.hard = delta(current.hard, base.hard);
    out.total = delta(current.total, base.total);
    out.jobs_applied = delta(current.jobs_applied, base.jobs_applied);
    out.xp = xp(out.jobs_applied, out.easy, out.medium, out.hard);
    out
}

fn by_score(a: &UserStats, b: &UserStats) -> Ordering {
    // Rows with a fetch error sort below every numeric row.
    match (a.error.is_some(), b.error.is_some()) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        _ => b
            .xp
            .partial_cmp(&a.xp)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.total.cmp(&a.total)),
    }
}

/// Sort descending by (xp, total). Ranks are positional: the caller's
/// 1-based index into the returned list, so ties never share a rank.
pub fn rank(mut stats: Vec<UserStats>) -> Vec<UserStats> {
    stats.sort_by(by_score);
    stats
}

/// Jobs leaderboard ordering: applications first, xp as the tie-breaker.
pub fn rank_by_jobs(mut stats: Vec<UserStats>) -> Vec<UserStats> {
    stats.sort_by(|a, b| match (a.error.is_some(), b.error.is_some()) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        _ => b
            .jobs_applied
            .cmp(&a.jobs_applied)
            .then_with(|| b.xp.partial_cmp(&a.xp).unwrap_or(Ordering::Equal)),
    });
    stats
}

fn stats_from_entry(entry: &SnapshotUserStats) -> UserStats {
    UserStats {
        username: entry.username.clone(),
        name: entry.name.clone(),
        easy: entry.easy,
        medium: entry.medium,
        hard: entry.hard,
        total: entry.total,
        jobs_applied: entry.jobs_applied,
        xp: entry.xp,
        error: None,
    }
}

/// Reconstruct a finished period's leaderboard from two baselines: the
/// snapshot that closed the period (the next period's baseline) and the
/// snapshot that opened it. Unlike live progress, a user missing from the
/// start snapshot gets a zero baseline and full credit.
pub fn compute_prev_stats(end: &Snapshot, start: Option<&Snapshot>) -> Vec<UserStats> {
    let rows = end
        .users
        .iter()
        .map(|entry| {
            let current = stats_from_entry(entry);
            match start.and_then(|s| s.entry(&entry.username)) {
                Some(base) => compute_progress(&current, Some(base)),
                None => {
                    let mut full = current;
                    full.xp = xp(full.jobs_applied, full.easy, full.medium, full.hard);
                    full
                }
            }
        })
        .collect();
    rank(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::Granularity;

    fn stats(username: &str, easy: i64, medium: i64, hard: i64, jobs: i64) -> UserStats {
        UserStats {
            username: username.to_string(),
            name: None,
            easy,
            medium,
            hard,
            total: easy + medium + hard,
            jobs_applied: jobs,
            xp: xp(jobs, easy, medium, hard),
            error: None,
        }
    }

    fn entry(username: &str, easy: i64, medium: i64, hard: i64, jobs: i64) -> SnapshotUserStats {
        SnapshotUserStats {
            username: username.to_string(),
            name: None,
            jobs_applied: jobs,
            easy,
            medium,
            hard,
            total: easy + medium + hard,
            xp: xp(jobs, easy, medium, hard),
        }
    }

    fn snapshot(key: &str, users: Vec<SnapshotUserStats>) -> Snapshot {
        Snapshot {
            id: 1,
            period: Granularity::Weekly,
            period_key: key.to_string(),
            created_at: "2026-08-03 05:00:00".to_string(),
            users,
        }
    }

    #[test]
    fn xp_weighting_is_exact() {
        assert_eq!(xp(2, 3, 1, 0), 6.0);
        assert_eq!(xp(0, 0, 0, 0), 0.0);
        assert_eq!(xp(1, 0, 0, 2), 8.5);
    }

    #[test]
    fn progress_against_baseline() {
        // Baseline {5,2,1,total 8, jobs 1}, current {7,2,1,total 10, jobs 2}.
        let current = stats("alice", 7, 2, 1, 2);
        let base = entry("alice", 5, 2, 1, 1);
        let p = compute_progress(&current, Some(&base));
        assert_eq!((p.easy, p.medium, p.hard, p.total, p.jobs_applied), (2, 0, 0, 2, 1));
        assert_eq!(p.xp, 2.5);
    }

    #[test]
    fn missing_baseline_means_zero_progress() {
        let current = stats("bob", 120, 80, 40, 9);
        let p = compute_progress(&current, None);
        assert_eq!((p.easy, p.medium, p.hard, p.total, p.jobs_applied), (0, 0, 0, 0, 0));
        assert_eq!(p.xp, 0.0);
    }

    #[test]
    fn progress_never_goes_negative() {
        // Upstream correction: current below baseline clamps to zero.
        let current = stats("carol", 3, 1, 0, 0);
        let base = entry("carol", 5, 2, 1, 2);
        let p = compute_progress(&current, Some(&base));
        assert_eq!((p.easy, p.medium, p.hard, p.total, p.jobs_applied), (0, 0, 0, 0, 0));
        assert_eq!(p.xp, 0.0);
    }

    #[test]
    fn ranking_orders_by_xp_then_total() {
        let a = stats("a", 10, 0, 0, 0); // xp 10, total 10
        let b = stats("b", 2, 4, 0, 0); // xp 10, total 6
        let c = stats("c", 0, 0, 3, 0); // xp 12, total 3
        let ranked = rank(vec![a, b, c]);
        let order: Vec<&str> = ranked.iter().map(|s| s.username.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn error_rows_rank_last_without_blocking_others() {
        let ok = stats("ok", 1, 0, 0, 0);
        let err = UserStats::error_row("gone", None, "user not found");
        let zero = stats("zero", 0, 0, 0, 0);
        let ranked = rank(vec![err, ok, zero]);
        let order: Vec<&str> = ranked.iter().map(|s| s.username.as_str()).collect();
        assert_eq!(order, vec!["ok", "zero", "gone"]);
        assert!(ranked[2].error.is_some());
    }

    #[test]
    fn ranks_are_a_dense_permutation() {
        let ranked = rank(vec![
            stats("a", 5, 0, 0, 0),
            stats("b", 5, 0, 0, 0),
            stats("c", 1, 0, 0, 0),
        ]);
        // Positional ranks: 1..N with no gaps even for the xp tie.
        let ranks: Vec<usize> = ranked.iter().enumerate().map(|(i, _)| i + 1).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn jobs_ranking_uses_applications_first() {
        let a = stats("a", 50, 0, 0, 1);
        let b = stats("b", 0, 0, 0, 4);
        let ranked = rank_by_jobs(vec![a, b]);
        assert_eq!(ranked[0].username, "b");
    }

    #[test]
    fn prev_stats_give_full_credit_without_start_entry() {
        let end = snapshot(
            "2026-W32",
            vec![entry("alice", 6, 2, 0, 0), entry("late", 3, 0, 0, 2)],
        );
        let start = snapshot("2026-W31", vec![entry("alice", 4, 1, 0, 0)]);
        let rows = compute_prev_stats(&end, Some(&start));

        let alice = rows.iter().find(|r| r.username == "alice").unwrap();
        assert_eq!((alice.easy, alice.medium), (2, 1));
        assert_eq!(alice.xp, 4.0);

        // Absent from the start snapshot: zero baseline, full credit.
        let late = rows.iter().find(|r| r.username == "late").unwrap();
        assert_eq!((late.easy, late.jobs_applied), (3, 2));
        assert_eq!(late.xp, 4.0);
    }

    #[test]
    fn prev_stats_with_no_start_snapshot_credit_everyone_in_full() {
        let end = snapshot("2026-W32", vec![entry("alice", 1, 1, 1, 0)]);
        let rows = compute_prev_stats(&end, None);
        assert_eq!(rows[0].xp, 7.0);
        assert_eq!(rows[0].total, 3);
    }
}
