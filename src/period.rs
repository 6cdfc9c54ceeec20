use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Tracking window for progress baselines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Weekly,
    Monthly,
    Yearly,
}

impl Granularity {
    pub const ALL: [Granularity; 3] =
        [Granularity::Weekly, Granularity::Monthly, Granularity::Yearly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
            Granularity::Yearly => "yearly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "weekly" => Some(Granularity::Weekly),
            "monthly" => Some(Granularity::Monthly),
            "yearly" => Some(Granularity::Yearly),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Granularity::Weekly => "Weekly",
            Granularity::Monthly => "Monthly",
            Granularity::Yearly => "Yearly",
        }
    }
}

/// Hours west of UTC for the reference zone. Every period computation goes
/// through this one offset; a mismatch anywhere would silently break
/// snapshot idempotence.
const REFERENCE_HOURS_WEST: i32 = 5;

fn reference_zone() -> FixedOffset {
    FixedOffset::west_opt(REFERENCE_HOURS_WEST * 3600).unwrap_or_else(|| Utc.fix())
}

fn to_reference(instant: DateTime<Utc>) -> DateTime<FixedOffset> {
    instant.with_timezone(&reference_zone())
}

/// Canonical key for the period containing `instant`: `YYYY-Www` (ISO week,
/// Monday start), `YYYY-MM`, or `YYYY`. Two instants in the same period
/// always produce an identical key.
pub fn period_key(granularity: Granularity, instant: DateTime<Utc>) -> String {
    let local = to_reference(instant);
    match granularity {
        Granularity::Weekly => {
            let week = local.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        Granularity::Monthly => format!("{:04}-{:02}", local.year(), local.month()),
        Granularity::Yearly => format!("{:04}", local.year()),
    }
}

/// Key of the period immediately before the one containing `instant`.
pub fn previous_period_key(granularity: Granularity, instant: DateTime<Utc>) -> String {
    let local = to_reference(instant);
    match granularity {
        Granularity::Weekly => period_key(granularity, instant - Duration::days(7)),
        Granularity::Monthly => {
            let (year, month) = if local.month() == 1 {
                (local.year() - 1, 12)
            } else {
                (local.year(), local.month() - 1)
            };
            format!("{:04}-{:02}", year, month)
        }
        Granularity::Yearly => format!("{:04}", local.year() - 1),
    }
}

fn next_boundary(
    granularity: Granularity,
    local: &DateTime<FixedOffset>,
) -> Option<DateTime<FixedOffset>> {
    let today = local.date_naive();
    let start = match granularity {
        Granularity::Weekly => {
            // Days until the coming Monday; a Monday instant still has the
            // full remainder of its own week ahead of it.
            let ahead = 7 - i64::from(today.weekday().num_days_from_monday());
            today.checked_add_signed(Duration::days(ahead))?
        }
        Granularity::Monthly => {
            let (year, month) = if local.month() == 12 {
                (local.year() + 1, 1)
            } else {
                (local.year(), local.month() + 1)
            };
            NaiveDate::from_ymd_opt(year, month, 1)?
        }
        Granularity::Yearly => NaiveDate::from_ymd_opt(local.year() + 1, 1, 1)?,
    };
    local
        .offset()
        .from_local_datetime(&start.and_hms_opt(0, 0, 0)?)
        .single()
}

/// Milliseconds until the next period boundary in the reference zone.
/// Display-only; correctness never depends on it.
pub fn ms_until_rollover(granularity: Granularity, instant: DateTime<Utc>) -> i64 {
    let local = to_reference(instant);
    match next_boundary(granularity, &local) {
        Some(boundary) => (boundary.with_timezone(&Utc) - instant)
            .num_milliseconds()
            .max(0),
        None => 0,
    }
}

/// Human-readable countdown, e.g. "2d 11h 30m".
pub fn format_remaining(ms: i64) -> String {
    let total_minutes = ms / 60_000;
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes / 60) % 24;
    let minutes = total_minutes % 60;
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn same_iso_week_gives_identical_key() {
        // Tuesday and Sunday of the same ISO week.
        let t1 = utc(2026, 1, 6, 12, 0, 0);
        let t2 = utc(2026, 1, 11, 12, 0, 0);
        assert_eq!(period_key(Granularity::Weekly, t1), "2026-W02");
        assert_eq!(
            period_key(Granularity::Weekly, t1),
            period_key(Granularity::Weekly, t2)
        );
    }

    #[test]
    fn next_iso_week_key_compares_later() {
        let t1 = utc(2026, 1, 6, 12, 0, 0);
        let t2 = t1 + Duration::days(7);
        let k1 = period_key(Granularity::Weekly, t1);
        let k2 = period_key(Granularity::Weekly, t2);
        assert_ne!(k1, k2);
        assert!(k2 > k1);
    }

    #[test]
    fn iso_week_year_spans_calendar_new_year() {
        // Week 1 of 2026 starts Monday 2025-12-29; both days share the key.
        let dec = utc(2025, 12, 29, 12, 0, 0);
        let jan = utc(2026, 1, 1, 12, 0, 0);
        assert_eq!(period_key(Granularity::Weekly, dec), "2026-W01");
        assert_eq!(period_key(Granularity::Weekly, jan), "2026-W01");
    }

    #[test]
    fn monthly_and_yearly_keys() {
        let t = utc(2026, 8, 7, 20, 0, 0);
        assert_eq!(period_key(Granularity::Monthly, t), "2026-08");
        assert_eq!(period_key(Granularity::Yearly, t), "2026");
    }

    #[test]
    fn keys_follow_reference_zone_not_utc() {
        // 02:00 UTC on Jan 1 is still Dec 31 in the reference zone (UTC-5),
        // so every granularity reports the earlier period.
        let t = utc(2026, 1, 1, 2, 0, 0);
        assert_eq!(period_key(Granularity::Yearly, t), "2025");
        assert_eq!(period_key(Granularity::Monthly, t), "2025-12");
        assert_eq!(period_key(Granularity::Weekly, t), "2026-W01");
    }

    #[test]
    fn previous_keys() {
        let t = utc(2026, 1, 15, 12, 0, 0);
        assert_eq!(previous_period_key(Granularity::Monthly, t), "2025-12");
        assert_eq!(previous_period_key(Granularity::Yearly, t), "2025");

        let t = utc(2026, 1, 6, 12, 0, 0); // 2026-W02
        assert_eq!(previous_period_key(Granularity::Weekly, t), "2026-W01");
    }

    #[test]
    fn rollover_ms_is_exact_for_a_known_instant() {
        // Friday 2026-08-07 12:00 in the reference zone; next Monday 00:00
        // is 2.5 days away.
        let t = utc(2026, 8, 7, 17, 0, 0);
        assert_eq!(
            ms_until_rollover(Granularity::Weekly, t),
            60 * 3600 * 1000 // 2.5 days
        );
    }

    #[test]
    fn rollover_ms_is_positive_and_bounded() {
        let t = utc(2026, 8, 7, 17, 0, 0);
        let week = ms_until_rollover(Granularity::Weekly, t);
        assert!(week > 0 && week <= 7 * 24 * 3600 * 1000);
        let month = ms_until_rollover(Granularity::Monthly, t);
        assert!(month > 0 && month <= 31 * 24 * 3600 * 1000);
        let year = ms_until_rollover(Granularity::Yearly, t);
        assert!(year > 0 && year <= 366 * 24 * 3600 * 1000);
    }

    #[test]
    fn monday_midnight_has_a_full_week_remaining() {
        // 2026-08-10 00:00 reference time == 05:00 UTC.
        let t = utc(2026, 8, 10, 5, 0, 0);
        assert_eq!(
            ms_until_rollover(Granularity::Weekly, t),
            7 * 24 * 3600 * 1000
        );
    }

    #[test]
    fn countdown_formatting() {
        assert_eq!(format_remaining(2 * 24 * 3600 * 1000 + 90 * 60 * 1000), "2d 1h 30m");
        assert_eq!(format_remaining(90 * 60 * 1000), "1h 30m");
        assert_eq!(format_remaining(59 * 1000), "0m");
    }
}
