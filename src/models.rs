use serde::{Deserialize, Serialize};

use crate::period::Granularity;
use crate::progress;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub name: Option<String>,
    pub jobs_applied: i64, // denormalized count of this user's job records
    pub created_at: String,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.username)
    }
}

/// Job application pipeline stage. Advancing from the last stage wraps
/// back to the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Applied,
    Assessment,
    Interview,
    Offer,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Applied => "applied",
            JobStatus::Assessment => "assessment",
            JobStatus::Interview => "interview",
            JobStatus::Offer => "offer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "applied" => Some(JobStatus::Applied),
            "assessment" => Some(JobStatus::Assessment),
            "interview" => Some(JobStatus::Interview),
            "offer" => Some(JobStatus::Offer),
            _ => None,
        }
    }

    /// One step forward in the pipeline, cyclic.
    pub fn advance(&self) -> Self {
        match self {
            JobStatus::Applied => JobStatus::Assessment,
            JobStatus::Assessment => JobStatus::Interview,
            JobStatus::Interview => JobStatus::Offer,
            JobStatus::Offer => JobStatus::Applied,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: i64,
    pub username: String,
    pub title: String,
    pub company: String,
    pub url: Option<String>,
    pub status: JobStatus,
    pub created_at: String,
}

/// Per-user stats at query time. Counters are either lifetime values (from
/// the stats source) or period deltas (from the progress engine) depending
/// on which view produced the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStats {
    pub username: String,
    pub name: Option<String>,
    pub easy: i64,
    pub medium: i64,
    pub hard: i64,
    pub total: i64,
    pub jobs_applied: i64,
    pub xp: f64,
    /// Set when the upstream fetch failed; numeric fields are zero and the
    /// row is excluded from numeric ranking comparisons.
    pub error: Option<String>,
}

impl UserStats {
    pub fn zeroed(username: &str, name: Option<&str>) -> Self {
        Self {
            username: username.to_string(),
            name: name.map(|n| n.to_string()),
            easy: 0,
            medium: 0,
            hard: 0,
            total: 0,
            jobs_applied: 0,
            xp: 0.0,
            error: None,
        }
    }

    pub fn error_row(username: &str, name: Option<&str>, message: &str) -> Self {
        let mut stats = Self::zeroed(username, name);
        stats.error = Some(message.to_string());
        stats
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.username)
    }
}

/// One user's baseline entry inside a persisted snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotUserStats {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub jobs_applied: i64,
    pub easy: i64,
    pub medium: i64,
    pub hard: i64,
    pub total: i64,
    pub xp: f64,
}

impl SnapshotUserStats {
    pub fn from_stats(stats: &UserStats) -> Self {
        Self {
            username: stats.username.clone(),
            name: stats.name.clone(),
            jobs_applied: stats.jobs_applied,
            easy: stats.easy,
            medium: stats.medium,
            hard: stats.hard,
            total: stats.total,
            xp: progress::xp(stats.jobs_applied, stats.easy, stats.medium, stats.hard),
        }
    }
}

/// Baseline snapshot for one (granularity, period key) pair. At most one
/// exists per pair; entries are append-only once materialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: i64,
    pub period: Granularity,
    pub period_key: String,
    pub created_at: String,
    pub users: Vec<SnapshotUserStats>,
}

impl Snapshot {
    pub fn entry(&self, username: &str) -> Option<&SnapshotUserStats> {
        self.users.iter().find(|u| u.username == username)
    }
}
