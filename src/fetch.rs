use anyhow::{Context, Result};
use rand::Rng;
use serde::Deserialize;
use std::env;
use std::thread;
use std::time::Duration;

use crate::models::UserStats;
use crate::progress;

pub const DEFAULT_API_URL: &str = "https://leetcode-stats-api.herokuapp.com";

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF_MS: u64 = 500;

// Upstream is rate-sensitive; fan out in small batches with a jittered
// pause between them.
const BATCH_SIZE: usize = 3;
const BATCH_PAUSE_MS: u64 = 750;
const BATCH_JITTER_MS: u64 = 250;

/// Outcome of one user's stats fetch. `UserNotFound` is terminal and never
/// retried; `TransientFailure` carries the last error after the retry
/// ceiling was exhausted.
#[derive(Debug, Clone)]
pub enum StatsResult {
    Success(UserStats),
    UserNotFound { username: String },
    TransientFailure { message: String },
}

#[derive(Debug, Deserialize)]
struct ApiPayload {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default, rename = "totalSolved")]
    total_solved: i64,
    #[serde(default, rename = "easySolved")]
    easy_solved: i64,
    #[serde(default, rename = "mediumSolved")]
    medium_solved: i64,
    #[serde(default, rename = "hardSolved")]
    hard_solved: i64,
}

enum Attempt {
    Done(StatsResult),
    Retry(String),
}

pub struct StatsClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl StatsClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL from GRIND_API_URL, falling back to the public stats API.
    pub fn from_env() -> Result<Self> {
        let base = env::var("GRIND_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Self::new(&base)
    }

    /// Fetch one user's solved counts, retrying 5xx and network failures
    /// with exponential backoff. `known_jobs_applied` is folded into the
    /// returned stats so the xp already reflects the job log.
    pub fn fetch(&self, username: &str, known_jobs_applied: i64) -> StatsResult {
        let mut delay = Duration::from_millis(BASE_BACKOFF_MS);
        let mut last_error = String::from("no attempts made");

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                thread::sleep(delay);
                delay *= 2;
            }
            match self.fetch_once(username, known_jobs_applied) {
                Attempt::Done(result) => return result,
                Attempt::Retry(message) => {
                    log::warn!("fetch {} attempt {}: {}", username, attempt + 1, message);
                    last_error = message;
                }
            }
        }

        StatsResult::TransientFailure {
            message: last_error,
        }
    }

    fn fetch_once(&self, username: &str, known_jobs_applied: i64) -> Attempt {
        let url = format!("{}/{}", self.base_url, username);
        let response = match self.client.get(&url).send() {
            Ok(r) => r,
            Err(e) => return Attempt::Retry(e.to_string()),
        };

        let status = response.status();
        if status.is_server_error() {
            return Attempt::Retry(format!("server error: {}", status));
        }

        let body = match response.text() {
            Ok(b) => b,
            Err(e) => return Attempt::Retry(e.to_string()),
        };

        if !status.is_success() {
            return Attempt::Done(classify_error_body(username, status.as_u16(), &body));
        }

        match serde_json::from_str::<ApiPayload>(&body) {
            Ok(payload) => Attempt::Done(classify_payload(username, known_jobs_applied, payload)),
            // A 2xx with an unparseable body reads as a flaky gateway.
            Err(e) => Attempt::Retry(format!("malformed response: {}", e)),
        }
    }

    /// Fetch many users' stats with bounded concurrency: batches of
    /// BATCH_SIZE run on scoped threads, serialized with a pacing delay.
    /// Results come back in input order; one user's failure never affects
    /// another's slot.
    pub fn fetch_all(&self, users: &[(String, i64)]) -> Vec<StatsResult> {
        let mut results = Vec::with_capacity(users.len());

        for (index, batch) in users.chunks(BATCH_SIZE).enumerate() {
            if index > 0 {
                let jitter = rand::thread_rng().gen_range(0..BATCH_JITTER_MS);
                thread::sleep(Duration::from_millis(BATCH_PAUSE_MS + jitter));
            }

            let batch_results: Vec<StatsResult> = thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|(username, jobs)| scope.spawn(move || self.fetch(username, *jobs)))
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| match handle.join() {
                        Ok(result) => result,
                        Err(_) => StatsResult::TransientFailure {
                            message: "fetch worker panicked".to_string(),
                        },
                    })
                    .collect()
            });

            results.extend(batch_results);
        }

        results
    }
}

fn classify_payload(username: &str, known_jobs_applied: i64, payload: ApiPayload) -> StatsResult {
    if payload.status != "success" {
        return StatsResult::UserNotFound {
            username: username.to_string(),
        };
    }

    let mut stats = UserStats::zeroed(username, None);
    stats.easy = payload.easy_solved;
    stats.medium = payload.medium_solved;
    stats.hard = payload.hard_solved;
    stats.total = payload.total_solved;
    stats.jobs_applied = known_jobs_applied;
    stats.xp = progress::xp(stats.jobs_applied, stats.easy, stats.medium, stats.hard);
    StatsResult::Success(stats)
}

fn classify_error_body(username: &str, status: u16, body: &str) -> StatsResult {
    if let Ok(payload) = serde_json::from_str::<ApiPayload>(body) {
        let message = payload.message.to_lowercase();
        if message.contains("not exist") || message.contains("not found") {
            return StatsResult::UserNotFound {
                username: username.to_string(),
            };
        }
        if !payload.message.is_empty() {
            return StatsResult::TransientFailure {
                message: format!("stats source error {}: {}", status, payload.message),
            };
        }
    }
    StatsResult::TransientFailure {
        message: format!("stats source error {}", status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: &str) -> ApiPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn success_payload_builds_stats_with_xp() {
        let p = payload(
            r#"{"status":"success","totalSolved":10,"easySolved":7,"mediumSolved":2,"hardSolved":1}"#,
        );
        match classify_payload("alice", 2, p) {
            StatsResult::Success(stats) => {
                assert_eq!((stats.easy, stats.medium, stats.hard, stats.total), (7, 2, 1, 10));
                assert_eq!(stats.jobs_applied, 2);
                // 0.5*2 + 7 + 2*2 + 4*1
                assert_eq!(stats.xp, 16.0);
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn non_success_status_reads_as_not_found() {
        let p = payload(r#"{"status":"error","message":"something else"}"#);
        assert!(matches!(
            classify_payload("alice", 0, p),
            StatsResult::UserNotFound { .. }
        ));
    }

    #[test]
    fn missing_user_error_body_is_terminal() {
        let result = classify_error_body(
            "ghost",
            400,
            r#"{"status":"error","message":"User does not exist"}"#,
        );
        match result {
            StatsResult::UserNotFound { username } => assert_eq!(username, "ghost"),
            other => panic!("expected not-found, got {:?}", other),
        }
    }

    #[test]
    fn other_error_bodies_are_transient() {
        let result = classify_error_body(
            "alice",
            429,
            r#"{"status":"error","message":"too many requests"}"#,
        );
        match result {
            StatsResult::TransientFailure { message } => {
                assert!(message.contains("too many requests"));
            }
            other => panic!("expected transient, got {:?}", other),
        }
    }

    #[test]
    fn unparseable_error_body_is_transient() {
        assert!(matches!(
            classify_error_body("alice", 404, "<html>gateway</html>"),
            StatsResult::TransientFailure { .. }
        ));
    }

    #[test]
    #[ignore] // Requires network access
    fn fetch_against_live_api() {
        let client = StatsClient::from_env().expect("client");
        let result = client.fetch("nonexistent-user-grind-test", 0);
        assert!(matches!(
            result,
            StatsResult::UserNotFound { .. } | StatsResult::TransientFailure { .. }
        ));
    }
}
