use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

// Problem difficulty as tagged by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Unknown,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::Unknown => "unknown",
        }
    }

    // Anything unrecognized is stored as unknown rather than rejected
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "easy" | "e" => Difficulty::Easy,
            "medium" | "med" | "m" => Difficulty::Medium,
            "hard" | "h" => Difficulty::Hard,
            _ => Difficulty::Unknown,
        }
    }
}

/// A catalog problem as seen by the scheduler.
///
/// `text`, `difficulty`, `link` and `created_at` are carried through untouched;
/// only `times_reviewed` and `last_reviewed` feed the due score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewableItem {
    pub id: i64,
    pub text: String,
    pub difficulty: Difficulty,
    pub link: Option<String>,
    pub created_at: String,
    pub times_reviewed: i64,
    pub last_reviewed: Option<DateTime<Utc>>,
}

/// Review state produced by marking an item reviewed, ready to be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewState {
    pub id: i64,
    pub times_reviewed: i64,
    pub last_reviewed: DateTime<Utc>,
}

/// Parses a stored timestamp. Accepts RFC 3339 and SQLite's
/// `YYYY-MM-DD HH:MM:SS[.fff]` (taken as UTC). Returns `None` for anything else.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Normalizes a review count read from storage text. Non-numeric input counts as 0.
pub fn parse_review_count(raw: &str) -> i64 {
    let raw = raw.trim();
    raw.parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        .unwrap_or(0)
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
