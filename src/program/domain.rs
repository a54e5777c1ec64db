// Domain types - pure, no database access
use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of every program, in days.
pub const PROGRAM_DAYS: i64 = 21;

/// Placement level derived from a quiz score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl DifficultyLevel {
    /// Under 40% is beginner, under 70% intermediate, anything else advanced.
    pub fn from_score(score: i64, max_score: i64) -> Self {
        if max_score <= 0 {
            return DifficultyLevel::Beginner;
        }
        let percent = score as f64 / max_score as f64 * 100.0;
        if percent < 40.0 {
            DifficultyLevel::Beginner
        } else if percent < 70.0 {
            DifficultyLevel::Intermediate
        } else {
            DifficultyLevel::Advanced
        }
    }

    pub fn multiplier(self) -> f64 {
        match self {
            DifficultyLevel::Beginner => 1.0,
            DifficultyLevel::Intermediate => 1.5,
            DifficultyLevel::Advanced => 2.0,
        }
    }

    pub fn tier(self) -> usize {
        match self {
            DifficultyLevel::Beginner => 0,
            DifficultyLevel::Intermediate => 1,
            DifficultyLevel::Advanced => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DifficultyLevel::Beginner => "beginner",
            DifficultyLevel::Intermediate => "intermediate",
            DifficultyLevel::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgramStatus {
    Active,
    Completed,
    Paused,
}

impl ProgramStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgramStatus::Active => "active",
            ProgramStatus::Completed => "completed",
            ProgramStatus::Paused => "paused",
        }
    }
}

/// The four kinds of sub-task every day carries, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Reading,
    Exercise,
    Practice,
    Reflection,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::Reading,
        TaskKind::Exercise,
        TaskKind::Practice,
        TaskKind::Reflection,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Reading => "reading",
            TaskKind::Exercise => "exercise",
            TaskKind::Practice => "practice",
            TaskKind::Reflection => "reflection",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value: {}", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

macro_rules! text_enum {
    ($ty:ty, [$($variant:expr),+]) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                [$($variant),+]
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| UnknownVariant(s.to_string()))
            }
        }

        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum!(
    DifficultyLevel,
    [
        DifficultyLevel::Beginner,
        DifficultyLevel::Intermediate,
        DifficultyLevel::Advanced
    ]
);
text_enum!(
    ProgramStatus,
    [
        ProgramStatus::Active,
        ProgramStatus::Completed,
        ProgramStatus::Paused
    ]
);
text_enum!(
    TaskKind,
    [
        TaskKind::Reading,
        TaskKind::Exercise,
        TaskKind::Practice,
        TaskKind::Reflection
    ]
);

/// `round(completed / 21 * 100)`, clamped to 0..=100.
pub fn progress_percent(completed_days: i64) -> i64 {
    let completed = completed_days.clamp(0, PROGRAM_DAYS);
    (completed as f64 / PROGRAM_DAYS as f64 * 100.0).round() as i64
}

/// Streak value after a day is completed on `today`.
///
/// Same day keeps the streak, the next calendar day extends it, any gap restarts at 1.
pub fn next_streak(last_active: Option<NaiveDate>, today: NaiveDate, streak: i64) -> i64 {
    match last_active {
        Some(last) if last == today => streak.max(1),
        Some(last) if last.succ_opt() == Some(today) => streak + 1,
        _ => 1,
    }
}

/// A program as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramSnapshot {
    pub id: String,
    pub user_id: String,
    pub development_area_id: String,
    pub test_result_id: Option<String>,
    pub difficulty_level: DifficultyLevel,
    pub start_date: String,
    pub end_date: String,
    pub status: ProgramStatus,
    pub current_day: i64,
    pub completed_days: Vec<i64>,
    pub total_progress: i64,
    pub daily_time_commitment: i64,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTask {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub content: String,
    pub duration: i64,
    pub completed: bool,
    pub order: i64,
}

/// One day of a program with its sub-tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayView {
    pub id: String,
    pub program_id: String,
    pub day_number: i64,
    pub tasks: Vec<SubTask>,
    pub reflection: Option<String>,
    pub completed_at: Option<String>,
}

/// Result of a Task Tracker write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub day: DayView,
    pub program: ProgramSnapshot,
    pub day_completed: bool,
    pub program_completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramProgress {
    pub program_id: String,
    pub current_day: i64,
    pub completed_days: Vec<i64>,
    pub total_progress: i64,
    pub status: ProgramStatus,
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub days_remaining: i64,
}
