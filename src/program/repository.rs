// Repository pattern - isolates all database side effects of the program lifecycle
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use thiserror::Error;

use crate::program::domain::*;
use crate::program::plan::generate_plan;
use crate::program::report::{self, ProgressReport};
use crate::state::DbPool;

/// Used when a user never set a daily time commitment.
pub const DEFAULT_DAILY_MINUTES: i64 = 30;

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("{0}")]
    NotFound(String),

    #[error("Access denied")]
    Forbidden,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),
}

/// Whether a sub-task is being checked or unchecked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Complete,
    Uncomplete,
}

#[async_trait]
pub trait ProgramRepository: Send + Sync {
    /// Create a 21-day program with all of its daily tasks, atomically.
    async fn create_program(
        &self,
        user_id: &str,
        area_id: &str,
        test_result_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ProgramSnapshot, ProgramError>;

    async fn get_program(&self, user_id: &str, program_id: &str)
        -> Result<ProgramSnapshot, ProgramError>;

    /// The program referenced by the user's `current_program_id`, if any.
    async fn current_program(&self, user_id: &str) -> Result<Option<ProgramSnapshot>, ProgramError>;

    async fn list_programs(&self, user_id: &str) -> Result<Vec<ProgramSnapshot>, ProgramError>;

    /// Every program in the system, newest first. Admin only.
    async fn list_all(&self, status: Option<ProgramStatus>)
        -> Result<Vec<ProgramSnapshot>, ProgramError>;

    async fn day(&self, user_id: &str, program_id: &str, day: i64) -> Result<DayView, ProgramError>;

    async fn daily_task(&self, user_id: &str, daily_task_id: &str) -> Result<DayView, ProgramError>;

    /// Explicitly set a sub-task's completion flag and apply day/program advancement.
    async fn set_subtask(
        &self,
        user_id: &str,
        daily_task_id: &str,
        subtask_id: &str,
        completion: Completion,
        now: DateTime<Utc>,
    ) -> Result<TaskUpdate, ProgramError>;

    async fn save_reflection(
        &self,
        user_id: &str,
        daily_task_id: &str,
        reflection: &str,
    ) -> Result<DayView, ProgramError>;

    async fn program_progress(
        &self,
        user_id: &str,
        program_id: &str,
    ) -> Result<ProgramProgress, ProgramError>;

    async fn progress_report(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ProgressReport, ProgramError>;

    /// Tasks for the program's `current_day`.
    async fn current_day_tasks(
        &self,
        user_id: &str,
        program_id: &str,
    ) -> Result<DayView, ProgramError> {
        let program = self.get_program(user_id, program_id).await?;
        self.day(user_id, program_id, program.current_day).await
    }

    async fn complete_current(
        &self,
        user_id: &str,
        program_id: &str,
        subtask_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TaskUpdate, ProgramError> {
        let day = self.current_day_tasks(user_id, program_id).await?;
        self.set_subtask(user_id, &day.id, subtask_id, Completion::Complete, now)
            .await
    }

    async fn uncomplete_current(
        &self,
        user_id: &str,
        program_id: &str,
        subtask_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TaskUpdate, ProgramError> {
        let day = self.current_day_tasks(user_id, program_id).await?;
        self.set_subtask(user_id, &day.id, subtask_id, Completion::Uncomplete, now)
            .await
    }
}

/// SQLite implementation
pub struct SqliteProgramRepository {
    pool: DbPool,
}

impl SqliteProgramRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgramRepository for SqliteProgramRepository {
    async fn create_program(
        &self,
        user_id: &str,
        area_id: &str,
        test_result_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ProgramSnapshot, ProgramError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (current_program_id, daily_minutes): (Option<String>, Option<i64>) = tx
            .query_row(
                "SELECT current_program_id, daily_time_commitment FROM users WHERE id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| ProgramError::NotFound("User not found".into()))?;

        let active: i64 = tx.query_row(
            "SELECT COUNT(*) FROM programs WHERE user_id = ?1 AND status = 'active'",
            params![user_id],
            |row| row.get(0),
        )?;
        if current_program_id.is_some() || active > 0 {
            return Err(ProgramError::Conflict(
                "User already has an active program".into(),
            ));
        }

        let (_, result_area, difficulty): (String, String, DifficultyLevel) = tx
            .query_row(
                "SELECT user_id, area_id, difficulty_level FROM test_results WHERE id = ?1",
                params![test_result_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
            .filter(|(owner, _, _)| owner == user_id)
            .ok_or_else(|| ProgramError::NotFound("Test result not found".into()))?;

        let area_exists: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM development_areas WHERE id = ?1",
            params![area_id],
            |row| row.get(0),
        )?;
        if !area_exists {
            return Err(ProgramError::NotFound("Development area not found".into()));
        }
        if result_area != area_id {
            return Err(ProgramError::BadRequest(
                "Test result belongs to a different development area".into(),
            ));
        }

        let daily_minutes = daily_minutes.unwrap_or(DEFAULT_DAILY_MINUTES);
        let program_id = uuid::Uuid::now_v7().to_string();
        let start = now.to_rfc3339();
        let end = (now + Duration::days(PROGRAM_DAYS)).to_rfc3339();

        tx.execute(
            "INSERT INTO programs (id, user_id, area_id, test_result_id, difficulty_level,
                start_date, end_date, status, current_day, total_progress, daily_time_commitment, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active', 1, 0, ?8, ?6)",
            params![
                program_id,
                user_id,
                area_id,
                test_result_id,
                difficulty,
                start,
                end,
                daily_minutes
            ],
        )?;

        {
            let mut insert_day = tx.prepare(
                "INSERT INTO daily_tasks (id, program_id, day_number) VALUES (?1, ?2, ?3)",
            )?;
            let mut insert_task = tx.prepare(
                "INSERT INTO daily_subtasks (id, daily_task_id, kind, content, duration_minutes, completed, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
            )?;
            for day in generate_plan(daily_minutes, difficulty) {
                let day_id = uuid::Uuid::now_v7().to_string();
                insert_day.execute(params![day_id, program_id, day.day_number])?;
                for task in &day.tasks {
                    insert_task.execute(params![
                        uuid::Uuid::now_v7().to_string(),
                        day_id,
                        task.kind,
                        task.content,
                        task.duration,
                        task.order
                    ])?;
                }
            }
        }

        tx.execute(
            "UPDATE users SET current_program_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![program_id, start, user_id],
        )?;

        let snapshot = load_program(&tx, &program_id)?
            .ok_or_else(|| ProgramError::NotFound("Program not found".into()))?;
        tx.commit()?;

        tracing::info!(
            "Created program {} for user {} ({}, {} min/day)",
            program_id,
            user_id,
            difficulty,
            daily_minutes
        );
        Ok(snapshot)
    }

    async fn get_program(
        &self,
        user_id: &str,
        program_id: &str,
    ) -> Result<ProgramSnapshot, ProgramError> {
        let conn = self.pool.get()?;
        let program = load_program(&conn, program_id)?
            .ok_or_else(|| ProgramError::NotFound("Program not found".into()))?;
        ensure_owner(&program, user_id)?;
        Ok(program)
    }

    async fn current_program(&self, user_id: &str) -> Result<Option<ProgramSnapshot>, ProgramError> {
        let conn = self.pool.get()?;
        match current_program_id(&conn, user_id)? {
            Some(id) => Ok(load_program(&conn, &id)?),
            None => Ok(None),
        }
    }

    async fn list_programs(&self, user_id: &str) -> Result<Vec<ProgramSnapshot>, ProgramError> {
        let conn = self.pool.get()?;
        let ids = {
            let mut stmt = conn.prepare(
                "SELECT id FROM programs WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        load_programs(&conn, &ids)
    }

    async fn list_all(
        &self,
        status: Option<ProgramStatus>,
    ) -> Result<Vec<ProgramSnapshot>, ProgramError> {
        let conn = self.pool.get()?;
        let ids = {
            let mut stmt = conn.prepare(
                "SELECT id FROM programs WHERE ?1 IS NULL OR status = ?1
                 ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt.query_map(params![status], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        load_programs(&conn, &ids)
    }

    async fn day(&self, user_id: &str, program_id: &str, day: i64) -> Result<DayView, ProgramError> {
        if !(1..=PROGRAM_DAYS).contains(&day) {
            return Err(ProgramError::BadRequest(format!(
                "Day must be between 1 and {}",
                PROGRAM_DAYS
            )));
        }
        let conn = self.pool.get()?;
        let program = load_program(&conn, program_id)?
            .ok_or_else(|| ProgramError::NotFound("Program not found".into()))?;
        ensure_owner(&program, user_id)?;

        let daily_task_id: String = conn
            .query_row(
                "SELECT id FROM daily_tasks WHERE program_id = ?1 AND day_number = ?2",
                params![program_id, day],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| ProgramError::NotFound("Daily task not found".into()))?;

        load_day(&conn, &daily_task_id)?
            .ok_or_else(|| ProgramError::NotFound("Daily task not found".into()))
    }

    async fn daily_task(&self, user_id: &str, daily_task_id: &str) -> Result<DayView, ProgramError> {
        let conn = self.pool.get()?;
        let day = load_day(&conn, daily_task_id)?
            .ok_or_else(|| ProgramError::NotFound("Daily task not found".into()))?;
        ensure_program_owner(&conn, &day.program_id, user_id)?;
        Ok(day)
    }

    async fn set_subtask(
        &self,
        user_id: &str,
        daily_task_id: &str,
        subtask_id: &str,
        completion: Completion,
        now: DateTime<Utc>,
    ) -> Result<TaskUpdate, ProgramError> {
        let mut conn = self.pool.get()?;
        // IMMEDIATE takes the write lock up front so concurrent completions serialize.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (program_id, day_number, day_completed_at): (String, i64, Option<String>) = tx
            .query_row(
                "SELECT program_id, day_number, completed_at FROM daily_tasks WHERE id = ?1",
                params![daily_task_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
            .ok_or_else(|| ProgramError::NotFound("Daily task not found".into()))?;

        let (owner, status, current_day): (String, ProgramStatus, i64) = tx.query_row(
            "SELECT user_id, status, current_day FROM programs WHERE id = ?1",
            params![program_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        if owner != user_id {
            return Err(ProgramError::Forbidden);
        }
        if status != ProgramStatus::Active {
            return Err(ProgramError::Conflict("Program is not active".into()));
        }
        if completion == Completion::Complete && day_number > current_day {
            return Err(ProgramError::BadRequest(format!(
                "Day {} is not unlocked yet",
                day_number
            )));
        }

        let flag = completion == Completion::Complete;
        let updated = tx.execute(
            "UPDATE daily_subtasks SET completed = ?1 WHERE id = ?2 AND daily_task_id = ?3",
            params![flag, subtask_id, daily_task_id],
        )?;
        if updated == 0 {
            return Err(ProgramError::NotFound("Task not found".into()));
        }

        let remaining: i64 = tx.query_row(
            "SELECT COUNT(*) FROM daily_subtasks WHERE daily_task_id = ?1 AND completed = 0",
            params![daily_task_id],
            |row| row.get(0),
        )?;

        let stamp = now.to_rfc3339();
        let mut day_completed = false;
        let mut program_completed = false;

        match completion {
            Completion::Complete if remaining == 0 && day_completed_at.is_none() => {
                day_completed = true;
                tx.execute(
                    "UPDATE daily_tasks SET completed_at = ?1 WHERE id = ?2 AND completed_at IS NULL",
                    params![stamp, daily_task_id],
                )?;
                tx.execute(
                    "INSERT OR IGNORE INTO program_completed_days (program_id, day_number, completed_at)
                     VALUES (?1, ?2, ?3)",
                    params![program_id, day_number, stamp],
                )?;
                // Only the day currently in progress moves the program forward.
                tx.execute(
                    "UPDATE programs SET current_day = MIN(current_day + 1, ?1)
                     WHERE id = ?2 AND current_day = ?3",
                    params![PROGRAM_DAYS, program_id, day_number],
                )?;
                let completed = refresh_progress(&tx, &program_id)?;
                record_active_day(&tx, user_id, now.date_naive())?;

                if completed >= PROGRAM_DAYS {
                    finish_program(&tx, user_id, &program_id, &stamp)?;
                    program_completed = true;
                }
            }
            Completion::Uncomplete if day_completed_at.is_some() => {
                tx.execute(
                    "UPDATE daily_tasks SET completed_at = NULL WHERE id = ?1",
                    params![daily_task_id],
                )?;
                tx.execute(
                    "DELETE FROM program_completed_days WHERE program_id = ?1 AND day_number = ?2",
                    params![program_id, day_number],
                )?;
                tx.execute(
                    "UPDATE users SET total_days = MAX(total_days - 1, 0) WHERE id = ?1",
                    params![user_id],
                )?;
                refresh_progress(&tx, &program_id)?;
            }
            _ => {}
        }

        let day = load_day(&tx, daily_task_id)?
            .ok_or_else(|| ProgramError::NotFound("Daily task not found".into()))?;
        let program = load_program(&tx, &program_id)?
            .ok_or_else(|| ProgramError::NotFound("Program not found".into()))?;
        tx.commit()?;

        if day_completed {
            tracing::info!(
                "Program {} day {} completed ({}%)",
                program_id,
                day_number,
                program.total_progress
            );
        }
        if program_completed {
            tracing::info!("Program {} completed by user {}", program_id, user_id);
        }

        Ok(TaskUpdate {
            day,
            program,
            day_completed,
            program_completed,
        })
    }

    async fn save_reflection(
        &self,
        user_id: &str,
        daily_task_id: &str,
        reflection: &str,
    ) -> Result<DayView, ProgramError> {
        let conn = self.pool.get()?;
        let program_id: String = conn
            .query_row(
                "SELECT program_id FROM daily_tasks WHERE id = ?1",
                params![daily_task_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| ProgramError::NotFound("Daily task not found".into()))?;
        ensure_program_owner(&conn, &program_id, user_id)?;

        conn.execute(
            "UPDATE daily_tasks SET reflection = ?1 WHERE id = ?2",
            params![reflection, daily_task_id],
        )?;

        load_day(&conn, daily_task_id)?
            .ok_or_else(|| ProgramError::NotFound("Daily task not found".into()))
    }

    async fn program_progress(
        &self,
        user_id: &str,
        program_id: &str,
    ) -> Result<ProgramProgress, ProgramError> {
        let conn = self.pool.get()?;
        let program = load_program(&conn, program_id)?
            .ok_or_else(|| ProgramError::NotFound("Program not found".into()))?;
        ensure_owner(&program, user_id)?;

        let (total_tasks, completed_tasks) = subtask_counts(&conn, program_id)?;
        let days_remaining = PROGRAM_DAYS - program.completed_days.len() as i64;

        Ok(ProgramProgress {
            program_id: program.id,
            current_day: program.current_day,
            completed_days: program.completed_days,
            total_progress: program.total_progress,
            status: program.status,
            total_tasks,
            completed_tasks,
            days_remaining,
        })
    }

    async fn progress_report(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ProgressReport, ProgramError> {
        let conn = self.pool.get()?;

        let (current_program_id, streak, longest_streak, total_days): (Option<String>, i64, i64, i64) =
            conn.query_row(
                "SELECT current_program_id, streak, longest_streak, total_days FROM users WHERE id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?
            .ok_or_else(|| ProgramError::NotFound("User not found".into()))?;

        let current_program = match current_program_id {
            Some(id) => load_program(&conn, &id)?,
            None => None,
        };

        let (total_tasks, completed_tasks): (i64, i64) = match &current_program {
            Some(program) => conn.query_row(
                "SELECT COUNT(*), COUNT(completed_at) FROM daily_tasks WHERE program_id = ?1",
                params![program.id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?,
            None => (0, 0),
        };

        let completed_programs: i64 = conn.query_row(
            "SELECT COUNT(*) FROM user_completed_programs WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;

        let completions = {
            let mut stmt = conn.prepare(
                "SELECT dt.completed_at FROM daily_tasks dt
                 JOIN programs p ON p.id = dt.program_id
                 WHERE p.user_id = ?1 AND dt.completed_at IS NOT NULL",
            )?;
            let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
                .iter()
                .filter_map(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .collect::<Vec<_>>()
        };

        Ok(ProgressReport {
            current_program,
            total_tasks,
            completed_tasks,
            completion_rate: report::completion_rate(completed_tasks, total_tasks),
            streak,
            longest_streak,
            total_days,
            completed_programs,
            weekly: report::weekly_series(&completions, now),
            monthly: report::monthly_series(&completions, now),
        })
    }
}

fn ensure_owner(program: &ProgramSnapshot, user_id: &str) -> Result<(), ProgramError> {
    if program.user_id == user_id {
        Ok(())
    } else {
        Err(ProgramError::Forbidden)
    }
}

fn ensure_program_owner(conn: &Connection, program_id: &str, user_id: &str) -> Result<(), ProgramError> {
    let owner: String = conn
        .query_row(
            "SELECT user_id FROM programs WHERE id = ?1",
            params![program_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| ProgramError::NotFound("Program not found".into()))?;
    if owner == user_id {
        Ok(())
    } else {
        Err(ProgramError::Forbidden)
    }
}

fn current_program_id(conn: &Connection, user_id: &str) -> Result<Option<String>, ProgramError> {
    let id: Option<Option<String>> = conn
        .query_row(
            "SELECT current_program_id FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;
    id.ok_or_else(|| ProgramError::NotFound("User not found".into()))
}

/// Recompute `total_progress` from the completed-days set and return the set's size.
fn refresh_progress(conn: &Connection, program_id: &str) -> Result<i64, ProgramError> {
    let completed: i64 = conn.query_row(
        "SELECT COUNT(*) FROM program_completed_days WHERE program_id = ?1",
        params![program_id],
        |row| row.get(0),
    )?;
    conn.execute(
        "UPDATE programs SET total_progress = ?1 WHERE id = ?2",
        params![progress_percent(completed), program_id],
    )?;
    Ok(completed)
}

fn record_active_day(conn: &Connection, user_id: &str, today: NaiveDate) -> Result<(), ProgramError> {
    let (last_active, streak, longest): (Option<String>, i64, i64) = conn.query_row(
        "SELECT last_active_date, streak, longest_streak FROM users WHERE id = ?1",
        params![user_id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    let last_active = last_active.and_then(|d| d.parse::<NaiveDate>().ok());
    let streak = next_streak(last_active, today, streak);

    conn.execute(
        "UPDATE users SET streak = ?1, longest_streak = ?2, total_days = total_days + 1,
            last_active_date = ?3
         WHERE id = ?4",
        params![streak, longest.max(streak), today.to_string(), user_id],
    )?;
    Ok(())
}

fn finish_program(
    conn: &Connection,
    user_id: &str,
    program_id: &str,
    stamp: &str,
) -> Result<(), ProgramError> {
    conn.execute(
        "UPDATE programs SET status = 'completed', completed_at = ?1
         WHERE id = ?2 AND status = 'active'",
        params![stamp, program_id],
    )?;
    conn.execute(
        "UPDATE users SET current_program_id = NULL, updated_at = ?1
         WHERE id = ?2 AND current_program_id = ?3",
        params![stamp, user_id, program_id],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO user_completed_programs (user_id, program_id, completed_at)
         VALUES (?1, ?2, ?3)",
        params![user_id, program_id, stamp],
    )?;
    Ok(())
}

fn subtask_counts(conn: &Connection, program_id: &str) -> Result<(i64, i64), ProgramError> {
    let counts = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(s.completed), 0) FROM daily_subtasks s
         JOIN daily_tasks d ON d.id = s.daily_task_id
         WHERE d.program_id = ?1",
        params![program_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(counts)
}

pub(crate) fn load_program(
    conn: &Connection,
    program_id: &str,
) -> Result<Option<ProgramSnapshot>, ProgramError> {
    let program = conn
        .query_row(
            "SELECT id, user_id, area_id, test_result_id, difficulty_level, start_date, end_date,
                    status, current_day, total_progress, daily_time_commitment, completed_at
             FROM programs WHERE id = ?1",
            params![program_id],
            |row| {
                Ok(ProgramSnapshot {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    development_area_id: row.get(2)?,
                    test_result_id: row.get(3)?,
                    difficulty_level: row.get(4)?,
                    start_date: row.get(5)?,
                    end_date: row.get(6)?,
                    status: row.get(7)?,
                    current_day: row.get(8)?,
                    completed_days: Vec::new(),
                    total_progress: row.get(9)?,
                    daily_time_commitment: row.get(10)?,
                    completed_at: row.get(11)?,
                })
            },
        )
        .optional()?;

    let Some(mut program) = program else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT day_number FROM program_completed_days WHERE program_id = ?1 ORDER BY day_number",
    )?;
    program.completed_days = stmt
        .query_map(params![program_id], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;

    Ok(Some(program))
}

fn load_programs(conn: &Connection, ids: &[String]) -> Result<Vec<ProgramSnapshot>, ProgramError> {
    let mut programs = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(program) = load_program(conn, id)? {
            programs.push(program);
        }
    }
    Ok(programs)
}

fn load_day(conn: &Connection, daily_task_id: &str) -> Result<Option<DayView>, ProgramError> {
    let day = conn
        .query_row(
            "SELECT id, program_id, day_number, reflection, completed_at FROM daily_tasks WHERE id = ?1",
            params![daily_task_id],
            |row| {
                Ok(DayView {
                    id: row.get(0)?,
                    program_id: row.get(1)?,
                    day_number: row.get(2)?,
                    tasks: Vec::new(),
                    reflection: row.get(3)?,
                    completed_at: row.get(4)?,
                })
            },
        )
        .optional()?;

    let Some(mut day) = day else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT id, kind, content, duration_minutes, completed, position
         FROM daily_subtasks WHERE daily_task_id = ?1 ORDER BY position",
    )?;
    day.tasks = stmt
        .query_map(params![daily_task_id], |row| {
            Ok(SubTask {
                id: row.get(0)?,
                kind: row.get(1)?,
                content: row.get(2)?,
                duration: row.get(3)?,
                completed: row.get(4)?,
                order: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(day))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing;
    use chrono::TimeZone;

    struct Fixture {
        pool: DbPool,
        repo: SqliteProgramRepository,
        user: String,
        area: String,
        result: String,
    }

    fn fixture(level: &str) -> Fixture {
        let pool = testing::migrated_pool();
        let user = testing::insert_user(&pool, "alice@example.com", Some(30));
        let area = testing::area_id(&pool, "fitness");
        let result = testing::insert_test_result(&pool, &user, &area, level, start());
        let repo = SqliteProgramRepository::new(pool.clone());
        Fixture {
            pool,
            repo,
            user,
            area,
            result,
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    async fn complete_day(f: &Fixture, program_id: &str, day: i64, at: DateTime<Utc>) -> TaskUpdate {
        let view = f.repo.day(&f.user, program_id, day).await.unwrap();
        let mut last = None;
        for task in &view.tasks {
            last = Some(
                f.repo
                    .set_subtask(&f.user, &view.id, &task.id, Completion::Complete, at)
                    .await
                    .unwrap(),
            );
        }
        last.unwrap()
    }

    fn count(pool: &DbPool, sql: &str) -> i64 {
        pool.get().unwrap().query_row(sql, [], |r| r.get(0)).unwrap()
    }

    #[tokio::test]
    async fn create_program_builds_full_plan() {
        let f = fixture("beginner");
        let program = f
            .repo
            .create_program(&f.user, &f.area, &f.result, start())
            .await
            .unwrap();

        assert_eq!(program.current_day, 1);
        assert_eq!(program.status, ProgramStatus::Active);
        assert!(program.completed_days.is_empty());
        assert_eq!(program.total_progress, 0);
        assert_eq!(program.daily_time_commitment, 30);
        assert_eq!(count(&f.pool, "SELECT COUNT(*) FROM daily_tasks"), 21);
        assert_eq!(count(&f.pool, "SELECT COUNT(*) FROM daily_subtasks"), 84);

        let day1 = f.repo.day(&f.user, &program.id, 1).await.unwrap();
        assert_eq!(day1.tasks[0].kind, TaskKind::Reading);
        assert_eq!(day1.tasks[0].duration, 12);

        let current = f.repo.current_program(&f.user).await.unwrap().unwrap();
        assert_eq!(current.id, program.id);
    }

    #[tokio::test]
    async fn current_day_helpers_follow_advancement() {
        let f = fixture("beginner");
        let program = f
            .repo
            .create_program(&f.user, &f.area, &f.result, start())
            .await
            .unwrap();

        let day1 = f.repo.current_day_tasks(&f.user, &program.id).await.unwrap();
        assert_eq!(day1.day_number, 1);

        let mut last = None;
        for task in &day1.tasks {
            last = Some(
                f.repo
                    .complete_current(&f.user, &program.id, &task.id, start())
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(last.unwrap().program.current_day, 2);

        let day2 = f.repo.current_day_tasks(&f.user, &program.id).await.unwrap();
        assert_eq!(day2.day_number, 2);

        // Day 1 tasks are no longer addressable through the current day
        let err = f
            .repo
            .uncomplete_current(&f.user, &program.id, &day1.tasks[0].id, start())
            .await
            .unwrap_err();
        assert!(matches!(err, ProgramError::NotFound(_)));
    }

    #[tokio::test]
    async fn second_program_conflicts_without_writing_tasks() {
        let f = fixture("beginner");
        f.repo
            .create_program(&f.user, &f.area, &f.result, start())
            .await
            .unwrap();

        let err = f
            .repo
            .create_program(&f.user, &f.area, &f.result, start())
            .await
            .unwrap_err();
        assert!(matches!(err, ProgramError::Conflict(_)));
        assert_eq!(count(&f.pool, "SELECT COUNT(*) FROM programs"), 1);
        assert_eq!(count(&f.pool, "SELECT COUNT(*) FROM daily_tasks"), 21);
    }

    #[tokio::test]
    async fn create_program_rejects_foreign_or_mismatched_result() {
        let f = fixture("beginner");
        let other = testing::insert_user(&f.pool, "bob@example.com", Some(30));
        let err = f
            .repo
            .create_program(&other, &f.area, &f.result, start())
            .await
            .unwrap_err();
        assert!(matches!(err, ProgramError::NotFound(_)));

        let mindfulness = testing::area_id(&f.pool, "mindfulness");
        let err = f
            .repo
            .create_program(&f.user, &mindfulness, &f.result, start())
            .await
            .unwrap_err();
        assert!(matches!(err, ProgramError::BadRequest(_)));
        assert_eq!(count(&f.pool, "SELECT COUNT(*) FROM programs"), 0);
    }

    #[tokio::test]
    async fn completing_day_one_advances_program() {
        let f = fixture("beginner");
        let program = f
            .repo
            .create_program(&f.user, &f.area, &f.result, start())
            .await
            .unwrap();

        let update = complete_day(&f, &program.id, 1, start()).await;
        assert!(update.day_completed);
        assert!(!update.program_completed);
        assert!(update.day.completed_at.is_some());
        assert_eq!(update.program.completed_days, vec![1]);
        assert_eq!(update.program.current_day, 2);
        assert_eq!(update.program.total_progress, 5);
    }

    #[tokio::test]
    async fn partial_day_does_not_advance() {
        let f = fixture("beginner");
        let program = f
            .repo
            .create_program(&f.user, &f.area, &f.result, start())
            .await
            .unwrap();
        let day = f.repo.day(&f.user, &program.id, 1).await.unwrap();

        let update = f
            .repo
            .set_subtask(&f.user, &day.id, &day.tasks[0].id, Completion::Complete, start())
            .await
            .unwrap();
        assert!(!update.day_completed);
        assert!(update.day.tasks[0].completed);
        assert_eq!(update.program.current_day, 1);
        assert_eq!(update.program.total_progress, 0);
    }

    #[tokio::test]
    async fn completion_is_idempotent() {
        let f = fixture("beginner");
        let program = f
            .repo
            .create_program(&f.user, &f.area, &f.result, start())
            .await
            .unwrap();
        complete_day(&f, &program.id, 1, start()).await;

        // Re-completing every task of an already completed day changes nothing.
        let update = complete_day(&f, &program.id, 1, start()).await;
        assert!(!update.day_completed);
        assert_eq!(update.program.completed_days, vec![1]);
        assert_eq!(update.program.current_day, 2);
        assert_eq!(update.program.total_progress, 5);
    }

    #[tokio::test]
    async fn uncomplete_removes_day_but_keeps_current_day() {
        let f = fixture("beginner");
        let program = f
            .repo
            .create_program(&f.user, &f.area, &f.result, start())
            .await
            .unwrap();
        let done = complete_day(&f, &program.id, 1, start()).await;

        let update = f
            .repo
            .set_subtask(
                &f.user,
                &done.day.id,
                &done.day.tasks[1].id,
                Completion::Uncomplete,
                start(),
            )
            .await
            .unwrap();
        assert!(!update.day.tasks[1].completed);
        assert!(update.day.completed_at.is_none());
        assert!(update.program.completed_days.is_empty());
        assert_eq!(update.program.total_progress, 0);
        assert_eq!(update.program.current_day, 2);

        // Completing it again records the day without advancing past day 2.
        let update = f
            .repo
            .set_subtask(
                &f.user,
                &done.day.id,
                &done.day.tasks[1].id,
                Completion::Complete,
                start(),
            )
            .await
            .unwrap();
        assert!(update.day_completed);
        assert_eq!(update.program.completed_days, vec![1]);
        assert_eq!(update.program.current_day, 2);
    }

    #[tokio::test]
    async fn future_days_are_locked() {
        let f = fixture("beginner");
        let program = f
            .repo
            .create_program(&f.user, &f.area, &f.result, start())
            .await
            .unwrap();
        let day3 = f.repo.day(&f.user, &program.id, 3).await.unwrap();
        let err = f
            .repo
            .set_subtask(&f.user, &day3.id, &day3.tasks[0].id, Completion::Complete, start())
            .await
            .unwrap_err();
        assert!(matches!(err, ProgramError::BadRequest(_)));
    }

    #[tokio::test]
    async fn other_users_are_denied() {
        let f = fixture("beginner");
        let program = f
            .repo
            .create_program(&f.user, &f.area, &f.result, start())
            .await
            .unwrap();
        let mallory = testing::insert_user(&f.pool, "mallory@example.com", Some(30));
        let day = f.repo.day(&f.user, &program.id, 1).await.unwrap();

        let err = f
            .repo
            .set_subtask(&mallory, &day.id, &day.tasks[0].id, Completion::Complete, start())
            .await
            .unwrap_err();
        assert!(matches!(err, ProgramError::Forbidden));
        assert!(matches!(
            f.repo.get_program(&mallory, &program.id).await,
            Err(ProgramError::Forbidden)
        ));
        assert!(matches!(
            f.repo.save_reflection(&mallory, &day.id, "mine now").await,
            Err(ProgramError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn subtask_must_belong_to_day() {
        let f = fixture("beginner");
        let program = f
            .repo
            .create_program(&f.user, &f.area, &f.result, start())
            .await
            .unwrap();
        let day1 = f.repo.day(&f.user, &program.id, 1).await.unwrap();
        let day2 = f.repo.day(&f.user, &program.id, 2).await.unwrap();
        let err = f
            .repo
            .set_subtask(&f.user, &day1.id, &day2.tasks[0].id, Completion::Complete, start())
            .await
            .unwrap_err();
        assert!(matches!(err, ProgramError::NotFound(_)));
    }

    #[tokio::test]
    async fn finishing_all_days_completes_program() {
        let f = fixture("intermediate");
        let program = f
            .repo
            .create_program(&f.user, &f.area, &f.result, start())
            .await
            .unwrap();

        let mut last_day = 0;
        let mut update = None;
        for day in 1..=PROGRAM_DAYS {
            let u = complete_day(&f, &program.id, day, start() + Duration::days(day - 1)).await;
            assert!(u.program.current_day >= last_day);
            assert!(u.program.current_day <= PROGRAM_DAYS);
            assert_eq!(
                u.program.total_progress,
                progress_percent(u.program.completed_days.len() as i64)
            );
            last_day = u.program.current_day;
            update = Some(u);
        }

        let update = update.unwrap();
        assert!(update.program_completed);
        assert_eq!(update.program.status, ProgramStatus::Completed);
        assert_eq!(update.program.total_progress, 100);
        assert_eq!(update.program.current_day, 21);
        assert!(f.repo.current_program(&f.user).await.unwrap().is_none());
        assert_eq!(
            count(&f.pool, "SELECT COUNT(*) FROM user_completed_programs"),
            1
        );

        let report = f
            .repo
            .progress_report(&f.user, start() + Duration::days(20))
            .await
            .unwrap();
        assert_eq!(report.streak, 21);
        assert_eq!(report.longest_streak, 21);
        assert_eq!(report.total_days, 21);
        assert_eq!(report.completed_programs, 1);

        // A completed program can no longer be edited.
        let day = f.repo.day(&f.user, &program.id, 21).await.unwrap();
        let err = f
            .repo
            .set_subtask(&f.user, &day.id, &day.tasks[0].id, Completion::Uncomplete, start())
            .await
            .unwrap_err();
        assert!(matches!(err, ProgramError::Conflict(_)));

        // And a new program can be started.
        let next = testing::insert_test_result(&f.pool, &f.user, &f.area, "advanced", start());
        f.repo
            .create_program(&f.user, &f.area, &next, start() + Duration::days(22))
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_completions_advance_one_day_at_a_time() {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = crate::db::create_pool(&dir.path().join("growpath.db")).unwrap();
        crate::db::run_migrations(&pool).unwrap();
        let user = testing::insert_user(&pool, "busy@example.com", Some(30));
        let area = testing::area_id(&pool, "fitness");
        let result = testing::insert_test_result(&pool, &user, &area, "beginner", start());
        let repo = std::sync::Arc::new(SqliteProgramRepository::new(pool.clone()));

        let program = repo
            .create_program(&user, &area, &result, start())
            .await
            .unwrap();

        for day in 1..=PROGRAM_DAYS {
            let view = repo.day(&user, &program.id, day).await.unwrap();
            let at = start() + Duration::days(day - 1);

            let mut handles = Vec::new();
            for task in &view.tasks {
                for _ in 0..3 {
                    let repo = repo.clone();
                    let user = user.clone();
                    let day_id = view.id.clone();
                    let task_id = task.id.clone();
                    handles.push(tokio::spawn(async move {
                        repo.set_subtask(&user, &day_id, &task_id, Completion::Complete, at)
                            .await
                    }));
                }
            }
            assert_eq!(handles.len(), 12);
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(_) => {}
                    // Writers that lose the race on the last day see a finished program
                    Err(ProgramError::Conflict(_)) if day == PROGRAM_DAYS => {}
                    Err(e) => panic!("day {}: {}", day, e),
                }
            }

            let snapshot = repo.get_program(&user, &program.id).await.unwrap();
            assert_eq!(snapshot.completed_days.len() as i64, day);
            assert_eq!(snapshot.current_day, (day + 1).min(PROGRAM_DAYS));
            assert_eq!(snapshot.total_progress, progress_percent(day));
        }

        let finished = repo.get_program(&user, &program.id).await.unwrap();
        assert_eq!(finished.status, ProgramStatus::Completed);
        assert_eq!(finished.total_progress, 100);
        assert_eq!(count(&pool, "SELECT total_days FROM users"), 21);
        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM user_completed_programs"),
            1
        );
    }

    #[tokio::test]
    async fn progress_report_aggregates_real_completions() {
        let f = fixture("beginner");
        let program = f
            .repo
            .create_program(&f.user, &f.area, &f.result, start())
            .await
            .unwrap();
        complete_day(&f, &program.id, 1, start()).await;
        complete_day(&f, &program.id, 2, start() + Duration::days(1)).await;
        complete_day(&f, &program.id, 3, start() + Duration::days(4)).await;

        let now = start() + Duration::days(4);
        let report = f.repo.progress_report(&f.user, now).await.unwrap();
        assert_eq!(report.total_tasks, 21);
        assert_eq!(report.completed_tasks, 3);
        assert_eq!(report.completion_rate, 14);
        assert_eq!(report.streak, 1);
        assert_eq!(report.longest_streak, 2);
        assert_eq!(report.weekly.iter().map(|b| b.completed_days).sum::<i64>(), 3);
        assert_eq!(report.weekly.last().unwrap().completed_days, 1);
        assert_eq!(report.monthly.last().unwrap().month, "2024-03");
        assert_eq!(report.monthly.last().unwrap().completed_days, 3);

        let progress = f.repo.program_progress(&f.user, &program.id).await.unwrap();
        assert_eq!(progress.completed_tasks, 12);
        assert_eq!(progress.total_tasks, 84);
        assert_eq!(progress.days_remaining, 18);
    }

    #[tokio::test]
    async fn day_outside_range_is_rejected() {
        let f = fixture("beginner");
        let program = f
            .repo
            .create_program(&f.user, &f.area, &f.result, start())
            .await
            .unwrap();
        assert!(matches!(
            f.repo.day(&f.user, &program.id, 22).await,
            Err(ProgramError::BadRequest(_))
        ));
        assert!(matches!(
            f.repo.day(&f.user, &program.id, 0).await,
            Err(ProgramError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn reflection_is_saved() {
        let f = fixture("beginner");
        let program = f
            .repo
            .create_program(&f.user, &f.area, &f.result, start())
            .await
            .unwrap();
        let day = f.repo.day(&f.user, &program.id, 1).await.unwrap();
        let saved = f
            .repo
            .save_reflection(&f.user, &day.id, "Felt great")
            .await
            .unwrap();
        assert_eq!(saved.reflection.as_deref(), Some("Felt great"));
    }
}
