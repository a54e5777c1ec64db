//! Daily plan generation for a new program.
//!
//! Durations are fractions of the user's daily time commitment scaled by the
//! difficulty multiplier; practice also grows with the day number. Content is
//! a fixed lookup keyed by task kind and `min(difficulty tier + progress quartile, 4)`.

use crate::program::domain::{DifficultyLevel, TaskKind, PROGRAM_DAYS};

const READING_SHARE: f64 = 0.40;
const EXERCISE_SHARE: f64 = 0.15;
const PRACTICE_SHARE: f64 = 0.10;
const REFLECTION_SHARE: f64 = 0.10;

pub const CONTENT_LEVELS: usize = 5;

const READING: [&str; CONTENT_LEVELS] = [
    "Read an introductory article on the fundamentals of this area",
    "Read a chapter on building habits that stick",
    "Study a case study of someone who mastered this skill",
    "Read research on advanced techniques and summarize the key findings",
    "Read a primary source or expert text and write down three ideas to apply",
];

const EXERCISE: [&str; CONTENT_LEVELS] = [
    "Complete a short warm-up exercise to build the routine",
    "Do a guided exercise focusing on one core technique",
    "Work through a structured exercise set with increasing difficulty",
    "Complete a challenging exercise without guidance",
    "Design and complete your own exercise targeting a weak spot",
];

const PRACTICE: [&str; CONTENT_LEVELS] = [
    "Practice the basic technique from today's reading",
    "Apply today's technique in a real situation",
    "Combine two techniques you have learned so far in one session",
    "Practice under time pressure or with added constraints",
    "Teach or demonstrate the skill to someone else",
];

const REFLECTION: [&str; CONTENT_LEVELS] = [
    "Write down one thing you learned today",
    "Note what felt easy and what felt hard today",
    "Compare today's session with the first day of the program",
    "Identify an obstacle and plan how to handle it tomorrow",
    "Write a letter to yourself about the progress you have made",
];

/// A sub-task before it is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTask {
    pub kind: TaskKind,
    pub content: &'static str,
    pub duration: i64,
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayPlan {
    pub day_number: i64,
    pub tasks: Vec<PlannedTask>,
}

impl DayPlan {
    pub fn total_minutes(&self) -> i64 {
        self.tasks.iter().map(|t| t.duration).sum()
    }
}

/// 0..=3 depending on how far into the program `day` is.
pub fn progress_quartile(day: i64) -> usize {
    let day = day.clamp(1, PROGRAM_DAYS);
    ((day - 1) * 4 / PROGRAM_DAYS) as usize
}

pub fn content_index(tier: usize, quartile: usize) -> usize {
    (tier + quartile).min(CONTENT_LEVELS - 1)
}

pub fn content_for(kind: TaskKind, index: usize) -> &'static str {
    let table = match kind {
        TaskKind::Reading => &READING,
        TaskKind::Exercise => &EXERCISE,
        TaskKind::Practice => &PRACTICE,
        TaskKind::Reflection => &REFLECTION,
    };
    table[index.min(CONTENT_LEVELS - 1)]
}

pub fn duration_for(kind: TaskKind, day: i64, daily_minutes: i64, difficulty: DifficultyLevel) -> i64 {
    let budget = daily_minutes as f64 * difficulty.multiplier();
    let share = match kind {
        TaskKind::Reading => READING_SHARE,
        TaskKind::Exercise => EXERCISE_SHARE,
        TaskKind::Practice => PRACTICE_SHARE * (1.0 + day as f64 / PROGRAM_DAYS as f64),
        TaskKind::Reflection => REFLECTION_SHARE,
    };
    ((budget * share).round() as i64).max(1)
}

pub fn plan_day(day: i64, daily_minutes: i64, difficulty: DifficultyLevel) -> DayPlan {
    let index = content_index(difficulty.tier(), progress_quartile(day));
    let tasks = TaskKind::ALL
        .iter()
        .enumerate()
        .map(|(order, &kind)| PlannedTask {
            kind,
            content: content_for(kind, index),
            duration: duration_for(kind, day, daily_minutes, difficulty),
            order: order as i64,
        })
        .collect();

    DayPlan {
        day_number: day,
        tasks,
    }
}

/// The full 21-day plan.
pub fn generate_plan(daily_minutes: i64, difficulty: DifficultyLevel) -> Vec<DayPlan> {
    (1..=PROGRAM_DAYS)
        .map(|day| plan_day(day, daily_minutes, difficulty))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEVELS: [DifficultyLevel; 3] = [
        DifficultyLevel::Beginner,
        DifficultyLevel::Intermediate,
        DifficultyLevel::Advanced,
    ];

    #[test]
    fn plan_has_21_days_of_4_tasks() {
        let plan = generate_plan(30, DifficultyLevel::Beginner);
        assert_eq!(plan.len(), 21);
        for (i, day) in plan.iter().enumerate() {
            assert_eq!(day.day_number, i as i64 + 1);
            let kinds: Vec<TaskKind> = day.tasks.iter().map(|t| t.kind).collect();
            assert_eq!(kinds, TaskKind::ALL.to_vec());
        }
    }

    #[test]
    fn beginner_day_one_reading_is_twelve_minutes() {
        let day = plan_day(1, 30, DifficultyLevel::Beginner);
        assert_eq!(day.tasks[0].kind, TaskKind::Reading);
        assert_eq!(day.tasks[0].duration, 12);
    }

    #[test]
    fn daily_total_never_exceeds_budget() {
        for level in LEVELS {
            for minutes in 15..=180 {
                let budget = minutes as f64 * level.multiplier();
                for day in generate_plan(minutes, level) {
                    assert!(
                        day.total_minutes() as f64 <= budget,
                        "{} min {:?} day {} totals {}",
                        minutes,
                        level,
                        day.day_number,
                        day.total_minutes()
                    );
                }
            }
        }
    }

    #[test]
    fn practice_grows_monotonically() {
        for level in LEVELS {
            let practice: Vec<i64> = generate_plan(60, level)
                .iter()
                .map(|d| d.tasks[2].duration)
                .collect();
            assert!(practice.windows(2).all(|w| w[0] <= w[1]));
            assert!(practice[20] > practice[0]);
        }
    }

    #[test]
    fn harder_levels_get_longer_tasks() {
        let beginner = plan_day(10, 30, DifficultyLevel::Beginner).total_minutes();
        let advanced = plan_day(10, 30, DifficultyLevel::Advanced).total_minutes();
        assert!(advanced > beginner);
    }

    #[test]
    fn quartiles_cover_the_program() {
        assert_eq!(progress_quartile(1), 0);
        assert_eq!(progress_quartile(6), 0);
        assert_eq!(progress_quartile(7), 1);
        assert_eq!(progress_quartile(11), 1);
        assert_eq!(progress_quartile(12), 2);
        assert_eq!(progress_quartile(16), 2);
        assert_eq!(progress_quartile(17), 3);
        assert_eq!(progress_quartile(21), 3);
    }

    #[test]
    fn content_index_is_clamped() {
        assert_eq!(content_index(0, 0), 0);
        assert_eq!(content_index(1, 2), 3);
        assert_eq!(content_index(2, 3), 4);
        assert_eq!(content_for(TaskKind::Reading, 99), READING[4]);
    }

    #[test]
    fn content_advances_with_day_and_difficulty() {
        let first = plan_day(1, 30, DifficultyLevel::Beginner);
        let last = plan_day(21, 30, DifficultyLevel::Beginner);
        assert_eq!(first.tasks[0].content, READING[0]);
        assert_eq!(last.tasks[0].content, READING[3]);
        let advanced_last = plan_day(21, 30, DifficultyLevel::Advanced);
        assert_eq!(advanced_last.tasks[3].content, REFLECTION[4]);
    }
}
