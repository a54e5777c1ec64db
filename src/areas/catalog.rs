//! Built-in development areas and their placement quizzes.

use rusqlite::{params, Connection};

use super::{AnswerOption, Question};

pub struct SeedArea {
    pub slug: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    /// Question text and three options scored 0, 1 and 2.
    pub questions: [(&'static str, [&'static str; 3]); 5],
}

pub const AREAS: &[SeedArea] = &[
    SeedArea {
        slug: "fitness",
        name: "Fitness",
        description: "Build strength, stamina and a sustainable exercise habit.",
        icon: "dumbbell",
        questions: [
            (
                "How often do you exercise in a typical week?",
                ["Rarely or never", "One to three times", "Four or more times"],
            ),
            (
                "How long can you walk briskly without stopping?",
                ["Under 10 minutes", "10 to 30 minutes", "More than 30 minutes"],
            ),
            (
                "How many push-ups can you do in a row?",
                ["Fewer than 5", "5 to 20", "More than 20"],
            ),
            (
                "How familiar are you with strength training?",
                ["Not at all", "I know the basics", "I train regularly"],
            ),
            (
                "How do you feel after climbing three flights of stairs?",
                ["Exhausted", "A little out of breath", "Fine"],
            ),
        ],
    },
    SeedArea {
        slug: "mindfulness",
        name: "Mindfulness",
        description: "Reduce stress and improve focus through meditation and awareness.",
        icon: "lotus",
        questions: [
            (
                "Have you practised meditation before?",
                ["Never", "A few times", "Regularly"],
            ),
            (
                "How easily can you sit quietly for ten minutes?",
                ["Very hard", "With some effort", "Easily"],
            ),
            (
                "How often do you notice your emotions as they arise?",
                ["Rarely", "Sometimes", "Most of the time"],
            ),
            (
                "How do you usually react to stressful situations?",
                ["I get overwhelmed", "I cope after a while", "I stay calm"],
            ),
            (
                "How often do you take deliberate breaks during the day?",
                ["Never", "Occasionally", "Every day"],
            ),
        ],
    },
    SeedArea {
        slug: "productivity",
        name: "Productivity",
        description: "Plan your days, beat procrastination and get important work done.",
        icon: "checklist",
        questions: [
            (
                "Do you plan your day in advance?",
                ["Never", "Sometimes", "Every day"],
            ),
            (
                "How often do you finish tasks before their deadline?",
                ["Rarely", "About half the time", "Almost always"],
            ),
            (
                "Do you use a system to track your tasks?",
                ["No", "Loosely", "Yes, consistently"],
            ),
            (
                "How long can you focus on one task without distraction?",
                ["Under 15 minutes", "15 to 45 minutes", "Over 45 minutes"],
            ),
            (
                "How often do you review what you accomplished?",
                ["Never", "Occasionally", "Weekly or more"],
            ),
        ],
    },
    SeedArea {
        slug: "learning",
        name: "Learning",
        description: "Develop a reading habit and learn new skills effectively.",
        icon: "book",
        questions: [
            (
                "How many books did you read last year?",
                ["None", "One to five", "More than five"],
            ),
            (
                "How often do you learn something new on purpose?",
                ["Rarely", "Monthly", "Weekly"],
            ),
            (
                "Do you take notes when learning?",
                ["No", "Sometimes", "Always"],
            ),
            (
                "Have you completed an online course?",
                ["Never", "Started but not finished", "Yes, several"],
            ),
            (
                "How do you review what you have learned?",
                ["I don't", "I reread occasionally", "I use spaced repetition or practice"],
            ),
        ],
    },
];

impl SeedArea {
    pub fn questions(&self) -> Vec<Question> {
        self.questions
            .iter()
            .enumerate()
            .map(|(i, (text, options))| Question {
                id: format!("{}-q{}", self.slug, i + 1),
                text: text.to_string(),
                options: options
                    .iter()
                    .enumerate()
                    .map(|(score, text)| AnswerOption {
                        text: text.to_string(),
                        score: score as i64,
                    })
                    .collect(),
            })
            .collect()
    }
}

/// Insert any built-in area that is missing. Returns how many were added.
pub fn seed(conn: &Connection) -> Result<usize, rusqlite::Error> {
    let now = chrono::Utc::now().to_rfc3339();
    let mut inserted = 0;
    for area in AREAS {
        let questions = serde_json::to_string(&area.questions())
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        inserted += conn.execute(
            "INSERT OR IGNORE INTO development_areas (id, name, slug, description, icon, questions, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                uuid::Uuid::now_v7().to_string(),
                area.name,
                area.slug,
                area.description,
                area.icon,
                questions,
                now
            ],
        )?;
    }
    Ok(inserted)
}
