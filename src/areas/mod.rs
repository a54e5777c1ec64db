pub mod catalog;

use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::program::DifficultyLevel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub text: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub options: Vec<AnswerOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevelopmentArea {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub icon: Option<String>,
    pub questions: Vec<Question>,
    pub created_at: String,
}

/// Quiz question as shown to a user: option texts only, no scores.
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicArea {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub icon: Option<String>,
    pub question_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questions: Option<Vec<PublicQuestion>>,
}

impl DevelopmentArea {
    pub fn to_public(&self, with_questions: bool) -> PublicArea {
        PublicArea {
            id: self.id.clone(),
            name: self.name.clone(),
            slug: self.slug.clone(),
            description: self.description.clone(),
            icon: self.icon.clone(),
            question_count: self.questions.len(),
            questions: with_questions.then(|| {
                self.questions
                    .iter()
                    .map(|q| PublicQuestion {
                        id: q.id.clone(),
                        text: q.text.clone(),
                        options: q.options.iter().map(|o| o.text.clone()).collect(),
                    })
                    .collect()
            }),
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let questions: String = row.get(5)?;
        Ok(DevelopmentArea {
            id: row.get(0)?,
            name: row.get(1)?,
            slug: row.get(2)?,
            description: row.get(3)?,
            icon: row.get(4)?,
            questions: serde_json::from_str(&questions).unwrap_or_default(),
            created_at: row.get(6)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: String,
    pub option_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizScore {
    pub score: i64,
    pub max_score: i64,
    pub difficulty_level: DifficultyLevel,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum QuizError {
    #[error("Unknown question: {0}")]
    UnknownQuestion(String),

    #[error("Question answered more than once: {0}")]
    DuplicateAnswer(String),

    #[error("Invalid option for question {0}")]
    InvalidOption(String),

    #[error("Question not answered: {0}")]
    Unanswered(String),
}

/// Score a full set of answers. Every question must be answered exactly once.
pub fn score_answers(questions: &[Question], answers: &[Answer]) -> Result<QuizScore, QuizError> {
    let by_id: HashMap<&str, &Question> = questions.iter().map(|q| (q.id.as_str(), q)).collect();
    let mut chosen: HashMap<&str, i64> = HashMap::new();

    for answer in answers {
        let question = by_id
            .get(answer.question_id.as_str())
            .ok_or_else(|| QuizError::UnknownQuestion(answer.question_id.clone()))?;
        let option = question
            .options
            .get(answer.option_index)
            .ok_or_else(|| QuizError::InvalidOption(answer.question_id.clone()))?;
        if chosen.insert(question.id.as_str(), option.score).is_some() {
            return Err(QuizError::DuplicateAnswer(answer.question_id.clone()));
        }
    }

    if let Some(missing) = questions.iter().find(|q| !chosen.contains_key(q.id.as_str())) {
        return Err(QuizError::Unanswered(missing.id.clone()));
    }

    let score = chosen.values().sum();
    let max_score = questions
        .iter()
        .map(|q| q.options.iter().map(|o| o.score).max().unwrap_or(0))
        .sum();

    Ok(QuizScore {
        score,
        max_score,
        difficulty_level: DifficultyLevel::from_score(score, max_score),
    })
}

const AREA_COLUMNS: &str = "id, name, slug, description, icon, questions, created_at";

pub fn list_areas(conn: &Connection) -> rusqlite::Result<Vec<DevelopmentArea>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM development_areas ORDER BY name",
        AREA_COLUMNS
    ))?;
    let rows = stmt.query_map([], DevelopmentArea::from_row)?;
    rows.collect()
}

/// Look up an area by slug, falling back to id.
pub fn find_area(conn: &Connection, key: &str) -> rusqlite::Result<Option<DevelopmentArea>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM development_areas WHERE slug = ?1 OR id = ?1",
            AREA_COLUMNS
        ),
        params![key],
        DevelopmentArea::from_row,
    )
    .optional()
}

pub fn insert_area(
    conn: &Connection,
    name: &str,
    slug: &str,
    description: &str,
    icon: Option<&str>,
    questions: &[Question],
) -> Result<DevelopmentArea, crate::error::AppError> {
    let area = DevelopmentArea {
        id: uuid::Uuid::now_v7().to_string(),
        name: name.to_string(),
        slug: slug.to_string(),
        description: description.to_string(),
        icon: icon.map(str::to_string),
        questions: questions.to_vec(),
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    conn.execute(
        "INSERT INTO development_areas (id, name, slug, description, icon, questions, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            area.id,
            area.name,
            area.slug,
            area.description,
            area.icon,
            serde_json::to_string(&area.questions)?,
            area.created_at
        ],
    )?;
    Ok(area)
}
