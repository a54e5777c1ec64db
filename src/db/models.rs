use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::program::domain::DifficultyLevel;

pub const USER_COLUMNS: &str = "id, email, password_hash, name, age, gender, daily_time_commitment, \
     interests, role, current_program_id, streak, longest_streak, total_days, last_active_date, \
     created_at, updated_at";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub name: Option<String>,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub daily_time_commitment: Option<i64>,
    pub interests: Vec<String>,
    pub role: String,
    pub current_program_id: Option<String>,
    pub streak: i64,
    pub longest_streak: i64,
    pub total_days: i64,
    pub last_active_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// Map a row selected with [`USER_COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let interests: String = row.get(7)?;
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            name: row.get(3)?,
            age: row.get(4)?,
            gender: row.get(5)?,
            daily_time_commitment: row.get(6)?,
            interests: serde_json::from_str(&interests).unwrap_or_default(),
            role: row.get(8)?,
            current_program_id: row.get(9)?,
            streak: row.get(10)?,
            longest_streak: row.get(11)?,
            total_days: row.get(12)?,
            last_active_date: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    pub fn find(conn: &Connection, id: &str) -> rusqlite::Result<Option<User>> {
        conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id],
            User::from_row,
        )
        .optional()
    }

    pub fn find_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<User>> {
        conn.query_row(
            &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
            params![email.trim().to_lowercase()],
            User::from_row,
        )
        .optional()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
    PreferNotToSay,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
            Gender::PreferNotToSay => "prefer_not_to_say",
        }
    }
}

pub const TEST_RESULT_COLUMNS: &str =
    "id, user_id, area_id, answers, score, max_score, difficulty_level, created_at";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub id: String,
    pub user_id: String,
    pub area_id: String,
    pub answers: serde_json::Value,
    pub score: i64,
    pub max_score: i64,
    pub difficulty_level: DifficultyLevel,
    pub created_at: String,
}

impl TestResult {
    /// Map a row selected with [`TEST_RESULT_COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let answers: String = row.get(3)?;
        Ok(TestResult {
            id: row.get(0)?,
            user_id: row.get(1)?,
            area_id: row.get(2)?,
            answers: serde_json::from_str(&answers).unwrap_or(serde_json::Value::Null),
            score: row.get(4)?,
            max_score: row.get(5)?,
            difficulty_level: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

pub const BLOG_COLUMNS: &str = "id, title, slug, content, excerpt, category, tags, author_id, \
     published, published_at, views, likes, created_at, updated_at";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub category: String,
    pub tags: Vec<String>,
    pub author_id: Option<String>,
    pub published: bool,
    pub published_at: Option<String>,
    pub views: i64,
    pub likes: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl BlogPost {
    /// Map a row selected with [`BLOG_COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let tags: String = row.get(6)?;
        Ok(BlogPost {
            id: row.get(0)?,
            title: row.get(1)?,
            slug: row.get(2)?,
            content: row.get(3)?,
            excerpt: row.get(4)?,
            category: row.get(5)?,
            tags: serde_json::from_str(&tags).unwrap_or_default(),
            author_id: row.get(7)?,
            published: row.get(8)?,
            published_at: row.get(9)?,
            views: row.get(10)?,
            likes: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upload {
    pub id: String,
    pub user_id: String,
    pub original_name: String,
    pub stored_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub url: String,
    pub created_at: String,
}
