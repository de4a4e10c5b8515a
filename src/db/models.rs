use rusqlite::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub title: String,
    pub description: String,
    pub duration_hours: i64,
    pub created_at: String,
}

impl Course {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Course {
            id: row.get("id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            duration_hours: row.get("duration_hours")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub description: String,
    /// Raw JSON content payload; decode with [`Module::content_blocks`].
    pub content: String,
    pub order_index: i64,
}

impl Module {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Module {
            id: row.get("id")?,
            course_id: row.get("course_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            content: row.get("content")?,
            order_index: row.get("order_index")?,
        })
    }

    /// Decode the slide-like content blocks. A payload that is not a
    /// list of known blocks coerces to an empty sequence instead of
    /// failing the view.
    pub fn content_blocks(&self) -> Vec<ContentBlock> {
        match serde_json::from_str(&self.content) {
            Ok(blocks) => blocks,
            Err(e) => {
                tracing::warn!("Malformed content payload for module {}: {}", self.id, e);
                Vec::new()
            }
        }
    }
}

/// One slide-like block of module content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ContentBlock {
    Text(String),
    List(Vec<String>),
    Grid(Vec<GridCard>),
    Steps(Vec<StepItem>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCard {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepItem {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Test {
    pub id: String,
    pub module_id: String,
    pub title: String,
    /// Raw JSON question payload; decode with [`Test::question_list`].
    pub questions: String,
    pub passing_score: i64,
}

impl Test {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Test {
            id: row.get("id")?,
            module_id: row.get("module_id")?,
            title: row.get("title")?,
            questions: row.get("questions")?,
            passing_score: row.get("passing_score")?,
        })
    }

    /// Decode the question list, coercing malformed payloads to an
    /// empty sequence.
    pub fn question_list(&self) -> Vec<Question> {
        match serde_json::from_str(&self.questions) {
            Ok(questions) => questions,
            Err(e) => {
                tracing::warn!("Malformed question payload for test {}: {}", self.id, e);
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub question: String,
    pub options: Vec<String>,
    /// Index of the correct option. Scoring is index-based; option
    /// text is never compared.
    pub correct: usize,
}

impl Question {
    pub fn is_valid(&self) -> bool {
        !self.options.is_empty() && self.correct < self.options.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub user_id: String,
    pub course_id: String,
    pub module_id: String,
    pub completed_at: Option<String>,
    pub test_score: Option<i64>,
}

impl ProgressRecord {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ProgressRecord {
            user_id: row.get("user_id")?,
            course_id: row.get("course_id")?,
            module_id: row.get("module_id")?,
            completed_at: row.get("completed_at")?,
            test_score: row.get("test_score")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub issued_at: String,
    pub approved: bool,
    pub approved_by: Option<String>,
    pub approved_at: Option<String>,
}

impl Certificate {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Certificate {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            course_id: row.get("course_id")?,
            issued_at: row.get("issued_at")?,
            approved: row.get("approved")?,
            approved_by: row.get("approved_by")?,
            approved_at: row.get("approved_at")?,
        })
    }
}
