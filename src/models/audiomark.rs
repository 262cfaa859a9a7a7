use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::book::BookSummary;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audiomark {
    pub id: String,
    pub user_id: String,
    pub book_id: String,
    /// Playback position in seconds.
    pub timestamp: f64,
    #[serde(default)]
    pub note: String,
    pub created_at: DateTime<Utc>,
    /// Joined book columns, present on listings only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub books: Option<BookSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAudiomark {
    pub user_id: String,
    pub book_id: String,
    pub timestamp: f64,
    pub note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudiomarkFilter {
    pub user_id: String,
    pub book_id: Option<String>,
}
