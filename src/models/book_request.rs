use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const STATUS_PENDING: &str = "pending";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub book_name: String,
    pub author: String,
    #[serde(default)]
    pub edition: Option<String>,
    #[serde(default)]
    pub additional_notes: Option<String>,
    pub status: String,
    pub user_email: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBookRequest {
    pub book_name: String,
    pub author: String,
    pub edition: Option<String>,
    pub additional_notes: Option<String>,
    pub status: String,
    pub user_email: String,
    pub user_id: Option<String>,
}
