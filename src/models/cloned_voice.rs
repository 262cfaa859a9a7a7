use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored reference to an uploaded voice sample and the chosen model.
/// No voice model is produced; the row only records the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClonedVoice {
    pub id: String,
    pub user_id: String,
    pub model: String,
    pub voice_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClonedVoice {
    pub user_id: String,
    pub model: String,
    pub voice_url: String,
}
