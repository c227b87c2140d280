//! Typed shapes of the rows we read from and write to the backend.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PROFILES: &str = "profiles";
pub const FEEDBACKS: &str = "feedbacks";

/* ------------ registered users ------------ */
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileRow {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// `updated_at` is nullable in the profiles table.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRow {
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/* ------------ feedback ------------ */
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorRef {
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackRow {
    pub id: serde_json::Value,
    pub email: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub profiles: Option<AuthorRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewFeedback {
    pub user_id: String,
    pub email: String,
    pub message: String,
}

/* ------------ presence ------------ */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceMeta {
    pub online_at: DateTime<Utc>,
}
