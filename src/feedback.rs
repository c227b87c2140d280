//! Community feedback wall: members post, everyone reads.
use serde::Serialize;

use crate::{
    error::{AppErr, AppResult},
    members::{lookup_profile, normalize_email},
    models::{FeedbackRow, NewFeedback, FEEDBACKS},
    store::{RemoteStore, Select},
};

pub const MAX_MESSAGE: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackView {
    pub id:         serde_json::Value,
    pub author:     String,
    pub message:    String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub fn first_name(full_name: Option<&str>) -> String {
    full_name
        .and_then(|n| n.split_whitespace().next())
        .unwrap_or("User")
        .to_string()
}

/// Post a message on behalf of a registered email.
pub async fn submit_feedback(store: &dyn RemoteStore, raw_email: &str, message: &str) -> AppResult<()> {
    let message = message.trim();
    if message.is_empty() {
        return Err(AppErr::Bad("message is empty".into()));
    }
    if message.chars().count() > MAX_MESSAGE {
        return Err(AppErr::Bad(format!("message longer than {MAX_MESSAGE} characters")));
    }

    let email = normalize_email(raw_email);
    let profile = lookup_profile(store, &email)
        .await?
        .ok_or_else(|| AppErr::NotFound("Email not found. Please register in the MoneyGa app first!".into()))?;

    let row = NewFeedback { user_id: profile.id, email, message: message.to_string() };
    store.insert(FEEDBACKS, serde_json::to_value(&row)?).await?;
    tracing::info!(user_id = %row.user_id, "feedback posted");
    Ok(())
}

/// Newest first.
pub async fn recent_feedback(store: &dyn RemoteStore, limit: u64) -> AppResult<Vec<FeedbackView>> {
    let q = Select::from(FEEDBACKS)
        .columns("id, email, message, created_at, profiles (full_name)")
        .order("created_at", false)
        .limit(limit);
    let rows: Vec<FeedbackRow> = store.select(&q).await?.parse()?;
    Ok(rows
        .into_iter()
        .map(|r| FeedbackView {
            author: first_name(r.profiles.as_ref().and_then(|p| p.full_name.as_deref())),
            id: r.id,
            message: r.message,
            created_at: r.created_at,
        })
        .collect())
}
