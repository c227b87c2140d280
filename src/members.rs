//! "Are you a member?" lookups against the registered-user table.
use serde::Serialize;

use crate::{
    error::{AppErr, AppResult},
    models::{ProfileRow, PROFILES},
    store::{RemoteStore, Select},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyOutcome {
    Found,
    NotFound,
    LookupFailed,
}

impl VerifyOutcome {
    pub fn message(self) -> &'static str {
        match self {
            Self::Found        => "Member verified!",
            Self::NotFound     => "Not a registered member yet.",
            Self::LookupFailed => "Verification failed. Try again.",
        }
    }
}

/// Emails match case-insensitively and ignore surrounding whitespace.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Single-row lookup by (already normalized) email.
pub async fn lookup_profile(store: &dyn RemoteStore, email: &str) -> AppResult<Option<ProfileRow>> {
    let q = Select::from(PROFILES).columns("id, email").eq("email", email).limit(1);
    Ok(store.select(&q).await?.parse::<ProfileRow>()?.into_iter().next())
}

/// Exact number of registered users, without fetching rows.
pub async fn count_members(store: &dyn RemoteStore) -> AppResult<u64> {
    store
        .select(&Select::from(PROFILES).head())
        .await?
        .count
        .ok_or_else(|| AppErr::Remote { status: 200, body: "no count in response".into() })
}

pub async fn verify_member(store: &dyn RemoteStore, raw_email: &str) -> VerifyOutcome {
    let email = normalize_email(raw_email);
    if email.is_empty() {
        return VerifyOutcome::NotFound;
    }
    match lookup_profile(store, &email).await {
        Ok(Some(_)) => VerifyOutcome::Found,
        Ok(None)    => VerifyOutcome::NotFound,
        Err(e) => {
            tracing::warn!(error = %e, "member lookup failed");
            VerifyOutcome::LookupFailed
        }
    }
}
