//! Database row types and store-level inputs/outcomes.
//! Link columns stay as raw JSON text here; decoding happens on the way out
//! so callers only ever see structured link lists.

use std::fmt;

use anyhow::{Context, Result};
use rusqlite::types::Value;

use linkfolio_types::models::{Account, LinkEntry, ProfileSummary};

/// Placeholder niche given to freshly created accounts.
pub const DEFAULT_NICHE: &str = "your_niche_value";

pub struct AccountRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub niche: Option<String>,
    pub name: Option<String>,
    pub aboutme: Option<String>,
    pub unique_url: String,
    pub image: Option<String>,
    pub reward_links: String,
    pub secondary_links: String,
    pub ecommerce: Value,
}

impl AccountRow {
    pub fn into_account(self) -> Result<Account> {
        Ok(Account {
            reward_links: decode_links(&self.reward_links)
                .with_context(|| format!("reward_links of account {}", self.id))?,
            secondary_links: decode_links(&self.secondary_links)
                .with_context(|| format!("secondary_links of account {}", self.id))?,
            id: self.id,
            username: self.username,
            email: self.email,
            niche: self.niche,
            name: self.name,
            aboutme: self.aboutme,
            unique_url: self.unique_url,
            image: self.image,
            ecommerce: value_to_json(self.ecommerce),
        })
    }
}

pub struct ProfileRow {
    pub username: String,
    pub image: Option<String>,
    pub name: Option<String>,
    pub niche: Option<String>,
    pub aboutme: Option<String>,
    pub reward_links: String,
    pub secondary_links: String,
    pub ecommerce: Value,
}

impl ProfileRow {
    pub fn into_summary(self) -> Result<ProfileSummary> {
        Ok(ProfileSummary {
            reward_links: decode_links(&self.reward_links)
                .with_context(|| format!("reward_links of user {}", self.username))?,
            secondary_links: decode_links(&self.secondary_links)
                .with_context(|| format!("secondary_links of user {}", self.username))?,
            username: self.username,
            image: self.image,
            name: self.name,
            niche: self.niche,
            aboutme: self.aboutme,
            ecommerce: value_to_json(self.ecommerce),
        })
    }
}

/// Values for a freshly created account, derived from its email alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub niche: String,
    pub unique_url: String,
}

impl NewAccount {
    /// The username is the local part of the email (everything before the
    /// first `@`, or the whole string when there is none).
    pub fn from_email(email: &str) -> Self {
        let username = email.split('@').next().unwrap_or_default().to_string();
        Self {
            unique_url: unique_url(&username),
            username,
            email: email.to_string(),
            niche: DEFAULT_NICHE.to_string(),
        }
    }
}

/// Profile fields written by the additional-info update. `image` is the newly
/// uploaded filename, if any; `None` keeps whatever the row already holds.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub username: String,
    pub niche: String,
    pub name: String,
    pub aboutme: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Created(i64),
    Existing(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Carries the image filename that was stored.
    Updated { image: Option<String> },
    NotFound,
}

/// The statement a multi-step account operation failed in. Attached to the
/// error as context; recover it with `err.downcast_ref::<Step>()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Lookup,
    Insert,
    FetchImage,
    WriteProfile,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Lookup => "Failed to look up account",
            Step::Insert => "Failed to insert account",
            Step::FetchImage => "Failed to fetch current image filename",
            Step::WriteProfile => "Failed to update account",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkColumn {
    Reward,
    Secondary,
}

impl LinkColumn {
    pub fn column(self) -> &'static str {
        match self {
            LinkColumn::Reward => "reward_links",
            LinkColumn::Secondary => "secondary_links",
        }
    }
}

pub fn unique_url(username: &str) -> String {
    format!("/{}", username)
}

pub fn encode_links(links: &[LinkEntry]) -> Result<String> {
    Ok(serde_json::to_string(links)?)
}

pub fn decode_links(raw: &str) -> Result<Vec<LinkEntry>> {
    serde_json::from_str(raw).context("Unparseable link list")
}

fn value_to_json(value: Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => i.into(),
        Value::Real(f) => f.into(),
        Value::Text(s) => s.into(),
        Value::Blob(b) => b.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_derives_username_from_local_part() {
        let account = NewAccount::from_email("jane.doe@example.com");
        assert_eq!(account.username, "jane.doe");
        assert_eq!(account.unique_url, "/jane.doe");
        assert_eq!(account.niche, DEFAULT_NICHE);
        assert_eq!(account.email, "jane.doe@example.com");
    }

    #[test]
    fn email_without_at_sign_uses_whole_string() {
        let account = NewAccount::from_email("nobody");
        assert_eq!(account.username, "nobody");
        assert_eq!(account.unique_url, "/nobody");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_links("not json").is_err());
        assert!(decode_links("{\"type\":\"a\"}").is_err());
        assert!(decode_links("[]").unwrap().is_empty());
    }

    #[test]
    fn opaque_values_become_json() {
        assert_eq!(value_to_json(Value::Null), serde_json::Value::Null);
        assert_eq!(value_to_json(Value::Integer(1)), serde_json::json!(1));
        assert_eq!(value_to_json(Value::Text("yes".into())), serde_json::json!("yes"));
    }
}
