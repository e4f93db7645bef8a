use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shown when a message carries neither a name nor an email.
pub const ANONYMOUS_DISPLAY_NAME: &str = "anónimo";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub expires_at: Option<u64>,
    pub user: AuthUser,
}

impl Session {
    /// Fills `expires_at` from `expires_in` for token responses that only carry the latter.
    pub fn normalized(mut self, now_unix_seconds: u64) -> Self {
        if self.expires_at.is_none()
            && let Some(expires_in) = self.expires_in
        {
            self.expires_at = Some(now_unix_seconds.saturating_add(expires_in));
        }
        self
    }

    /// Sessions without a known expiry are treated as still valid.
    pub fn expires_within(&self, margin: Duration, now_unix_seconds: u64) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at <= now_unix_seconds.saturating_add(margin.as_secs()))
    }
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// One row of the shared message table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ChatMessage {
    /// Stored name first, then the email local part, then a fixed placeholder.
    pub fn display_name(&self) -> String {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| {
                self.email
                    .as_deref()
                    .map(display_name_from_email)
                    .filter(|name| !name.is_empty())
            })
            .unwrap_or_else(|| ANONYMOUS_DISPLAY_NAME.to_string())
    }

    pub fn is_authored_by(&self, email: Option<&str>) -> bool {
        match (self.email.as_deref(), email) {
            (Some(author), Some(viewer)) => author == viewer,
            _ => false,
        }
    }
}

/// Insert payload for the message table; `id` and `created_at` are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChatMessage {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub message: String,
}

impl NewChatMessage {
    pub fn new(user_id: Uuid, email: impl Into<String>, message: impl Into<String>) -> Self {
        let email = email.into();
        Self {
            user_id,
            name: display_name_from_email(&email),
            email,
            message: message.into(),
        }
    }
}

pub fn display_name_from_email(email: &str) -> String {
    email
        .split('@')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageOrder {
    #[default]
    IdAscending,
}

impl MessageOrder {
    pub fn as_query(self) -> &'static str {
        match self {
            Self::IdAscending => "id.asc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeEvent {
    Insert,
}

impl ChangeEvent {
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
        }
    }
}

/// Which table changes a realtime channel listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeFilter {
    pub schema: String,
    pub table: String,
    pub event: ChangeEvent,
}

impl ChangeFilter {
    pub fn inserts_on(table: impl Into<String>) -> Self {
        Self {
            schema: "public".to_string(),
            table: table.into(),
            event: ChangeEvent::Insert,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }
}

pub fn unix_timestamp_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}
