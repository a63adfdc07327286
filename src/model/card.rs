use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything needed to turn one Trello card into a Trac ticket, read once per import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardSnapshot {
    pub id: String,
    pub name: String,
    pub url: String,
    /// Raw markdown as typed in Trello.
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<CardLabel>,
    /// Trello member ids, in the order Trello lists them.
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub checklists: Vec<Checklist>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub comments: Vec<CardComment>,
    pub created_at: DateTime<Utc>,
    /// None when Trello has no creation action for the card (copied or converted cards).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardLabel {
    pub color: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    pub name: String,
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardComment {
    pub date: DateTime<Utc>,
    pub author_id: String,
    pub text: String,
}

/// Trello object ids start with the creation time as eight hex digits of Unix seconds.
pub fn created_at_from_id(id: &str) -> Option<DateTime<Utc>> {
    let prefix = id.get(..8)?;
    let secs = i64::from_str_radix(prefix, 16).ok()?;
    DateTime::from_timestamp(secs, 0)
}
