use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::importer::{ImportSettings, UnmappedMemberPolicy};

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub trello: TrelloConfig,
    #[serde(default)]
    pub estimation_tools: EstimationConfig,
    pub project: ProjectConfig,
    #[serde(default)]
    pub ticket: TicketConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Trello member id -> Trac username.
    #[serde(default)]
    pub users: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct TrelloConfig {
    pub api_key: String,
    pub token: String,
    /// Boards offered for import.
    #[serde(default)]
    pub boards: Vec<String>,
    /// Lists offered for bulk import.
    #[serde(default)]
    pub lists: Vec<String>,
    /// Link imported tickets to an iteration (Agile Trac).
    #[serde(default)]
    pub agile_trac: bool,
    /// Read `(N) ` size prefixes from card titles.
    #[serde(default)]
    pub estimation_tools: bool,
    #[serde(default = "default_link_text")]
    pub link_text: String,
    #[serde(default = "default_fallback_user")]
    pub fallback_user: String,
    #[serde(default)]
    pub unmapped_members: UnmappedMemberPolicy,
}

#[derive(Debug, Deserialize)]
pub struct EstimationConfig {
    #[serde(default = "default_estimation_field")]
    pub estimation_field: String,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            estimation_field: default_estimation_field(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    /// Base URL of the Trac project, e.g. `https://trac.example.com/project/`.
    pub url: String,
    /// Path to the Trac SQLite database (`<env>/db/trac.db`).
    pub database: PathBuf,
    #[serde(default)]
    pub timestamp_unit: TimestampUnit,
}

#[derive(Debug, Deserialize)]
pub struct TicketConfig {
    #[serde(rename = "type", default = "default_ticket_type")]
    pub ticket_type: String,
    #[serde(default = "default_level")]
    pub severity: String,
    #[serde(default = "default_level")]
    pub priority: String,
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            ticket_type: default_ticket_type(),
            severity: default_level(),
            priority: default_level(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Resolution of the `time` columns in the Trac database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampUnit {
    #[default]
    Seconds,
    Microseconds,
}

impl TimestampUnit {
    pub fn stamp(self, at: DateTime<Utc>) -> i64 {
        match self {
            TimestampUnit::Seconds => at.timestamp(),
            TimestampUnit::Microseconds => at.timestamp_micros(),
        }
    }
}

fn default_link_text() -> String {
    "vai a Trello".into()
}

fn default_fallback_user() -> String {
    "trello".into()
}

fn default_estimation_field() -> String {
    "estimatedhours".into()
}

fn default_ticket_type() -> String {
    "task".into()
}

fn default_level() -> String {
    "normale".into()
}

fn default_bind() -> String {
    "127.0.0.1:8087".into()
}

impl AppConfig {
    /// Local username for a Trello member; blank mappings count as missing.
    pub fn user_for(&self, member_id: &str) -> Option<&str> {
        self.users
            .get(member_id)
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
    }

    pub fn import_settings(&self) -> ImportSettings {
        ImportSettings {
            estimation_field: self
                .trello
                .estimation_tools
                .then(|| self.estimation_tools.estimation_field.clone()),
            agile: self.trello.agile_trac,
            link_text: self.trello.link_text.clone(),
            fallback_user: self.trello.fallback_user.clone(),
            unmapped_members: self.trello.unmapped_members,
            timestamp_unit: self.project.timestamp_unit,
            ticket_type: self.ticket.ticket_type.clone(),
            severity: self.ticket.severity.clone(),
            priority: self.ticket.priority.clone(),
        }
    }

    /// URL of a ticket in the Trac web UI.
    pub fn ticket_url(&self, ticket_id: i64) -> String {
        let base = &self.project.url;
        if base.ends_with('/') {
            format!("{base}ticket/{ticket_id}")
        } else {
            format!("{base}/ticket/{ticket_id}")
        }
    }
}

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".trello-trac")
}

fn config_path() -> PathBuf {
    std::env::var_os("TRELLO_TRAC_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir().join("config.toml"))
}

pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}
