pub mod client;
pub mod webhook;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::model::card::CardSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListInfo {
    pub id: String,
    pub name: String,
    pub board_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRef {
    pub id: String,
    pub name: String,
}

/// The slice of the Trello API the sync needs.
#[async_trait]
pub trait TrelloApi: Send + Sync {
    /// None when the board does not exist or is not visible to the token.
    async fn board(&self, board_id: &str) -> Result<Option<BoardInfo>>;
    async fn list(&self, list_id: &str) -> Result<Option<ListInfo>>;
    async fn list_cards(&self, list_id: &str) -> Result<Vec<CardRef>>;
    /// Resolve a board-local short id (the number shown on the card) to the card id.
    async fn card_by_short_id(&self, board_id: &str, short_id: &str) -> Result<Option<String>>;
    async fn fetch_card(&self, card_id: &str) -> Result<CardSnapshot>;
    async fn add_comment(&self, card_id: &str, text: &str) -> Result<()>;
    async fn attach_link(&self, card_id: &str, url: &str) -> Result<()>;
}
