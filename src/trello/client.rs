use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{BoardInfo, CardRef, ListInfo, TrelloApi};
use crate::model::card::{
    created_at_from_id, Attachment, CardComment, CardLabel, CardSnapshot, Checklist,
};

const API_BASE: &str = "https://api.trello.com/1";

/// Actions that bring a card into existence, newest first as Trello returns them.
const CREATION_ACTIONS: &str = "createCard,copyCard,convertToCardFromCheckItem,emailCard";

pub struct TrelloClient {
    api_key: String,
    token: String,
    base_url: String,
    client: reqwest::Client,
}

impl TrelloClient {
    pub fn new(api_key: String, token: String) -> Self {
        Self {
            api_key,
            token,
            base_url: API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn auth_params(&self) -> [(&str, &str); 2] {
        [("key", self.api_key.as_str()), ("token", self.token.as_str())]
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let resp = self
            .client
            .get(format!("{}{path}", self.base_url))
            .query(&self.auth_params())
            .query(query)
            .send()
            .await
            .with_context(|| format!("Trello GET {path} failed"))?
            .error_for_status()
            .with_context(|| format!("Trello GET {path} rejected"))?;
        resp.json()
            .await
            .with_context(|| format!("Failed to parse Trello response for {path}"))
    }

    /// Like `get_json`, but an unknown or malformed id yields None.
    async fn lookup<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<Option<T>> {
        let resp = self
            .client
            .get(format!("{}{path}", self.base_url))
            .query(&self.auth_params())
            .query(query)
            .send()
            .await
            .with_context(|| format!("Trello GET {path} failed"))?;
        // Trello answers 400 "invalid id" for malformed ids and 404 for unknown ones
        if matches!(resp.status(), StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST) {
            return Ok(None);
        }
        let resp = resp
            .error_for_status()
            .with_context(|| format!("Trello GET {path} rejected"))?;
        let value = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse Trello response for {path}"))?;
        Ok(Some(value))
    }

    async fn post(&self, path: &str, query: &[(&str, &str)]) -> Result<()> {
        self.client
            .post(format!("{}{path}", self.base_url))
            .query(&self.auth_params())
            .query(query)
            .send()
            .await
            .with_context(|| format!("Trello POST {path} failed"))?
            .error_for_status()
            .with_context(|| format!("Trello POST {path} rejected"))?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct Board {
    id: String,
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrelloList {
    id: String,
    name: String,
    id_board: String,
}

#[derive(Deserialize)]
struct CardId {
    id: String,
}

#[derive(Deserialize)]
struct CardSummary {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct Card {
    id: String,
    name: String,
    #[serde(default)]
    desc: String,
    url: String,
    #[serde(default)]
    labels: Vec<TrelloLabel>,
}

#[derive(Deserialize)]
struct TrelloLabel {
    color: Option<String>,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct Member {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrelloChecklist {
    name: String,
    #[serde(default)]
    check_items: Vec<CheckItem>,
}

#[derive(Deserialize)]
struct CheckItem {
    name: String,
    #[serde(default)]
    pos: f64,
}

#[derive(Deserialize)]
struct TrelloAttachment {
    url: String,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Action {
    date: DateTime<Utc>,
    id_member_creator: Option<String>,
    #[serde(default)]
    data: ActionData,
}

#[derive(Deserialize, Default)]
struct ActionData {
    #[serde(default)]
    text: String,
}

fn checklist_from(list: TrelloChecklist) -> Checklist {
    let mut items = list.check_items;
    items.sort_by(|a, b| a.pos.total_cmp(&b.pos));
    Checklist {
        name: list.name,
        items: items.into_iter().map(|i| i.name).collect(),
    }
}

fn snapshot_from(
    card: Card,
    creation: Vec<Action>,
    members: Vec<Member>,
    checklists: Vec<TrelloChecklist>,
    attachments: Vec<TrelloAttachment>,
    comments: Vec<Action>,
) -> Result<CardSnapshot> {
    let created = creation.into_iter().next();
    let created_at = match &created {
        Some(action) => action.date,
        None => created_at_from_id(&card.id)
            .with_context(|| format!("Card {} has no creation date", card.id))?,
    };
    let creator_id = created.and_then(|a| a.id_member_creator);

    Ok(CardSnapshot {
        id: card.id,
        name: card.name,
        url: card.url,
        description: card.desc,
        labels: card
            .labels
            .into_iter()
            .map(|l| CardLabel {
                color: l.color.unwrap_or_default(),
                name: l.name,
            })
            .collect(),
        members: members.into_iter().map(|m| m.id).collect(),
        checklists: checklists.into_iter().map(checklist_from).collect(),
        attachments: attachments
            .into_iter()
            .map(|a| Attachment {
                url: a.url,
                name: a.name,
            })
            .collect(),
        comments: comments
            .into_iter()
            .map(|c| CardComment {
                date: c.date,
                author_id: c.id_member_creator.unwrap_or_default(),
                text: c.data.text,
            })
            .collect(),
        created_at,
        creator_id,
    })
}

#[async_trait]
impl TrelloApi for TrelloClient {
    async fn board(&self, board_id: &str) -> Result<Option<BoardInfo>> {
        let board: Option<Board> = self
            .lookup(&format!("/boards/{board_id}"), &[("fields", "id,name")])
            .await?;
        Ok(board.map(|b| BoardInfo {
            id: b.id,
            name: b.name,
        }))
    }

    async fn list(&self, list_id: &str) -> Result<Option<ListInfo>> {
        let list: Option<TrelloList> = self
            .lookup(&format!("/lists/{list_id}"), &[("fields", "id,name,idBoard")])
            .await?;
        Ok(list.map(|l| ListInfo {
            id: l.id,
            name: l.name,
            board_id: l.id_board,
        }))
    }

    async fn list_cards(&self, list_id: &str) -> Result<Vec<CardRef>> {
        let cards: Vec<CardSummary> = self
            .get_json(&format!("/lists/{list_id}/cards"), &[("fields", "id,name")])
            .await?;
        Ok(cards
            .into_iter()
            .map(|c| CardRef {
                id: c.id,
                name: c.name,
            })
            .collect())
    }

    async fn card_by_short_id(&self, board_id: &str, short_id: &str) -> Result<Option<String>> {
        let card: Option<CardId> = self
            .lookup(
                &format!("/boards/{board_id}/cards/{short_id}"),
                &[("fields", "id")],
            )
            .await?;
        Ok(card.map(|c| c.id))
    }

    async fn fetch_card(&self, card_id: &str) -> Result<CardSnapshot> {
        let card_path = format!("/cards/{card_id}");
        let actions_path = format!("/cards/{card_id}/actions");
        let members_path = format!("/cards/{card_id}/members");
        let checklists_path = format!("/cards/{card_id}/checklists");
        let attachments_path = format!("/cards/{card_id}/attachments");

        let (card, creation, members, checklists, attachments, comments) = tokio::try_join!(
            self.get_json::<Card>(&card_path, &[("fields", "id,name,desc,url,labels")]),
            self.get_json::<Vec<Action>>(&actions_path, &[("filter", CREATION_ACTIONS)]),
            self.get_json::<Vec<Member>>(&members_path, &[("fields", "id")]),
            self.get_json::<Vec<TrelloChecklist>>(&checklists_path, &[]),
            self.get_json::<Vec<TrelloAttachment>>(&attachments_path, &[("fields", "url,name")]),
            self.get_json::<Vec<Action>>(
                &actions_path,
                &[("filter", "commentCard"), ("limit", "1000")]
            ),
        )
        .with_context(|| format!("Failed to fetch Trello card {card_id}"))?;

        snapshot_from(card, creation, members, checklists, attachments, comments)
    }

    async fn add_comment(&self, card_id: &str, text: &str) -> Result<()> {
        self.post(
            &format!("/cards/{card_id}/actions/comments"),
            &[("text", text)],
        )
        .await
    }

    async fn attach_link(&self, card_id: &str, url: &str) -> Result<()> {
        self.post(&format!("/cards/{card_id}/attachments"), &[("url", url)])
            .await
    }
}
