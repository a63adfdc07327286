use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Body Trello POSTs to a webhook callback.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub action: WebhookAction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAction {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub id_member_creator: String,
    #[serde(default)]
    pub data: ActionData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionData {
    pub card: Option<ActionCard>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionCard {
    pub id: String,
}

/// Action types the sync reacts to; everything else is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    CommentCard,
}

impl ActionKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "commentCard" => Some(ActionKind::CommentCard),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_comment_payload() {
        let payload: WebhookPayload = serde_json::from_str(
            r#"{
                "model": {"id": "board1"},
                "action": {
                    "id": "act1",
                    "type": "commentCard",
                    "date": "2021-03-04T10:11:12.000Z",
                    "idMemberCreator": "m1",
                    "data": {"card": {"id": "card1", "name": "Fix"}, "text": "hello"}
                }
            }"#,
        )
        .unwrap();
        let action = payload.action;
        assert_eq!(ActionKind::parse(&action.kind), Some(ActionKind::CommentCard));
        assert_eq!(action.data.card.unwrap().id, "card1");
        assert_eq!(action.data.text.as_deref(), Some("hello"));
        assert_eq!(action.id_member_creator, "m1");
    }

    #[test]
    fn unknown_kinds_are_not_parsed() {
        assert_eq!(ActionKind::parse("updateCard"), None);
        assert_eq!(ActionKind::parse(""), None);
    }
}
