use tracing::debug;

use super::{is_from_trac, SyncService, FROM_TRELLO};
use crate::error::SyncError;
use crate::importer::CardImporter;
use crate::model::ticket::TicketComment;
use crate::trello::webhook::{ActionKind, WebhookAction, WebhookPayload};
use crate::util::wiki::markdown_to_wiki;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Action type the sync does not handle.
    Ignored,
    /// The card has no ticket in Trac.
    Unlinked,
    /// The comment was written from Trac in the first place.
    Echo,
    CommentAdded { ticket: i64 },
}

impl SyncService {
    pub async fn handle_webhook(&self, payload: &WebhookPayload) -> Result<WebhookOutcome, SyncError> {
        let action = &payload.action;
        match ActionKind::parse(&action.kind) {
            Some(ActionKind::CommentCard) => self.comment_from_action(action).await,
            None => {
                debug!(kind = %action.kind, "webhook action not handled");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    async fn comment_from_action(&self, action: &WebhookAction) -> Result<WebhookOutcome, SyncError> {
        let (Some(card), Some(text)) = (&action.data.card, &action.data.text) else {
            debug!(action = %action.id, "comment action without card or text");
            return Ok(WebhookOutcome::Ignored);
        };
        if is_from_trac(text) {
            return Ok(WebhookOutcome::Echo);
        }

        let importer = CardImporter::new(self.settings.as_ref(), self.config.as_ref());
        let comment = TicketComment {
            time: self.settings.timestamp_unit.stamp(action.date),
            author: importer.author(&action.id_member_creator),
            text: markdown_to_wiki(&format!("{FROM_TRELLO}{text}")),
        };
        let card_id = card.id.clone();
        let added = self
            .with_store(move |store| {
                let Some(ticket) = store.ticket_for_card(&card_id)? else {
                    return Ok(None);
                };
                store.add_comment(ticket, &comment)?;
                Ok(Some(ticket))
            })
            .await?;

        match added {
            Some(ticket) => {
                debug!(ticket, card = %card.id, "comment copied from Trello");
                Ok(WebhookOutcome::CommentAdded { ticket })
            }
            None => Ok(WebhookOutcome::Unlinked),
        }
    }
}
