use thiserror::Error;

use crate::importer::mode::FormField;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Card \"{name}\" already exists")]
    DuplicateCard { card_id: String, name: String },

    #[error("You must fill in the field \"{0}\".")]
    MissingRequiredField(FormField),

    #[error("{message}")]
    InvalidReference { field: FormField, message: String },

    #[error("No Trac user is configured for Trello member {member_id}")]
    MissingUserMapping { member_id: String },

    #[error("Trello request failed: {0:#}")]
    Trello(#[from] anyhow::Error),

    #[error("Trac database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Trac database task failed: {0}")]
    StoreTask(#[from] tokio::task::JoinError),
}

impl SyncError {
    pub fn invalid(field: FormField, message: impl Into<String>) -> Self {
        SyncError::InvalidReference {
            field,
            message: message.into(),
        }
    }

    /// Request-level errors abort every card of the request, the rest only the card at hand.
    pub fn aborts_request(&self) -> bool {
        matches!(
            self,
            SyncError::MissingRequiredField(_) | SyncError::InvalidReference { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        assert_eq!(
            SyncError::MissingRequiredField(FormField::Card).to_string(),
            "You must fill in the field \"Card Number\"."
        );
        assert_eq!(
            SyncError::invalid(FormField::Board, "Board does not exist.").to_string(),
            "Board does not exist."
        );
        assert_eq!(
            SyncError::DuplicateCard {
                card_id: "c1".into(),
                name: "Fix login".into()
            }
            .to_string(),
            "Card \"Fix login\" already exists"
        );
    }

    #[test]
    fn request_level_errors() {
        assert!(SyncError::MissingRequiredField(FormField::Milestone).aborts_request());
        assert!(SyncError::invalid(FormField::List, "x").aborts_request());
        assert!(!SyncError::MissingUserMapping {
            member_id: "m".into()
        }
        .aborts_request());
    }
}
