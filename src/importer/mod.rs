pub mod mode;


use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::config::{AppConfig, TimestampUnit};
use crate::error::SyncError;
use crate::model::card::CardSnapshot;
use crate::model::ticket::{CustomField, TicketComment, TicketFields, CARD_LINK_FIELD};
use crate::util::wiki::{markdown_to_wiki, LINE_BREAK as BR};

static SIZE_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\(([0-9]+)\) ").unwrap());

/// Maps a Trello member id to a Trac username.
pub trait IdentityLookup {
    fn local_user(&self, member_id: &str) -> Option<String>;
}

impl<F> IdentityLookup for F
where
    F: Fn(&str) -> Option<String>,
{
    fn local_user(&self, member_id: &str) -> Option<String> {
        self(member_id)
    }
}

impl IdentityLookup for AppConfig {
    fn local_user(&self, member_id: &str) -> Option<String> {
        self.user_for(member_id).map(String::from)
    }
}

/// What to do with a card member that has no Trac user configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmappedMemberPolicy {
    /// Fail the card with `MissingUserMapping`.
    #[default]
    Reject,
    /// Leave the member out of owner and cc.
    Skip,
}

#[derive(Debug, Clone)]
pub struct ImportSettings {
    /// Set when estimation is enabled: custom field that receives the card size.
    pub estimation_field: Option<String>,
    pub agile: bool,
    pub link_text: String,
    pub fallback_user: String,
    pub unmapped_members: UnmappedMemberPolicy,
    pub timestamp_unit: TimestampUnit,
    pub ticket_type: String,
    pub severity: String,
    pub priority: String,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            estimation_field: None,
            agile: false,
            link_text: "vai a Trello".into(),
            fallback_user: "trello".into(),
            unmapped_members: UnmappedMemberPolicy::Reject,
            timestamp_unit: TimestampUnit::Seconds,
            ticket_type: "task".into(),
            severity: "normale".into(),
            priority: "normale".into(),
        }
    }
}

/// Where the new ticket goes in Trac.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub milestone: String,
    pub iteration: Option<i64>,
}

/// Split a leading `(N) ` size marker off a card title.
pub fn split_size(title: &str) -> (Option<String>, String) {
    match SIZE_PREFIX.captures(title) {
        Some(caps) => {
            let size = caps[1].to_string();
            let summary = title[caps[0].len()..].to_string();
            (Some(size), summary)
        }
        None => (None, title.to_string()),
    }
}

pub struct CardImporter<'a, U: IdentityLookup + ?Sized> {
    settings: &'a ImportSettings,
    users: &'a U,
}

impl<'a, U: IdentityLookup + ?Sized> CardImporter<'a, U> {
    pub fn new(settings: &'a ImportSettings, users: &'a U) -> Self {
        Self { settings, users }
    }

    /// Shape a fetched card into the rows of one Trac ticket.
    ///
    /// `is_linked` tells whether a ticket already points at the card; a linked card
    /// fails with `DuplicateCard` before anything else is resolved.
    pub fn assemble(
        &self,
        card: &CardSnapshot,
        destination: &Destination,
        is_linked: impl FnOnce(&str) -> Result<bool, SyncError>,
    ) -> Result<TicketFields, SyncError> {
        if is_linked(&card.id)? {
            return Err(SyncError::DuplicateCard {
                card_id: card.id.clone(),
                name: card.name.clone(),
            });
        }

        let (size, summary) = if self.settings.estimation_field.is_some() {
            split_size(&card.name)
        } else {
            (None, card.name.clone())
        };

        let reporter = card
            .creator_id
            .as_deref()
            .and_then(|id| self.users.local_user(id))
            .unwrap_or_else(|| self.settings.fallback_user.clone());

        let owner = match card.members.first() {
            Some(id) => self.member(id)?,
            None => None,
        };
        let cc = card
            .members
            .iter()
            .skip(1)
            .map(|id| self.member(id))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(",");

        // Trac numbers comments oldest first; Trello lists them newest first.
        let mut ordered: Vec<_> = card.comments.iter().collect();
        ordered.sort_by_key(|c| c.date);

        let unit = self.settings.timestamp_unit;
        let comments = ordered
            .into_iter()
            .map(|c| TicketComment {
                time: unit.stamp(c.date),
                author: self.author(&c.author_id),
                text: markdown_to_wiki(&c.text),
            })
            .collect();

        let mut custom_fields = vec![CustomField {
            name: CARD_LINK_FIELD.into(),
            value: card.id.clone(),
        }];
        if let (Some(field), Some(size)) = (&self.settings.estimation_field, &size) {
            custom_fields.push(CustomField {
                name: field.clone(),
                value: size.clone(),
            });
        }

        let iteration = if self.settings.agile {
            destination.iteration
        } else {
            None
        };

        Ok(TicketFields {
            ticket_type: self.settings.ticket_type.clone(),
            time: unit.stamp(card.created_at),
            severity: self.settings.severity.clone(),
            priority: self.settings.priority.clone(),
            owner,
            reporter,
            cc,
            milestone: destination.milestone.clone(),
            summary,
            description: describe(card, &self.settings.link_text),
            size,
            custom_fields,
            comments,
            iteration,
        })
    }

    fn member(&self, id: &str) -> Result<Option<String>, SyncError> {
        match self.users.local_user(id) {
            Some(user) => Ok(Some(user)),
            None => match self.settings.unmapped_members {
                UnmappedMemberPolicy::Reject => Err(SyncError::MissingUserMapping {
                    member_id: id.to_string(),
                }),
                UnmappedMemberPolicy::Skip => {
                    tracing::warn!(member = id, "no Trac user for Trello member, leaving it out");
                    Ok(None)
                }
            },
        }
    }

    /// Comment authors fall back to the configured identity instead of failing the card.
    pub fn author(&self, id: &str) -> String {
        self.users
            .local_user(id)
            .unwrap_or_else(|| self.settings.fallback_user.clone())
    }
}

/// Ticket description: card link, converted description, then checklists,
/// attachments and labels when the card has any.
pub fn describe(card: &CardSnapshot, link_text: &str) -> String {
    let mut desc = format!("'''Card Link:'''{BR}\n[{} {link_text}] {BR} \n", card.url);
    desc.push_str(&format!(
        "{BR}'''Description:'''{BR}\n{} {BR} \n",
        markdown_to_wiki(&card.description)
    ));

    if !card.checklists.is_empty() {
        desc.push_str(&format!("{BR} \n'''Checklists:''' {BR}\n"));
        for checklist in &card.checklists {
            desc.push_str(&format!("''{}'' {BR}\n", markdown_to_wiki(&checklist.name)));
            for item in &checklist.items {
                desc.push_str(&format!(" * {}\n", markdown_to_wiki(item)));
            }
        }
    }

    if !card.attachments.is_empty() {
        desc.push_str(&format!("{BR} \n'''Attachments:''' {BR}\n"));
        for attachment in &card.attachments {
            desc.push_str(&format!("''[{} {}]'' {BR}\n", attachment.url, attachment.name));
        }
    }

    if !card.labels.is_empty() {
        desc.push_str(&format!("{BR} \n'''Label:''' {BR}\n"));
        for label in &card.labels {
            if label.name.is_empty() {
                desc.push_str(&format!("''{}'' {BR}\n", label.color));
            } else {
                desc.push_str(&format!("''{}: {}'' {BR}\n", label.color, label.name));
            }
        }
    }

    desc
}
