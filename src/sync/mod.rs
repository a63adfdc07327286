pub mod webhook;


use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::try_join_all;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::SyncError;
use crate::importer::mode::{Check, FormField, ImportForm, ImportMode};
use crate::importer::{CardImporter, Destination, ImportSettings};
use crate::trac::TracStore;
use crate::trello::{BoardInfo, ListInfo, TrelloApi};

/// Prefix for comments copied from Trac to Trello.
pub const FROM_TRAC: &str = "[trac] ";
/// Prefix for comments copied from Trello to Trac.
pub const FROM_TRELLO: &str = "[trello] ";

/// Comments that started on the Trac side are not copied back.
pub fn is_from_trac(text: &str) -> bool {
    text.starts_with(FROM_TRAC.trim_end())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CardSource {
    List(String),
    Card(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ImportRequest {
    source: CardSource,
    destination: Destination,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedTicket {
    pub ticket: i64,
    pub summary: String,
}

#[derive(Debug)]
pub struct CardOutcome {
    pub card_id: String,
    pub result: Result<ImportedTicket, SyncError>,
}

impl fmt::Display for CardOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            Ok(t) => write!(f, "Added card \"{}\" with id: {}", t.summary, t.ticket),
            Err(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub outcomes: Vec<CardOutcome>,
}

impl ImportReport {
    pub fn created(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.created()
    }
}

/// Ties the Trello API, the Trac database and the configuration together.
#[derive(Clone)]
pub struct SyncService {
    trello: Arc<dyn TrelloApi>,
    store: Arc<Mutex<TracStore>>,
    config: Arc<AppConfig>,
    settings: Arc<ImportSettings>,
}

impl SyncService {
    pub fn new(trello: Arc<dyn TrelloApi>, store: TracStore, config: AppConfig) -> Self {
        let settings = config.import_settings();
        Self {
            trello,
            store: Arc::new(Mutex::new(store)),
            config: Arc::new(config),
            settings: Arc::new(settings),
        }
    }

    /// Run `f` against the Trac database on the blocking pool.
    ///
    /// SQLite may wait up to the busy timeout for Trac's own writers, which must
    /// not stall the async workers.
    async fn with_store<T, F>(&self, f: F) -> Result<T, SyncError>
    where
        F: FnOnce(&mut TracStore) -> Result<T, SyncError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let mut store = store.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut store)
        })
        .await?
    }

    #[cfg(test)]
    fn store(&self) -> std::sync::MutexGuard<'_, TracStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate a request, then import every card it names.
    ///
    /// Validation failures abort the whole request. After that each card is
    /// imported on its own and its outcome recorded, so one bad card does not
    /// stop the rest.
    pub async fn import(&self, mode: ImportMode, form: &ImportForm) -> Result<ImportReport, SyncError> {
        let request = self.validate(mode, form).await?;

        let card_ids = match &request.source {
            CardSource::List(list_id) => self
                .trello
                .list_cards(list_id)
                .await?
                .into_iter()
                .map(|c| c.id)
                .collect(),
            CardSource::Card(card_id) => vec![card_id.clone()],
        };

        let mut report = ImportReport::default();
        for card_id in card_ids {
            let result = self.import_card(&card_id, &request.destination).await;
            match &result {
                Ok(t) => info!(card = %card_id, ticket = t.ticket, "imported card"),
                Err(e) => warn!(card = %card_id, error = %e, "card not imported"),
            }
            report.outcomes.push(CardOutcome { card_id, result });
        }
        Ok(report)
    }

    async fn validate(&self, mode: ImportMode, form: &ImportForm) -> Result<ImportRequest, SyncError> {
        let mut board: Option<&str> = None;
        let mut source = None;
        let mut milestone = None;
        let mut iteration = None;

        for &(field, check) in mode.required_fields(self.settings.agile) {
            let value = form.value(field);
            if value.is_empty() {
                return Err(SyncError::MissingRequiredField(field));
            }

            match check {
                Check::BoardExists => {
                    if self.trello.board(value).await?.is_none() {
                        return Err(SyncError::invalid(field, "Board does not exist."));
                    }
                    board = Some(value);
                }
                Check::AnyBoard => board = Some(value),
                Check::ListExists => {
                    let list: Option<ListInfo> = self.trello.list(value).await?;
                    match list {
                        None => return Err(SyncError::invalid(field, "List does not exist.")),
                        Some(list) if board.is_some_and(|b| b != list.board_id) => {
                            return Err(SyncError::invalid(
                                field,
                                "List does not belong to the board.",
                            ))
                        }
                        Some(list) => source = Some(CardSource::List(list.id)),
                    }
                }
                Check::CardOnBoard => {
                    let board_id = board.unwrap_or_default();
                    match self.trello.card_by_short_id(board_id, value).await? {
                        Some(card_id) => source = Some(CardSource::Card(card_id)),
                        None => return Err(SyncError::invalid(field, "Card does not exist.")),
                    }
                }
                Check::CardId => source = Some(CardSource::Card(value.to_string())),
                Check::MilestoneExists => {
                    let name = value.to_string();
                    let exists = self
                        .with_store(move |store| Ok(store.milestone_exists(&name)?))
                        .await?;
                    if !exists {
                        return Err(SyncError::invalid(field, "Milestone does not exist."));
                    }
                    milestone = Some(value.to_string());
                }
                Check::IterationExists => {
                    let Ok(id) = value.parse::<i64>() else {
                        return Err(SyncError::invalid(field, "Iteration must be a number."));
                    };
                    let exists = self
                        .with_store(move |store| Ok(store.iteration_exists(id)?))
                        .await?;
                    if !exists {
                        return Err(SyncError::invalid(field, "Iteration does not exist."));
                    }
                    iteration = Some(id);
                }
            }
        }

        // Every mode names a card source and a milestone, so both are set once the loop succeeds.
        let source = source.ok_or(SyncError::MissingRequiredField(FormField::Card))?;
        let milestone = milestone.ok_or(SyncError::MissingRequiredField(FormField::Milestone))?;
        Ok(ImportRequest {
            source,
            destination: Destination {
                milestone,
                iteration,
            },
        })
    }

    /// Fetch one card, write its ticket and link the ticket back on the card.
    pub async fn import_card(
        &self,
        card_id: &str,
        destination: &Destination,
    ) -> Result<ImportedTicket, SyncError> {
        let card = self.trello.fetch_card(card_id).await?;

        let card_id = card.id.clone();
        let settings = Arc::clone(&self.settings);
        let config = Arc::clone(&self.config);
        let destination = destination.clone();
        let imported = self
            .with_store(move |store| {
                let fields = CardImporter::new(settings.as_ref(), config.as_ref()).assemble(
                    &card,
                    &destination,
                    |id| Ok(store.ticket_for_card(id)?.is_some()),
                )?;
                let ticket = store.create_ticket(&fields)?;
                Ok(ImportedTicket {
                    ticket,
                    summary: fields.summary,
                })
            })
            .await?;

        // The ticket is committed at this point; a missing back link is not worth undoing it.
        let url = self.config.ticket_url(imported.ticket);
        if let Err(e) = self.trello.attach_link(&card_id, &url).await {
            warn!(card = %card_id, ticket = imported.ticket, error = %format!("{e:#}"), "could not attach ticket link to card");
        }

        Ok(imported)
    }

    /// Copy a Trac comment to the linked Trello card, prefixed with `[trac] `.
    ///
    /// Returns false when there was nothing to send: an empty comment or a
    /// ticket that did not come from Trello.
    pub async fn push_comment(&self, ticket: i64, text: &str) -> Result<bool, SyncError> {
        if text.trim().is_empty() {
            return Ok(false);
        }
        let card = self
            .with_store(move |store| Ok(store.card_for_ticket(ticket)?))
            .await?;
        let Some(card) = card else {
            return Ok(false);
        };
        self.trello
            .add_comment(&card, &format!("{FROM_TRAC}{text}"))
            .await?;
        info!(ticket, card = %card, "pushed comment to Trello");
        Ok(true)
    }

    pub async fn active_milestones(&self) -> Result<Vec<String>, SyncError> {
        self.with_store(|store| Ok(store.active_milestones()?)).await
    }

    /// Names of the boards listed in the configuration.
    pub async fn configured_boards(&self) -> Result<Vec<BoardInfo>, SyncError> {
        let boards = try_join_all(self.config.trello.boards.iter().map(|id| self.trello.board(id))).await?;
        Ok(boards.into_iter().flatten().collect())
    }

    /// Names of the lists listed in the configuration.
    pub async fn configured_lists(&self) -> Result<Vec<ListInfo>, SyncError> {
        let lists = try_join_all(self.config.trello.lists.iter().map(|id| self.trello.list(id))).await?;
        Ok(lists.into_iter().flatten().collect())
    }
}
