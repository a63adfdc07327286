use std::fmt;

use serde::Deserialize;

/// A field of an import request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Board,
    List,
    Card,
    Milestone,
    Iteration,
}

impl FormField {
    pub fn label(&self) -> &'static str {
        match self {
            FormField::Board => "Board",
            FormField::List => "List",
            FormField::Card => "Card Number",
            FormField::Milestone => "Milestone",
            FormField::Iteration => "Iteration",
        }
    }
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a field value is checked once it is known to be non-blank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    BoardExists,
    ListExists,
    /// Board-local short id that must resolve to a card on the board.
    CardOnBoard,
    /// Board id taken as given.
    AnyBoard,
    /// Full card id taken as given.
    CardId,
    MilestoneExists,
    IterationExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Every card of a Trello list.
    List,
    /// One card addressed by its short id on a board.
    Card,
    /// One card addressed by its full id, pushed from outside Trac.
    Remote,
}

const LIST_FIELDS: &[(FormField, Check)] = &[
    (FormField::Board, Check::BoardExists),
    (FormField::List, Check::ListExists),
    (FormField::Milestone, Check::MilestoneExists),
    (FormField::Iteration, Check::IterationExists),
];

const CARD_FIELDS: &[(FormField, Check)] = &[
    (FormField::Board, Check::BoardExists),
    (FormField::Card, Check::CardOnBoard),
    (FormField::Milestone, Check::MilestoneExists),
    (FormField::Iteration, Check::IterationExists),
];

const REMOTE_FIELDS: &[(FormField, Check)] = &[
    (FormField::Board, Check::AnyBoard),
    (FormField::Card, Check::CardId),
    (FormField::Milestone, Check::MilestoneExists),
    (FormField::Iteration, Check::IterationExists),
];

impl ImportMode {
    /// Required fields in validation order. The iteration is only asked for in agile mode.
    pub fn required_fields(self, agile: bool) -> &'static [(FormField, Check)] {
        let all = match self {
            ImportMode::List => LIST_FIELDS,
            ImportMode::Card => CARD_FIELDS,
            ImportMode::Remote => REMOTE_FIELDS,
        };
        if agile {
            all
        } else {
            &all[..all.len() - 1]
        }
    }
}

/// Raw request values, possibly blank.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportForm {
    #[serde(default)]
    pub board: String,
    #[serde(default, alias = "thelist")]
    pub list: String,
    #[serde(default)]
    pub card: String,
    #[serde(default)]
    pub milestone: String,
    #[serde(default)]
    pub iteration: String,
}

impl ImportForm {
    pub fn value(&self, field: FormField) -> &str {
        match field {
            FormField::Board => self.board.trim(),
            FormField::List => self.list.trim(),
            FormField::Card => self.card.trim(),
            FormField::Milestone => self.milestone.trim(),
            FormField::Iteration => self.iteration.trim(),
        }
    }
}
