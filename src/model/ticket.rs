use serde::Serialize;

/// Name of the ticket custom field that links a ticket back to its Trello card.
pub const CARD_LINK_FIELD: &str = "trellocard";

/// A ticket ready to be written to Trac, plus the rows that hang off it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketFields {
    pub ticket_type: String,
    /// Unix time in the unit configured for the Trac database; used for `time` and `changetime`.
    pub time: i64,
    pub severity: String,
    pub priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub reporter: String,
    pub cc: String,
    pub milestone: String,
    pub summary: String,
    /// Trac wiki markup.
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    pub custom_fields: Vec<CustomField>,
    pub comments: Vec<TicketComment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketComment {
    pub time: i64,
    pub author: String,
    /// Trac wiki markup.
    pub text: String,
}

impl TicketFields {
    pub fn custom_field(&self, name: &str) -> Option<&str> {
        self.custom_fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}
