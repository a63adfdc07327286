use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::model::ticket::{TicketComment, TicketFields, CARD_LINK_FIELD};

const SCHEMA: &str = include_str!("sql/schema.sql");

const CORE_TABLES: &[&str] = &["ticket", "ticket_change", "ticket_custom", "milestone"];
const AGILE_TABLES: &[&str] = &["iteration", "iteration_ticket"];

/// Ticket persistence against a Trac SQLite database.
pub struct TracStore {
    conn: Connection,
}

impl TracStore {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        // Trac itself writes to the same file
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    // Only for databases this crate owns; a live Trac database is never altered.
    fn ensure_schema(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(SCHEMA)
    }

    /// Tables the sync writes to that the database lacks. The iteration tables
    /// come from the Agile Trac plugin and are only needed with `agile`.
    pub fn missing_tables(&self, agile: bool) -> Result<Vec<&'static str>, rusqlite::Error> {
        let agile_tables: &[&'static str] = if agile { AGILE_TABLES } else { &[] };
        let mut missing = Vec::new();
        for &table in CORE_TABLES.iter().chain(agile_tables) {
            let exists: bool = self.conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                params![table],
                |row| row.get(0),
            )?;
            if !exists {
                missing.push(table);
            }
        }
        Ok(missing)
    }

    /// Ticket already linked to a Trello card, if any.
    pub fn ticket_for_card(&self, card_id: &str) -> Result<Option<i64>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT ticket FROM ticket_custom WHERE name = ?1 AND value = ?2",
                params![CARD_LINK_FIELD, card_id],
                |row| row.get(0),
            )
            .optional()
    }

    pub fn card_for_ticket(&self, ticket: i64) -> Result<Option<String>, rusqlite::Error> {
        let card: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM ticket_custom WHERE name = ?1 AND ticket = ?2",
                params![CARD_LINK_FIELD, ticket],
                |row| row.get(0),
            )
            .optional()?;
        Ok(card.filter(|c| !c.is_empty()))
    }

    /// Write the ticket row with its custom fields, comments and iteration link.
    ///
    /// Everything happens in one transaction: if any statement fails the
    /// transaction is dropped uncommitted and nothing is left behind.
    pub fn create_ticket(&mut self, fields: &TicketFields) -> Result<i64, rusqlite::Error> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO ticket (
                type, time, changetime, component, severity, priority, owner, reporter, cc,
                version, milestone, status, resolution, summary, description, keywords
            ) VALUES (?1, ?2, ?2, '', ?3, ?4, ?5, ?6, ?7, '', ?8, 'new', '', ?9, ?10, '')",
            params![
                fields.ticket_type,
                fields.time,
                fields.severity,
                fields.priority,
                fields.owner.as_deref().unwrap_or_default(),
                fields.reporter,
                fields.cc,
                fields.milestone,
                fields.summary,
                fields.description,
            ],
        )?;
        let ticket = tx.last_insert_rowid();

        for field in &fields.custom_fields {
            tx.execute(
                "INSERT INTO ticket_custom (ticket, name, value) VALUES (?1, ?2, ?3)",
                params![ticket, field.name, field.value],
            )?;
        }

        for comment in &fields.comments {
            insert_comment(&tx, ticket, comment)?;
        }

        if let Some(iteration) = fields.iteration {
            tx.execute(
                "INSERT INTO iteration_ticket (iteration, ticket) VALUES (?1, ?2)",
                params![iteration, ticket],
            )?;
        }

        tx.commit()?;
        Ok(ticket)
    }

    /// Append a comment to an existing ticket and bump its change time.
    pub fn add_comment(&mut self, ticket: i64, comment: &TicketComment) -> Result<(), rusqlite::Error> {
        let tx = self.conn.transaction()?;
        let time = insert_comment(&tx, ticket, comment)?;
        tx.execute(
            "UPDATE ticket SET changetime = MAX(COALESCE(changetime, 0), ?1) WHERE id = ?2",
            params![time, ticket],
        )?;
        tx.commit()
    }

    pub fn active_milestones(&self) -> Result<Vec<String>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM milestone WHERE COALESCE(completed, 0) = 0 ORDER BY name ASC",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    pub fn milestone_exists(&self, name: &str) -> Result<bool, rusqlite::Error> {
        self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM milestone WHERE name = ?1)",
            params![name],
            |row| row.get(0),
        )
    }

    pub fn iteration_exists(&self, id: i64) -> Result<bool, rusqlite::Error> {
        self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM iteration WHERE id = ?1)",
            params![id],
            |row| row.get(0),
        )
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Insert a `comment` change row, numbered after the ticket's existing comments.
///
/// `(ticket, time, field)` is unique in Trac, so a comment landing on an occupied
/// timestamp is moved to the next free one. Returns the time actually used.
fn insert_comment(
    conn: &Connection,
    ticket: i64,
    comment: &TicketComment,
) -> Result<i64, rusqlite::Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM ticket_change WHERE ticket = ?1 AND field = 'comment'",
        params![ticket],
        |row| row.get(0),
    )?;

    let mut time = comment.time;
    while conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM ticket_change WHERE ticket = ?1 AND time = ?2 AND field = 'comment')",
        params![ticket, time],
        |row| row.get::<_, bool>(0),
    )? {
        time += 1;
    }

    conn.execute(
        "INSERT INTO ticket_change (ticket, time, author, field, oldvalue, newvalue)
         VALUES (?1, ?2, ?3, 'comment', ?4, ?5)",
        params![ticket, time, comment.author, (count + 1).to_string(), comment.text],
    )?;
    Ok(time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ticket::CustomField;

    fn make_fields() -> TicketFields {
        TicketFields {
            ticket_type: "task".into(),
            time: 1_500_000_000,
            severity: "normale".into(),
            priority: "normale".into(),
            owner: Some("alice".into()),
            reporter: "anna".into(),
            cc: "bob,carol".into(),
            milestone: "m1".into(),
            summary: "Fix login".into(),
            description: "'''Card Link:'''".into(),
            size: Some("3".into()),
            custom_fields: vec![
                CustomField {
                    name: CARD_LINK_FIELD.into(),
                    value: "card1".into(),
                },
                CustomField {
                    name: "estimatedhours".into(),
                    value: "3".into(),
                },
            ],
            comments: vec![
                TicketComment {
                    time: 1_500_000_100,
                    author: "bob".into(),
                    text: "first".into(),
                },
                TicketComment {
                    time: 1_500_000_100,
                    author: "carol".into(),
                    text: "same second".into(),
                },
            ],
            iteration: Some(4),
        }
    }

    fn count(store: &TracStore, sql: &str) -> i64 {
        store.conn().query_row(sql, [], |row| row.get(0)).unwrap()
    }

    #[test]
    fn create_ticket_writes_every_row() {
        let mut store = TracStore::open_in_memory().unwrap();
        let id = store.create_ticket(&make_fields()).unwrap();

        let (summary, owner, cc, status, time, changetime): (String, String, String, String, i64, i64) = store
            .conn()
            .query_row(
                "SELECT summary, owner, cc, status, time, changetime FROM ticket WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?)),
            )
            .unwrap();
        assert_eq!(summary, "Fix login");
        assert_eq!(owner, "alice");
        assert_eq!(cc, "bob,carol");
        assert_eq!(status, "new");
        assert_eq!(time, 1_500_000_000);
        assert_eq!(changetime, 1_500_000_000);

        assert_eq!(store.ticket_for_card("card1").unwrap(), Some(id));
        assert_eq!(store.card_for_ticket(id).unwrap().as_deref(), Some("card1"));
        assert_eq!(count(&store, "SELECT COUNT(*) FROM ticket_custom"), 2);
        assert_eq!(
            count(&store, "SELECT COUNT(*) FROM iteration_ticket WHERE iteration = 4"),
            1
        );
    }

    #[test]
    fn comments_are_numbered_and_never_collide() {
        let mut store = TracStore::open_in_memory().unwrap();
        let id = store.create_ticket(&make_fields()).unwrap();

        let mut stmt = store
            .conn()
            .prepare("SELECT time, author, oldvalue, newvalue FROM ticket_change WHERE ticket = ?1 ORDER BY time")
            .unwrap();
        let rows: Vec<(i64, String, String, String)> = stmt
            .query_map(params![id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            rows,
            vec![
                (1_500_000_100, "bob".into(), "1".into(), "first".into()),
                (1_500_000_101, "carol".into(), "2".into(), "same second".into()),
            ]
        );
    }

    #[test]
    fn failed_write_leaves_nothing_behind() {
        let mut store = TracStore::open_in_memory().unwrap();
        let mut fields = make_fields();
        // (ticket, name) is unique
        fields.custom_fields.push(CustomField {
            name: CARD_LINK_FIELD.into(),
            value: "again".into(),
        });
        assert!(store.create_ticket(&fields).is_err());
        assert_eq!(count(&store, "SELECT COUNT(*) FROM ticket"), 0);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM ticket_custom"), 0);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM ticket_change"), 0);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM iteration_ticket"), 0);
    }

    #[test]
    fn unlinked_lookups() {
        let store = TracStore::open_in_memory().unwrap();
        assert_eq!(store.ticket_for_card("nope").unwrap(), None);
        assert_eq!(store.card_for_ticket(1).unwrap(), None);
    }

    #[test]
    fn empty_card_link_counts_as_unlinked() {
        let store = TracStore::open_in_memory().unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO ticket_custom (ticket, name, value) VALUES (9, ?1, '')",
                params![CARD_LINK_FIELD],
            )
            .unwrap();
        assert_eq!(store.card_for_ticket(9).unwrap(), None);
    }

    #[test]
    fn add_comment_bumps_changetime() {
        let mut store = TracStore::open_in_memory().unwrap();
        let mut fields = make_fields();
        fields.comments.clear();
        let id = store.create_ticket(&fields).unwrap();

        store
            .add_comment(
                id,
                &TicketComment {
                    time: 1_600_000_000,
                    author: "bob".into(),
                    text: "[trello] hi".into(),
                },
            )
            .unwrap();

        let changetime = count(&store, "SELECT changetime FROM ticket");
        assert_eq!(changetime, 1_600_000_000);
        assert_eq!(
            count(&store, "SELECT COUNT(*) FROM ticket_change WHERE newvalue = '[trello] hi'"),
            1
        );
    }

    #[test]
    fn milestones_and_iterations() {
        let store = TracStore::open_in_memory().unwrap();
        store
            .conn()
            .execute_batch(
                "INSERT INTO milestone (name, completed) VALUES ('b-release', 0);
                 INSERT INTO milestone (name, completed) VALUES ('a-release', NULL);
                 INSERT INTO milestone (name, completed) VALUES ('done', 1400000000);
                 INSERT INTO iteration (id, name) VALUES (7, 'sprint 7');",
            )
            .unwrap();

        assert_eq!(store.active_milestones().unwrap(), vec!["a-release", "b-release"]);
        assert!(store.milestone_exists("done").unwrap());
        assert!(!store.milestone_exists("missing").unwrap());
        assert!(store.iteration_exists(7).unwrap());
        assert!(!store.iteration_exists(8).unwrap());
    }

    #[test]
    fn schema_is_idempotent() {
        let store = TracStore::open_in_memory().unwrap();
        store.ensure_schema().unwrap();
        assert!(store.missing_tables(true).unwrap().is_empty());
    }

    #[test]
    fn open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trac.db");
        {
            let mut store = TracStore::open(&path).unwrap();
            store.ensure_schema().unwrap();
            store.create_ticket(&make_fields()).unwrap();
        }
        let store = TracStore::open(&path).unwrap();
        assert!(store.ticket_for_card("card1").unwrap().is_some());
    }

    #[test]
    fn open_leaves_the_database_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trac.db");
        let store = TracStore::open(&path).unwrap();
        assert_eq!(
            store.missing_tables(false).unwrap(),
            vec!["ticket", "ticket_change", "ticket_custom", "milestone"]
        );
        let tables: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(tables, 0);
    }

    #[test]
    fn iteration_tables_only_required_in_agile_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trac.db");
        let store = TracStore::open(&path).unwrap();
        store
            .conn()
            .execute_batch(
                "CREATE TABLE ticket (id INTEGER PRIMARY KEY);
                 CREATE TABLE ticket_change (ticket INTEGER);
                 CREATE TABLE ticket_custom (ticket INTEGER);
                 CREATE TABLE milestone (name TEXT);",
            )
            .unwrap();
        assert!(store.missing_tables(false).unwrap().is_empty());
        assert_eq!(
            store.missing_tables(true).unwrap(),
            vec!["iteration", "iteration_ticket"]
        );
    }
}
