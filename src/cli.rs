use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::config;
use crate::importer::mode::{ImportForm, ImportMode};
use crate::server;
use crate::sync::{ImportReport, SyncService};
use crate::trac::TracStore;
use crate::trello::client::TrelloClient;
use crate::util::wiki::markdown_to_wiki;

#[derive(Parser, Debug)]
#[command(
    name = "trello-trac",
    version,
    about = "Import Trello cards into Trac tickets and keep their comments in sync"
)]
pub struct Cli {
    /// Config file (default: ~/.trello-trac/config.toml or $TRELLO_TRAC_CONFIG)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import every card of a Trello list
    ImportList {
        #[arg(long)]
        board: String,
        #[arg(long)]
        list: String,
        #[command(flatten)]
        target: Target,
    },
    /// Import a single card
    ImportCard {
        #[arg(long)]
        board: String,
        /// Card number as shown on the board, or the full card id with --remote
        #[arg(long)]
        card: String,
        /// Treat --card as a full Trello card id
        #[arg(long)]
        remote: bool,
        #[command(flatten)]
        target: Target,
    },
    /// Convert Trello markdown to Trac wiki markup (reads stdin without FILE)
    Convert { file: Option<PathBuf> },
    /// Run the webhook and send-to-Trac HTTP endpoints
    Serve {
        /// Listen address, overrides [server] bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// Copy a Trac comment to the ticket's Trello card
    Comment {
        #[arg(long)]
        ticket: i64,
        #[arg(long)]
        text: String,
    },
    /// List the active milestones
    Milestones,
    /// Show the configured boards and lists
    Boards,
}

#[derive(Args, Debug)]
pub struct Target {
    #[arg(long)]
    milestone: String,
    /// Iteration id, required when agile_trac is on
    #[arg(long, default_value = "")]
    iteration: String,
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Convert { file } => convert(file.as_deref()),
        Command::ImportList {
            board,
            list,
            target,
        } => {
            let form = ImportForm {
                board,
                list,
                milestone: target.milestone,
                iteration: target.iteration,
                ..Default::default()
            };
            import(cli.config.as_deref(), ImportMode::List, &form).await
        }
        Command::ImportCard {
            board,
            card,
            remote,
            target,
        } => {
            let form = ImportForm {
                board,
                card,
                milestone: target.milestone,
                iteration: target.iteration,
                ..Default::default()
            };
            let mode = if remote {
                ImportMode::Remote
            } else {
                ImportMode::Card
            };
            import(cli.config.as_deref(), mode, &form).await
        }
        Command::Serve { bind } => {
            let config = config::load_config(cli.config.as_deref())?;
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let service = connect(config)?;
            server::serve(service, &bind).await
        }
        Command::Comment { ticket, text } => {
            let service = connect(config::load_config(cli.config.as_deref())?)?;
            if service.push_comment(ticket, &text).await? {
                println!("Comment added to the Trello card of ticket #{ticket}");
            } else if text.trim().is_empty() {
                println!("Nothing to send");
            } else {
                println!("Ticket #{ticket} is not linked to a Trello card");
            }
            Ok(())
        }
        Command::Milestones => {
            let service = connect(config::load_config(cli.config.as_deref())?)?;
            for name in service.active_milestones().await? {
                println!("{name}");
            }
            Ok(())
        }
        Command::Boards => {
            let service = connect(config::load_config(cli.config.as_deref())?)?;
            let (boards, lists) =
                tokio::try_join!(service.configured_boards(), service.configured_lists())?;
            println!("Boards:");
            for board in boards {
                println!("  {}  {}", board.id, board.name);
            }
            println!("Lists:");
            for list in lists {
                println!("  {}  {}  (board {})", list.id, list.name, list.board_id);
            }
            Ok(())
        }
    }
}

/// Open the Trac database and the Trello client described by `config`.
fn connect(config: config::AppConfig) -> Result<SyncService> {
    let db = &config.project.database;
    let store = TracStore::open(db)
        .with_context(|| format!("Failed to open Trac database {}", db.display()))?;
    let missing = store
        .missing_tables(config.trello.agile_trac)
        .with_context(|| format!("Failed to inspect Trac database {}", db.display()))?;
    if !missing.is_empty() {
        bail!(
            "{} is not a Trac database with the expected tables, missing: {}",
            db.display(),
            missing.join(", ")
        );
    }
    let client = TrelloClient::new(config.trello.api_key.clone(), config.trello.token.clone());
    Ok(SyncService::new(Arc::new(client), store, config))
}

async fn import(config_path: Option<&Path>, mode: ImportMode, form: &ImportForm) -> Result<()> {
    let service = connect(config::load_config(config_path)?)?;
    let report = service.import(mode, form).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &ImportReport) {
    if report.outcomes.is_empty() {
        println!("No cards to import");
        return;
    }
    for outcome in &report.outcomes {
        println!("{outcome}");
    }
    println!("{} imported, {} skipped", report.created(), report.failed());
}

fn convert(file: Option<&Path>) -> Result<()> {
    let text = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };
    if text.is_empty() && file.is_none() {
        bail!("Nothing to convert: pass a FILE or pipe text on stdin");
    }
    print!("{}", markdown_to_wiki(&text));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("trello-trac").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn parse_import_list() {
        let cli = parse(&[
            "import-list",
            "--board",
            "b1",
            "--list",
            "l1",
            "--milestone",
            "m1",
        ]);
        match cli.command {
            Command::ImportList {
                board,
                list,
                target,
            } => {
                assert_eq!(board, "b1");
                assert_eq!(list, "l1");
                assert_eq!(target.milestone, "m1");
                assert_eq!(target.iteration, "");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parse_import_card_remote() {
        let cli = parse(&[
            "import-card",
            "--board",
            "b1",
            "--card",
            "5f0c",
            "--remote",
            "--milestone",
            "m1",
            "--iteration",
            "3",
        ]);
        match cli.command {
            Command::ImportCard {
                card,
                remote,
                target,
                ..
            } => {
                assert_eq!(card, "5f0c");
                assert!(remote);
                assert_eq!(target.iteration, "3");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = parse(&["milestones", "--config", "/tmp/c.toml", "-v"]);
        assert!(cli.verbose);
        assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/c.toml")));
        assert!(matches!(cli.command, Command::Milestones));
    }

    #[test]
    fn parse_comment() {
        let cli = parse(&["comment", "--ticket", "12", "--text", "done"]);
        match cli.command {
            Command::Comment { ticket, text } => {
                assert_eq!(ticket, 12);
                assert_eq!(text, "done");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn import_list_requires_milestone() {
        let result = Cli::try_parse_from(["trello-trac", "import-list", "--board", "b", "--list", "l"]);
        assert!(result.is_err());
    }

    #[test]
    fn connect_rejects_database_without_trac_tables() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("trac.db");
        let config: config::AppConfig = toml::from_str(&format!(
            "[trello]\napi_key = \"k\"\ntoken = \"t\"\n\n[project]\nurl = \"https://trac.example.com\"\ndatabase = {:?}\n",
            db.display().to_string()
        ))
        .unwrap();

        let err = connect(config).err().unwrap();
        assert!(err.to_string().contains("missing: ticket, ticket_change"));

        let tables: i64 = rusqlite::Connection::open(&db)
            .unwrap()
            .query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get(0))
            .unwrap();
        assert_eq!(tables, 0);
    }

    #[test]
    fn convert_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("card.md");
        std::fs::write(&path, "**bold**").unwrap();
        assert!(convert(Some(&path)).is_ok());
        assert!(convert(Some(&dir.path().join("missing.md"))).is_err());
    }
}
