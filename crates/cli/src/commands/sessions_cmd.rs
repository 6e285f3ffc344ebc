//! `toolforge sessions` — inspect and manage stored sessions.

use clap::Subcommand;

use toolforge_config::AppConfig;
use toolforge_core::{Error, Result};
use toolforge_sessions::SessionStore;

#[derive(Subcommand)]
pub enum SessionsAction {
    /// List stored sessions, newest first
    List,

    /// Print a session transcript as markdown
    Export { id: String },

    /// Delete one session
    Delete { id: String },

    /// Delete sessions untouched for more than N days
    Prune {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
}

pub fn run(action: SessionsAction) -> Result<()> {
    let config = AppConfig::load()?;
    let store = SessionStore::new(config.sessions_dir());

    match action {
        SessionsAction::List => {
            let summaries = store.list()?;
            if summaries.is_empty() {
                println!("No sessions.");
                return Ok(());
            }
            for s in summaries {
                println!(
                    "{}  {:>6}B  {:>4} msgs  updated {}",
                    s.id,
                    s.size,
                    s.message_count
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "?".into()),
                    s.updated_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "unknown".into()),
                );
            }
        }
        SessionsAction::Export { id } => {
            println!("{}", store.export_markdown(&id)?);
        }
        SessionsAction::Delete { id } => {
            if store.delete(&id)? {
                println!("Deleted {id}.");
            } else {
                return Err(Error::Session(
                    toolforge_core::error::SessionError::NotFound(id),
                ));
            }
        }
        SessionsAction::Prune { days } => {
            let deleted = store.prune_older_than(days)?;
            if deleted.is_empty() {
                println!("Nothing to prune.");
            } else {
                for id in &deleted {
                    println!("Pruned {id}.");
                }
            }
        }
    }

    Ok(())
}
