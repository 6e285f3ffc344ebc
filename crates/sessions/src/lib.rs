//! Session store — one JSON document per session on disk.
//!
//! Storage layout: `<dir>/<id>.json`, one canonical `Session` document
//! each. `save` is the only writer and always goes through a
//! write-to-temp-then-rename in the same directory, so no partial
//! document is ever visible. Corrupt or foreign files are skipped
//! best-effort by `list`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use toolforge_core::error::SessionError;
use toolforge_core::message::Session;

/// Summary row reported by `list`, read best-effort from each document.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: String,
    pub path: PathBuf,
    pub size: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub message_count: Option<usize>,
}

/// A directory of session documents.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, SessionError> {
        // Session ids become filenames; separators and traversal are out.
        if id.is_empty()
            || id.contains('/')
            || id.contains('\\')
            || id.contains("..")
            || id.starts_with('.')
        {
            return Err(SessionError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    /// Load an existing session, or construct an empty one with the
    /// given id (or a fresh UUID when none is supplied).
    pub fn get_or_create(&self, id: Option<&str>) -> Result<Session, SessionError> {
        if let Some(id) = id
            && let Some(session) = self.load(id)?
        {
            return Ok(session);
        }
        Ok(Session::new(id))
    }

    /// Return the session, or `None` when the document is absent.
    /// Other I/O errors surface.
    pub fn load(&self, id: &str) -> Result<Option<Session>, SessionError> {
        let path = self.path_for(id)?;
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SessionError::Io {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };
        let session = serde_json::from_str(&content).map_err(|e| SessionError::Malformed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(session))
    }

    /// Persist the session, refreshing `updated_at`. The document is
    /// fully rewritten atomically.
    pub fn save(&self, session: &mut Session) -> Result<(), SessionError> {
        let path = self.path_for(&session.id)?;
        session.updated_at = Utc::now();

        std::fs::create_dir_all(&self.dir).map_err(|e| SessionError::Io {
            path: self.dir.display().to_string(),
            reason: e.to_string(),
        })?;

        let content =
            serde_json::to_string_pretty(session).map_err(|e| SessionError::Malformed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| SessionError::Io {
            path: self.dir.display().to_string(),
            reason: e.to_string(),
        })?;
        std::io::Write::write_all(&mut tmp, content.as_bytes()).map_err(|e| SessionError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        tmp.persist(&path).map_err(|e| SessionError::Io {
            path: path.display().to_string(),
            reason: e.error.to_string(),
        })?;

        debug!(session = %session.id, messages = session.messages.len(), "Session saved");
        Ok(())
    }

    /// Remove the document. Returns whether it existed.
    pub fn delete(&self, id: &str) -> Result<bool, SessionError> {
        let path = self.path_for(id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SessionError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Enumerate `*.json` documents, newest first by `updated_at`.
    /// Unreadable documents still get a row with what is known.
    pub fn list(&self) -> Result<Vec<SessionSummary>, SessionError> {
        let reader = match std::fs::read_dir(&self.dir) {
            Ok(r) => r,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SessionError::Io {
                    path: self.dir.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let mut summaries = Vec::new();
        for entry in reader.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let id = match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => stem.to_string(),
                None => continue,
            };
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);

            let mut summary = SessionSummary {
                id,
                path: path.clone(),
                size,
                created_at: None,
                updated_at: None,
                message_count: None,
            };

            match std::fs::read_to_string(&path)
                .ok()
                .and_then(|c| serde_json::from_str::<Session>(&c).ok())
            {
                Some(session) => {
                    summary.created_at = Some(session.created_at);
                    summary.updated_at = Some(session.updated_at);
                    summary.message_count = Some(session.messages.len());
                }
                None => {
                    warn!(path = %path.display(), "Skipping unreadable session document fields");
                }
            }
            summaries.push(summary);
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    /// Render a human-readable transcript of one session.
    pub fn export_markdown(&self, id: &str) -> Result<String, SessionError> {
        let session = self
            .load(id)?
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;

        let mut out = String::new();
        out.push_str(&format!("# Session {}\n\n", session.id));
        out.push_str(&format!("- created: {}\n", session.created_at.to_rfc3339()));
        out.push_str(&format!("- updated: {}\n", session.updated_at.to_rfc3339()));
        out.push_str(&format!("- messages: {}\n", session.messages.len()));

        for message in &session.messages {
            out.push_str(&format!("\n## {}\n\n", message.role().to_uppercase()));
            out.push_str(message.content().trim());
            out.push('\n');
        }

        Ok(out)
    }

    /// Delete every session whose `updated_at` is older than `days` days.
    /// Returns the deleted ids.
    pub fn prune_older_than(&self, days: i64) -> Result<Vec<String>, SessionError> {
        let cutoff = Utc::now() - Duration::days(days);
        let mut deleted = Vec::new();

        for summary in self.list()? {
            let Some(updated_at) = summary.updated_at else {
                continue;
            };
            if updated_at < cutoff && self.delete(&summary.id)? {
                deleted.push(summary.id);
            }
        }

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolforge_core::message::Message;

    fn store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("sessions"));
        (dir, store)
    }

    #[test]
    fn get_or_create_fresh_and_existing() {
        let (_guard, store) = store();

        let mut session = store.get_or_create(Some("tg-1")).unwrap();
        assert_eq!(session.id, "tg-1");
        session.push(Message::user("hi"));
        store.save(&mut session).unwrap();

        let again = store.get_or_create(Some("tg-1")).unwrap();
        assert_eq!(again.messages.len(), 1);

        let anonymous = store.get_or_create(None).unwrap();
        assert_eq!(anonymous.id.len(), 36);
    }

    #[test]
    fn save_load_roundtrip_modulo_updated_at() {
        let (_guard, store) = store();

        let mut session = Session::new(Some("round"));
        session.push(Message::user("ping"));
        session.push(Message::assistant("pong"));
        store.save(&mut session).unwrap();

        let loaded = store.load("round").unwrap().unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.created_at, session.created_at);
        assert_eq!(loaded.messages, session.messages);
        assert_eq!(loaded.updated_at, session.updated_at);
    }

    #[test]
    fn load_missing_is_none() {
        let (_guard, store) = store();
        assert!(store.load("nope").unwrap().is_none());
    }

    #[test]
    fn invalid_ids_rejected() {
        let (_guard, store) = store();
        for bad in ["", "../evil", "a/b", ".hidden"] {
            assert!(matches!(
                store.load(bad),
                Err(SessionError::InvalidId(_))
            ));
        }
    }

    #[test]
    fn delete_reports_existence() {
        let (_guard, store) = store();
        let mut session = Session::new(Some("gone"));
        store.save(&mut session).unwrap();

        assert!(store.delete("gone").unwrap());
        assert!(!store.delete("gone").unwrap());
    }

    #[test]
    fn list_sorted_by_updated_desc() {
        let (_guard, store) = store();

        let mut older = Session::new(Some("older"));
        store.save(&mut older).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let mut newer = Session::new(Some("newer"));
        newer.push(Message::user("x"));
        store.save(&mut newer).unwrap();

        let list = store.list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, "newer");
        assert_eq!(list[0].message_count, Some(1));
        assert_eq!(list[1].id, "older");
        assert!(list[0].size > 0);
    }

    #[test]
    fn list_tolerates_corrupt_documents() {
        let (_guard, store) = store();
        let mut session = Session::new(Some("good"));
        store.save(&mut session).unwrap();
        std::fs::write(store.dir().join("bad.json"), "{not json").unwrap();

        let list = store.list().unwrap();
        assert_eq!(list.len(), 2);
        let bad = list.iter().find(|s| s.id == "bad").unwrap();
        assert!(bad.message_count.is_none());
    }

    #[test]
    fn export_markdown_renders_transcript() {
        let (_guard, store) = store();
        let mut session = Session::new(Some("md"));
        session.push(Message::user("  What is 2+2?  "));
        session.push(Message::assistant("4"));
        store.save(&mut session).unwrap();

        let md = store.export_markdown("md").unwrap();
        assert!(md.starts_with("# Session md"));
        assert!(md.contains("- messages: 2"));
        assert!(md.contains("## USER"));
        assert!(md.contains("What is 2+2?"));
        assert!(md.contains("## ASSISTANT"));

        assert!(matches!(
            store.export_markdown("absent"),
            Err(SessionError::NotFound(_))
        ));
    }

    #[test]
    fn prune_deletes_only_stale_sessions_and_is_idempotent() {
        let (_guard, store) = store();

        let mut stale = Session::new(Some("stale"));
        store.save(&mut stale).unwrap();
        // Age the document on disk by rewriting its timestamp directly.
        let path = store.dir().join("stale.json");
        let content = std::fs::read_to_string(&path).unwrap();
        let mut doc: serde_json::Value = serde_json::from_str(&content).unwrap();
        let old = (Utc::now() - Duration::days(40)).to_rfc3339();
        doc["updated_at"] = serde_json::json!(old);
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

        let mut fresh = Session::new(Some("fresh"));
        store.save(&mut fresh).unwrap();

        let deleted = store.prune_older_than(30).unwrap();
        assert_eq!(deleted, vec!["stale".to_string()]);
        assert!(store.load("fresh").unwrap().is_some());

        // Second pass with no intervening writes deletes nothing.
        let deleted = store.prune_older_than(30).unwrap();
        assert!(deleted.is_empty());
    }
}
