//! Sliding-window conversation memory, one window per session

use crate::StoreError;
use chrono::{DateTime, Utc};
use finagent_telemetry::text::truncate_chars;
use finagent_telemetry::AgentKind;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub const DEFAULT_MAX_HISTORY: usize = 10;
pub const NO_HISTORY: &str = "No previous conversation history.";
const CONTEXT_RESPONSE_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub timestamp: DateTime<Utc>,
    pub user_query: String,
    pub agent_response: String,
    pub agent_type: AgentKind,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

struct Inner {
    conn: Connection,
    sessions: HashMap<String, VecDeque<Exchange>>,
}

pub struct ConversationMemory {
    inner: Mutex<Inner>,
    max_history: usize,
}

impl ConversationMemory {
    /// Open the memory database, falling back to an empty in-memory store
    pub fn open(db_path: &Path, max_history: usize) -> Result<Self, StoreError> {
        match Self::try_open(db_path, max_history) {
            Ok(memory) => Ok(memory),
            Err(e) => {
                tracing::warn!(
                    path = %db_path.display(),
                    "memory unavailable, using in-memory store: {e}"
                );
                Self::in_memory(max_history)
            }
        }
    }

    pub fn try_open(db_path: &Path, max_history: usize) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(db_path)?, max_history)
    }

    pub fn in_memory(max_history: usize) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, max_history)
    }

    fn with_connection(conn: Connection, max_history: usize) -> Result<Self, StoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS exchanges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                user_query TEXT NOT NULL,
                agent_response TEXT NOT NULL,
                agent_type TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS idx_exchanges_session ON exchanges(session_id, id);
            ",
        )?;

        if max_history == 0 {
            tracing::warn!("max_history of 0 would discard every exchange, keeping 1");
        }
        let max_history = max_history.max(1);
        let sessions = load_sessions(&conn, max_history)?;
        tracing::debug!(sessions = sessions.len(), "conversation memory loaded");

        Ok(Self {
            inner: Mutex::new(Inner { conn, sessions }),
            max_history,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Append an exchange, dropping the oldest beyond `max_history`
    pub fn add_exchange(
        &self,
        session_id: &str,
        user_query: &str,
        agent_response: &str,
        agent_type: AgentKind,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) {
        let exchange = Exchange {
            timestamp: Utc::now(),
            user_query: user_query.to_string(),
            agent_response: agent_response.to_string(),
            agent_type,
            metadata: metadata.unwrap_or_default(),
        };

        let mut inner = self.lock();
        if let Err(e) = persist_exchange(&mut inner.conn, session_id, &exchange, self.max_history) {
            tracing::warn!(session_id, "failed to persist exchange: {e}");
        }

        let window = inner.sessions.entry(session_id.to_string()).or_default();
        window.push_back(exchange);
        while window.len() > self.max_history {
            window.pop_front();
        }
        tracing::debug!(session_id, len = window.len(), "exchange recorded");
    }

    /// Exchanges oldest first; `None` or `Some(0)` returns the whole window
    pub fn get_history(&self, session_id: &str, last_n: Option<usize>) -> Vec<Exchange> {
        let inner = self.lock();
        let Some(window) = inner.sessions.get(session_id) else {
            return Vec::new();
        };

        let take = match last_n {
            Some(n) if n > 0 => n.min(window.len()),
            _ => window.len(),
        };
        window.iter().skip(window.len() - take).cloned().collect()
    }

    /// Render the last `last_n` exchanges as prompt context
    pub fn get_context_string(&self, session_id: &str, last_n: usize) -> String {
        let history = self.get_history(session_id, Some(last_n));
        if history.is_empty() {
            return NO_HISTORY.to_string();
        }

        let mut context = String::from("Previous conversation:\n");
        for exchange in &history {
            context.push_str(&format!("\nUser: {}\n", exchange.user_query));
            context.push_str(&format!(
                "Assistant: {}...\n",
                truncate_chars(&exchange.agent_response, CONTEXT_RESPONSE_CHARS)
            ));
        }
        context
    }

    /// Forget a session. Clearing an unknown session is a no-op.
    pub fn clear_session(&self, session_id: &str) {
        let mut inner = self.lock();
        inner.sessions.remove(session_id);
        if let Err(e) = inner
            .conn
            .execute("DELETE FROM exchanges WHERE session_id = ?1", params![session_id])
        {
            tracing::warn!(session_id, "failed to clear persisted session: {e}");
        }
        tracing::info!(session_id, "session cleared");
    }

    /// Sessions that currently hold history, sorted
    pub fn list_sessions(&self) -> Vec<String> {
        let inner = self.lock();
        let mut ids: Vec<String> = inner
            .sessions
            .iter()
            .filter(|(_, w)| !w.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

fn persist_exchange(
    conn: &mut Connection,
    session_id: &str,
    exchange: &Exchange,
    max_history: usize,
) -> Result<(), StoreError> {
    let keep = i64::try_from(max_history).unwrap_or(i64::MAX);
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO exchanges (session_id, timestamp, user_query, agent_response, agent_type, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            session_id,
            exchange.timestamp.to_rfc3339(),
            exchange.user_query,
            exchange.agent_response,
            exchange.agent_type.as_str(),
            serde_json::to_string(&exchange.metadata)?,
        ],
    )?;
    tx.execute(
        "DELETE FROM exchanges WHERE session_id = ?1 AND id NOT IN (
            SELECT id FROM exchanges WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2
         )",
        params![session_id, keep],
    )?;
    tx.commit()?;
    Ok(())
}

fn load_sessions(
    conn: &Connection,
    max_history: usize,
) -> Result<HashMap<String, VecDeque<Exchange>>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT session_id, timestamp, user_query, agent_response, agent_type, metadata
         FROM exchanges ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut sessions: HashMap<String, VecDeque<Exchange>> = HashMap::new();
    for row in rows {
        let (session_id, timestamp, user_query, agent_response, agent_type, metadata) = row?;

        let decoded = (
            DateTime::parse_from_rfc3339(&timestamp),
            agent_type.parse::<AgentKind>(),
            serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&metadata),
        );
        let (Ok(timestamp), Ok(agent_type), Ok(metadata)) = decoded else {
            tracing::warn!(session_id, "skipping undecodable exchange row");
            continue;
        };

        let window = sessions.entry(session_id).or_default();
        window.push_back(Exchange {
            timestamp: timestamp.with_timezone(&Utc),
            user_query,
            agent_response,
            agent_type,
            metadata,
        });
        if window.len() > max_history {
            window.pop_front();
        }
    }
    Ok(sessions)
}
