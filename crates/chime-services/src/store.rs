//! Agent persistence collaborator.
//!
//! The real store keeps agent records in `SQLite`, one row per agent with
//! the record body as opaque JSON. The mock keeps records in memory; runs
//! that persist through the mock survive only for the process lifetime.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, instrument};

use chime_core::ids::AgentId;

use crate::errors::ServiceError;
use crate::types::{AgentRecord, ServiceVariant};

/// Persists agent records.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Which implementation this is.
    fn variant(&self) -> ServiceVariant;

    /// Cheap health check, called once at pipeline construction.
    async fn probe(&self) -> Result<(), ServiceError>;

    /// Insert a new agent record.
    async fn create_agent(&self, record: &AgentRecord) -> Result<(), ServiceError>;

    /// Fetch an agent record by ID.
    async fn get_agent(&self, id: &AgentId) -> Result<Option<AgentRecord>, ServiceError>;

    /// Replace an existing agent record.
    async fn update_agent(&self, record: &AgentRecord) -> Result<(), ServiceError>;

    /// Delete an agent record. Returns whether a row was removed.
    async fn delete_agent(&self, id: &AgentId) -> Result<bool, ServiceError>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS agents (
    agent_id   TEXT PRIMARY KEY,
    tenant_id  TEXT NOT NULL,
    record     TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_agents_tenant ON agents(tenant_id);
";

/// `SQLite`-backed agent store.
///
/// A single connection behind a mutex: agent writes are rare (one per
/// pipeline run) so pooling buys nothing here.
pub struct SqliteAgentStore {
    conn: Mutex<Connection>,
}

impl SqliteAgentStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, ServiceError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store, for tests.
    pub fn open_in_memory() -> Result<Self, ServiceError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn encode(record: &AgentRecord) -> Result<String, ServiceError> {
        serde_json::to_string(record).map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl AgentStore for SqliteAgentStore {
    fn variant(&self) -> ServiceVariant {
        ServiceVariant::Real
    }

    async fn probe(&self) -> Result<(), ServiceError> {
        let conn = self.conn.lock();
        let _: i64 = conn.query_row("SELECT COUNT(*) FROM agents", [], |row| row.get(0))?;
        Ok(())
    }

    #[instrument(skip(self, record), fields(agent_id = %record.agent_id))]
    async fn create_agent(&self, record: &AgentRecord) -> Result<(), ServiceError> {
        let body = Self::encode(record)?;
        let conn = self.conn.lock();
        let _ = conn.execute(
            "INSERT INTO agents (agent_id, tenant_id, record, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.agent_id.as_str(),
                record.tenant_id,
                body,
                record.created_at
            ],
        )?;
        debug!("agent persisted");
        Ok(())
    }

    async fn get_agent(&self, id: &AgentId) -> Result<Option<AgentRecord>, ServiceError> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .query_row(
                "SELECT record FROM agents WHERE agent_id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| ServiceError::InvalidResponse(e.to_string())),
            None => Ok(None),
        }
    }

    async fn update_agent(&self, record: &AgentRecord) -> Result<(), ServiceError> {
        let body = Self::encode(record)?;
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE agents SET record = ?2 WHERE agent_id = ?1",
            params![record.agent_id.as_str(), body],
        )?;
        if changed == 0 {
            return Err(ServiceError::NotFound(format!(
                "agent {}",
                record.agent_id
            )));
        }
        Ok(())
    }

    async fn delete_agent(&self, id: &AgentId) -> Result<bool, ServiceError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "DELETE FROM agents WHERE agent_id = ?1",
            params![id.as_str()],
        )?;
        Ok(changed > 0)
    }
}

/// In-memory agent store.
#[derive(Default)]
pub struct MockAgentStore {
    agents: Mutex<HashMap<AgentId, AgentRecord>>,
}

impl MockAgentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored agents, for tests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.lock().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.lock().is_empty()
    }
}

#[async_trait]
impl AgentStore for MockAgentStore {
    fn variant(&self) -> ServiceVariant {
        ServiceVariant::Mock
    }

    async fn probe(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn create_agent(&self, record: &AgentRecord) -> Result<(), ServiceError> {
        let _ = self
            .agents
            .lock()
            .insert(record.agent_id.clone(), record.clone());
        Ok(())
    }

    async fn get_agent(&self, id: &AgentId) -> Result<Option<AgentRecord>, ServiceError> {
        Ok(self.agents.lock().get(id).cloned())
    }

    async fn update_agent(&self, record: &AgentRecord) -> Result<(), ServiceError> {
        let mut agents = self.agents.lock();
        if !agents.contains_key(&record.agent_id) {
            return Err(ServiceError::NotFound(format!(
                "agent {}",
                record.agent_id
            )));
        }
        let _ = agents.insert(record.agent_id.clone(), record.clone());
        Ok(())
    }

    async fn delete_agent(&self, id: &AgentId) -> Result<bool, ServiceError> {
        Ok(self.agents.lock().remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KnowledgeBase;
    use chime_core::timestamp::now_rfc3339;

    fn make_record(id: &str) -> AgentRecord {
        AgentRecord {
            agent_id: AgentId::from_string(id),
            tenant_id: "tenant_1".into(),
            name: "Front Desk".into(),
            greeting: Some("Hi, how can I help?".into()),
            voice: None,
            phone_number: Some("+14155550100".into()),
            knowledge_base: KnowledgeBase::empty(),
            created_at: now_rfc3339(),
        }
    }

    #[tokio::test]
    async fn sqlite_round_trip() {
        let store = SqliteAgentStore::open_in_memory().unwrap();
        assert!(store.probe().await.is_ok());

        let record = make_record("agent_1");
        store.create_agent(&record).await.unwrap();

        let fetched = store.get_agent(&record.agent_id).await.unwrap().unwrap();
        assert_eq!(fetched, record);
    }

    #[tokio::test]
    async fn sqlite_update_and_delete() {
        let store = SqliteAgentStore::open_in_memory().unwrap();
        let mut record = make_record("agent_1");
        store.create_agent(&record).await.unwrap();

        record.phone_number = None;
        store.update_agent(&record).await.unwrap();
        let fetched = store.get_agent(&record.agent_id).await.unwrap().unwrap();
        assert!(fetched.phone_number.is_none());

        assert!(store.delete_agent(&record.agent_id).await.unwrap());
        assert!(store.get_agent(&record.agent_id).await.unwrap().is_none());
        assert!(!store.delete_agent(&record.agent_id).await.unwrap());
    }

    #[tokio::test]
    async fn sqlite_update_missing_agent_is_not_found() {
        let store = SqliteAgentStore::open_in_memory().unwrap();
        let err = store.update_agent(&make_record("agent_x")).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn sqlite_duplicate_create_fails() {
        let store = SqliteAgentStore::open_in_memory().unwrap();
        let record = make_record("agent_1");
        store.create_agent(&record).await.unwrap();
        assert!(store.create_agent(&record).await.is_err());
    }

    #[tokio::test]
    async fn sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.db");
        let record = make_record("agent_1");
        {
            let store = SqliteAgentStore::open(&path).unwrap();
            store.create_agent(&record).await.unwrap();
        }
        let store = SqliteAgentStore::open(&path).unwrap();
        let fetched = store.get_agent(&record.agent_id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Front Desk");
    }

    #[tokio::test]
    async fn mock_round_trip() {
        let store = MockAgentStore::new();
        assert!(store.is_empty());

        let record = make_record("agent_1");
        store.create_agent(&record).await.unwrap();
        assert_eq!(store.len(), 1);

        let fetched = store.get_agent(&record.agent_id).await.unwrap().unwrap();
        assert_eq!(fetched, record);

        assert!(store.delete_agent(&record.agent_id).await.unwrap());
        assert!(store.is_empty());
    }
}
