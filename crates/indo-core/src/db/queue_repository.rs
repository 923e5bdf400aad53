//! Mutation queue repository implementation

use crate::error::{Error, Result};
use crate::models::{MutationId, MutationPayload, QueuedMutation};
use libsql::Connection;

/// Storage contract for pending mutations (async)
#[allow(async_fn_in_trait)]
pub trait MutationQueueRepository {
    /// Insert one mutation; each call is an independent row insert
    async fn insert(&self, mutation: &QueuedMutation) -> Result<()>;

    /// All pending mutations, oldest first
    async fn list_pending(&self) -> Result<Vec<QueuedMutation>>;

    /// Remove a mutation once the remote store confirmed it
    async fn delete(&self, id: &MutationId) -> Result<()>;

    /// Number of pending mutations
    async fn count(&self) -> Result<usize>;
}

/// libSQL implementation of `MutationQueueRepository`
pub struct LibSqlMutationQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlMutationQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a queued mutation from a database row
    fn parse_mutation(row: &libsql::Row) -> Result<QueuedMutation> {
        let id: String = row.get(0)?;
        let payload: String = row.get(1)?;
        let created_at: i64 = row.get(2)?;

        let id = id
            .parse()
            .map_err(|_| Error::Database(format!("Invalid mutation ID in queue: {id}")))?;
        let payload: MutationPayload = serde_json::from_str(&payload)?;

        Ok(QueuedMutation {
            id,
            payload,
            created_at,
        })
    }
}

impl MutationQueueRepository for LibSqlMutationQueueRepository<'_> {
    async fn insert(&self, mutation: &QueuedMutation) -> Result<()> {
        let payload = serde_json::to_string(&mutation.payload)?;

        self.conn
            .execute(
                "INSERT INTO mutation_queue (id, entity_table, action, payload, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                libsql::params![
                    mutation.id.as_str(),
                    mutation.entity_table().as_str(),
                    mutation.action().as_str(),
                    payload,
                    mutation.created_at
                ],
            )
            .await?;

        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<QueuedMutation>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, payload, created_at
                 FROM mutation_queue
                 ORDER BY created_at ASC, seq ASC",
                (),
            )
            .await?;

        let mut mutations = Vec::new();
        while let Some(row) = rows.next().await? {
            mutations.push(Self::parse_mutation(&row)?);
        }

        Ok(mutations)
    }

    async fn delete(&self, id: &MutationId) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM mutation_queue WHERE id = ?",
                libsql::params![id.as_str()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(format!("queued mutation {id}")));
        }

        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM mutation_queue", ())
            .await?;

        let count: i64 = if let Some(row) = rows.next().await? {
            row.get(0)?
        } else {
            0
        };

        Ok(usize::try_from(count).unwrap_or_default())
    }
}
