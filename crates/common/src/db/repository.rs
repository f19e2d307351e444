//! Repository pattern for database operations
//!
//! Chat sessions and messages go through SeaORM entities; the scheme table
//! is written and searched through sqlx because of its pgvector column.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::rag::{Role, Turn};
use crate::schemes::SchemeDocument;
use pgvector::Vector;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Nearest-neighbour row from the scheme index
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SchemeHit {
    pub id: String,
    pub scheme_name: String,
    pub content: String,
    /// Cosine distance in [0, 2]
    pub distance: f64,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.conn()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Session Operations
    // ========================================================================

    /// Create a new chat session
    pub async fn create_session(&self, title: &str) -> Result<Session> {
        let session = SessionActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(title.to_string()),
            created_at: Set(chrono::Utc::now().into()),
        };

        session.insert(self.conn()).await.map_err(Into::into)
    }

    /// All sessions, newest first
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        SessionEntity::find()
            .order_by_desc(SessionColumn::CreatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Find session by ID
    pub async fn find_session(&self, id: Uuid) -> Result<Option<Session>> {
        SessionEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Rename a session
    pub async fn update_session_title(&self, id: Uuid, title: &str) -> Result<Session> {
        let mut session: SessionActiveModel = SessionEntity::find_by_id(id)
            .one(self.conn())
            .await?
            .ok_or_else(|| AppError::SessionNotFound { id: id.to_string() })?
            .into();

        session.title = Set(title.to_string());
        session.update(self.conn()).await.map_err(Into::into)
    }

    /// Delete a session and its messages; returns whether it existed
    pub async fn delete_session(&self, id: Uuid) -> Result<bool> {
        let txn = self.conn().begin().await?;

        MessageEntity::delete_many()
            .filter(MessageColumn::SessionId.eq(id))
            .exec(&txn)
            .await?;

        let result = SessionEntity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;
        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Message Operations
    // ========================================================================

    /// Messages of a session, oldest first
    pub async fn session_messages(&self, session_id: Uuid) -> Result<Vec<Message>> {
        MessageEntity::find()
            .filter(MessageColumn::SessionId.eq(session_id))
            .order_by_asc(MessageColumn::CreatedAt)
            .order_by_asc(MessageColumn::Id)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Conversation history of a session
    pub async fn session_history(&self, session_id: Uuid) -> Result<Vec<Turn>> {
        Ok(self
            .session_messages(session_id)
            .await?
            .iter()
            .map(Message::to_turn)
            .collect())
    }

    /// Append a turn to a session
    pub async fn add_message(&self, session_id: Uuid, role: Role, content: &str) -> Result<Message> {
        let message = MessageActiveModel {
            session_id: Set(session_id),
            role: Set(role.as_str().to_string()),
            content: Set(content.to_string()),
            created_at: Set(chrono::Utc::now().into()),
            ..Default::default()
        };

        message.insert(self.conn()).await.map_err(Into::into)
    }

    // ========================================================================
    // Scheme Index Operations
    // ========================================================================

    /// Number of indexed scheme documents
    pub async fn count_schemes(&self) -> Result<u64> {
        SchemeEntity::find()
            .count(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Write documents with their embeddings in one transaction.
    ///
    /// With `replace` the existing index is deleted inside the same
    /// transaction, so a failed write leaves the previous index in place.
    pub async fn store_schemes(
        &self,
        documents: &[SchemeDocument],
        embeddings: &[Vec<f32>],
        embedding_model: &str,
        replace: bool,
    ) -> Result<usize> {
        if documents.len() != embeddings.len() {
            return Err(AppError::Internal {
                message: format!(
                    "{} documents but {} embeddings",
                    documents.len(),
                    embeddings.len()
                ),
            });
        }

        let mut tx = self.pool.sqlx().begin().await?;

        if replace {
            let removed = sqlx::query("DELETE FROM schemes")
                .execute(&mut *tx)
                .await?
                .rows_affected();
            tracing::info!(removed, "Replacing scheme index");
        }

        for (doc, embedding) in documents.iter().zip(embeddings) {
            sqlx::query(
                r#"
                INSERT INTO schemes (
                    id, scheme_index, scheme_name, department, content,
                    embedding, embedding_model, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
                ON CONFLICT (id) DO UPDATE SET
                    scheme_index = EXCLUDED.scheme_index,
                    scheme_name = EXCLUDED.scheme_name,
                    department = EXCLUDED.department,
                    content = EXCLUDED.content,
                    embedding = EXCLUDED.embedding,
                    embedding_model = EXCLUDED.embedding_model
                "#,
            )
            .bind(&doc.id)
            .bind(doc.metadata.index as i32)
            .bind(&doc.metadata.scheme_name)
            .bind(&doc.metadata.department)
            .bind(&doc.text)
            .bind(Vector::from(embedding.clone()))
            .bind(embedding_model)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(documents.len())
    }

    /// Vector similarity search, nearest first
    pub async fn nearest_schemes(&self, embedding: &[f32], limit: usize) -> Result<Vec<SchemeHit>> {
        let hits = sqlx::query_as::<_, SchemeHit>(
            r#"
            SELECT
                id,
                scheme_name,
                content,
                (embedding <=> $1)::float8 AS distance
            FROM schemes
            ORDER BY embedding <=> $1
            LIMIT $2
            "#,
        )
        .bind(Vector::from(embedding.to_vec()))
        .bind(limit as i64)
        .fetch_all(self.pool.sqlx())
        .await?;

        Ok(hits)
    }
}
