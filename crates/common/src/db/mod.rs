//! Database layer for DocQA
//!
//! Provides:
//! - SeaORM entity models
//! - Generic soft-delete aware CRUD
//! - Repository pattern for data access
//! - Connection pool management and schema bootstrap

pub mod crud;
pub mod models;
mod repository;

pub use repository::{cosine_distance, NewChunk, Repository};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use models::{ChatSessionEntity, ChatTurnEntity, ChunkEntity, DocumentEntity};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, EntityTrait, Schema,
};
use std::time::Duration;
use tracing::info;

/// Postgres schema, applied idempotently at start-up
const POSTGRES_SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    /// Primary connection (for writes)
    pub primary: DatabaseConnection,

    /// Read replica connection (optional)
    pub replica: Option<DatabaseConnection>,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to primary database...");
        let primary = connect(&config.url, config, "primary").await?;

        // Connect to replica if configured
        let replica = match config.read_url {
            Some(ref read_url) => {
                info!("Connecting to read replica...");
                Some(connect(read_url, config, "replica").await?)
            }
            None => None,
        };

        info!("Database connections established");

        Ok(Self { primary, replica })
    }

    /// Wrap an already open connection
    pub fn from_connection(primary: DatabaseConnection) -> Self {
        Self {
            primary,
            replica: None,
        }
    }

    /// Get the connection for reads (replica if available, otherwise primary)
    pub fn read(&self) -> &DatabaseConnection {
        self.replica.as_ref().unwrap_or(&self.primary)
    }

    /// Get the connection for writes (always primary)
    pub fn write(&self) -> &DatabaseConnection {
        &self.primary
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.primary
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Primary ping failed: {}", e),
            })?;

        if let Some(ref replica) = self.replica {
            replica
                .execute_unprepared("SELECT 1")
                .await
                .map_err(|e| AppError::DatabaseConnection {
                    message: format!("Replica ping failed: {}", e),
                })?;
        }

        Ok(())
    }

    /// Create the tables if they do not exist yet.
    ///
    /// Postgres gets the pgvector schema from `migrations/`. Other backends
    /// get tables derived from the entities, with the vector kept as text.
    pub async fn run_migrations(&self) -> Result<()> {
        let db = self.write();
        let backend = db.get_database_backend();

        match backend {
            DbBackend::Postgres => {
                db.execute_unprepared(POSTGRES_SCHEMA).await?;
            }
            _ => {
                create_table(db, backend, DocumentEntity).await?;
                create_table(db, backend, ChunkEntity).await?;
                create_table(db, backend, ChatSessionEntity).await?;
                create_table(db, backend, ChatTurnEntity).await?;
            }
        }

        info!(backend = ?backend, "Database schema ready");
        Ok(())
    }

    /// Close every connection in the pool
    pub async fn close(self) -> Result<()> {
        if let Some(replica) = self.replica {
            replica.close().await?;
        }
        self.primary.close().await?;
        Ok(())
    }
}

async fn connect(url: &str, config: &DatabaseConfig, role: &str) -> Result<DatabaseConnection> {
    let mut opts = ConnectOptions::new(url);
    opts.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .sqlx_logging(config.sqlx_logging);

    Database::connect(opts)
        .await
        .map_err(|e| AppError::DatabaseConnection {
            message: format!("Failed to connect to {}: {}", role, e),
        })
}

async fn create_table<E>(db: &DatabaseConnection, backend: DbBackend, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let schema = Schema::new(backend);
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    db.execute(backend.build(&stmt)).await?;
    Ok(())
}
