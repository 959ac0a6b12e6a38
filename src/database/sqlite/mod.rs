use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{Message, NewMessage};
use crate::database::sqlite::queries::MessageQueries;


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(database_url: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_url)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        let db_path = config_dir.join("messages.db");
        let db_url = db_path.to_string_lossy();

        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(db_url.as_ref()).await
    }

    // Message operations
    pub async fn insert_message_if_absent(&self, message: NewMessage) -> Result<(Message, bool)> {
        MessageQueries::insert_if_absent(&self.pool, message).await
    }

    pub async fn get_message_by_id(&self, id: i64) -> Result<Option<Message>> {
        MessageQueries::get_by_id(&self.pool, id).await
    }

    pub async fn get_message_by_natural_key(&self, natural_key: &str) -> Result<Option<Message>> {
        MessageQueries::get_by_natural_key(&self.pool, natural_key).await
    }

    pub async fn delete_message_by_id(&self, id: i64) -> Result<bool> {
        MessageQueries::delete_by_id(&self.pool, id).await
    }

    pub async fn count_messages(&self) -> Result<i64> {
        MessageQueries::count(&self.pool).await
    }
}
