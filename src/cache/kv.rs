//! Generic key-value store boundary.
//!
//! The cache only needs GET/SET/SCAN/DEL semantics; the trait keeps the
//! Redis client behind a seam so tests can run against in-memory fakes.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connect failed: {0}")]
    Connect(String),
    #[error("store command failed: {0}")]
    Command(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        Self::Command(err.to_string())
    }
}

/// One page of a cursor-based key enumeration.
#[derive(Debug, Clone)]
pub struct ScanPage {
    pub cursor: String,
    pub keys: Vec<String>,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn scan(
        &self,
        cursor: &str,
        pattern: &str,
        page_size: usize,
    ) -> Result<ScanPage, StoreError>;
    async fn del(&self, keys: &[String]) -> Result<u64, StoreError>;
}

/// Redis-backed store over a single multiplexed connection.
///
/// The connection is cloneable and serializes commands internally, so all
/// callers share one long-lived resource without explicit locking.
pub struct RedisStore {
    connection: redis::aio::MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(host: &str, port: u16) -> Result<Self, StoreError> {
        let client = redis::Client::open(format!("redis://{host}:{port}"))
            .map_err(|err| StoreError::Connect(err.to_string()))?;
        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|err| StoreError::Connect(err.to_string()))?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut connection = self.connection.clone();
        let value = redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(&mut connection)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async::<()>(&mut connection)
            .await?;
        Ok(())
    }

    async fn scan(
        &self,
        cursor: &str,
        pattern: &str,
        page_size: usize,
    ) -> Result<ScanPage, StoreError> {
        let mut connection = self.connection.clone();
        let (cursor, keys) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(page_size)
            .query_async::<(String, Vec<String>)>(&mut connection)
            .await?;
        Ok(ScanPage { cursor, keys })
    }

    async fn del(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut connection = self.connection.clone();
        let deleted = redis::cmd("DEL")
            .arg(keys)
            .query_async::<u64>(&mut connection)
            .await?;
        Ok(deleted)
    }
}
