// src/checkpoint/redis_store.rs
//! Redis-backed checkpoint store. Records are JSON strings under
//! `<namespace>:record:<id>`, written with SET NX; the counter hint lives at
//! `<namespace>:latest_id`.

use super::record::CheckpointRecord;
use super::store::{CheckpointStore, PutOutcome};
use crate::error::{ArbiterError, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use redis::{aio::ConnectionManager, AsyncCommands};
use std::fmt;

#[derive(Clone)]
pub struct RedisCheckpointStore {
    conn_manager: ConnectionManager,
    namespace: String,
    redis_url: String,
}

impl fmt::Debug for RedisCheckpointStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCheckpointStore")
            .field("redis_url", &self.redis_url)
            .field("namespace", &self.namespace)
            .field("conn_manager", &"<ConnectionManager instance>")
            .finish()
    }
}

impl RedisCheckpointStore {
    pub async fn connect(redis_url: &str, namespace: &str) -> Result<Self> {
        info!("Connecting checkpoint store to {} (namespace '{}')", redis_url, namespace);
        let client = redis::Client::open(redis_url)?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to create Redis ConnectionManager: {}", e);
            ArbiterError::StoreUnavailable(format!("Redis connection failed: {}", e))
        })?;
        Ok(Self {
            conn_manager,
            namespace: namespace.to_string(),
            redis_url: redis_url.to_string(),
        })
    }

    fn record_key(&self, id: u64) -> String {
        generate_key(&self.namespace, &["record", &id.to_string()])
    }

    fn counter_key(&self) -> String {
        generate_key(&self.namespace, &["latest_id"])
    }
}

fn generate_key(namespace: &str, params: &[&str]) -> String {
    let mut key = namespace.to_string();
    for param in params {
        key.push(':');
        key.push_str(param);
    }
    key
}

#[async_trait]
impl CheckpointStore for RedisCheckpointStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, id: u64) -> Result<Option<CheckpointRecord>> {
        let key = self.record_key(id);
        let mut conn = self.conn_manager.clone();
        match conn.get::<_, Option<String>>(&key).await? {
            Some(value) => {
                let record = serde_json::from_str::<CheckpointRecord>(&value).map_err(|e| {
                    warn!("Corrupt checkpoint at {}: {}", key, e);
                    ArbiterError::Parse(format!("checkpoint {}: {}", key, e))
                })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn put_if_absent(&self, record: &CheckpointRecord) -> Result<PutOutcome> {
        let key = self.record_key(record.id);
        let value = serde_json::to_string(record)?;
        let mut conn = self.conn_manager.clone();
        let created: bool = conn.set_nx(&key, value).await?;
        debug!("SET NX {} -> {}", key, created);
        Ok(if created {
            PutOutcome::Created
        } else {
            PutOutcome::AlreadyExists
        })
    }

    async fn get_counter(&self) -> Result<Option<u64>> {
        let mut conn = self.conn_manager.clone();
        Ok(conn.get::<_, Option<u64>>(self.counter_key()).await?)
    }

    async fn put_counter(&self, id: u64) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        conn.set::<_, _, ()>(self.counter_key(), id).await?;
        Ok(())
    }
}
