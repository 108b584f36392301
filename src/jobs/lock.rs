use crate::error::Result;
use async_trait::async_trait;
use redis::Client;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Deletes the key only while it still holds our token
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Mutual exclusion for one job run across every instance
#[async_trait]
pub trait JobLock: Send + Sync {
    /// Returns the holder token, or `None` when someone else holds the key
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<String>>;

    /// Returns whether the key was still ours
    async fn release(&self, key: &str, token: &str) -> Result<bool>;
}

pub struct RedisJobLock {
    client: Arc<Client>,
}

impl RedisJobLock {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobLock for RedisJobLock {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let token = Uuid::new_v4().to_string();

        let acquired: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;

        Ok(acquired.map(|_| token))
    }

    async fn release(&self, key: &str, token: &str) -> Result<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }
}

/// Single-process lock for tests and deployments without Redis
#[derive(Default)]
pub struct LocalJobLock {
    held: Mutex<HashMap<String, (String, Instant)>>,
}

impl LocalJobLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobLock for LocalJobLock {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<String>> {
        let mut held = self.held.lock().await;
        let now = Instant::now();

        if let Some((_, expires_at)) = held.get(key) {
            if *expires_at > now {
                return Ok(None);
            }
        }

        let token = Uuid::new_v4().to_string();
        held.insert(key.to_string(), (token.clone(), now + ttl));
        Ok(Some(token))
    }

    async fn release(&self, key: &str, token: &str) -> Result<bool> {
        let mut held = self.held.lock().await;
        match held.get(key) {
            Some((holder, _)) if holder == token => {
                held.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// PX argument; saturates instead of wrapping for absurd ttls
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
}
