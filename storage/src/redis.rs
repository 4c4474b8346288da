use async_trait::async_trait;
use errors::{StoreKind, SyncError};
use proposal_core::{Lease, LeaseProvider};

/// Cross-process per-record leases on Redis.
///
/// A lease is a `SET NX EX` key holding a random token; only the holder of
/// the token can delete it.
pub struct RedisLeaseProvider {
    connection_manager: redis::aio::ConnectionManager
}

fn unavailable(operation: &'static str) -> impl FnOnce(redis::RedisError) -> SyncError {
    move |e| SyncError::unavailable(StoreKind::Lock, operation, e)
}

impl RedisLeaseProvider {
    pub async fn new(connection_string: &str) -> Result<Self, SyncError> {
        let client = redis::Client::open(connection_string).map_err(unavailable("connect"))?;
        let connection_manager = client
            .get_connection_manager()
            .await
            .map_err(unavailable("connect"))?;
        Ok(Self { connection_manager })
    }

    /// Whether any holder currently owns `key`.
    pub async fn is_held(&self, key: &str) -> Result<bool, SyncError> {
        let mut conn = self.connection_manager.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(unavailable("is_held"))?;
        Ok(exists)
    }
}

#[async_trait]
impl LeaseProvider for RedisLeaseProvider {
    async fn try_acquire(&self, key: &str, ttl_seconds: u64) -> Result<Option<Lease>, SyncError> {
        let token = uuid::Uuid::new_v4().to_string();
        let mut conn = self.connection_manager.clone();

        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&token)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(unavailable("acquire_lease"))?;

        Ok(result.map(|_| Lease {
            key: key.to_string(),
            token,
            ttl_seconds
        }))
    }

    async fn release(&self, lease: &Lease) -> Result<bool, SyncError> {
        let script = redis::Script::new(
            r#"
            if redis.call("GET", KEYS[1]) == ARGV[1] then
                return redis.call("DEL", KEYS[1])
            else
                return 0
            end
            "#
        );

        let mut conn = self.connection_manager.clone();
        let result: i32 = script
            .key(&lease.key)
            .arg(&lease.token)
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable("release_lease"))?;

        Ok(result == 1)
    }
}
