//! Redis 协调存储与列表队列实现
//!
//! - 条件写入：`SET key value NX PX ttl`
//! - 持有者校验删除：Lua 脚本比较后删除
//! - 前缀枚举：`SCAN MATCH prefix*`，从不使用全库清空
//! - 通知：`PUBLISH channel message`
//! - 队列：`LPUSH` 入队，`BRPOP` 出队，每个元素只被消费一次

use crate::error::StorageError;
use crate::traits::CoordinationStore;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::time::Duration;

const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

/// 转义 SCAN MATCH 模式中的通配字符
fn escape_pattern(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('*');
    escaped
}

/// Redis 协调存储
pub struct RedisCoordinationStore {
    client: redis::Client,
}

impl RedisCoordinationStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    pub fn connect(redis_url: &str) -> Result<Self, StorageError> {
        let client =
            redis::Client::open(redis_url).map_err(|err| StorageError::new(err.to_string()))?;
        Ok(Self::new(client))
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StorageError> {
        self.client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|err| StorageError::new(err.to_string()))
    }
}

#[async_trait::async_trait]
impl CoordinationStore for RedisCoordinationStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StorageError> {
        let mut connection = self.connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut connection)
            .await?;
        Ok(reply.is_some())
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        let mut connection = self.connection().await?;
        let mut command = redis::cmd("SET");
        command.arg(key).arg(value);
        if let Some(ttl) = ttl {
            command.arg("PX").arg(ttl_millis(ttl));
        }
        let _: () = command.query_async(&mut connection).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut connection = self.connection().await?;
        let value: Option<String> = connection.get(key).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let mut connection = self.connection().await?;
        let removed: i64 = connection.del(key).await?;
        Ok(removed > 0)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StorageError> {
        let mut connection = self.connection().await?;
        let removed: i64 = redis::Script::new(COMPARE_AND_DELETE)
            .key(key)
            .arg(expected)
            .invoke_async(&mut connection)
            .await?;
        Ok(removed > 0)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut connection = self.connection().await?;
        let pattern = escape_pattern(prefix);
        let mut cursor: u64 = 0;
        let mut items = Vec::new();
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut connection)
                .await?;
            items.extend(keys);
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        items.sort();
        items.dedup();
        Ok(items)
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<usize, StorageError> {
        let mut connection = self.connection().await?;
        let receivers: usize = connection.publish(channel, message).await?;
        Ok(receivers)
    }
}

/// Redis 列表队列（字符串负载）
pub struct RedisQueue {
    client: redis::Client,
    key: String,
}

impl RedisQueue {
    pub fn new(client: redis::Client, key: impl Into<String>) -> Self {
        Self {
            client,
            key: key.into(),
        }
    }

    pub fn connect(redis_url: &str, key: impl Into<String>) -> Result<Self, StorageError> {
        let client =
            redis::Client::open(redis_url).map_err(|err| StorageError::new(err.to_string()))?;
        Ok(Self::new(client, key))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn push(&self, payload: &str) -> Result<(), StorageError> {
        let mut connection = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|err| StorageError::new(err.to_string()))?;
        let _: i64 = connection.lpush(&self.key, payload).await?;
        Ok(())
    }

    /// 阻塞出队，`timeout` 内无元素时返回 None
    pub async fn pop(&self, timeout: Duration) -> Result<Option<String>, StorageError> {
        let mut connection = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|err| StorageError::new(err.to_string()))?;
        let reply: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.key)
            .arg(timeout.as_secs().max(1))
            .query_async(&mut connection)
            .await?;
        Ok(reply.map(|(_, payload)| payload))
    }

    pub async fn len(&self) -> Result<usize, StorageError> {
        let mut connection = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|err| StorageError::new(err.to_string()))?;
        let length: usize = connection.llen(&self.key).await?;
        Ok(length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_pattern_escapes_wildcards() {
        assert_eq!(escape_pattern("schedule:gateway:"), "schedule:gateway:*");
        assert_eq!(escape_pattern("odd*key?"), "odd\\*key\\?*");
    }

    #[test]
    fn ttl_is_at_least_one_millisecond() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(60)), 60_000);
    }
}
