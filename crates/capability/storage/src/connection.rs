//! 数据库连接管理
//!
//! 提供数据库连接池初始化功能：
//! - connect_pool：建立 Postgres 连接池
//! - run_migrations：执行建表脚本（幂等）

use crate::error::StorageError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

const INIT_SQL: &str = include_str!("../migrations/0001_init.sql");

/// 建立 Postgres 连接池
///
/// # 参数
/// - `database_url`：Postgres 连接字符串
/// - `max_connections`：最大连接数
pub async fn connect_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// 执行建表脚本；所有语句均为 `if not exists`，可重复执行。
pub async fn run_migrations(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::raw_sql(INIT_SQL).execute(pool).await?;
    Ok(())
}
