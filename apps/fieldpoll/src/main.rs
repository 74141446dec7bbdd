//! fieldpoll 进程入口：Modbus TCP 采集 worker + 调度循环 + 运维 HTTP 接口。

mod handlers;
mod middleware;
mod routes;
mod runtime;
mod utils;

use fieldpoll_config::AppConfig;
use fieldpoll_telemetry::init_tracing;
use tracing::{info, warn};

pub use runtime::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    let services = runtime::build(&config).await?;
    info!(
        target: "fieldpoll.app",
        storage = ?config.storage_backend,
        coordination = ?config.coordination_backend,
        http_addr = %config.http_addr,
        "fieldpoll_starting"
    );

    let mut background = Vec::new();
    if config.worker_enabled {
        background.push(services.task_source.spawn(services.worker));
    }
    if config.scheduler_enabled {
        match services.state.supervisor.start_reliable_polling().await {
            Ok(report) => info!(
                target: "fieldpoll.app",
                skipped = report.skipped,
                started = report.started.len(),
                "initial_bootstrap_done"
            ),
            Err(err) => warn!(target: "fieldpoll.app", error = %err, "initial_bootstrap_failed"),
        }
        background.push(services.scheduler.spawn());
    }

    let app = routes::create_router(services.state);
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for handle in background {
        handle.abort();
    }
    info!(target: "fieldpoll.app", "fieldpoll_stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target: "fieldpoll.app", error = %err, "shutdown_signal_failed");
        std::future::pending::<()>().await;
    }
}
