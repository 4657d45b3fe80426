//! 主应用程序入口
//!
//! 加载配置、装配端点与通知总线，启动 Axum 网关服务。

use anyhow::Context;
use config::AppConfig;
use infrastructure::Infrastructure;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志，未设置 RUST_LOG 时默认 info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("加载配置失败")?;
    tracing::info!(config = %config.sanitize(), "配置已加载");

    let mut infrastructure = Infrastructure::build(&config).context("装配网关失败")?;
    if infrastructure.start_consumer().is_some() {
        tracing::info!(queue = %config.bus.queue, "通知消费者已启动");
    }

    let app = router(AppState::from_infrastructure(&infrastructure), &config.server);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("无法监听 {}", addr))?;

    tracing::info!("医疗网关启动在 http://{}{}", addr, config.server.path_prefix);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(consumer) = &infrastructure.consumer {
        consumer.shutdown();
    }
    tracing::info!("网关已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "无法监听退出信号");
    }
}
