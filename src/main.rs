//! # 缩略图服务 — 应用入口
//!
//! 本文件仅负责日志初始化、参数解析与服务启停。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use thumbnail_server::config::Args;
use thumbnail_server::error::AppError;
use thumbnail_server::server;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("❌ 启动失败: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), AppError> {
    let settings = args.into_settings()?;
    let fs = Arc::new(settings.build_file_system()?);

    let app = server::router(Arc::clone(&fs), settings.debug_dir.as_deref());
    let listener = tokio::net::TcpListener::bind(settings.listen).await?;

    let shutdown_fs = Arc::clone(&fs);
    server::serve(listener, app, async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("❌ 无法监听退出信号: {err}");
            std::future::pending::<()>().await;
        }
        log::info!("🛑 收到退出信号，开始优雅关闭");
        shutdown_fs.shutdown();
    })
    .await
}
