use anyhow::Context;
use yield_executor::config::Config;
use yield_executor::log_info;
use yield_executor::startup::Application;
use yield_executor::utils::logger::{init_audit_tracing, init_logger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 可选
    dotenvy::dotenv().ok();

    // 初始化日志（全局只需调用一次）
    init_logger();
    init_audit_tracing();

    log_info!("Starting application initialization...");

    // 1. 加载配置
    let config = Config::load().context("Failed to load application configuration")?;

    // 2. 构建应用实例 (provider / 签名账户 / 执行器)
    let application = Application::build(config)
        .await
        .context("Application building failed (provider/signer initialization)")?;

    log_info!("Application build complete. Accepting workflow requests.");

    // 3. 运行：接收请求直到 stdin 关闭或 Ctrl+C
    application
        .run()
        .await
        .context("Application core service failed during runtime")?;

    Ok(())
}
