use ai_assist_grading::{logger, App, Config};
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logger::init();

    // 加载配置（配置文件 + 环境变量）
    let config = Config::load()?;

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
