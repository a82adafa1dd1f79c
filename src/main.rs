use anyhow::Result;
use batch_crawler::utils::logging;
use batch_crawler::{Config, Engine};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置（CRAWLER_CONFIG 指定 TOML 文件时优先，其余走环境变量）
    let config = match std::env::var("CRAWLER_CONFIG") {
        Ok(path) => {
            let content = tokio::fs::read_to_string(&path).await?;
            Config::from_toml(&content)?
        }
        Err(_) => Config::from_env(),
    };

    // 装配引擎并灌入种子任务
    let engine = Arc::new(Engine::initialize(config).await?);
    engine.enqueue_seed_tasks().await?;

    // Ctrl-C 触发优雅关停：进行中的会话走完 TEARDOWN 再退出
    {
        let engine = engine.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                engine.trigger_shutdown();
            }
        });
    }

    engine.run().await?;

    Ok(())
}
