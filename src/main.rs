//! Hive 控制台入口
//!
//! 初始化日志、加载配置与编排规则、启动运行时，然后逐行读取标准输入作为同一会话的消息。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use hive::capability::CapabilityFactories;
use hive::config::load_config;
use hive::core::{run_with_graceful_shutdown, ShutdownManager};
use hive::ingress::run_console;
use hive::orchestration::load_spec;
use hive::recognition::KeywordRecognizer;
use hive::{observability, Hive};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    // 可选：第一个参数为额外的配置文件
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path).context("Failed to load configuration")?;
    let spec_path = config.require_spec_path()?.clone();

    let resolver = load_spec(&spec_path).context("Failed to load orchestration spec")?;
    let recognizer = KeywordRecognizer::load(&spec_path).context("Failed to load intent rules")?;
    let session_id = config.ingress.session_id.clone();

    let hive = Arc::new(
        Hive::start(
            config,
            resolver,
            &CapabilityFactories::with_builtins(),
            Arc::new(recognizer),
        )
        .await
        .context("Failed to start hive")?,
    );

    let shutdown = Arc::new(ShutdownManager::new());
    let console = {
        let hive = Arc::clone(&hive);
        let shutdown = Arc::clone(&shutdown);
        async move {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            if let Err(e) = run_console(hive, session_id, shutdown, stdin, tokio::io::stdout()).await {
                tracing::error!("Console ingress failed: {}", e);
            }
        }
    };

    run_with_graceful_shutdown(shutdown, console, || async {
        if let Err(e) = hive.shutdown().await {
            tracing::warn!("Shutdown: {}", e);
        }
    })
    .await;

    Ok(())
}
