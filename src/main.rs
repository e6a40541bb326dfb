//! Hive 命令行入口
//!
//! `hive "question"` 回答一条消息后退出；不带参数时逐行读取标准输入，每行一条消息。
//! 配置文件路径可通过 HIVE_CONFIG 指定。

use std::path::PathBuf;

use anyhow::Context;
use hive::{config::load_config, observability, AgentRuntime};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::var("HIVE_CONFIG").ok().map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let runtime = AgentRuntime::from_config(&cfg)
        .await
        .context("Failed to build agent runtime")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        println!("{}", runtime.handle(&args.join(" ")).await);
    } else {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if matches!(line, "exit" | "quit") {
                break;
            }
            println!("{}\n", runtime.handle(line).await);
        }
    }

    runtime.shutdown().await;
    Ok(())
}
