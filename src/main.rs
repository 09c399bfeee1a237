use anyhow::Result;
use clap::Parser;
use deepsearch_rs::cli;
use deepsearch_rs::workflow::launch;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();

    // 先按命令行设置日志级别，配置文件加载后再按最终配置调整
    let (filter, reload_handle) = reload::Layer::new(cli::log_level(args.verbose));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();

    let question = args.question.clone();
    let output = args.output.clone();
    let config = args.into_config()?;
    reload_handle.modify(|filter| *filter = cli::log_level(config.verbose))?;

    launch(&config, &question, output.as_deref()).await?;
    Ok(())
}
