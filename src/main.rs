//! Career Advisor TUI
//!
//! 入口：日志写入 logs/career-advisor.log，创建命令循环与 TUI，并运行主循环。

use anyhow::Context;
use career_advisor::{core::create_agent, observability, ui::run_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init_to_file("logs/career-advisor.log").context("Failed to open log file")?;

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let (cmd_tx, state_rx, event_rx) = create_agent(config_path)
        .await
        .context("Failed to create advisor")?;

    run_app(state_rx, event_rx, cmd_tx)
        .await
        .context("App run failed")?;

    Ok(())
}
