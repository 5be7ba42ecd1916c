//! Career Advisor 命令行：在同一会话中依次提交查询，把各阶段输出打印到 stdout

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use career_advisor::config::load_config;
use career_advisor::ui::ConsolePresenter;
use career_advisor::{create_advisor, observability, OutputMode};

/// Career Advisor - research and mentoring for career transitions
#[derive(Parser, Debug, Clone)]
#[command(name = "career-advisor-cli", version, about, long_about = None)]
struct Cli {
    /// Queries to submit, in order, to the same session
    queries: Vec<String>,

    /// Session ID for conversation tracking
    #[arg(short, long, env = "CAREER_SESSION")]
    session: Option<String>,

    /// User ID (defaults to app.user_id from config)
    #[arg(short, long)]
    user: Option<String>,

    /// Only show the final stage's output
    #[arg(long)]
    last_only: bool,

    /// Extra configuration file layered over config/default.toml
    #[arg(short, long, env = "CAREER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let cli = Cli::parse();

    let cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    let advisor = create_advisor(&cfg).context("Failed to create advisor")?;

    let session_id = cli.session.unwrap_or_else(|| cfg.app.session_id.clone());
    let user_id = cli.user.unwrap_or_else(|| cfg.app.user_id.clone());
    let mut presenter = ConsolePresenter::stdout();

    advisor
        .runner()
        .run_session(
            &user_id,
            &cli.queries,
            &session_id,
            OutputMode::from_last_only(cli.last_only),
            &mut presenter,
        )
        .await?;

    let (prompt, completion, total) = advisor.llm().token_usage();
    tracing::info!(
        model = %advisor.llm().model_name(),
        prompt_tokens = prompt,
        completion_tokens = completion,
        total_tokens = total,
        "Token usage"
    );
    Ok(())
}
