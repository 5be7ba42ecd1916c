//! 控制台展示：把多轮会话以纯文本写到任意 io::Write
//!
//! 格式：会话横幅、新建/已存在提示、每条查询的用户行、各阶段输出（或仅最终输出）。

use std::io::Write;

use crate::core::AgentError;
use crate::pipeline::TurnEvent;
use crate::runner::Presenter;

const RULE_WIDTH: usize = 60;

pub struct ConsolePresenter<W: Write> {
    out: W,
}

impl<W: Write> ConsolePresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, s: &str) {
        if let Err(e) = writeln!(self.out, "{}", s) {
            tracing::warn!("console write failed: {}", e);
        }
    }
}

impl ConsolePresenter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> Presenter for ConsolePresenter<W> {
    fn session_started(&mut self, session_id: &str, created: bool) {
        let rule = "=".repeat(RULE_WIDTH);
        self.line(&format!("\n{}", rule));
        self.line(&format!("Session: {}", session_id));
        self.line(&rule);
        self.line(if created {
            "✅ New session created"
        } else {
            "✅ Existing session retrieved"
        });
    }

    fn user_query(&mut self, query: &str) {
        self.line(&format!("\n👤 User: {}", query));
        self.line(&"-".repeat(RULE_WIDTH));
    }

    fn stage_output(&mut self, turn: &TurnEvent, is_final: bool) {
        if is_final {
            self.line(&format!("\n🤖 {} (Final):", turn.author));
        } else {
            self.line(&format!("\n🤖 {}:", turn.author));
        }
        self.line(&turn.text);
    }

    fn no_queries(&mut self) {
        self.line("⚠️  No queries provided!");
    }

    fn run_failed(&mut self, error: &AgentError) {
        self.line(&format!("\n❌ Error: {}", error));
    }
}
