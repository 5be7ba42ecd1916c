//! 主控：组装 Advisor（模型、重试、工具、记忆、会话存储、流水线、运行器），并为 TUI 启动命令循环
//!
//! 三通道：UI -> Core 命令（mpsc）；Core -> UI 状态快照（watch）；Core -> UI 运行事件（broadcast）。

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};

use crate::advisor::{build_career_pipeline, Prompts};
use crate::config::{load_config, AppConfig};
use crate::core::{AgentError, AgentPhase, TranscriptEntry, UiState};
use crate::llm::{create_llm_from_config, LlmClient};
use crate::memory::create_memory_service;
use crate::pipeline::PipelineEvent;
use crate::runner::{OutputMode, Runner};
use crate::session::{InMemorySessionStore, SessionKey, SessionStore};

/// 用户在 UI 上触发的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Submit(String),
    NewSession,
    ToggleResearch,
    ToggleMentor,
    Quit,
}

/// 组装好的顾问：构建一次，以句柄形式传给各请求处理方
pub struct Advisor {
    config: AppConfig,
    runner: Arc<Runner>,
    llm: Arc<dyn LlmClient>,
}

impl Advisor {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn runner(&self) -> &Arc<Runner> {
        &self.runner
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    pub fn user_id(&self) -> &str {
        &self.config.app.user_id
    }
}

/// 按配置创建 Advisor
pub fn create_advisor(cfg: &AppConfig) -> Result<Advisor, AgentError> {
    let llm = create_llm_from_config(cfg)?;
    create_advisor_with_llm(cfg, llm)
}

/// 使用给定模型客户端创建 Advisor（调用方负责重试包装）
pub fn create_advisor_with_llm(cfg: &AppConfig, llm: Arc<dyn LlmClient>) -> Result<Advisor, AgentError> {
    let memory = create_memory_service(&cfg.memory);
    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let prompts = Prompts::load();
    let pipeline = build_career_pipeline(cfg, llm.clone(), memory.clone(), &prompts)?;
    tracing::info!(
        pipeline = %pipeline.name(),
        model = %llm.model_name(),
        memory_enabled = memory.enabled(),
        "advisor ready"
    );
    let runner = Arc::new(Runner::new(cfg.app.name.clone(), Arc::new(pipeline), sessions));
    Ok(Advisor {
        config: cfg.clone(),
        runner,
        llm,
    })
}

/// 加载配置、创建 Advisor 并启动命令循环，返回 (命令发送端, 状态接收端, 事件接收端)
pub async fn create_agent(
    config_path: Option<PathBuf>,
) -> anyhow::Result<(
    mpsc::UnboundedSender<Command>,
    watch::Receiver<UiState>,
    broadcast::Receiver<PipelineEvent>,
)> {
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    let advisor = Arc::new(create_advisor(&cfg)?);
    Ok(spawn_command_loop(advisor))
}

/// 在后台任务中处理命令；每次提交在当前会话中运行流水线，期间把运行事件投影到 UiState
pub fn spawn_command_loop(
    advisor: Arc<Advisor>,
) -> (
    mpsc::UnboundedSender<Command>,
    watch::Receiver<UiState>,
    broadcast::Receiver<PipelineEvent>,
) {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (state_tx, state_rx) = watch::channel(UiState::new(advisor.config().app.session_id.clone()));
    let (event_tx, event_rx) = broadcast::channel::<PipelineEvent>(64);

    tokio::spawn(async move {
        let mut ui = state_tx.borrow().clone();

        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                Command::Submit(input) => {
                    let input = input.trim().to_string();
                    if input.is_empty() {
                        ui.error_message = Some("Please enter your career transition query.".to_string());
                        let _ = state_tx.send(ui.clone());
                        continue;
                    }

                    ui.transcript.push(TranscriptEntry::User { text: input.clone() });
                    ui.phase = AgentPhase::Running;
                    ui.input_locked = true;
                    ui.error_message = None;
                    let _ = state_tx.send(ui.clone());

                    let (tx, mut rx) = mpsc::unbounded_channel();
                    let session_id = ui.session_id.clone();
                    let run = advisor.runner().run_with_events(
                        advisor.user_id(),
                        &session_id,
                        &input,
                        OutputMode::StreamAll,
                        tx,
                    );
                    let project = async {
                        while let Some(event) = rx.recv().await {
                            apply_event(&mut ui, &event);
                            let _ = state_tx.send(ui.clone());
                            let _ = event_tx.send(event);
                        }
                    };
                    let (result, ()) = tokio::join!(run, project);

                    ui.input_locked = false;
                    ui.active_stage = None;
                    match result {
                        Ok(_) => ui.phase = AgentPhase::Idle,
                        Err(e) => {
                            tracing::error!("run failed: {}", e);
                            ui.phase = AgentPhase::Error;
                            ui.error_message = Some(e.to_string());
                        }
                    }
                    let _ = state_tx.send(ui.clone());
                }
                Command::NewSession => {
                    // 只换会话，长期记忆保留；旧会话之后不会再被访问，从存储中移除
                    let runner = advisor.runner();
                    let old = SessionKey::new(runner.app_name(), advisor.user_id(), ui.session_id.as_str());
                    if runner.sessions().delete_session(&old).await {
                        tracing::debug!(session = %old, "previous session dropped");
                    }
                    ui.session_id = format!("session_{}", uuid::Uuid::new_v4());
                    ui.transcript.clear();
                    ui.phase = AgentPhase::Idle;
                    ui.error_message = None;
                    tracing::info!(session = %ui.session_id, "new session");
                    let _ = state_tx.send(ui.clone());
                }
                Command::ToggleResearch => {
                    ui.show_research = !ui.show_research;
                    let _ = state_tx.send(ui.clone());
                }
                Command::ToggleMentor => {
                    ui.show_mentor = !ui.show_mentor;
                    let _ = state_tx.send(ui.clone());
                }
                Command::Quit => break,
            }
        }
    });

    (cmd_tx, state_rx, event_rx)
}

/// 把运行事件投影到 UiState
fn apply_event(ui: &mut UiState, event: &PipelineEvent) {
    match event {
        PipelineEvent::StageStarted { stage, .. } => {
            ui.phase = AgentPhase::Running;
            ui.active_stage = Some(stage.clone());
        }
        PipelineEvent::ToolCall { .. } => ui.phase = AgentPhase::ToolExecuting,
        PipelineEvent::Observation { .. } => ui.phase = AgentPhase::Running,
        PipelineEvent::StageOutput(turn) => {
            if turn.is_displayable() {
                ui.transcript.push(TranscriptEntry::Stage(turn.clone()));
            }
        }
        PipelineEvent::HookFailed { stage, reason } => {
            tracing::warn!(stage = %stage, "Failed to save to memory: {}", reason);
        }
        PipelineEvent::Completed | PipelineEvent::Failed { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::{MENTOR_STAGE, RESEARCH_STAGE};
    use crate::pipeline::TurnEvent;

    fn mock_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".to_string();
        cfg
    }

    #[test]
    fn test_apply_event_filters_placeholder_output() {
        let mut ui = UiState::new("s");
        apply_event(&mut ui, &PipelineEvent::StageOutput(TurnEvent::new(RESEARCH_STAGE, "None")));
        assert!(ui.transcript.is_empty());
        apply_event(
            &mut ui,
            &PipelineEvent::ToolCall {
                stage: RESEARCH_STAGE.into(),
                tool: "web_search".into(),
                args: serde_json::json!({"query": "x"}),
            },
        );
        assert_eq!(ui.phase, AgentPhase::ToolExecuting);
    }

    #[tokio::test]
    async fn test_command_loop_runs_both_stages() {
        let advisor = Arc::new(create_advisor(&mock_config()).unwrap());
        let (cmd_tx, mut state_rx, _events) = spawn_command_loop(advisor.clone());

        cmd_tx.send(Command::Submit("I am a PM moving to data science".into())).unwrap();
        let state = state_rx
            .wait_for(|s| !s.input_locked && s.transcript.len() == 3)
            .await
            .unwrap()
            .clone();
        assert_eq!(state.phase, AgentPhase::Idle);
        let authors: Vec<_> = state
            .transcript
            .iter()
            .filter_map(|e| match e {
                TranscriptEntry::Stage(t) => Some(t.author.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(authors, vec![RESEARCH_STAGE, MENTOR_STAGE]);

        let old_session = state.session_id.clone();
        let sessions = advisor.runner().sessions();
        let app = advisor.runner().app_name();
        assert!(sessions.get_session(app, advisor.user_id(), &old_session).await.is_ok());

        cmd_tx.send(Command::NewSession).unwrap();
        let state = state_rx.wait_for(|s| s.transcript.is_empty()).await.unwrap().clone();
        assert!(state.session_id.starts_with("session_"));
        assert_ne!(state.session_id, old_session);
        assert!(sessions.get_session(app, advisor.user_id(), &old_session).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_submission_warns() {
        let advisor = Arc::new(create_advisor(&mock_config()).unwrap());
        let (cmd_tx, mut state_rx, _events) = spawn_command_loop(advisor);
        cmd_tx.send(Command::Submit("   ".into())).unwrap();
        let state = state_rx.wait_for(|s| s.error_message.is_some()).await.unwrap().clone();
        assert!(state.transcript.is_empty());
        assert_eq!(state.phase, AgentPhase::Idle);
    }
}
