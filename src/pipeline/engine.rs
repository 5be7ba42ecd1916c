//! 顺序流水线
//!
//! 构造时校验：至少一个阶段、输出键不重复、必填占位符必须由更早的阶段声明。
//! 运行时严格顺序：阶段 N 的输出写入会话、钩子执行完毕后，阶段 N+1 才开始；首个失败中止运行。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::AgentError;
use crate::pipeline::events::{PipelineEvent, PipelineState, TurnEvent};
use crate::pipeline::executor::run_stage;
use crate::pipeline::stage::StageDefinition;
use crate::session::{SessionEvent, SessionKey, SessionStore};

/// 一次调用的上下文：目标会话、用户输入、可选的事件通道
pub struct InvocationContext {
    pub key: SessionKey,
    pub user_query: String,
    pub sessions: Arc<dyn SessionStore>,
    pub events: Option<mpsc::UnboundedSender<PipelineEvent>>,
}

impl InvocationContext {
    pub fn new(key: SessionKey, user_query: impl Into<String>, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            key,
            user_query: user_query.into(),
            sessions,
            events: None,
        }
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// 发送事件；接收端已关闭时静默丢弃
    pub fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

/// 一次运行的结果：终态 + 按阶段顺序的输出（未过滤）
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub state: PipelineState,
    pub outputs: Vec<TurnEvent>,
}

/// 有序阶段列表
pub struct Pipeline {
    name: String,
    stages: Vec<StageDefinition>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, stages: Vec<StageDefinition>) -> Result<Self, AgentError> {
        if stages.is_empty() {
            return Err(AgentError::EmptyPipeline);
        }

        let mut declared: HashMap<&str, &str> = HashMap::new();
        for stage in &stages {
            for p in stage.placeholders() {
                if !p.optional && !declared.contains_key(p.key.as_str()) {
                    return Err(AgentError::UnknownTemplateKey {
                        stage: stage.name().to_string(),
                        key: p.key,
                    });
                }
            }
            if let Some(first) = declared.insert(stage.output_key(), stage.name()) {
                return Err(AgentError::DuplicateOutputKey {
                    key: stage.output_key().to_string(),
                    first: first.to_string(),
                    second: stage.name().to_string(),
                });
            }
        }

        Ok(Self {
            name: name.into(),
            stages,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// 依次运行各阶段；调用方需事先把用户输入追加到会话
    pub async fn run(&self, ctx: &InvocationContext) -> Result<PipelineOutcome, AgentError> {
        let total = self.stages.len();
        let mut state = PipelineState::NotStarted;
        let mut outputs = Vec::with_capacity(total);

        tracing::info!(pipeline = %self.name, session = %ctx.key, "pipeline started");

        for (index, stage) in self.stages.iter().enumerate() {
            state = state.start_stage(index).ok_or_else(|| {
                AgentError::Config(format!("invalid transition into stage {} from {:?}", index, state))
            })?;
            ctx.emit(PipelineEvent::StageStarted {
                stage: stage.name().to_string(),
                index,
                total,
            });
            tracing::info!(stage = %stage.name(), index, total, "stage started");

            match self.run_one(stage, ctx).await {
                Ok(turn) => {
                    ctx.emit(PipelineEvent::StageOutput(turn.clone()));
                    outputs.push(turn);
                }
                Err(e) => {
                    let err = e.in_stage(stage.name());
                    let failed = state.fail().unwrap_or(state);
                    tracing::error!(stage = %stage.name(), state = ?failed, "stage failed: {}", err);
                    ctx.emit(PipelineEvent::Failed {
                        stage: stage.name().to_string(),
                        error: err.to_string(),
                    });
                    return Err(err);
                }
            }
        }

        state = state.complete().unwrap_or(state);
        ctx.emit(PipelineEvent::Completed);
        tracing::info!(pipeline = %self.name, stages = total, "pipeline completed");
        Ok(PipelineOutcome { state, outputs })
    }

    /// 执行单个阶段：生成、记录输出、运行钩子（钩子失败只记录）
    async fn run_one(&self, stage: &StageDefinition, ctx: &InvocationContext) -> Result<TurnEvent, AgentError> {
        let text = run_stage(stage, ctx).await?;

        ctx.sessions
            .append_event(&ctx.key, SessionEvent::stage_output(stage.name(), text.clone()))
            .await?;
        ctx.sessions
            .set_output(&ctx.key, stage.output_key(), text.clone())
            .await?;

        if let Some(hook) = stage.after_stage() {
            let session = ctx
                .sessions
                .get_session(&ctx.key.app_name, &ctx.key.user_id, &ctx.key.session_id)
                .await?;
            if let Err(e) = hook.after_stage(stage.name(), &session).await {
                tracing::warn!(stage = %stage.name(), "after-stage hook failed: {}", e);
                ctx.emit(PipelineEvent::HookFailed {
                    stage: stage.name().to_string(),
                    reason: e.to_string(),
                });
            }
        }

        Ok(TurnEvent::new(stage.name(), text))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stage_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmClient, LlmError, MockLlmClient};
    use crate::memory::Message;
    use crate::pipeline::StageBuilder;
    use crate::session::InMemorySessionStore;
    use async_trait::async_trait;

    /// 返回固定文本，并记录收到的 system 指令
    struct Echo {
        reply: String,
        systems: std::sync::Mutex<Vec<String>>,
    }

    impl Echo {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                systems: std::sync::Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for Echo {
        async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
            if let Some(first) = messages.first() {
                self.systems.lock().unwrap().push(first.content.clone());
            }
            Ok(self.reply.clone())
        }
    }

    struct Failing;

    #[async_trait]
    impl LlmClient for Failing {
        async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
            Err(LlmError::status(503, "unavailable"))
        }
    }

    fn stage(name: &str, key: &str, instruction: &str, llm: Arc<dyn LlmClient>) -> StageDefinition {
        StageBuilder::new(name)
            .instruction(instruction)
            .output_key(key)
            .build(llm)
            .unwrap()
    }

    async fn ctx_with_user(text: &str) -> InvocationContext {
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let session = store.create_session("app", "u", "s").await.unwrap();
        store
            .append_event(&session.key, SessionEvent::user(text))
            .await
            .unwrap();
        InvocationContext::new(session.key, text, store)
    }

    #[test]
    fn test_rejects_empty_and_duplicate_keys() {
        assert!(matches!(Pipeline::new("p", vec![]), Err(AgentError::EmptyPipeline)));

        let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient);
        let err = Pipeline::new(
            "p",
            vec![
                stage("a", "summary", "first", llm.clone()),
                stage("b", "summary", "second", llm),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, AgentError::DuplicateOutputKey { ref key, .. } if key == "summary"));
    }

    #[test]
    fn test_rejects_forward_reference() {
        let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient);
        let err = Pipeline::new(
            "p",
            vec![
                stage("a", "x", "uses {y}", llm.clone()),
                stage("b", "y", "plain", llm),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, AgentError::UnknownTemplateKey { ref key, .. } if key == "y"));
    }

    #[tokio::test]
    async fn test_runs_in_order_and_interpolates() {
        let second = Echo::new("advice");
        let pipeline = Pipeline::new(
            "p",
            vec![
                stage("research", "summary", "research it", Echo::new("findings")),
                stage("mentor", "plan", "Based on: {summary}", second.clone()),
            ],
        )
        .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = ctx_with_user("become a PM").await.with_events(tx);
        let outcome = pipeline.run(&ctx).await.unwrap();

        assert_eq!(outcome.state, PipelineState::Completed);
        let authors: Vec<_> = outcome.outputs.iter().map(|t| t.author.as_str()).collect();
        assert_eq!(authors, vec!["research", "mentor"]);
        assert_eq!(second.systems.lock().unwrap()[0], "Based on: findings");

        let session = ctx.sessions.get_session("app", "u", "s").await.unwrap();
        assert_eq!(session.output("summary"), Some("findings"));
        assert_eq!(session.output("plan"), Some("advice"));
        assert_eq!(session.events.len(), 3);

        drop(ctx);
        let mut kinds = Vec::new();
        while let Some(ev) = rx.recv().await {
            kinds.push(ev);
        }
        assert!(matches!(kinds.first(), Some(PipelineEvent::StageStarted { index: 0, .. })));
        assert_eq!(kinds.last(), Some(&PipelineEvent::Completed));
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_stages() {
        let later = Echo::new("never");
        let pipeline = Pipeline::new(
            "p",
            vec![
                stage("research", "summary", "research it", Arc::new(Failing)),
                stage("mentor", "plan", "{summary}", later.clone()),
            ],
        )
        .unwrap();
        let ctx = ctx_with_user("hello").await;
        let err = pipeline.run(&ctx).await.unwrap_err();
        assert_eq!(err.stage(), Some("research"));
        assert!(later.systems.lock().unwrap().is_empty());
    }

    struct BrokenHook;

    #[async_trait]
    impl crate::pipeline::StageHook for BrokenHook {
        async fn after_stage(&self, _stage: &str, _session: &crate::session::Session) -> Result<(), AgentError> {
            Err(AgentError::Memory(crate::memory::MemoryError::Unavailable("down".into())))
        }
    }

    #[tokio::test]
    async fn test_hook_failure_does_not_abort() {
        let first = StageBuilder::new("research")
            .instruction("research it")
            .output_key("summary")
            .after_stage(Arc::new(BrokenHook))
            .build(Echo::new("findings"))
            .unwrap();
        let pipeline = Pipeline::new(
            "p",
            vec![first, stage("mentor", "plan", "{summary}", Echo::new("advice"))],
        )
        .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = ctx_with_user("hello").await.with_events(tx);
        let outcome = pipeline.run(&ctx).await.unwrap();
        assert_eq!(outcome.outputs.len(), 2);

        drop(ctx);
        let mut saw_hook_failure = false;
        while let Some(ev) = rx.recv().await {
            if matches!(ev, PipelineEvent::HookFailed { .. }) {
                saw_hook_failure = true;
            }
        }
        assert!(saw_hook_failure);
    }
}
