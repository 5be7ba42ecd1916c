//! 会话运行器：解析会话（先创建、失败再获取）→ 追加用户输入 → 运行流水线 → 过滤并标注输出
//!
//! 同一会话 ID 的多次提交共享历史；不同会话互不可见。

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::AgentError;
use crate::pipeline::{InvocationContext, Pipeline, PipelineEvent, TurnEvent};
use crate::session::{Session, SessionEvent, SessionKey, SessionStore};

/// 输出模式：展示每个阶段的输出，或只展示最后一个
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    StreamAll,
    LastOnly,
}

impl OutputMode {
    pub fn from_last_only(last_only: bool) -> Self {
        if last_only {
            OutputMode::LastOnly
        } else {
            OutputMode::StreamAll
        }
    }
}

/// 会话解析结果
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub session: Session,
    /// true 表示本次新建，false 表示已存在
    pub created: bool,
}

/// 多轮会话的展示接口（控制台等）
pub trait Presenter {
    fn session_started(&mut self, session_id: &str, created: bool);
    fn user_query(&mut self, query: &str);
    /// is_final 仅在 LastOnly 模式下为 true
    fn stage_output(&mut self, turn: &TurnEvent, is_final: bool);
    fn no_queries(&mut self);
    fn run_failed(&mut self, error: &AgentError);
}

pub struct Runner {
    app_name: String,
    pipeline: Arc<Pipeline>,
    sessions: Arc<dyn SessionStore>,
}

impl Runner {
    pub fn new(app_name: impl Into<String>, pipeline: Arc<Pipeline>, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            app_name: app_name.into(),
            pipeline,
            sessions,
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// 先尝试创建；任何创建失败都回退到获取；两者都失败时返回 SessionResolution
    pub async fn resolve_session(&self, user_id: &str, session_id: &str) -> Result<ResolvedSession, AgentError> {
        match self.sessions.create_session(&self.app_name, user_id, session_id).await {
            Ok(session) => {
                tracing::info!(session = %session.key, "New session created");
                Ok(ResolvedSession { session, created: true })
            }
            Err(create_err) => match self.sessions.get_session(&self.app_name, user_id, session_id).await {
                Ok(session) => {
                    tracing::info!(session = %session.key, "Existing session retrieved");
                    Ok(ResolvedSession { session, created: false })
                }
                Err(get_err) => Err(AgentError::SessionResolution {
                    create: create_err.to_string(),
                    get: get_err.to_string(),
                }),
            },
        }
    }

    /// 提交一条用户消息，返回按模式过滤后的阶段输出
    pub async fn run(
        &self,
        user_id: &str,
        session_id: &str,
        text: &str,
        mode: OutputMode,
    ) -> Result<Vec<TurnEvent>, AgentError> {
        self.execute(user_id, session_id, text, mode, None).await
    }

    /// 同 run，并把运行过程事件发送到 tx（返回时 tx 已释放）
    pub async fn run_with_events(
        &self,
        user_id: &str,
        session_id: &str,
        text: &str,
        mode: OutputMode,
        tx: mpsc::UnboundedSender<PipelineEvent>,
    ) -> Result<Vec<TurnEvent>, AgentError> {
        self.execute(user_id, session_id, text, mode, Some(tx)).await
    }

    async fn execute(
        &self,
        user_id: &str,
        session_id: &str,
        text: &str,
        mode: OutputMode,
        tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
    ) -> Result<Vec<TurnEvent>, AgentError> {
        let resolved = self.resolve_session(user_id, session_id).await?;
        self.run_in(&resolved.session.key, text, mode, tx).await
    }

    /// 在已解析的会话中运行一次：追加用户输入，再运行流水线
    async fn run_in(
        &self,
        key: &SessionKey,
        text: &str,
        mode: OutputMode,
        tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
    ) -> Result<Vec<TurnEvent>, AgentError> {
        self.sessions.append_event(key, SessionEvent::user(text)).await?;

        let mut ctx = InvocationContext::new(key.clone(), text, self.sessions.clone());
        if let Some(tx) = tx {
            ctx = ctx.with_events(tx);
        }
        let outcome = self.pipeline.run(&ctx).await?;
        Ok(select_outputs(outcome.outputs, mode))
    }

    /// 在同一会话中依次处理多条查询，并通过 Presenter 展示
    ///
    /// 会话只解析一次；StreamAll 模式下阶段输出随到随展示；某条查询失败时报告错误并停止后续查询。
    pub async fn run_session<P: Presenter>(
        &self,
        user_id: &str,
        queries: &[String],
        session_id: &str,
        mode: OutputMode,
        presenter: &mut P,
    ) -> Result<(), AgentError> {
        let resolved = self.resolve_session(user_id, session_id).await?;
        presenter.session_started(resolved.session.id(), resolved.created);
        let key = resolved.session.key;

        if queries.is_empty() {
            presenter.no_queries();
            return Ok(());
        }

        for query in queries {
            presenter.user_query(query);
            let (tx, mut rx) = mpsc::unbounded_channel();
            let run = self.run_in(&key, query, mode, Some(tx));
            let drain = async {
                while let Some(event) = rx.recv().await {
                    if mode == OutputMode::StreamAll {
                        if let PipelineEvent::StageOutput(turn) = event {
                            if turn.is_displayable() {
                                presenter.stage_output(&turn, false);
                            }
                        }
                    }
                }
            };
            let (result, ()) = tokio::join!(run, drain);
            match result {
                Ok(outputs) => {
                    if mode == OutputMode::LastOnly {
                        if let Some(last) = outputs.last() {
                            presenter.stage_output(last, true);
                        }
                    }
                }
                Err(e) => {
                    presenter.run_failed(&e);
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

/// 过滤空串与 "None"，LastOnly 时只保留最后一条
pub fn select_outputs(outputs: Vec<TurnEvent>, mode: OutputMode) -> Vec<TurnEvent> {
    let mut visible: Vec<TurnEvent> = outputs.into_iter().filter(TurnEvent::is_displayable).collect();
    match mode {
        OutputMode::StreamAll => visible,
        OutputMode::LastOnly => visible.pop().into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::pipeline::StageBuilder;
    use crate::session::{InMemorySessionStore, SessionError};
    use async_trait::async_trait;

    fn runner() -> Runner {
        let stage = StageBuilder::new("only")
            .instruction("You answer.")
            .build(Arc::new(MockLlmClient))
            .unwrap();
        let pipeline = Arc::new(Pipeline::new("P", vec![stage]).unwrap());
        Runner::new("app", pipeline, Arc::new(InMemorySessionStore::new()))
    }

    #[test]
    fn test_select_outputs_filters_placeholders() {
        let outputs = vec![
            TurnEvent::new("a", "None"),
            TurnEvent::new("b", "real"),
            TurnEvent::new("c", ""),
        ];
        assert_eq!(select_outputs(outputs.clone(), OutputMode::StreamAll), vec![TurnEvent::new("b", "real")]);
        assert_eq!(select_outputs(outputs, OutputMode::LastOnly), vec![TurnEvent::new("b", "real")]);
        assert!(select_outputs(vec![TurnEvent::new("a", "None")], OutputMode::LastOnly).is_empty());
    }

    #[tokio::test]
    async fn test_resolve_twice_reuses_session() {
        let runner = runner();
        let first = runner.resolve_session("u", "s1").await.unwrap();
        assert!(first.created);
        let second = runner.resolve_session("u", "s1").await.unwrap();
        assert!(!second.created);
        assert_eq!(second.session.key, first.session.key);
    }

    /// create 与 get 都失败的存储
    struct Broken;

    #[async_trait]
    impl SessionStore for Broken {
        async fn create_session(&self, _a: &str, _u: &str, _s: &str) -> Result<Session, SessionError> {
            Err(SessionError::Backend("create down".into()))
        }
        async fn get_session(&self, _a: &str, _u: &str, _s: &str) -> Result<Session, SessionError> {
            Err(SessionError::Backend("get down".into()))
        }
        async fn append_event(&self, _k: &SessionKey, _e: SessionEvent) -> Result<(), SessionError> {
            Ok(())
        }
        async fn set_output(&self, _k: &SessionKey, _o: &str, _v: String) -> Result<(), SessionError> {
            Ok(())
        }
        async fn delete_session(&self, _k: &SessionKey) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_resolution_failure_reports_both_errors() {
        let stage = StageBuilder::new("only")
            .instruction("You answer.")
            .build(Arc::new(MockLlmClient))
            .unwrap();
        let runner = Runner::new(
            "app",
            Arc::new(Pipeline::new("P", vec![stage]).unwrap()),
            Arc::new(Broken),
        );
        let err = runner.run("u", "s", "hi", OutputMode::StreamAll).await.unwrap_err();
        match err {
            AgentError::SessionResolution { create, get } => {
                assert!(create.contains("create down"));
                assert!(get.contains("get down"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    /// 统计 create 调用次数的存储
    #[derive(Default)]
    struct Counting {
        inner: InMemorySessionStore,
        creates: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl SessionStore for Counting {
        async fn create_session(&self, a: &str, u: &str, s: &str) -> Result<Session, SessionError> {
            self.creates.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.create_session(a, u, s).await
        }
        async fn get_session(&self, a: &str, u: &str, s: &str) -> Result<Session, SessionError> {
            self.inner.get_session(a, u, s).await
        }
        async fn append_event(&self, k: &SessionKey, e: SessionEvent) -> Result<(), SessionError> {
            self.inner.append_event(k, e).await
        }
        async fn set_output(&self, k: &SessionKey, o: &str, v: String) -> Result<(), SessionError> {
            self.inner.set_output(k, o, v).await
        }
        async fn delete_session(&self, k: &SessionKey) -> bool {
            self.inner.delete_session(k).await
        }
    }

    #[tokio::test]
    async fn test_run_session_resolves_session_once() {
        use std::sync::atomic::Ordering;

        let stage = StageBuilder::new("only")
            .instruction("You answer.")
            .build(Arc::new(MockLlmClient))
            .unwrap();
        let store = Arc::new(Counting::default());
        let runner = Runner::new(
            "app",
            Arc::new(Pipeline::new("P", vec![stage]).unwrap()),
            store.clone(),
        );
        let queries = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        runner
            .run_session("u", &queries, "s", OutputMode::StreamAll, &mut Recording::default())
            .await
            .unwrap();

        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
        let session = store.inner.get_session("app", "u", "s").await.unwrap();
        assert_eq!(session.user_turns(), 3);
        assert_eq!(session.events.len(), 6);
    }

    #[derive(Default)]
    struct Recording {
        lines: Vec<String>,
    }

    impl Presenter for Recording {
        fn session_started(&mut self, session_id: &str, created: bool) {
            self.lines.push(format!("session {session_id} {created}"));
        }
        fn user_query(&mut self, query: &str) {
            self.lines.push(format!("user {query}"));
        }
        fn stage_output(&mut self, turn: &TurnEvent, is_final: bool) {
            self.lines.push(format!("{} {}", turn.author, is_final));
        }
        fn no_queries(&mut self) {
            self.lines.push("none".into());
        }
        fn run_failed(&mut self, error: &AgentError) {
            self.lines.push(format!("error {error}"));
        }
    }

    #[tokio::test]
    async fn test_run_session_presents_each_query() {
        let runner = runner();
        let mut rec = Recording::default();
        let queries = vec!["one".to_string(), "two".to_string()];
        runner
            .run_session("u", &queries, "s", OutputMode::StreamAll, &mut rec)
            .await
            .unwrap();
        assert_eq!(
            rec.lines,
            vec!["session s true", "user one", "only false", "user two", "only false"]
        );

        let mut rec = Recording::default();
        runner
            .run_session("u", &[], "s", OutputMode::LastOnly, &mut rec)
            .await
            .unwrap();
        assert_eq!(rec.lines, vec!["session s false", "none"]);

        let session = runner.sessions().get_session("app", "u", "s").await.unwrap();
        assert_eq!(session.user_turns(), 2);
        assert_eq!(session.events.len(), 4);
    }
}
