//! 会话存储抽象层
//!
//! create_session 在 ID 已存在时失败，get_session 在 ID 不存在时失败；
//! Runner 通过「先创建、失败再获取」保持重复调用的幂等。各会话历史只追加，互不共享。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;

use super::types::{Session, SessionEvent, SessionKey};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Session already exists: {0}")]
    AlreadyExists(SessionKey),

    #[error("Session not found: {0}")]
    NotFound(SessionKey),

    #[error("Session backend error: {0}")]
    Backend(String),
}

/// 会话存储接口
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 创建新会话；同 key 已存在时返回 AlreadyExists
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Session, SessionError>;

    /// 获取会话快照；不存在时返回 NotFound
    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Session, SessionError>;

    /// 追加一条事件到会话历史
    async fn append_event(&self, key: &SessionKey, event: SessionEvent) -> Result<(), SessionError>;

    /// 写入命名输出（同键覆盖）
    async fn set_output(
        &self,
        key: &SessionKey,
        output_key: &str,
        value: String,
    ) -> Result<(), SessionError>;

    /// 删除会话，返回是否存在
    async fn delete_session(&self, key: &SessionKey) -> bool;
}

/// 内存会话存储
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionKey, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在会话上执行闭包（写锁内），返回闭包结果；会话不存在时返回 NotFound
    async fn with_session<F, R>(&self, key: &SessionKey, f: F) -> Result<R, SessionError>
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(key)
            .ok_or_else(|| SessionError::NotFound(key.clone()))?;
        let result = f(session);
        session.updated_at = Utc::now();
        Ok(result)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Session, SessionError> {
        let key = SessionKey::new(app_name, user_id, session_id);
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&key) {
            return Err(SessionError::AlreadyExists(key));
        }
        let session = Session::new(key.clone());
        sessions.insert(key, session.clone());
        tracing::debug!(session = %session.key, "session created");
        Ok(session)
    }

    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Session, SessionError> {
        let key = SessionKey::new(app_name, user_id, session_id);
        self.sessions
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or(SessionError::NotFound(key))
    }

    async fn append_event(&self, key: &SessionKey, event: SessionEvent) -> Result<(), SessionError> {
        self.with_session(key, |s| s.events.push(event)).await
    }

    async fn set_output(
        &self,
        key: &SessionKey,
        output_key: &str,
        value: String,
    ) -> Result<(), SessionError> {
        self.with_session(key, |s| {
            s.state.insert(output_key.to_string(), value);
        })
        .await
    }

    async fn delete_session(&self, key: &SessionKey) -> bool {
        self.sessions.write().await.remove(key).is_some()
    }
}
