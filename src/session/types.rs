//! 会话数据模型
//!
//! 会话由 (应用名, 用户, 会话 ID) 唯一标识，持有按时间排序的事件历史与各阶段的命名输出。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::{Message, Role};

/// 用户消息的作者名
pub const USER_AUTHOR: &str = "user";

/// 会话唯一标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.app_name, self.user_id, self.session_id)
    }
}

/// 会话中的一条事件：用户输入或某阶段的最终输出
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub id: String,
    /// "user" 或产出该事件的阶段名
    pub author: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl SessionEvent {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(USER_AUTHOR, Role::User, content)
    }

    pub fn stage_output(stage: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(stage, Role::Assistant, content)
    }

    fn new(author: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: format!("evt_{}", uuid::Uuid::new_v4()),
            author: author.into(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    /// 转为某阶段视角下的 LLM 消息：自己的输出是 assistant，其他阶段的输出作为上下文转述给模型
    pub fn to_message_for(&self, stage: &str) -> Message {
        if self.is_user() {
            Message::user(self.content.clone())
        } else if self.author == stage {
            Message::assistant(self.content.clone())
        } else {
            Message::user(format!(
                "For context: [{}] said: {}",
                self.author, self.content
            ))
        }
    }
}

/// 会话：事件历史 + 命名输出（输出键 -> 文本）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub key: SessionKey,
    pub events: Vec<SessionEvent>,
    pub state: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(key: SessionKey) -> Self {
        let now = Utc::now();
        Self {
            key,
            events: Vec::new(),
            state: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.key.session_id
    }

    pub fn output(&self, key: &str) -> Option<&str> {
        self.state.get(key).map(String::as_str)
    }

    /// 最近一条用户输入
    pub fn last_user_message(&self) -> Option<&str> {
        self.events
            .iter()
            .rev()
            .find(|e| e.is_user())
            .map(|e| e.content.as_str())
    }

    pub fn user_turns(&self) -> usize {
        self.events.iter().filter(|e| e.is_user()).count()
    }
}
