//! 长期记忆：跨会话保存会话内容并按关键词检索
//!
//! add_session_to_memory 以会话为单位写入：同一会话重复保存会替换该会话原有条目，因此可反复调用。
//! search_memory 按 (应用, 用户) 隔离，使用关键词重叠打分。

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{Session, SessionKey};

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Memory store unavailable: {0}")]
    Unavailable(String),

    #[error("Memory IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Memory serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 一条长期记忆：来自某会话的一条事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    pub author: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl MemoryEntry {
    fn belongs_to(&self, key: &SessionKey) -> bool {
        self.app_name == key.app_name
            && self.user_id == key.user_id
            && self.session_id == key.session_id
    }
}

/// 长期记忆服务
#[async_trait]
pub trait MemoryService: Send + Sync {
    /// 将会话内容写入记忆（同一会话重复写入是安全的）
    async fn add_session_to_memory(&self, session: &Session) -> Result<(), MemoryError>;

    /// 检索与 query 最相关的 k 条记忆
    async fn search_memory(
        &self,
        app_name: &str,
        user_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError>;

    /// 是否启用（Noop 实现返回 false）
    fn enabled(&self) -> bool {
        true
    }
}

/// 空实现：未启用长期记忆时使用
#[derive(Clone, Default)]
pub struct NoopMemoryService;

#[async_trait]
impl MemoryService for NoopMemoryService {
    async fn add_session_to_memory(&self, _session: &Session) -> Result<(), MemoryError> {
        Ok(())
    }

    async fn search_memory(
        &self,
        _app_name: &str,
        _user_id: &str,
        _query: &str,
        _k: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        Ok(Vec::new())
    }

    fn enabled(&self) -> bool {
        false
    }
}

/// 将文本切分为小写词集合，用于简单相似度（词重叠数）
pub(crate) fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().count() > 1)
        .collect()
}

/// 会话 -> 记忆条目（跳过空内容）
pub(crate) fn entries_from_session(session: &Session) -> Vec<MemoryEntry> {
    session
        .events
        .iter()
        .filter(|e| !e.content.trim().is_empty())
        .map(|e| MemoryEntry {
            app_name: session.key.app_name.clone(),
            user_id: session.key.user_id.clone(),
            session_id: session.key.session_id.clone(),
            author: e.author.clone(),
            content: e.content.clone(),
            timestamp: e.timestamp,
        })
        .collect()
}

/// 用新条目替换该会话的旧条目，超过上限时丢弃最旧的
pub(crate) fn replace_session_entries(
    entries: &mut Vec<MemoryEntry>,
    session: &Session,
    max_entries: usize,
) {
    entries.retain(|e| !e.belongs_to(&session.key));
    entries.extend(entries_from_session(session));
    let n = entries.len();
    if n > max_entries {
        entries.drain(0..n - max_entries);
    }
}

/// 关键词重叠检索：只看同一 (app, user) 的条目，分数相同时新的在前
pub(crate) fn rank_entries(
    entries: &[MemoryEntry],
    app_name: &str,
    user_id: &str,
    query: &str,
    k: usize,
) -> Vec<MemoryEntry> {
    let query_tokens = tokenize_lower(query);
    if query_tokens.is_empty() {
        return Vec::new();
    }
    let mut scored: Vec<(usize, &MemoryEntry)> = entries
        .iter()
        .filter(|e| e.app_name == app_name && e.user_id == user_id)
        .map(|e| (tokenize_lower(&e.content).intersection(&query_tokens).count(), e))
        .filter(|(s, _)| *s > 0)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.timestamp.cmp(&a.1.timestamp)));
    scored.into_iter().take(k).map(|(_, e)| e.clone()).collect()
}

/// 内存实现：按关键词重叠检索（无真实向量）
pub struct InMemoryMemoryService {
    entries: RwLock<Vec<MemoryEntry>>,
    max_entries: usize,
}

impl InMemoryMemoryService {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryMemoryService {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl MemoryService for InMemoryMemoryService {
    async fn add_session_to_memory(&self, session: &Session) -> Result<(), MemoryError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| MemoryError::Unavailable(e.to_string()))?;
        replace_session_entries(&mut entries, session, self.max_entries);
        Ok(())
    }

    async fn search_memory(
        &self,
        app_name: &str,
        user_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| MemoryError::Unavailable(e.to_string()))?;
        Ok(rank_entries(&entries, app_name, user_id, query, k))
    }
}
