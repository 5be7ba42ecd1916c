//! 记忆持久化
//!
//! 将长期记忆条目写入/从 JSON 文件加载，用于跨进程保留职业咨询记录。
//! 每次 add_session_to_memory 后整体重写文件；父目录不存在时自动创建。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::long_term::{rank_entries, replace_session_entries, MemoryEntry, MemoryError, MemoryService};
use crate::session::Session;

/// 单文件 JSON 记忆服务
#[derive(Debug)]
pub struct JsonFileMemoryService {
    path: PathBuf,
    max_entries: usize,
    entries: Mutex<Vec<MemoryEntry>>,
}

impl JsonFileMemoryService {
    /// 打开记忆文件；文件不存在时从空开始
    pub fn open(path: impl AsRef<Path>, max_entries: usize) -> Result<Self, MemoryError> {
        let path = path.as_ref().to_path_buf();
        let entries = load_entries(&path)?;
        Ok(Self {
            path,
            max_entries,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn save(&self, entries: &[MemoryEntry]) -> Result<(), MemoryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let data = serde_json::to_string_pretty(entries)?;
        tokio::fs::write(&self.path, data).await?;
        Ok(())
    }
}

fn load_entries(path: &Path) -> Result<Vec<MemoryEntry>, MemoryError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = std::fs::read_to_string(path)?;
    if data.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&data)?)
}

#[async_trait]
impl MemoryService for JsonFileMemoryService {
    async fn add_session_to_memory(&self, session: &Session) -> Result<(), MemoryError> {
        let mut entries = self.entries.lock().await;
        let mut updated = entries.clone();
        replace_session_entries(&mut updated, session, self.max_entries);
        self.save(&updated).await?;
        // 写盘成功后才替换内存中的副本
        *entries = updated;
        Ok(())
    }

    async fn search_memory(
        &self,
        app_name: &str,
        user_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        let entries = self.entries.lock().await;
        Ok(rank_entries(&entries, app_name, user_id, query, k))
    }
}
