//! 记忆层：对话消息、长期记忆服务（内存 / JSON 文件），以及阶段结束后的自动保存钩子

pub mod auto_save;
pub mod conversation;
pub mod long_term;
pub mod persistence;

use std::sync::Arc;

pub use auto_save::AutoSaveToMemory;
pub use conversation::{Message, Role};
pub use long_term::{InMemoryMemoryService, MemoryEntry, MemoryError, MemoryService, NoopMemoryService};
pub use persistence::JsonFileMemoryService;

use crate::config::MemorySection;

/// 根据 [memory] 配置创建记忆服务：json_file 加载失败时回退到内存实现
pub fn create_memory_service(cfg: &MemorySection) -> Arc<dyn MemoryService> {
    match cfg.backend.to_lowercase().as_str() {
        "json_file" | "file" => match JsonFileMemoryService::open(&cfg.path, cfg.max_entries) {
            Ok(svc) => {
                tracing::info!("Using JSON file memory: {:?}", cfg.path);
                Arc::new(svc)
            }
            Err(e) => {
                tracing::warn!("Failed to open memory file, falling back to in-memory: {}", e);
                Arc::new(InMemoryMemoryService::new(cfg.max_entries))
            }
        },
        "none" | "noop" => Arc::new(NoopMemoryService),
        _ => {
            tracing::info!("Using in-memory memory service");
            Arc::new(InMemoryMemoryService::new(cfg.max_entries))
        }
    }
}
