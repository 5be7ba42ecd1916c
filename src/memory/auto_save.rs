//! 自动保存钩子：每个阶段输出落定后，把当前会话写入长期记忆
//!
//! 写入失败只返回错误，由 Pipeline 捕获并记录，不影响阶段输出与后续阶段。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::AgentError;
use crate::memory::MemoryService;
use crate::pipeline::StageHook;
use crate::session::Session;

pub struct AutoSaveToMemory {
    memory: Arc<dyn MemoryService>,
}

impl AutoSaveToMemory {
    pub fn new(memory: Arc<dyn MemoryService>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl StageHook for AutoSaveToMemory {
    async fn after_stage(&self, stage_name: &str, session: &Session) -> Result<(), AgentError> {
        self.memory.add_session_to_memory(session).await?;
        tracing::info!(stage = %stage_name, session = %session.key, "Saved {} output to memory", stage_name);
        Ok(())
    }
}
