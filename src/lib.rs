//! Career Advisor - 两阶段职业转型顾问（Research → Mentor）
//!
//! 模块划分：
//! - **advisor**: 两个阶段的指令与 CareerPathPipeline 组装
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、UI 状态投影、Advisor 组装与命令循环
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Gemini / Mock）与重试策略
//! - **memory**: 对话消息、长期记忆服务与自动保存钩子
//! - **observability**: 日志初始化
//! - **pipeline**: 阶段定义、指令模板、工具循环与顺序编排
//! - **runner**: 会话解析与多轮运行
//! - **session**: 会话模型与存储
//! - **tools**: 工具箱（web_search、preload_memory、load_memory）与执行器
//! - **ui**: Ratatui TUI 与控制台输出

pub mod advisor;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod pipeline;
pub mod runner;
pub mod session;
pub mod tools;
pub mod ui;

pub use crate::core::{create_advisor, Advisor, AgentError};
pub use runner::{OutputMode, Runner};
