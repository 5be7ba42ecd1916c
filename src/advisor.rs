//! 职业顾问流水线：research_agent（检索 + 记忆）→ mentor_agent（分阶段转型计划）
//!
//! 两个阶段的指令可由 config/prompts/research.md、config/prompts/mentor.md 覆盖。

use std::path::Path;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::{AutoSaveToMemory, MemoryService};
use crate::pipeline::{Pipeline, StageBuilder, StageDefinition, StageHook};
use crate::tools::{LoadMemoryTool, PreloadMemoryTool, Tool, WebSearchTool};

pub const PIPELINE_NAME: &str = "CareerPathPipeline";
pub const RESEARCH_STAGE: &str = "research_agent";
pub const MENTOR_STAGE: &str = "mentor_agent";
pub const RESEARCH_OUTPUT_KEY: &str = "research_summary";
pub const MENTOR_OUTPUT_KEY: &str = "career_advice";

const DEFAULT_RESEARCH_PROMPT: &str = r#"You are a Research Agent specialized in career transitions.

Your task:
1. Extract career transition details from the user's message or check the past conversations provided below for context
2. Use the web_search tool to research the target career path
3. Focus on: required skills, typical career progression, salary ranges, and job market demand
4. Search for: online courses, certifications, and learning resources
5. Look for: success stories of people who made similar transitions

Output format:
## Key Skills Required
[List 5-7 essential skills with brief descriptions]

## Learning Resources
[Specific courses, certifications, books, and platforms]

## Market Outlook
[Job demand, salary ranges, growth trends with data]

## Transition Timeline
[Typical timeframe for this transition based on the user's experience level]

## Success Stories
[Brief examples of successful transitions]

Keep your research comprehensive but concise. Focus on actionable information tailored to the user's background."#;

const DEFAULT_MENTOR_PROMPT: &str = r#"You are a Career Mentor Agent. Based on the research findings: {research_summary}

Extract the user's context from the conversation history and research summary, then create a personalized, actionable transition plan.

Structure your plan as follows:

## Phase 1: Foundation (Months 1-3)
- Specific skills to learn first (prioritized based on their background)
- Recommended courses/resources with links when available
- Daily/weekly time commitment suggestions
- Quick wins to build confidence

## Phase 2: Building Portfolio (Months 4-6)
- Concrete projects to build (with examples relevant to their experience)
- GitHub repositories to create
- Communities to join (specific names)
- Networking strategies leveraging their current role

## Phase 3: Job Search (Months 6-9)
- Resume updates needed (specific sections)
- Where to apply (companies, job boards)
- Interview preparation tips
- Portfolio presentation strategies

## Milestones & Checkpoints
- Monthly goals with measurable outcomes
- How to measure progress
- Red flags and when to adjust course

## Leveraging Your Background
- How to translate their existing skills to the new role
- Unique advantages from their current position
- How their experience is an asset

Make it specific, realistic, and encouraging. Use actual course names, platforms, and communities when possible.
Keep the tone supportive but practical: acknowledge challenges while emphasizing achievability.
Tailor everything to their specific situation."#;

/// 两个阶段的指令
#[derive(Debug, Clone, PartialEq)]
pub struct Prompts {
    pub research: String,
    pub mentor: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            research: DEFAULT_RESEARCH_PROMPT.to_string(),
            mentor: DEFAULT_MENTOR_PROMPT.to_string(),
        }
    }
}

impl Prompts {
    /// 依次在 config/prompts、../config/prompts 查找覆盖文件，空文件忽略
    pub fn load() -> Self {
        let dir = ["config/prompts", "../config/prompts"]
            .into_iter()
            .map(Path::new)
            .find(|p| p.is_dir());
        match dir {
            Some(dir) => Self::load_from(dir),
            None => Self::default(),
        }
    }

    pub fn load_from(dir: &Path) -> Self {
        let read = |name: &str| {
            std::fs::read_to_string(dir.join(name))
                .ok()
                .filter(|s| !s.trim().is_empty())
        };
        let defaults = Self::default();
        let research = read("research.md").unwrap_or(defaults.research);
        let mentor = read("mentor.md").unwrap_or(defaults.mentor);
        Self { research, mentor }
    }
}

/// 阶段级限制（工具超时、工具调用次数）
#[derive(Debug, Clone, Copy)]
pub struct StageLimits {
    pub tool_timeout_secs: u64,
    pub max_tool_steps: usize,
}

impl StageLimits {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            tool_timeout_secs: cfg.tools.tool_timeout_secs,
            max_tool_steps: cfg.app.max_tool_steps,
        }
    }
}

/// 研究阶段：输出写入 research_summary，结束后可选地保存到长期记忆
pub fn research_stage(
    llm: Arc<dyn LlmClient>,
    instruction: &str,
    tools: Vec<Arc<dyn Tool>>,
    hook: Option<Arc<dyn StageHook>>,
    limits: StageLimits,
) -> Result<StageDefinition, AgentError> {
    let mut builder = StageBuilder::new(RESEARCH_STAGE)
        .instruction(instruction)
        .output_key(RESEARCH_OUTPUT_KEY)
        .tool_timeout_secs(limits.tool_timeout_secs)
        .max_tool_steps(limits.max_tool_steps);
    for tool in tools {
        builder = builder.tool_arc(tool);
    }
    if let Some(hook) = hook {
        builder = builder.after_stage(hook);
    }
    builder.build(llm)
}

/// 导师阶段：读取 research_summary，输出写入 career_advice
pub fn mentor_stage(
    llm: Arc<dyn LlmClient>,
    instruction: &str,
    limits: StageLimits,
) -> Result<StageDefinition, AgentError> {
    StageBuilder::new(MENTOR_STAGE)
        .instruction(instruction)
        .output_key(MENTOR_OUTPUT_KEY)
        .max_tool_steps(limits.max_tool_steps)
        .build(llm)
}

pub fn career_pipeline(research: StageDefinition, mentor: StageDefinition) -> Result<Pipeline, AgentError> {
    Pipeline::new(PIPELINE_NAME, vec![research, mentor])
}

/// 按配置组装完整流水线：web_search + preload_memory + load_memory，研究阶段结束后自动保存记忆
pub fn build_career_pipeline(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
    memory: Arc<dyn MemoryService>,
    prompts: &Prompts,
) -> Result<Pipeline, AgentError> {
    let limits = StageLimits::from_config(cfg);
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(WebSearchTool::from_config(&cfg.tools.search)),
        Arc::new(PreloadMemoryTool::new(memory.clone(), cfg.memory.preload_top_k)),
        Arc::new(LoadMemoryTool::new(memory.clone(), cfg.memory.preload_top_k)),
    ];
    let hook: Arc<dyn StageHook> = Arc::new(AutoSaveToMemory::new(memory));
    let research = research_stage(llm.clone(), &prompts.research, tools, Some(hook), limits)?;
    let mentor = mentor_stage(llm, &prompts.mentor, limits)?;
    career_pipeline(research, mentor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::memory::InMemoryMemoryService;
    use crate::pipeline::placeholders;

    #[test]
    fn test_mentor_prompt_references_research() {
        let keys: Vec<_> = placeholders(DEFAULT_MENTOR_PROMPT).into_iter().map(|p| p.key).collect();
        assert_eq!(keys, vec![RESEARCH_OUTPUT_KEY.to_string()]);
        assert!(placeholders(DEFAULT_RESEARCH_PROMPT).is_empty());
    }

    #[test]
    fn test_build_career_pipeline() {
        let cfg = AppConfig::default();
        let pipeline = build_career_pipeline(
            &cfg,
            Arc::new(MockLlmClient),
            Arc::new(InMemoryMemoryService::default()),
            &Prompts::default(),
        )
        .unwrap();
        assert_eq!(pipeline.name(), PIPELINE_NAME);
        assert_eq!(pipeline.stage_names(), vec![RESEARCH_STAGE, MENTOR_STAGE]);

        let research = &pipeline.stages()[0];
        assert_eq!(research.output_key(), RESEARCH_OUTPUT_KEY);
        assert_eq!(
            research.tools().tool_names(),
            vec!["load_memory", "preload_memory", "web_search"]
        );
        assert!(research.tools().has_callable_tools());
        assert!(research.after_stage().is_some());
        assert!(pipeline.stages()[1].tools().registry().is_empty());
    }

    #[test]
    fn test_prompt_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mentor.md"), "Coach using {research_summary}").unwrap();
        std::fs::write(dir.path().join("research.md"), "   ").unwrap();
        let prompts = Prompts::load_from(dir.path());
        assert_eq!(prompts.mentor, "Coach using {research_summary}");
        assert_eq!(prompts.research, DEFAULT_RESEARCH_PROMPT);
    }
}
