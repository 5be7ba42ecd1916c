//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CAREER__*` 覆盖（双下划线表示嵌套，如 `CAREER__RETRY__ATTEMPTS=3`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::llm::RetryConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub memory: MemorySection,
}

/// [app] 段：应用名、默认用户与会话、每阶段工具调用上限
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_session_id")]
    pub session_id: String,
    /// 单个阶段内最多执行几次工具调用，超过后要求模型直接作答
    #[serde(default = "default_max_tool_steps")]
    pub max_tool_steps: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            user_id: default_user_id(),
            session_id: default_session_id(),
            max_tool_steps: default_max_tool_steps(),
        }
    }
}

fn default_app_name() -> String {
    "career_advisor_app".to_string()
}

fn default_user_id() -> String {
    "default".to_string()
}

fn default_session_id() -> String {
    "default_session".to_string()
}

fn default_max_tool_steps() -> usize {
    4
}

/// [llm] 段：后端选择、模型与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：gemini / openai / mock；实际选择还取决于环境变量中的 API Key
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_model() -> String {
    crate::llm::GEMINI_FLASH_LITE.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [retry] 段：模型服务的重试策略（指数退避）
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    /// 总尝试次数（含首次）
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_exp_base")]
    pub exp_base: f64,
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: f64,
    #[serde(default = "default_http_status_codes")]
    pub http_status_codes: Vec<u16>,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            exp_base: default_exp_base(),
            initial_delay_secs: default_initial_delay_secs(),
            http_status_codes: default_http_status_codes(),
        }
    }
}

fn default_attempts() -> u32 {
    5
}

fn default_exp_base() -> f64 {
    7.0
}

fn default_initial_delay_secs() -> f64 {
    1.0
}

fn default_http_status_codes() -> Vec<u16> {
    vec![429, 500, 503, 504]
}

impl RetrySection {
    /// 转为 RetryConfig；负数或非有限的延迟按 0 处理，合法性由 RetryConfig::validate 检查
    pub fn to_retry_config(&self) -> RetryConfig {
        let secs = if self.initial_delay_secs.is_finite() && self.initial_delay_secs > 0.0 {
            self.initial_delay_secs
        } else {
            0.0
        };
        RetryConfig {
            attempts: self.attempts,
            exp_base: self.exp_base,
            initial_delay: Duration::from_secs_f64(secs),
            http_status_codes: self.http_status_codes.clone(),
        }
    }
}

/// [tools] 段：工具超时与 web 搜索
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub search: SearchSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            search: SearchSection::default(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [tools.search] 段：搜索端点（GET ?q=）、超时、结果条数与字符上限
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_max_result_chars")]
    pub max_result_chars: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            timeout_secs: default_search_timeout_secs(),
            max_results: default_max_results(),
            max_result_chars: default_max_result_chars(),
        }
    }
}

fn default_search_endpoint() -> String {
    "https://html.duckduckgo.com/html/".to_string()
}

fn default_search_timeout_secs() -> u64 {
    15
}

fn default_max_results() -> usize {
    8
}

fn default_max_result_chars() -> usize {
    8000
}

/// [memory] 段：长期记忆后端
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    /// in_memory / json_file
    #[serde(default = "default_memory_backend")]
    pub backend: String,
    /// json_file 后端的文件路径
    #[serde(default = "default_memory_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// preload_memory 注入的条数上限
    #[serde(default = "default_preload_top_k")]
    pub preload_top_k: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: default_memory_path(),
            max_entries: default_max_entries(),
            preload_top_k: default_preload_top_k(),
        }
    }
}

fn default_memory_backend() -> String {
    "in_memory".to_string()
}

fn default_memory_path() -> PathBuf {
    PathBuf::from("workspace/memory/career-memory.json")
}

fn default_max_entries() -> usize {
    1000
}

fn default_preload_top_k() -> usize {
    5
}

/// 从 config 目录加载配置，环境变量 CAREER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CAREER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CAREER")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("retry.http_status_codes")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
