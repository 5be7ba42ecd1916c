//! Web 搜索工具：查询词 -> 排序后的结果摘要
//!
//! 向配置的搜索端点发起 GET `?q=<query>`（默认 DuckDuckGo HTML 版），解析结果标题、链接与摘要；
//! 无法解析时退回到 html2text 提取整页可读文本。输出超过 max_result_chars 时截断并追加 ...[truncated]。

use std::sync::OnceLock;

use async_trait::async_trait;
use html2text::from_read;
use regex::Regex;
use reqwest::Client;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

use crate::config::SearchSection;
use crate::tools::{Tool, ToolContext};

/// web_search 参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchArgs {
    /// 搜索查询，如 "data science career transition skills"
    pub query: String,
}

/// 单条搜索结果
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Web 搜索工具
pub struct WebSearchTool {
    client: Client,
    endpoint: String,
    max_results: usize,
    max_result_chars: usize,
}

/// 简易去除 HTML 标签并压缩空白，顺带解码常见实体
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    let decoded = out
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)class="result__a"[^>]*?href="([^"]*)"[^>]*>(.*?)</a>"#)
            .unwrap_or_else(|e| panic!("invalid title regex: {e}"))
    })
}

fn snippet_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)class="result__snippet"[^>]*>(.*?)</(?:a|div|td)>"#)
            .unwrap_or_else(|e| panic!("invalid snippet regex: {e}"))
    })
}

/// 解析 DuckDuckGo HTML 结果页；标题与摘要按出现顺序配对
pub fn parse_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    let snippets: Vec<String> = snippet_regex()
        .captures_iter(html)
        .map(|c| strip_html_tags(&c[1]))
        .collect();
    title_regex()
        .captures_iter(html)
        .enumerate()
        .map(|(i, c)| SearchResult {
            url: normalize_url(&c[1]),
            title: strip_html_tags(&c[2]),
            snippet: snippets.get(i).cloned().unwrap_or_default(),
        })
        .filter(|r| !r.title.is_empty())
        .take(max_results)
        .collect()
}

/// 协议相对链接补全为 https
fn normalize_url(href: &str) -> String {
    let href = href.replace("&amp;", "&");
    if let Some(rest) = href.strip_prefix("//") {
        format!("https://{}", rest)
    } else {
        href
    }
}

/// 结果格式化为编号列表，供模型阅读
pub fn format_results(query: &str, results: &[SearchResult]) -> String {
    let mut out = format!("Search results for \"{}\":\n", query);
    for (i, r) in results.iter().enumerate() {
        out.push_str(&format!("\n{}. {}\n   {}\n", i + 1, r.title, r.url));
        if !r.snippet.is_empty() {
            out.push_str(&format!("   {}\n", r.snippet));
        }
    }
    out
}

fn truncate_chars(s: String, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        s.chars().take(max_chars).collect::<String>() + "\n...[truncated]"
    } else {
        s
    }
}

impl WebSearchTool {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64, max_results: usize, max_result_chars: usize) -> Self {
        const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            max_results,
            max_result_chars,
        }
    }

    pub fn from_config(cfg: &SearchSection) -> Self {
        Self::new(
            cfg.endpoint.clone(),
            cfg.timeout_secs,
            cfg.max_results,
            cfg.max_result_chars,
        )
    }

    async fn search(&self, query: &str) -> Result<String, String> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| format!("Read body: {}", e))?;

        let results = parse_results(&body, self.max_results);
        let text = if results.is_empty() {
            match from_read(body.as_bytes(), 120) {
                Ok(text) if !text.trim().is_empty() => text,
                _ => strip_html_tags(&body),
            }
        } else {
            format_results(query, &results)
        };
        Ok(truncate_chars(text, self.max_result_chars))
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and return ranked results with snippets. Args: {\"query\": \"...\"}."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schema_for!(SearchArgs)).unwrap_or(Value::Null)
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String, String> {
        let args: SearchArgs =
            serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {}", e))?;
        let query = args.query.trim();
        if query.is_empty() {
            return Err("Missing query".to_string());
        }
        tracing::info!(stage = %ctx.stage, query = %query, "web search");
        self.search(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
<div class="result">
  <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com&amp;rut=1">Data <b>Science</b> Roadmap</a>
  <a class="result__snippet" href="x">Learn <b>Python</b>, SQL &amp; statistics.</a>
</div>
<div class="result">
  <a rel="nofollow" class="result__a" href="https://second.example.org/page">PM to DS stories</a>
  <a class="result__snippet" href="y">How product managers switched.</a>
</div>
"#;

    #[test]
    fn test_parse_results() {
        let results = parse_results(SAMPLE, 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Data Science Roadmap");
        assert_eq!(results[0].snippet, "Learn Python, SQL & statistics.");
        assert!(results[0].url.starts_with("https://duckduckgo.com/l/?uddg="));
        assert!(results[0].url.contains("&rut=1"));
        assert_eq!(results[1].url, "https://second.example.org/page");
    }

    #[test]
    fn test_parse_respects_max_results() {
        assert_eq!(parse_results(SAMPLE, 1).len(), 1);
        assert!(parse_results("<html>no results</html>", 5).is_empty());
    }

    #[test]
    fn test_format_and_truncate() {
        let text = format_results("ds", &parse_results(SAMPLE, 10));
        assert!(text.starts_with("Search results for \"ds\":"));
        assert!(text.contains("2. PM to DS stories"));
        let cut = truncate_chars("abcdef".to_string(), 3);
        assert_eq!(cut, "abc\n...[truncated]");
    }

    #[tokio::test]
    async fn test_rejects_missing_query() {
        let tool = WebSearchTool::new("http://127.0.0.1:9/", 1, 5, 100);
        let ctx = ToolContext::default();
        assert!(tool.execute(serde_json::json!({}), &ctx).await.is_err());
        assert!(tool
            .execute(serde_json::json!({"query": "  "}), &ctx)
            .await
            .is_err());
    }

    #[test]
    fn test_schema_mentions_query() {
        let tool = WebSearchTool::new("http://localhost/", 1, 5, 100);
        assert!(tool.parameters_schema().to_string().contains("query"));
    }
}
