//! Web page fetch tool
//!
//! Article extraction uses simple HTML-tag stripping rather than a DOM
//! parser, keeping the dependency surface to `reqwest` alone.

use async_trait::async_trait;
use serde_json::Value;

use super::traits::{Tool, ToolResult};
use crate::error::{Error, Result};

const MAX_CONTENT_CHARS: usize = 8000;

/// Built-in tool: fetch and extract text content from a web page
pub struct WebGetTool {
    client: reqwest::Client,
}

impl WebGetTool {
    pub fn new() -> Self {
        WebGetTool {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WebGetTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebGetTool {
    fn name(&self) -> &str {
        "web_get"
    }

    fn description(&self) -> &str {
        "Fetch a web page and extract its readable text content"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {"type": "string"},
                "article_mode": {"type": "boolean", "default": true},
                "timeout": {"type": "integer", "default": 20}
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let url = args
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::ValidationError("web_get requires url".into()))?
            .trim();
        let article_mode = args.get("article_mode").and_then(Value::as_bool).unwrap_or(true);
        let timeout_secs = args.get("timeout").and_then(Value::as_u64).unwrap_or(20);

        let parsed = url::Url::parse(url)
            .map_err(|e| Error::ValidationError(format!("invalid URL format: {e}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::ValidationError(format!(
                "unsupported URL scheme: {}",
                parsed.scheme()
            )));
        }

        let response = self
            .client
            .get(parsed.clone())
            .header("User-Agent", "openagent/1.0")
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .send()
            .await
            .map_err(|e| Error::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Ok(ToolResult::failure(format!("HTTP {status}")));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        if !content_type.contains("text/html") {
            return Ok(ToolResult::failure(format!(
                "non-HTML content type: {content_type}"
            )));
        }

        let html = response.text().await.map_err(|e| Error::NetworkError(e.to_string()))?;
        let mut extracted = if article_mode {
            extract_article(&html)
        } else {
            extract_full_page(&html)
        };

        if extracted.trim().len() < 10 {
            return Ok(ToolResult::failure("no meaningful content extracted from page"));
        }

        let clipped = extracted.chars().count() > MAX_CONTENT_CHARS;
        if clipped {
            extracted = extracted.chars().take(MAX_CONTENT_CHARS).collect::<String>() + "... [content clipped]";
        }

        Ok(ToolResult::success(extracted))
    }
}

fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_lowercase();
    let start = lower.find("<title")?;
    let open_end = html[start..].find('>')? + start + 1;
    let close = lower[open_end..].find("</title>")? + open_end;
    Some(strip_tags(&html[open_end..close]).trim().to_string())
}

fn extract_article(html: &str) -> String {
    let body = strip_non_content_tags(html);
    let text = strip_tags(&body);
    let cleaned = clean_whitespace(&text);
    match extract_title(html) {
        Some(title) if !title.is_empty() && !cleaned[..cleaned.len().min(200)].contains(&title) => {
            format!("Title: {title}\n\n{cleaned}")
        }
        _ => cleaned,
    }
}

fn extract_full_page(html: &str) -> String {
    let without_scripts = strip_tag_blocks(html, &["script", "style"]);
    clean_whitespace(&strip_tags(&without_scripts))
}

fn strip_non_content_tags(html: &str) -> String {
    strip_tag_blocks(html, &["script", "style", "nav", "header", "footer", "aside"])
}

fn strip_tag_blocks(html: &str, tags: &[&str]) -> String {
    let mut out = html.to_string();
    for tag in tags {
        loop {
            let lower = out.to_lowercase();
            let open_marker = format!("<{tag}");
            let Some(start) = lower.find(&open_marker) else { break };
            let close_marker = format!("</{tag}>");
            let Some(close_rel) = lower[start..].find(&close_marker) else { break };
            let end = start + close_rel + close_marker.len();
            out.replace_range(start..end, " ");
        }
    }
    out
}

fn strip_tags(html: &str) -> String {
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
    html_unescape(&out)
}

fn html_unescape(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

fn clean_whitespace(text: &str) -> String {
    text.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| l.len() > 5)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_and_extracts_text() {
        let html = "<html><head><title>Hi</title></head><body><script>evil()</script><p>Hello there world</p></body></html>";
        let text = extract_article(html);
        assert!(text.contains("Hello there world"));
        assert!(!text.contains("evil()"));
    }

    #[test]
    fn full_page_keeps_all_text() {
        let html = "<div>Some long enough paragraph text here</div>";
        let text = extract_full_page(html);
        assert!(text.contains("Some long enough paragraph text here"));
    }

    #[test]
    fn unescapes_entities() {
        assert_eq!(html_unescape("Tom &amp; Jerry"), "Tom & Jerry");
    }
}
