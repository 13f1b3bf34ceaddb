//! # Tools
//!
//! Functions an agent's model can call. A tool receives its JSON arguments
//! plus a [`ToolContext`] holding the conversation the calling agent sees.
//!
//! [`ToolRegistry::execute`] never fails: unknown tools, malformed arguments
//! and tool errors come back as an `Error: ...` result for the model to read.

use crate::error::{self, Error, Result};
use crate::provider::{ChatMessage, ToolCall, ToolDefinition};
use async_trait::async_trait;
use futures_util::StreamExt;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use url::{Host, Url};

/// What a tool can see of the calling agent
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// The agent's conversation up to and including the tool-calling turn
    pub messages: Vec<ChatMessage>,
    pub thread_id: Option<String>,
}

impl ToolContext {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            thread_id: None,
        }
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn call(&self, args: Value, ctx: &ToolContext) -> Result<String>;
}

/// Result of running one tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    fn ok(content: String) -> Self {
        Self { content, is_error: false }
    }

    fn error(err: &Error) -> Self {
        Self {
            content: format!("Error: {}", err.message()),
            is_error: true,
        }
    }
}

/// Named tools available to one agent, in registration order
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; a later tool with the same name replaces the earlier one
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    /// Run a model-requested tool call
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutput {
        match self.try_execute(call, ctx).await {
            Ok(content) => ToolOutput::ok(content),
            Err(err) => {
                tracing::debug!(tool = %call.name, error = %err, "tool call failed");
                ToolOutput::error(&err)
            }
        }
    }

    async fn try_execute(&self, call: &ToolCall, ctx: &ToolContext) -> Result<String> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| Error::tool_not_found(&call.name).with_operation("tool::execute"))?;

        let args: Value = call.parse_arguments().map_err(|e| {
            Error::invalid_argument(format!("arguments for '{}' are not valid JSON: {}", call.name, e))
                .with_operation("tool::execute")
        })?;

        tool.call(args, ctx).await
    }
}

// ============================================================================
// fetch_doc
// ============================================================================

/// Response bodies are read up to this many bytes
const FETCH_MAX_BYTES: usize = 2 * 1024 * 1024;
const FETCH_DEFAULT_MAX_CHARS: usize = 20_000;
const FETCH_MAX_REDIRECTS: usize = 5;

/// Hosts never fetched, whatever they resolve to
const BLOCKED_HOSTS: &[&str] = &["localhost", "metadata.google.internal", "metadata.google"];
const BLOCKED_SUFFIXES: &[&str] = &[".local", ".internal", ".localhost", ".lan"];

#[derive(Debug, Deserialize)]
struct FetchDocArgs {
    url: String,
    #[serde(default)]
    max_chars: Option<usize>,
}

/// Fetch a documentation page and return it as plain text
pub struct FetchDocTool {
    client: reqwest::Client,
    script_or_style: Regex,
    block_tag: Regex,
    tag: Regex,
    blank: Regex,
}

impl FetchDocTool {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("codementor/0.1 (fetch_doc)")
            .redirect(reqwest::redirect::Policy::custom(|attempt| {
                if attempt.previous().len() >= FETCH_MAX_REDIRECTS {
                    attempt.error("too many redirects")
                } else if let Some(reason) = blocked_host(attempt.url()) {
                    attempt.error(format!("redirect blocked: {}", reason))
                } else {
                    attempt.follow()
                }
            }))
            .build()
            .map_err(error::client_build_failed)?;

        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                Error::unexpected("invalid HTML pattern")
                    .with_operation("fetch_doc::new")
                    .set_source(e)
            })
        };

        Ok(Self {
            client,
            script_or_style: compile(r"(?is)<(script|style|noscript)\b[^>]*>.*?</(script|style|noscript)\s*>")?,
            block_tag: compile(
                r"(?i)</?(p|div|br|hr|li|ul|ol|dl|dt|dd|h[1-6]|pre|tr|table|section|article|header|footer|nav|blockquote)\b[^>]*>",
            )?,
            tag: compile(r"(?s)<[^>]*>")?,
            blank: compile(r"[ \t\r\f\v]*\n[ \t\r\f\v\n]*")?,
        })
    }

    /// Reduce an HTML document to readable text
    pub fn html_to_text(&self, html: &str) -> String {
        let without_code = self.script_or_style.replace_all(html, " ");
        let with_breaks = self.block_tag.replace_all(&without_code, "\n");
        let without_tags = self.tag.replace_all(&with_breaks, "");
        let decoded = decode_entities(&without_tags);

        let lines: Vec<String> = decoded
            .lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect();
        self.blank.replace_all(lines.join("\n").trim(), "\n").into_owned()
    }

    async fn fetch(&self, url: &Url) -> Result<(String, String)> {
        let response = self.client.get(url.as_str()).send().await.map_err(|e| {
            error::network_failed(format!("failed to fetch {}", url))
                .with_operation("fetch_doc::call")
                .set_source(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::tool_failed("fetch_doc", format!("HTTP {} for {}", status, url))
                .with_operation("fetch_doc::call"));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                error::network_failed("failed to read response body")
                    .with_operation("fetch_doc::call")
                    .set_source(e)
            })?;
            let room = FETCH_MAX_BYTES - body.len();
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= FETCH_MAX_BYTES {
                break;
            }
        }

        Ok((content_type, String::from_utf8_lossy(&body).into_owned()))
    }
}

/// Loopback, private, link-local and other non-public addresses
fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_documentation()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_private_ip(IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local, fe80::/10 link local
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}

/// Why `url`'s host may not be fetched, judged without DNS
fn blocked_host(url: &Url) -> Option<String> {
    match url.host() {
        None => Some("URL has no host".to_string()),
        Some(Host::Ipv4(ip)) => is_private_ip(IpAddr::V4(ip)).then(|| format!("address {} is not public", ip)),
        Some(Host::Ipv6(ip)) => is_private_ip(IpAddr::V6(ip)).then(|| format!("address {} is not public", ip)),
        Some(Host::Domain(domain)) => {
            let lower = domain.to_ascii_lowercase();
            let name = lower.trim_end_matches('.');
            (BLOCKED_HOSTS.contains(&name) || BLOCKED_SUFFIXES.iter().any(|s| name.ends_with(s)))
                .then(|| format!("internal host '{}'", name))
        }
    }
}

/// Parse `raw` and make sure it names a public http(s) host
async fn public_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| {
        Error::invalid_argument(format!("invalid URL: {}", e))
            .with_operation("fetch_doc::call")
            .with_context("url", raw)
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::invalid_argument("URL must start with http:// or https://")
            .with_operation("fetch_doc::call")
            .with_context("url", raw));
    }

    let refuse = |reason: String| {
        Error::invalid_argument(format!("refusing to fetch {}: {}", raw, reason))
            .with_operation("fetch_doc::call")
            .with_context("url", raw)
    };

    if let Some(reason) = blocked_host(&url) {
        return Err(refuse(reason));
    }

    if let Some(Host::Domain(domain)) = url.host() {
        let port = url.port_or_known_default().unwrap_or(80);
        let addrs = tokio::net::lookup_host((domain, port)).await.map_err(|e| {
            error::network_failed(format!("failed to resolve {}", domain))
                .with_operation("fetch_doc::call")
                .set_source(e)
        })?;
        for addr in addrs {
            if is_private_ip(addr.ip()) {
                return Err(refuse(format!("{} resolves to {}", domain, addr.ip())));
            }
        }
    }

    Ok(url)
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!(
            "{}\n\n[truncated at {} characters]",
            &text[..cut],
            max_chars
        ),
        None => text,
    }
}

#[async_trait]
impl Tool for FetchDocTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "fetch_doc",
            "Fetch a documentation page (HTTP/HTTPS) and return its readable text.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Page URL (http or https)" },
                "max_chars": {
                    "type": "integer",
                    "description": "Maximum characters to return (default 20000)"
                }
            },
            "required": ["url"]
        }))
    }

    async fn call(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let args: FetchDocArgs = serde_json::from_value(args).map_err(|e| {
            Error::invalid_argument(format!("invalid fetch_doc arguments: {}", e)).with_operation("fetch_doc::call")
        })?;

        let url = public_url(&args.url).await?;
        let (content_type, body) = self.fetch(&url).await?;
        let text = if content_type.contains("html") || body.trim_start().starts_with('<') {
            self.html_to_text(&body)
        } else {
            body
        };

        tracing::debug!(url = %args.url, chars = text.len(), "fetched documentation");
        Ok(truncate_chars(text, args.max_chars.unwrap_or(FETCH_DEFAULT_MAX_CHARS)))
    }
}
