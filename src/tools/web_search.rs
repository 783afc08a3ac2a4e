use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{ToolError, ToolHandler};
use crate::config::WebSearchConfig;
use crate::error::Result;
use crate::sink::OutputSink;

pub const WEB_SEARCH: &str = "web_search";

pub const DESCRIPTION: &str = "Search the web for real-time information such as news, scores, \
prices or anything that changes over time. Do not use it for general knowledge, coding or \
writing tasks.";

const SNIPPET_CHARS: usize = 300;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "The search query."
            }
        },
        "required": ["query"]
    })
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    num_results: u32,
    contents: SearchContents,
}

#[derive(Serialize)]
struct SearchContents {
    text: bool,
    highlights: bool,
}

#[derive(Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub title: Option<String>,
    pub url: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub highlights: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

/// First highlight, else the first few hundred characters of page text.
pub fn snippet_for(result: &SearchResult) -> String {
    if let Some(first) = result.highlights.as_ref().and_then(|h| h.first()) {
        return first.clone();
    }
    result
        .text
        .as_deref()
        .unwrap_or_default()
        .chars()
        .take(SNIPPET_CHARS)
        .collect()
}

pub struct WebSearchTool {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    num_results: u32,
}

impl WebSearchTool {
    pub fn new(config: &WebSearchConfig) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            num_results: config.num_results,
        })
    }
}

#[async_trait]
impl ToolHandler for WebSearchTool {
    async fn call(&self, args: Value, sink: &dyn OutputSink) -> std::result::Result<String, ToolError> {
        let args: SearchArgs =
            serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        sink.write_progress_note(
            "Searching the web...",
            &format!("Looking for information on '{}'", args.query),
        );

        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ToolError::Failed("web search is not configured (EXA_API_KEY)".to_string()))?;

        debug!(query = %args.query, "web search");

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", api_key)
            .json(&SearchRequest {
                query: &args.query,
                num_results: self.num_results,
                contents: SearchContents {
                    text: true,
                    highlights: true,
                },
            })
            .send()
            .await
            .map_err(|e| ToolError::Failed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Failed(format!("search API status {}: {}", status, body)));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ToolError::Failed(format!("unreadable search response: {}", e)))?;

        let results: Vec<Value> = parsed
            .results
            .iter()
            .map(|r| {
                json!({
                    "title": r.title,
                    "url": r.url,
                    "snippet": snippet_for(r),
                })
            })
            .collect();

        Ok(Value::Array(results).to_string())
    }
}
