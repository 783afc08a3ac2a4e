use serde::{Deserialize, Serialize};

use crate::config::defaults::{default_num_results, default_web_search_endpoint};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub web_search: WebSearchConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebSearchConfig {
    #[serde(default = "default_web_search_endpoint")]
    pub endpoint: String,
    /// Usually left out of files and taken from `EXA_API_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_num_results")]
    pub num_results: u32,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_web_search_endpoint(),
            api_key: None,
            num_results: default_num_results(),
        }
    }
}
