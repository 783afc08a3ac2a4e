pub const DEFAULT_API_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4";
pub const DEFAULT_WEB_SEARCH_ENDPOINT: &str = "https://api.exa.ai/search";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly personal finance assistant. \
You can look things up on the web, record transactions in the user's ledger, and build a \
playful spending recap. Use tools only when they are needed and answer concisely.";

pub fn default_stream_timeout() -> u64 {
    30
}

pub fn default_max_turns() -> usize {
    10
}

pub fn default_web_search_endpoint() -> String {
    DEFAULT_WEB_SEARCH_ENDPOINT.to_string()
}

pub fn default_num_results() -> u32 {
    3
}
