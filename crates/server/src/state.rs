use reqwest::Client;

pub struct AppState {
    pub client: Client,
    /// Upstream base URL without a trailing slash.
    pub upstream: String,
}

impl AppState {
    pub fn new(upstream: &str) -> Self {
        Self {
            client: Client::new(),
            upstream: upstream.trim_end_matches('/').to_string(),
        }
    }
}
