//! Authenticated HTTP client for the storefront chat REST API
//!
//! Wraps reqwest::Client with bearer token injection and status checking.

use anyhow::{bail, Context, Result};

use crate::config::Config;

/// Client for the chat REST endpoints under `api_base`.
#[derive(Clone)]
pub struct ChatApi {
    http: reqwest::Client,
    base: String,
    token: Option<String>,
}

impl ChatApi {
    pub fn new(base: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Build from config, using the stored bearer token if still valid.
    pub fn from_config(config: &Config) -> Self {
        let token = config.bearer_token();
        if token.is_none() && config.access_token.is_some() {
            tracing::warn!("Stored access token expired. Run 'storefront-chat login' to refresh.");
        }
        Self::new(config.api_base.clone(), token)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token {
            Some(ref token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// GET `path` relative to the API base.
    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = self.url(path);
        tracing::debug!("GET {}", url);

        let resp = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        check_response(resp, &url).await
    }

    /// POST `path` with an empty body.
    pub async fn post(&self, path: &str) -> Result<reqwest::Response> {
        let url = self.url(path);
        tracing::debug!("POST {}", url);

        let resp = self
            .authorize(self.http.post(&url))
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;

        check_response(resp, &url).await
    }
}

/// Check HTTP response status code and return a clear error on failure.
async fn check_response(resp: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        bail!(
            "401 Unauthorized for {}. Token may be invalid -- run 'storefront-chat login'.",
            url
        );
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("HTTP {} for {}: {}", status.as_u16(), url, body);
    }
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_trailing_slash_trimmed() {
        let api = ChatApi::new("http://localhost:8080/api/", None);
        assert_eq!(
            api.url("/chat/users/1"),
            "http://localhost:8080/api/chat/users/1"
        );
    }
}
