//! HTTP client shared by every outbound call.
//!
//! One `reqwest::Client` per run, built with the configured user agent and a
//! uniform per-request timeout so no call site can hang indefinitely.

mod response;

pub use response::HttpResponse;

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::config::HttpSettings;

/// Default user agent. Nominatim and Overpass both ask for an identifying one.
pub const USER_AGENT: &str = concat!("geoenrich/", env!("CARGO_PKG_VERSION"));

/// Resolve the user agent from config: `None` or empty uses [`USER_AGENT`].
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config {
        Some(custom) if !custom.trim().is_empty() => custom.to_string(),
        _ => USER_AGENT.to_string(),
    }
}

/// Cheap-to-clone HTTP client with a fixed timeout.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(user_agent: Option<&str>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(resolve_user_agent(user_agent))
            .timeout(timeout)
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }

    /// Create a client from the `[http]` settings table.
    pub fn from_settings(settings: &HttpSettings) -> Result<Self, reqwest::Error> {
        Self::new(
            settings.user_agent.as_deref(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    /// GET a URL as-is.
    pub async fn get(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        debug!("GET {}", redact(url));
        let response = self.client.get(url).send().await?;
        Ok(HttpResponse::from_response(response))
    }

    /// GET a URL with serialized query parameters.
    pub async fn get_with_query<Q: Serialize + ?Sized>(
        &self,
        url: &str,
        query: &Q,
    ) -> Result<HttpResponse, reqwest::Error> {
        debug!("GET {} (with query)", url);
        let response = self.client.get(url).query(query).send().await?;
        Ok(HttpResponse::from_response(response))
    }

    /// POST a JSON body, optionally with a bearer token.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &B,
    ) -> Result<HttpResponse, reqwest::Error> {
        debug!("POST {}", url);
        let mut request = self.client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        Ok(HttpResponse::from_response(response))
    }
}

/// Strip credential-bearing query parameters before a URL reaches the logs.
pub fn redact(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(k, v)| {
                    let value = if matches!(k.as_ref(), "key" | "access_token" | "api_key") {
                        "***".to_string()
                    } else {
                        v.into_owned()
                    };
                    (k.into_owned(), value)
                })
                .collect();
            if pairs.is_empty() {
                return parsed.to_string();
            }
            parsed.query_pairs_mut().clear().extend_pairs(pairs);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_user_agent_default() {
        assert_eq!(resolve_user_agent(None), USER_AGENT);
        assert_eq!(resolve_user_agent(Some("  ")), USER_AGENT);
    }

    #[test]
    fn test_resolve_user_agent_custom() {
        assert_eq!(resolve_user_agent(Some("MyBot/1.0")), "MyBot/1.0");
    }

    #[test]
    fn test_redact_hides_keys() {
        let url = "https://api.example.com/static/1,2,3/10x10?access_token=secret&style=x";
        let redacted = redact(url);
        assert!(!redacted.contains("secret"));
        assert!(redacted.contains("style=x"));
    }

    #[test]
    fn test_redact_passes_through_plain_urls() {
        assert_eq!(redact("not a url"), "not a url");
        assert_eq!(
            redact("https://example.com/path"),
            "https://example.com/path"
        );
    }
}
