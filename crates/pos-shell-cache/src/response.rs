// File: pos-shell-cache/src/response.rs
// Purpose: Intercepted requests and cacheable responses

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How the request was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestMode {
    /// Top-level page navigation
    Navigate,
    /// Script, stylesheet, image, data call
    #[default]
    Resource,
}

/// Outgoing request seen by the cache manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub mode: RequestMode,
}

fn default_method() -> String {
    "GET".to_string()
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            mode: RequestMode::Resource,
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    /// A request with a body or side effects
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Only GET requests are answered from or written to the cache
    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

/// A response as stored in a cache generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn new(url: impl Into<String>, status: u16, status_text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status,
            status_text: status_text.into(),
            headers: BTreeMap::new(),
            body: Vec::new(),
            fetched_at: Utc::now(),
        }
    }

    /// `200 OK` with the given content type
    pub fn ok(url: impl Into<String>, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self::new(url, 200, "OK")
            .with_header("content-type", content_type)
            .with_body(body)
    }

    /// Synthetic reply for a resource that is neither cached nor reachable
    pub fn unavailable(url: impl Into<String>) -> Self {
        Self::new(url, 503, "Service Unavailable")
            .with_header("content-type", "text/plain")
            .with_body("Offline - content not available")
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_response() {
        let res = CachedResponse::unavailable("https://shop.example.com/logo.png");
        assert_eq!(res.status, 503);
        assert_eq!(res.status_text, "Service Unavailable");
        assert_eq!(res.content_type(), Some("text/plain"));
        assert_eq!(res.text(), "Offline - content not available");
        assert!(!res.is_success());
    }

    #[test]
    fn test_request_defaults_from_json() {
        let req: FetchRequest =
            serde_json::from_str(r#"{"url":"https://shop.example.com/"}"#).unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.mode, RequestMode::Resource);
        assert!(FetchRequest::navigate("https://shop.example.com/").is_navigation());
    }
}
