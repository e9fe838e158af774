//! Transport abstraction for upstream calls.
//!
//! Every upstream request goes through a [`Transport`] so that the fetchers
//! can be exercised against scripted responses. Implementations must report
//! non-2xx statuses as [`AppError::Transport`](crate::error::AppError).

mod http;
#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use reqwest::Method;

use crate::error::Result;

pub use http::{HttpTransport, create_async_client};

/// Request body variants used by the catalog endpoints.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(serde_json::Value),
    /// Text fields sent as `multipart/form-data`
    Multipart(Vec<(String, String)>),
}

/// A single upstream request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Body,
    /// Short description used in error messages
    pub context: String,
}

impl Request {
    pub fn post(url: impl Into<String>, body: Body) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: Vec::new(),
            body,
            context: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

/// A successful upstream response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Capability to perform one upstream request.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request, returning the body of a 2xx response.
    async fn send(&self, request: Request) -> Result<Response>;
}
