// src/transport/http.rs

//! HTTP client utilities.

use async_trait::async_trait;
use reqwest::multipart::Form;

use super::{Body, Request, Response, Transport};
use crate::error::{AppError, Result};
use crate::models::CatalogConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &CatalogConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(config.timeout())
        .build()?;
    Ok(client)
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let Request {
            method,
            url,
            headers,
            body,
            context,
        } = request;

        let mut builder = self.client.request(method, &url);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(&value),
            Body::Multipart(fields) => {
                let form = fields
                    .into_iter()
                    .fold(Form::new(), |form, (name, value)| form.text(name, value));
                builder.multipart(form)
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|e| AppError::transport(&context, format!("error making request: {e}")))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::transport(&context, format!("error reading body: {e}")))?;

        if !status.is_success() {
            return Err(AppError::transport(
                &context,
                format!("unexpected status code: {}", status.as_u16()),
            ));
        }

        log::debug!("{} -> {} ({} bytes)", context, status.as_u16(), bytes.len());

        Ok(Response {
            status: status.as_u16(),
            body: bytes.to_vec(),
        })
    }
}
