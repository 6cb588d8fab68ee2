//! REST adapter (`HttpPort` over reqwest).

use std::time::Duration;

use async_trait::async_trait;
use kettu_core::{
    config::Config,
    errors::Error,
    ports::{HttpPort, HttpRequest, Method},
    Result,
};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde_json::Value;

const UA: &str = concat!("kettu (", env!("CARGO_PKG_VERSION"), ")");

#[derive(Clone, Debug)]
pub struct RestClient {
    base: String,
    token: String,
    http: reqwest::Client,
}

impl RestClient {
    pub fn new(
        base: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("http client build error: {e}")))?;
        Ok(Self {
            base: base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(&cfg.api_base, &cfg.token, cfg.http_timeout)
    }
}

#[async_trait]
impl HttpPort for RestClient {
    async fn request(&self, req: HttpRequest) -> Result<Value> {
        let url = format!("{}{}", self.base, req.path);
        let method = req.method.to_string();

        let mut rb = self
            .http
            .request(reqwest_method(req.method), &url)
            .header(USER_AGENT, UA);
        if req.auth {
            rb = rb.header(AUTHORIZATION, format!("Bot {}", self.token));
        }
        if let Some(body) = &req.body {
            rb = rb.json(body);
        }

        tracing::debug!(%method, path = %req.path, "rest request");
        let resp = rb.send().await.map_err(|e| Error::Http {
            method: method.clone(),
            path: req.path.clone(),
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        })?;

        let status = resp.status();
        if status.is_success() {
            let is_json = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.starts_with("application/json"));
            if !is_json {
                return Ok(Value::Null);
            }
            let text = resp.text().await.map_err(|e| Error::Http {
                method,
                path: req.path,
                status: Some(status.as_u16()),
                message: format!("failed reading body: {e}"),
            })?;
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&text)?);
        }

        if status.is_client_error() {
            let body: Value = resp.json().await.unwrap_or(Value::Null);
            let err = api_error(method, req.path, status.as_u16(), &body);
            tracing::warn!(error = %err, "rest request rejected");
            return Err(err);
        }

        if status.is_server_error() {
            return Err(Error::Http {
                method,
                path: req.path,
                status: Some(status.as_u16()),
                message: status.canonical_reason().unwrap_or("server error").to_string(),
            });
        }

        Ok(Value::Null)
    }
}

fn reqwest_method(m: Method) -> reqwest::Method {
    match m {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// Build `Error::Api` from a 4xx body: the top-level `message` followed by
/// one `path.joined message` line per entry of `errors`.
fn api_error(method: String, path: String, status: u16, body: &Value) -> Error {
    let errors = body.get("errors").unwrap_or(body);
    let flattened = flatten_errors(errors).join("\n");
    let top = body.get("message").and_then(Value::as_str).unwrap_or_default();

    let message = match (top.is_empty(), flattened.is_empty()) {
        (false, false) => format!("{top}\n{flattened}"),
        (false, true) => top.to_string(),
        (true, _) => flattened,
    };

    Error::Api {
        method,
        path,
        status,
        code: body.get("code").and_then(Value::as_i64),
        message,
    }
}

fn flatten_errors(errors: &Value) -> Vec<String> {
    let Some(items) = errors.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .map(|err| {
            let path = err
                .get("path")
                .and_then(Value::as_array)
                .map(|segs| {
                    segs.iter()
                        .map(|s| match s {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(".")
                })
                .unwrap_or_default();
            let message = err.get("message").and_then(Value::as_str).unwrap_or_default();
            format!("{path} {message}")
        })
        .collect()
}
