//! Process-wide API settings, read once when the client is built.

use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;
use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};

use crate::http::REQUEST_TIMEOUT;

/// Version stamped by the build script.
pub const CLIENT_VERSION: &str = env!("LIQAPI_VERSION");

pub const CLIENT_VERSION_HEADER: &str = "x-client-version";

/// Path of the code exchange endpoint, relative to the base URL.
pub const DEFAULT_AUTH_PATH: &str = "/oauth/token";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    pub auth_url: Url,
    pub timeout: Duration,
    /// Attached to every outgoing request.
    pub additional_headers: HeaderMap,
}

impl ApiConfig {
    /// Builds a configuration for `base_url` with default headers and the
    /// exchange endpoint at [`DEFAULT_AUTH_PATH`].
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid base URL: {}", base_url))?;

        // Relative paths resolve under the base path, not beside it.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let auth_url = base_url
            .join(DEFAULT_AUTH_PATH)
            .context("Failed to derive auth URL")?;

        let mut additional_headers = HeaderMap::new();
        additional_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("liqapi/{}", CLIENT_VERSION))?,
        );
        additional_headers.insert(
            HeaderName::from_static(CLIENT_VERSION_HEADER),
            HeaderValue::from_str(CLIENT_VERSION)?,
        );

        Ok(Self {
            base_url,
            auth_url,
            timeout: REQUEST_TIMEOUT,
            additional_headers,
        })
    }

    pub fn with_auth_url(mut self, auth_url: &str) -> Result<Self> {
        self.auth_url = self
            .base_url
            .join(auth_url)
            .with_context(|| format!("Invalid auth URL: {}", auth_url))?;
        Ok(self)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .with_context(|| format!("Invalid header name: {}", name))?;
        let value = HeaderValue::from_str(value.trim())
            .with_context(|| format!("Invalid value for header {}", name))?;
        debug!("Adding header {} to every request", name);
        self.additional_headers.insert(name, value);
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolves `path` against the base URL. Absolute URLs pass through.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Invalid request path: {}", path))
    }
}

/// Parses a `Name: value` header argument.
pub fn parse_header(arg: &str) -> Result<(String, String)> {
    let (name, value) = arg
        .split_once(':')
        .with_context(|| format!("Invalid header '{}'. Expected 'Name: value'.", arg))?;
    if name.trim().is_empty() {
        anyhow::bail!("Invalid header '{}'. Header name is empty.", arg);
    }
    Ok((name.trim().to_string(), value.trim().to_string()))
}
