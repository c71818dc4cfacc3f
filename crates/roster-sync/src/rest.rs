use std::time::Duration;

use anyhow::{Context, Result, bail};
use futures_util::future::BoxFuture;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::debug;

use crate::remote::{RemoteStore, Updates, path_segments};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Realtime-database style REST remote.
///
/// `GET {base}/{path}.json` reads a node (`null` when absent) and
/// `PATCH {base}/.json` applies a multi-path update atomically.
pub struct RestRemote {
    client: reqwest::Client,
    base_url: String,
    auth: Option<String>,
}

impl RestRemote {
    pub fn new(base_url: &str, auth: Option<String>) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            bail!("Remote URL must be http(s): {}", base_url);
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            auth: auth.filter(|a| !a.is_empty()),
        })
    }

    /// URL of the node at `path`; an empty path addresses the root.
    fn node_url(&self, path: &str) -> Result<String> {
        let mut url = if path.trim_matches('/').is_empty() {
            format!("{}/.json", self.base_url)
        } else {
            format!("{}/{}.json", self.base_url, path_segments(path)?.join("/"))
        };

        if let Some(auth) = &self.auth {
            url.push_str("?auth=");
            url.push_str(auth);
        }

        Ok(url)
    }
}

impl RemoteStore for RestRemote {
    fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Option<Value>>> {
        Box::pin(async move {
            let url = self.node_url(path)?;
            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .with_context(|| format!("Remote GET {} failed", path))?;

            let status = resp.status();
            if !status.is_success() {
                bail!("Remote GET {} returned {}", path, status);
            }

            let body = resp.bytes().await?;
            let value: Value = serde_json::from_slice(&body)
                .with_context(|| format!("Remote GET {} returned invalid JSON", path))?;

            debug!("Remote GET {} -> {}", path, if value.is_null() { "absent" } else { "present" });
            Ok(if value.is_null() { None } else { Some(value) })
        })
    }

    fn update(&self, updates: Updates) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            for path in updates.keys() {
                path_segments(path)?;
            }

            let url = self.node_url("")?;
            let body = serde_json::to_vec(&updates)?;
            let resp = self
                .client
                .patch(&url)
                .header(CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await
                .context("Remote multi-path update failed")?;

            let status = resp.status();
            if !status.is_success() {
                bail!("Remote multi-path update returned {}", status);
            }

            debug!("Remote update wrote {} paths", updates.len());
            Ok(())
        })
    }
}
