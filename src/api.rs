//! HTTP access to the Dora analysis endpoints.
//!
//! All calls are plain GETs returning JSON or gzip-compressed CSV. The
//! transport is deliberately thin: everything downstream depends only on
//! the shape of the parsed payloads.

use std::{collections::BTreeMap, env, io::Read};

use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use serde_json::Value;
use tracing::warn;

use crate::{catalog::Catalog, metadata::ExperimentMetadata};

/// Default analysis endpoint root. Override with `$DORA_API`.
pub const DEFAULT_API: &str = "https://dora.gfdl.noaa.gov/cgi-bin/analysis/";

/// Client for the Dora REST endpoints.
pub struct DoraClient {
    base_url: String,
    client: reqwest::Client,
    insecure_fallback: bool,
}

impl Default for DoraClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DoraClient {
    pub fn new() -> Self {
        let base_url = env::var("DORA_API").unwrap_or_else(|_| DEFAULT_API.to_string());
        Self::with_base_url(&base_url)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        DoraClient {
            base_url,
            client: reqwest::Client::new(),
            insecure_fallback: false,
        }
    }

    /// Permits one retry with TLS certificate verification disabled when a
    /// request fails. Off by default; every degraded request is logged.
    pub fn insecure_fallback(mut self, enabled: bool) -> Self {
        self.insecure_fallback = enabled;
        self
    }

    /// Routes this client's requests through an HTTPS proxy. Rebuilds the
    /// inner client, so it applies to an already-constructed `DoraClient`.
    pub fn with_proxy(mut self, url: &str) -> Result<Self> {
        let proxy = reqwest::Proxy::https(url)
            .with_context(|| format!("Invalid proxy url: {}", url))?;
        self.client = reqwest::Client::builder().proxy(proxy).build()?;

        Ok(self)
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let first_attempt = match self.client.get(url).send().await {
            Ok(response) => {
                let response = response.error_for_status()?;
                return Ok(response.bytes().await?.to_vec());
            }
            Err(e) => e,
        };

        if !self.insecure_fallback {
            return Err(anyhow!(first_attempt)).with_context(|| format!("GET {} failed", url));
        }

        warn!(url, "request failed; retrying once without TLS verification");

        let insecure = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;
        let response = insecure
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {} failed after insecure retry", url))?
            .error_for_status()?;

        Ok(response.bytes().await?.to_vec())
    }

    /// Fetches metadata for one experiment, keyed by integer or
    /// project-scoped string id.
    pub async fn metadata(&self, id: &str) -> Result<ExperimentMetadata> {
        let url = format!("{}meta.py?id={}", self.base_url, id);
        let bytes = self.get_bytes(&url).await?;

        let metadata: ExperimentMetadata = serde_json::from_slice(&bytes)
            .with_context(|| format!("Invalid metadata payload for experiment {}", id))?;

        Ok(metadata.finalise())
    }

    /// Full-text search over registered experiments. Returns the requested
    /// attribute (post-processing path by default) keyed by experiment id.
    /// No match yields an empty map.
    pub async fn search(&self, query: &str, attribute: &str) -> Result<BTreeMap<i64, String>> {
        let url = format!("{}search.py?search={}", self.base_url, query);
        let bytes = self.get_bytes(&url).await?;

        let payload: BTreeMap<String, Value> =
            serde_json::from_slice(&bytes).context("Invalid search payload")?;

        let mut results = BTreeMap::new();
        for (id, entry) in payload {
            let id: i64 = id
                .parse()
                .with_context(|| format!("Non-numeric experiment id in search: {}", id))?;
            let value = entry
                .get(attribute)
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("Search result {} has no attribute {}", id, attribute))?;
            results.insert(id, value.to_string());
        }

        Ok(results)
    }

    /// Lists the projects known to the server.
    pub async fn list_projects(&self) -> Result<BTreeMap<String, Value>> {
        let url = format!("{}projects.py", self.base_url);
        let bytes = self.get_bytes(&url).await?;

        let projects = serde_json::from_slice(&bytes).context("Invalid project listing")?;

        Ok(projects)
    }

    /// Fetches the experiment's file catalog (gzip-compressed CSV).
    pub async fn fetch_catalog(&self, id: &str) -> Result<Catalog> {
        let url = format!("{}catalog.py?id={}", self.base_url, id);
        let bytes = self.get_bytes(&url).await?;
        let csv = decompress_if_gzip(&bytes)?;

        Catalog::from_csv(csv.as_slice())
            .with_context(|| format!("Invalid catalog for experiment {}", id))
    }

    /// Fetches global-mean time series as CSV text. The `c4mip` component
    /// routes to its own endpoint and is whitespace-delimited.
    pub async fn global_mean(
        &self,
        id: &str,
        component: &str,
        start: Option<f64>,
        end: Option<f64>,
        yearshift: Option<f64>,
    ) -> Result<String> {
        let url = if component == "c4mip" {
            format!("{}c4mip.py?id={}", self.base_url, id)
        } else {
            build_global_mean_query(&self.base_url, id, component, start, end, yearshift)
        };

        let bytes = self.get_bytes(&url).await?;
        let csv = decompress_if_gzip(&bytes)?;

        String::from_utf8(csv).context("Global mean response is not valid UTF-8")
    }
}

fn build_global_mean_query(
    base_url: &str,
    id: &str,
    component: &str,
    start: Option<f64>,
    end: Option<f64>,
    yearshift: Option<f64>,
) -> String {
    let mut params = vec![format!("id={}", id), format!("component={}", component)];
    if let Some(start) = start {
        params.push(format!("start={}", start));
    }
    if let Some(end) = end {
        params.push(format!("end={}", end));
    }
    if let Some(yearshift) = yearshift {
        params.push(format!("yearshift={}", yearshift));
    }

    format!("{}api.py?{}", base_url, params.join("&"))
}

/// The CSV endpoints are gzip-compressed; tolerate plain text for servers
/// that skip the encoding.
fn decompress_if_gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    if bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b {
        let mut decoder = GzDecoder::new(bytes);
        let mut decompressed = vec![];
        decoder
            .read_to_end(&mut decompressed)
            .context("Failed to decompress gzip response")?;
        return Ok(decompressed);
    }

    Ok(bytes.to_vec())
}

/// Sets `HTTPS_PROXY` process-wide. Explicit, caller-controlled toggle;
/// only clients built after the call pick it up. Use
/// [`DoraClient::with_proxy`] to reroute an existing client.
pub fn set_proxy(url: &str) {
    env::set_var("HTTPS_PROXY", url);
}

/// Clears the process-wide proxy toggle. Clients built while it was set
/// keep their proxy.
pub fn unset_proxy() {
    env::remove_var("HTTPS_PROXY");
}

// -- Tests -------------------------------------------------------------------
