// src/fetch/mod.rs
use anyhow::{Context, Result};
use reqwest::Client;
use tracing::info;
use url::Url;
use uuid::Uuid;

/// Download the per-merchant CSV archive from the data-loader endpoint and
/// return its raw bytes. Any non-success status is a hard error here;
/// ingestion must not start without a good blob.
pub async fn download_archive(client: &Client, base_url: &str, merchant_id: Uuid) -> Result<Vec<u8>> {
    let url = Url::parse(base_url)
        .and_then(|base| base.join(&format!("loader/{merchant_id}")))
        .with_context(|| format!("invalid loader url `{base_url}`"))?;

    let resp = client
        .get(url.as_str())
        .send()
        .await?
        .error_for_status()
        .with_context(|| format!("loader endpoint refused {merchant_id}"))?;
    let bytes = resp.bytes().await?;

    info!(%merchant_id, bytes = bytes.len(), "downloaded archive");
    Ok(bytes.to_vec())
}
