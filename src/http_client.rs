use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

static CLIENT: OnceCell<Client> = OnceCell::new();

pub fn http_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build http client")
    })
}

/// GET a URL and return the body as text. Non-2xx statuses are errors.
pub fn get_text(client: &Client, url: &str) -> Result<String> {
    let resp = client
        .get(url)
        .header(USER_AGENT, BROWSER_USER_AGENT)
        .send()
        .with_context(|| format!("request failed: {url}"))?;
    let status = resp.status();
    let body = resp.text().context("failed reading body")?;
    if !status.is_success() {
        return Err(anyhow::anyhow!("http {status}: {url}"));
    }
    Ok(body)
}

/// GET a URL and return the raw body bytes. Non-2xx statuses are errors.
pub fn get_bytes(client: &Client, url: &str) -> Result<Vec<u8>> {
    let resp = client
        .get(url)
        .header(USER_AGENT, BROWSER_USER_AGENT)
        .send()
        .with_context(|| format!("request failed: {url}"))?;
    let status = resp.status();
    let body = resp.bytes().context("failed reading body")?;
    if !status.is_success() {
        return Err(anyhow::anyhow!("http {status}: {url}"));
    }
    Ok(body.to_vec())
}
