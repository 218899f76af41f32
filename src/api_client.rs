//! Client for the proxy's `/api/*` routes.

use crate::error::{FetchError, FetchResult};
use crate::rpc::http_client;
use crate::types::{LatestBlocksResponse, MessageResponse, TransactionsResponse};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ApiClient {
    base_url: String,
    timeout: Duration,
}

async fn decode<T: serde::de::DeserializeOwned>(res: reqwest::Response) -> FetchResult<T> {
    let status = res.status();
    if status.is_success() {
        return Ok(res.json().await?);
    }
    let body = res.text().await.unwrap_or_default();
    log::debug!("[api] {status}: {body}");
    match status.as_u16() {
        400 => Err(FetchError::invalid(body)),
        404 => Err(FetchError::not_found(body)),
        s => Err(FetchError::Http(s)),
    }
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// `GET /api/latest_blocks`; `block` is the newest slot of the window.
    pub async fn latest_blocks(&self, block: Option<u64>, rpc_url: &str) -> FetchResult<LatestBlocksResponse> {
        let mut query: Vec<(&str, String)> = vec![("url", rpc_url.to_string())];
        if let Some(b) = block {
            query.push(("block", b.to_string()));
        }
        let res = http_client()
            .get(format!("{}/api/latest_blocks", self.base_url))
            .query(&query)
            .timeout(self.timeout)
            .send()
            .await?;
        decode(res).await
    }

    pub async fn latest_transactions(
        &self,
        page: usize,
        docs: usize,
        network: &str,
        rpc_url: &str,
    ) -> FetchResult<TransactionsResponse> {
        let res = http_client()
            .get(format!("{}/api/latest_transactions", self.base_url))
            .query(&[
                ("page", page.to_string()),
                ("docs", docs.to_string()),
                ("name", network.to_string()),
                ("url", rpc_url.to_string()),
            ])
            .timeout(self.timeout)
            .send()
            .await?;
        decode(res).await
    }

    /// `POST /api/latest_transactions`; the proxy answers 409 while another
    /// refresh holds the index lease.
    pub async fn refresh_transactions(&self, network: &str, rpc_url: &str) -> FetchResult<MessageResponse> {
        let res = http_client()
            .post(format!("{}/api/latest_transactions", self.base_url))
            .query(&[("name", network), ("url", rpc_url)])
            .timeout(self.timeout)
            .send()
            .await?;
        if res.status().as_u16() == 409 {
            return Ok(res.json().await?);
        }
        decode(res).await
    }
}
