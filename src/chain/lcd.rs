//! Kava legacy LCD client.
//!
//! Plain REST over HTTP. Reads may be pinned to a block height with the
//! `?height=` query parameter; the broadcaster posts signed transactions to
//! `/txs` through the same client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::parser::{self, BroadcastResponse};
use super::ChainStateReader;
use crate::types::{AccountBalance, ParamsSnapshot, Position, PriceQuote};

const USER_AGENT: &str = "cdp-spammer/0.1.0";

/// A raw LCD reply: status plus body, before any interpretation.
struct LcdReply {
    status: StatusCode,
    body: Vec<u8>,
}

impl LcdReply {
    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// LCD REST client. Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct LcdClient {
    http: Client,
    base_url: String,
}

impl LcdClient {
    /// Create a client for `base_url` where every request carries `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client for LCD")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str, height: Option<u64>) -> String {
        match height {
            Some(h) if h > 0 => format!("{}{path}?height={h}", self.base_url),
            _ => format!("{}{path}", self.base_url),
        }
    }

    async fn get(&self, path: &str, height: Option<u64>) -> Result<LcdReply> {
        let url = self.url(path, height);
        debug!(url = %url, "LCD query");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("LCD request failed: {path}"))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .with_context(|| format!("Failed to read LCD response body: {path}"))?
            .to_vec();

        Ok(LcdReply { status, body })
    }

    /// GET that treats any non-2xx status as an error.
    async fn get_ok(&self, path: &str, height: Option<u64>) -> Result<Vec<u8>> {
        let reply = self.get(path, height).await?;
        if !reply.status.is_success() {
            anyhow::bail!("LCD error {} on {path}: {}", reply.status, reply.body_text());
        }
        Ok(reply.body)
    }

    /// Post a signed transaction to `/txs`.
    pub async fn broadcast(&self, payload: &Value) -> Result<BroadcastResponse> {
        let url = format!("{}/txs", self.base_url);
        debug!(url = %url, "Broadcasting tx");

        let resp = self
            .http
            .post(&url)
            .json(payload)
            .send()
            .await
            .context("LCD broadcast request failed")?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .context("Failed to read broadcast response body")?;

        if !status.is_success() {
            anyhow::bail!(
                "LCD broadcast error {status}: {}",
                String::from_utf8_lossy(&body)
            );
        }

        parser::parse_broadcast(&body)
    }
}

#[async_trait]
impl ChainStateReader for LcdClient {
    async fn module_params(&self, collateral_denom: &str) -> Result<ParamsSnapshot> {
        let body = self.get_ok("/cdp/parameters", None).await?;
        parser::parse_module_params(&body, collateral_denom)
    }

    async fn balance(&self, address: &str) -> Result<Option<AccountBalance>> {
        let path = format!("/auth/accounts/{}", urlencoding::encode(address));
        let body = self.get_ok(&path, None).await?;
        parser::parse_account(&body)
    }

    async fn position(
        &self,
        owner: &str,
        collateral_denom: &str,
        height: u64,
    ) -> Result<Option<Position>> {
        let path = format!(
            "/cdp/cdps/cdp/{}/{}",
            urlencoding::encode(owner),
            urlencoding::encode(collateral_denom),
        );
        let reply = self.get(&path, Some(height)).await?;

        let position = parser::classify_position_reply(reply.status, &reply.body)
            .with_context(|| format!("CDP lookup failed on {path}"))?;
        if position.is_none() {
            debug!(owner, denom = collateral_denom, height, "No CDP found");
        }
        Ok(position)
    }

    async fn price(&self, market_id: &str, height: u64) -> Result<PriceQuote> {
        let path = format!("/pricefeed/price/{}", urlencoding::encode(market_id));
        let body = self.get_ok(&path, Some(height)).await?;
        parser::parse_price(&body)
    }
}
