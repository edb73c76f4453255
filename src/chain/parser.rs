//! LCD response parsing.
//!
//! The legacy LCD wraps every query result in `{ "height": "...", "result": ... }`
//! and encodes integers and decimals as strings. These types deserialize only
//! the fields the spammer needs and convert them into `crate::types`.

use anyhow::{anyhow, Context, Result};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::types::{AccountBalance, ModuleParams, ParamsSnapshot, Position, PriceQuote};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// `{ "height": "123", "result": ... }`. `result` is kept raw so each caller
/// can decide whether its absence is an error.
#[derive(Debug, Deserialize)]
pub struct LcdEnvelope {
    #[serde(default)]
    pub height: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
}

impl LcdEnvelope {
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).context("LCD response is not a JSON envelope")
    }

    pub fn height(&self) -> Result<u64> {
        match &self.height {
            Some(h) => parse_u64(h).context("invalid envelope height"),
            None => Ok(0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawCoin {
    denom: String,
    amount: String,
}

fn parse_u64(s: &str) -> Result<u64> {
    s.trim()
        .parse::<u64>()
        .with_context(|| format!("not an unsigned integer: {s:?}"))
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s.trim()).with_context(|| format!("not a decimal: {s:?}"))
}

fn parse_coin_amount(coin: &RawCoin) -> Result<u64> {
    parse_u64(&coin.amount).with_context(|| format!("bad amount for {}", coin.denom))
}

// ---------------------------------------------------------------------------
// Module params
// ---------------------------------------------------------------------------

/// Older chains report the debt limit as a coin list, newer ones as one coin.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDebtLimit {
    Single(RawCoin),
    Many(Vec<RawCoin>),
}

#[derive(Debug, Deserialize)]
struct RawCollateralParam {
    denom: String,
    #[serde(alias = "spot_market_id")]
    market_id: String,
    debt_limit: RawDebtLimit,
    conversion_factor: String,
    #[serde(default)]
    liquidation_ratio: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawModuleParams {
    #[serde(default)]
    collateral_params: Option<Vec<RawCollateralParam>>,
}

/// Parse a `/cdp/parameters` response and pick out the params for
/// `collateral_denom`. `params` is `None` when the response carries no
/// collateral params at all or none for that denom.
pub fn parse_module_params(body: &[u8], collateral_denom: &str) -> Result<ParamsSnapshot> {
    let envelope = LcdEnvelope::from_slice(body)?;
    let height = envelope.height()?;
    let Some(result) = envelope.result else {
        return Ok(ParamsSnapshot { height, params: None });
    };

    let raw: RawModuleParams =
        serde_json::from_value(result).context("malformed cdp parameters result")?;

    let Some(raw_param) = raw
        .collateral_params
        .unwrap_or_default()
        .into_iter()
        .find(|p| p.denom == collateral_denom)
    else {
        return Ok(ParamsSnapshot { height, params: None });
    };

    let debt_limit = match raw_param.debt_limit {
        RawDebtLimit::Single(coin) => coin,
        RawDebtLimit::Many(coins) => coins
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("empty debt_limit for {collateral_denom}"))?,
    };

    let params = ModuleParams {
        collateral_denom: raw_param.denom,
        market_id: raw_param.market_id,
        debt_limit: parse_coin_amount(&debt_limit)?,
        principal_denom: debt_limit.denom,
        conversion_factor: raw_param
            .conversion_factor
            .trim()
            .parse::<u32>()
            .context("invalid conversion_factor")?,
        liquidation_ratio: raw_param
            .liquidation_ratio
            .as_deref()
            .map(parse_decimal)
            .transpose()?,
    };

    Ok(ParamsSnapshot {
        height,
        params: Some(params),
    })
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawAccount {
    #[serde(default)]
    address: String,
    #[serde(default)]
    coins: Vec<RawCoin>,
    #[serde(default)]
    account_number: Option<String>,
    #[serde(default)]
    sequence: Option<String>,
}

/// Parse an `/auth/accounts/{address}` response.
///
/// Accepts both the typed form (`result.value.coins`) and a bare
/// `result.coins`. Returns `None` when there is no result, or when the LCD
/// answers with an empty placeholder account.
pub fn parse_account(body: &[u8]) -> Result<Option<AccountBalance>> {
    let envelope = LcdEnvelope::from_slice(body)?;
    let Some(mut result) = envelope.result else {
        return Ok(None);
    };
    if result.is_null() {
        return Ok(None);
    }
    let inner = result.get_mut("value").map(Value::take);
    if let Some(value) = inner {
        result = value;
    }

    let raw: RawAccount = serde_json::from_value(result).context("malformed account result")?;
    if raw.address.is_empty() && raw.coins.is_empty() {
        return Ok(None);
    }

    let mut coins = BTreeMap::new();
    for coin in &raw.coins {
        coins.insert(coin.denom.clone(), parse_coin_amount(coin)?);
    }

    let account_number = raw.account_number.as_deref().map(parse_u64).transpose()?;
    let sequence = raw.sequence.as_deref().map(parse_u64).transpose()?;

    Ok(Some(AccountBalance {
        address: raw.address,
        coins,
        account_number: account_number.unwrap_or(0),
        sequence: sequence.unwrap_or(0),
    }))
}

// ---------------------------------------------------------------------------
// CDP
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawCdp {
    id: String,
    owner: String,
    collateral: RawCoin,
    principal: RawCoin,
}

#[derive(Debug, Deserialize)]
struct RawAugmentedCdp {
    cdp: Option<RawCdp>,
    #[serde(default)]
    collateral_value: Option<RawCoin>,
    collateralization_ratio: Option<String>,
}

/// Parse a successful `/cdp/cdps/cdp/{owner}/{denom}` response.
///
/// Every field is required here: a 200 response without a CDP in it is a
/// malformed payload, not an absent position. Absence is signalled by the
/// LCD error path (see `is_not_found`).
pub fn parse_position(body: &[u8]) -> Result<Position> {
    let envelope = LcdEnvelope::from_slice(body)?;
    let result = envelope
        .result
        .ok_or_else(|| anyhow!("cdp response has no result"))?;
    let raw: RawAugmentedCdp =
        serde_json::from_value(result).context("malformed cdp result")?;
    let cdp = raw.cdp.ok_or_else(|| anyhow!("cdp response has no cdp"))?;
    let ratio = raw
        .collateralization_ratio
        .ok_or_else(|| anyhow!("cdp response has no collateralization_ratio"))?;

    Ok(Position {
        id: parse_u64(&cdp.id).context("invalid cdp id")?,
        owner: cdp.owner,
        collateral_amount: parse_coin_amount(&cdp.collateral)?,
        collateral_denom: cdp.collateral.denom,
        principal_amount: parse_coin_amount(&cdp.principal)?,
        principal_denom: cdp.principal.denom,
        collateral_value: raw
            .collateral_value
            .as_ref()
            .map(parse_coin_amount)
            .transpose()?
            .unwrap_or(0),
        collateralization_ratio: parse_decimal(&ratio)?,
    })
}

/// Whether an LCD error body reports a missing record.
///
/// The LCD nests the SDK error as a JSON string under `error`, e.g.
/// `{"error":"{\"codespace\":\"cdp\",\"code\":3,\"message\":\"cdp not found ...\"}"}`,
/// so a case-insensitive search of the raw body is enough.
pub fn is_not_found(body: &str) -> bool {
    body.to_lowercase().contains("not found")
}

/// Interpret a CDP lookup reply.
///
/// A 2xx body must parse as a full position. A 404, or any error reply whose
/// body reports "not found", means the owner has no CDP. Everything else is
/// an error.
pub fn classify_position_reply(status: StatusCode, body: &[u8]) -> Result<Option<Position>> {
    if status.is_success() {
        return parse_position(body).map(Some);
    }

    let text = String::from_utf8_lossy(body);
    if status == StatusCode::NOT_FOUND || is_not_found(&text) {
        return Ok(None);
    }

    Err(anyhow!("LCD error {status}: {text}"))
}

// ---------------------------------------------------------------------------
// Price
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawPrice {
    market_id: String,
    price: String,
}

/// Parse a `/pricefeed/price/{market_id}` response.
pub fn parse_price(body: &[u8]) -> Result<PriceQuote> {
    let envelope = LcdEnvelope::from_slice(body)?;
    let height = envelope.height()?;
    let result = envelope
        .result
        .ok_or_else(|| anyhow!("price response has no result"))?;
    let raw: RawPrice = serde_json::from_value(result).context("malformed price result")?;
    let price = parse_decimal(&raw.price)?;
    if price.is_sign_negative() {
        anyhow::bail!("negative price {price} for {}", raw.market_id);
    }
    Ok(PriceQuote {
        market_id: raw.market_id,
        price,
        height,
    })
}

// ---------------------------------------------------------------------------
// Broadcast
// ---------------------------------------------------------------------------

/// `POST /txs` response. A non-zero `code` means the node rejected the tx.
#[derive(Debug, Deserialize)]
pub struct BroadcastResponse {
    #[serde(default)]
    pub txhash: String,
    #[serde(default)]
    pub code: Option<u32>,
    #[serde(default)]
    pub raw_log: Option<String>,
}

pub fn parse_broadcast(body: &[u8]) -> Result<BroadcastResponse> {
    let resp: BroadcastResponse =
        serde_json::from_slice(body).context("malformed broadcast response")?;
    if let Some(code) = resp.code.filter(|c| *c != 0) {
        anyhow::bail!(
            "tx {} rejected with code {code}: {}",
            resp.txhash,
            resp.raw_log.as_deref().unwrap_or("")
        );
    }
    if resp.txhash.is_empty() {
        anyhow::bail!("broadcast response has no txhash");
    }
    Ok(resp)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
