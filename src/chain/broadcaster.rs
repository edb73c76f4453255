//! Transaction broadcaster.
//!
//! Builds the amino `StdTx` for an intent, signs its canonical sign doc with
//! the process wallet and posts it to the LCD. In dry-run mode nothing is
//! signed or sent; the intent is logged and a synthetic receipt returned.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::lcd::LcdClient;
use super::msgs;
use super::wallet::Wallet;
use super::{ActionExecutor, ChainStateReader};
use crate::config::TxConfig;
use crate::types::{ActionIntent, TxReceipt};

const PUBKEY_TYPE: &str = "tendermint/PubKeySecp256k1";

pub struct TxBroadcaster {
    lcd: LcdClient,
    wallet: Arc<Wallet>,
    chain_id: String,
    tx: TxConfig,
    dry_run: bool,
}

impl TxBroadcaster {
    pub fn new(
        lcd: LcdClient,
        wallet: Arc<Wallet>,
        chain_id: String,
        tx: TxConfig,
        dry_run: bool,
    ) -> Self {
        Self {
            lcd,
            wallet,
            chain_id,
            tx,
            dry_run,
        }
    }

    fn fee(&self) -> Value {
        let amount = if self.tx.fee_amount == 0 {
            Vec::new()
        } else {
            vec![json!({ "denom": self.tx.fee_denom, "amount": self.tx.fee_amount.to_string() })]
        };
        json!({ "amount": amount, "gas": self.tx.gas.to_string() })
    }

    /// The canonical bytes the wallet signs: sorted-key compact JSON of the
    /// sign doc, escaped as the node's Go encoder does.
    pub fn sign_bytes(&self, msg: &Value, account_number: u64, sequence: u64) -> Result<Vec<u8>> {
        let doc = json!({
            "account_number": account_number.to_string(),
            "chain_id": self.chain_id,
            "fee": self.fee(),
            "memo": self.tx.memo,
            "msgs": [msg],
            "sequence": sequence.to_string(),
        });
        canonical_json(&doc)
    }

    /// The `/txs` request body for `msg`, signed at the given account state.
    pub fn signed_tx(&self, msg: Value, account_number: u64, sequence: u64) -> Result<Value> {
        let sign_bytes = self.sign_bytes(&msg, account_number, sequence)?;
        let signature = self.wallet.sign_base64(&sign_bytes);

        Ok(json!({
            "tx": {
                "msg": [msg],
                "fee": self.fee(),
                "signatures": [{
                    "pub_key": { "type": PUBKEY_TYPE, "value": self.wallet.public_key_base64() },
                    "signature": signature,
                }],
                "memo": self.tx.memo,
            },
            "mode": self.tx.broadcast_mode,
        }))
    }

    fn dry_run_receipt(intent: &ActionIntent) -> TxReceipt {
        TxReceipt {
            tx_hash: format!("dry-run-{}", uuid::Uuid::new_v4()),
            kind: intent.kind,
            dry_run: true,
            submitted_at: Utc::now(),
        }
    }
}

#[async_trait]
impl ActionExecutor for TxBroadcaster {
    async fn execute(&self, intent: &ActionIntent) -> Result<TxReceipt> {
        let address = self.wallet.address();
        let msg = msgs::build_msg(address, intent)?;

        if self.dry_run {
            info!(intent = %intent, "[DRY RUN] Would broadcast tx");
            return Ok(Self::dry_run_receipt(intent));
        }

        // Account number and sequence must be current at signing time.
        let account = self
            .lcd
            .balance(address)
            .await
            .context("Failed to read account for signing")?
            .with_context(|| format!("account {address} not found"))?;

        let payload = self.signed_tx(msg, account.account_number, account.sequence)?;
        let resp = self.lcd.broadcast(&payload).await?;

        info!(
            tx_hash = %resp.txhash,
            kind = %intent.kind,
            sequence = account.sequence,
            "Tx broadcast"
        );

        Ok(TxReceipt {
            tx_hash: resp.txhash,
            kind: intent.kind,
            dry_run: false,
            submitted_at: Utc::now(),
        })
    }

    fn name(&self) -> &str {
        if self.dry_run {
            "dry-run"
        } else {
            "lcd"
        }
    }
}

/// Compact JSON for signing. serde_json's `Map` is key-ordered (no
/// `preserve_order`), so only the HTML-sensitive characters Go's
/// `json.Marshal` escapes need rewriting. They can only occur inside strings.
fn canonical_json(value: &Value) -> Result<Vec<u8>> {
    let text = serde_json::to_string(value).context("Failed to serialise sign doc")?;
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(c),
        }
    }
    Ok(out.into_bytes())
}
