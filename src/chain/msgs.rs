//! Amino JSON messages for the CDP module.
//!
//! One function per message kind; `build_msg` dispatches on an intent.
//! Amounts go on the wire as decimal strings.

use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use crate::types::{ActionIntent, ActionKind, Coin};

fn coin(c: &Coin) -> Value {
    json!({ "denom": c.denom, "amount": c.amount.to_string() })
}

pub fn msg_create_cdp(sender: &str, collateral: &Coin, principal: &Coin) -> Value {
    json!({
        "type": "cdp/MsgCreateCDP",
        "value": {
            "sender": sender,
            "collateral": coin(collateral),
            "principal": coin(principal),
        }
    })
}

pub fn msg_deposit(owner: &str, depositor: &str, collateral: &Coin) -> Value {
    json!({
        "type": "cdp/MsgDeposit",
        "value": {
            "owner": owner,
            "depositor": depositor,
            "collateral": coin(collateral),
        }
    })
}

pub fn msg_withdraw(owner: &str, depositor: &str, collateral: &Coin) -> Value {
    json!({
        "type": "cdp/MsgWithdraw",
        "value": {
            "owner": owner,
            "depositor": depositor,
            "collateral": coin(collateral),
        }
    })
}

pub fn msg_draw_debt(sender: &str, cdp_denom: &str, principal: &Coin) -> Value {
    json!({
        "type": "cdp/MsgDrawDebt",
        "value": {
            "sender": sender,
            "cdp_denom": cdp_denom,
            "principal": coin(principal),
        }
    })
}

pub fn msg_repay_debt(sender: &str, cdp_denom: &str, payment: &Coin) -> Value {
    json!({
        "type": "cdp/MsgRepayDebt",
        "value": {
            "sender": sender,
            "cdp_denom": cdp_denom,
            "payment": coin(payment),
        }
    })
}

/// Build the message for `intent`, signed by and acting on `address`.
///
/// Fails only if the intent lacks the amount its kind requires.
pub fn build_msg(address: &str, intent: &ActionIntent) -> Result<Value> {
    let missing = |what: &str| anyhow!("{} intent has no {what} amount", intent.kind);

    let msg = match intent.kind {
        ActionKind::CreatePosition => {
            let collateral = intent.collateral().ok_or_else(|| missing("collateral"))?;
            let principal = intent.principal().ok_or_else(|| missing("principal"))?;
            msg_create_cdp(address, &collateral, &principal)
        }
        ActionKind::Deposit => {
            let collateral = intent.collateral().ok_or_else(|| missing("collateral"))?;
            msg_deposit(address, address, &collateral)
        }
        ActionKind::Withdraw => {
            let collateral = intent.collateral().ok_or_else(|| missing("collateral"))?;
            msg_withdraw(address, address, &collateral)
        }
        ActionKind::DrawDebt => {
            let principal = intent.principal().ok_or_else(|| missing("principal"))?;
            msg_draw_debt(address, &intent.collateral_denom, &principal)
        }
        ActionKind::RepayDebt => {
            let payment = intent.principal().ok_or_else(|| missing("principal"))?;
            msg_repay_debt(address, &intent.collateral_denom, &payment)
        }
    };

    Ok(msg)
}
