//! Configuration loading.
//!
//! Chain connection details and the signing mnemonic come from the
//! environment (optionally via `.env`). Tuning knobs for the schedule, HTTP
//! client, decision engine and transaction fees come from an optional TOML
//! file; every field there has a default so the file may be omitted.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::types::ConfigError;

pub const ENV_MNEMONIC: &str = "MNEMONIC";
pub const ENV_LCD_URL: &str = "LCD_URL";
pub const ENV_CHAIN_ID: &str = "CHAIN_ID";
pub const ENV_COLLATERAL_DENOM: &str = "COLLATERAL_DENOM";
pub const ENV_BECH32_PREFIX: &str = "BECH32_PREFIX";
pub const ENV_HD_PATH: &str = "HD_PATH";
pub const ENV_DRY_RUN: &str = "DRY_RUN";
pub const ENV_CONFIG_PATH: &str = "SPAMMER_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "spammer.toml";
const DEFAULT_BECH32_PREFIX: &str = "kava";
const DEFAULT_HD_PATH: &str = "m/44'/118'/0'/0/0";

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub chain: ChainConfig,
    pub tuning: TuningConfig,
}

/// Connection and identity settings, read from the environment.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub mnemonic: SecretString,
    pub lcd_url: String,
    pub chain_id: String,
    pub collateral_denom: String,
    pub bech32_prefix: String,
    pub hd_path: String,
    pub dry_run: bool,
}

/// Contents of the optional TOML tuning file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub schedule: ScheduleConfig,
    pub http: HttpConfig,
    pub decision: DecisionSettings,
    pub tx: TxConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout applied to every LCD call.
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Decision engine bounds as they appear in the TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecisionSettings {
    #[serde(with = "rust_decimal::serde::str")]
    pub collateral_fraction_min: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub collateral_fraction_max: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub principal_fraction_min: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub principal_fraction_max: Decimal,
    pub principal_denom_exponent: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub ratio_threshold: Decimal,
    pub collateral_adjust_divisor: u64,
    pub principal_adjust_divisor: u64,
    pub clamp_draw_to_debt_limit: bool,
    pub seed: Option<u64>,
}

impl Default for DecisionSettings {
    fn default() -> Self {
        Self {
            collateral_fraction_min: dec!(0.02),
            collateral_fraction_max: dec!(0.80),
            principal_fraction_min: dec!(0.02),
            principal_fraction_max: dec!(0.65),
            principal_denom_exponent: 6,
            ratio_threshold: dec!(2.2),
            collateral_adjust_divisor: 10,
            principal_adjust_divisor: 2,
            clamp_draw_to_debt_limit: false,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TxConfig {
    pub gas: u64,
    pub fee_amount: u64,
    pub fee_denom: String,
    pub memo: String,
    /// LCD broadcast mode: "sync", "async" or "block".
    pub broadcast_mode: String,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            gas: 200_000,
            fee_amount: 0,
            fee_denom: "ukava".to_string(),
            memo: String::new(),
            broadcast_mode: "sync".to_string(),
        }
    }
}

impl AppConfig {
    /// Build the configuration from the process environment plus the tuning
    /// file named by `SPAMMER_CONFIG` (default `spammer.toml`).
    pub fn load() -> Result<Self> {
        let chain = ChainConfig::from_lookup(|key| std::env::var(key).ok())?;
        let path = std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let tuning = TuningConfig::load(&path)?;
        Ok(Self { chain, tuning })
    }
}

impl ChainConfig {
    /// Read chain settings through `lookup`, which maps a variable name to
    /// its value. Missing required variables are a fatal error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| -> Result<String, ConfigError> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingEnv(key))
        };

        let mnemonic = SecretString::new(required(ENV_MNEMONIC)?);
        let lcd_url = required(ENV_LCD_URL)?.trim_end_matches('/').to_string();
        if !(lcd_url.starts_with("http://") || lcd_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: ENV_LCD_URL,
                message: format!("expected an http(s) URL, got {lcd_url}"),
            });
        }

        let dry_run = match lookup(ENV_DRY_RUN) {
            None => false,
            Some(v) => parse_flag(&v).ok_or_else(|| ConfigError::Invalid {
                key: ENV_DRY_RUN,
                message: format!("expected a boolean, got {v}"),
            })?,
        };

        Ok(Self {
            mnemonic,
            lcd_url,
            chain_id: required(ENV_CHAIN_ID)?,
            collateral_denom: required(ENV_COLLATERAL_DENOM)?,
            bech32_prefix: lookup(ENV_BECH32_PREFIX)
                .unwrap_or_else(|| DEFAULT_BECH32_PREFIX.into()),
            hd_path: lookup(ENV_HD_PATH).unwrap_or_else(|| DEFAULT_HD_PATH.into()),
            dry_run,
        })
    }
}

impl TuningConfig {
    /// Load the tuning file. A missing file yields the defaults.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate tuning TOML.
    pub fn parse(contents: &str) -> Result<Self> {
        let tuning: Self = toml::from_str(contents).context("Failed to parse tuning TOML")?;
        tuning.decision.validate()?;
        Ok(tuning)
    }
}

impl DecisionSettings {
    /// Reject bounds the engine cannot honour: fractions outside `[0, 1]`,
    /// inverted ranges, zero divisors and a non-positive ratio threshold.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_fraction_range(
            "decision.collateral_fraction_min",
            "decision.collateral_fraction_max",
            self.collateral_fraction_min,
            self.collateral_fraction_max,
        )?;
        check_fraction_range(
            "decision.principal_fraction_min",
            "decision.principal_fraction_max",
            self.principal_fraction_min,
            self.principal_fraction_max,
        )?;

        for (key, divisor) in [
            ("decision.collateral_adjust_divisor", self.collateral_adjust_divisor),
            ("decision.principal_adjust_divisor", self.principal_adjust_divisor),
        ] {
            if divisor == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    message: "divisor must be at least 1".into(),
                });
            }
        }

        if self.ratio_threshold <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                key: "decision.ratio_threshold",
                message: format!("must be positive, got {}", self.ratio_threshold),
            });
        }
        Ok(())
    }
}

fn check_fraction_range(
    min_key: &'static str,
    max_key: &'static str,
    min: Decimal,
    max: Decimal,
) -> Result<(), ConfigError> {
    for (key, value) in [(min_key, min), (max_key, max)] {
        if value < Decimal::ZERO || value > Decimal::ONE {
            return Err(ConfigError::Invalid {
                key,
                message: format!("must be within [0, 1], got {value}"),
            });
        }
    }
    if min > max {
        return Err(ConfigError::Invalid {
            key: min_key,
            message: format!("{min} exceeds {max_key} = {max}"),
        });
    }
    Ok(())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
