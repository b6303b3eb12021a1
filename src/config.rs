use base64::{decode_config, STANDARD};
use std::env;

use crate::error::Error;

const DEFAULT_ASSET_PAIRS: &str = "ETHEUR,BTCEUR";

#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

/// How the daily EUR budget is determined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlanMode {
    /// Every pair gets this full amount on every run.
    Fixed { amount: f64 },
    /// Spread the current EUR balance over the days remaining until the
    /// given day of month, split across all pairs.
    Dynamic { target_day: u32 },
}

/// Immutable process configuration, read from the environment exactly once
/// and passed by parameter. The rest of the code never re-validates it.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub asset_pairs: Vec<String>,
    pub plan: PlanMode,
    pub logsnag_token: String,
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        let api_key = require("KRAKEN_KEY")?;
        let api_secret = require("KRAKEN_SECRET")?;
        // Fail on a malformed secret here, before any network call.
        decode_config(&api_secret, STANDARD)
            .map_err(|_| Error::Config("KRAKEN_SECRET is not valid base64".to_string()))?;

        let logsnag_token = require("LOGSNAG_TOKEN")?;

        let asset_pairs = parse_asset_pairs(
            &env::var("ASSET_PAIRS").unwrap_or_else(|_| DEFAULT_ASSET_PAIRS.to_string()),
        )?;

        let plan = parse_plan_mode(
            env::var("DAILY_PURCHASE_AMOUNT_EUR").ok().as_deref(),
            env::var("PURCHASE_DAY_OF_MONTH").ok().as_deref(),
        )?;

        Ok(Self {
            credentials: Credentials {
                api_key,
                api_secret,
            },
            asset_pairs,
            plan,
            logsnag_token,
        })
    }
}

fn require(name: &str) -> Result<String, Error> {
    env::var(name).map_err(|_| Error::Config(format!("{} is not set", name)))
}

fn parse_asset_pairs(raw: &str) -> Result<Vec<String>, Error> {
    let pairs: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(str::to_string)
        .collect();

    if pairs.is_empty() {
        return Err(Error::Config("ASSET_PAIRS is empty".to_string()));
    }
    for pair in &pairs {
        // First three chars are the asset, remainder the fiat currency.
        if pair.len() <= 3 || !pair.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(Error::Config(format!(
                "ASSET_PAIRS entry {:?} is not a valid pair symbol",
                pair
            )));
        }
    }
    Ok(pairs)
}

fn parse_plan_mode(amount: Option<&str>, target_day: Option<&str>) -> Result<PlanMode, Error> {
    match (amount, target_day) {
        (Some(amount), None) => {
            let amount: f64 = amount.parse().map_err(|_| {
                Error::Config("DAILY_PURCHASE_AMOUNT_EUR is not a number".to_string())
            })?;
            if !amount.is_finite() || amount <= 0.0 {
                return Err(Error::Config(
                    "DAILY_PURCHASE_AMOUNT_EUR must be positive".to_string(),
                ));
            }
            Ok(PlanMode::Fixed { amount })
        }
        (None, Some(day)) => {
            let target_day: u32 = day.parse().map_err(|_| {
                Error::Config("PURCHASE_DAY_OF_MONTH is not a number".to_string())
            })?;
            if !(1..=31).contains(&target_day) {
                return Err(Error::Config(
                    "PURCHASE_DAY_OF_MONTH must be between 1 and 31".to_string(),
                ));
            }
            Ok(PlanMode::Dynamic { target_day })
        }
        (Some(_), Some(_)) => Err(Error::Config(
            "set only one of DAILY_PURCHASE_AMOUNT_EUR and PURCHASE_DAY_OF_MONTH".to_string(),
        )),
        (None, None) => Err(Error::Config(
            "one of DAILY_PURCHASE_AMOUNT_EUR and PURCHASE_DAY_OF_MONTH must be set".to_string(),
        )),
    }
}
