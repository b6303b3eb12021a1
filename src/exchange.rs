use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use url::form_urlencoded;

use crate::error::Error;
use crate::kraken::KrakenClient;

/// Balance key Kraken uses for euros.
const FIAT_BALANCE_KEY: &str = "ZEUR";

/// A filled (or at least accepted) market buy.
#[derive(Debug, Clone)]
pub struct Order {
    pub pair: String,
    pub volume: f64,
    pub txids: Vec<String>,
    pub description: String,
}

/// The three exchange operations the purchase cycle needs. A seam so the
/// orchestrator can run against a fake in tests.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Most recent traded price for the pair in fiat.
    async fn asset_pair_fiat_rate(&self, pair: &str) -> Result<f64, Error>;

    /// Current EUR account balance.
    async fn eur_balance(&self) -> Result<f64, Error>;

    /// Submit an immediate market buy for `volume` units of the pair's asset.
    async fn market_buy(&self, pair: &str, volume: f64) -> Result<Order, Error>;
}

#[async_trait]
impl ExchangeClient for KrakenClient {
    async fn asset_pair_fiat_rate(&self, pair: &str) -> Result<f64, Error> {
        let query: String = form_urlencoded::Serializer::new(String::new())
            .append_pair("pair", pair)
            .finish();
        let result = self
            .fetch_public(&format!("/0/public/Ticker?{}", query))
            .await?
            .into_result()?;
        parse_ticker_rate(&result)
    }

    async fn eur_balance(&self) -> Result<f64, Error> {
        let result = self
            .fetch_private("/0/private/Balance", &[])
            .await?
            .into_result()?;
        let balances = parse_balances(&result)?;
        balances.get(FIAT_BALANCE_KEY).copied().ok_or_else(|| {
            Error::Exchange(format!("no {} balance in account", FIAT_BALANCE_KEY))
        })
    }

    async fn market_buy(&self, pair: &str, volume: f64) -> Result<Order, Error> {
        let payload = [
            ("pair", pair.to_string()),
            ("ordertype", "market".to_string()),
            ("type", "buy".to_string()),
            ("volume", volume.to_string()),
        ];
        let result = self
            .fetch_private("/0/private/AddOrder", &payload)
            .await?
            .into_result()?;
        let accepted = parse_add_order(&result)?;
        Ok(Order {
            pair: pair.to_string(),
            volume,
            txids: accepted.txid,
            description: accepted.descr.order,
        })
    }
}

/// Ticker result: a map keyed by Kraken's canonical pair name, each entry
/// carrying a 2-element price tuple `p` of `[today, last24h]`. Take today's
/// price of the first (only) entry. Any deviation from that shape means the
/// exchange changed its schema and must surface, never default.
fn parse_ticker_rate(result: &Value) -> Result<f64, Error> {
    let tickers = result
        .as_object()
        .ok_or_else(|| Error::ResponseShape("Ticker result is not an object".to_string()))?;
    let (name, info) = tickers
        .iter()
        .next()
        .ok_or_else(|| Error::ResponseShape("Ticker result is empty".to_string()))?;
    let prices = info
        .get("p")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::ResponseShape(format!("missing p tuple for {}", name)))?;
    let today = prices
        .first()
        .ok_or_else(|| Error::ResponseShape(format!("empty p tuple for {}", name)))?;
    parse_decimal(today)
        .ok_or_else(|| Error::ResponseShape(format!("p[0] for {} is not a number", name)))
}

/// Balance result: a sparse currency → amount map; Kraken encodes the
/// amounts as strings.
fn parse_balances(result: &Value) -> Result<HashMap<String, f64>, Error> {
    let entries = result
        .as_object()
        .ok_or_else(|| Error::ResponseShape("Balance result is not an object".to_string()))?;
    let mut balances = HashMap::new();
    for (currency, amount) in entries {
        let amount = parse_decimal(amount).ok_or_else(|| {
            Error::ResponseShape(format!("balance for {} is not a number", currency))
        })?;
        balances.insert(currency.clone(), amount);
    }
    Ok(balances)
}

#[derive(Debug, Deserialize)]
struct AddOrderResult {
    descr: OrderDescription,
    txid: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OrderDescription {
    order: String,
}

/// An accepted order must carry at least one transaction id; an empty list
/// without an exchange error still counts as a failure.
fn parse_add_order(result: &Value) -> Result<AddOrderResult, Error> {
    let accepted: AddOrderResult = serde_json::from_value(result.clone())
        .map_err(|e| Error::ResponseShape(format!("AddOrder result: {}", e)))?;
    if accepted.txid.is_empty() {
        return Err(Error::ResponseShape(
            "no txid in AddOrder result".to_string(),
        ));
    }
    Ok(accepted)
}

/// Kraken encodes decimals as JSON strings; accept a plain number too.
fn parse_decimal(value: &Value) -> Option<f64> {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .or_else(|| value.as_f64())
}
