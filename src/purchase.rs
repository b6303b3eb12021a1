use chrono::{Duration, Local, NaiveDate};

use crate::config::{Config, PlanMode};
use crate::error::Error;
use crate::exchange::ExchangeClient;
use crate::notify::{Notifier, PurchaseEvent};
use crate::planner::{days_until_next_purchase, PurchasePlan};

/// Run one purchase cycle: plan the per-pair budget, then buy each
/// configured pair in order. Any exchange failure terminates the run;
/// a notification failure only gets logged.
pub async fn run(
    config: &Config,
    exchange: &dyn ExchangeClient,
    notifier: &dyn Notifier,
) -> Result<(), Error> {
    let plan = build_plan(config, exchange).await?;
    log::info!(
        "Daily purchase amount: {} ({} pairs)",
        plan.fiat_per_pair,
        plan.pair_count
    );

    for pair in &config.asset_pairs {
        purchase_pair(exchange, notifier, pair, plan.fiat_per_pair).await?;
    }
    Ok(())
}

async fn build_plan(config: &Config, exchange: &dyn ExchangeClient) -> Result<PurchasePlan, Error> {
    build_plan_for(config, exchange, Local::now().date_naive()).await
}

/// The balance snapshot is taken once here; later pairs intentionally do
/// not see the fiat spent by earlier pairs in the same run.
async fn build_plan_for(
    config: &Config,
    exchange: &dyn ExchangeClient,
    today: NaiveDate,
) -> Result<PurchasePlan, Error> {
    match config.plan {
        PlanMode::Fixed { amount } => Ok(PurchasePlan::fixed(amount, config.asset_pairs.len())),
        PlanMode::Dynamic { target_day } => {
            let days_left = days_until_next_purchase(today, target_day);
            log::info!(
                "Next purchase date: {}. Days left: {}",
                today + Duration::days(days_left as i64),
                days_left
            );
            let balance = exchange.eur_balance().await?;
            Ok(PurchasePlan::dynamic(
                balance,
                days_left,
                config.asset_pairs.len(),
            ))
        }
    }
}

async fn purchase_pair(
    exchange: &dyn ExchangeClient,
    notifier: &dyn Notifier,
    pair: &str,
    fiat_amount: f64,
) -> Result<(), Error> {
    let rate = exchange.asset_pair_fiat_rate(pair).await?;
    log::info!("Fiat rate for {}: {}", pair, rate);

    let volume = fiat_amount / rate;
    log::info!("Purchase volume for {}: {}", pair, volume);

    let order = exchange.market_buy(pair, volume).await?;
    log::info!(
        "Purchased {} of {}: {} [{}]",
        volume,
        pair,
        order.description,
        order.txids.join(", ")
    );

    let event = PurchaseEvent {
        currency: display_name(&pair[..3]).to_string(),
        amount: format!("{:.6}", volume),
        rate: format!("{:.0}", rate),
    };
    // The purchase already executed; a failed announcement must not undo it
    // or stop the remaining pairs.
    if let Err(e) = notifier.publish_purchased(&event).await {
        log::error!("Failed to publish purchased event: {}", e);
    }
    Ok(())
}

/// Human-readable name for the crypto asset, derived from the first three
/// characters of the pair symbol. Unknown assets pass through unchanged.
pub fn display_name(asset: &str) -> &str {
    match asset {
        "XBT" | "BTC" => "Bitcoin",
        "ETH" => "Ethereum",
        _ => asset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::exchange::Order;
    use crate::notify::NotificationError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn config_with(plan: PlanMode, pairs: &[&str]) -> Config {
        Config {
            credentials: Credentials {
                api_key: "key".to_string(),
                api_secret: "c2VjcmV0".to_string(),
            },
            asset_pairs: pairs.iter().map(|p| p.to_string()).collect(),
            plan,
            logsnag_token: "token".to_string(),
        }
    }

    struct FakeExchange {
        rate: f64,
        balance: f64,
        fail_buys: bool,
        orders: Mutex<Vec<(String, f64)>>,
    }

    impl FakeExchange {
        fn new(rate: f64, balance: f64) -> Self {
            Self {
                rate,
                balance,
                fail_buys: false,
                orders: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ExchangeClient for FakeExchange {
        async fn asset_pair_fiat_rate(&self, _pair: &str) -> Result<f64, Error> {
            Ok(self.rate)
        }

        async fn eur_balance(&self) -> Result<f64, Error> {
            Ok(self.balance)
        }

        async fn market_buy(&self, pair: &str, volume: f64) -> Result<Order, Error> {
            if self.fail_buys {
                return Err(Error::Exchange("EOrder:Insufficient funds".to_string()));
            }
            self.orders
                .lock()
                .unwrap()
                .push((pair.to_string(), volume));
            Ok(Order {
                pair: pair.to_string(),
                volume,
                txids: vec!["OUF4EM-FRGI2-MQMWZD".to_string()],
                description: format!("buy {:.6} {} @ market", volume, pair),
            })
        }
    }

    struct RecordingNotifier {
        events: Mutex<Vec<PurchaseEvent>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn publish_purchased(&self, event: &PurchaseEvent) -> Result<(), NotificationError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn publish_purchased(&self, _event: &PurchaseEvent) -> Result<(), NotificationError> {
            Err(NotificationError::Status(500))
        }
    }

    #[tokio::test]
    async fn fixed_mode_buys_the_full_amount_for_every_pair() {
        let config = config_with(PlanMode::Fixed { amount: 20.0 }, &["ETHEUR", "BTCEUR"]);
        let exchange = FakeExchange::new(2000.0, 0.0);
        let notifier = RecordingNotifier {
            events: Mutex::new(Vec::new()),
        };

        run(&config, &exchange, &notifier).await.unwrap();

        let orders = exchange.orders.lock().unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].0, "ETHEUR");
        assert!((orders[0].1 - 0.01).abs() < 1e-12);
        assert!((orders[1].1 - 0.01).abs() < 1e-12);
    }

    #[tokio::test]
    async fn notification_failure_does_not_stop_the_run() {
        let config = config_with(PlanMode::Fixed { amount: 20.0 }, &["ETHEUR", "BTCEUR"]);
        let exchange = FakeExchange::new(2000.0, 0.0);

        let outcome = run(&config, &exchange, &FailingNotifier).await;

        assert!(outcome.is_ok());
        assert_eq!(exchange.orders.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn order_failure_terminates_the_run() {
        let config = config_with(PlanMode::Fixed { amount: 20.0 }, &["ETHEUR", "BTCEUR"]);
        let mut exchange = FakeExchange::new(2000.0, 0.0);
        exchange.fail_buys = true;

        let outcome = run(&config, &exchange, &FailingNotifier).await;

        assert!(matches!(outcome, Err(Error::Exchange(_))));
        assert!(exchange.orders.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dynamic_plan_divides_the_balance_snapshot() {
        let config = config_with(PlanMode::Dynamic { target_day: 15 }, &["ETHEUR", "BTCEUR"]);
        let exchange = FakeExchange::new(2000.0, 1000.0);
        // June 20th, 30-day month: 30 - 20 + 15 = 25 days left.
        let today = NaiveDate::from_ymd_opt(2026, 6, 20).unwrap();

        let plan = build_plan_for(&config, &exchange, today).await.unwrap();

        assert_eq!(plan.fiat_per_pair, 20.0);
        assert_eq!(plan.pair_count, 2);
    }

    #[tokio::test]
    async fn notified_event_formats_volume_and_rate() {
        let config = config_with(PlanMode::Fixed { amount: 20.0 }, &["ETHEUR"]);
        let exchange = FakeExchange::new(2000.0, 0.0);
        let notifier = RecordingNotifier {
            events: Mutex::new(Vec::new()),
        };

        run(&config, &exchange, &notifier).await.unwrap();

        let events = notifier.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![PurchaseEvent {
                currency: "Ethereum".to_string(),
                amount: "0.010000".to_string(),
                rate: "2000".to_string(),
            }]
        );
    }

    #[test]
    fn display_names_map_known_assets() {
        assert_eq!(display_name("BTC"), "Bitcoin");
        assert_eq!(display_name("XBT"), "Bitcoin");
        assert_eq!(display_name("ETH"), "Ethereum");
        assert_eq!(display_name("LTC"), "LTC");
    }
}
