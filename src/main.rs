use dotenv::dotenv;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Root};

mod config;
mod error;
mod exchange;
mod kraken;
mod notify;
mod planner;
mod purchase;

use crate::config::Config;
use crate::kraken::KrakenClient;
use crate::notify::LogSnag;

/// Console logging; the process is a one-shot job, its operator reads stdout.
fn init_logging() {
    let stdout = ConsoleAppender::builder().build();
    let log_config = log4rs::config::Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(
            Root::builder()
                .appender("stdout")
                .build(log::LevelFilter::Info),
        )
        .expect("Unable to build log config");
    log4rs::init_config(log_config).expect("Unable to initialize logging");
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    let client = KrakenClient::new(config.credentials.clone());
    let notifier = LogSnag::new(config.logsnag_token.clone());

    if let Err(e) = purchase::run(&config, &client, &notifier).await {
        log::error!("Purchase run failed: {}", e);
        std::process::exit(1);
    }
}
