use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::BotConfig;
use crate::notify::Notifier;
use crate::scraper::StockSource;
use crate::driver::Purchaser;
use crate::utils::error::BuyError;

/// Orchestrator phases. `Done` is terminal: `run()` returns once the
/// purchase budget is met.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotState {
    Polling,
    Buying,
    Done,
}

/// The purchasing bot: polls the stock source and, for each newly
/// actionable prioritized model, drives a purchase. At most one copy of
/// each model is bought, and the run stops after `buy_limit` purchases.
///
/// Strictly sequential by design: the funnel owns a single authenticated
/// browser session and a single cart, so there are never concurrent buy
/// attempts or scrapes.
pub struct Bot {
    scraper: Box<dyn StockSource>,
    driver: Box<dyn Purchaser>,
    notifier: Arc<Notifier>,

    buy_priority: Vec<String>,
    buy_limit: usize,
    bought: HashSet<String>,
    state: BotState,

    poll_interval: Duration,
    heartbeat_decimation: u32,
    scrape_error_tolerance: u32,
    alert_backoff: Duration,
}

impl Bot {
    pub fn new(
        scraper: Box<dyn StockSource>,
        driver: Box<dyn Purchaser>,
        notifier: Arc<Notifier>,
        buy_priority: Vec<String>,
        buy_limit: usize,
        config: &BotConfig,
    ) -> Self {
        Self {
            scraper,
            driver,
            notifier,
            buy_priority,
            buy_limit,
            bought: HashSet::new(),
            state: BotState::Polling,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            heartbeat_decimation: config.heartbeat_decimation,
            scrape_error_tolerance: config.scrape_error_tolerance,
            alert_backoff: Duration::from_secs(config.alert_backoff_secs),
        }
    }

    pub fn done(&self) -> bool {
        self.bought.len() >= self.buy_limit
    }

    pub fn state(&self) -> BotState {
        self.state
    }

    pub fn bought(&self) -> &HashSet<String> {
        &self.bought
    }

    /// Poll and buy until the purchase budget is met.
    pub async fn run(&mut self) {
        self.notifier.push("Stock watching started").await;

        let mut heartbeat_count = 0u32;
        let mut consecutive_errors = 0u32;

        while !self.done() {
            // Rate-limit polling; hammering the availability source is the
            // quickest way to get blocked
            tokio::time::sleep(self.poll_interval).await;

            if heartbeat_count == 0 {
                tracing::debug!("still alive and polling");
            }
            heartbeat_count = (heartbeat_count + 1) % self.heartbeat_decimation;

            let urls_to_try = match self.scraper.scrap().await {
                Ok(urls) => {
                    consecutive_errors = 0;
                    urls
                }
                Err(e) => {
                    consecutive_errors += 1;
                    tracing::error!("scrapping error: {}", e);
                    if consecutive_errors > self.scrape_error_tolerance {
                        self.notifier
                            .humble_push(&format!("Errors are stacking: {}", e), self.alert_backoff)
                            .await;
                        consecutive_errors = 0;
                    }
                    continue;
                }
            };

            // Bought models were already removed from the priority list, so
            // the intersection below excludes them by construction
            let candidates: Vec<(String, String)> = self
                .buy_priority
                .iter()
                .filter_map(|model| {
                    urls_to_try
                        .get(model)
                        .map(|url| (model.clone(), url.clone()))
                })
                .collect();

            if candidates.is_empty() {
                continue;
            }

            self.enter(BotState::Buying);
            for (model, url) in candidates {
                if self.done() {
                    break;
                }
                self.try_buy(&model, &url).await;
            }
            self.enter(if self.done() {
                BotState::Done
            } else {
                BotState::Polling
            });
        }

        self.enter(BotState::Done);
        self.notifier.push("My job is done !").await;
    }

    async fn try_buy(&mut self, model: &str, url: &str) {
        self.notifier
            .push(&format!("Transaction attempt: {} ({})", model, url))
            .await;

        match self.driver.buy(url).await {
            Ok(()) => self.consider_bought(model).await,
            Err(BuyError::PaymentRefused { reason }) => {
                // Funds were attempted; a human needs to know
                self.notifier
                    .push(&format!("Payment refused for {}: {}", model, reason))
                    .await;
            }
            Err(e) => {
                // Try again later: the model stays in the priority list
                tracing::info!("buy attempt for {} failed: {}", model, e);
            }
        }
    }

    async fn consider_bought(&mut self, model: &str) {
        self.buy_priority.retain(|p| p != model);
        self.bought.insert(model.to_string());
        self.notifier
            .push(&format!("{} considered bought !", model))
            .await;
    }

    fn enter(&mut self, state: BotState) {
        if self.state != state {
            tracing::debug!("state: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }
}
