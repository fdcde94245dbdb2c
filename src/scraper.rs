use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::ScraperConfig;
use crate::notify::Notifier;
use crate::utils::error::ScrapeError;

/// Read side of the bot: something that can report newly actionable
/// products, as a `model name -> purchase URL` mapping.
#[async_trait]
pub trait StockSource: Send + Sync {
    async fn scrap(&mut self) -> Result<HashMap<String, String>, ScrapeError>;
}

#[derive(Debug, Deserialize)]
struct InventoryReply {
    #[serde(rename = "listMap")]
    list_map: Vec<SkuRecord>,
}

#[derive(Debug, Deserialize)]
struct SkuRecord {
    fe_sku: String,
    is_active: String,
    product_url: String,
}

/// Last observation of one product. Created on first sighting, mutated
/// every poll cycle, never removed.
#[derive(Debug, Clone)]
struct ProductState {
    url: String,
    available: bool,
}

/// Polls the vendor inventory API and reports products that became
/// actionable since the previous cycle: either a transition to in-stock,
/// or a rotation of the purchase URL. URL rotation alone counts as a stock
/// signal; the store rotates URLs rapidly around restocks.
pub struct StockScraper {
    client: Client,
    config: ScraperConfig,
    notifier: Arc<Notifier>,
    seen: HashMap<String, ProductState>,
}

impl StockScraper {
    pub fn new(config: ScraperConfig, notifier: Arc<Notifier>) -> Result<Self, ScrapeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config,
            notifier,
            seen: HashMap::new(),
        })
    }

    async fn fetch_inventory(&self) -> Result<InventoryReply, ScrapeError> {
        // Freshness token in both query and referer to defeat caching
        let timestamp = chrono::Utc::now().timestamp();
        let referer = format!("{}&timestamp={}", self.config.referer, timestamp);

        let mut request = self
            .client
            .get(&self.config.api_url)
            .query(&[
                ("skus", self.config.skus.as_str()),
                ("locale", self.config.locale.as_str()),
                ("timestamp", timestamp.to_string().as_str()),
            ])
            .header("user-agent", &self.config.user_agent)
            .header("accept", "application/json, text/plain, */*")
            .header("referer", referer);
        for (name, value) in &self.config.extra_headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let reply = request.send().await?;

        let status = reply.status();
        let body = reply.text().await?;

        if !status.is_success() {
            tracing::error!("HTTP {} - {}", status.as_u16(), body);
            return Err(ScrapeError::Http {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("inventory scrapping error: {}", body);
            self.dump_payload(&body);
            ScrapeError::Schema {
                context: e.to_string(),
            }
        })
    }

    /// Persist an offending raw payload for postmortem. Diagnostic only;
    /// failures are logged and swallowed.
    fn dump_payload(&self, body: &str) {
        let dir = PathBuf::from(&self.config.dump_dir);
        let filename = format!(
            "scrape_{}.json",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        );
        let path = dir.join(filename);
        let result = std::fs::create_dir_all(&dir).and_then(|_| std::fs::write(&path, body));
        match result {
            Ok(_) => tracing::info!("offending payload saved to {}", path.display()),
            Err(e) => tracing::warn!("could not persist offending payload: {}", e),
        }
    }

    async fn check_record(&mut self, record: &SkuRecord) -> Option<(String, String)> {
        let model = self.config.sku_names.get(&record.fe_sku)?.clone();
        let available = record.is_active.eq_ignore_ascii_case("true");

        let previous = self.seen.get(&model);
        let url_changed = previous.is_some_and(|p| p.url != record.product_url);
        let newly_available = available && !previous.is_some_and(|p| p.available);

        if url_changed {
            self.notifier
                .push_once(&format!("New URL for {}: {}", model, record.product_url))
                .await;
        }
        if available {
            self.notifier
                .push_once(&format!("{} in stock at {} !", model, record.product_url))
                .await;
        }

        // Remember the latest observation unconditionally so future cycles
        // compare against it
        self.seen.insert(
            model.clone(),
            ProductState {
                url: record.product_url.clone(),
                available,
            },
        );

        if url_changed || newly_available {
            Some((model, record.product_url.clone()))
        } else {
            None
        }
    }
}

#[async_trait]
impl StockSource for StockScraper {
    async fn scrap(&mut self) -> Result<HashMap<String, String>, ScrapeError> {
        let inventory = self.fetch_inventory().await?;

        let mut urls_to_try = HashMap::new();
        for record in &inventory.list_map {
            if let Some((model, url)) = self.check_record(record).await {
                urls_to_try.insert(model, url);
            }
        }
        Ok(urls_to_try)
    }
}
