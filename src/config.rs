use std::collections::HashMap;
use std::env;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use url::Url;

/// Application configuration, layered from embedded defaults, optional
/// `config/*.toml` files and `STOCKHAWK__`-prefixed environment variables.
///
/// Everything site-specific (SKU table, page selectors, delivery option
/// ids) lives here rather than in code: the upstream sites change these
/// without notice, and rotating a selector must not require a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub scraper: ScraperConfig,
    pub store: StoreConfig,
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Seconds slept between polling cycles.
    pub poll_interval_secs: u64,
    /// Heartbeat log emitted every Nth cycle.
    pub heartbeat_decimation: u32,
    /// Consecutive scrape failures tolerated before an alert goes out.
    pub scrape_error_tolerance: u32,
    /// Minimum seconds between two copies of the same alert.
    pub alert_backoff_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub api_url: String,
    pub skus: String,
    pub locale: String,
    pub referer: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Where offending raw payloads are persisted for postmortem.
    pub dump_dir: String,
    /// Extra request headers sent verbatim. The vendor serves stale cached
    /// payloads to clients that do not look like its own storefront.
    pub extra_headers: HashMap<String, String>,
    /// Vendor SKU -> canonical model name.
    pub sku_names: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub base_url: String,
    pub domain: String,
    pub consent_cookie: String,
    pub cookie_accept_button: String,

    pub account_control: String,
    pub long_session_checkbox: String,
    pub email_field: String,
    pub password_field: String,
    pub logout_link: String,

    pub basket_control: String,
    pub basket_count_badge: String,
    pub basket_trash_icon: String,
    pub basket_confirm_text: String,

    pub expired_marker: String,
    pub not_found_marker: String,
    pub maintenance_title: String,

    pub one_click_button: String,
    pub add_to_cart_button: String,
    pub view_cart_text: String,
    pub order_checkout_button: String,
    pub warranty_refusal_text: String,
    pub default_modal: String,
    pub error_modal: String,

    pub home_delivery_option: String,
    pub express_delivery_option: String,
    pub prefer_express: bool,

    pub card_number_field: String,
    pub expiration_field: String,
    pub owner_field: String,
    pub cryptogram_field: String,
    pub payment_submit_button: String,
    pub payment_error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub chrome_path: Option<String>,
    pub user_agent: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            heartbeat_decimation: 10,
            scrape_error_tolerance: 5,
            alert_backoff_secs: 60,
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.store.nvidia.com/partner/v1/feinventory".to_string(),
            skus: "FR~NVGFT070~NVGFT080~NVGFT090~NVLKR30S~NSHRMT01~NVGFT060T~187".to_string(),
            locale: "FR".to_string(),
            referer: concat!(
                "https://shop.nvidia.com/fr-fr/geforce/store/gpu/",
                "?page=1&limit=100&locale=fr-fr&category=GPU&",
                "gpu=RTX%203060%20Ti,RTX%203070,RTX%203070%20Ti,",
                "RTX%203080,RTX%203080%20Ti,RTX%203090&manufacturer=NVIDIA"
            )
            .to_string(),
            user_agent:
                "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:90.0) Gecko/20100101 Firefox/90.0"
                    .to_string(),
            timeout_secs: 2,
            dump_dir: "data/scrape-dumps".to_string(),
            extra_headers: HashMap::from([
                (
                    "accept-language".to_string(),
                    "fr,fr-FR;q=0.8,en-US;q=0.5,en;q=0.3".to_string(),
                ),
                // accept-encoding is managed by the HTTP client so reply
                // bodies still get decompressed
                ("cache-control".to_string(), "max-age=0".to_string()),
                ("origin".to_string(), "https://shop.nvidia.com".to_string()),
            ]),
            sku_names: HashMap::from([
                ("NVGFT060T_FR".to_string(), "3060Ti".to_string()),
                ("NVGFT070_FR".to_string(), "3070".to_string()),
                ("NVGFT070T_FR".to_string(), "3070Ti".to_string()),
                ("NVGFT080_FR".to_string(), "3080".to_string()),
                ("NVGFT080T_FR".to_string(), "3080Ti".to_string()),
                ("NVGFT090_FR".to_string(), "3090".to_string()),
            ]),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.ldlc.com".to_string(),
            domain: "ldlc.com".to_string(),
            consent_cookie: "cookiespreferences".to_string(),
            cookie_accept_button: "cookieConsentAcceptButton".to_string(),

            account_control: "compte".to_string(),
            long_session_checkbox: "LongAuthenticationDuration".to_string(),
            email_field: "Email".to_string(),
            password_field: "Password".to_string(),
            logout_link: "a.logout".to_string(),

            basket_control: "panier".to_string(),
            basket_count_badge: "#panier span.nb-pdt".to_string(),
            basket_trash_icon: "span.icon-trash".to_string(),
            basket_confirm_text: "OUI".to_string(),

            expired_marker: "div.p410".to_string(),
            not_found_marker: "div.p404".to_string(),
            maintenance_title: "maintenance".to_string(),

            one_click_button: "button.add-to-cart-oneclic".to_string(),
            add_to_cart_button: "button.add-to-cart".to_string(),
            view_cart_text: "VOIR MON PANIER".to_string(),
            order_checkout_button: "#order button.maxi".to_string(),
            warranty_refusal_text: "NON MERCI".to_string(),
            default_modal: "modal-default".to_string(),
            error_modal: "error-generic-modal".to_string(),

            home_delivery_option: "SelectedDeliveryModeId370008".to_string(),
            express_delivery_option: "SelectedDeliveryModeId370009".to_string(),
            prefer_express: false,

            card_number_field: "CardNumber".to_string(),
            expiration_field: "ExpirationDate".to_string(),
            owner_field: "OwnerName".to_string(),
            cryptogram_field: "Cryptogram".to_string(),
            payment_submit_button: "#payment-form button.maxi".to_string(),
            payment_error: "span.field-validation-error".to_string(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            user_agent:
                "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:90.0) Gecko/20100101 Firefox/90.0"
                    .to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bot: BotConfig::default(),
            scraper: ScraperConfig::default(),
            store: StoreConfig::default(),
            browser: BrowserConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with embedded defaults
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "STOCKHAWK_"
            .add_source(Environment::with_prefix("STOCKHAWK").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        if config.browser.chrome_path.is_none() {
            config.browser.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.poll_interval_secs == 0 {
            return Err(ConfigError::Message(
                "bot.poll_interval_secs must be greater than 0".into(),
            ));
        }

        if self.bot.heartbeat_decimation == 0 {
            return Err(ConfigError::Message(
                "bot.heartbeat_decimation must be greater than 0".into(),
            ));
        }

        if Url::parse(&self.scraper.api_url).is_err() {
            return Err(ConfigError::Message("Invalid scraper API URL".into()));
        }

        if self.scraper.sku_names.is_empty() {
            return Err(ConfigError::Message(
                "scraper.sku_names must not be empty".into(),
            ));
        }

        if self.scraper.timeout_secs == 0 {
            return Err(ConfigError::Message(
                "scraper.timeout_secs must be greater than 0".into(),
            ));
        }

        if Url::parse(&self.store.base_url).is_err() {
            return Err(ConfigError::Message("Invalid store base URL".into()));
        }

        if self.store.domain.is_empty() {
            return Err(ConfigError::Message("store.domain must not be empty".into()));
        }

        Ok(())
    }

    /// Canonical model names, for validating the buy-priority arguments.
    pub fn known_models(&self) -> Vec<String> {
        let mut models: Vec<String> = self.scraper.sku_names.values().cloned().collect();
        models.sort();
        models
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_known_models_cover_sku_table() {
        let config = AppConfig::default();
        let models = config.known_models();
        assert_eq!(models.len(), 6);
        for model in ["3060Ti", "3070", "3070Ti", "3080", "3080Ti", "3090"] {
            assert!(models.contains(&model.to_string()), "missing {}", model);
        }
    }

    #[test]
    fn test_validation_rejects_zero_poll_interval() {
        let mut config = AppConfig::default();
        config.bot.poll_interval_secs = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("poll_interval_secs"));
    }

    #[test]
    fn test_validation_rejects_bad_api_url() {
        let mut config = AppConfig::default();
        config.scraper.api_url = "not-a-url".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_sku_table() {
        let mut config = AppConfig::default();
        config.scraper.sku_names.clear();

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("sku_names"));
    }
}
